//! Helpers for handling user- and network-supplied strings.
//!
//! - **URL validation**: custom filter list URLs are checked before any fetch
//! - **Text cleanup**: metadata read from remote list headers is sanitized

mod text;
mod url_validator;

pub use text::{sanitize_metadata, strip_control_chars, MAX_METADATA_LEN};
pub use url_validator::{validate_list_url, UrlValidationError};
