//! Backend side: owns the stores, runs commands, emits sync events.
//!
//! - [`service`] - Command handling over the database
//! - [`source`] - Filter list metadata probe (HTTP or in-memory)

pub mod service;
pub mod source;

pub use service::{Backend, BackendError, BackendSettings};
pub use source::{
    parse_list, FilterListInfo, FilterListSource, HttpFilterListSource, SourceError,
    StaticListSource,
};
