mod filters;
mod schema;
mod settings;
mod types;

pub use filters::FIRST_CUSTOM_FILTER_ID;
pub use schema::Database;
pub use types::{ImportSummary, NewCustomFilter, StorageError};
