use thiserror::Error;

use crate::catalog::{Filter, FilterId, GroupId, TagId};

// ============================================================================
// Error Types
// ============================================================================

/// Database open/migration errors with user-friendly messages
#[derive(Debug, Error)]
pub enum StorageError {
    /// Another process holds the database lock
    #[error("Another instance of filter-catalog appears to be running. Please close it and try again.")]
    InstanceLocked,

    #[error("Database migration failed: {0}")]
    Migration(String),

    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl StorageError {
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if is_lock_message(&err.to_string()) {
            return StorageError::InstanceLocked;
        }
        StorageError::Other(err)
    }
}

/// SQLITE_BUSY, SQLITE_LOCKED and SQLITE_CANTOPEN all surface as a held lock.
pub(crate) fn is_lock_message(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("database is locked")
        || message.contains("database table is locked")
        || message.contains("sqlite_busy")
        || message.contains("sqlite_locked")
        || message.contains("unable to open database file")
}

// ============================================================================
// Records
// ============================================================================

/// Counts written by one `import_metadata` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub groups: usize,
    pub tags: usize,
    pub filters: usize,
}

/// Metadata of a user-added list, as probed from its header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewCustomFilter {
    pub url: String,
    pub name: String,
    pub description: String,
    pub homepage: String,
    pub version: String,
    pub rules_count: u64,
}

/// Row type for filter queries
pub(crate) type FilterRow = (
    FilterId,
    GroupId,
    String,
    String,
    String,
    String,
    Option<i64>,
    bool,
    bool,
    Option<String>,
    Option<i64>,
    i64,
);

pub(crate) fn filter_from_row(row: FilterRow, tags: Vec<TagId>) -> Filter {
    let (
        filter_id,
        group_id,
        name,
        description,
        homepage,
        version,
        time_updated,
        enabled,
        removed,
        custom_url,
        last_update_time,
        rules_count,
    ) = row;

    Filter {
        filter_id,
        group_id,
        name,
        description,
        homepage,
        version,
        time_updated,
        tags,
        tags_details: Vec::new(),
        enabled,
        removed,
        custom_url,
        last_update_time,
        rules_count: u64::try_from(rules_count).unwrap_or(0),
    }
}
