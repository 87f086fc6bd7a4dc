//! View-side synchronization with the backend.
//!
//! - [`events`] - Backend -> view event vocabulary and its channel
//! - [`commands`] - View -> backend commands and replies
//! - [`cache`] - Catalog cache mirroring the last snapshot
//! - [`view`] - Sync state machine applying events to the cache
//! - [`context`] - View-wide state handed over at startup

pub mod cache;
pub mod commands;
pub mod context;
pub mod events;
pub mod view;

pub use cache::{CachedCategory, CatalogCache, UpdateOutcome};
pub use commands::{
    Command, CustomFilterError, CustomFilterInfo, CustomFilterOutcome, CustomFilterReply, Reply,
};
pub use context::{StartupState, ViewContext};
pub use events::{event_channel, EventHandle, RulesCountInfo, SyncEvent};
pub use view::{CatalogView, SyncState, ViewEffect};
