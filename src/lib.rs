//! Filter list catalog: categorization, recommendations and backend/view
//! state synchronization for a content-blocking app.

pub mod backend;
pub mod catalog;
pub mod config;
pub mod storage;
pub mod sync;
pub mod util;
