//! Backend -> view event vocabulary.
//!
//! Events travel over an order-preserving channel. The backend emits them
//! after it has committed the corresponding change; the view only ever
//! mutates its cache in response to one of these.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::catalog::{Filter, FilterId, GroupId};

/// Rules-count summary shown next to the filter list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RulesCountInfo {
    pub rules_count: u64,
    pub rules_over_limit: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncEvent {
    /// A filter was enabled or disabled. Carries the full record so a filter
    /// the view has never seen can be inserted.
    #[serde(rename = "FILTER_ENABLE_DISABLE")]
    FilterStateChanged(Filter),
    /// A filter was added or removed. The view must refetch the snapshot.
    #[serde(rename = "FILTER_ADD_REMOVE")]
    FilterAddRemove,
    #[serde(rename = "START_DOWNLOAD_FILTER", rename_all = "camelCase")]
    DownloadStarted {
        filter_id: FilterId,
        group_id: GroupId,
    },
    /// Download finished, successfully or not. `last_update_time` is set
    /// only on success.
    #[serde(rename = "FINISH_DOWNLOAD_FILTER", rename_all = "camelCase")]
    DownloadFinished {
        filter_id: FilterId,
        group_id: GroupId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        last_update_time: Option<i64>,
    },
    #[serde(rename = "CONTENT_BLOCKER_UPDATED")]
    RulesCountUpdated(RulesCountInfo),
}

impl SyncEvent {
    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncEvent::FilterStateChanged(_) => "filter_state_changed",
            SyncEvent::FilterAddRemove => "filter_add_remove",
            SyncEvent::DownloadStarted { .. } => "download_started",
            SyncEvent::DownloadFinished { .. } => "download_finished",
            SyncEvent::RulesCountUpdated(_) => "rules_count_updated",
        }
    }
}

/// Sending half of the backend -> view event channel.
///
/// Cheap to clone. A closed or full channel is logged, never surfaced to
/// the caller: the view recovers on its next snapshot fetch.
#[derive(Clone)]
pub struct EventHandle {
    tx: mpsc::Sender<SyncEvent>,
}

impl EventHandle {
    pub fn new(tx: mpsc::Sender<SyncEvent>) -> Self {
        Self { tx }
    }

    pub async fn emit(&self, event: SyncEvent) {
        let kind = event.kind();
        if let Err(e) = self.tx.send(event).await {
            tracing::debug!(event = kind, error = %e, "View is gone, dropping event");
        }
    }
}

/// Create a connected event handle and receiver.
pub fn event_channel(buffer_size: usize) -> (EventHandle, mpsc::Receiver<SyncEvent>) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (EventHandle::new(tx), rx)
}
