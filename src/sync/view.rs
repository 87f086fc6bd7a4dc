//! View-side synchronization state machine.
//!
//! ```text
//!   Uninitialized --snapshot--> Synced --FilterAddRemove--> AwaitingFullRefresh
//!         |                       ^                                |
//!         +--FilterAddRemove------|-------------------------------+
//!                                 +------------snapshot------------+
//! ```
//!
//! The view never changes its cache on its own initiative: toggling a filter
//! only produces a [`Command`]; the cache moves when the backend's
//! [`SyncEvent`] comes back.

use std::collections::HashMap;

use chrono::{DateTime, Local, TimeZone};

use super::cache::{CatalogCache, UpdateOutcome};
use super::commands::Command;
use super::context::ViewContext;
use super::events::{RulesCountInfo, SyncEvent};
use crate::catalog::{CatalogSnapshot, FilterId, GroupId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No snapshot received yet.
    Uninitialized,
    /// Cache mirrors the backend; incremental events apply.
    Synced,
    /// Filters were added or removed; the cache is stale until the next snapshot.
    AwaitingFullRefresh,
}

/// What the presentation layer must update after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewEffect {
    /// Re-render every category from the cache.
    RenderAll,
    /// Ask the backend for a fresh snapshot.
    RequestSnapshot,
    FilterToggled {
        filter_id: FilterId,
        enabled: bool,
        inserted: bool,
    },
    GroupSummary {
        group_id: GroupId,
        enabled_count: usize,
    },
    DownloadIndicator {
        filter_id: FilterId,
        group_id: GroupId,
        filter_active: bool,
        group_active: bool,
    },
    LastUpdateTime(i64),
    RulesCount(RulesCountInfo),
    SelfPromoToggled(bool),
}

pub struct CatalogView {
    state: SyncState,
    cache: CatalogCache,
    context: ViewContext,
    /// In-flight downloads, filter id -> group id. View-only.
    downloading: HashMap<FilterId, GroupId>,
    rules_info: Option<RulesCountInfo>,
}

impl CatalogView {
    pub fn new(context: ViewContext) -> Self {
        Self {
            state: SyncState::Uninitialized,
            cache: CatalogCache::new(),
            context,
            downloading: HashMap::new(),
            rules_info: None,
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn cache(&self) -> &CatalogCache {
        &self.cache
    }

    pub fn context(&self) -> &ViewContext {
        &self.context
    }

    pub fn rules_info(&self) -> Option<RulesCountInfo> {
        self.rules_info
    }

    /// Whether a snapshot fetch is outstanding or due.
    pub fn needs_snapshot(&self) -> bool {
        self.state != SyncState::Synced
    }

    /// Replace the cache with a full snapshot. Valid from every state.
    pub fn apply_snapshot(&mut self, snapshot: CatalogSnapshot) -> Vec<ViewEffect> {
        let previous = self.state;
        self.cache.initialize_from(snapshot);
        self.state = SyncState::Synced;

        tracing::debug!(
            from = ?previous,
            filters = self.cache.len(),
            categories = self.cache.categories().len(),
            "Applied catalog snapshot"
        );

        vec![
            ViewEffect::RenderAll,
            ViewEffect::LastUpdateTime(self.cache.last_update_time()),
        ]
    }

    /// Apply one backend event.
    pub fn handle_event(&mut self, event: SyncEvent) -> Vec<ViewEffect> {
        match event {
            SyncEvent::FilterStateChanged(filter) => {
                if filter.filter_id == self.context.self_promo_filter_id() {
                    self.context.set_self_promo_enabled(filter.enabled);
                    return vec![ViewEffect::SelfPromoToggled(filter.enabled)];
                }
                if self.state != SyncState::Synced {
                    tracing::debug!(
                        filter_id = filter.filter_id,
                        state = ?self.state,
                        "Cache not synced, state change left to the next snapshot"
                    );
                    return Vec::new();
                }

                let filter_id = filter.filter_id;
                let group_id = filter.group_id;
                let enabled = filter.enabled;
                let outcome = self.cache.update_enabled(filter, enabled);
                vec![
                    ViewEffect::FilterToggled {
                        filter_id,
                        enabled,
                        inserted: outcome == UpdateOutcome::Inserted,
                    },
                    ViewEffect::GroupSummary {
                        group_id,
                        enabled_count: self.cache.enabled_count(group_id),
                    },
                ]
            }
            SyncEvent::FilterAddRemove => {
                if self.state == SyncState::AwaitingFullRefresh {
                    return Vec::new();
                }
                self.state = SyncState::AwaitingFullRefresh;
                vec![ViewEffect::RequestSnapshot]
            }
            SyncEvent::DownloadStarted {
                filter_id,
                group_id,
            } => {
                self.downloading.insert(filter_id, group_id);
                vec![ViewEffect::DownloadIndicator {
                    filter_id,
                    group_id,
                    filter_active: true,
                    group_active: true,
                }]
            }
            SyncEvent::DownloadFinished {
                filter_id,
                group_id,
                last_update_time,
            } => {
                self.downloading.remove(&filter_id);
                let mut effects = vec![ViewEffect::DownloadIndicator {
                    filter_id,
                    group_id,
                    filter_active: false,
                    group_active: self.is_group_downloading(group_id),
                }];
                match last_update_time {
                    Some(t) => {
                        if self.cache.bump_last_update_time(t) {
                            effects.push(ViewEffect::LastUpdateTime(t));
                        }
                    }
                    None => tracing::debug!(filter_id, "Filter download failed"),
                }
                effects
            }
            SyncEvent::RulesCountUpdated(info) => {
                self.rules_info = Some(info);
                vec![ViewEffect::RulesCount(info)]
            }
        }
    }

    pub fn is_downloading(&self, filter_id: FilterId) -> bool {
        self.downloading.contains_key(&filter_id)
    }

    /// A group shows progress while any of its filters is downloading.
    pub fn is_group_downloading(&self, group_id: GroupId) -> bool {
        self.downloading.values().any(|g| *g == group_id)
    }

    /// Watermark rendered as `"D MMMM YYYY HH:mm"` in local time, lower-cased.
    /// Month names are English. Empty when unset.
    pub fn last_update_text(&self) -> String {
        format_watermark(self.cache.last_update_time(), &Local)
    }

    // ========================================================================
    // Outgoing commands
    // ========================================================================
    //
    // None of these touch the cache.

    pub fn toggle_filter(&self, filter_id: FilterId, enabled: bool) -> Command {
        if enabled {
            Command::EnableFilter { filter_id }
        } else {
            Command::DisableFilter { filter_id }
        }
    }

    pub fn toggle_group(&self, group_id: GroupId, enabled: bool) -> Command {
        if enabled {
            Command::EnableGroup { group_id }
        } else {
            Command::DisableGroup { group_id }
        }
    }

    /// Toggle the hidden self-promo filter ("allow acceptable ads").
    pub fn toggle_self_promo(&self, enabled: bool) -> Command {
        self.toggle_filter(self.context.self_promo_filter_id(), enabled)
    }

    /// Flip a boolean user setting. Settings have no backend event, so the
    /// context records the new value right away.
    pub fn change_setting(&mut self, key: &str, value: bool) -> Command {
        self.context.set_setting(key, value);
        Command::ChangeUserSetting {
            key: key.to_owned(),
            value,
        }
    }
}

fn format_watermark<Tz: TimeZone>(millis: i64, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    if millis <= 0 {
        return String::new();
    }
    match DateTime::from_timestamp_millis(millis) {
        Some(dt) => dt
            .with_timezone(tz)
            .format("%-d %B %Y %H:%M")
            .to_string()
            .to_lowercase(),
        None => String::new(),
    }
}
