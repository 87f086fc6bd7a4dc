use thiserror::Error;

use super::source::{FilterListSource, SourceError};
use crate::catalog::tags::{index_tags, tag_details};
use crate::catalog::{
    build_snapshot, recommended_filter_ids_by_group, CatalogMetadata, CatalogSnapshot, Filter,
    FilterId, GroupId, TagId, TagPolicy,
};
use crate::config::Config;
use crate::storage::{Database, ImportSummary, NewCustomFilter};
use crate::sync::{
    Command, CustomFilterError, CustomFilterInfo, CustomFilterOutcome, EventHandle, Reply,
    RulesCountInfo, StartupState, SyncEvent,
};
use crate::util::validate_list_url;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("unknown filter: {0}")]
    UnknownFilter(FilterId),

    #[error("filter {0} is not a custom filter and cannot be removed")]
    NotRemovable(FilterId),

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

// ============================================================================
// Settings
// ============================================================================

/// The slice of [`Config`] the backend acts on.
#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub self_promo_filter_id: FilterId,
    pub locale: String,
    pub recommended_tag_id: TagId,
    pub excluded_tag_ids: Vec<TagId>,
    pub filter_url_template: String,
    pub rules_limit: u64,
}

impl From<&Config> for BackendSettings {
    fn from(config: &Config) -> Self {
        Self {
            self_promo_filter_id: config.self_promo_filter_id,
            locale: config.locale.clone(),
            recommended_tag_id: config.recommended_tag_id,
            excluded_tag_ids: config.excluded_tag_ids.clone(),
            filter_url_template: config.filter_url_template.clone(),
            rules_limit: config.rules_limit,
        }
    }
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl BackendSettings {
    fn filter_url(&self, filter_id: FilterId) -> String {
        self.filter_url_template
            .replace("{filter_id}", &filter_id.to_string())
    }
}

// ============================================================================
// Backend
// ============================================================================

/// Owner of the filter stores. Every state change is committed to the
/// database first and announced on the event channel second.
pub struct Backend<S> {
    db: Database,
    source: S,
    events: EventHandle,
    settings: BackendSettings,
}

impl<S: FilterListSource> Backend<S> {
    pub fn new(db: Database, source: S, events: EventHandle, settings: BackendSettings) -> Self {
        Self {
            db,
            source,
            events,
            settings,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn settings(&self) -> &BackendSettings {
        &self.settings
    }

    /// Run one command and produce its reply.
    ///
    /// # Errors
    ///
    /// Returns whatever the command's handler returns. A failed custom filter
    /// add is not an error: it comes back as `Reply::CustomFilter(Err(_))`.
    pub async fn dispatch(&self, command: Command) -> Result<Reply, BackendError> {
        tracing::debug!(command = command.type_name(), "Dispatching command");
        match command {
            Command::InitializeOptionsPage => Ok(Reply::Startup(self.startup_state().await?)),
            Command::GetFiltersMetadata => Ok(Reply::Snapshot(self.filters_metadata().await?)),
            Command::EnableFilter { filter_id } => {
                self.enable_filter(filter_id).await?;
                Ok(Reply::Ack)
            }
            Command::DisableFilter { filter_id } => {
                self.disable_filter(filter_id).await?;
                Ok(Reply::Ack)
            }
            Command::EnableGroup { group_id } => {
                self.enable_group(group_id).await?;
                Ok(Reply::Ack)
            }
            Command::DisableGroup { group_id } => {
                self.disable_group(group_id).await?;
                Ok(Reply::Ack)
            }
            Command::RemoveFilter { filter_id } => {
                self.remove_filter(filter_id).await?;
                Ok(Reply::Ack)
            }
            Command::CheckFiltersUpdate => {
                self.check_filters_update().await?;
                Ok(Reply::Ack)
            }
            Command::ChangeUserSetting { key, value } => {
                self.change_user_setting(&key, value).await?;
                Ok(Reply::Ack)
            }
            Command::LoadCustomFilterInfo { url } => {
                Ok(Reply::CustomFilter(self.load_custom_filter_info(&url).await))
            }
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Classify the current stores into a `{filters, categories}` snapshot.
    pub async fn filters_metadata(&self) -> Result<CatalogSnapshot, BackendError> {
        let filters = self.db.get_filters().await?;
        let groups = self.db.get_groups().await?;
        let tags = self.db.get_tags().await?;

        let policy = TagPolicy::new(
            &tags,
            self.settings.recommended_tag_id,
            &self.settings.excluded_tag_ids,
            Some(&self.settings.locale),
        );

        Ok(build_snapshot(
            &filters,
            &groups,
            &tags,
            self.settings.self_promo_filter_id,
            &policy,
        ))
    }

    pub async fn startup_state(&self) -> Result<StartupState, BackendError> {
        Ok(StartupState {
            settings: self.db.get_settings().await?,
            enabled_filter_ids: self.db.enabled_filter_ids().await?,
            self_promo_filter_id: self.settings.self_promo_filter_id,
        })
    }

    // ========================================================================
    // Filter State
    // ========================================================================

    /// Enable a filter. Enabling an enabled filter emits nothing.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::UnknownFilter`] if the id is unknown or the
    /// filter was removed, [`BackendError::Storage`] if the database fails.
    pub async fn enable_filter(&self, filter_id: FilterId) -> Result<(), BackendError> {
        self.set_filter_state(filter_id, true).await.map(|_| ())
    }

    pub async fn disable_filter(&self, filter_id: FilterId) -> Result<(), BackendError> {
        self.set_filter_state(filter_id, false).await.map(|_| ())
    }

    /// Enable the group's recommended filters. Returns the ids that changed.
    pub async fn enable_group(&self, group_id: GroupId) -> Result<Vec<FilterId>, BackendError> {
        let snapshot = self.filters_metadata().await?;
        let mut changed = Vec::new();
        for filter_id in recommended_filter_ids_by_group(&snapshot, group_id) {
            if self.set_filter_state(filter_id, true).await? {
                changed.push(filter_id);
            }
        }
        tracing::info!(group_id, enabled = changed.len(), "Enabled recommended filters of group");
        Ok(changed)
    }

    /// Disable every enabled filter of the group. Returns the ids that changed.
    pub async fn disable_group(&self, group_id: GroupId) -> Result<Vec<FilterId>, BackendError> {
        let targets: Vec<FilterId> = self
            .db
            .get_filters()
            .await?
            .into_iter()
            .filter(|f| f.group_id == group_id && f.enabled && !f.removed)
            .map(|f| f.filter_id)
            .collect();

        let mut changed = Vec::with_capacity(targets.len());
        for filter_id in targets {
            if self.set_filter_state(filter_id, false).await? {
                changed.push(filter_id);
            }
        }
        tracing::info!(group_id, disabled = changed.len(), "Disabled filters of group");
        Ok(changed)
    }

    /// Persist the flag and announce the full record. Returns `false` when
    /// the filter already had that state; nothing is emitted then.
    async fn set_filter_state(
        &self,
        filter_id: FilterId,
        enabled: bool,
    ) -> Result<bool, BackendError> {
        let mut filter = self.live_filter(filter_id).await?;
        if filter.enabled == enabled {
            tracing::debug!(filter_id, enabled, "Filter already in requested state");
            return Ok(false);
        }

        if !self.db.set_filter_enabled(filter_id, enabled).await? {
            return Err(BackendError::UnknownFilter(filter_id));
        }
        filter.enabled = enabled;

        let tags = self.db.get_tags().await?;
        filter.tags_details = tag_details(&filter.tags, &index_tags(&tags));

        tracing::info!(filter_id, enabled, "Filter state changed");
        self.events.emit(SyncEvent::FilterStateChanged(filter)).await;
        Ok(true)
    }

    /// A stored, not removed filter.
    async fn live_filter(&self, filter_id: FilterId) -> Result<Filter, BackendError> {
        match self.db.get_filter(filter_id).await? {
            Some(filter) if !filter.removed => Ok(filter),
            _ => {
                tracing::debug!(filter_id, "Unknown filter id");
                Err(BackendError::UnknownFilter(filter_id))
            }
        }
    }

    // ========================================================================
    // Catalog Membership
    // ========================================================================

    /// Replace catalog metadata. The view is told to rebuild.
    pub async fn import_metadata(
        &self,
        metadata: &CatalogMetadata,
    ) -> Result<ImportSummary, BackendError> {
        let summary = self.db.import_metadata(metadata).await?;
        self.events.emit(SyncEvent::FilterAddRemove).await;
        Ok(summary)
    }

    /// Remove a custom filter.
    ///
    /// # Errors
    ///
    /// - [`BackendError::UnknownFilter`] - No such filter, or already removed
    /// - [`BackendError::NotRemovable`] - The filter comes from the catalog
    /// - [`BackendError::Storage`] - Database failure
    pub async fn remove_filter(&self, filter_id: FilterId) -> Result<(), BackendError> {
        let filter = self.live_filter(filter_id).await?;
        if !filter.is_custom() {
            return Err(BackendError::NotRemovable(filter_id));
        }

        self.db.mark_filter_removed(filter_id).await?;
        tracing::info!(filter_id, "Removed custom filter");
        self.events.emit(SyncEvent::FilterAddRemove).await;
        Ok(())
    }

    /// Probe a user-supplied list and store it, disabled, in the custom group.
    /// Nothing is stored when any step fails.
    pub async fn load_custom_filter_info(&self, url: &str) -> CustomFilterOutcome {
        let url = validate_list_url(url)
            .map_err(|e| CustomFilterError::InvalidUrl(e.to_string()))?
            .to_string();

        let info = self.source.fetch_info(&url).await.map_err(|e| {
            tracing::warn!(url = %url, error = %e, "Custom filter list could not be loaded");
            match e {
                SourceError::InvalidUrl(msg) => CustomFilterError::InvalidUrl(msg),
                SourceError::NotAFilterList => CustomFilterError::NotAFilterList,
                other => CustomFilterError::Unreachable(other.to_string()),
            }
        })?;

        let record = NewCustomFilter {
            name: info.title.unwrap_or_else(|| url.clone()),
            description: info.description,
            homepage: info.homepage,
            version: info.version,
            rules_count: info.rules_count,
            url,
        };

        let filter_id = self
            .db
            .upsert_custom_filter(&record)
            .await
            .map_err(|e| CustomFilterError::Storage(e.to_string()))?;

        tracing::info!(filter_id, url = %record.url, "Added custom filter");
        self.events.emit(SyncEvent::FilterAddRemove).await;

        Ok(CustomFilterInfo {
            filter_id,
            name: record.name,
            description: record.description,
            version: record.version,
            rules_count: record.rules_count,
            homepage: record.homepage,
            custom_url: record.url,
        })
    }

    // ========================================================================
    // Updates
    // ========================================================================

    /// Re-probe every enabled filter, then publish the enabled rules total.
    ///
    /// Each filter is bracketed by `DownloadStarted`/`DownloadFinished`; a
    /// failed download leaves the stored record untouched.
    ///
    /// # Errors
    ///
    /// Only database failures while listing filters or summing rules are
    /// returned. Per-filter download and storage failures are logged and
    /// reported through `DownloadFinished`.
    pub async fn check_filters_update(&self) -> Result<RulesCountInfo, BackendError> {
        let enabled: Vec<Filter> = self
            .db
            .get_filters()
            .await?
            .into_iter()
            .filter(|f| f.enabled && !f.removed)
            .collect();

        let mut updated = 0usize;
        for filter in &enabled {
            let (filter_id, group_id) = (filter.filter_id, filter.group_id);
            self.events
                .emit(SyncEvent::DownloadStarted {
                    filter_id,
                    group_id,
                })
                .await;

            let last_update_time = self.update_filter(filter).await;
            if last_update_time.is_some() {
                updated += 1;
            }

            self.events
                .emit(SyncEvent::DownloadFinished {
                    filter_id,
                    group_id,
                    last_update_time,
                })
                .await;
        }

        let rules_count = self.db.enabled_rules_count().await?;
        let info = RulesCountInfo {
            rules_count,
            rules_over_limit: rules_count > self.settings.rules_limit,
        };
        tracing::info!(
            checked = enabled.len(),
            updated,
            rules_count,
            over_limit = info.rules_over_limit,
            "Filter update check finished"
        );
        self.events.emit(SyncEvent::RulesCountUpdated(info)).await;
        Ok(info)
    }

    /// Download and record one filter. Returns the new update time.
    async fn update_filter(&self, filter: &Filter) -> Option<i64> {
        let filter_id = filter.filter_id;
        let url = filter
            .custom_url
            .clone()
            .unwrap_or_else(|| self.settings.filter_url(filter_id));

        let info = match self.source.fetch_info(&url).await {
            Ok(info) => info,
            Err(e) => {
                tracing::warn!(filter_id, url = %url, error = %e, "Filter download failed");
                return None;
            }
        };

        let version = if info.version.is_empty() {
            filter.version.as_str()
        } else {
            info.version.as_str()
        };
        let now = chrono::Utc::now().timestamp_millis();

        match self
            .db
            .record_filter_update(filter_id, version, info.rules_count, now)
            .await
        {
            Ok(()) => {
                tracing::debug!(filter_id, version, rules = info.rules_count, "Filter updated");
                Some(now)
            }
            Err(e) => {
                tracing::warn!(filter_id, error = %e, "Failed to record filter update");
                None
            }
        }
    }

    // ========================================================================
    // Settings
    // ========================================================================

    pub async fn change_user_setting(&self, key: &str, value: bool) -> Result<(), BackendError> {
        self.db.set_setting(key, value).await?;
        tracing::info!(key, value, "User setting changed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::StaticListSource;
    use crate::catalog::{Group, Tag};
    use crate::sync::event_channel;
    use pretty_assertions::assert_eq;
    use tokio::sync::mpsc;

    const LIST: &str = "! Title: Fresh\n! Version: 9.9\n||a^\n||b^\n";

    fn catalog_filter(id: FilterId, group: GroupId, tags: &[TagId]) -> Filter {
        let mut f = Filter::new(id, group);
        f.name = format!("Filter {id}");
        f.version = "1.0".into();
        f.tags = tags.to_vec();
        f
    }

    fn metadata() -> CatalogMetadata {
        CatalogMetadata {
            groups: vec![Group {
                group_id: 1,
                group_name: "Ad Blocking".into(),
                display_number: 1,
            }],
            tags: vec![
                Tag {
                    tag_id: 10,
                    keyword: "recommended".into(),
                    description: String::new(),
                },
                Tag {
                    tag_id: 3,
                    keyword: "purpose:ads".into(),
                    description: String::new(),
                },
            ],
            filters: vec![
                catalog_filter(2, 1, &[10, 3]),
                catalog_filter(3, 1, &[3]),
                catalog_filter(10, 1, &[10]),
            ],
        }
    }

    async fn backend(
        source: StaticListSource,
    ) -> (Backend<StaticListSource>, mpsc::Receiver<SyncEvent>) {
        let db = Database::open(":memory:").await.unwrap();
        db.import_metadata(&metadata()).await.unwrap();
        let (events, rx) = event_channel(64);
        let settings = BackendSettings {
            filter_url_template: "https://lists.example/{filter_id}.txt".into(),
            rules_limit: 3,
            ..BackendSettings::default()
        };
        (Backend::new(db, source, events, settings), rx)
    }

    fn drain(rx: &mut mpsc::Receiver<SyncEvent>) -> Vec<SyncEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    #[tokio::test]
    async fn test_snapshot_hides_self_promo_and_splits_group() {
        let (backend, _rx) = backend(StaticListSource::new()).await;
        let snapshot = backend.filters_metadata().await.unwrap();

        let ids: Vec<_> = snapshot.filters.iter().map(|f| f.filter_id).collect();
        assert_eq!(ids, vec![2, 3]);

        let group = snapshot.category(1).unwrap();
        assert_eq!(group.filters.recommended_filters[0].filter_id, 2);
        assert_eq!(group.filters.other_filters[0].filter_id, 3);
        assert_eq!(snapshot.categories.last().unwrap().group_name, "Custom");
    }

    #[tokio::test]
    async fn test_enable_filter_emits_full_record() {
        let (backend, mut rx) = backend(StaticListSource::new()).await;
        backend.enable_filter(3).await.unwrap();

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        let SyncEvent::FilterStateChanged(filter) = &events[0] else {
            panic!("unexpected event {:?}", events[0]);
        };
        assert_eq!(filter.filter_id, 3);
        assert!(filter.enabled);
        assert_eq!(filter.tags_details[0].keyword, "ads");

        // Same state again: no event
        backend.enable_filter(3).await.unwrap();
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_unknown_filter_is_an_error() {
        let (backend, mut rx) = backend(StaticListSource::new()).await;
        assert!(matches!(
            backend.disable_filter(404).await,
            Err(BackendError::UnknownFilter(404))
        ));
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_enable_group_enables_only_recommended() {
        let (backend, mut rx) = backend(StaticListSource::new()).await;
        let changed = backend.enable_group(1).await.unwrap();
        assert_eq!(changed, vec![2]);
        assert_eq!(drain(&mut rx).len(), 1);

        backend.enable_filter(3).await.unwrap();
        drain(&mut rx);

        let mut disabled = backend.disable_group(1).await.unwrap();
        disabled.sort_unstable();
        assert_eq!(disabled, vec![2, 3]);
        assert_eq!(drain(&mut rx).len(), 2);
    }

    #[tokio::test]
    async fn test_catalog_filter_not_removable() {
        let (backend, _rx) = backend(StaticListSource::new()).await;
        assert!(matches!(
            backend.remove_filter(2).await,
            Err(BackendError::NotRemovable(2))
        ));
    }

    #[tokio::test]
    async fn test_custom_filter_add_and_remove() {
        let mut source = StaticListSource::new();
        source.insert("https://lists.example/mine.txt", LIST);
        let (backend, mut rx) = backend(source).await;

        let info = backend
            .load_custom_filter_info("https://lists.example/mine.txt")
            .await
            .unwrap();
        assert_eq!(info.name, "Fresh");
        assert_eq!(info.version, "9.9");
        assert_eq!(info.rules_count, 2);
        assert!(info.filter_id >= crate::storage::FIRST_CUSTOM_FILTER_ID);
        assert_eq!(drain(&mut rx), vec![SyncEvent::FilterAddRemove]);

        let snapshot = backend.filters_metadata().await.unwrap();
        let custom = snapshot.category(0).unwrap();
        assert_eq!(custom.filters.recommended_filters.len(), 1);

        backend.remove_filter(info.filter_id).await.unwrap();
        assert_eq!(drain(&mut rx), vec![SyncEvent::FilterAddRemove]);
        let snapshot = backend.filters_metadata().await.unwrap();
        assert!(snapshot.category(0).unwrap().filters.is_empty());

        // Removed filters are gone for good
        assert!(matches!(
            backend.remove_filter(info.filter_id).await,
            Err(BackendError::UnknownFilter(_))
        ));
    }

    #[tokio::test]
    async fn test_custom_filter_failures_store_nothing() {
        let mut source = StaticListSource::new();
        source.insert("https://lists.example/page.html", "<html></html>");
        let (backend, mut rx) = backend(source).await;

        assert!(matches!(
            backend.load_custom_filter_info("http://localhost/x.txt").await,
            Err(CustomFilterError::InvalidUrl(_))
        ));
        assert!(matches!(
            backend
                .load_custom_filter_info("https://lists.example/page.html")
                .await,
            Err(CustomFilterError::NotAFilterList)
        ));
        assert!(matches!(
            backend
                .load_custom_filter_info("https://lists.example/missing.txt")
                .await,
            Err(CustomFilterError::Unreachable(_))
        ));

        assert!(drain(&mut rx).is_empty());
        let snapshot = backend.filters_metadata().await.unwrap();
        assert!(snapshot.category(0).unwrap().filters.is_empty());
    }

    #[tokio::test]
    async fn test_check_update_brackets_downloads() {
        let mut source = StaticListSource::new();
        source.insert("https://lists.example/2.txt", LIST);
        let (backend, mut rx) = backend(source).await;
        backend.enable_filter(2).await.unwrap();
        backend.enable_filter(3).await.unwrap();
        drain(&mut rx);

        let info = backend.check_filters_update().await.unwrap();
        assert_eq!(
            info,
            RulesCountInfo {
                rules_count: 2,
                rules_over_limit: false
            }
        );

        let events = drain(&mut rx);
        assert_eq!(events.len(), 5);
        assert_eq!(
            events[0],
            SyncEvent::DownloadStarted {
                filter_id: 2,
                group_id: 1
            }
        );
        assert!(matches!(
            events[1],
            SyncEvent::DownloadFinished {
                filter_id: 2,
                last_update_time: Some(_),
                ..
            }
        ));
        assert!(matches!(
            events[3],
            SyncEvent::DownloadFinished {
                filter_id: 3,
                last_update_time: None,
                ..
            }
        ));
        assert_eq!(events[4], SyncEvent::RulesCountUpdated(info));

        let stored = backend.database().get_filter(2).await.unwrap().unwrap();
        assert_eq!(stored.version, "9.9");
        assert!(stored.last_update_time.is_some());
        let untouched = backend.database().get_filter(3).await.unwrap().unwrap();
        assert_eq!(untouched.version, "1.0");
        assert!(untouched.last_update_time.is_none());
    }

    #[tokio::test]
    async fn test_rules_over_limit() {
        let mut source = StaticListSource::new();
        source.insert("https://lists.example/2.txt", LIST);
        source.insert("https://lists.example/3.txt", LIST);
        let (backend, _rx) = backend(source).await;
        backend.enable_filter(2).await.unwrap();
        backend.enable_filter(3).await.unwrap();

        let info = backend.check_filters_update().await.unwrap();
        assert_eq!(info.rules_count, 4);
        assert!(info.rules_over_limit);
    }

    #[tokio::test]
    async fn test_startup_state_and_settings() {
        let (backend, _rx) = backend(StaticListSource::new()).await;
        backend.enable_filter(10).await.unwrap();
        backend
            .dispatch(Command::ChangeUserSetting {
                key: "launch-at-login".into(),
                value: true,
            })
            .await
            .unwrap();

        let Reply::Startup(state) = backend.dispatch(Command::InitializeOptionsPage).await.unwrap()
        else {
            panic!("expected startup reply");
        };
        assert_eq!(state.enabled_filter_ids, vec![10]);
        assert_eq!(state.self_promo_filter_id, 10);
        assert_eq!(state.settings.get("launch-at-login"), Some(&true));
    }

    #[tokio::test]
    async fn test_dispatch_custom_filter_reply() {
        let (backend, _rx) = backend(StaticListSource::new()).await;
        let reply = backend
            .dispatch(Command::LoadCustomFilterInfo {
                url: "ftp://lists.example/a.txt".into(),
            })
            .await
            .unwrap();
        assert!(matches!(
            reply,
            Reply::CustomFilter(Err(CustomFilterError::InvalidUrl(_)))
        ));
    }
}
