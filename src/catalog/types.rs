use serde::{Deserialize, Serialize};

/// Stable filter identifier.
pub type FilterId = i64;
/// Group (category) identifier.
pub type GroupId = i64;
/// Tag identifier.
pub type TagId = i64;

/// Synthetic group holding user-added filters. Never present in the group store.
pub const CUSTOM_GROUP_ID: GroupId = 0;
/// Display name of the synthetic custom group.
pub const CUSTOM_GROUP_NAME: &str = "Custom";
/// Sort key of the synthetic custom group (always rendered last).
pub const CUSTOM_GROUP_DISPLAY_NUMBER: i64 = 99;

// ============================================================================
// Store Records
// ============================================================================

/// Filter list metadata as held by the backend.
///
/// Only `filter_id` is required on the wire. Every other field defaults, so
/// a bare `{filterId, groupId, enabled}` state-change payload still
/// deserializes into a usable record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    pub filter_id: FilterId,
    #[serde(default)]
    pub group_id: GroupId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub homepage: String,
    #[serde(default)]
    pub version: String,
    /// Upstream modification time, milliseconds since the epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_updated: Option<i64>,
    /// Tag ids in store order.
    #[serde(default)]
    pub tags: Vec<TagId>,
    /// Display tags, populated by the classifier only. Not persisted.
    #[serde(default)]
    pub tags_details: Vec<TagDetail>,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub removed: bool,
    /// Subscription URL, present only for user-added filters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_url: Option<String>,
    /// Last successful download, milliseconds since the epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update_time: Option<i64>,
    #[serde(default)]
    pub rules_count: u64,
}

impl Filter {
    /// Minimal record with everything but identity and group defaulted.
    pub fn new(filter_id: FilterId, group_id: GroupId) -> Self {
        Self {
            filter_id,
            group_id,
            name: String::new(),
            description: String::new(),
            homepage: String::new(),
            version: String::new(),
            time_updated: None,
            tags: Vec::new(),
            tags_details: Vec::new(),
            enabled: false,
            removed: false,
            custom_url: None,
            last_update_time: None,
            rules_count: 0,
        }
    }

    pub fn is_custom(&self) -> bool {
        self.group_id == CUSTOM_GROUP_ID
    }
}

/// A group from the backend's static group store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub group_id: GroupId,
    pub group_name: String,
    #[serde(default)]
    pub display_number: i64,
}

/// Canonical tag record. `keyword` keeps its prefix (`lang:`, `purpose:`, `reference:` ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub tag_id: TagId,
    pub keyword: String,
    #[serde(default)]
    pub description: String,
}

/// A tag prepared for display. Always an owned copy of the canonical [`Tag`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagDetail {
    pub tag_id: TagId,
    pub keyword: String,
    #[serde(default)]
    pub description: String,
}

// ============================================================================
// Snapshot
// ============================================================================

/// Recommended/other split of a single category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryFilters {
    pub recommended_filters: Vec<Filter>,
    pub other_filters: Vec<Filter>,
}

impl CategoryFilters {
    /// Recommended filters first, then the others.
    pub fn iter(&self) -> impl Iterator<Item = &Filter> {
        self.recommended_filters
            .iter()
            .chain(self.other_filters.iter())
    }

    pub fn len(&self) -> usize {
        self.recommended_filters.len() + self.other_filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A group plus its classified filters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub group_id: GroupId,
    pub group_name: String,
    pub display_number: i64,
    pub filters: CategoryFilters,
}

impl Category {
    pub fn is_custom(&self) -> bool {
        self.group_id == CUSTOM_GROUP_ID
    }
}

/// Full `{filters, categories}` payload answered to a snapshot fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSnapshot {
    pub filters: Vec<Filter>,
    pub categories: Vec<Category>,
}

impl CatalogSnapshot {
    pub fn category(&self, group_id: GroupId) -> Option<&Category> {
        self.categories.iter().find(|c| c.group_id == group_id)
    }
}

/// Static catalog metadata document imported into the backend store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CatalogMetadata {
    pub groups: Vec<Group>,
    pub tags: Vec<Tag>,
    pub filters: Vec<Filter>,
}
