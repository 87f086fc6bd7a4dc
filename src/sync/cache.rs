//! View-side mirror of the backend catalog.
//!
//! Filters live in a single arena (`filters`); every other structure refers
//! to them by id, so a flag flipped through one lookup path is seen through
//! all of them. The cache is single-owner and not thread-safe: events are
//! applied one at a time, in arrival order.

use std::collections::HashMap;

use crate::catalog::{CatalogSnapshot, Category, Filter, FilterId, GroupId};

/// Category layout held by the cache. Filter membership is stored as ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedCategory {
    pub group_id: GroupId,
    pub group_name: String,
    pub display_number: i64,
    pub recommended: Vec<FilterId>,
    pub other: Vec<FilterId>,
}

/// What [`CatalogCache::update_enabled`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// A known filter had its flag set.
    Updated,
    /// The filter was unknown and has been appended.
    Inserted,
}

#[derive(Debug, Default)]
pub struct CatalogCache {
    filters: Vec<Filter>,
    by_id: HashMap<FilterId, usize>,
    categories: Vec<CachedCategory>,
    /// Watermark, milliseconds since the epoch. 0 means unset.
    last_update_time: i64,
}

impl CatalogCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole cache with a fresh snapshot.
    pub fn initialize_from(&mut self, snapshot: CatalogSnapshot) {
        self.initialize(snapshot.filters, snapshot.categories);
    }

    /// Replace filters and categories wholesale and recompute the watermark.
    ///
    /// A repeated filter id keeps its first occurrence.
    pub fn initialize(&mut self, filters: Vec<Filter>, categories: Vec<Category>) {
        let mut arena = Vec::with_capacity(filters.len());
        let mut by_id = HashMap::with_capacity(filters.len());
        let mut last_update_time = 0;

        for filter in filters {
            if by_id.contains_key(&filter.filter_id) {
                tracing::debug!(
                    filter_id = filter.filter_id,
                    "Duplicate filter in snapshot, ignoring"
                );
                continue;
            }
            last_update_time = last_update_time.max(filter.last_update_time.unwrap_or(0));
            by_id.insert(filter.filter_id, arena.len());
            arena.push(filter);
        }

        self.categories = categories
            .into_iter()
            .map(|c| CachedCategory {
                group_id: c.group_id,
                group_name: c.group_name,
                display_number: c.display_number,
                recommended: c
                    .filters
                    .recommended_filters
                    .iter()
                    .map(|f| f.filter_id)
                    .collect(),
                other: c.filters.other_filters.iter().map(|f| f.filter_id).collect(),
            })
            .collect();
        self.filters = arena;
        self.by_id = by_id;
        self.last_update_time = last_update_time;
    }

    /// Whether a filter is enabled. Unknown ids are reported as disabled.
    pub fn is_enabled(&self, filter_id: FilterId) -> bool {
        self.get(filter_id).is_some_and(|f| f.enabled)
    }

    /// Set the enabled flag of a known filter, or append an unknown one.
    pub fn update_enabled(&mut self, mut filter: Filter, enabled: bool) -> UpdateOutcome {
        if let Some(&pos) = self.by_id.get(&filter.filter_id) {
            self.filters[pos].enabled = enabled;
            return UpdateOutcome::Updated;
        }

        filter.enabled = enabled;
        self.by_id.insert(filter.filter_id, self.filters.len());
        self.filters.push(filter);
        UpdateOutcome::Inserted
    }

    /// Raise the watermark to `candidate` if it is newer. Returns whether it moved.
    pub fn bump_last_update_time(&mut self, candidate: i64) -> bool {
        if candidate > self.last_update_time {
            self.last_update_time = candidate;
            true
        } else {
            false
        }
    }

    pub fn last_update_time(&self) -> i64 {
        self.last_update_time
    }

    pub fn get(&self, filter_id: FilterId) -> Option<&Filter> {
        self.by_id.get(&filter_id).map(|&pos| &self.filters[pos])
    }

    pub fn contains(&self, filter_id: FilterId) -> bool {
        self.by_id.contains_key(&filter_id)
    }

    /// All known filters: snapshot order, then insertions in arrival order.
    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn categories(&self) -> &[CachedCategory] {
        &self.categories
    }

    pub fn category(&self, group_id: GroupId) -> Option<&CachedCategory> {
        self.categories.iter().find(|c| c.group_id == group_id)
    }

    /// Recommended filters of a category, empty for an unknown group.
    pub fn recommended_filters(&self, group_id: GroupId) -> impl Iterator<Item = &Filter> {
        self.category(group_id)
            .map(|c| c.recommended.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(|id| self.get(*id))
    }

    /// Non-recommended filters of a category, empty for an unknown group.
    pub fn other_filters(&self, group_id: GroupId) -> impl Iterator<Item = &Filter> {
        self.category(group_id)
            .map(|c| c.other.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(|id| self.get(*id))
    }

    /// Every known filter of a group, including ones inserted by events.
    pub fn filters_in_group(&self, group_id: GroupId) -> impl Iterator<Item = &Filter> {
        self.filters.iter().filter(move |f| f.group_id == group_id)
    }

    /// Number of enabled filters in a group, as shown on the group row.
    pub fn enabled_count(&self, group_id: GroupId) -> usize {
        self.filters_in_group(group_id).filter(|f| f.enabled).count()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CategoryFilters, CUSTOM_GROUP_ID};
    use pretty_assertions::assert_eq;

    fn filter(id: FilterId, group_id: GroupId, enabled: bool, updated: Option<i64>) -> Filter {
        let mut f = Filter::new(id, group_id);
        f.enabled = enabled;
        f.last_update_time = updated;
        f
    }

    fn snapshot() -> CatalogSnapshot {
        let f1 = filter(1, 2, true, Some(1_000));
        let f2 = filter(2, 2, false, None);
        let f3 = filter(1000, CUSTOM_GROUP_ID, true, Some(5_000));
        CatalogSnapshot {
            filters: vec![f1.clone(), f2.clone(), f3.clone()],
            categories: vec![
                Category {
                    group_id: 2,
                    group_name: "Privacy".to_string(),
                    display_number: 1,
                    filters: CategoryFilters {
                        recommended_filters: vec![f1],
                        other_filters: vec![f2],
                    },
                },
                Category {
                    group_id: CUSTOM_GROUP_ID,
                    group_name: "Custom".to_string(),
                    display_number: 99,
                    filters: CategoryFilters {
                        recommended_filters: vec![f3],
                        other_filters: vec![],
                    },
                },
            ],
        }
    }

    fn cache() -> CatalogCache {
        let mut cache = CatalogCache::new();
        cache.initialize_from(snapshot());
        cache
    }

    #[test]
    fn test_new_cache_is_empty() {
        let cache = CatalogCache::new();
        assert!(cache.is_empty());
        assert_eq!(cache.last_update_time(), 0);
        assert!(!cache.is_enabled(1));
    }

    #[test]
    fn test_initialize_indexes_and_computes_watermark() {
        let cache = cache();
        assert_eq!(cache.len(), 3);
        assert!(cache.is_enabled(1));
        assert!(!cache.is_enabled(2));
        assert_eq!(cache.last_update_time(), 5_000);
        assert_eq!(cache.categories().len(), 2);
    }

    #[test]
    fn test_unknown_id_is_disabled() {
        assert!(!cache().is_enabled(424242));
    }

    #[test]
    fn test_update_enabled_mutates_in_place() {
        let mut cache = cache();
        let outcome = cache.update_enabled(filter(2, 2, true, None), true);
        assert_eq!(outcome, UpdateOutcome::Updated);
        assert!(cache.is_enabled(2));
        assert_eq!(cache.len(), 3);

        // The change is visible through the category view as well.
        let other: Vec<bool> = cache.other_filters(2).map(|f| f.enabled).collect();
        assert_eq!(other, vec![true]);
    }

    #[test]
    fn test_update_enabled_uses_flag_not_payload() {
        let mut cache = cache();
        cache.update_enabled(filter(1, 2, true, None), false);
        assert!(!cache.is_enabled(1));
    }

    #[test]
    fn test_update_enabled_inserts_unknown_filter() {
        let mut cache = cache();
        let outcome = cache.update_enabled(filter(99, 2, false, None), true);
        assert_eq!(outcome, UpdateOutcome::Inserted);
        assert!(cache.is_enabled(99));
        assert!(cache.contains(99));
        assert_eq!(cache.filters().last().map(|f| f.filter_id), Some(99));
        assert_eq!(cache.enabled_count(2), 2);
    }

    #[test]
    fn test_update_enabled_twice_does_not_duplicate() {
        let mut cache = cache();
        cache.update_enabled(filter(99, 2, true, None), true);
        cache.update_enabled(filter(99, 2, false, None), false);
        assert_eq!(cache.filters().iter().filter(|f| f.filter_id == 99).count(), 1);
        assert!(!cache.is_enabled(99));
    }

    #[test]
    fn test_bump_last_update_time_is_monotonic() {
        let mut cache = cache();
        assert!(!cache.bump_last_update_time(10));
        assert_eq!(cache.last_update_time(), 5_000);
        assert!(cache.bump_last_update_time(9_000));
        assert_eq!(cache.last_update_time(), 9_000);
        assert!(!cache.bump_last_update_time(9_000));
        assert_eq!(cache.last_update_time(), 9_000);
    }

    #[test]
    fn test_reinitialize_replaces_everything() {
        let mut cache = cache();
        cache.update_enabled(filter(99, 2, true, None), true);
        cache.bump_last_update_time(50_000);

        cache.initialize(vec![filter(7, 3, true, Some(20))], vec![]);
        assert_eq!(cache.len(), 1);
        assert!(!cache.contains(99));
        assert!(cache.is_enabled(7));
        assert_eq!(cache.last_update_time(), 20);
    }

    #[test]
    fn test_duplicate_ids_keep_first() {
        let mut cache = CatalogCache::new();
        cache.initialize(vec![filter(1, 2, true, None), filter(1, 2, false, None)], vec![]);
        assert_eq!(cache.len(), 1);
        assert!(cache.is_enabled(1));
    }

    #[test]
    fn test_category_views() {
        let cache = cache();
        let recommended: Vec<FilterId> =
            cache.recommended_filters(2).map(|f| f.filter_id).collect();
        assert_eq!(recommended, vec![1]);
        let custom: Vec<FilterId> = cache
            .recommended_filters(CUSTOM_GROUP_ID)
            .map(|f| f.filter_id)
            .collect();
        assert_eq!(custom, vec![1000]);
        assert_eq!(cache.recommended_filters(77).count(), 0);
        assert_eq!(cache.enabled_count(2), 1);
        assert_eq!(cache.enabled_count(77), 0);
    }
}
