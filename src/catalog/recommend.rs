//! Recommended/other split of a group's filters.
//!
//! Which filters count as recommended is decided by a [`RecommendationPolicy`].
//! [`select`] only enforces the split contract: every group filter lands in
//! exactly one half, `other` keeps the group's order, `recommended` keeps the
//! policy's order.

use std::collections::{HashMap, HashSet};

use super::tags::{index_tags, languages};
use super::types::{CategoryFilters, Filter, FilterId, Tag, TagId};

/// Decides which of a group's filters are recommended.
pub trait RecommendationPolicy {
    /// Ids of the recommended filters, in the policy's own order.
    ///
    /// Ids not present in `group_filters` and repeated ids are ignored by
    /// [`select`].
    fn recommended(&self, group_filters: &[Filter]) -> Vec<FilterId>;
}

impl<P: RecommendationPolicy + ?Sized> RecommendationPolicy for &P {
    fn recommended(&self, group_filters: &[Filter]) -> Vec<FilterId> {
        (**self).recommended(group_filters)
    }
}

/// Split `group_filters` into recommended and other filters.
pub fn select(group_filters: &[Filter], policy: &impl RecommendationPolicy) -> CategoryFilters {
    let by_id: HashMap<FilterId, &Filter> =
        group_filters.iter().map(|f| (f.filter_id, f)).collect();

    let mut taken: HashSet<FilterId> = HashSet::new();
    let recommended_filters: Vec<Filter> = policy
        .recommended(group_filters)
        .into_iter()
        .filter_map(|id| by_id.get(&id).copied())
        .filter(|f| taken.insert(f.filter_id))
        .cloned()
        .collect();

    let other_filters = group_filters
        .iter()
        .filter(|f| !taken.contains(&f.filter_id))
        .cloned()
        .collect();

    CategoryFilters {
        recommended_filters,
        other_filters,
    }
}

// ============================================================================
// Policies
// ============================================================================

/// Tag-driven default policy.
///
/// A filter is recommended when it carries the recommended tag, none of the
/// excluded tags, and, if it is a language filter, a language matching the
/// configured locale.
#[derive(Debug, Clone)]
pub struct TagPolicy {
    recommended_tag_id: TagId,
    excluded_tag_ids: Vec<TagId>,
    language: Option<String>,
    tags: Vec<Tag>,
}

impl TagPolicy {
    pub fn new(
        tags: &[Tag],
        recommended_tag_id: TagId,
        excluded_tag_ids: &[TagId],
        locale: Option<&str>,
    ) -> Self {
        Self {
            recommended_tag_id,
            excluded_tag_ids: excluded_tag_ids.to_vec(),
            language: locale.and_then(language_subtag),
            tags: tags.to_vec(),
        }
    }

    fn is_recommended(&self, filter: &Filter, index: &HashMap<TagId, &Tag>) -> bool {
        if !filter.tags.contains(&self.recommended_tag_id) {
            return false;
        }
        if filter
            .tags
            .iter()
            .any(|id| self.excluded_tag_ids.contains(id))
        {
            return false;
        }

        let mut filter_languages = languages(&filter.tags, index).peekable();
        if filter_languages.peek().is_none() {
            return true;
        }
        match &self.language {
            Some(lang) => filter_languages.any(|l| l.eq_ignore_ascii_case(lang)),
            None => false,
        }
    }
}

impl RecommendationPolicy for TagPolicy {
    fn recommended(&self, group_filters: &[Filter]) -> Vec<FilterId> {
        let index = index_tags(&self.tags);
        group_filters
            .iter()
            .filter(|f| self.is_recommended(f, &index))
            .map(|f| f.filter_id)
            .collect()
    }
}

/// Primary language subtag of a locale: `"en-US"` and `"en_GB"` give `"en"`.
fn language_subtag(locale: &str) -> Option<String> {
    let lang = locale
        .split(['-', '_'])
        .next()
        .map(str::trim)
        .unwrap_or_default();
    if lang.is_empty() {
        None
    } else {
        Some(lang.to_ascii_lowercase())
    }
}

/// Precomputed recommended set. Its order is the recommended order.
#[derive(Debug, Clone, Default)]
pub struct RecommendedSet(pub Vec<FilterId>);

impl RecommendationPolicy for RecommendedSet {
    fn recommended(&self, group_filters: &[Filter]) -> Vec<FilterId> {
        let present: HashSet<FilterId> = group_filters.iter().map(|f| f.filter_id).collect();
        self.0
            .iter()
            .copied()
            .filter(|id| present.contains(id))
            .collect()
    }
}

/// Per-filter predicate, recommended order follows the group's order.
pub struct PredicatePolicy<F>(pub F);

impl<F: Fn(&Filter) -> bool> RecommendationPolicy for PredicatePolicy<F> {
    fn recommended(&self, group_filters: &[Filter]) -> Vec<FilterId> {
        group_filters
            .iter()
            .filter(|&f| (self.0)(f))
            .map(|f| f.filter_id)
            .collect()
    }
}
