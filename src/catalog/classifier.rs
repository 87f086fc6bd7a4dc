//! Builds the `{filters, categories}` snapshot answered to the view.

use super::recommend::{select, RecommendationPolicy};
use super::tags::{index_tags, tag_details};
use super::types::{
    CatalogSnapshot, Category, CategoryFilters, Filter, FilterId, Group, GroupId, Tag,
    CUSTOM_GROUP_DISPLAY_NUMBER, CUSTOM_GROUP_ID, CUSTOM_GROUP_NAME,
};

/// Classify the backend's filter, group and tag stores into a snapshot.
///
/// - Removed filters and the self-promo filter are left out.
/// - Every kept filter gets fresh `tags_details`; dangling tag ids are skipped.
/// - Categories follow `groups` order, the synthetic custom group is appended last.
/// - Custom filters are all recommended, their `other_filters` is always empty.
///
/// Pure: inputs are only read, identical inputs give identical output.
pub fn build_snapshot(
    all_filters: &[Filter],
    all_groups: &[Group],
    all_tags: &[Tag],
    self_promo_filter_id: FilterId,
    policy: &impl RecommendationPolicy,
) -> CatalogSnapshot {
    let tag_index = index_tags(all_tags);

    let filters: Vec<Filter> = all_filters
        .iter()
        .filter(|f| !f.removed && f.filter_id != self_promo_filter_id)
        .map(|f| {
            let mut filter = f.clone();
            filter.tags_details = tag_details(&f.tags, &tag_index);
            filter
        })
        .collect();

    let mut categories: Vec<Category> = Vec::with_capacity(all_groups.len() + 1);
    for group in all_groups {
        if group.group_id == CUSTOM_GROUP_ID {
            tracing::debug!("Group store contains the reserved custom group id, skipping");
            continue;
        }
        categories.push(Category {
            group_id: group.group_id,
            group_name: group.group_name.clone(),
            display_number: group.display_number,
            filters: select_by_group(group.group_id, &filters, policy),
        });
    }

    categories.push(Category {
        group_id: CUSTOM_GROUP_ID,
        group_name: CUSTOM_GROUP_NAME.to_string(),
        display_number: CUSTOM_GROUP_DISPLAY_NUMBER,
        filters: select_by_group(CUSTOM_GROUP_ID, &filters, policy),
    });

    tracing::debug!(
        filters = filters.len(),
        categories = categories.len(),
        "Built catalog snapshot"
    );

    CatalogSnapshot {
        filters,
        categories,
    }
}

/// Split the filters of one group. The custom group bypasses the policy.
fn select_by_group(
    group_id: GroupId,
    filters: &[Filter],
    policy: &impl RecommendationPolicy,
) -> CategoryFilters {
    let group_filters: Vec<Filter> = filters
        .iter()
        .filter(|f| f.group_id == group_id)
        .cloned()
        .collect();

    if group_id == CUSTOM_GROUP_ID {
        return CategoryFilters {
            recommended_filters: group_filters,
            other_filters: Vec::new(),
        };
    }

    select(&group_filters, policy)
}

/// Ids of a group's recommended filters, empty for an unknown group.
pub fn recommended_filter_ids_by_group(
    snapshot: &CatalogSnapshot,
    group_id: GroupId,
) -> Vec<FilterId> {
    snapshot
        .category(group_id)
        .map(|c| {
            c.filters
                .recommended_filters
                .iter()
                .map(|f| f.filter_id)
                .collect()
        })
        .unwrap_or_default()
}
