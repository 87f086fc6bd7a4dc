//! Filter catalog: metadata records and the backend-side classification.
//!
//! - [`types`] - Filter, group and tag records plus the snapshot shape
//! - [`tags`] - Display normalization of tag keywords
//! - [`recommend`] - Recommended/other split and the policies deciding it
//! - [`classifier`] - Snapshot construction from the backend stores

pub mod classifier;
pub mod recommend;
pub mod tags;
pub mod types;

pub use classifier::{build_snapshot, recommended_filter_ids_by_group};
pub use recommend::{select, PredicatePolicy, RecommendationPolicy, RecommendedSet, TagPolicy};
pub use tags::normalize;
pub use types::{
    CatalogMetadata, CatalogSnapshot, Category, CategoryFilters, Filter, FilterId, Group,
    GroupId, Tag, TagDetail, TagId, CUSTOM_GROUP_DISPLAY_NUMBER, CUSTOM_GROUP_ID,
    CUSTOM_GROUP_NAME,
};
