//! Display normalization of tag keywords.
//!
//! `reference:` tags are internal bookkeeping and never reach the view.
//! `lang:` tags keep their prefix so the view can tell them apart; every
//! other tag loses everything up to and including its first `:`.

use std::collections::HashMap;

use super::types::{Tag, TagDetail, TagId};

/// Keyword prefix of tags hidden from the view entirely.
pub const REFERENCE_PREFIX: &str = "reference:";
/// Keyword prefix of language tags, shown unchanged.
pub const LANG_PREFIX: &str = "lang:";

/// Normalize a tag for display, or `None` when it must be hidden.
///
/// Works on a copy: the canonical tag is never modified. A keyword with no
/// `:` at all is returned as-is.
pub fn normalize(tag: &Tag) -> Option<TagDetail> {
    if tag.keyword.starts_with(REFERENCE_PREFIX) {
        return None;
    }

    let keyword = if tag.keyword.starts_with(LANG_PREFIX) {
        tag.keyword.clone()
    } else {
        match tag.keyword.split_once(':') {
            Some((_, rest)) => rest.to_owned(),
            None => tag.keyword.clone(),
        }
    };

    Some(TagDetail {
        tag_id: tag.tag_id,
        keyword,
        description: tag.description.clone(),
    })
}

/// Lookup table over the tag store. The first record wins on duplicate ids.
pub(crate) fn index_tags(tags: &[Tag]) -> HashMap<TagId, &Tag> {
    let mut index = HashMap::with_capacity(tags.len());
    for tag in tags {
        index.entry(tag.tag_id).or_insert(tag);
    }
    index
}

/// Resolve a filter's tag ids into display details, preserving order.
///
/// Ids missing from the store are skipped silently.
pub(crate) fn tag_details(tag_ids: &[TagId], index: &HashMap<TagId, &Tag>) -> Vec<TagDetail> {
    tag_ids
        .iter()
        .filter_map(|id| index.get(id))
        .filter_map(|tag| normalize(tag))
        .collect()
}

/// Language subtags (`en` for `lang:en`) carried by a tag list.
pub(crate) fn languages<'a>(
    tag_ids: &'a [TagId],
    index: &'a HashMap<TagId, &Tag>,
) -> impl Iterator<Item = &'a str> + 'a {
    tag_ids
        .iter()
        .filter_map(|id| index.get(id))
        .filter_map(|tag| tag.keyword.strip_prefix(LANG_PREFIX))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(id: TagId, keyword: &str) -> Tag {
        Tag {
            tag_id: id,
            keyword: keyword.to_string(),
            description: format!("desc {}", id),
        }
    }

    #[test]
    fn test_reference_tag_is_dropped() {
        assert_eq!(normalize(&tag(1, "reference:101")), None);
    }

    #[test]
    fn test_lang_tag_unchanged() {
        let detail = normalize(&tag(2, "lang:en")).unwrap();
        assert_eq!(detail.keyword, "lang:en");
        assert_eq!(detail.description, "desc 2");
        assert_eq!(detail.tag_id, 2);
    }

    #[test]
    fn test_other_prefix_stripped() {
        let detail = normalize(&tag(3, "purpose:privacy")).unwrap();
        assert_eq!(detail.keyword, "privacy");
    }

    #[test]
    fn test_only_first_colon_stripped() {
        let detail = normalize(&tag(4, "platform:mobile:ios")).unwrap();
        assert_eq!(detail.keyword, "mobile:ios");
    }

    #[test]
    fn test_keyword_without_colon_kept() {
        let detail = normalize(&tag(5, "recommended")).unwrap();
        assert_eq!(detail.keyword, "recommended");
    }

    #[test]
    fn test_normalize_leaves_canonical_tag_untouched() {
        let canonical = tag(6, "purpose:ads");
        let _ = normalize(&canonical);
        let again = normalize(&canonical).unwrap();
        assert_eq!(canonical.keyword, "purpose:ads");
        assert_eq!(again.keyword, "ads");
    }

    #[test]
    fn test_tag_details_skips_dangling_ids_and_keeps_order() {
        let store = vec![tag(1, "lang:de"), tag(2, "purpose:ads"), tag(3, "reference:9")];
        let index = index_tags(&store);
        let details = tag_details(&[2, 42, 3, 1], &index);
        let keywords: Vec<&str> = details.iter().map(|d| d.keyword.as_str()).collect();
        assert_eq!(keywords, vec!["ads", "lang:de"]);
    }

    #[test]
    fn test_duplicate_tag_ids_first_wins() {
        let store = vec![tag(1, "purpose:first"), tag(1, "purpose:second")];
        let index = index_tags(&store);
        assert_eq!(tag_details(&[1], &index)[0].keyword, "first");
    }

    #[test]
    fn test_languages() {
        let store = vec![tag(1, "lang:de"), tag(2, "purpose:ads"), tag(3, "lang:fr")];
        let index = index_tags(&store);
        let langs: Vec<&str> = languages(&[1, 2, 3], &index).collect();
        assert_eq!(langs, vec!["de", "fr"]);
    }
}
