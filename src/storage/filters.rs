use anyhow::Result;
use sqlx::QueryBuilder;
use std::collections::HashMap;

use super::schema::Database;
use super::types::{filter_from_row, FilterRow, ImportSummary, NewCustomFilter};
use crate::catalog::{
    CatalogMetadata, Filter, FilterId, Group, Tag, TagId, CUSTOM_GROUP_ID,
};

/// Custom filter ids are allocated from here upwards.
pub const FIRST_CUSTOM_FILTER_ID: FilterId = 1000;

const FILTER_COLUMNS: &str = "filter_id, group_id, name, description, homepage, version, \
     time_updated, enabled, removed, custom_url, last_update_time, rules_count";

impl Database {
    // ========================================================================
    // Catalog Import
    // ========================================================================

    /// Upsert groups, tags and filters from a metadata document.
    ///
    /// Catalog fields are overwritten. `enabled`, `removed`,
    /// `last_update_time` and `rules_count` of already known filters are
    /// kept; new filters take them from the document. A filter's tag list is
    /// replaced as a whole, in document order.
    ///
    /// # Errors
    ///
    /// Returns an error if any statement fails. Everything runs in one
    /// transaction, so a failed import leaves the previous catalog intact.
    pub async fn import_metadata(&self, metadata: &CatalogMetadata) -> Result<ImportSummary> {
        const BATCH_SIZE: usize = 100;
        let mut tx = self.pool.begin().await?;

        for chunk in metadata.groups.chunks(BATCH_SIZE) {
            let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
                "INSERT INTO filter_groups (group_id, group_name, display_number) ",
            );
            builder.push_values(chunk, |mut b, group| {
                b.push_bind(group.group_id)
                    .push_bind(&group.group_name)
                    .push_bind(group.display_number);
            });
            builder.push(
                " ON CONFLICT(group_id) DO UPDATE SET group_name = excluded.group_name, \
                 display_number = excluded.display_number",
            );
            builder.build().execute(&mut *tx).await?;
        }

        for chunk in metadata.tags.chunks(BATCH_SIZE) {
            let mut builder: QueryBuilder<sqlx::Sqlite> =
                QueryBuilder::new("INSERT INTO tags (tag_id, keyword, description) ");
            builder.push_values(chunk, |mut b, tag| {
                b.push_bind(tag.tag_id)
                    .push_bind(&tag.keyword)
                    .push_bind(&tag.description);
            });
            builder.push(
                " ON CONFLICT(tag_id) DO UPDATE SET keyword = excluded.keyword, \
                 description = excluded.description",
            );
            builder.build().execute(&mut *tx).await?;
        }

        for filter in &metadata.filters {
            sqlx::query(
                r#"
                INSERT INTO filters (
                    filter_id, group_id, name, description, homepage, version,
                    time_updated, enabled, removed, last_update_time, rules_count
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(filter_id) DO UPDATE SET
                    group_id = excluded.group_id,
                    name = excluded.name,
                    description = excluded.description,
                    homepage = excluded.homepage,
                    version = excluded.version,
                    time_updated = excluded.time_updated
            "#,
            )
            .bind(filter.filter_id)
            .bind(filter.group_id)
            .bind(&filter.name)
            .bind(&filter.description)
            .bind(&filter.homepage)
            .bind(&filter.version)
            .bind(filter.time_updated)
            .bind(filter.enabled)
            .bind(filter.removed)
            .bind(filter.last_update_time)
            .bind(i64::try_from(filter.rules_count).unwrap_or(i64::MAX))
            .execute(&mut *tx)
            .await?;

            sqlx::query("DELETE FROM filter_tags WHERE filter_id = ?")
                .bind(filter.filter_id)
                .execute(&mut *tx)
                .await?;

            if !filter.tags.is_empty() {
                let mut builder: QueryBuilder<sqlx::Sqlite> =
                    QueryBuilder::new("INSERT INTO filter_tags (filter_id, position, tag_id) ");
                builder.push_values(filter.tags.iter().enumerate(), |mut b, (pos, tag_id)| {
                    b.push_bind(filter.filter_id)
                        .push_bind(pos as i64)
                        .push_bind(*tag_id);
                });
                builder.build().execute(&mut *tx).await?;
            }
        }

        tx.commit().await?;

        let summary = ImportSummary {
            groups: metadata.groups.len(),
            tags: metadata.tags.len(),
            filters: metadata.filters.len(),
        };
        tracing::info!(
            groups = summary.groups,
            tags = summary.tags,
            filters = summary.filters,
            "Imported catalog metadata"
        );
        Ok(summary)
    }

    // ========================================================================
    // Catalog Queries
    // ========================================================================

    /// All groups, ordered by display number then id.
    pub async fn get_groups(&self) -> Result<Vec<Group>> {
        let rows: Vec<(i64, String, i64)> = sqlx::query_as(
            "SELECT group_id, group_name, display_number FROM filter_groups \
             ORDER BY display_number, group_id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(group_id, group_name, display_number)| Group {
                group_id,
                group_name,
                display_number,
            })
            .collect())
    }

    /// All tags, ordered by id.
    pub async fn get_tags(&self) -> Result<Vec<Tag>> {
        let rows: Vec<(i64, String, String)> =
            sqlx::query_as("SELECT tag_id, keyword, description FROM tags ORDER BY tag_id")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(|(tag_id, keyword, description)| Tag {
                tag_id,
                keyword,
                description,
            })
            .collect())
    }

    /// All filters, removed ones included, ordered by id. `tags_details` is
    /// left empty: it is derived when a snapshot is built.
    pub async fn get_filters(&self) -> Result<Vec<Filter>> {
        let rows: Vec<FilterRow> = sqlx::query_as(&format!(
            "SELECT {FILTER_COLUMNS} FROM filters ORDER BY filter_id"
        ))
        .fetch_all(&self.pool)
        .await?;

        let tag_rows: Vec<(FilterId, TagId)> =
            sqlx::query_as("SELECT filter_id, tag_id FROM filter_tags ORDER BY filter_id, position")
                .fetch_all(&self.pool)
                .await?;
        let mut tags_by_filter: HashMap<FilterId, Vec<TagId>> = HashMap::new();
        for (filter_id, tag_id) in tag_rows {
            tags_by_filter.entry(filter_id).or_default().push(tag_id);
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let tags = tags_by_filter.remove(&row.0).unwrap_or_default();
                filter_from_row(row, tags)
            })
            .collect())
    }

    /// One filter by id, with its tags.
    pub async fn get_filter(&self, filter_id: FilterId) -> Result<Option<Filter>> {
        let row: Option<FilterRow> = sqlx::query_as(&format!(
            "SELECT {FILTER_COLUMNS} FROM filters WHERE filter_id = ?"
        ))
        .bind(filter_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let tags: Vec<(TagId,)> =
            sqlx::query_as("SELECT tag_id FROM filter_tags WHERE filter_id = ? ORDER BY position")
                .bind(filter_id)
                .fetch_all(&self.pool)
                .await?;

        Ok(Some(filter_from_row(
            row,
            tags.into_iter().map(|(id,)| id).collect(),
        )))
    }

    /// Ids of enabled, not removed filters.
    pub async fn enabled_filter_ids(&self) -> Result<Vec<FilterId>> {
        let rows: Vec<(FilterId,)> = sqlx::query_as(
            "SELECT filter_id FROM filters WHERE enabled = 1 AND removed = 0 ORDER BY filter_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Sum of rule counts over enabled, not removed filters.
    pub async fn enabled_rules_count(&self) -> Result<u64> {
        let (total,): (i64,) = sqlx::query_as(
            "SELECT COALESCE(SUM(rules_count), 0) FROM filters WHERE enabled = 1 AND removed = 0",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(u64::try_from(total).unwrap_or(0))
    }

    // ========================================================================
    // Filter State
    // ========================================================================

    /// Set a filter's enabled flag. Returns `false` if the id is unknown.
    pub async fn set_filter_enabled(&self, filter_id: FilterId, enabled: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE filters SET enabled = ? WHERE filter_id = ?")
            .bind(enabled)
            .bind(filter_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Mark a filter removed (and disabled). Returns `false` if the id is unknown.
    pub async fn mark_filter_removed(&self, filter_id: FilterId) -> Result<bool> {
        let result = sqlx::query("UPDATE filters SET removed = 1, enabled = 0 WHERE filter_id = ?")
            .bind(filter_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Store the outcome of a successful list download.
    pub async fn record_filter_update(
        &self,
        filter_id: FilterId,
        version: &str,
        rules_count: u64,
        last_update_time: i64,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE filters SET version = ?, rules_count = ?, last_update_time = ? \
             WHERE filter_id = ?",
        )
        .bind(version)
        .bind(i64::try_from(rules_count).unwrap_or(i64::MAX))
        .bind(last_update_time)
        .bind(filter_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ========================================================================
    // Custom Filters
    // ========================================================================

    /// Store a custom filter in the custom group.
    ///
    /// A URL seen before keeps its id: the record is refreshed and un-removed,
    /// its enabled flag is left alone. A new URL gets the next id at or above
    /// [`FIRST_CUSTOM_FILTER_ID`] and starts disabled.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction cannot be committed; no id is
    /// allocated then.
    pub async fn upsert_custom_filter(&self, filter: &NewCustomFilter) -> Result<FilterId> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<(FilterId,)> =
            sqlx::query_as("SELECT filter_id FROM filters WHERE custom_url = ?")
                .bind(&filter.url)
                .fetch_optional(&mut *tx)
                .await?;

        let filter_id = match existing {
            Some((id,)) => {
                sqlx::query(
                    r#"
                    UPDATE filters SET
                        name = ?, description = ?, homepage = ?, version = ?,
                        rules_count = ?, removed = 0
                    WHERE filter_id = ?
                "#,
                )
                .bind(&filter.name)
                .bind(&filter.description)
                .bind(&filter.homepage)
                .bind(&filter.version)
                .bind(i64::try_from(filter.rules_count).unwrap_or(i64::MAX))
                .bind(id)
                .execute(&mut *tx)
                .await?;
                id
            }
            None => {
                let (next,): (FilterId,) = sqlx::query_as(
                    "SELECT COALESCE(MAX(filter_id) + 1, ?) FROM filters WHERE filter_id >= ?",
                )
                .bind(FIRST_CUSTOM_FILTER_ID)
                .bind(FIRST_CUSTOM_FILTER_ID)
                .fetch_one(&mut *tx)
                .await?;

                sqlx::query(
                    r#"
                    INSERT INTO filters (
                        filter_id, group_id, name, description, homepage, version,
                        custom_url, rules_count, enabled, removed
                    )
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, 0)
                "#,
                )
                .bind(next)
                .bind(CUSTOM_GROUP_ID)
                .bind(&filter.name)
                .bind(&filter.description)
                .bind(&filter.homepage)
                .bind(&filter.version)
                .bind(&filter.url)
                .bind(i64::try_from(filter.rules_count).unwrap_or(i64::MAX))
                .execute(&mut *tx)
                .await?;
                next
            }
        };

        tx.commit().await?;
        tracing::info!(filter_id, url = %filter.url, "Stored custom filter");
        Ok(filter_id)
    }
}
