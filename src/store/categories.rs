use anyhow::{Context, Result};
use chrono::Utc;
use libsql::{Connection, Row, params};

use super::{
    Assignments, CatalogStore, begin_write, bool_value, count, new_id, parse_timestamp,
    text_value, timestamp,
};
use crate::models::{
    CategoryPatch, CategoryRecord, DEFAULT_CATEGORY_COLOR, DEFAULT_CATEGORY_ICON, slugify,
};

const CATEGORY_SELECT: &str = r#"
    SELECT id, name, slug, description, thumbnail, icon, video_count,
           sort_order, is_active, color, created_at, updated_at
    FROM categories
"#;

/// Outcome of a category update.
#[derive(Debug)]
pub enum CategoryWrite {
    Saved(CategoryRecord),
    NotFound,
    /// Another category already uses the name (or the slug derived from it).
    NameTaken,
}

fn row_to_category(row: &Row) -> Result<CategoryRecord> {
    let is_active: i64 = row.get(8)?;
    let created_at: String = row.get(10)?;
    let updated_at: String = row.get(11)?;
    Ok(CategoryRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        slug: row.get(2)?,
        description: row.get(3)?,
        thumbnail: row.get(4)?,
        icon: row.get(5)?,
        video_count: row.get(6)?,
        order: row.get(7)?,
        is_active: is_active != 0,
        color: row.get(9)?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

async fn fetch_one(conn: &Connection, clause: &str, key: &str) -> Result<Option<CategoryRecord>> {
    let mut rows = conn
        .query(&format!("{CATEGORY_SELECT} WHERE {clause}"), params![key])
        .await?;
    match rows.next().await? {
        Some(row) => Ok(Some(row_to_category(&row)?)),
        None => Ok(None),
    }
}

/// Whether a category other than `except_id` already claims `name` or `slug`.
async fn name_in_use(conn: &Connection, name: &str, slug: &str, except_id: Option<&str>) -> Result<bool> {
    let n = count(
        conn,
        "SELECT COUNT(*) FROM categories WHERE (name = ?1 OR slug = ?2) AND id <> ?3",
        params![name, slug, except_id.unwrap_or("")],
    )
    .await?;
    Ok(n > 0)
}

/// Names made only of punctuation still need a unique slug.
fn slug_for(name: &str, id: &str) -> String {
    let slug = slugify(name);
    if slug.is_empty() {
        id.chars().take(8).collect()
    } else {
        slug
    }
}

impl CatalogStore {
    /// Creates a category; `None` when the name (case-insensitively) or its
    /// slug is already taken.
    pub async fn create_category(
        &self,
        name: &str,
        description: &str,
        thumbnail: &str,
        icon: Option<&str>,
        color: Option<&str>,
    ) -> Result<Option<CategoryRecord>> {
        let name = name.trim();
        let id = new_id();
        let slug = slug_for(name, &id);
        let now = timestamp(Utc::now());

        let conn = self.conn().await?;
        let tx = begin_write(&conn).await?;
        if name_in_use(&tx, name, &slug, None).await? {
            return Ok(None);
        }
        tx.execute(
            r#"
            INSERT INTO categories (
                id, name, slug, description, thumbnail, icon, color, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
            "#,
            params![
                id.as_str(),
                name,
                slug.as_str(),
                description,
                thumbnail,
                icon.unwrap_or(DEFAULT_CATEGORY_ICON),
                color.unwrap_or(DEFAULT_CATEGORY_COLOR),
                now.as_str(),
            ],
        )
        .await
        .with_context(|| format!("inserting category {name}"))?;
        tx.commit().await?;

        self.get_category(&id).await
    }

    pub async fn get_category(&self, id: &str) -> Result<Option<CategoryRecord>> {
        let conn = self.conn().await?;
        fetch_one(&conn, "id = ?1", id).await
    }

    pub async fn get_active_category_by_slug(&self, slug: &str) -> Result<Option<CategoryRecord>> {
        let conn = self.conn().await?;
        fetch_one(&conn, "slug = ?1 AND is_active = 1", slug).await
    }

    /// Categories in display order (`order`, then name).
    pub async fn list_categories(&self, active_only: bool, limit: Option<i64>) -> Result<Vec<CategoryRecord>> {
        let conn = self.conn().await?;
        let filter = if active_only { "WHERE is_active = 1" } else { "" };
        let sql = format!(
            "{CATEGORY_SELECT} {filter} ORDER BY sort_order ASC, name COLLATE NOCASE ASC LIMIT ?1"
        );
        let mut rows = conn.query(&sql, params![limit.unwrap_or(-1)]).await?;
        let mut categories = Vec::new();
        while let Some(row) = rows.next().await? {
            categories.push(row_to_category(&row)?);
        }
        Ok(categories)
    }

    pub async fn count_active_categories(&self) -> Result<i64> {
        let conn = self.conn().await?;
        count(&conn, "SELECT COUNT(*) FROM categories WHERE is_active = 1", ()).await
    }

    /// Partial update. Renaming regenerates the slug.
    pub async fn update_category(&self, id: &str, patch: &CategoryPatch) -> Result<CategoryWrite> {
        let conn = self.conn().await?;
        let tx = begin_write(&conn).await?;
        if fetch_one(&tx, "id = ?1", id).await?.is_none() {
            return Ok(CategoryWrite::NotFound);
        }

        let mut set = Assignments::default();
        if let Some(name) = &patch.name {
            let name = name.trim();
            let slug = slug_for(name, id);
            if name_in_use(&tx, name, &slug, Some(id)).await? {
                return Ok(CategoryWrite::NameTaken);
            }
            set.set("name", text_value(name));
            set.set("slug", text_value(slug));
        }
        if let Some(description) = &patch.description {
            set.set("description", text_value(description.as_str()));
        }
        if let Some(thumbnail) = &patch.thumbnail {
            set.set("thumbnail", text_value(thumbnail.as_str()));
        }
        if let Some(icon) = &patch.icon {
            set.set("icon", text_value(icon.as_str()));
        }
        if let Some(color) = &patch.color {
            set.set("color", text_value(color.as_str()));
        }
        if let Some(is_active) = patch.is_active {
            set.set("is_active", bool_value(is_active));
        }
        if let Some(order) = patch.order {
            set.set("sort_order", order.into());
        }
        set.set("updated_at", text_value(timestamp(Utc::now())));

        tx.execute(
            &format!("UPDATE categories SET {} WHERE id = ?", set.sql()),
            set.params_with_key(id),
        )
        .await
        .with_context(|| format!("updating category {id}"))?;
        tx.commit().await?;

        match self.get_category(id).await? {
            Some(category) => Ok(CategoryWrite::Saved(category)),
            None => Ok(CategoryWrite::NotFound),
        }
    }

    /// Deletes a category and detaches its videos.
    pub async fn delete_category(&self, id: &str) -> Result<bool> {
        let conn = self.conn().await?;
        let tx = begin_write(&conn).await?;
        tx.execute(
            "UPDATE videos SET category_id = NULL WHERE category_id = ?1",
            params![id],
        )
        .await?;
        let deleted = tx
            .execute("DELETE FROM categories WHERE id = ?1", params![id])
            .await?;
        tx.commit().await?;
        Ok(deleted > 0)
    }

    /// Applies `(id, position)` pairs; unknown ids are skipped. Returns the
    /// number of categories moved.
    pub async fn reorder_categories(&self, order: &[(String, i64)]) -> Result<u64> {
        let conn = self.conn().await?;
        let tx = begin_write(&conn).await?;
        let now = timestamp(Utc::now());
        let mut moved = 0;
        for (id, position) in order {
            moved += tx
                .execute(
                    "UPDATE categories SET sort_order = ?2, updated_at = ?3 WHERE id = ?1",
                    params![id.as_str(), *position, now.as_str()],
                )
                .await?;
        }
        tx.commit().await?;
        Ok(moved)
    }
}
