use std::collections::HashSet;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use libsql::{
    Connection, Row, Value, params,
    params::{IntoParams, Params},
};

use super::{
    Assignments, CatalogStore, Filter, Page, begin_write, bool_value, count, like_pattern, new_id,
    optional_text, parse_timestamp, text_value, timestamp,
};
use crate::models::{
    CategoryRef, NewVideo, VideoPatch, VideoRecord, VideoStatus, normalize_tags, slugify,
    video_slug,
};

pub(super) const VIDEO_SELECT: &str = r#"
    SELECT v.id, v.file_code, v.embed_code, v.title, v.slug, v.description,
           v.thumbnail, v.thumbnail_public_id, v.duration, v.tags_json,
           v.views, v.likes, v.dislikes, v.status, v.featured,
           v.upload_date, v.created_at, v.updated_at,
           c.id, c.name, c.slug
    FROM videos v
    LEFT JOIN categories c ON c.id = v.category_id
"#;

pub(super) fn row_to_video(row: &Row) -> Result<VideoRecord> {
    let tags_json: String = row.get(9)?;
    let tags: Vec<String> = serde_json::from_str(&tags_json).context("parsing video tags")?;
    let status: String = row.get(13)?;
    let featured: i64 = row.get(14)?;
    let upload_date: String = row.get(15)?;
    let created_at: String = row.get(16)?;
    let updated_at: String = row.get(17)?;

    let category = match row.get::<Option<String>>(18)? {
        Some(id) => Some(CategoryRef {
            id,
            name: row.get(19)?,
            slug: row.get(20)?,
        }),
        None => None,
    };

    Ok(VideoRecord {
        id: row.get(0)?,
        file_code: row.get(1)?,
        embed_code: row.get(2)?,
        title: row.get(3)?,
        slug: row.get(4)?,
        description: row.get(5)?,
        thumbnail: row.get(6)?,
        thumbnail_public_id: row.get(7)?,
        duration: row.get(8)?,
        category,
        tags,
        views: row.get(10)?,
        likes: row.get(11)?,
        dislikes: row.get(12)?,
        status: status.parse()?,
        featured: featured != 0,
        upload_date: parse_timestamp(&upload_date)?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

pub(super) async fn collect_videos(
    conn: &Connection,
    sql: &str,
    params: impl IntoParams,
) -> Result<Vec<VideoRecord>> {
    let mut rows = conn.query(sql, params).await?;
    let mut videos = Vec::new();
    while let Some(row) = rows.next().await? {
        videos.push(row_to_video(&row)?);
    }
    Ok(videos)
}

/// Orderings accepted by the list endpoints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VideoSort {
    #[default]
    Newest,
    Oldest,
    /// Most viewed first, newest first among equals.
    Views,
    Likes,
    Title,
}

impl VideoSort {
    /// Unknown or missing names fall back to `fallback`.
    pub fn parse(raw: Option<&str>, fallback: VideoSort) -> VideoSort {
        match raw.map(str::trim) {
            Some("newest") => Self::Newest,
            Some("oldest") => Self::Oldest,
            Some("views") => Self::Views,
            Some("likes") => Self::Likes,
            Some("title") => Self::Title,
            _ => fallback,
        }
    }

    fn order_sql(self) -> &'static str {
        match self {
            Self::Newest => "v.upload_date DESC, v.rowid DESC",
            Self::Oldest => "v.upload_date ASC, v.rowid ASC",
            Self::Views => "v.views DESC, v.upload_date DESC, v.rowid DESC",
            Self::Likes => "v.likes DESC, v.upload_date DESC, v.rowid DESC",
            Self::Title => "v.title COLLATE NOCASE ASC, v.rowid ASC",
        }
    }
}

/// Filter and ordering for video listings. Empty fields do not filter.
#[derive(Debug, Clone, Default)]
pub struct VideoQuery {
    pub statuses: Vec<VideoStatus>,
    pub category_id: Option<String>,
    pub tag: Option<String>,
    /// Case-insensitive substring over title, description and tags.
    pub text: Option<String>,
    /// Case-insensitive substring over title and file code (admin search).
    pub title_or_code: Option<String>,
    pub featured: Option<bool>,
    pub exclude_id: Option<String>,
    pub uploaded_since: Option<DateTime<Utc>>,
    pub sort: VideoSort,
}

impl VideoQuery {
    /// Only videos visible in public listings.
    pub fn public() -> Self {
        Self {
            statuses: vec![VideoStatus::Public],
            ..Self::default()
        }
    }

    pub fn sorted(mut self, sort: VideoSort) -> Self {
        self.sort = sort;
        self
    }

    fn filter(&self) -> Filter {
        let mut filter = Filter::default();
        if !self.statuses.is_empty() {
            let placeholders = vec!["?"; self.statuses.len()].join(", ");
            filter.push(
                format!("v.status IN ({placeholders})"),
                self.statuses.iter().map(|status| text_value(status.as_str())),
            );
        }
        if let Some(category_id) = &self.category_id {
            filter.push("v.category_id = ?", [text_value(category_id.as_str())]);
        }
        if let Some(tag) = &self.tag {
            filter.push(
                "EXISTS (SELECT 1 FROM json_each(v.tags_json) t WHERE t.value = ?)",
                [text_value(tag.trim().to_lowercase())],
            );
        }
        if let Some(text) = &self.text {
            let pattern = like_pattern(text.trim());
            filter.push(
                r#"(v.title LIKE ? ESCAPE '\'
                    OR v.description LIKE ? ESCAPE '\'
                    OR EXISTS (SELECT 1 FROM json_each(v.tags_json) t WHERE t.value LIKE ? ESCAPE '\'))"#,
                [
                    text_value(pattern.as_str()),
                    text_value(pattern.as_str()),
                    text_value(pattern),
                ],
            );
        }
        if let Some(needle) = &self.title_or_code {
            let pattern = like_pattern(needle.trim());
            filter.push(
                r#"(v.title LIKE ? ESCAPE '\' OR v.file_code LIKE ? ESCAPE '\')"#,
                [text_value(pattern.as_str()), text_value(pattern)],
            );
        }
        if let Some(featured) = self.featured {
            filter.push("v.featured = ?", [bool_value(featured)]);
        }
        if let Some(exclude_id) = &self.exclude_id {
            filter.push("v.id <> ?", [text_value(exclude_id.as_str())]);
        }
        if let Some(since) = self.uploaded_since {
            filter.push("v.upload_date >= ?", [text_value(timestamp(since))]);
        }
        filter
    }
}

impl CatalogStore {
    /// Inserts a video and bumps its category's counter in one transaction.
    pub async fn insert_video(&self, video: &NewVideo) -> Result<VideoRecord> {
        let id = new_id();
        let now = timestamp(Utc::now());
        let tags_json =
            serde_json::to_string(&normalize_tags(&video.tags)).context("serializing tags")?;

        let conn = self.conn().await?;
        let tx = begin_write(&conn).await?;

        let mut slug = video_slug(&video.title, &video.file_code);
        let taken = count(&tx, "SELECT COUNT(*) FROM videos WHERE slug = ?1", params![slug.as_str()]).await?;
        if taken > 0 {
            slug = format!("{}-{}", slugify(&video.title), video.file_code);
        }

        tx.execute(
            r#"
            INSERT INTO videos (
                id, file_code, embed_code, title, slug, description, thumbnail,
                thumbnail_public_id, duration, category_id, tags_json, views,
                status, featured, upload_date, created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?15, ?15
            )
            "#,
            params![
                id.as_str(),
                video.file_code.as_str(),
                video.embed_code.as_str(),
                video.title.as_str(),
                slug.as_str(),
                video.description.as_str(),
                video.thumbnail.as_str(),
                video.thumbnail_public_id.as_deref(),
                video.duration.as_str(),
                video.category_id.as_deref(),
                tags_json,
                video.views.max(0),
                video.status.as_str(),
                i64::from(video.featured),
                now.as_str(),
            ],
        )
        .await
        .with_context(|| format!("inserting video {}", video.file_code))?;

        if let Some(category_id) = &video.category_id {
            adjust_category_count(&tx, category_id, 1).await?;
        }
        tx.commit().await?;

        self.get_video(&id)
            .await?
            .with_context(|| format!("video {id} missing after insert"))
    }

    pub async fn get_video(&self, id: &str) -> Result<Option<VideoRecord>> {
        let conn = self.conn().await?;
        let sql = format!("{VIDEO_SELECT} WHERE v.id = ?1");
        let mut videos = collect_videos(&conn, &sql, params![id]).await?;
        Ok(videos.pop())
    }

    pub async fn file_code_exists(&self, file_code: &str) -> Result<bool> {
        let conn = self.conn().await?;
        let n = count(&conn, "SELECT COUNT(*) FROM videos WHERE file_code = ?1", params![file_code]).await?;
        Ok(n > 0)
    }

    /// Subset of `file_codes` already present in the catalog.
    pub async fn existing_file_codes(&self, file_codes: &[String]) -> Result<HashSet<String>> {
        let mut existing = HashSet::new();
        if file_codes.is_empty() {
            return Ok(existing);
        }
        let conn = self.conn().await?;
        let placeholders = vec!["?"; file_codes.len()].join(", ");
        let values = file_codes.iter().map(|code| text_value(code.as_str())).collect();
        let mut rows = conn
            .query(
                &format!("SELECT file_code FROM videos WHERE file_code IN ({placeholders})"),
                Params::Positional(values),
            )
            .await?;
        while let Some(row) = rows.next().await? {
            existing.insert(row.get::<String>(0)?);
        }
        Ok(existing)
    }

    pub async fn list_videos(&self, query: &VideoQuery, limit: i64, offset: i64) -> Result<Vec<VideoRecord>> {
        let conn = self.conn().await?;
        let filter = query.filter();
        let sql = format!(
            "{VIDEO_SELECT} {} ORDER BY {} LIMIT ? OFFSET ?",
            filter.where_sql(),
            query.sort.order_sql()
        );
        collect_videos(&conn, &sql, filter.params([Value::Integer(limit), Value::Integer(offset)])).await
    }

    pub async fn count_videos(&self, query: &VideoQuery) -> Result<i64> {
        let conn = self.conn().await?;
        let filter = query.filter();
        let sql = format!("SELECT COUNT(*) FROM videos v {}", filter.where_sql());
        count(&conn, &sql, filter.params([])).await
    }

    /// One page of results plus the unpaged total.
    pub async fn page_videos(&self, query: &VideoQuery, page: Page) -> Result<(Vec<VideoRecord>, i64)> {
        let videos = self.list_videos(query, page.limit, page.offset()).await?;
        let total = self.count_videos(query).await?;
        Ok((videos, total))
    }

    /// Applies a partial update. Moving a video between categories keeps both
    /// counters in step.
    pub async fn update_video(&self, id: &str, patch: &VideoPatch) -> Result<Option<VideoRecord>> {
        let conn = self.conn().await?;
        let tx = begin_write(&conn).await?;

        let mut rows = tx
            .query("SELECT category_id FROM videos WHERE id = ?1", params![id])
            .await?;
        let Some(row) = rows.next().await? else {
            return Ok(None);
        };
        let previous_category: Option<String> = row.get(0)?;
        drop(rows);

        let mut set = Assignments::default();
        if let Some(title) = &patch.title {
            set.set("title", text_value(title.as_str()));
        }
        if let Some(description) = &patch.description {
            set.set("description", text_value(description.as_str()));
        }
        if let Some(thumbnail) = &patch.thumbnail {
            set.set("thumbnail", text_value(thumbnail.as_str()));
        }
        if let Some(public_id) = &patch.thumbnail_public_id {
            set.set("thumbnail_public_id", optional_text(public_id.as_deref()));
        }
        if let Some(category) = &patch.category {
            set.set("category_id", optional_text(category.as_deref()));
        }
        if let Some(tags) = &patch.tags {
            let tags_json =
                serde_json::to_string(&normalize_tags(tags)).context("serializing tags")?;
            set.set("tags_json", Value::Text(tags_json));
        }
        if let Some(status) = patch.status {
            set.set("status", text_value(status.as_str()));
        }
        if let Some(featured) = patch.featured {
            set.set("featured", bool_value(featured));
        }
        if let Some(duration) = &patch.duration {
            set.set("duration", text_value(duration.as_str()));
        }
        set.set("updated_at", text_value(timestamp(Utc::now())));

        tx.execute(
            &format!("UPDATE videos SET {} WHERE id = ?", set.sql()),
            set.params_with_key(id),
        )
        .await
        .with_context(|| format!("updating video {id}"))?;

        if let Some(next_category) = &patch.category
            && next_category != &previous_category
        {
            if let Some(old) = &previous_category {
                adjust_category_count(&tx, old, -1).await?;
            }
            if let Some(new) = next_category {
                adjust_category_count(&tx, new, 1).await?;
            }
        }
        tx.commit().await?;

        self.get_video(id).await
    }

    /// Deletes a video and returns the removed record.
    pub async fn delete_video(&self, id: &str) -> Result<Option<VideoRecord>> {
        let Some(video) = self.get_video(id).await? else {
            return Ok(None);
        };
        let conn = self.conn().await?;
        let tx = begin_write(&conn).await?;
        let removed = delete_one(&tx, id).await?;
        tx.commit().await?;
        Ok(removed.then_some(video))
    }

    /// Deletes every listed video that exists; returns how many were removed.
    pub async fn delete_videos(&self, ids: &[String]) -> Result<u64> {
        let conn = self.conn().await?;
        let tx = begin_write(&conn).await?;
        let mut deleted = 0;
        for id in ids {
            if delete_one(&tx, id).await? {
                deleted += 1;
            }
        }
        tx.commit().await?;
        Ok(deleted)
    }

    pub async fn toggle_featured(&self, id: &str) -> Result<Option<bool>> {
        let conn = self.conn().await?;
        let mut rows = conn
            .query(
                "UPDATE videos SET featured = 1 - featured, updated_at = ?2 WHERE id = ?1 RETURNING featured",
                params![id, timestamp(Utc::now())],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row.get::<i64>(0)? != 0)),
            None => Ok(None),
        }
    }

    pub async fn set_video_status(&self, id: &str, status: VideoStatus) -> Result<bool> {
        let conn = self.conn().await?;
        let changed = conn
            .execute(
                "UPDATE videos SET status = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, status.as_str(), timestamp(Utc::now())],
            )
            .await?;
        Ok(changed > 0)
    }

    /// Tag frequencies across public videos, most used first.
    pub async fn tag_counts(&self, limit: i64) -> Result<Vec<(String, i64)>> {
        let conn = self.conn().await?;
        let mut rows = conn
            .query(
                r#"
                SELECT t.value, COUNT(*) AS uses
                FROM videos v, json_each(v.tags_json) t
                WHERE v.status = 'public'
                GROUP BY t.value
                ORDER BY uses DESC, t.value ASC
                LIMIT ?1
                "#,
                params![limit],
            )
            .await?;
        let mut tags = Vec::new();
        while let Some(row) = rows.next().await? {
            tags.push((row.get::<String>(0)?, row.get::<i64>(1)?));
        }
        Ok(tags)
    }

    /// Titles of public videos containing `needle`, most viewed first.
    pub async fn title_suggestions(&self, needle: &str, limit: i64) -> Result<Vec<String>> {
        let conn = self.conn().await?;
        let mut rows = conn
            .query(
                r#"
                SELECT title FROM videos
                WHERE status = 'public' AND title LIKE ?1 ESCAPE '\'
                ORDER BY views DESC, upload_date DESC
                LIMIT ?2
                "#,
                params![like_pattern(needle.trim()), limit],
            )
            .await?;
        let mut titles = Vec::new();
        while let Some(row) = rows.next().await? {
            titles.push(row.get::<String>(0)?);
        }
        Ok(titles)
    }
}

pub(super) async fn adjust_category_count(conn: &Connection, category_id: &str, delta: i64) -> Result<()> {
    conn.execute(
        "UPDATE categories SET video_count = MAX(video_count + ?2, 0) WHERE id = ?1",
        params![category_id, delta],
    )
    .await?;
    Ok(())
}

async fn delete_one(conn: &Connection, id: &str) -> Result<bool> {
    let mut rows = conn
        .query("DELETE FROM videos WHERE id = ?1 RETURNING category_id", params![id])
        .await?;
    let Some(row) = rows.next().await? else {
        return Ok(false);
    };
    let category_id: Option<String> = row.get(0)?;
    drop(rows);
    if let Some(category_id) = category_id {
        adjust_category_count(conn, &category_id, -1).await?;
    }
    Ok(true)
}
