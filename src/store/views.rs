use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use libsql::{Connection, params};

use super::{CatalogStore, begin_write, count, day_key, timestamp};

/// One view request, already reduced to a fingerprint.
#[derive(Debug, Clone)]
pub struct ViewEvent {
    pub video_id: String,
    pub fingerprint: String,
    pub user_agent: String,
    pub referer: String,
}

/// Audience reaction counted on both the video and the day's analytics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction {
    Like,
    Dislike,
}

impl Reaction {
    fn video_sql(self) -> &'static str {
        match self {
            Self::Like => "UPDATE videos SET likes = likes + 1 WHERE id = ?1 RETURNING likes",
            Self::Dislike => {
                "UPDATE videos SET dislikes = dislikes + 1 WHERE id = ?1 RETURNING dislikes"
            }
        }
    }

    fn daily_sql(self) -> &'static str {
        match self {
            Self::Like => {
                r#"
                INSERT INTO daily_analytics (video_id, day, likes) VALUES (?1, ?2, 1)
                ON CONFLICT(video_id, day) DO UPDATE SET likes = likes + 1
                "#
            }
            Self::Dislike => {
                r#"
                INSERT INTO daily_analytics (video_id, day, dislikes) VALUES (?1, ?2, 1)
                ON CONFLICT(video_id, day) DO UPDATE SET dislikes = dislikes + 1
                "#
            }
        }
    }
}

async fn video_exists(conn: &Connection, id: &str) -> Result<bool> {
    Ok(count(conn, "SELECT COUNT(*) FROM videos WHERE id = ?1", params![id]).await? > 0)
}

impl CatalogStore {
    /// Records a view request. Returns `None` when the video does not exist,
    /// otherwise whether the view counted.
    ///
    /// A viewer counts once per `window`: the log row for (video,
    /// fingerprint) is replaced only after it expires, and the insert and the
    /// counter updates commit together, so concurrent requests from one
    /// viewer cannot double count. Raw request totals still go to the day's
    /// `views`; only counted views reach `uniqueViews` and the video.
    pub async fn record_view(
        &self,
        event: &ViewEvent,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<Option<bool>> {
        let conn = self.conn().await?;
        let tx = begin_write(&conn).await?;
        if !video_exists(&tx, &event.video_id).await? {
            return Ok(None);
        }

        let now_text = timestamp(now);
        tx.execute(
            "DELETE FROM view_logs WHERE video_id = ?1 AND fingerprint = ?2 AND expires_at <= ?3",
            params![event.video_id.as_str(), event.fingerprint.as_str(), now_text.as_str()],
        )
        .await?;
        let inserted = tx
            .execute(
                r#"
                INSERT OR IGNORE INTO view_logs (
                    video_id, fingerprint, user_agent, referer, created_at, expires_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                params![
                    event.video_id.as_str(),
                    event.fingerprint.as_str(),
                    event.user_agent.as_str(),
                    event.referer.as_str(),
                    now_text.as_str(),
                    timestamp(now + window),
                ],
            )
            .await?
            > 0;

        if inserted {
            tx.execute(
                "UPDATE videos SET views = views + 1 WHERE id = ?1",
                params![event.video_id.as_str()],
            )
            .await?;
        }
        tx.execute(
            r#"
            INSERT INTO daily_analytics (video_id, day, views, unique_views) VALUES (?1, ?2, 1, ?3)
            ON CONFLICT(video_id, day) DO UPDATE SET
                views = views + 1,
                unique_views = unique_views + excluded.unique_views
            "#,
            params![event.video_id.as_str(), day_key(now), i64::from(inserted)],
        )
        .await?;
        tx.commit().await?;

        Ok(Some(inserted))
    }

    /// Deletes view logs whose window closed at or before `now`.
    pub async fn prune_expired_views(&self, now: DateTime<Utc>) -> Result<u64> {
        let conn = self.conn().await?;
        let removed = conn
            .execute(
                "DELETE FROM view_logs WHERE expires_at <= ?1",
                params![timestamp(now)],
            )
            .await?;
        Ok(removed)
    }

    /// Applies a reaction; returns the video's new total, or `None` when it
    /// does not exist.
    pub async fn record_reaction(
        &self,
        video_id: &str,
        reaction: Reaction,
        now: DateTime<Utc>,
    ) -> Result<Option<i64>> {
        let conn = self.conn().await?;
        let tx = begin_write(&conn).await?;
        let mut rows = tx.query(reaction.video_sql(), params![video_id]).await?;
        let Some(row) = rows.next().await? else {
            return Ok(None);
        };
        let total: i64 = row.get(0)?;
        drop(rows);

        tx.execute(reaction.daily_sql(), params![video_id, day_key(now)])
            .await?;
        tx.commit().await?;
        Ok(Some(total))
    }
}
