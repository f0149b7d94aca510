use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use libsql::params;
use serde::Serialize;

use super::{CatalogStore, count, timestamp};
use crate::models::{CategoryRef, DailyAnalytics};

/// Catalog-wide counters for the admin dashboards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_videos: i64,
    pub public_videos: i64,
    pub private_videos: i64,
    pub total_views: i64,
    pub total_categories: i64,
    pub active_ads: i64,
    pub pending_reports: i64,
    pub today_uploads: i64,
    pub week_uploads: i64,
    pub month_uploads: i64,
}

/// Views of the videos uploaded on one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadDay {
    pub date: String,
    pub total_views: i64,
    pub video_count: i64,
}

/// View traffic on one day, summed over every video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayViews {
    pub date: String,
    pub views: i64,
    pub unique_views: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryStat {
    pub category: CategoryRef,
    pub video_count: i64,
    pub total_views: i64,
    pub total_likes: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicStats {
    pub videos: i64,
    pub views: i64,
    pub categories: i64,
}

/// Midnight UTC of the day containing `now`.
pub fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc())
        .unwrap_or(now)
}

impl CatalogStore {
    pub async fn dashboard_stats(&self, now: DateTime<Utc>) -> Result<DashboardStats> {
        let today = start_of_day(now);
        let week_ago = today - Duration::days(7);
        let month_ago = today - Duration::days(30);

        let conn = self.conn().await?;
        let mut rows = conn
            .query(
                r#"
                SELECT COUNT(*),
                       COALESCE(SUM(status = 'public'), 0),
                       COALESCE(SUM(status = 'private'), 0),
                       COALESCE(SUM(views), 0),
                       COALESCE(SUM(upload_date >= ?1), 0),
                       COALESCE(SUM(upload_date >= ?2), 0),
                       COALESCE(SUM(upload_date >= ?3), 0)
                FROM videos
                "#,
                params![timestamp(today), timestamp(week_ago), timestamp(month_ago)],
            )
            .await?;
        let mut stats = DashboardStats::default();
        if let Some(row) = rows.next().await? {
            stats.total_videos = row.get(0)?;
            stats.public_videos = row.get(1)?;
            stats.private_videos = row.get(2)?;
            stats.total_views = row.get(3)?;
            stats.today_uploads = row.get(4)?;
            stats.week_uploads = row.get(5)?;
            stats.month_uploads = row.get(6)?;
        }
        drop(rows);

        stats.total_categories =
            count(&conn, "SELECT COUNT(*) FROM categories WHERE is_active = 1", ()).await?;
        stats.active_ads = count(&conn, "SELECT COUNT(*) FROM ads WHERE enabled = 1", ()).await?;
        stats.pending_reports =
            count(&conn, "SELECT COUNT(*) FROM reports WHERE status = 'pending'", ()).await?;
        Ok(stats)
    }

    /// Per upload-day view totals for videos uploaded since `since`.
    pub async fn uploads_by_day(&self, since: DateTime<Utc>) -> Result<Vec<UploadDay>> {
        let conn = self.conn().await?;
        let mut rows = conn
            .query(
                r#"
                SELECT substr(upload_date, 1, 10) AS day, COALESCE(SUM(views), 0), COUNT(*)
                FROM videos
                WHERE upload_date >= ?1
                GROUP BY day
                ORDER BY day ASC
                "#,
                params![timestamp(since)],
            )
            .await?;
        let mut days = Vec::new();
        while let Some(row) = rows.next().await? {
            days.push(UploadDay {
                date: row.get(0)?,
                total_views: row.get(1)?,
                video_count: row.get(2)?,
            });
        }
        Ok(days)
    }

    /// Daily view traffic across all videos from `since_day` (`YYYY-MM-DD`).
    pub async fn views_by_day(&self, since_day: &str) -> Result<Vec<DayViews>> {
        let conn = self.conn().await?;
        let mut rows = conn
            .query(
                r#"
                SELECT day, SUM(views), SUM(unique_views)
                FROM daily_analytics
                WHERE day >= ?1
                GROUP BY day
                ORDER BY day ASC
                "#,
                params![since_day],
            )
            .await?;
        let mut days = Vec::new();
        while let Some(row) = rows.next().await? {
            days.push(DayViews {
                date: row.get(0)?,
                views: row.get(1)?,
                unique_views: row.get(2)?,
            });
        }
        Ok(days)
    }

    /// Daily analytics rows of one video from `since_day` onwards.
    pub async fn daily_analytics(&self, video_id: &str, since_day: &str) -> Result<Vec<DailyAnalytics>> {
        let conn = self.conn().await?;
        let mut rows = conn
            .query(
                r#"
                SELECT video_id, day, views, unique_views, likes, dislikes, shares, avg_watch_time
                FROM daily_analytics
                WHERE video_id = ?1 AND day >= ?2
                ORDER BY day ASC
                "#,
                params![video_id, since_day],
            )
            .await?;
        let mut days = Vec::new();
        while let Some(row) = rows.next().await? {
            days.push(DailyAnalytics {
                video_id: row.get(0)?,
                date: row.get(1)?,
                views: row.get(2)?,
                unique_views: row.get(3)?,
                likes: row.get(4)?,
                dislikes: row.get(5)?,
                shares: row.get(6)?,
                avg_watch_time: row.get(7)?,
            });
        }
        Ok(days)
    }

    /// Public video totals per category, most viewed first.
    pub async fn category_stats(&self) -> Result<Vec<CategoryStat>> {
        let conn = self.conn().await?;
        let mut rows = conn
            .query(
                r#"
                SELECT c.id, c.name, c.slug, COUNT(*),
                       COALESCE(SUM(v.views), 0) AS total_views,
                       COALESCE(SUM(v.likes), 0)
                FROM videos v
                JOIN categories c ON c.id = v.category_id
                WHERE v.status = 'public'
                GROUP BY c.id
                ORDER BY total_views DESC, c.name ASC
                "#,
                (),
            )
            .await?;
        let mut stats = Vec::new();
        while let Some(row) = rows.next().await? {
            stats.push(CategoryStat {
                category: CategoryRef {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    slug: row.get(2)?,
                },
                video_count: row.get(3)?,
                total_views: row.get(4)?,
                total_likes: row.get(5)?,
            });
        }
        Ok(stats)
    }

    /// Headline numbers for the public site footer.
    pub async fn public_stats(&self) -> Result<PublicStats> {
        let conn = self.conn().await?;
        Ok(PublicStats {
            videos: count(&conn, "SELECT COUNT(*) FROM videos WHERE status = 'public'", ()).await?,
            views: count(&conn, "SELECT COALESCE(SUM(views), 0) FROM videos", ()).await?,
            categories: count(&conn, "SELECT COUNT(*) FROM categories WHERE is_active = 1", ())
                .await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{create_store, insert_category, sample_video};
    use super::super::{Reaction, ViewEvent, day_key};
    use super::*;
    use crate::models::{AdInput, AdPlacement, NewReport, ReportReason, VideoStatus};

    #[test]
    fn start_of_day_truncates_to_midnight() {
        let now = DateTime::parse_from_rfc3339("2024-05-06T17:45:12Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(timestamp(start_of_day(now)), "2024-05-06T00:00:00.000Z");
    }

    #[tokio::test]
    async fn dashboard_counts_every_collection() -> Result<()> {
        let (_dir, store) = create_store().await?;
        let music = insert_category(&store, "Music").await?;

        let mut public = sample_video("d1", "Public");
        public.views = 40;
        public.category_id = Some(music.id.clone());
        let public = store.insert_video(&public).await?;
        let mut private = sample_video("d2", "Private");
        private.status = VideoStatus::Private;
        private.views = 2;
        store.insert_video(&private).await?;

        store
            .create_ad(&AdInput {
                name: Some("ad".into()),
                placement: Some(AdPlacement::HomeTop),
                code: Some("x".into()),
                ..AdInput::default()
            })
            .await?;
        store
            .create_report(&NewReport {
                video_id: public.id.clone(),
                reason: ReportReason::Broken,
                description: String::new(),
                email: String::new(),
                ip: String::new(),
            })
            .await?;

        let stats = store.dashboard_stats(Utc::now()).await?;
        assert_eq!(
            stats,
            DashboardStats {
                total_videos: 2,
                public_videos: 1,
                private_videos: 1,
                total_views: 42,
                total_categories: 1,
                active_ads: 1,
                pending_reports: 1,
                today_uploads: 2,
                week_uploads: 2,
                month_uploads: 2,
            }
        );

        let by_category = store.category_stats().await?;
        assert_eq!(by_category.len(), 1);
        assert_eq!(by_category[0].total_views, 40);
        assert_eq!(by_category[0].category.slug, "music");

        let uploads = store.uploads_by_day(Utc::now() - Duration::days(1)).await?;
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].video_count, 2);

        let public_stats = store.public_stats().await?;
        assert_eq!(public_stats, PublicStats { videos: 1, views: 42, categories: 1 });
        Ok(())
    }

    #[tokio::test]
    async fn daily_rows_aggregate_across_videos() -> Result<()> {
        let (_dir, store) = create_store().await?;
        let first = store.insert_video(&sample_video("a1", "A")).await?;
        let second = store.insert_video(&sample_video("b1", "B")).await?;
        let now = Utc::now();
        let window = Duration::minutes(30);

        for (video, viewer) in [(&first, "x"), (&first, "x"), (&second, "y")] {
            let event = ViewEvent {
                video_id: video.id.clone(),
                fingerprint: viewer.to_string(),
                user_agent: String::new(),
                referer: String::new(),
            };
            store.record_view(&event, now, window).await?;
        }
        store.record_reaction(&second.id, Reaction::Like, now).await?;

        let today = day_key(now);
        let days = store.views_by_day(&today).await?;
        assert_eq!(
            days,
            vec![DayViews { date: today.clone(), views: 3, unique_views: 2 }]
        );
        let rows = store.daily_analytics(&second.id, &today).await?;
        assert_eq!((rows[0].views, rows[0].likes), (1, 1));
        assert!(store.daily_analytics(&first.id, "2999-01-01").await?.is_empty());
        Ok(())
    }
}
