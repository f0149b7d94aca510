use anyhow::{Context, Result};
use chrono::Utc;
use libsql::{Row, Value, params, params::Params};

use super::{
    Assignments, CatalogStore, Page, count, new_id, parse_optional_timestamp, parse_timestamp,
    text_value, timestamp,
};
use crate::models::{NewReport, ReportRecord, ReportStatus, ReportVideoRef};

const REPORT_SELECT: &str = r#"
    SELECT r.id, r.video_id, r.reason, r.description, r.email, r.ip, r.status,
           r.admin_notes, r.resolved_at, r.created_at, r.updated_at,
           v.title, v.thumbnail
    FROM reports r
    LEFT JOIN videos v ON v.id = r.video_id
"#;

fn row_to_report(row: &Row) -> Result<ReportRecord> {
    let video_id: String = row.get(1)?;
    let reason: String = row.get(2)?;
    let status: String = row.get(6)?;
    let created_at: String = row.get(9)?;
    let updated_at: String = row.get(10)?;
    let video = match row.get::<Option<String>>(11)? {
        Some(title) => Some(ReportVideoRef {
            id: video_id.clone(),
            title,
            thumbnail: row.get(12)?,
        }),
        None => None,
    };
    Ok(ReportRecord {
        id: row.get(0)?,
        video_id,
        reason: reason.parse()?,
        description: row.get(3)?,
        email: row.get(4)?,
        ip: row.get(5)?,
        status: status.parse()?,
        admin_notes: row.get(7)?,
        resolved_at: parse_optional_timestamp(row.get(8)?)?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
        video,
    })
}

impl CatalogStore {
    pub async fn create_report(&self, report: &NewReport) -> Result<ReportRecord> {
        let id = new_id();
        let now = timestamp(Utc::now());
        let conn = self.conn().await?;
        conn.execute(
            r#"
            INSERT INTO reports (
                id, video_id, reason, description, email, ip, status, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', ?7, ?7)
            "#,
            params![
                id.as_str(),
                report.video_id.as_str(),
                report.reason.as_str(),
                report.description.as_str(),
                report.email.as_str(),
                report.ip.as_str(),
                now.as_str(),
            ],
        )
        .await
        .with_context(|| format!("inserting report for video {}", report.video_id))?;

        self.get_report(&id)
            .await?
            .with_context(|| format!("report {id} missing after insert"))
    }

    pub async fn get_report(&self, id: &str) -> Result<Option<ReportRecord>> {
        let conn = self.conn().await?;
        let mut rows = conn
            .query(&format!("{REPORT_SELECT} WHERE r.id = ?1"), params![id])
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_report(&row)?)),
            None => Ok(None),
        }
    }

    /// Newest first, optionally restricted to one status.
    pub async fn page_reports(
        &self,
        status: Option<ReportStatus>,
        page: Page,
    ) -> Result<(Vec<ReportRecord>, i64)> {
        let conn = self.conn().await?;
        let (clause, mut values) = match status {
            Some(status) => ("WHERE r.status = ?", vec![text_value(status.as_str())]),
            None => ("", Vec::new()),
        };
        let total = count(
            &conn,
            &format!("SELECT COUNT(*) FROM reports r {clause}"),
            Params::Positional(values.clone()),
        )
        .await?;

        values.push(Value::Integer(page.limit));
        values.push(Value::Integer(page.offset()));
        let sql = format!("{REPORT_SELECT} {clause} ORDER BY r.created_at DESC, r.rowid DESC LIMIT ? OFFSET ?");
        let mut rows = conn.query(&sql, Params::Positional(values)).await?;
        let mut reports = Vec::new();
        while let Some(row) = rows.next().await? {
            reports.push(row_to_report(&row)?);
        }
        Ok((reports, total))
    }

    /// Number of reports per status; statuses with no reports are omitted.
    pub async fn report_status_counts(&self) -> Result<Vec<(ReportStatus, i64)>> {
        let conn = self.conn().await?;
        let mut rows = conn
            .query(
                "SELECT status, COUNT(*) FROM reports GROUP BY status ORDER BY status",
                (),
            )
            .await?;
        let mut counts = Vec::new();
        while let Some(row) = rows.next().await? {
            let status: String = row.get(0)?;
            counts.push((status.parse()?, row.get::<i64>(1)?));
        }
        Ok(counts)
    }

    pub async fn count_reports(&self, status: ReportStatus) -> Result<i64> {
        let conn = self.conn().await?;
        count(
            &conn,
            "SELECT COUNT(*) FROM reports WHERE status = ?1",
            params![status.as_str()],
        )
        .await
    }

    /// Moves a report through review. Closing states stamp `resolved_at`.
    pub async fn update_report(
        &self,
        id: &str,
        status: Option<ReportStatus>,
        admin_notes: Option<&str>,
    ) -> Result<Option<ReportRecord>> {
        let now = timestamp(Utc::now());
        let mut set = Assignments::default();
        if let Some(status) = status {
            set.set("status", text_value(status.as_str()));
            if status.is_closed() {
                set.set("resolved_at", text_value(now.as_str()));
            }
        }
        if let Some(notes) = admin_notes {
            set.set("admin_notes", text_value(notes));
        }
        set.set("updated_at", text_value(now));

        let conn = self.conn().await?;
        let changed = conn
            .execute(
                &format!("UPDATE reports SET {} WHERE id = ?", set.sql()),
                set.params_with_key(id),
            )
            .await
            .with_context(|| format!("updating report {id}"))?;
        if changed == 0 {
            return Ok(None);
        }
        self.get_report(id).await
    }
}
