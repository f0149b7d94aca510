//! Catalog persistence on an embedded libsql database.
//!
//! Every operation opens a short-lived connection from the shared
//! [`Database`], so the store is cheap to clone into handlers and background
//! tasks. Writes that touch more than one table run inside a transaction.

mod ads;
mod analytics;
mod categories;
mod reports;
mod settings;
mod videos;
mod views;

use std::{path::Path, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{
    Builder, Connection, Database, Transaction, TransactionBehavior, Value,
    params::{IntoParams, Params},
};

pub use ads::AdEvent;
pub use analytics::{CategoryStat, DashboardStats, DayViews, PublicStats, UploadDay, start_of_day};
pub use categories::CategoryWrite;
pub use videos::{VideoQuery, VideoSort};
pub use views::{Reaction, ViewEvent};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

async fn configure_connection(conn: &Connection) -> Result<()> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute_batch("PRAGMA foreign_keys=ON;").await?;
    Ok(())
}

async fn ensure_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode=WAL;
        PRAGMA synchronous=NORMAL;

        CREATE TABLE IF NOT EXISTS categories (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE COLLATE NOCASE,
            slug TEXT NOT NULL UNIQUE,
            description TEXT NOT NULL DEFAULT '',
            thumbnail TEXT NOT NULL DEFAULT '',
            icon TEXT NOT NULL DEFAULT '📁',
            video_count INTEGER NOT NULL DEFAULT 0,
            sort_order INTEGER NOT NULL DEFAULT 0,
            is_active INTEGER NOT NULL DEFAULT 1,
            color TEXT NOT NULL DEFAULT '#6366f1',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS videos (
            id TEXT PRIMARY KEY,
            file_code TEXT NOT NULL UNIQUE,
            embed_code TEXT NOT NULL,
            title TEXT NOT NULL,
            slug TEXT NOT NULL UNIQUE,
            description TEXT NOT NULL DEFAULT '',
            thumbnail TEXT NOT NULL,
            thumbnail_public_id TEXT,
            duration TEXT NOT NULL DEFAULT '00:00',
            category_id TEXT REFERENCES categories(id) ON DELETE SET NULL,
            tags_json TEXT NOT NULL DEFAULT '[]',
            views INTEGER NOT NULL DEFAULT 0,
            likes INTEGER NOT NULL DEFAULT 0,
            dislikes INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'public',
            featured INTEGER NOT NULL DEFAULT 0,
            upload_date TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_videos_status_upload ON videos(status, upload_date);
        CREATE INDEX IF NOT EXISTS idx_videos_views ON videos(views);
        CREATE INDEX IF NOT EXISTS idx_videos_category ON videos(category_id);

        CREATE TABLE IF NOT EXISTS ads (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            placement TEXT NOT NULL,
            ad_type TEXT NOT NULL DEFAULT 'script',
            code TEXT NOT NULL DEFAULT '',
            image_url TEXT NOT NULL DEFAULT '',
            target_url TEXT NOT NULL DEFAULT '',
            size_json TEXT NOT NULL DEFAULT '{"width":728,"height":90}',
            device TEXT NOT NULL DEFAULT 'all',
            enabled INTEGER NOT NULL DEFAULT 1,
            impressions INTEGER NOT NULL DEFAULT 0,
            clicks INTEGER NOT NULL DEFAULT 0,
            start_date TEXT,
            end_date TEXT,
            priority INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_ads_placement ON ads(placement, enabled);

        CREATE TABLE IF NOT EXISTS reports (
            id TEXT PRIMARY KEY,
            video_id TEXT NOT NULL REFERENCES videos(id) ON DELETE CASCADE,
            reason TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            email TEXT NOT NULL DEFAULT '',
            ip TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL DEFAULT 'pending',
            admin_notes TEXT NOT NULL DEFAULT '',
            resolved_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_reports_status ON reports(status, created_at);

        CREATE TABLE IF NOT EXISTS view_logs (
            video_id TEXT NOT NULL REFERENCES videos(id) ON DELETE CASCADE,
            fingerprint TEXT NOT NULL,
            user_agent TEXT NOT NULL DEFAULT '',
            referer TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            expires_at TEXT NOT NULL,
            PRIMARY KEY (video_id, fingerprint)
        );

        CREATE INDEX IF NOT EXISTS idx_view_logs_expiry ON view_logs(expires_at);

        CREATE TABLE IF NOT EXISTS daily_analytics (
            video_id TEXT NOT NULL REFERENCES videos(id) ON DELETE CASCADE,
            day TEXT NOT NULL,
            views INTEGER NOT NULL DEFAULT 0,
            unique_views INTEGER NOT NULL DEFAULT 0,
            likes INTEGER NOT NULL DEFAULT 0,
            dislikes INTEGER NOT NULL DEFAULT 0,
            shares INTEGER NOT NULL DEFAULT 0,
            avg_watch_time REAL NOT NULL DEFAULT 0,
            PRIMARY KEY (video_id, day)
        );

        CREATE INDEX IF NOT EXISTS idx_daily_analytics_day ON daily_analytics(day);

        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL,
            value_type TEXT NOT NULL DEFAULT 'string',
            description TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        "#,
    )
    .await?;
    Ok(())
}

/// Handle to the catalog database.
#[derive(Clone)]
pub struct CatalogStore {
    db: Arc<Database>,
}

impl CatalogStore {
    /// Opens (and if necessary creates) the database and its schema.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating catalog directory {}", parent.display()))?;
        }

        let db = Builder::new_local(path)
            .build()
            .await
            .with_context(|| format!("opening catalog DB {}", path.display()))?;

        let store = Self { db: Arc::new(db) };
        let conn = store.conn().await?;
        ensure_schema(&conn).await.context("creating catalog schema")?;
        Ok(store)
    }

    pub(crate) async fn conn(&self) -> Result<Connection> {
        let conn = self.db.connect()?;
        configure_connection(&conn).await?;
        Ok(conn)
    }

    /// Round-trips a trivial query; used by the health endpoint.
    pub async fn ping(&self) -> Result<()> {
        let conn = self.conn().await?;
        let mut rows = conn.query("SELECT 1", ()).await?;
        rows.next().await?;
        Ok(())
    }
}

/// Page window for list queries. Out of range input is clamped, never
/// rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: i64,
    pub limit: i64,
}

impl Page {
    pub const MAX_LIMIT: i64 = 100;

    pub fn new(page: Option<i64>, limit: Option<i64>, default_limit: i64) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(default_limit).clamp(1, Self::MAX_LIMIT),
        }
    }

    /// Saturates instead of overflowing; a page past the end is just empty.
    pub fn offset(self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }

    pub fn pages(self, total: i64) -> i64 {
        (total + self.limit - 1) / self.limit
    }
}

/// Fixed-width RFC 3339 so stored timestamps compare correctly as text.
pub(crate) fn timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("parsing stored timestamp {raw:?}"))?;
    Ok(parsed.with_timezone(&Utc))
}

pub(crate) fn parse_optional_timestamp(raw: Option<String>) -> Result<Option<DateTime<Utc>>> {
    raw.as_deref().map(parse_timestamp).transpose()
}

/// Calendar day key used by the daily analytics table.
pub(crate) fn day_key(value: DateTime<Utc>) -> String {
    value.format("%Y-%m-%d").to_string()
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// `%needle%` with LIKE wildcards in the needle escaped by `\`.
pub(crate) fn like_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

pub(crate) fn text_value(value: impl Into<String>) -> Value {
    Value::Text(value.into())
}

pub(crate) fn optional_text(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |text| Value::Text(text.to_owned()))
}

pub(crate) fn bool_value(value: bool) -> Value {
    Value::Integer(i64::from(value))
}

/// Accumulates `WHERE` clauses together with their positional values.
#[derive(Default)]
pub(crate) struct Filter {
    clauses: Vec<String>,
    values: Vec<Value>,
}

impl Filter {
    pub(crate) fn push(&mut self, clause: impl Into<String>, values: impl IntoIterator<Item = Value>) {
        self.clauses.push(clause.into());
        self.values.extend(values);
    }

    pub(crate) fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.clauses.join(" AND "))
        }
    }

    /// Values for the filter followed by `extra` (e.g. `LIMIT`/`OFFSET`).
    pub(crate) fn params(&self, extra: impl IntoIterator<Item = Value>) -> Params {
        let mut values = self.values.clone();
        values.extend(extra);
        Params::Positional(values)
    }
}

/// Write transactions take the lock up front so concurrent writers queue on
/// the busy timeout instead of failing on upgrade.
pub(crate) async fn begin_write(conn: &Connection) -> Result<Transaction> {
    Ok(conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .await?)
}

/// Column assignments for a partial update.
#[derive(Default)]
pub(crate) struct Assignments {
    columns: Vec<&'static str>,
    values: Vec<Value>,
}

impl Assignments {
    pub(crate) fn set(&mut self, column: &'static str, value: Value) {
        self.columns.push(column);
        self.values.push(value);
    }

    pub(crate) fn sql(&self) -> String {
        self.columns
            .iter()
            .map(|column| format!("{column} = ?"))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Assigned values followed by the row key for the trailing `WHERE id = ?`.
    pub(crate) fn params_with_key(&self, key: &str) -> Params {
        let mut values = self.values.clone();
        values.push(text_value(key));
        Params::Positional(values)
    }
}

pub(crate) async fn count(conn: &Connection, sql: &str, params: impl IntoParams) -> Result<i64> {
    let mut rows = conn.query(sql, params).await?;
    match rows.next().await? {
        Some(row) => Ok(row.get::<Option<i64>>(0)?.unwrap_or(0)),
        None => Ok(0),
    }
}
