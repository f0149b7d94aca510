use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use libsql::{Connection, Row, Value, params, params::IntoParams};

use super::{
    Assignments, CatalogStore, bool_value, count, new_id, optional_text,
    parse_optional_timestamp, parse_timestamp, text_value, timestamp,
};
use crate::models::{AdDevice, AdInput, AdPlacement, AdRecord, AdSize, AdType, click_through_rate};

const AD_SELECT: &str = r#"
    SELECT id, name, placement, ad_type, code, image_url, target_url, size_json,
           device, enabled, impressions, clicks, start_date, end_date, priority,
           created_at, updated_at
    FROM ads
"#;

/// Servable right now: enabled, matching device, inside the schedule window.
const ACTIVE_FILTER: &str = r#"
    enabled = 1
    AND device IN ('all', ?1)
    AND (start_date IS NULL OR start_date <= ?2)
    AND (end_date IS NULL OR end_date >= ?2)
"#;

fn row_to_ad(row: &Row) -> Result<AdRecord> {
    let placement: String = row.get(2)?;
    let ad_type: String = row.get(3)?;
    let size_json: String = row.get(7)?;
    let device: String = row.get(8)?;
    let enabled: i64 = row.get(9)?;
    let impressions: i64 = row.get(10)?;
    let clicks: i64 = row.get(11)?;
    let created_at: String = row.get(15)?;
    let updated_at: String = row.get(16)?;
    Ok(AdRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        placement: placement.parse()?,
        ad_type: ad_type.parse()?,
        code: row.get(4)?,
        image_url: row.get(5)?,
        target_url: row.get(6)?,
        size: serde_json::from_str(&size_json).context("parsing ad size")?,
        device: device.parse()?,
        enabled: enabled != 0,
        impressions,
        clicks,
        start_date: parse_optional_timestamp(row.get(12)?)?,
        end_date: parse_optional_timestamp(row.get(13)?)?,
        priority: row.get(14)?,
        ctr: click_through_rate(clicks, impressions),
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

async fn collect_ads(conn: &Connection, sql: &str, params: impl IntoParams) -> Result<Vec<AdRecord>> {
    let mut rows = conn.query(sql, params).await?;
    let mut ads = Vec::new();
    while let Some(row) = rows.next().await? {
        ads.push(row_to_ad(&row)?);
    }
    Ok(ads)
}

fn optional_timestamp(value: Option<DateTime<Utc>>) -> Value {
    optional_text(value.map(timestamp).as_deref())
}

fn size_json(size: AdSize) -> Result<String> {
    serde_json::to_string(&size).context("serializing ad size")
}

/// Counter bumped by the public tracking endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdEvent {
    Impression,
    Click,
}

impl CatalogStore {
    /// Inserts an ad. `name`, `placement` and `code` must be present; the
    /// remaining fields take their defaults when absent.
    pub async fn create_ad(&self, input: &AdInput) -> Result<AdRecord> {
        let name = input.name.as_deref().context("ad name is required")?;
        let placement = input.placement.context("ad placement is required")?;
        let code = input.code.as_deref().context("ad code is required")?;
        let id = new_id();
        let now = timestamp(Utc::now());

        let conn = self.conn().await?;
        conn.execute(
            r#"
            INSERT INTO ads (
                id, name, placement, ad_type, code, image_url, target_url, size_json,
                device, enabled, start_date, end_date, priority, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14)
            "#,
            params![
                id.as_str(),
                name,
                placement.as_str(),
                input.ad_type.unwrap_or(AdType::Script).as_str(),
                code,
                input.image_url.as_deref().unwrap_or(""),
                input.target_url.as_deref().unwrap_or(""),
                size_json(input.size.unwrap_or_default())?,
                input.device.unwrap_or(AdDevice::All).as_str(),
                input.enabled.unwrap_or(true),
                optional_timestamp(input.start_date.flatten()),
                optional_timestamp(input.end_date.flatten()),
                input.priority.unwrap_or(0),
                now.as_str(),
            ],
        )
        .await
        .with_context(|| format!("inserting ad {name}"))?;

        self.get_ad(&id)
            .await?
            .with_context(|| format!("ad {id} missing after insert"))
    }

    pub async fn get_ad(&self, id: &str) -> Result<Option<AdRecord>> {
        let conn = self.conn().await?;
        let mut ads = collect_ads(&conn, &format!("{AD_SELECT} WHERE id = ?1"), params![id]).await?;
        Ok(ads.pop())
    }

    /// Every ad, grouped by placement then highest priority first.
    pub async fn list_ads(&self) -> Result<Vec<AdRecord>> {
        let conn = self.conn().await?;
        let sql = format!("{AD_SELECT} ORDER BY placement ASC, priority DESC, created_at ASC");
        collect_ads(&conn, &sql, ()).await
    }

    pub async fn list_ads_by_impressions(&self) -> Result<Vec<AdRecord>> {
        let conn = self.conn().await?;
        let sql = format!("{AD_SELECT} ORDER BY impressions DESC, created_at ASC");
        collect_ads(&conn, &sql, ()).await
    }

    /// Ads servable to `device` at `now`, highest priority first.
    pub async fn active_ads(&self, device: AdDevice, now: DateTime<Utc>) -> Result<Vec<AdRecord>> {
        let conn = self.conn().await?;
        let sql = format!(
            "{AD_SELECT} WHERE {ACTIVE_FILTER} ORDER BY priority DESC, placement ASC, created_at ASC"
        );
        collect_ads(&conn, &sql, params![device.as_str(), timestamp(now)]).await
    }

    pub async fn active_ad_for_placement(
        &self,
        placement: AdPlacement,
        device: AdDevice,
        now: DateTime<Utc>,
    ) -> Result<Option<AdRecord>> {
        let conn = self.conn().await?;
        let sql = format!(
            "{AD_SELECT} WHERE {ACTIVE_FILTER} AND placement = ?3 ORDER BY priority DESC, created_at ASC LIMIT 1"
        );
        let mut ads = collect_ads(
            &conn,
            &sql,
            params![device.as_str(), timestamp(now), placement.as_str()],
        )
        .await?;
        Ok(ads.pop())
    }

    /// Applies the fields present in `input`; explicit `null` clears the
    /// schedule dates.
    pub async fn update_ad(&self, id: &str, input: &AdInput) -> Result<Option<AdRecord>> {
        let mut set = Assignments::default();
        if let Some(name) = &input.name {
            set.set("name", text_value(name.as_str()));
        }
        if let Some(placement) = input.placement {
            set.set("placement", text_value(placement.as_str()));
        }
        if let Some(ad_type) = input.ad_type {
            set.set("ad_type", text_value(ad_type.as_str()));
        }
        if let Some(code) = &input.code {
            set.set("code", text_value(code.as_str()));
        }
        if let Some(image_url) = &input.image_url {
            set.set("image_url", text_value(image_url.as_str()));
        }
        if let Some(target_url) = &input.target_url {
            set.set("target_url", text_value(target_url.as_str()));
        }
        if let Some(size) = input.size {
            set.set("size_json", Value::Text(size_json(size)?));
        }
        if let Some(device) = input.device {
            set.set("device", text_value(device.as_str()));
        }
        if let Some(enabled) = input.enabled {
            set.set("enabled", bool_value(enabled));
        }
        if let Some(start_date) = input.start_date {
            set.set("start_date", optional_timestamp(start_date));
        }
        if let Some(end_date) = input.end_date {
            set.set("end_date", optional_timestamp(end_date));
        }
        if let Some(priority) = input.priority {
            set.set("priority", priority.into());
        }
        set.set("updated_at", text_value(timestamp(Utc::now())));

        let conn = self.conn().await?;
        let changed = conn
            .execute(
                &format!("UPDATE ads SET {} WHERE id = ?", set.sql()),
                set.params_with_key(id),
            )
            .await
            .with_context(|| format!("updating ad {id}"))?;
        if changed == 0 {
            return Ok(None);
        }
        self.get_ad(id).await
    }

    pub async fn delete_ad(&self, id: &str) -> Result<bool> {
        let conn = self.conn().await?;
        let deleted = conn.execute("DELETE FROM ads WHERE id = ?1", params![id]).await?;
        Ok(deleted > 0)
    }

    pub async fn toggle_ad(&self, id: &str) -> Result<Option<bool>> {
        let conn = self.conn().await?;
        let mut rows = conn
            .query(
                "UPDATE ads SET enabled = 1 - enabled, updated_at = ?2 WHERE id = ?1 RETURNING enabled",
                params![id, timestamp(Utc::now())],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row.get::<i64>(0)? != 0)),
            None => Ok(None),
        }
    }

    /// Bumps a tracking counter; `false` when the ad does not exist.
    pub async fn record_ad_event(&self, id: &str, event: AdEvent) -> Result<bool> {
        let sql = match event {
            AdEvent::Impression => "UPDATE ads SET impressions = impressions + 1 WHERE id = ?1",
            AdEvent::Click => "UPDATE ads SET clicks = clicks + 1 WHERE id = ?1",
        };
        let conn = self.conn().await?;
        Ok(conn.execute(sql, params![id]).await? > 0)
    }

    pub async fn count_enabled_ads(&self) -> Result<i64> {
        let conn = self.conn().await?;
        count(&conn, "SELECT COUNT(*) FROM ads WHERE enabled = 1", ()).await
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::create_store;
    use super::*;
    use chrono::Duration;

    fn input(name: &str, placement: AdPlacement) -> AdInput {
        AdInput {
            name: Some(name.into()),
            placement: Some(placement),
            code: Some("<div></div>".into()),
            ..AdInput::default()
        }
    }

    #[tokio::test]
    async fn create_applies_defaults() -> Result<()> {
        let (_dir, store) = create_store().await?;
        let ad = store.create_ad(&input("Top", AdPlacement::HomeTop)).await?;
        assert_eq!(ad.ad_type, AdType::Script);
        assert_eq!(ad.device, AdDevice::All);
        assert_eq!(ad.size, AdSize::default());
        assert!(ad.enabled);
        assert_eq!(ad.ctr, 0.0);

        let missing_code = AdInput {
            code: None,
            ..input("x", AdPlacement::HomeTop)
        };
        assert!(store.create_ad(&missing_code).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn active_ads_respect_device_schedule_and_priority() -> Result<()> {
        let (_dir, store) = create_store().await?;
        let now = Utc::now();

        let low = store.create_ad(&input("low", AdPlacement::HomeTop)).await?;
        let high = store
            .create_ad(&AdInput {
                priority: Some(10),
                ..input("high", AdPlacement::HomeTop)
            })
            .await?;
        store
            .create_ad(&AdInput {
                device: Some(AdDevice::Mobile),
                priority: Some(50),
                ..input("mobile", AdPlacement::HomeTop)
            })
            .await?;
        store
            .create_ad(&AdInput {
                start_date: Some(Some(now + Duration::days(1))),
                priority: Some(99),
                ..input("future", AdPlacement::HomeTop)
            })
            .await?;
        store
            .create_ad(&AdInput {
                end_date: Some(Some(now - Duration::days(1))),
                priority: Some(99),
                ..input("expired", AdPlacement::HomeTop)
            })
            .await?;
        store
            .create_ad(&AdInput {
                enabled: Some(false),
                priority: Some(99),
                ..input("off", AdPlacement::HomeTop)
            })
            .await?;

        let desktop = store.active_ads(AdDevice::Desktop, now).await?;
        let names: Vec<_> = desktop.iter().map(|ad| ad.name.as_str()).collect();
        assert_eq!(names, vec!["high", "low"]);

        let best = store
            .active_ad_for_placement(AdPlacement::HomeTop, AdDevice::Mobile, now)
            .await?
            .unwrap();
        assert_eq!(best.name, "mobile");
        assert!(
            store
                .active_ad_for_placement(AdPlacement::Popunder, AdDevice::Desktop, now)
                .await?
                .is_none()
        );

        assert_eq!(store.toggle_ad(&high.id).await?, Some(false));
        let desktop = store.active_ads(AdDevice::Desktop, now).await?;
        assert_eq!(desktop.len(), 1);
        assert_eq!(desktop[0].id, low.id);
        Ok(())
    }

    #[tokio::test]
    async fn counters_drive_ctr() -> Result<()> {
        let (_dir, store) = create_store().await?;
        let ad = store.create_ad(&input("tracked", AdPlacement::WatchBelow)).await?;
        for _ in 0..3 {
            assert!(store.record_ad_event(&ad.id, AdEvent::Impression).await?);
        }
        assert!(store.record_ad_event(&ad.id, AdEvent::Click).await?);
        assert!(!store.record_ad_event("missing", AdEvent::Click).await?);

        let reloaded = store.get_ad(&ad.id).await?.unwrap();
        assert_eq!(reloaded.impressions, 3);
        assert_eq!(reloaded.clicks, 1);
        assert_eq!(reloaded.ctr, 33.33);
        Ok(())
    }

    #[tokio::test]
    async fn update_clears_schedule_and_keeps_other_fields() -> Result<()> {
        let (_dir, store) = create_store().await?;
        let ad = store
            .create_ad(&AdInput {
                end_date: Some(Some(Utc::now() + Duration::days(3))),
                ..input("sched", AdPlacement::SearchTop)
            })
            .await?;
        assert!(ad.end_date.is_some());

        let patch = AdInput {
            end_date: Some(None),
            priority: Some(7),
            ..AdInput::default()
        };
        let updated = store.update_ad(&ad.id, &patch).await?.unwrap();
        assert!(updated.end_date.is_none());
        assert_eq!(updated.priority, 7);
        assert_eq!(updated.name, "sched");

        assert!(store.update_ad("missing", &patch).await?.is_none());
        assert!(store.delete_ad(&ad.id).await?);
        assert!(!store.delete_ad(&ad.id).await?);
        assert_eq!(store.count_enabled_ads().await?, 0);
        Ok(())
    }
}
