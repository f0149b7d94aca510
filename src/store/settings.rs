use anyhow::{Context, Result};
use chrono::Utc;
use libsql::{Row, params};

use super::{CatalogStore, parse_timestamp, timestamp};
use crate::models::{SettingRecord, SettingType};

const SETTING_SELECT: &str =
    "SELECT key, value_json, value_type, description, created_at, updated_at FROM settings";

fn row_to_setting(row: &Row) -> Result<SettingRecord> {
    let key: String = row.get(0)?;
    let value_json: String = row.get(1)?;
    let value_type: String = row.get(2)?;
    let created_at: String = row.get(4)?;
    let updated_at: String = row.get(5)?;
    Ok(SettingRecord {
        value: serde_json::from_str(&value_json)
            .with_context(|| format!("decoding setting {key}"))?,
        key,
        value_type: value_type.parse()?,
        description: row.get(3)?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

/// Type recorded for a value when the caller does not name one.
pub fn infer_setting_type(value: &serde_json::Value) -> SettingType {
    match value {
        serde_json::Value::Bool(_) => SettingType::Boolean,
        serde_json::Value::Number(_) => SettingType::Number,
        serde_json::Value::String(_) => SettingType::String,
        serde_json::Value::Array(_) => SettingType::Array,
        serde_json::Value::Null | serde_json::Value::Object(_) => SettingType::Json,
    }
}

impl CatalogStore {
    pub async fn list_settings(&self) -> Result<Vec<SettingRecord>> {
        let conn = self.conn().await?;
        let mut rows = conn
            .query(&format!("{SETTING_SELECT} ORDER BY key ASC"), ())
            .await?;
        let mut settings = Vec::new();
        while let Some(row) = rows.next().await? {
            settings.push(row_to_setting(&row)?);
        }
        Ok(settings)
    }

    pub async fn get_setting(&self, key: &str) -> Result<Option<SettingRecord>> {
        let conn = self.conn().await?;
        let mut rows = conn
            .query(&format!("{SETTING_SELECT} WHERE key = ?1"), params![key])
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_setting(&row)?)),
            None => Ok(None),
        }
    }

    /// Creates or replaces a setting. A missing `value_type` is inferred from
    /// the value; a missing description keeps the stored one.
    pub async fn put_setting(
        &self,
        key: &str,
        value: &serde_json::Value,
        value_type: Option<SettingType>,
        description: Option<&str>,
    ) -> Result<SettingRecord> {
        let value_type = value_type.unwrap_or_else(|| infer_setting_type(value));
        let value_json = serde_json::to_string(value).context("encoding setting value")?;
        let now = timestamp(Utc::now());

        let conn = self.conn().await?;
        conn.execute(
            r#"
            INSERT INTO settings (key, value_json, value_type, description, created_at, updated_at)
            VALUES (?1, ?2, ?3, COALESCE(?4, ''), ?5, ?5)
            ON CONFLICT(key) DO UPDATE SET
                value_json = excluded.value_json,
                value_type = excluded.value_type,
                description = COALESCE(?4, settings.description),
                updated_at = excluded.updated_at
            "#,
            params![key, value_json, value_type.as_str(), description, now.as_str()],
        )
        .await
        .with_context(|| format!("saving setting {key}"))?;

        self.get_setting(key)
            .await?
            .with_context(|| format!("setting {key} missing after save"))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::create_store;
    use super::*;
    use serde_json::json;

    #[test]
    fn types_follow_json_shape() {
        assert_eq!(infer_setting_type(&json!("x")), SettingType::String);
        assert_eq!(infer_setting_type(&json!(3)), SettingType::Number);
        assert_eq!(infer_setting_type(&json!(true)), SettingType::Boolean);
        assert_eq!(infer_setting_type(&json!([1])), SettingType::Array);
        assert_eq!(infer_setting_type(&json!({"a": 1})), SettingType::Json);
    }

    #[tokio::test]
    async fn put_upserts_and_keeps_description() -> Result<()> {
        let (_dir, store) = create_store().await?;
        assert!(store.get_setting("site_name").await?.is_none());

        let first = store
            .put_setting("site_name", &json!("Vault"), None, Some("Shown in the header"))
            .await?;
        assert_eq!(first.value_type, SettingType::String);

        let second = store
            .put_setting("site_name", &json!({"text": "Vault 2"}), None, None)
            .await?;
        assert_eq!(second.value, json!({"text": "Vault 2"}));
        assert_eq!(second.value_type, SettingType::Json);
        assert_eq!(second.description, "Shown in the header");
        assert_eq!(second.created_at, first.created_at);

        store
            .put_setting("ads_enabled", &json!(true), Some(SettingType::Boolean), None)
            .await?;
        let keys: Vec<_> = store.list_settings().await?.into_iter().map(|s| s.key).collect();
        assert_eq!(keys, vec!["ads_enabled", "site_name"]);
        Ok(())
    }
}
