use std::collections::BTreeMap;

use axum::{
    Router,
    extract::{Path, Query, State},
    routing::{get, post, put},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use super::{ApiJson, AppState, JsonResult, success};
use crate::auth::AdminClaims;
use crate::error::{ApiError, StoreContext};
use crate::models::{AdDevice, AdInput, AdPlacement, AdRecord};
use crate::store::AdEvent;

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/ads", get(active_ads).post(create_ad))
        .route("/api/ads/placement/{placement}", get(ad_for_placement))
        .route("/api/ads/admin/all", get(all_ads))
        .route("/api/ads/admin/placements", get(placements))
        .route("/api/ads/{id}", put(update_ad).delete(delete_ad))
        .route("/api/ads/{id}/impression", post(record_impression))
        .route("/api/ads/{id}/click", post(record_click))
        .route("/api/ads/{id}/toggle", put(toggle_ad))
}

#[derive(Debug, Default, Deserialize)]
struct DeviceQuery {
    device: Option<String>,
}

impl DeviceQuery {
    /// Defaults to desktop. A device we do not know only sees ads targeted
    /// at every device.
    fn device(&self) -> AdDevice {
        match self.device.as_deref().map(str::trim) {
            None | Some("") => AdDevice::Desktop,
            Some(raw) => raw.parse().unwrap_or(AdDevice::All),
        }
    }
}

async fn active_ads(State(state): State<AppState>, Query(query): Query<DeviceQuery>) -> JsonResult {
    let ads = state
        .store
        .active_ads(query.device(), Utc::now())
        .await
        .or_internal("Failed to get ads")?;
    let mut by_placement: BTreeMap<&'static str, Vec<AdRecord>> = BTreeMap::new();
    for ad in ads {
        by_placement.entry(ad.placement.as_str()).or_default().push(ad);
    }
    Ok(success(json!({ "ads": by_placement })))
}

async fn ad_for_placement(
    State(state): State<AppState>,
    Path(placement): Path<String>,
    Query(query): Query<DeviceQuery>,
) -> JsonResult {
    let Ok(placement) = placement.parse::<AdPlacement>() else {
        return Ok(success(json!({ "ad": null })));
    };
    let ad = state
        .store
        .active_ad_for_placement(placement, query.device(), Utc::now())
        .await
        .or_internal("Failed to get ad")?;
    Ok(success(json!({ "ad": ad })))
}

/// Counters are fire-and-forget from the site; unknown ids are not an error.
async fn record_event(state: &AppState, id: &str, event: AdEvent, failure: &str) -> JsonResult {
    let found = state
        .store
        .record_ad_event(id, event)
        .await
        .or_internal(failure)?;
    if !found {
        tracing::debug!(ad_id = id, ?event, "event for unknown ad ignored");
    }
    Ok(success(json!({})))
}

async fn record_impression(State(state): State<AppState>, Path(id): Path<String>) -> JsonResult {
    record_event(&state, &id, AdEvent::Impression, "Failed to record impression").await
}

async fn record_click(State(state): State<AppState>, Path(id): Path<String>) -> JsonResult {
    record_event(&state, &id, AdEvent::Click, "Failed to record click").await
}

async fn all_ads(_admin: AdminClaims, State(state): State<AppState>) -> JsonResult {
    let ads = state.store.list_ads().await.or_internal("Failed to get ads")?;
    Ok(success(json!({ "ads": ads })))
}

async fn placements(_admin: AdminClaims) -> JsonResult {
    let placements: Vec<_> = AdPlacement::ALL
        .iter()
        .map(|placement| {
            let (name, size) = placement.describe();
            json!({ "id": placement.as_str(), "name": name, "size": size })
        })
        .collect();
    Ok(success(json!({ "placements": placements })))
}

async fn create_ad(
    _admin: AdminClaims,
    State(state): State<AppState>,
    ApiJson(input): ApiJson<AdInput>,
) -> JsonResult {
    let present = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.trim().is_empty());
    if !present(&input.name) || input.placement.is_none() || !present(&input.code) {
        return Err(ApiError::bad_request("Name, placement, and code are required"));
    }
    let ad = state
        .store
        .create_ad(&input)
        .await
        .or_internal("Failed to create ad")?;
    tracing::info!(ad_id = %ad.id, placement = %ad.placement, "ad created");
    Ok(success(json!({ "ad": ad, "message": "Ad created successfully" })))
}

async fn update_ad(
    _admin: AdminClaims,
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(input): ApiJson<AdInput>,
) -> JsonResult {
    let ad = state
        .store
        .update_ad(&id, &input)
        .await
        .or_internal("Failed to update ad")?
        .ok_or_else(|| ApiError::not_found("Ad not found"))?;
    Ok(success(json!({ "ad": ad, "message": "Ad updated successfully" })))
}

async fn delete_ad(
    _admin: AdminClaims,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> JsonResult {
    if !state.store.delete_ad(&id).await.or_internal("Failed to delete ad")? {
        return Err(ApiError::not_found("Ad not found"));
    }
    Ok(success(json!({ "message": "Ad deleted successfully" })))
}

async fn toggle_ad(
    _admin: AdminClaims,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> JsonResult {
    let enabled = state
        .store
        .toggle_ad(&id)
        .await
        .or_internal("Failed to toggle ad")?
        .ok_or_else(|| ApiError::not_found("Ad not found"))?;
    let message = if enabled { "Ad enabled" } else { "Ad disabled" };
    Ok(success(json!({ "enabled": enabled, "message": message })))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{TestApp, test_app};
    use axum::http::StatusCode;
    use serde_json::{Value, json};

    async fn create(app: &TestApp, body: Value) -> String {
        let (status, body) = app.admin_json("POST", "/api/ads", body).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["ad"]["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn create_requires_core_fields() {
        let app = test_app().await;
        let (status, body) = app
            .admin_json("POST", "/api/ads", json!({"name": "x", "placement": "home_top"}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Name, placement, and code are required");
    }

    #[tokio::test]
    async fn public_listing_groups_by_placement_and_filters_device() {
        let app = test_app().await;
        create(&app, json!({"name": "top", "placement": "home_top", "code": "<b>", "priority": 1})).await;
        create(&app, json!({"name": "top2", "placement": "home_top", "code": "<i>", "priority": 5})).await;
        create(&app, json!({"name": "mob", "placement": "home_sidebar", "code": "<m>", "device": "mobile"})).await;
        create(
            &app,
            json!({"name": "old", "placement": "home_footer", "code": "<o>", "endDate": "2001-01-01T00:00:00Z"}),
        )
        .await;

        let (status, body) = app.get("/api/ads?device=desktop").await;
        assert_eq!(status, StatusCode::OK);
        let ads = body["ads"].as_object().unwrap();
        assert_eq!(ads.len(), 1);
        let top = ads["home_top"].as_array().unwrap();
        assert_eq!(top[0]["name"], "top2");
        assert_eq!(top[1]["name"], "top");

        let (_, body) = app.get("/api/ads?device=mobile").await;
        assert!(body["ads"]["home_sidebar"].is_array());

        let (_, body) = app.get("/api/ads/placement/home_top").await;
        assert_eq!(body["ad"]["name"], "top2");
        let (_, body) = app.get("/api/ads/placement/nowhere").await;
        assert!(body["ad"].is_null());
    }

    #[tokio::test]
    async fn counters_toggle_and_delete() {
        let app = test_app().await;
        let id = create(&app, json!({"name": "a", "placement": "popunder", "code": "c"})).await;

        for _ in 0..4 {
            app.json("POST", &format!("/api/ads/{id}/impression"), json!({})).await;
        }
        let (status, body) = app.json("POST", &format!("/api/ads/{id}/click"), json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);

        let (_, body) = app.admin_get("/api/ads/admin/all").await;
        assert_eq!(body["ads"][0]["impressions"], 4);
        assert_eq!(body["ads"][0]["ctr"], 25.0);

        let (_, body) = app
            .admin_json("PUT", &format!("/api/ads/{id}/toggle"), json!({}))
            .await;
        assert_eq!(body["enabled"], false);
        assert_eq!(body["message"], "Ad disabled");

        let (status, body) = app
            .admin_json("PUT", &format!("/api/ads/{id}"), json!({"name": "renamed"}))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ad"]["name"], "renamed");

        let (status, _) = app.admin_json("DELETE", &format!("/api/ads/{id}"), json!({})).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = app.admin_json("DELETE", &format!("/api/ads/{id}"), json!({})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Ad not found");
    }

    #[tokio::test]
    async fn placement_catalog_lists_every_slot() {
        let app = test_app().await;
        let (_, body) = app.admin_get("/api/ads/admin/placements").await;
        let placements = body["placements"].as_array().unwrap();
        assert_eq!(placements.len(), 12);
        assert_eq!(
            placements[0],
            json!({"id": "home_top", "name": "Home - Top Banner", "size": "728x90"})
        );
    }
}
