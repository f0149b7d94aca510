use axum::{
    Router,
    extract::{Path, Query, State},
    routing::{get, post, put},
};
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::{Value, json};

use super::{ApiJson, AppState, JsonResult, PageQuery, Pagination, TagsInput, filled, success};
use crate::auth::AdminClaims;
use crate::error::{ApiError, StoreContext};
use crate::models::{
    MAX_DESCRIPTION_LEN, MAX_TITLE_LEN, SettingType, VideoPatch, VideoStatus, double_option,
    truncate_chars,
};
use crate::store::{VideoQuery, VideoSort, day_key, start_of_day};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/admin/login", post(login))
        .route("/api/admin/verify", post(verify))
        .route("/api/admin/dashboard", get(dashboard))
        .route("/api/admin/videos", get(list_videos))
        .route("/api/admin/videos/bulk-delete", post(bulk_delete))
        .route("/api/admin/videos/{id}", put(update_video).delete(delete_video))
        .route("/api/admin/videos/{id}/feature", put(toggle_featured))
        .route("/api/admin/videos/{id}/status", put(set_status))
        .route("/api/admin/settings", get(list_settings))
        .route("/api/admin/settings/{key}", get(get_setting).put(put_setting))
}

#[derive(Debug, Deserialize)]
struct LoginBody {
    #[serde(default)]
    password: String,
    username: Option<String>,
}

async fn login(State(state): State<AppState>, ApiJson(body): ApiJson<LoginBody>) -> JsonResult {
    let issued = state
        .auth
        .login(&body.password, body.username.as_deref())
        .or_internal("Login failed")?;
    let Some((token, claims)) = issued else {
        tracing::warn!("admin login rejected");
        return Err(ApiError::unauthorized("Invalid credentials"));
    };
    tracing::info!(username = %claims.username, "admin logged in");
    Ok(success(json!({
        "token": token,
        "admin": { "username": claims.username, "role": "admin" },
        "message": "Login successful",
    })))
}

async fn verify(admin: AdminClaims) -> JsonResult {
    Ok(success(json!({ "admin": admin, "message": "Token is valid" })))
}

async fn dashboard(_admin: AdminClaims, State(state): State<AppState>) -> JsonResult {
    let failure = "Failed to get dashboard data";
    let now = Utc::now();
    let store = &state.store;
    let top_query = VideoQuery::public().sorted(VideoSort::Views);
    let recent_query = VideoQuery::default().sorted(VideoSort::Newest);
    let first_day = day_key(start_of_day(now) - Duration::days(6));

    let (stats, top_videos, recent_uploads, views_by_day) = tokio::try_join!(
        store.dashboard_stats(now),
        store.list_videos(&top_query, 5, 0),
        store.list_videos(&recent_query, 5, 0),
        store.views_by_day(&first_day),
    )
    .or_internal(failure)?;

    Ok(success(json!({
        "stats": {
            "totalVideos": stats.total_videos,
            "publicVideos": stats.public_videos,
            "totalViews": stats.total_views,
            "totalCategories": stats.total_categories,
            "totalAds": stats.active_ads,
            "pendingReports": stats.pending_reports,
            "todayVideos": stats.today_uploads,
            "weekVideos": stats.week_uploads,
        },
        "topVideos": top_videos,
        "recentUploads": recent_uploads,
        "viewsByDay": views_by_day,
    })))
}

fn parse_status(raw: &str) -> Result<VideoStatus, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::bad_request("Invalid status"))
}

#[derive(Debug, Default, Deserialize)]
struct AdminListQuery {
    #[serde(flatten)]
    page: PageQuery,
    search: Option<String>,
    status: Option<String>,
    featured: Option<String>,
    sort: Option<String>,
}

/// Every status is listed unless one is asked for; search covers title and
/// file code.
async fn list_videos(
    _admin: AdminClaims,
    State(state): State<AppState>,
    Query(query): Query<AdminListQuery>,
) -> JsonResult {
    let statuses = match filled(query.status.as_deref()) {
        Some(status) => vec![parse_status(&status)?],
        None => Vec::new(),
    };
    let featured = match query.featured.as_deref().map(str::trim) {
        Some("true") => Some(true),
        Some("false") => Some(false),
        _ => None,
    };
    let filter = VideoQuery {
        statuses,
        featured,
        title_or_code: filled(query.search.as_deref()),
        ..VideoQuery::default()
    }
    .sorted(VideoSort::parse(query.sort.as_deref(), VideoSort::Newest));

    let page = query.page.page(20);
    let (videos, total) = state
        .store
        .page_videos(&filter, page)
        .await
        .or_internal("Failed to get videos")?;
    Ok(success(json!({
        "videos": videos,
        "pagination": Pagination::new(page, total),
    })))
}

#[derive(Debug, Default, Deserialize)]
struct VideoUpdate {
    title: Option<String>,
    description: Option<String>,
    thumbnail: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    category: Option<Option<String>>,
    tags: Option<TagsInput>,
    status: Option<String>,
    featured: Option<bool>,
    duration: Option<String>,
}

/// Blank title, thumbnail, status or duration keep the stored value. An empty
/// or null category clears it.
async fn update_video(
    _admin: AdminClaims,
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<VideoUpdate>,
) -> JsonResult {
    let failure = "Failed to update video";
    let category = body
        .category
        .map(|category| filled(category.as_deref()));
    if let Some(Some(category_id)) = &category {
        if state
            .store
            .get_category(category_id)
            .await
            .or_internal(failure)?
            .is_none()
        {
            return Err(ApiError::bad_request("Invalid category"));
        }
    }
    let status = filled(body.status.as_deref())
        .map(|status| parse_status(&status))
        .transpose()?;

    let patch = VideoPatch {
        title: filled(body.title.as_deref()).map(|title| truncate_chars(&title, MAX_TITLE_LEN)),
        description: body
            .description
            .map(|description| truncate_chars(description.trim(), MAX_DESCRIPTION_LEN)),
        thumbnail: filled(body.thumbnail.as_deref()),
        category,
        tags: body.tags.map(TagsInput::into_tags),
        status,
        featured: body.featured,
        duration: filled(body.duration.as_deref()),
        ..VideoPatch::default()
    };
    let video = state
        .store
        .update_video(&id, &patch)
        .await
        .or_internal(failure)?
        .ok_or_else(|| ApiError::not_found("Video not found"))?;
    Ok(success(json!({
        "video": video,
        "message": "Video updated successfully",
    })))
}

async fn delete_video(
    _admin: AdminClaims,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> JsonResult {
    let video = state
        .store
        .delete_video(&id)
        .await
        .or_internal("Failed to delete video")?
        .ok_or_else(|| ApiError::not_found("Video not found"))?;
    tracing::info!(video_id = %video.id, file_code = %video.file_code, "video deleted");
    Ok(success(json!({ "message": "Video deleted successfully" })))
}

#[derive(Debug, Deserialize)]
struct BulkDeleteBody {
    #[serde(default)]
    ids: Vec<String>,
}

async fn bulk_delete(
    _admin: AdminClaims,
    State(state): State<AppState>,
    ApiJson(body): ApiJson<BulkDeleteBody>,
) -> JsonResult {
    if body.ids.is_empty() {
        return Err(ApiError::bad_request("No video IDs provided"));
    }
    let deleted = state
        .store
        .delete_videos(&body.ids)
        .await
        .or_internal("Failed to delete videos")?;
    tracing::info!(requested = body.ids.len(), deleted, "bulk video delete");
    Ok(success(json!({
        "deletedCount": deleted,
        "message": format!("{deleted} videos deleted"),
    })))
}

async fn toggle_featured(
    _admin: AdminClaims,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> JsonResult {
    let featured = state
        .store
        .toggle_featured(&id)
        .await
        .or_internal("Failed to toggle featured status")?
        .ok_or_else(|| ApiError::not_found("Video not found"))?;
    let message = if featured {
        "Video featured"
    } else {
        "Video unfeatured"
    };
    Ok(success(json!({ "featured": featured, "message": message })))
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    #[serde(default)]
    status: String,
}

/// Only the three visibility states can be set by hand.
async fn set_status(
    _admin: AdminClaims,
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<StatusBody>,
) -> JsonResult {
    let status = parse_status(&body.status)?;
    if status == VideoStatus::Processing {
        return Err(ApiError::bad_request("Invalid status"));
    }
    if !state
        .store
        .set_video_status(&id, status)
        .await
        .or_internal("Failed to update status")?
    {
        return Err(ApiError::not_found("Video not found"));
    }
    Ok(success(json!({ "status": status, "message": "Video status updated" })))
}

async fn list_settings(_admin: AdminClaims, State(state): State<AppState>) -> JsonResult {
    if let Some(settings) = state.cache.settings() {
        return Ok(success(json!({ "settings": settings })));
    }
    let settings = state
        .store
        .list_settings()
        .await
        .or_internal("Failed to get settings")?;
    state.cache.store_settings(settings.clone());
    Ok(success(json!({ "settings": settings })))
}

async fn get_setting(
    _admin: AdminClaims,
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> JsonResult {
    let setting = state
        .store
        .get_setting(&key)
        .await
        .or_internal("Failed to get setting")?
        .ok_or_else(|| ApiError::not_found("Setting not found"))?;
    Ok(success(json!({ "setting": setting })))
}

#[derive(Debug, Deserialize)]
struct SettingBody {
    value: Option<Value>,
    #[serde(rename = "type")]
    value_type: Option<String>,
    description: Option<String>,
}

async fn put_setting(
    _admin: AdminClaims,
    State(state): State<AppState>,
    Path(key): Path<String>,
    ApiJson(body): ApiJson<SettingBody>,
) -> JsonResult {
    let key = key.trim();
    if key.is_empty() {
        return Err(ApiError::bad_request("Setting key is required"));
    }
    let value = body
        .value
        .ok_or_else(|| ApiError::bad_request("Value is required"))?;
    let value_type = filled(body.value_type.as_deref())
        .map(|raw| {
            raw.parse::<SettingType>()
                .map_err(|_| ApiError::bad_request("Invalid setting type"))
        })
        .transpose()?;

    let setting = state
        .store
        .put_setting(key, &value, value_type, body.description.as_deref())
        .await
        .or_internal("Failed to save setting")?;
    state.cache.clear();
    tracing::info!(key, value_type = %setting.value_type, "setting saved");
    Ok(success(json!({ "setting": setting, "message": "Setting saved" })))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{PASSWORD, test_app};
    use crate::models::NewVideo;
    use crate::store::test_support::{insert_category, insert_video, sample_video};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn login_and_verify() {
        let app = test_app().await;
        let (status, body) = app
            .json("POST", "/api/admin/login", json!({"password": "nope"}))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Invalid credentials");

        let (status, body) = app
            .json(
                "POST",
                "/api/admin/login",
                json!({"password": PASSWORD, "username": "editor"}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["admin"], json!({"username": "editor", "role": "admin"}));
        let token = body["token"].as_str().unwrap().to_string();

        let request = Request::post("/api/admin/verify")
            .header("authorization", format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        let (status, body) = app.send(request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["admin"]["username"], "editor");
        assert_eq!(body["admin"]["isAdmin"], true);

        let request = Request::post("/api/admin/verify")
            .header("authorization", "Bearer forged")
            .body(Body::empty())
            .unwrap();
        let (status, body) = app.send(request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Invalid token.");
    }

    #[tokio::test]
    async fn admin_listing_searches_every_status() {
        let app = test_app().await;
        let store = &app.state.store;
        insert_video(store, "abc123", "Alpha").await.unwrap();
        let hidden = insert_video(store, "xyz789", "Beta").await.unwrap();
        store
            .set_video_status(&hidden.id, crate::models::VideoStatus::Private)
            .await
            .unwrap();

        let (_, body) = app.admin_get("/api/admin/videos?search=XYZ").await;
        assert_eq!(body["pagination"]["total"], 1);
        assert_eq!(body["videos"][0]["title"], "Beta");

        let (_, body) = app.admin_get("/api/admin/videos?sort=title").await;
        assert_eq!(body["videos"][0]["title"], "Alpha");

        let (_, body) = app.admin_get("/api/admin/videos?status=private").await;
        assert_eq!(body["pagination"]["total"], 1);
        let (status, _) = app.admin_get("/api/admin/videos?status=gone").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn update_moves_categories_and_delete_decrements() {
        let app = test_app().await;
        let store = &app.state.store;
        let music = insert_category(store, "Music").await.unwrap();
        let video = store
            .insert_video(&NewVideo {
                category_id: Some(music.id.clone()),
                ..sample_video("m1", "Song")
            })
            .await
            .unwrap();
        let uri = format!("/api/admin/videos/{}", video.id);

        let (status, body) = app
            .admin_json("PUT", &uri, json!({"category": "missing"}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid category");

        let (status, body) = app
            .admin_json(
                "PUT",
                &uri,
                json!({"title": "", "category": "", "tags": "Live, Rock", "status": "unlisted"}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["video"]["title"], "Song");
        assert!(body["video"]["category"].is_null());
        assert_eq!(body["video"]["tags"], json!(["live", "rock"]));
        assert_eq!(body["video"]["status"], "unlisted");
        assert_eq!(store.get_category(&music.id).await.unwrap().unwrap().video_count, 0);

        app.admin_json("PUT", &uri, json!({"category": &music.id})).await;
        assert_eq!(store.get_category(&music.id).await.unwrap().unwrap().video_count, 1);

        let (status, _) = app.admin_json("DELETE", &uri, json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(store.get_category(&music.id).await.unwrap().unwrap().video_count, 0);
        let (status, _) = app.admin_json("DELETE", &uri, json!({})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn feature_status_and_bulk_delete() {
        let app = test_app().await;
        let store = &app.state.store;
        let a = insert_video(store, "b1", "A").await.unwrap();
        let b = insert_video(store, "b2", "B").await.unwrap();

        let (_, body) = app
            .admin_json("PUT", &format!("/api/admin/videos/{}/feature", a.id), json!({}))
            .await;
        assert_eq!(body["featured"], true);
        assert_eq!(body["message"], "Video featured");

        let status_uri = format!("/api/admin/videos/{}/status", a.id);
        let (status, _) = app
            .admin_json("PUT", &status_uri, json!({"status": "processing"}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (_, body) = app
            .admin_json("PUT", &status_uri, json!({"status": "private"}))
            .await;
        assert_eq!(body["status"], "private");

        let (status, body) = app
            .admin_json("POST", "/api/admin/videos/bulk-delete", json!({"ids": []}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No video IDs provided");

        let (_, body) = app
            .admin_json(
                "POST",
                "/api/admin/videos/bulk-delete",
                json!({"ids": [a.id, b.id, "ghost"]}),
            )
            .await;
        assert_eq!(body["deletedCount"], 2);
        assert_eq!(body["message"], "2 videos deleted");
    }

    #[tokio::test]
    async fn dashboard_lists_top_and_recent() {
        let app = test_app().await;
        let video = insert_video(&app.state.store, "top1", "Top").await.unwrap();
        app.json("POST", &format!("/api/videos/{}/view", video.id), json!({}))
            .await;

        let (status, body) = app.admin_get("/api/admin/dashboard").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["stats"]["totalVideos"], 1);
        assert_eq!(body["stats"]["totalViews"], 1);
        assert_eq!(body["topVideos"][0]["file_code"], "top1");
        assert_eq!(body["recentUploads"].as_array().unwrap().len(), 1);
        assert_eq!(body["viewsByDay"][0]["views"], 1);
    }

    #[tokio::test]
    async fn settings_are_cached_until_written() {
        let app = test_app().await;
        let (_, body) = app.admin_get("/api/admin/settings").await;
        assert_eq!(body["settings"], json!([]));

        let (status, body) = app
            .admin_json(
                "PUT",
                "/api/admin/settings/site_name",
                json!({"value": "Vault", "description": "Shown in the header"}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["setting"]["type"], "string");

        let (_, body) = app.admin_get("/api/admin/settings").await;
        assert_eq!(body["settings"][0]["key"], "site_name");

        let (status, _) = app
            .admin_json("PUT", "/api/admin/settings/x", json!({"value": 1, "type": "blob"}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, body) = app.admin_get("/api/admin/settings/unknown").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Setting not found");
    }
}
