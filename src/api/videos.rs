use axum::{
    Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;

use super::{
    ApiJson, AppState, ClientInfo, JsonResult, PageQuery, Pagination, filled, lenient, success,
};
use crate::error::{ApiError, StoreContext};
use crate::models::{
    MAX_REPORT_DESCRIPTION_LEN, NewReport, ReportReason, VideoStatus, truncate_chars,
};
use crate::store::{Page, Reaction, VideoQuery, VideoSort};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/videos", get(list_videos))
        .route("/api/videos/latest", get(latest_videos))
        .route("/api/videos/trending", get(trending_videos))
        .route("/api/videos/featured", get(featured_videos))
        .route("/api/videos/{id}", get(get_video))
        .route("/api/videos/{id}/related", get(related_videos))
        .route("/api/videos/{id}/view", post(count_view))
        .route("/api/videos/{id}/like", post(like_video))
        .route("/api/videos/{id}/dislike", post(dislike_video))
        .route("/api/videos/{id}/report", post(report_video))
}

#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    #[serde(flatten)]
    page: PageQuery,
    sort: Option<String>,
    category: Option<String>,
    tag: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LimitQuery {
    #[serde(default, deserialize_with = "lenient")]
    limit: Option<i64>,
}

impl LimitQuery {
    fn limit(&self, default: i64) -> i64 {
        Page::new(None, self.limit, default).limit
    }
}

async fn list_videos(State(state): State<AppState>, Query(query): Query<ListQuery>) -> JsonResult {
    let page = query.page.page(20);
    let filter = VideoQuery {
        category_id: filled(query.category.as_deref()),
        tag: filled(query.tag.as_deref()),
        ..VideoQuery::public()
    }
    .sorted(VideoSort::parse(query.sort.as_deref(), VideoSort::Newest));
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

async fn public_listing(
    state: &AppState,
    query: VideoQuery,
    limit: i64,
    failure: &str,
) -> JsonResult {
    let videos = state
        .store
        .list_videos(&query, limit, 0)
        .await
        .or_internal(failure)?;
    Ok(success(json!({ "videos": videos })))
}

async fn latest_videos(State(state): State<AppState>, Query(query): Query<LimitQuery>) -> JsonResult {
    let filter = VideoQuery::public().sorted(VideoSort::Newest);
    public_listing(&state, filter, query.limit(12), "Failed to get latest videos").await
}

async fn trending_videos(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> JsonResult {
    let filter = VideoQuery::public().sorted(VideoSort::Views);
    public_listing(&state, filter, query.limit(12), "Failed to get trending videos").await
}

async fn featured_videos(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> JsonResult {
    let filter = VideoQuery {
        featured: Some(true),
        ..VideoQuery::public()
    };
    public_listing(&state, filter, query.limit(6), "Failed to get featured videos").await
}

/// Public and unlisted videos can be opened directly; private ones 404.
async fn get_video(State(state): State<AppState>, Path(id): Path<String>) -> JsonResult {
    let video = state
        .store
        .get_video(&id)
        .await
        .or_internal("Failed to get video")?
        .filter(|video| matches!(video.status, VideoStatus::Public | VideoStatus::Unlisted))
        .ok_or_else(|| ApiError::not_found("Video not found"))?;
    Ok(success(json!({ "video": video })))
}

async fn related_videos(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> JsonResult {
    let failure = "Failed to get related videos";
    if state.store.get_video(&id).await.or_internal(failure)?.is_none() {
        return Err(ApiError::not_found("Video not found"));
    }
    let filter = VideoQuery {
        exclude_id: Some(id),
        ..VideoQuery::public()
    }
    .sorted(VideoSort::Views);
    public_listing(&state, filter, query.limit(10), failure).await
}

async fn count_view(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ClientInfo(viewer): ClientInfo,
) -> JsonResult {
    let counted = state
        .views
        .record(&id, &viewer)
        .await
        .or_internal("Failed to count view")?
        .ok_or_else(|| ApiError::not_found("Video not found"))?;
    let message = if counted {
        "View counted"
    } else {
        "View already counted"
    };
    Ok(success(json!({ "counted": counted, "message": message })))
}

async fn react(state: &AppState, id: &str, reaction: Reaction) -> JsonResult {
    let (field, failure) = match reaction {
        Reaction::Like => ("likes", "Failed to like video"),
        Reaction::Dislike => ("dislikes", "Failed to dislike video"),
    };
    let total = state
        .views
        .react(id, reaction)
        .await
        .or_internal(failure)?
        .ok_or_else(|| ApiError::not_found("Video not found"))?;
    Ok(success(json!({ field: total })))
}

async fn like_video(State(state): State<AppState>, Path(id): Path<String>) -> JsonResult {
    react(&state, &id, Reaction::Like).await
}

async fn dislike_video(State(state): State<AppState>, Path(id): Path<String>) -> JsonResult {
    react(&state, &id, Reaction::Dislike).await
}

#[derive(Debug, Deserialize)]
struct ReportBody {
    reason: Option<String>,
    description: Option<String>,
    email: Option<String>,
}

async fn report_video(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ClientInfo(viewer): ClientInfo,
    ApiJson(body): ApiJson<ReportBody>,
) -> JsonResult {
    let failure = "Failed to submit report";
    let reason = filled(body.reason.as_deref())
        .ok_or_else(|| ApiError::bad_request("Reason is required"))?;
    let reason: ReportReason = reason
        .parse()
        .map_err(|_| ApiError::bad_request("Invalid reason"))?;
    if state.store.get_video(&id).await.or_internal(failure)?.is_none() {
        return Err(ApiError::not_found("Video not found"));
    }

    let report = NewReport {
        video_id: id,
        reason,
        description: truncate_chars(
            body.description.as_deref().unwrap_or_default().trim(),
            MAX_REPORT_DESCRIPTION_LEN,
        ),
        email: body.email.unwrap_or_default().trim().to_string(),
        ip: viewer.ip,
    };
    let report = state.store.create_report(&report).await.or_internal(failure)?;
    tracing::info!(report_id = %report.id, video_id = %report.video_id, reason = %report.reason, "video reported");
    Ok(success(json!({ "message": "Report submitted successfully" })))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::test_app;
    use crate::models::VideoPatch;
    use crate::store::test_support::insert_video;
    use axum::body::Body;
    use axum::extract::ConnectInfo;
    use axum::http::{Request, StatusCode};
    use serde_json::json;
    use std::net::SocketAddr;

    #[tokio::test]
    async fn listing_hides_private_videos_and_paginates() {
        let app = test_app().await;
        let store = &app.state.store;
        for n in 0..3 {
            insert_video(store, &format!("pub{n}"), &format!("Public {n}")).await.unwrap();
        }
        let hidden = insert_video(store, "priv", "Hidden").await.unwrap();
        store
            .set_video_status(&hidden.id, crate::models::VideoStatus::Private)
            .await
            .unwrap();

        let (status, body) = app.get("/api/videos?limit=2&page=2").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["videos"].as_array().unwrap().len(), 1);
        assert_eq!(
            body["pagination"],
            json!({"page": 2, "limit": 2, "total": 3, "pages": 2})
        );

        let (status, body) = app.get(&format!("/api/videos/{}", hidden.id)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Video not found");
    }

    #[tokio::test]
    async fn page_far_past_the_end_is_empty() {
        let app = test_app().await;
        insert_video(&app.state.store, "p1", "Only").await.unwrap();

        let (status, body) = app.get("/api/videos?page=9223372036854775807").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["videos"].as_array().unwrap().is_empty());
        assert_eq!(body["pagination"]["page"], i64::MAX);
        assert_eq!(body["pagination"]["total"], 1);
    }

    #[tokio::test]
    async fn unlisted_videos_open_directly_and_related_excludes_self() {
        let app = test_app().await;
        let store = &app.state.store;
        let video = insert_video(store, "u1", "Unlisted").await.unwrap();
        insert_video(store, "u2", "Other").await.unwrap();
        store
            .set_video_status(&video.id, crate::models::VideoStatus::Unlisted)
            .await
            .unwrap();

        let (status, body) = app.get(&format!("/api/videos/{}", video.id)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["video"]["file_code"], "u1");

        let (_, body) = app.get(&format!("/api/videos/{}/related", video.id)).await;
        let related = body["videos"].as_array().unwrap();
        assert_eq!(related.len(), 1);
        assert_eq!(related[0]["file_code"], "u2");
    }

    fn view_from(uri: &str, peer: &str, forwarded: &str) -> Request<Body> {
        let peer: SocketAddr = format!("{peer}:40000").parse().unwrap();
        Request::post(uri)
            .header("x-forwarded-for", forwarded)
            .header("user-agent", "test-agent")
            .extension(ConnectInfo(peer))
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn repeat_views_from_one_address_count_once() {
        let app = test_app().await;
        let video = insert_video(&app.state.store, "v1", "Viewed").await.unwrap();
        let uri = format!("/api/videos/{}/view", video.id);

        let (_, first) = app.send(view_from(&uri, "203.0.113.7", "1.1.1.1")).await;
        assert_eq!(first["counted"], true);
        assert_eq!(first["message"], "View counted");
        for forwarded in ["2.2.2.2", "3.3.3.3"] {
            let (_, again) = app.send(view_from(&uri, "203.0.113.7", forwarded)).await;
            assert_eq!(again["counted"], false);
            assert_eq!(again["message"], "View already counted");
        }
        let (_, other) = app.send(view_from(&uri, "198.51.100.1", "1.1.1.1")).await;
        assert_eq!(other["counted"], true);

        let stored = app.state.store.get_video(&video.id).await.unwrap().unwrap();
        assert_eq!(stored.views, 2);

        let missing = Request::post("/api/videos/missing/view").body(Body::empty()).unwrap();
        let (status, _) = app.send(missing).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn trusted_proxy_hands_over_the_forwarded_address() {
        let app = test_app().await.behind_proxy();
        let video = insert_video(&app.state.store, "v2", "Proxied").await.unwrap();
        let uri = format!("/api/videos/{}/view", video.id);

        let (_, first) = app.send(view_from(&uri, "10.0.0.254", "203.0.113.7, 10.0.0.254")).await;
        assert_eq!(first["counted"], true);
        let (_, repeat) = app.send(view_from(&uri, "10.0.0.254", "203.0.113.7")).await;
        assert_eq!(repeat["counted"], false);
        let (_, other) = app.send(view_from(&uri, "10.0.0.254", "198.51.100.1")).await;
        assert_eq!(other["counted"], true);

        let stored = app.state.store.get_video(&video.id).await.unwrap().unwrap();
        assert_eq!(stored.views, 2);
    }

    #[tokio::test]
    async fn reactions_return_running_totals() {
        let app = test_app().await;
        let video = insert_video(&app.state.store, "r1", "Liked").await.unwrap();
        let like = format!("/api/videos/{}/like", video.id);

        app.json("POST", &like, json!({})).await;
        let (status, body) = app.json("POST", &like, json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["likes"], 2);

        let (_, body) = app
            .json("POST", &format!("/api/videos/{}/dislike", video.id), json!({}))
            .await;
        assert_eq!(body["dislikes"], 1);

        let (status, _) = app.json("POST", "/api/videos/nope/like", json!({})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn reports_need_a_valid_reason() {
        let app = test_app().await;
        let video = insert_video(&app.state.store, "rep1", "Reported").await.unwrap();
        let uri = format!("/api/videos/{}/report", video.id);

        let (status, body) = app.json("POST", &uri, json!({"description": "?"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Reason is required");

        let (status, _) = app.json("POST", &uri, json!({"reason": "boring"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = app
            .json("POST", &uri, json!({"reason": "broken", "email": " a@b.test "}))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Report submitted successfully");
        assert_eq!(
            app.state
                .store
                .count_reports(crate::models::ReportStatus::Pending)
                .await
                .unwrap(),
            1
        );

        let (status, _) = app
            .json("POST", "/api/videos/gone/report", json!({"reason": "spam"}))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn featured_listing_only_includes_featured() {
        let app = test_app().await;
        let store = &app.state.store;
        let star = insert_video(store, "f1", "Star").await.unwrap();
        insert_video(store, "f2", "Plain").await.unwrap();
        store
            .update_video(
                &star.id,
                &VideoPatch {
                    featured: Some(true),
                    ..VideoPatch::default()
                },
            )
            .await
            .unwrap();

        let (_, body) = app.get("/api/videos/featured").await;
        let videos = body["videos"].as_array().unwrap();
        assert_eq!(videos.len(), 1);
        assert_eq!(videos[0]["featured"], true);
    }
}
