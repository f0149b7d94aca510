use axum::{Router, extract::State, routing::get};
use serde_json::json;

use super::{AppState, JsonResult, success};
use crate::error::StoreContext;
use crate::store::{VideoQuery, VideoSort};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/public/home", get(home))
        .route("/api/public/stats", get(stats))
}

/// Everything the landing page renders, in one round trip.
async fn home(State(state): State<AppState>) -> JsonResult {
    let store = &state.store;
    let featured = VideoQuery {
        featured: Some(true),
        ..VideoQuery::public()
    };
    let latest = VideoQuery::public();
    let trending = VideoQuery::public().sorted(VideoSort::Views);

    let (featured_videos, latest_videos, trending_videos, categories) = tokio::try_join!(
        store.list_videos(&featured, 6, 0),
        store.list_videos(&latest, 12, 0),
        store.list_videos(&trending, 12, 0),
        store.list_categories(true, Some(10)),
    )
    .or_internal("Failed to get home data")?;

    Ok(success(json!({
        "data": {
            "featuredVideos": featured_videos,
            "latestVideos": latest_videos,
            "trendingVideos": trending_videos,
            "categories": categories,
        }
    })))
}

async fn stats(State(state): State<AppState>) -> JsonResult {
    let stats = state
        .store
        .public_stats()
        .await
        .or_internal("Failed to get stats")?;
    Ok(success(json!({ "stats": stats })))
}
