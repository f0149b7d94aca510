use axum::{
    Router,
    extract::{Path, Query, State},
    routing::get,
};
use serde::Deserialize;
use serde_json::json;

use super::{AppState, JsonResult, PageQuery, Pagination, filled, lenient, success};
use crate::error::StoreContext;
use crate::store::{Page, VideoQuery, VideoSort};

const MIN_SUGGESTION_CHARS: usize = 2;

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/search", get(search))
        .route("/api/search/suggestions", get(suggestions))
        .route("/api/search/tags/{tag}", get(videos_by_tag))
        .route("/api/search/popular-tags", get(popular_tags))
}

#[derive(Debug, Default, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    q: String,
    #[serde(flatten)]
    page: PageQuery,
    sort: Option<String>,
    category: Option<String>,
}

/// Relevance is approximated by popularity: most viewed, then newest.
async fn search(State(state): State<AppState>, Query(query): Query<SearchQuery>) -> JsonResult {
    let text = query.q.trim();
    if text.is_empty() {
        return Ok(success(json!({
            "query": query.q,
            "videos": [],
            "pagination": Pagination::new(Page::new(None, None, 20), 0),
        })));
    }

    let page = query.page.page(20);
    let filter = VideoQuery {
        text: Some(text.to_string()),
        category_id: filled(query.category.as_deref()),
        ..VideoQuery::public()
    }
    .sorted(VideoSort::parse(query.sort.as_deref(), VideoSort::Views));
    let (videos, total) = state
        .store
        .page_videos(&filter, page)
        .await
        .or_internal("Search failed")?;
    Ok(success(json!({
        "query": query.q,
        "videos": videos,
        "pagination": Pagination::new(page, total),
    })))
}

#[derive(Debug, Default, Deserialize)]
struct SuggestionQuery {
    #[serde(default)]
    q: String,
    #[serde(default, deserialize_with = "lenient")]
    limit: Option<i64>,
}

async fn suggestions(
    State(state): State<AppState>,
    Query(query): Query<SuggestionQuery>,
) -> JsonResult {
    let needle = query.q.trim();
    if needle.chars().count() < MIN_SUGGESTION_CHARS {
        return Ok(success(json!({ "suggestions": [] })));
    }
    let limit = Page::new(None, query.limit, 5).limit;
    let titles = state
        .store
        .title_suggestions(needle, limit)
        .await
        .or_internal("Failed to get suggestions")?;
    Ok(success(json!({ "suggestions": titles })))
}

#[derive(Debug, Default, Deserialize)]
struct TagQuery {
    #[serde(flatten)]
    page: PageQuery,
    sort: Option<String>,
}

async fn videos_by_tag(
    State(state): State<AppState>,
    Path(tag): Path<String>,
    Query(query): Query<TagQuery>,
) -> JsonResult {
    let tag = tag.trim().to_lowercase();
    let page = query.page.page(20);
    let filter = VideoQuery {
        tag: Some(tag.clone()),
        ..VideoQuery::public()
    }
    .sorted(VideoSort::parse(query.sort.as_deref(), VideoSort::Newest));
    let (videos, total) = state
        .store
        .page_videos(&filter, page)
        .await
        .or_internal("Tag search failed")?;
    Ok(success(json!({
        "tag": tag,
        "videos": videos,
        "pagination": Pagination::new(page, total),
    })))
}

#[derive(Debug, Default, Deserialize)]
struct LimitQuery {
    #[serde(default, deserialize_with = "lenient")]
    limit: Option<i64>,
}

async fn popular_tags(State(state): State<AppState>, Query(query): Query<LimitQuery>) -> JsonResult {
    let limit = Page::new(None, query.limit, 20).limit;
    let tags: Vec<_> = state
        .store
        .tag_counts(limit)
        .await
        .or_internal("Failed to get popular tags")?
        .into_iter()
        .map(|(tag, count)| json!({ "tag": tag, "count": count }))
        .collect();
    Ok(success(json!({ "tags": tags })))
}
