use axum::{
    Router,
    extract::{Path, Query, State},
    routing::{get, put},
};
use serde::Deserialize;
use serde_json::json;

use super::{ApiJson, AppState, JsonResult, PageQuery, Pagination, filled, success};
use crate::auth::AdminClaims;
use crate::error::{ApiError, StoreContext};
use crate::models::CategoryPatch;
use crate::store::{CategoryWrite, VideoQuery, VideoSort};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/categories", get(list_categories).post(create_category))
        .route(
            "/api/categories/{key}",
            get(get_category).put(update_category).delete(delete_category),
        )
        .route("/api/categories/{key}/videos", get(category_videos))
        .route("/api/categories/admin/reorder", put(reorder_categories))
}

async fn list_categories(State(state): State<AppState>) -> JsonResult {
    let categories = state
        .store
        .list_categories(true, None)
        .await
        .or_internal("Failed to get categories")?;
    Ok(success(json!({ "categories": categories })))
}

async fn get_category(State(state): State<AppState>, Path(slug): Path<String>) -> JsonResult {
    let category = state
        .store
        .get_active_category_by_slug(&slug)
        .await
        .or_internal("Failed to get category")?
        .ok_or_else(|| ApiError::not_found("Category not found"))?;
    Ok(success(json!({ "category": category })))
}

#[derive(Debug, Default, Deserialize)]
struct CategoryVideosQuery {
    #[serde(flatten)]
    page: PageQuery,
    sort: Option<String>,
}

async fn category_videos(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(query): Query<CategoryVideosQuery>,
) -> JsonResult {
    let failure = "Failed to get category videos";
    let category = state
        .store
        .get_active_category_by_slug(&slug)
        .await
        .or_internal(failure)?
        .ok_or_else(|| ApiError::not_found("Category not found"))?;

    let page = query.page.page(20);
    let filter = VideoQuery {
        category_id: Some(category.id.clone()),
        ..VideoQuery::public()
    }
    .sorted(VideoSort::parse(query.sort.as_deref(), VideoSort::Newest));
    let (videos, total) = state
        .store
        .page_videos(&filter, page)
        .await
        .or_internal(failure)?;
    Ok(success(json!({
        "category": category,
        "videos": videos,
        "pagination": Pagination::new(page, total),
    })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CategoryBody {
    name: Option<String>,
    description: Option<String>,
    thumbnail: Option<String>,
    icon: Option<String>,
    color: Option<String>,
    is_active: Option<bool>,
    order: Option<i64>,
}

async fn create_category(
    _admin: AdminClaims,
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CategoryBody>,
) -> JsonResult {
    let name = filled(body.name.as_deref())
        .ok_or_else(|| ApiError::bad_request("Category name is required"))?;
    let icon = filled(body.icon.as_deref());
    let color = filled(body.color.as_deref());
    let category = state
        .store
        .create_category(
            &name,
            body.description.as_deref().unwrap_or_default(),
            body.thumbnail.as_deref().unwrap_or_default(),
            icon.as_deref(),
            color.as_deref(),
        )
        .await
        .or_internal("Failed to create category")?
        .ok_or_else(|| ApiError::bad_request("Category already exists"))?;
    tracing::info!(category_id = %category.id, slug = %category.slug, "category created");
    Ok(success(json!({
        "category": category,
        "message": "Category created successfully",
    })))
}

/// Empty name, icon or color leave the stored value alone.
async fn update_category(
    _admin: AdminClaims,
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<CategoryBody>,
) -> JsonResult {
    let patch = CategoryPatch {
        name: filled(body.name.as_deref()),
        description: body.description,
        thumbnail: body.thumbnail,
        icon: filled(body.icon.as_deref()),
        color: filled(body.color.as_deref()),
        is_active: body.is_active,
        order: body.order,
    };
    match state
        .store
        .update_category(&id, &patch)
        .await
        .or_internal("Failed to update category")?
    {
        CategoryWrite::Saved(category) => Ok(success(json!({
            "category": category,
            "message": "Category updated successfully",
        }))),
        CategoryWrite::NotFound => Err(ApiError::not_found("Category not found")),
        CategoryWrite::NameTaken => Err(ApiError::bad_request("Category already exists")),
    }
}

async fn delete_category(
    _admin: AdminClaims,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> JsonResult {
    if !state
        .store
        .delete_category(&id)
        .await
        .or_internal("Failed to delete category")?
    {
        return Err(ApiError::not_found("Category not found"));
    }
    tracing::info!(category_id = %id, "category deleted");
    Ok(success(json!({ "message": "Category deleted successfully" })))
}

#[derive(Debug, Deserialize)]
struct ReorderItem {
    id: String,
    position: i64,
}

#[derive(Debug, Deserialize)]
struct ReorderBody {
    order: Option<Vec<ReorderItem>>,
}

async fn reorder_categories(
    _admin: AdminClaims,
    State(state): State<AppState>,
    ApiJson(body): ApiJson<ReorderBody>,
) -> JsonResult {
    let order: Vec<(String, i64)> = body
        .order
        .ok_or_else(|| ApiError::bad_request("Order array is required"))?
        .into_iter()
        .map(|item| (item.id, item.position))
        .collect();
    state
        .store
        .reorder_categories(&order)
        .await
        .or_internal("Failed to reorder categories")?;
    Ok(success(json!({ "message": "Categories reordered successfully" })))
}
