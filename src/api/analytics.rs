use std::collections::BTreeMap;

use axum::{
    Router,
    extract::{Path, Query, State},
    routing::{get, put},
};
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::json;

use super::{ApiJson, AppState, JsonResult, PageQuery, Pagination, filled, lenient, success};
use crate::auth::AdminClaims;
use crate::error::{ApiError, StoreContext};
use crate::models::{ReportStatus, click_through_rate};
use crate::store::{Page, VideoQuery, VideoSort, day_key, start_of_day};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/analytics/dashboard", get(dashboard))
        .route("/api/analytics/views", get(views_by_upload_day))
        .route("/api/analytics/top-videos", get(top_videos))
        .route("/api/analytics/categories", get(category_stats))
        .route("/api/analytics/ads", get(ad_stats))
        .route("/api/analytics/reports", get(reports))
        .route("/api/analytics/reports/{id}", put(update_report))
        .route("/api/analytics/videos/{id}/daily", get(video_daily))
}

/// Days covered by a `period` value such as `7d`. Unknown values mean a week.
pub(super) fn period_days(period: &str) -> i64 {
    match period {
        "24h" => 1,
        "30d" => 30,
        "90d" => 90,
        "1y" => 365,
        _ => 7,
    }
}

#[derive(Debug, Default, Deserialize)]
struct PeriodQuery {
    period: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    limit: Option<i64>,
}

impl PeriodQuery {
    fn period(&self, default: &'static str) -> String {
        filled(self.period.as_deref()).unwrap_or_else(|| default.to_string())
    }
}

async fn dashboard(_admin: AdminClaims, State(state): State<AppState>) -> JsonResult {
    let stats = state
        .store
        .dashboard_stats(Utc::now())
        .await
        .or_internal("Failed to get dashboard stats")?;
    Ok(success(json!({ "stats": stats })))
}

/// Views accumulated by the videos uploaded on each day of the period.
async fn views_by_upload_day(
    _admin: AdminClaims,
    State(state): State<AppState>,
    Query(query): Query<PeriodQuery>,
) -> JsonResult {
    let period = query.period("7d");
    let since = Utc::now() - Duration::days(period_days(&period));
    let data = state
        .store
        .uploads_by_day(since)
        .await
        .or_internal("Failed to get view analytics")?;
    Ok(success(json!({ "period": period, "data": data })))
}

async fn top_videos(
    _admin: AdminClaims,
    State(state): State<AppState>,
    Query(query): Query<PeriodQuery>,
) -> JsonResult {
    let period = query.period("7d");
    let uploaded_since =
        (period != "all").then(|| Utc::now() - Duration::days(period_days(&period)));
    let filter = VideoQuery {
        uploaded_since,
        ..VideoQuery::public()
    }
    .sorted(VideoSort::Views);
    let limit = Page::new(None, query.limit, 10).limit;
    let videos = state
        .store
        .list_videos(&filter, limit, 0)
        .await
        .or_internal("Failed to get top videos")?;
    Ok(success(json!({ "videos": videos })))
}

async fn category_stats(_admin: AdminClaims, State(state): State<AppState>) -> JsonResult {
    let stats = state
        .store
        .category_stats()
        .await
        .or_internal("Failed to get category analytics")?;
    Ok(success(json!({ "stats": stats })))
}

async fn ad_stats(_admin: AdminClaims, State(state): State<AppState>) -> JsonResult {
    let ads = state
        .store
        .list_ads_by_impressions()
        .await
        .or_internal("Failed to get ad analytics")?;
    let impressions: i64 = ads.iter().map(|ad| ad.impressions).sum();
    let clicks: i64 = ads.iter().map(|ad| ad.clicks).sum();
    Ok(success(json!({
        "summary": {
            "totalImpressions": impressions,
            "totalClicks": clicks,
            "overallCTR": click_through_rate(clicks, impressions),
        },
        "ads": ads,
    })))
}

fn parse_status(raw: Option<&str>) -> Result<Option<ReportStatus>, ApiError> {
    filled(raw)
        .map(|status| status.parse().map_err(|_| ApiError::bad_request("Invalid status")))
        .transpose()
}

#[derive(Debug, Default, Deserialize)]
struct ReportQuery {
    status: Option<String>,
    #[serde(flatten)]
    page: PageQuery,
}

async fn reports(
    _admin: AdminClaims,
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> JsonResult {
    let failure = "Failed to get report analytics";
    let status = parse_status(query.status.as_deref())?;
    let page = query.page.page(20);
    let (reports, total) = state
        .store
        .page_reports(status, page)
        .await
        .or_internal(failure)?;
    let status_counts: BTreeMap<&'static str, i64> = state
        .store
        .report_status_counts()
        .await
        .or_internal(failure)?
        .into_iter()
        .map(|(status, count)| (status.as_str(), count))
        .collect();
    Ok(success(json!({
        "reports": reports,
        "statusCounts": status_counts,
        "pagination": Pagination::new(page, total),
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportUpdate {
    status: Option<String>,
    admin_notes: Option<String>,
}

async fn update_report(
    _admin: AdminClaims,
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<ReportUpdate>,
) -> JsonResult {
    let status = parse_status(body.status.as_deref())?;
    let report = state
        .store
        .update_report(&id, status, body.admin_notes.as_deref())
        .await
        .or_internal("Failed to update report")?
        .ok_or_else(|| ApiError::not_found("Report not found"))?;
    tracing::info!(report_id = %report.id, status = %report.status, "report updated");
    Ok(success(json!({
        "report": report,
        "message": "Report updated successfully",
    })))
}

/// Per-day counters of one video, oldest day first.
async fn video_daily(
    _admin: AdminClaims,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<PeriodQuery>,
) -> JsonResult {
    let failure = "Failed to get video analytics";
    if state.store.get_video(&id).await.or_internal(failure)?.is_none() {
        return Err(ApiError::not_found("Video not found"));
    }
    let period = query.period("30d");
    let first_day = start_of_day(Utc::now()) - Duration::days(period_days(&period) - 1);
    let data = state
        .store
        .daily_analytics(&id, &day_key(first_day))
        .await
        .or_internal(failure)?;
    Ok(success(json!({ "videoId": id, "period": period, "data": data })))
}
