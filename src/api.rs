//! HTTP surface: shared state, router assembly and the small extractors the
//! handlers have in common.
//!
//! Every handler returns [`ApiResult`], so failures render as
//! `{"error": ..., "details"?: ...}` and successful bodies carry
//! `success: true`.

mod admin;
mod ads;
mod analytics;
mod categories;
mod public;
mod search;
mod upload;
mod videos;

use std::{convert::Infallible, net::SocketAddr, str::FromStr, sync::Arc};

use axum::{
    Json, Router,
    extract::{
        ConnectInfo, DefaultBodyLimit, FromRef, FromRequest, FromRequestParts, Request, State,
        rejection::JsonRejection,
    },
    http::{HeaderName, HeaderValue, Method, header, request::Parts},
    routing::get,
};
use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Deserializer, Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::auth::AdminAuth;
use crate::error::{ApiError, ApiResult};
use crate::models::{SettingRecord, normalize_tags, parse_tag_list};
use crate::store::{CatalogStore, Page};
use crate::upload::UploadPipeline;
use crate::views::{ViewTracker, Viewer};

/// JSON request bodies above this size are rejected. Upload routes lift the
/// limit and enforce their own while streaming.
pub const JSON_BODY_LIMIT: usize = 50 * 1024 * 1024;

/// Handles shared by every request. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub store: CatalogStore,
    pub auth: AdminAuth,
    pub views: ViewTracker,
    pub uploads: UploadPipeline,
    trust_proxy: bool,
    cache: Arc<ApiCache>,
}

impl AppState {
    pub fn new(
        store: CatalogStore,
        auth: AdminAuth,
        views: ViewTracker,
        uploads: UploadPipeline,
    ) -> Self {
        Self {
            store,
            auth,
            views,
            uploads,
            trust_proxy: false,
            cache: Arc::new(ApiCache::default()),
        }
    }

    /// Read viewer addresses from `X-Forwarded-For`. Only safe when a
    /// reverse proxy in front of the server rewrites that header.
    pub fn trusting_proxy(mut self, trust: bool) -> Self {
        self.trust_proxy = trust;
        self
    }
}

impl FromRef<AppState> for AdminAuth {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

/// Settings are read on every admin page load and written rarely, so the
/// list is kept in memory until the next write.
#[derive(Default)]
struct ApiCache {
    settings: RwLock<Option<Vec<SettingRecord>>>,
}

impl ApiCache {
    fn settings(&self) -> Option<Vec<SettingRecord>> {
        self.settings.read().clone()
    }

    fn store_settings(&self, settings: Vec<SettingRecord>) {
        *self.settings.write() = Some(settings);
    }

    fn clear(&self) {
        *self.settings.write() = None;
    }
}

/// Builds the full application router.
pub fn router(state: AppState, frontend_origins: &[String]) -> Router {
    Router::new()
        .route("/", get(banner))
        .route("/api/health", get(health))
        .merge(videos::routes())
        .merge(categories::routes())
        .merge(ads::routes())
        .merge(search::routes())
        .merge(analytics::routes())
        .merge(admin::routes())
        .merge(public::routes())
        .merge(upload::routes())
        .fallback(route_not_found)
        .layer(DefaultBodyLimit::max(JSON_BODY_LIMIT))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(frontend_origins))
        .with_state(state)
}

/// `*` mirrors whatever origin asked, which keeps credentials usable.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|origin| origin == "*") {
        AllowOrigin::mirror_request()
    } else {
        AllowOrigin::list(origins.iter().filter_map(|origin| {
            HeaderValue::from_str(origin)
                .inspect_err(|_| tracing::warn!(%origin, "ignoring unusable CORS origin"))
                .ok()
        }))
    };
    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-requested-with"),
        ])
}

async fn banner() -> Json<Value> {
    Json(json!({
        "message": "Video catalog API is running!",
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now(),
    }))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let database = match state.store.ping().await {
        Ok(()) => "connected",
        Err(err) => {
            tracing::warn!(error = %format!("{err:#}"), "health check could not reach the store");
            "disconnected"
        }
    };
    Json(json!({ "status": "ok", "database": database }))
}

async fn route_not_found() -> ApiError {
    ApiError::not_found("Route not found")
}

/// `pagination` block of list responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub(crate) struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub pages: i64,
}

impl Pagination {
    pub(crate) fn new(page: Page, total: i64) -> Self {
        Self {
            page: page.page,
            limit: page.limit,
            total,
            pages: page.pages(total),
        }
    }
}

/// `page` and `limit` query parameters. Garbage parses as absent.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct PageQuery {
    #[serde(default, deserialize_with = "lenient")]
    pub page: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    pub limit: Option<i64>,
}

impl PageQuery {
    pub(crate) fn page(&self, default_limit: i64) -> Page {
        Page::new(self.page, self.limit, default_limit)
    }
}

/// Parses a query value with `FromStr`, treating anything unparsable as
/// missing instead of rejecting the request.
pub(crate) fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|raw| raw.trim().parse().ok()))
}

/// Accepts `true`, `"true"`, `1` or `"1"` as set; everything else is unset.
pub(crate) fn truthy<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Bool(flag)) => flag,
        Some(Value::String(text)) => matches!(text.trim(), "true" | "1"),
        Some(Value::Number(n)) => n.as_i64() == Some(1),
        _ => false,
    })
}

/// Trimmed, non-empty text or `None`.
pub(crate) fn filled(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Tags arrive either as a JSON array or as the comma list a form submits.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum TagsInput {
    List(Vec<String>),
    Text(String),
}

impl TagsInput {
    pub(crate) fn into_tags(self) -> Vec<String> {
        match self {
            Self::List(tags) => normalize_tags(tags),
            Self::Text(raw) => parse_tag_list(&raw),
        }
    }
}

/// `Json` whose rejections render like every other API error.
pub(crate) struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(json_rejection(rejection)),
        }
    }
}

fn json_rejection(rejection: JsonRejection) -> ApiError {
    ApiError::new(rejection.status(), rejection.body_text())
}

/// Who is asking: socket peer address (or the first `X-Forwarded-For` hop
/// when the proxy is trusted), user agent and referer.
#[derive(Debug, Clone)]
pub(crate) struct ClientInfo(pub Viewer);

impl FromRequestParts<AppState> for ClientInfo {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let text = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .unwrap_or_default()
                .to_string()
        };
        let forwarded = state
            .trust_proxy
            .then(|| text("x-forwarded-for"))
            .and_then(|header| {
                header
                    .split(',')
                    .map(str::trim)
                    .find(|hop| !hop.is_empty())
                    .map(str::to_string)
            });
        let ip = forwarded
            .or_else(|| {
                parts
                    .extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip().to_string())
            })
            .unwrap_or_else(|| "unknown".to_string());
        Ok(Self(Viewer {
            ip,
            user_agent: text(header::USER_AGENT.as_str()),
            referer: text(header::REFERER.as_str()),
        }))
    }
}

/// `{"success": true, ...fields}`.
pub(crate) fn success(fields: Value) -> Json<Value> {
    let mut body = json!({ "success": true });
    if let (Value::Object(body), Value::Object(fields)) = (&mut body, fields) {
        body.extend(fields);
    }
    Json(body)
}

pub(crate) type JsonResult = ApiResult<Json<Value>>;


#[cfg(test)]
mod tests {
    use super::test_support::test_app;
    use super::*;
    use axum::body::Body;
    use axum::http::{Request as HttpRequest, StatusCode};

    #[tokio::test]
    async fn unknown_routes_render_json_404() {
        let app = test_app().await;
        let (status, body) = app.get("/api/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Route not found");
    }

    #[tokio::test]
    async fn health_reports_store_connectivity() {
        let app = test_app().await;
        let (status, body) = app.get("/api/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["database"], "connected");

        let (_, banner) = app.get("/").await;
        assert_eq!(banner["status"], "healthy");
    }

    #[tokio::test]
    async fn wildcard_cors_mirrors_origin_with_credentials() {
        let app = test_app().await;
        let request = HttpRequest::builder()
            .method("OPTIONS")
            .uri("/api/videos")
            .header("origin", "https://site.example")
            .header("access-control-request-method", "GET")
            .body(Body::empty())
            .unwrap();
        let response = tower::ServiceExt::oneshot(app.router.clone(), request)
            .await
            .unwrap();
        let headers = response.headers();
        assert_eq!(
            headers["access-control-allow-origin"],
            "https://site.example"
        );
        assert_eq!(headers["access-control-allow-credentials"], "true");
    }

    #[tokio::test]
    async fn malformed_json_is_an_api_error() {
        let app = test_app().await;
        let request = HttpRequest::post("/api/admin/login")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = app.send(request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[test]
    fn lenient_helpers_tolerate_form_input() {
        #[derive(Deserialize)]
        struct Form {
            #[serde(default, deserialize_with = "truthy")]
            featured: bool,
            tags: TagsInput,
        }
        let form: Form = serde_json::from_value(json!({"featured": "true", "tags": "A, b,a"})).unwrap();
        assert!(form.featured);
        assert_eq!(form.tags.into_tags(), vec!["a", "b"]);

        let query: PageQuery = serde_json::from_value(json!({"page": "x", "limit": "5"})).unwrap();
        assert_eq!(query.page(20), Page { page: 1, limit: 5 });
        assert_eq!(filled(Some("  ")), None);
    }

    #[test]
    fn success_merges_fields() {
        let Json(body) = success(json!({"count": 2}));
        assert_eq!(body, json!({"success": true, "count": 2}));
    }
}
