//! HTTP error type shared by every handler.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::providers::ProviderError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self::new(StatusCode::PAYLOAD_TOO_LARGE, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// Vendor failures surface as 502 with the vendor's message as details.
    pub fn provider(message: impl Into<String>, err: &ProviderError) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, message).with_details(err.to_string())
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Store failures are logged in full and reported with a generic message.
pub trait StoreContext<T> {
    fn or_internal(self, message: &str) -> ApiResult<T>;
}

impl<T> StoreContext<T> for anyhow::Result<T> {
    fn or_internal(self, message: &str) -> ApiResult<T> {
        self.map_err(|err| {
            tracing::error!(error = %format!("{err:#}"), "{message}");
            ApiError::internal(message)
        })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match self.details {
            Some(details) => json!({ "error": self.message, "details": details }),
            None => json!({ "error": self.message }),
        };
        (self.status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::Value;

    async fn body_of(err: ApiError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn api_error_serializes_json() {
        let (status, parsed) = body_of(ApiError::not_found("missing")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(parsed["error"], "missing");
        assert!(parsed.get("details").is_none());
    }

    #[tokio::test]
    async fn details_are_rendered_when_present() {
        let err = ApiError::internal("Upload failed").with_details("host timed out");
        let (status, parsed) = body_of(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(parsed["details"], "host timed out");
    }

    #[tokio::test]
    async fn store_errors_hide_their_cause() {
        let result: anyhow::Result<()> = Err(anyhow::anyhow!("disk I/O error"));
        let err = result.or_internal("Failed to get videos").unwrap_err();
        let (status, parsed) = body_of(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(parsed["error"], "Failed to get videos");
    }
}
