//! Clients for the external video host and the thumbnail CDN.
//!
//! Handlers and the upload pipeline only see the [`VideoHost`] and
//! [`ImageCdn`] traits so tests can swap in fakes.

mod abyss;
mod cloudinary;

use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

pub use abyss::AbyssClient;
pub use cloudinary::CloudinaryClient;

use crate::models::format_duration;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    /// The vendor answered but refused the operation.
    #[error("{0}")]
    Rejected(String),

    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Metadata the host reports for one file. Every field is optional because
/// the host omits them while a file is still processing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, alias = "length")]
    pub duration: Option<Value>,
    #[serde(default)]
    pub views: Option<i64>,
}

impl FileInfo {
    /// Display title: explicit title, else the file name without extension.
    pub fn display_title(&self) -> Option<String> {
        if let Some(title) = self.title.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            return Some(title.to_string());
        }
        let name = self.name.as_deref()?.trim();
        let stem = Path::new(name)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(name);
        (!stem.is_empty()).then(|| stem.to_string())
    }

    /// Duration as `mm:ss`; the host sends either seconds or preformatted
    /// text.
    pub fn duration_text(&self) -> Option<String> {
        match self.duration.as_ref()? {
            Value::Number(seconds) => seconds.as_f64().map(|s| format_duration(s.round() as i64)),
            Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
            _ => None,
        }
    }
}

/// One page of the host's file listing. Items are passed through verbatim.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilePage {
    #[serde(default)]
    pub items: Vec<Value>,
    #[serde(default, alias = "pageToken", alias = "nextPageToken")]
    pub next_page_token: Option<String>,
}

impl FilePage {
    /// Host id of a listed item.
    pub fn item_code(item: &Value) -> Option<&str> {
        ["id", "slug", "file_code"]
            .iter()
            .find_map(|key| item.get(*key).and_then(Value::as_str))
    }
}

/// An image stored on the CDN.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CdnImage {
    #[serde(rename = "secure_url")]
    pub url: String,
    pub public_id: String,
}

#[async_trait::async_trait]
pub trait VideoHost: Send + Sync {
    /// Uploads a local file and returns the host's file code.
    async fn upload_file(&self, path: &Path, file_name: &str) -> Result<String, ProviderError>;

    async fn file_info(&self, file_code: &str) -> Result<FileInfo, ProviderError>;

    async fn list_files(
        &self,
        max_results: u32,
        page_token: Option<&str>,
    ) -> Result<FilePage, ProviderError>;

    async fn delete_file(&self, file_code: &str) -> Result<(), ProviderError>;

    /// Asks the host to fetch `url` itself; returns the new file code.
    async fn remote_upload(&self, url: &str) -> Result<String, ProviderError>;

    /// Progress of a remote upload, passed through as the host reports it.
    async fn remote_upload_status(&self, file_code: &str) -> Result<Value, ProviderError>;

    async fn account_info(&self) -> Result<Value, ProviderError>;

    fn embed_url(&self, file_code: &str) -> String;

    fn thumbnail_url(&self, file_code: &str) -> String;
}

#[async_trait::async_trait]
pub trait ImageCdn: Send + Sync {
    async fn upload_from_url(&self, url: &str) -> Result<CdnImage, ProviderError>;

    async fn upload_file(&self, path: &Path) -> Result<CdnImage, ProviderError>;

    async fn destroy(&self, public_id: &str) -> Result<(), ProviderError>;
}

/// Turns a non-success response into [`ProviderError::Status`], keeping the
/// body for the error details.
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::Status {
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn file_info_prefers_title_then_file_stem() {
        let info: FileInfo = serde_json::from_value(json!({"name": "holiday.mp4"})).unwrap();
        assert_eq!(info.display_title().as_deref(), Some("holiday"));

        let info: FileInfo =
            serde_json::from_value(json!({"name": "x.mp4", "title": " Trip "})).unwrap();
        assert_eq!(info.display_title().as_deref(), Some("Trip"));

        assert_eq!(FileInfo::default().display_title(), None);
    }

    #[test]
    fn duration_accepts_seconds_or_text() {
        let info: FileInfo = serde_json::from_value(json!({"duration": 125.4})).unwrap();
        assert_eq!(info.duration_text().as_deref(), Some("02:05"));

        let info: FileInfo = serde_json::from_value(json!({"length": "1:02:03"})).unwrap();
        assert_eq!(info.duration_text().as_deref(), Some("1:02:03"));

        let info: FileInfo = serde_json::from_value(json!({"duration": null})).unwrap();
        assert_eq!(info.duration_text(), None);
    }

    #[test]
    fn listed_items_expose_their_code() {
        assert_eq!(FilePage::item_code(&json!({"id": "abc"})), Some("abc"));
        assert_eq!(FilePage::item_code(&json!({"file_code": "def"})), Some("def"));
        assert_eq!(FilePage::item_code(&json!({"name": "x"})), None);
    }
}
