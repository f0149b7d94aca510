use std::{path::Path, time::Duration};

use base64::Engine as _;
use chrono::Utc;
use serde::Deserialize;
use sha1::{Digest, Sha1};

use super::{CdnImage, ImageCdn, ProviderError, check_status};
use crate::config::CloudinarySettings;

const DEFAULT_API_BASE: &str = "https://api.cloudinary.com";
const THUMBNAIL_TRANSFORMATION: &str = "c_fill,h_360,w_640/q_auto";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Signed-upload client for the Cloudinary image API.
#[derive(Debug, Clone)]
pub struct CloudinaryClient {
    http: reqwest::Client,
    api_base: String,
    settings: CloudinarySettings,
}

#[derive(Deserialize)]
struct DestroyReply {
    result: String,
}

/// SHA-1 hex of the `k=v` pairs sorted by key and joined with `&`, followed
/// by the API secret.
pub(crate) fn sign(params: &[(&str, String)], secret: &str) -> String {
    let mut sorted: Vec<_> = params.iter().filter(|(_, v)| !v.is_empty()).collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let joined = sorted
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    let mut hasher = Sha1::new();
    hasher.update(joined.as_bytes());
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

impl CloudinaryClient {
    pub fn new(settings: CloudinarySettings) -> Result<Self, ProviderError> {
        Self::with_api_base(settings, DEFAULT_API_BASE)
    }

    pub fn with_api_base(settings: CloudinarySettings, api_base: &str) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            settings,
        })
    }

    fn endpoint(&self, action: &str) -> String {
        format!(
            "{}/v1_1/{}/image/{action}",
            self.api_base, self.settings.cloud_name
        )
    }

    /// Uploads `file`, which is either a remote URL or a data URI.
    async fn upload(&self, file: String) -> Result<CdnImage, ProviderError> {
        let timestamp = Utc::now().timestamp().to_string();
        let mut params = vec![
            ("folder", self.settings.folder.clone()),
            ("timestamp", timestamp),
            ("transformation", THUMBNAIL_TRANSFORMATION.to_string()),
        ];
        let signature = sign(&params, &self.settings.api_secret);
        params.push(("api_key", self.settings.api_key.clone()));
        params.push(("signature", signature));
        params.push(("file", file));

        let response = self
            .http
            .post(self.endpoint("upload"))
            .form(&params)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        let image: CdnImage = check_status(response)
            .await?
            .json()
            .await
            .map_err(|err| ProviderError::Malformed(err.to_string()))?;
        tracing::debug!(public_id = %image.public_id, "uploaded image to CDN");
        Ok(image)
    }
}

#[async_trait::async_trait]
impl ImageCdn for CloudinaryClient {
    async fn upload_from_url(&self, url: &str) -> Result<CdnImage, ProviderError> {
        self.upload(url.to_string()).await
    }

    async fn upload_file(&self, path: &Path) -> Result<CdnImage, ProviderError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| ProviderError::Io {
                path: path.display().to_string(),
                source,
            })?;
        let mime = mime_guess::from_path(path).first_or_octet_stream();
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        self.upload(format!("data:{mime};base64,{encoded}")).await
    }

    async fn destroy(&self, public_id: &str) -> Result<(), ProviderError> {
        let timestamp = Utc::now().timestamp().to_string();
        let mut params = vec![("public_id", public_id.to_string()), ("timestamp", timestamp)];
        let signature = sign(&params, &self.settings.api_secret);
        params.push(("api_key", self.settings.api_key.clone()));
        params.push(("signature", signature));

        let response = self
            .http
            .post(self.endpoint("destroy"))
            .form(&params)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        let reply: DestroyReply = check_status(response)
            .await?
            .json()
            .await
            .map_err(|err| ProviderError::Malformed(err.to_string()))?;
        match reply.result.as_str() {
            "ok" | "not found" => Ok(()),
            other => Err(ProviderError::Rejected(format!("destroy returned {other}"))),
        }
    }
}
