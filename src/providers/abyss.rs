use std::{path::Path, time::Duration};

use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::Value;
use tokio_util::io::ReaderStream;

use super::{FileInfo, FilePage, ProviderError, VideoHost, check_status};
use crate::config::AbyssSettings;

const API_TIMEOUT: Duration = Duration::from_secs(30);
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(600);

/// REST client for the Abyss video host.
#[derive(Debug, Clone)]
pub struct AbyssClient {
    http: reqwest::Client,
    api_key: String,
    api_base: String,
    upload_base: String,
    embed_domain: String,
}

#[derive(Deserialize)]
struct UploadReply {
    #[serde(default)]
    slug: Option<String>,
}

#[derive(Deserialize)]
struct RemoteUploadReply {
    status: i64,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    result: Option<RemoteUploadResult>,
}

#[derive(Deserialize)]
struct RemoteUploadResult {
    filecode: String,
}

impl AbyssClient {
    pub fn new(settings: &AbyssSettings) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            api_key: settings.api_key.trim().to_string(),
            api_base: settings.api_base_url.trim_end_matches('/').to_string(),
            upload_base: settings.upload_base_url.trim_end_matches('/').to_string(),
            embed_domain: settings.embed_domain.trim().to_string(),
        })
    }

    fn key(&self) -> Result<&str, ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::NotConfigured("ABYSS_API_KEY"));
        }
        Ok(&self.api_key)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: String,
        query: &[(&str, &str)],
    ) -> Result<T, ProviderError> {
        let response = self
            .http
            .get(url)
            .query(query)
            .timeout(API_TIMEOUT)
            .send()
            .await?;
        check_status(response)
            .await?
            .json::<T>()
            .await
            .map_err(|err| ProviderError::Malformed(err.to_string()))
    }
}

#[async_trait::async_trait]
impl VideoHost for AbyssClient {
    async fn upload_file(&self, path: &Path, file_name: &str) -> Result<String, ProviderError> {
        let key = self.key()?;
        let io_error = |source| ProviderError::Io {
            path: path.display().to_string(),
            source,
        };
        let file = tokio::fs::File::open(path).await.map_err(io_error)?;
        let length = file.metadata().await.map_err(io_error)?.len();

        tracing::info!(file = %file_name, bytes = length, "uploading video to host");
        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
        let form = Form::new().part(
            "file",
            Part::stream_with_length(body, length).file_name(file_name.to_string()),
        );
        let response = self
            .http
            .post(format!("{}/{key}", self.upload_base))
            .multipart(form)
            .timeout(UPLOAD_TIMEOUT)
            .send()
            .await?;
        let reply: UploadReply = check_status(response)
            .await?
            .json()
            .await
            .map_err(|err| ProviderError::Malformed(err.to_string()))?;

        reply
            .slug
            .filter(|slug| !slug.trim().is_empty())
            .ok_or_else(|| ProviderError::Malformed("upload response carries no slug".into()))
    }

    async fn file_info(&self, file_code: &str) -> Result<FileInfo, ProviderError> {
        let key = self.key()?;
        self.get_json(
            format!("{}/v1/files/{file_code}", self.api_base),
            &[("key", key)],
        )
        .await
    }

    async fn list_files(
        &self,
        max_results: u32,
        page_token: Option<&str>,
    ) -> Result<FilePage, ProviderError> {
        let key = self.key()?;
        let max_results = max_results.to_string();
        let mut query = vec![
            ("key", key),
            ("maxResults", max_results.as_str()),
            ("orderBy", "createdAt:desc"),
            ("type", "files"),
        ];
        if let Some(token) = page_token.filter(|token| !token.is_empty()) {
            query.push(("pageToken", token));
        }
        self.get_json(format!("{}/v1/resources", self.api_base), &query)
            .await
    }

    async fn delete_file(&self, file_code: &str) -> Result<(), ProviderError> {
        let key = self.key()?;
        let response = self
            .http
            .delete(format!("{}/v1/files/{file_code}", self.api_base))
            .bearer_auth(key)
            .timeout(API_TIMEOUT)
            .send()
            .await?;
        check_status(response).await?;
        tracing::info!(file_code, "deleted video from host");
        Ok(())
    }

    async fn remote_upload(&self, url: &str) -> Result<String, ProviderError> {
        let key = self.key()?;
        let reply: RemoteUploadReply = self
            .get_json(
                format!("{}/api/upload/url", self.api_base),
                &[("key", key), ("url", url)],
            )
            .await?;
        match reply {
            RemoteUploadReply {
                status: 200,
                result: Some(result),
                ..
            } => Ok(result.filecode),
            RemoteUploadReply { msg, .. } => Err(ProviderError::Rejected(
                msg.unwrap_or_else(|| "Unknown error".to_string()),
            )),
        }
    }

    async fn remote_upload_status(&self, file_code: &str) -> Result<Value, ProviderError> {
        let key = self.key()?;
        self.get_json(
            format!("{}/api/upload/url/status", self.api_base),
            &[("key", key), ("file_code", file_code)],
        )
        .await
    }

    async fn account_info(&self) -> Result<Value, ProviderError> {
        let key = self.key()?;
        self.get_json(format!("{}/v1/about", self.api_base), &[("key", key)])
            .await
    }

    fn embed_url(&self, file_code: &str) -> String {
        format!("https://{}/embed/{file_code}", self.embed_domain)
    }

    fn thumbnail_url(&self, file_code: &str) -> String {
        format!("https://{}/thumb/{file_code}.jpg", self.embed_domain)
    }
}
