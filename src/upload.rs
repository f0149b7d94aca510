//! Upload orchestration: local staging, the video host, the thumbnail CDN
//! and the catalog.
//!
//! A single upload runs: stage file → host upload → remote info (best effort)
//! → thumbnail mirror (best effort) → catalog insert. When the insert fails
//! after the host accepted the file, the host file and any mirrored
//! thumbnail are deleted again. Staged files live in a [`TempPath`], so they
//! are removed however the request ends.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use serde::Serialize;
use serde_json::Value;
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;

use crate::models::{
    MAX_DESCRIPTION_LEN, MAX_TITLE_LEN, NewVideo, VideoPatch, VideoRecord, VideoStatus,
    truncate_chars,
};
use crate::providers::{FileInfo, FilePage, ImageCdn, ProviderError, VideoHost};
use crate::store::CatalogStore;

pub const MAX_VIDEO_BYTES: u64 = 10 * 1024 * 1024 * 1024;
pub const MAX_IMAGE_BYTES: u64 = 10 * 1024 * 1024;

pub const VIDEO_MIME_TYPES: &[&str] = &[
    "video/mp4",
    "video/mpeg",
    "video/quicktime",
    "video/x-msvideo",
    "video/x-matroska",
    "video/webm",
    "video/x-flv",
    "video/3gpp",
];

pub const IMAGE_MIME_TYPES: &[&str] = &["image/jpeg", "image/png", "image/gif", "image/webp"];

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("File code is required")]
    MissingFileCode,
    #[error("Video with this file code already exists")]
    DuplicateFileCode,
    #[error("Invalid category")]
    InvalidCategory,
    #[error("Video not found")]
    VideoNotFound,
    #[error("Image CDN is not configured")]
    CdnDisabled,
    #[error("File too large")]
    TooLarge,
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// A request body written to the staging directory. Dropping it deletes the
/// file.
#[derive(Debug)]
pub struct StagedFile {
    pub path: TempPath,
    pub original_name: String,
    pub content_type: String,
    pub size: u64,
}

impl StagedFile {
    /// Original file name without its extension.
    pub fn stem(&self) -> String {
        Path::new(&self.original_name)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(&self.original_name)
            .to_string()
    }
}

/// Streams chunks into a fresh file under the staging directory, enforcing a
/// size limit as it goes.
pub struct StagingWriter {
    file: tokio::fs::File,
    path: TempPath,
    written: u64,
    limit: u64,
}

impl StagingWriter {
    pub async fn create(dir: &Path, original_name: &str, limit: u64) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("creating staging dir {}", dir.display()))?;
        let extension = Path::new(original_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| format!(".{ext}"))
            .unwrap_or_default();
        let named = tempfile::Builder::new()
            .prefix("upload-")
            .suffix(&extension)
            .tempfile_in(dir)
            .with_context(|| format!("creating staged file in {}", dir.display()))?;
        let (file, path) = named.into_parts();
        Ok(Self {
            file: tokio::fs::File::from_std(file),
            path,
            written: 0,
            limit,
        })
    }

    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), UploadError> {
        self.written += chunk.len() as u64;
        if self.written > self.limit {
            return Err(UploadError::TooLarge);
        }
        self.file
            .write_all(chunk)
            .await
            .context("writing staged upload")?;
        Ok(())
    }

    pub async fn finish(
        mut self,
        original_name: String,
        content_type: String,
    ) -> Result<StagedFile, UploadError> {
        self.file.flush().await.context("flushing staged upload")?;
        Ok(StagedFile {
            path: self.path,
            original_name,
            content_type,
            size: self.written,
        })
    }
}

/// Catalog fields supplied with an upload or a file code registration.
#[derive(Debug, Clone, Default)]
pub struct VideoDetails {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<String>,
    pub tags: Vec<String>,
    pub status: Option<VideoStatus>,
    pub featured: bool,
}

#[derive(Debug, Clone)]
pub struct BulkEntry {
    pub file_code: Option<String>,
    pub title: Option<String>,
    pub category_id: Option<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BulkAdded {
    pub file_code: String,
    pub id: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BulkFailed {
    pub file_code: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BulkOutcome {
    pub success: Vec<BulkAdded>,
    pub failed: Vec<BulkFailed>,
}

/// Host files annotated with whether the catalog already has them.
#[derive(Debug, Clone)]
pub struct HostListing {
    pub files: Vec<Value>,
    pub next_page_token: Option<String>,
}

#[derive(Clone)]
pub struct UploadPipeline {
    store: CatalogStore,
    host: Arc<dyn VideoHost>,
    cdn: Option<Arc<dyn ImageCdn>>,
    staging_dir: PathBuf,
}

fn clean_text(value: Option<&str>, max: usize) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| truncate_chars(value, max))
}

impl UploadPipeline {
    pub fn new(
        store: CatalogStore,
        host: Arc<dyn VideoHost>,
        cdn: Option<Arc<dyn ImageCdn>>,
        staging_dir: PathBuf,
    ) -> Self {
        Self {
            store,
            host,
            cdn,
            staging_dir,
        }
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    pub fn has_cdn(&self) -> bool {
        self.cdn.is_some()
    }

    async fn check_category(&self, category_id: Option<&str>) -> Result<(), UploadError> {
        if let Some(id) = category_id {
            if self.store.get_category(id).await?.is_none() {
                return Err(UploadError::InvalidCategory);
            }
        }
        Ok(())
    }

    async fn remote_info(&self, file_code: &str) -> FileInfo {
        match self.host.file_info(file_code).await {
            Ok(info) => info,
            Err(err) => {
                tracing::warn!(file_code, error = %err, "could not fetch video info from host");
                FileInfo::default()
            }
        }
    }

    /// Copies the host thumbnail to the CDN, falling back to the host URL.
    async fn mirror_thumbnail(&self, file_code: &str) -> (String, Option<String>) {
        let host_url = self.host.thumbnail_url(file_code);
        let Some(cdn) = &self.cdn else {
            return (host_url, None);
        };
        match cdn.upload_from_url(&host_url).await {
            Ok(image) => (image.url, Some(image.public_id)),
            Err(err) => {
                tracing::warn!(file_code, error = %err, "using host thumbnail, CDN mirror failed");
                (host_url, None)
            }
        }
    }

    async fn discard_cdn_image(&self, public_id: Option<&str>) {
        if let (Some(cdn), Some(public_id)) = (&self.cdn, public_id) {
            if let Err(err) = cdn.destroy(public_id).await {
                tracing::warn!(public_id, error = %err, "could not delete CDN image");
            }
        }
    }

    fn new_video(&self, file_code: &str, title: String, details: &VideoDetails) -> NewVideo {
        let mut video = NewVideo::new(file_code, self.host.embed_url(file_code), title, "");
        video.description = clean_text(details.description.as_deref(), MAX_DESCRIPTION_LEN)
            .unwrap_or_default();
        video.category_id = details.category_id.clone();
        video.tags = details.tags.clone();
        video.status = details.status.unwrap_or(VideoStatus::Public);
        video.featured = details.featured;
        video
    }

    /// Runs the full pipeline for a staged video file.
    pub async fn upload_video(
        &self,
        staged: StagedFile,
        details: VideoDetails,
    ) -> Result<VideoRecord, UploadError> {
        self.check_category(details.category_id.as_deref()).await?;

        let file_code = self
            .host
            .upload_file(&staged.path, &staged.original_name)
            .await?;
        tracing::info!(%file_code, bytes = staged.size, "video accepted by host");

        let info = self.remote_info(&file_code).await;
        let (thumbnail, public_id) = self.mirror_thumbnail(&file_code).await;

        let title = clean_text(details.title.as_deref(), MAX_TITLE_LEN)
            .or_else(|| clean_text(Some(&staged.stem()), MAX_TITLE_LEN))
            .or_else(|| info.display_title())
            .unwrap_or_else(|| file_code.clone());
        let mut video = self.new_video(&file_code, truncate_chars(&title, MAX_TITLE_LEN), &details);
        video.thumbnail = thumbnail;
        video.thumbnail_public_id = public_id.clone();
        if let Some(duration) = info.duration_text() {
            video.duration = duration;
        }

        match self.store.insert_video(&video).await {
            Ok(record) => Ok(record),
            Err(err) => {
                tracing::error!(%file_code, error = %format!("{err:#}"), "saving upload failed, rolling back host file");
                if let Err(delete_err) = self.host.delete_file(&file_code).await {
                    tracing::warn!(%file_code, error = %delete_err, "could not delete orphaned host file");
                }
                self.discard_cdn_image(public_id.as_deref()).await;
                Err(UploadError::Store(err))
            }
        }
    }

    /// Catalogs a file that already lives on the host.
    pub async fn register_file_code(
        &self,
        file_code: &str,
        details: VideoDetails,
    ) -> Result<VideoRecord, UploadError> {
        let file_code = file_code.trim();
        if file_code.is_empty() {
            return Err(UploadError::MissingFileCode);
        }
        if self.store.file_code_exists(file_code).await? {
            return Err(UploadError::DuplicateFileCode);
        }
        self.check_category(details.category_id.as_deref()).await?;

        let info = self.remote_info(file_code).await;
        let (thumbnail, public_id) = self.mirror_thumbnail(file_code).await;

        let title = clean_text(details.title.as_deref(), MAX_TITLE_LEN)
            .or_else(|| info.display_title())
            .unwrap_or_else(|| file_code.to_string());
        let mut video = self.new_video(file_code, truncate_chars(&title, MAX_TITLE_LEN), &details);
        video.thumbnail = thumbnail;
        video.thumbnail_public_id = public_id.clone();
        video.duration = info.duration_text().unwrap_or(video.duration);
        video.views = info.views.unwrap_or(0).max(0);

        match self.store.insert_video(&video).await {
            Ok(record) => Ok(record),
            Err(err) => {
                self.discard_cdn_image(public_id.as_deref()).await;
                Err(UploadError::Store(err))
            }
        }
    }

    /// Catalogs several host files with their host thumbnails. Each entry
    /// succeeds or fails on its own.
    pub async fn register_bulk(&self, entries: Vec<BulkEntry>) -> BulkOutcome {
        let mut outcome = BulkOutcome::default();
        for entry in entries {
            let Some(file_code) = entry
                .file_code
                .as_deref()
                .map(str::trim)
                .filter(|code| !code.is_empty())
                .map(str::to_string)
            else {
                outcome.failed.push(BulkFailed {
                    file_code: "unknown".into(),
                    error: UploadError::MissingFileCode.to_string(),
                });
                continue;
            };

            match self.register_plain(&file_code, &entry).await {
                Ok(id) => outcome.success.push(BulkAdded { file_code, id }),
                Err(err) => outcome.failed.push(BulkFailed {
                    file_code,
                    error: err.to_string(),
                }),
            }
        }
        outcome
    }

    async fn register_plain(&self, file_code: &str, entry: &BulkEntry) -> Result<String, UploadError> {
        if self.store.file_code_exists(file_code).await? {
            return Err(UploadError::DuplicateFileCode);
        }
        self.check_category(entry.category_id.as_deref()).await?;
        let title = clean_text(entry.title.as_deref(), MAX_TITLE_LEN)
            .unwrap_or_else(|| truncate_chars(file_code, MAX_TITLE_LEN));
        let details = VideoDetails {
            category_id: entry.category_id.clone(),
            tags: entry.tags.clone(),
            ..VideoDetails::default()
        };
        let mut video = self.new_video(file_code, title, &details);
        video.thumbnail = self.host.thumbnail_url(file_code);
        Ok(self.store.insert_video(&video).await?.id)
    }

    /// Replaces a video's thumbnail with an uploaded image and deletes the
    /// previous CDN copy. Returns the new URL.
    pub async fn replace_thumbnail(
        &self,
        video_id: &str,
        staged: StagedFile,
    ) -> Result<String, UploadError> {
        let cdn = self.cdn.as_ref().ok_or(UploadError::CdnDisabled)?;
        let video = self
            .store
            .get_video(video_id)
            .await?
            .ok_or(UploadError::VideoNotFound)?;

        let image = cdn.upload_file(&staged.path).await?;
        let patch = VideoPatch {
            thumbnail: Some(image.url.clone()),
            thumbnail_public_id: Some(Some(image.public_id.clone())),
            ..VideoPatch::default()
        };
        match self.store.update_video(video_id, &patch).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                self.discard_cdn_image(Some(&image.public_id)).await;
                return Err(UploadError::VideoNotFound);
            }
            Err(err) => {
                self.discard_cdn_image(Some(&image.public_id)).await;
                return Err(UploadError::Store(err));
            }
        }
        self.discard_cdn_image(video.thumbnail_public_id.as_deref())
            .await;
        Ok(image.url)
    }

    pub async fn start_remote_upload(&self, url: &str) -> Result<String, UploadError> {
        Ok(self.host.remote_upload(url.trim()).await?)
    }

    pub async fn host_files(
        &self,
        limit: u32,
        page_token: Option<&str>,
    ) -> Result<HostListing, UploadError> {
        let FilePage {
            mut items,
            next_page_token,
        } = self.host.list_files(limit, page_token).await?;
        let codes: Vec<String> = items
            .iter()
            .filter_map(|item| FilePage::item_code(item).map(str::to_string))
            .collect();
        let existing = self.store.existing_file_codes(&codes).await?;
        for item in &mut items {
            let added = FilePage::item_code(item).is_some_and(|code| existing.contains(code));
            if let Value::Object(map) = item {
                map.insert("alreadyAdded".into(), Value::Bool(added));
            }
        }
        Ok(HostListing {
            files: items,
            next_page_token,
        })
    }

    pub async fn remote_upload_status(&self, file_code: &str) -> Result<Value, UploadError> {
        let file_code = file_code.trim();
        if file_code.is_empty() {
            return Err(UploadError::MissingFileCode);
        }
        Ok(self.host.remote_upload_status(file_code).await?)
    }

    pub async fn host_account(&self) -> Result<Value, UploadError> {
        Ok(self.host.account_info().await?)
    }
}
