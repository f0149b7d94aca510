use std::collections::HashMap;

use axum::{
    Router,
    extract::{
        DefaultBodyLimit, Multipart, Path, Query, State,
        multipart::{Field, MultipartError, MultipartRejection},
    },
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;

use super::{ApiJson, AppState, JsonResult, TagsInput, filled, lenient, success, truthy};
use crate::auth::AdminClaims;
use crate::error::{ApiError, ApiResult, StoreContext};
use crate::models::{VideoStatus, parse_tag_list};
use crate::providers::ProviderError;
use crate::upload::{
    BulkEntry, IMAGE_MIME_TYPES, MAX_IMAGE_BYTES, MAX_VIDEO_BYTES, StagedFile, StagingWriter,
    UploadError, VIDEO_MIME_TYPES, VideoDetails,
};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/upload/single",
            post(upload_single).layer(DefaultBodyLimit::disable()),
        )
        .route(
            "/api/upload/thumbnail",
            post(upload_thumbnail).layer(DefaultBodyLimit::disable()),
        )
        .route("/api/upload/file-code", post(register_file_code))
        .route("/api/upload/bulk-file-codes", post(register_bulk))
        .route("/api/upload/url", post(remote_upload))
        .route("/api/upload/url/{file_code}/status", get(remote_upload_status))
        .route("/api/upload/abyss-files", get(host_files))
        .route("/api/upload/account-info", get(account_info))
}

fn upload_error(err: UploadError, failure: &str) -> ApiError {
    match err {
        UploadError::MissingFileCode
        | UploadError::DuplicateFileCode
        | UploadError::InvalidCategory => ApiError::bad_request(err.to_string()),
        UploadError::VideoNotFound => ApiError::not_found(err.to_string()),
        UploadError::CdnDisabled => ApiError::unavailable(err.to_string()),
        UploadError::TooLarge => ApiError::payload_too_large(err.to_string()),
        UploadError::Provider(err) => {
            tracing::warn!(error = %err, "{failure}");
            ApiError::provider(failure, &err)
        }
        UploadError::Store(err) => {
            tracing::error!(error = %format!("{err:#}"), "{failure}");
            ApiError::internal(failure)
        }
    }
}

/// Plain form fields carry titles and descriptions, never file data.
const MAX_TEXT_FIELD_BYTES: usize = 64 * 1024;

/// Host listings are fetched at most this many files at a time.
const MAX_HOST_PAGE: u32 = 100;

fn multipart_error(err: MultipartError) -> ApiError {
    ApiError::new(err.status(), err.body_text())
}

fn open_multipart(multipart: Result<Multipart, MultipartRejection>) -> ApiResult<Multipart> {
    multipart.map_err(|rejection| ApiError::new(rejection.status(), rejection.body_text()))
}

/// Reads a text field in chunks, giving up once it outgrows
/// [`MAX_TEXT_FIELD_BYTES`]. Upload routes run without a body limit, so
/// `Field::text` alone would buffer whatever the client sends.
async fn read_text_field(field: &mut Field<'_>) -> ApiResult<String> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        if bytes.len() + chunk.len() > MAX_TEXT_FIELD_BYTES {
            return Err(ApiError::payload_too_large("Form field too large"));
        }
        bytes.extend_from_slice(&chunk);
    }
    String::from_utf8(bytes).map_err(|_| ApiError::bad_request("Form fields must be UTF-8 text"))
}

/// Streams one file field into the staging directory. The declared content
/// type wins; without one it is guessed from the file name.
async fn stage_field(
    state: &AppState,
    field: &mut Field<'_>,
    allowed: &[&str],
    limit: u64,
    type_error: &str,
) -> ApiResult<StagedFile> {
    let original_name = field.file_name().unwrap_or("upload").to_string();
    let content_type = field
        .content_type()
        .map(str::to_string)
        .unwrap_or_else(|| {
            mime_guess::from_path(&original_name)
                .first_or_octet_stream()
                .to_string()
        });
    if !allowed.contains(&content_type.as_str()) {
        return Err(ApiError::bad_request(type_error));
    }

    let mut writer = StagingWriter::create(state.uploads.staging_dir(), &original_name, limit)
        .await
        .or_internal("Upload failed")?;
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        writer
            .write_chunk(&chunk)
            .await
            .map_err(|err| upload_error(err, "Upload failed"))?;
    }
    writer
        .finish(original_name, content_type)
        .await
        .map_err(|err| upload_error(err, "Upload failed"))
}

fn parse_status(raw: Option<&str>) -> ApiResult<Option<VideoStatus>> {
    filled(raw)
        .map(|status| {
            status
                .parse()
                .map_err(|_| ApiError::bad_request("Invalid status"))
        })
        .transpose()
}

/// Multipart upload of one video plus its catalog fields.
async fn upload_single(
    _admin: AdminClaims,
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> JsonResult {
    let mut multipart = open_multipart(multipart)?;
    let mut staged = None;
    let mut fields: HashMap<String, String> = HashMap::new();
    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "video" {
            staged = Some(
                stage_field(
                    &state,
                    &mut field,
                    VIDEO_MIME_TYPES,
                    MAX_VIDEO_BYTES,
                    "Invalid file type. Only video files are allowed.",
                )
                .await?,
            );
        } else {
            let value = read_text_field(&mut field).await?;
            fields.insert(name, value);
        }
    }
    let staged = staged.ok_or_else(|| ApiError::bad_request("No video file provided"))?;

    let field = |name: &str| fields.get(name).map(String::as_str);
    let details = VideoDetails {
        title: filled(field("title")),
        description: filled(field("description")),
        category_id: filled(field("category")),
        tags: field("tags").map(parse_tag_list).unwrap_or_default(),
        status: parse_status(field("status"))?,
        featured: matches!(field("featured").map(str::trim), Some("true" | "1")),
    };
    let name = staged.original_name.clone();
    let video = state
        .uploads
        .upload_video(staged, details)
        .await
        .map_err(|err| upload_error(err, "Upload failed"))?;
    tracing::info!(video_id = %video.id, file_code = %video.file_code, file = %name, "video uploaded");
    Ok(success(json!({
        "video": video,
        "message": "Video uploaded successfully",
    })))
}

#[derive(Debug, Default, Deserialize)]
struct FileCodeBody {
    #[serde(alias = "fileCode")]
    file_code: Option<String>,
    title: Option<String>,
    description: Option<String>,
    category: Option<String>,
    tags: Option<TagsInput>,
    status: Option<String>,
    #[serde(default, deserialize_with = "truthy")]
    featured: bool,
}

async fn register_file_code(
    _admin: AdminClaims,
    State(state): State<AppState>,
    ApiJson(body): ApiJson<FileCodeBody>,
) -> JsonResult {
    let details = VideoDetails {
        title: filled(body.title.as_deref()),
        description: filled(body.description.as_deref()),
        category_id: filled(body.category.as_deref()),
        tags: body.tags.map(TagsInput::into_tags).unwrap_or_default(),
        status: parse_status(body.status.as_deref())?,
        featured: body.featured,
    };
    let video = state
        .uploads
        .register_file_code(body.file_code.as_deref().unwrap_or_default(), details)
        .await
        .map_err(|err| upload_error(err, "Failed to add video"))?;
    tracing::info!(video_id = %video.id, file_code = %video.file_code, "hosted video registered");
    Ok(success(json!({
        "video": video,
        "message": "Video added successfully",
    })))
}

#[derive(Debug, Deserialize)]
struct BulkItem {
    #[serde(alias = "fileCode")]
    file_code: Option<String>,
    title: Option<String>,
    category: Option<String>,
    tags: Option<TagsInput>,
}

#[derive(Debug, Deserialize)]
struct BulkBody {
    #[serde(default)]
    videos: Vec<BulkItem>,
}

async fn register_bulk(
    _admin: AdminClaims,
    State(state): State<AppState>,
    ApiJson(body): ApiJson<BulkBody>,
) -> JsonResult {
    if body.videos.is_empty() {
        return Err(ApiError::bad_request("No videos provided"));
    }
    let entries = body
        .videos
        .into_iter()
        .map(|item| BulkEntry {
            file_code: item.file_code,
            title: item.title,
            category_id: filled(item.category.as_deref()),
            tags: item.tags.map(TagsInput::into_tags).unwrap_or_default(),
        })
        .collect();
    let outcome = state.uploads.register_bulk(entries).await;
    let message = format!(
        "Added {} videos, {} failed",
        outcome.success.len(),
        outcome.failed.len()
    );
    tracing::info!(added = outcome.success.len(), failed = outcome.failed.len(), "bulk registration");
    Ok(success(json!({ "results": outcome, "message": message })))
}

/// Replaces a video's thumbnail with an uploaded image.
async fn upload_thumbnail(
    _admin: AdminClaims,
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> JsonResult {
    if !state.uploads.has_cdn() {
        return Err(upload_error(UploadError::CdnDisabled, "Thumbnail upload failed"));
    }
    let mut multipart = open_multipart(multipart)?;
    let mut staged = None;
    let mut video_id = None;
    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "thumbnail" => {
                staged = Some(
                    stage_field(
                        &state,
                        &mut field,
                        IMAGE_MIME_TYPES,
                        MAX_IMAGE_BYTES,
                        "Invalid file type. Only image files are allowed.",
                    )
                    .await?,
                );
            }
            "videoId" => video_id = filled(Some(&read_text_field(&mut field).await?)),
            _ => {}
        }
    }
    let staged = staged.ok_or_else(|| ApiError::bad_request("No image file provided"))?;
    let video_id = video_id.ok_or_else(|| ApiError::bad_request("Video ID is required"))?;

    let thumbnail = state
        .uploads
        .replace_thumbnail(&video_id, staged)
        .await
        .map_err(|err| upload_error(err, "Thumbnail upload failed"))?;
    Ok(success(json!({
        "thumbnail": thumbnail,
        "message": "Thumbnail updated successfully",
    })))
}

#[derive(Debug, Deserialize)]
struct RemoteUploadBody {
    url: Option<String>,
}

async fn remote_upload(
    _admin: AdminClaims,
    State(state): State<AppState>,
    ApiJson(body): ApiJson<RemoteUploadBody>,
) -> JsonResult {
    let url = filled(body.url.as_deref()).ok_or_else(|| ApiError::bad_request("URL is required"))?;
    let file_code = match state.uploads.start_remote_upload(&url).await {
        Ok(file_code) => file_code,
        Err(UploadError::Provider(err @ ProviderError::Rejected(_))) => {
            return Err(ApiError::bad_request("Remote upload failed").with_details(err.to_string()));
        }
        Err(err) => return Err(upload_error(err, "Remote upload failed")),
    };
    tracing::info!(%file_code, "remote upload started");
    Ok(success(json!({
        "file_code": file_code,
        "message": "Remote upload started. Video will be available shortly.",
        "note": "You will need to add the video using the file code once processing is complete.",
    })))
}

async fn remote_upload_status(
    _admin: AdminClaims,
    State(state): State<AppState>,
    Path(file_code): Path<String>,
) -> JsonResult {
    let status = state
        .uploads
        .remote_upload_status(&file_code)
        .await
        .map_err(|err| upload_error(err, "Failed to check upload status"))?;
    Ok(success(json!({ "status": status })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HostFilesQuery {
    #[serde(default, deserialize_with = "lenient")]
    limit: Option<u32>,
    page_token: Option<String>,
}

async fn host_files(
    _admin: AdminClaims,
    State(state): State<AppState>,
    Query(query): Query<HostFilesQuery>,
) -> JsonResult {
    let limit = query.limit.unwrap_or(50).clamp(1, MAX_HOST_PAGE);
    let listing = state
        .uploads
        .host_files(limit, filled(query.page_token.as_deref()).as_deref())
        .await
        .map_err(|err| upload_error(err, "Failed to get files"))?;
    Ok(success(json!({
        "files": listing.files,
        "pagination": {
            "limit": limit,
            "nextPageToken": listing.next_page_token,
        },
    })))
}

async fn account_info(_admin: AdminClaims, State(state): State<AppState>) -> JsonResult {
    let account = state
        .uploads
        .host_account()
        .await
        .map_err(|err| upload_error(err, "Failed to get account info"))?;
    Ok(success(json!({ "account": account })))
}

#[cfg(test)]
mod tests {
    use super::MAX_TEXT_FIELD_BYTES;
    use super::super::test_support::{TestApp, test_app, test_app_with};
    use crate::store::test_support::insert_video;
    use crate::upload::fakes::FakeHost;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{Value, json};

    const BOUNDARY: &str = "vault-test-boundary";

    enum Part<'a> {
        Text(&'a str, &'a str),
        File {
            name: &'a str,
            file_name: &'a str,
            content_type: &'a str,
            bytes: &'a [u8],
        },
    }

    fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match part {
                Part::Text(name, value) => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                            .as_bytes(),
                    );
                }
                Part::File {
                    name,
                    file_name,
                    content_type,
                    bytes,
                } => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(bytes);
                    body.extend_from_slice(b"\r\n");
                }
            }
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    async fn post_multipart(app: &TestApp, uri: &str, parts: &[Part<'_>], admin: bool) -> (StatusCode, Value) {
        let mut request = Request::post(uri).header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
        if admin {
            request = request.header("authorization", format!("Bearer {}", app.admin_token()));
        }
        app.send(request.body(Body::from(multipart_body(parts))).unwrap())
            .await
    }

    fn video_part(content_type: &str) -> Part<'_> {
        Part::File {
            name: "video",
            file_name: "holiday clip.mp4",
            content_type,
            bytes: b"not really a video",
        }
    }

    #[tokio::test]
    async fn single_upload_runs_the_pipeline() {
        let app = test_app().await;
        let parts = [
            Part::Text("tags", "Beach, Summer"),
            Part::Text("featured", "true"),
            video_part("video/mp4"),
        ];
        let (status, body) = post_multipart(&app, "/api/upload/single", &parts, true).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["message"], "Video uploaded successfully");
        assert_eq!(body["video"]["file_code"], "hostcode01");
        assert_eq!(body["video"]["title"], "holiday clip");
        assert_eq!(body["video"]["tags"], json!(["beach", "summer"]));
        assert_eq!(body["video"]["featured"], true);
        assert_eq!(body["video"]["thumbnail"], "https://cdn.test/img1.jpg");

        let uploaded = app.host.uploaded.lock().clone();
        assert_eq!(uploaded.len(), 1);
        assert_eq!(uploaded[0].1, "holiday clip.mp4");
        assert!(!uploaded[0].0.exists(), "staged file is removed afterwards");
    }

    #[tokio::test]
    async fn single_upload_rejects_bad_requests() {
        let app = test_app().await;
        let (status, _) =
            post_multipart(&app, "/api/upload/single", &[video_part("video/mp4")], false).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) =
            post_multipart(&app, "/api/upload/single", &[video_part("text/plain")], true).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid file type. Only video files are allowed.");

        let (status, body) =
            post_multipart(&app, "/api/upload/single", &[Part::Text("title", "x")], true).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No video file provided");

        let parts = [Part::Text("category", "nope"), video_part("video/mp4")];
        let (status, body) = post_multipart(&app, "/api/upload/single", &parts, true).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid category");
        assert!(app.host.uploaded.lock().is_empty());
    }

    #[tokio::test]
    async fn oversized_text_fields_are_refused() {
        let app = test_app().await;
        let title = "t".repeat(MAX_TEXT_FIELD_BYTES + 1);
        let parts = [Part::Text("title", &title), video_part("video/mp4")];
        let (status, body) = post_multipart(&app, "/api/upload/single", &parts, true).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["error"], "Form field too large");
        assert!(app.host.uploaded.lock().is_empty());

        let parts = [Part::Text("videoId", &title)];
        let (status, _) = post_multipart(&app, "/api/upload/thumbnail", &parts, true).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);

        let title = "t".repeat(MAX_TEXT_FIELD_BYTES);
        let parts = [Part::Text("title", &title), video_part("video/mp4")];
        let (status, body) = post_multipart(&app, "/api/upload/single", &parts, true).await;
        assert_eq!(status, StatusCode::OK, "{body}");
    }

    #[tokio::test]
    async fn host_failure_is_a_bad_gateway() {
        let host = FakeHost {
            fail_upload: true,
            ..FakeHost::default()
        };
        let app = test_app_with(host, None).await;
        let (status, body) =
            post_multipart(&app, "/api/upload/single", &[video_part("video/webm")], true).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], "Upload failed");
        assert_eq!(body["details"], "unexpected status 500: host down");
    }

    #[tokio::test]
    async fn file_codes_register_once() {
        let app = test_app().await;
        let (status, body) = app
            .admin_json(
                "POST",
                "/api/upload/file-code",
                json!({"file_code": "abc", "title": "Hosted", "tags": ["One"]}),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["message"], "Video added successfully");
        assert_eq!(body["video"]["embed_code"], "https://host.test/embed/abc");

        let (status, body) = app
            .admin_json("POST", "/api/upload/file-code", json!({"file_code": "abc"}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Video with this file code already exists");

        let (status, body) = app
            .admin_json("POST", "/api/upload/file-code", json!({"title": "x"}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "File code is required");
    }

    #[tokio::test]
    async fn bulk_registration_reports_each_entry() {
        let app = test_app().await;
        let (status, body) = app
            .admin_json("POST", "/api/upload/bulk-file-codes", json!({"videos": []}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No videos provided");

        insert_video(&app.state.store, "dup", "Existing").await.unwrap();
        let videos = json!({"videos": [{"file_code": "new1"}, {"file_code": "dup"}, {"title": "no code"}]});
        let (status, body) = app
            .admin_json("POST", "/api/upload/bulk-file-codes", videos)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Added 1 videos, 2 failed");
        assert_eq!(body["results"]["success"][0]["file_code"], "new1");
        assert_eq!(body["results"]["failed"][1]["file_code"], "unknown");
    }

    #[tokio::test]
    async fn thumbnails_need_a_cdn_and_a_video() {
        let image = Part::File {
            name: "thumbnail",
            file_name: "cover.png",
            content_type: "image/png",
            bytes: b"\x89PNG",
        };

        let bare = test_app_with(FakeHost::default(), None).await;
        let (status, _) = post_multipart(&bare, "/api/upload/thumbnail", &[], true).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let app = test_app().await;
        let video = insert_video(&app.state.store, "th1", "Thumb").await.unwrap();
        let (status, body) =
            post_multipart(&app, "/api/upload/thumbnail", &[Part::Text("videoId", &video.id)], true)
                .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No image file provided");

        let parts = [Part::Text("videoId", "missing"), image];
        let (status, body) = post_multipart(&app, "/api/upload/thumbnail", &parts, true).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Video not found");

        let image = Part::File {
            name: "thumbnail",
            file_name: "cover.png",
            content_type: "image/png",
            bytes: b"\x89PNG",
        };
        let parts = [image, Part::Text("videoId", &video.id)];
        let (status, body) = post_multipart(&app, "/api/upload/thumbnail", &parts, true).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["thumbnail"], "https://cdn.test/img1.jpg");
        let stored = app.state.store.get_video(&video.id).await.unwrap().unwrap();
        assert_eq!(stored.thumbnail, "https://cdn.test/img1.jpg");
    }

    #[tokio::test]
    async fn remote_upload_reports_host_rejections() {
        let app = test_app().await;
        let (status, body) = app
            .admin_json("POST", "/api/upload/url", json!({}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "URL is required");

        let (status, body) = app
            .admin_json("POST", "/api/upload/url", json!({"url": "ftp://files/x.mp4"}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Remote upload failed");
        assert_eq!(body["details"], "Invalid URL");

        let (status, body) = app
            .admin_json("POST", "/api/upload/url", json!({"url": "https://files/x.mp4"}))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["file_code"], "remote01");
    }

    #[tokio::test]
    async fn remote_upload_status_comes_from_the_host() {
        let app = test_app().await;
        let (status, _) = app.get("/api/upload/url/remote01/status").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = app.admin_get("/api/upload/url/remote01/status").await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["status"]["result"][0]["progress"], 100);

        let (status, body) = app.admin_get("/api/upload/url/lost/status").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], "Failed to check upload status");
    }

    #[tokio::test]
    async fn host_listing_flags_cataloged_files() {
        let host = FakeHost {
            files: vec![json!({"file_code": "have"}), json!({"file_code": "new"})],
            ..FakeHost::default()
        };
        let app = test_app_with(host, None).await;
        insert_video(&app.state.store, "have", "Have").await.unwrap();

        let (status, body) = app.admin_get("/api/upload/abyss-files?limit=2").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["files"][0]["alreadyAdded"], true);
        assert_eq!(body["files"][1]["alreadyAdded"], false);
        assert_eq!(body["pagination"], json!({"limit": 2, "nextPageToken": "t2"}));

        let (_, body) = app.admin_get("/api/upload/account-info").await;
        assert_eq!(body["account"]["storage"]["used"], 1);
    }

    #[tokio::test]
    async fn host_listing_limit_is_clamped() {
        let app = test_app().await;
        let (_, body) = app.admin_get("/api/upload/abyss-files?limit=5000").await;
        assert_eq!(body["pagination"]["limit"], 100);
        let (_, body) = app.admin_get("/api/upload/abyss-files?limit=0").await;
        assert_eq!(body["pagination"]["limit"], 1);
        let (_, body) = app.admin_get("/api/upload/abyss-files").await;
        assert_eq!(body["pagination"]["limit"], 50);
        assert_eq!(*app.host.listed.lock(), vec![100, 1, 50]);
    }
}
