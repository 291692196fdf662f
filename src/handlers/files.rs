use std::sync::Arc;

use axum::{
    body::Body,
    extract::{multipart::Field, Multipart, Path, State},
    http::{header, StatusCode},
    response::Response,
    Json,
};
use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::{AppError, Result};
use crate::files::FileRepository;
use crate::handlers::AppState;
use crate::models::{FileRecord, NewFile};
use crate::preview::{guess_upload_type, preview_content_type};
use crate::storage::{ObjectBody, StorageError};

#[derive(Serialize)]
pub struct UploadResponse {
    #[serde(rename = "_id")]
    id: Uuid,
    path: String,
    name: String,
}

#[derive(Deserialize)]
pub struct RenameRequest {
    #[serde(default)]
    name: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareResponse {
    share_link: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    Attachment,
    Inline,
}

impl Disposition {
    fn as_str(self) -> &'static str {
        match self {
            Disposition::Attachment => "attachment",
            Disposition::Inline => "inline",
        }
    }
}

/// `Content-Disposition` value safe against header injection, with an
/// RFC 5987 `filename*` for non-ASCII names.
fn content_disposition(disposition: Disposition, filename: &str) -> String {
    let plain = filename.is_ascii() && !filename.chars().any(|c| c.is_control() || c == '"' || c == '\\');
    if plain {
        return format!("{}; filename=\"{}\"", disposition.as_str(), filename);
    }

    let sanitized: String = filename
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii() => c,
            _ => '_',
        })
        .collect();
    format!(
        "{}; filename=\"{}\"; filename*=UTF-8''{}",
        disposition.as_str(),
        sanitized,
        urlencoding::encode(filename)
    )
}

/// Ids that do not parse cannot name a file.
fn parse_file_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|_| AppError::NotFound("File".to_string()))
}

async fn find_file(state: &AppState, raw_id: &str) -> Result<FileRecord> {
    let id = parse_file_id(raw_id)?;
    FileRepository::new(&state.db)
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("File".to_string()))
}

fn multipart_error(e: axum::extract::multipart::MultipartError, limit: u64) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge { limit }
    } else {
        tracing::debug!("invalid multipart body: {}", e);
        AppError::Validation("Invalid multipart data".to_string())
    }
}

/// Read a field, failing as soon as it grows past `limit`.
async fn read_limited(field: &mut Field<'_>, limit: u64) -> Result<Bytes> {
    let mut data = BytesMut::new();
    while let Some(chunk) = field.chunk().await.map_err(|e| multipart_error(e, limit))? {
        if (data.len() + chunk.len()) as u64 > limit {
            return Err(AppError::PayloadTooLarge { limit });
        }
        data.extend_from_slice(&chunk);
    }
    Ok(data.freeze())
}

pub async fn upload(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>> {
    let limit = state.settings.max_upload_bytes;
    let mut upload: Option<(String, String, Bytes)> = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let name = field
            .file_name()
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "file".to_string());
        let content_type = field
            .content_type()
            .map(str::to_string)
            .unwrap_or_else(|| guess_upload_type(&name));
        let data = read_limited(&mut field, limit).await?;
        upload = Some((name, content_type, data));
        break;
    }

    let (name, content_type, data) =
        upload.ok_or_else(|| AppError::Validation("No file uploaded".to_string()))?;
    let size = data.len() as u64;

    let stored = state
        .storage
        .put(user.id, data, &name, &content_type)
        .await
        .map_err(|e| {
            tracing::error!(user_id = %user.id, error = %e, "upload to object storage failed");
            AppError::Storage(e)
        })?;

    let record = FileRepository::new(&state.db)
        .create(&NewFile {
            user_id: user.id,
            storage_key: &stored.key,
            name: &name,
            content_type: &content_type,
            size,
            file_link: &stored.url,
        })
        .await
        .map_err(|e| {
            // The object stays in the bucket; nothing reconciles it.
            tracing::error!(key = %stored.key, error = %e, "file record not created, object orphaned");
            e
        })?;

    tracing::info!(user_id = %user.id, file_id = %record.id, size, "file uploaded");
    Ok(Json(UploadResponse {
        id: record.id,
        path: state.download_url(record.id),
        name: record.name,
    }))
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<FileRecord>>> {
    let files = FileRepository::new(&state.db).list_by_owner(user.id).await?;
    Ok(Json(files))
}

/// Public metadata for the shared-file viewer.
pub async fn get_file(
    State(state): State<Arc<AppState>>,
    Path(file_id): Path<String>,
) -> Result<Json<FileRecord>> {
    Ok(Json(find_file(&state, &file_id).await?))
}

async fn open_object(state: &AppState, file: &FileRecord) -> Result<ObjectBody> {
    state.storage.get(&file.storage_key).await.map_err(|e| {
        if let StorageError::NotFound(_) = e {
            tracing::error!(
                file_id = %file.id,
                key = %file.storage_key,
                "file record has no backing object"
            );
        }
        AppError::Storage(e)
    })
}

fn stream_response(
    object: ObjectBody,
    content_type: &str,
    disposition: Disposition,
    filename: &str,
) -> Result<Response> {
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition(disposition, filename),
        );
    if let Some(len) = object.content_length {
        builder = builder.header(header::CONTENT_LENGTH, len);
    }

    builder
        .body(Body::from_stream(object.stream))
        .map_err(|e| AppError::Internal(format!("failed to build response: {e}")))
}

/// Anyone holding the id may download; there is no ownership check.
pub async fn download(
    State(state): State<Arc<AppState>>,
    Path(file_id): Path<String>,
) -> Result<Response> {
    let file = find_file(&state, &file_id).await?;
    let object = open_object(&state, &file).await?;

    if let Err(e) = FileRepository::new(&state.db)
        .increment_downloads(file.id)
        .await
    {
        tracing::warn!(file_id = %file.id, error = %e, "failed to count download");
    }

    let content_type = if file.content_type.is_empty() {
        "application/octet-stream"
    } else {
        &file.content_type
    };
    stream_response(object, content_type, Disposition::Attachment, &file.name)
}

/// Inline rendering with a negotiated content type. Same access model as download.
pub async fn preview(
    State(state): State<Arc<AppState>>,
    Path(file_id): Path<String>,
) -> Result<Response> {
    let file = find_file(&state, &file_id).await?;
    let object = open_object(&state, &file).await?;

    let content_type = preview_content_type(&file.name, &file.content_type);
    stream_response(object, content_type, Disposition::Inline, &file.name)
}

/// Raw object by storage key. Target of `fileLink` when objects live on local disk.
pub async fn object(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Response> {
    let object = state.storage.get(&key).await.map_err(|e| match e {
        StorageError::NotFound(_) | StorageError::Config(_) => AppError::NotFound("Object".to_string()),
        e => AppError::Storage(e),
    })?;

    let filename = key.rsplit('/').next().unwrap_or(&key);
    let content_type = guess_upload_type(filename);
    stream_response(object, &content_type, Disposition::Inline, filename)
}

pub async fn share(
    State(state): State<Arc<AppState>>,
    Path(file_id): Path<String>,
) -> Result<Json<ShareResponse>> {
    let file = find_file(&state, &file_id).await?;
    Ok(Json(ShareResponse {
        share_link: state.download_url(file.id),
    }))
}

/// Requires a session, but not that the caller owns the file.
pub async fn rename(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(file_id): Path<String>,
    Json(req): Json<RenameRequest>,
) -> Result<Json<Value>> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("Name is required".to_string()));
    }

    let id = parse_file_id(&file_id)?;
    let file = FileRepository::new(&state.db)
        .rename(id, name)
        .await?
        .ok_or_else(|| AppError::NotFound("File".to_string()))?;

    tracing::info!(user_id = %user.id, file_id = %file.id, "file renamed");
    Ok(Json(json!({ "success": true, "file": file })))
}

/// Deletes the object, then the record. A failed object delete is logged and
/// the record is removed anyway.
pub async fn delete(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(file_id): Path<String>,
) -> Result<Json<Value>> {
    let file = find_file(&state, &file_id).await?;

    if let Err(e) = state.storage.delete(&file.storage_key).await {
        tracing::warn!(
            file_id = %file.id,
            key = %file.storage_key,
            error = %e,
            "object delete failed, removing record anyway"
        );
    }

    if !FileRepository::new(&state.db).delete(file.id).await? {
        return Err(AppError::NotFound("File".to_string()));
    }

    tracing::info!(user_id = %user.id, file_id = %file.id, "file deleted");
    Ok(Json(
        json!({ "success": true, "message": "File deleted successfully" }),
    ))
}
