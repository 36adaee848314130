use crate::api::response::{ApiResponse, ErrorResponse};
use crate::config::UploadConfig;
use crate::jobs::ExportOptions;
use crate::state::AppState;
use axum::{
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

use super::{
    commands::{
        AppendChunkCommand, AppendChunkError, InitUploadCommand, InitUploadError,
        LegacyUploadCommand, LegacyUploadError,
    },
    queries::{DownloadError, DownloadQuery, StatusError, StatusQuery},
};

/// Slack on top of the upload maximum for multipart framing overhead
const MULTIPART_HEADROOM: u64 = 1024 * 1024;

pub fn uploads_routes(upload: &UploadConfig) -> Router<AppState> {
    // A chunk body is buffered in memory before any protocol check runs, so
    // its route caps the body at exactly one chunk; anything larger dies at
    // the extractor with 413 instead of being materialized in RAM. The legacy
    // route streams its multipart field to disk, so it only needs the overall
    // upload maximum plus framing headroom.
    let chunk_limit = saturating_usize(upload.chunk_size);
    let legacy_limit = saturating_usize(upload.max_bytes.saturating_add(MULTIPART_HEADROOM));

    Router::new()
        .route("/uploads", post(init_upload))
        .route(
            "/uploads/:job_id/chunks",
            post(append_chunk).layer(DefaultBodyLimit::max(chunk_limit)),
        )
        .route(
            "/upload",
            post(legacy_upload).layer(DefaultBodyLimit::max(legacy_limit)),
        )
        .route("/jobs/:job_id", get(job_status))
        .route("/jobs/:job_id/download", get(download_export))
}

fn saturating_usize(value: u64) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}

#[tracing::instrument(skip(state, command))]
async fn init_upload(
    State(state): State<AppState>,
    Json(command): Json<InitUploadCommand>,
) -> Result<Response, UploadApiError> {
    let response = super::commands::init::handle(state, command).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(response))).into_response())
}

/// Per-chunk metadata carried in the query string; the body is the raw bytes
#[derive(Debug, Deserialize)]
struct ChunkParams {
    index: u64,
    total: u64,
    #[serde(rename = "final")]
    is_final: bool,
    /// Hex sha256 of the chunk body
    digest: String,
}

#[tracing::instrument(skip(state, params, bytes), fields(job_id = %job_id))]
async fn append_chunk(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Query(params): Query<ChunkParams>,
    bytes: Bytes,
) -> Result<Response, UploadApiError> {
    let command = AppendChunkCommand {
        job_id,
        index: params.index,
        total_chunks: params.total,
        is_final: params.is_final,
        digest: params.digest,
        bytes,
    };

    let response = super::commands::append_chunk::handle(state, command).await?;

    Ok((StatusCode::OK, Json(ApiResponse::success(response))).into_response())
}

#[tracing::instrument(skip(state, multipart))]
async fn legacy_upload(
    State(state): State<AppState>,
    Query(options): Query<ExportOptions>,
    mut multipart: Multipart,
) -> Result<Response, UploadApiError> {
    let max_bytes = state.config.upload.max_bytes;

    // Stream the file field straight to disk; reject mid-stream past the cap
    // so an oversized body never lands in full.
    let mut staged: Option<(String, std::path::PathBuf, u64)> = None;

    while let Some(mut field) = multipart.next_field().await.map_err(|e| {
        UploadApiError::LegacyUpload(LegacyUploadError::Storage(anyhow::anyhow!(
            "Failed to read multipart field: {}",
            e
        )))
    })? {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field
            .file_name()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "upload.mbox".to_string());
        let staged_path = state
            .config
            .storage
            .uploads_dir()
            .join(format!("{}.staged", uuid::Uuid::new_v4().simple()));

        let mut file = tokio::fs::File::create(&staged_path).await.map_err(|e| {
            UploadApiError::LegacyUpload(LegacyUploadError::Storage(e.into()))
        })?;

        let mut total: u64 = 0;
        loop {
            let chunk = match field.chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(e) => {
                    let _ = tokio::fs::remove_file(&staged_path).await;
                    return Err(UploadApiError::LegacyUpload(LegacyUploadError::Storage(
                        anyhow::anyhow!("Failed to read file bytes: {}", e),
                    )));
                },
            };
            total += chunk.len() as u64;
            if total > max_bytes {
                drop(file);
                let _ = tokio::fs::remove_file(&staged_path).await;
                return Err(UploadApiError::LegacyUpload(LegacyUploadError::TooLarge {
                    max: max_bytes,
                }));
            }
            file.write_all(&chunk).await.map_err(|e| {
                UploadApiError::LegacyUpload(LegacyUploadError::Storage(e.into()))
            })?;
        }
        file.flush().await.map_err(|e| {
            UploadApiError::LegacyUpload(LegacyUploadError::Storage(e.into()))
        })?;

        staged = Some((filename, staged_path, total));
        break;
    }

    let (filename, staged_path, size) = staged
        .ok_or(UploadApiError::LegacyUpload(LegacyUploadError::FileFieldMissing))?;

    let command = LegacyUploadCommand {
        filename,
        size,
        staged_path,
        options,
    };

    let response = super::commands::legacy_upload::handle(state, command).await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(response))).into_response())
}

#[tracing::instrument(skip(state), fields(job_id = %job_id))]
async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Response, UploadApiError> {
    let response = super::queries::status::handle(state, StatusQuery { job_id }).await?;
    Ok((StatusCode::OK, Json(ApiResponse::success(response))).into_response())
}

#[tracing::instrument(skip(state), fields(job_id = %job_id))]
async fn download_export(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Response, UploadApiError> {
    let artifact = super::queries::download::handle(state, DownloadQuery { job_id }).await?;

    let stream = ReaderStream::new(artifact.file);
    let disposition = format!("attachment; filename=\"{}\"", artifact.download_name);

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}

#[derive(Debug)]
enum UploadApiError {
    Init(InitUploadError),
    AppendChunk(AppendChunkError),
    LegacyUpload(LegacyUploadError),
    Status(StatusError),
    Download(DownloadError),
}

impl From<InitUploadError> for UploadApiError {
    fn from(err: InitUploadError) -> Self {
        Self::Init(err)
    }
}

impl From<AppendChunkError> for UploadApiError {
    fn from(err: AppendChunkError) -> Self {
        Self::AppendChunk(err)
    }
}

impl From<LegacyUploadError> for UploadApiError {
    fn from(err: LegacyUploadError) -> Self {
        Self::LegacyUpload(err)
    }
}

impl From<StatusError> for UploadApiError {
    fn from(err: StatusError) -> Self {
        Self::Status(err)
    }
}

impl From<DownloadError> for UploadApiError {
    fn from(err: DownloadError) -> Self {
        Self::Download(err)
    }
}

impl IntoResponse for UploadApiError {
    fn into_response(self) -> Response {
        match self {
            UploadApiError::Init(InitUploadError::FilenameRequired)
            | UploadApiError::Init(InitUploadError::SizeRange { .. })
            | UploadApiError::Init(InitUploadError::ChecksumFormat) => {
                let error = ErrorResponse::new("VALIDATION_ERROR", self.to_string());
                (StatusCode::BAD_REQUEST, Json(error)).into_response()
            },
            UploadApiError::Init(InitUploadError::Storage(_)) => {
                tracing::error!("Storage error during upload initiation: {}", self);
                let error = ErrorResponse::new("STORAGE_ERROR", "A storage error occurred");
                (StatusCode::INTERNAL_SERVER_ERROR, Json(error)).into_response()
            },

            UploadApiError::AppendChunk(AppendChunkError::NotFound(_)) => {
                let error = ErrorResponse::new("NOT_FOUND", self.to_string());
                (StatusCode::NOT_FOUND, Json(error)).into_response()
            },
            UploadApiError::AppendChunk(AppendChunkError::WrongState(_)) => {
                let error = ErrorResponse::new("STATE_ERROR", self.to_string());
                (StatusCode::CONFLICT, Json(error)).into_response()
            },
            UploadApiError::AppendChunk(AppendChunkError::Sequence { .. }) => {
                let error = ErrorResponse::new("SEQUENCE_ERROR", self.to_string());
                (StatusCode::CONFLICT, Json(error)).into_response()
            },
            UploadApiError::AppendChunk(AppendChunkError::ChunkChecksum { .. })
            | UploadApiError::AppendChunk(AppendChunkError::FileChecksum { .. }) => {
                let error = ErrorResponse::new("CHECKSUM_MISMATCH", self.to_string());
                (StatusCode::UNPROCESSABLE_ENTITY, Json(error)).into_response()
            },
            UploadApiError::AppendChunk(AppendChunkError::Overflow { .. }) => {
                let error = ErrorResponse::new("SIZE_OVERFLOW", self.to_string());
                (StatusCode::PAYLOAD_TOO_LARGE, Json(error)).into_response()
            },
            UploadApiError::AppendChunk(AppendChunkError::SizeMismatch { .. }) => {
                let error = ErrorResponse::new("SIZE_MISMATCH", self.to_string());
                (StatusCode::BAD_REQUEST, Json(error)).into_response()
            },
            UploadApiError::AppendChunk(AppendChunkError::Storage(_)) => {
                tracing::error!("Storage error during chunk append: {}", self);
                let error = ErrorResponse::new("STORAGE_ERROR", "A storage error occurred");
                (StatusCode::INTERNAL_SERVER_ERROR, Json(error)).into_response()
            },

            UploadApiError::LegacyUpload(LegacyUploadError::TooLarge { .. }) => {
                let error = ErrorResponse::new("VALIDATION_ERROR", self.to_string());
                (StatusCode::PAYLOAD_TOO_LARGE, Json(error)).into_response()
            },
            UploadApiError::LegacyUpload(LegacyUploadError::FileFieldMissing) => {
                let error = ErrorResponse::new("VALIDATION_ERROR", self.to_string());
                (StatusCode::BAD_REQUEST, Json(error)).into_response()
            },
            UploadApiError::LegacyUpload(LegacyUploadError::Storage(_)) => {
                tracing::error!("Storage error during upload: {}", self);
                let error = ErrorResponse::new("STORAGE_ERROR", "A storage error occurred");
                (StatusCode::INTERNAL_SERVER_ERROR, Json(error)).into_response()
            },

            UploadApiError::Status(StatusError::NotFound(_)) => {
                let error = ErrorResponse::new("NOT_FOUND", self.to_string());
                (StatusCode::NOT_FOUND, Json(error)).into_response()
            },
            UploadApiError::Status(StatusError::Storage(_)) => {
                tracing::error!("Storage error during status query: {}", self);
                let error = ErrorResponse::new("STORAGE_ERROR", "A storage error occurred");
                (StatusCode::INTERNAL_SERVER_ERROR, Json(error)).into_response()
            },

            UploadApiError::Download(DownloadError::NotFound(_)) => {
                let error = ErrorResponse::new("NOT_FOUND", self.to_string());
                (StatusCode::NOT_FOUND, Json(error)).into_response()
            },
            UploadApiError::Download(DownloadError::NotReady(_)) => {
                let error = ErrorResponse::new("NOT_READY", self.to_string());
                (StatusCode::CONFLICT, Json(error)).into_response()
            },
            UploadApiError::Download(DownloadError::Storage(_)) => {
                tracing::error!("Storage error during download: {}", self);
                let error = ErrorResponse::new("STORAGE_ERROR", "A storage error occurred");
                (StatusCode::INTERNAL_SERVER_ERROR, Json(error)).into_response()
            },
        }
    }
}

impl std::fmt::Display for UploadApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Init(e) => write!(f, "{}", e),
            Self::AppendChunk(e) => write!(f, "{}", e),
            Self::LegacyUpload(e) => write!(f, "{}", e),
            Self::Status(e) => write!(f, "{}", e),
            Self::Download(e) => write!(f, "{}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = UploadApiError::Init(InitUploadError::FilenameRequired);
        assert!(err.to_string().contains("Filename is required"));
    }

    #[test]
    fn test_sequence_error_names_expected_index() {
        let err = UploadApiError::AppendChunk(AppendChunkError::Sequence { expected: 3, got: 5 });
        assert!(err.to_string().contains("expected index 3"));
    }

    #[test]
    fn test_routes_structure() {
        let upload = crate::config::Config::default().upload;
        let router = uploads_routes(&upload);
        assert!(format!("{:?}", router).contains("Router"));
    }

    #[test]
    fn test_body_limits_fit_in_usize() {
        assert_eq!(saturating_usize(1024), 1024);
        assert_eq!(saturating_usize(u64::MAX), usize::MAX);
    }
}
