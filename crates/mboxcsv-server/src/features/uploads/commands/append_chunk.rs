//! Chunk append and finalize command
//!
//! The protocol is strictly sequential: only the exact next chunk index is
//! accepted, which turns network reordering into a counter check. Every
//! rejection leaves the job record and backing file untouched, so the client
//! can retry the same chunk safely.

use axum::body::Bytes;
use serde::Serialize;
use tokio::io::AsyncWriteExt;

use crate::jobs::JobStatus;
use crate::state::AppState;
use mboxcsv_common::{checksum, CoreError};

#[derive(Debug, Clone)]
pub struct AppendChunkCommand {
    pub job_id: String,
    pub index: u64,
    pub total_chunks: u64,
    pub is_final: bool,
    /// Hex sha256 of this chunk's bytes
    pub digest: String,
    pub bytes: Bytes,
}

#[derive(Debug, Clone, Serialize)]
pub struct AppendChunkResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub received_bytes: u64,
    pub next_chunk_index: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum AppendChunkError {
    #[error("Job not found: {0}")]
    NotFound(String),
    #[error("Job is not accepting chunks (status: {0})")]
    WrongState(JobStatus),
    #[error("Out-of-sequence chunk: expected index {expected}, got {got}")]
    Sequence { expected: u64, got: u64 },
    #[error("Chunk checksum mismatch: expected {expected}, got {actual}")]
    ChunkChecksum { expected: String, actual: String },
    #[error("Chunk would exceed declared size: {declared} declared, {would} after append")]
    Overflow { declared: u64, would: u64 },
    #[error("Size mismatch on finalize: declared {declared}, received {received}")]
    SizeMismatch { declared: u64, received: u64 },
    #[error("File checksum mismatch: expected {expected}, got {actual}")]
    FileChecksum { expected: String, actual: String },
    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

#[tracing::instrument(skip(state, command), fields(job_id = %command.job_id, index = command.index, is_final = command.is_final))]
pub async fn handle(
    state: AppState,
    command: AppendChunkCommand,
) -> Result<AppendChunkResponse, AppendChunkError> {
    let mut job = state
        .store
        .load(&command.job_id)
        .await
        .map_err(|e| AppendChunkError::Storage(e.into()))?
        .ok_or_else(|| AppendChunkError::NotFound(command.job_id.clone()))?;

    if job.status != JobStatus::Uploading {
        return Err(AppendChunkError::WrongState(job.status));
    }

    if command.index != job.next_chunk_index {
        return Err(AppendChunkError::Sequence {
            expected: job.next_chunk_index,
            got: command.index,
        });
    }

    let actual = checksum::compute_sha256(&command.bytes);
    if !actual.eq_ignore_ascii_case(&command.digest) {
        return Err(AppendChunkError::ChunkChecksum {
            expected: command.digest,
            actual,
        });
    }

    let would = job.received_bytes + command.bytes.len() as u64;
    if would > job.declared_size {
        return Err(AppendChunkError::Overflow {
            declared: job.declared_size,
            would,
        });
    }

    // All checks passed; append and advance
    let part_path = state.part_path(&job.id);
    let mut file = tokio::fs::OpenOptions::new()
        .append(true)
        .open(&part_path)
        .await
        .map_err(|e| AppendChunkError::Storage(e.into()))?;
    file.write_all(&command.bytes)
        .await
        .map_err(|e| AppendChunkError::Storage(e.into()))?;
    file.flush()
        .await
        .map_err(|e| AppendChunkError::Storage(e.into()))?;

    job.received_bytes = would;
    job.next_chunk_index += 1;
    job.expected_chunk_count = command.total_chunks;
    state
        .store
        .save(&job)
        .await
        .map_err(|e| AppendChunkError::Storage(e.into()))?;

    tracing::debug!(
        job_id = %job.id,
        received = job.received_bytes,
        declared = job.declared_size,
        "Chunk accepted"
    );

    if command.is_final {
        finalize(&state, &mut job).await?;
    }

    Ok(AppendChunkResponse {
        job_id: job.id.clone(),
        status: job.status,
        received_bytes: job.received_bytes,
        next_chunk_index: job.next_chunk_index,
    })
}

/// Validate total size and whole-file digest, promote the backing file, and
/// submit exactly one conversion task
async fn finalize(state: &AppState, job: &mut crate::jobs::Job) -> Result<(), AppendChunkError> {
    if job.received_bytes != job.declared_size {
        // The accepted chunk stays; the client may keep uploading
        return Err(AppendChunkError::SizeMismatch {
            declared: job.declared_size,
            received: job.received_bytes,
        });
    }

    let part_path = state.part_path(&job.id);

    if let Some(expected) = job.client_checksum.clone() {
        let verify_path = part_path.clone();
        let verified = tokio::task::spawn_blocking(move || {
            checksum::verify_file_sha256(&verify_path, &expected)
        })
        .await
        .map_err(|e| AppendChunkError::Storage(e.into()))?;

        if let Err(e) = verified {
            let (expected, actual) = match e {
                CoreError::ChecksumMismatch { expected, actual } => (expected, actual),
                other => return Err(AppendChunkError::Storage(other.into())),
            };
            // Failed-to-finalize is terminal; the upload must be restarted
            job.status = JobStatus::Error;
            job.error_message = Some("Uploaded file failed checksum verification".to_string());
            state
                .store
                .save(job)
                .await
                .map_err(|e| AppendChunkError::Storage(e.into()))?;
            let _ = tokio::fs::remove_file(&part_path).await;
            return Err(AppendChunkError::FileChecksum { expected, actual });
        }
    }

    let input_path = state.input_path(&job.id);
    tokio::fs::rename(&part_path, &input_path)
        .await
        .map_err(|e| AppendChunkError::Storage(e.into()))?;

    job.status = JobStatus::Queued;
    job.input_path = Some(input_path);
    state
        .store
        .save(job)
        .await
        .map_err(|e| AppendChunkError::Storage(e.into()))?;

    tracing::info!(job_id = %job.id, size = job.declared_size, "Upload finalized, conversion queued");

    state.pool.submit(job.id.clone());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::features::uploads::commands::init::{self, InitUploadCommand};
    use crate::jobs::ExportOptions;

    async fn test_state() -> (tempfile::TempDir, AppState) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.data_dir = dir.path().join("data");
        config.storage.download_dir = dir.path().join("downloads");
        let state = AppState::init(config).await.unwrap();
        (dir, state)
    }

    async fn init_job(state: &AppState, size: u64, checksum: Option<String>) -> String {
        let response = init::handle(
            state.clone(),
            InitUploadCommand {
                filename: "mail.mbox".to_string(),
                size,
                checksum,
                options: ExportOptions::default(),
            },
        )
        .await
        .unwrap();
        response.job_id
    }

    fn chunk(job_id: &str, index: u64, is_final: bool, bytes: &[u8]) -> AppendChunkCommand {
        AppendChunkCommand {
            job_id: job_id.to_string(),
            index,
            total_chunks: 2,
            is_final,
            digest: checksum::compute_sha256(bytes),
            bytes: Bytes::copy_from_slice(bytes),
        }
    }

    #[tokio::test]
    async fn test_in_order_chunks_concatenate() {
        let (_dir, state) = test_state().await;
        let job_id = init_job(&state, 8, None).await;

        handle(state.clone(), chunk(&job_id, 0, false, b"abcd")).await.unwrap();
        let response = handle(state.clone(), chunk(&job_id, 1, true, b"efgh")).await.unwrap();

        assert_eq!(response.status, JobStatus::Queued);
        assert_eq!(response.received_bytes, 8);
        assert_eq!(response.next_chunk_index, 2);

        let content = tokio::fs::read(state.input_path(&job_id)).await.unwrap();
        assert_eq!(content, b"abcdefgh");
    }

    #[tokio::test]
    async fn test_wrong_index_leaves_state_unchanged() {
        let (_dir, state) = test_state().await;
        let job_id = init_job(&state, 8, None).await;

        let err = handle(state.clone(), chunk(&job_id, 1, false, b"abcd")).await.unwrap_err();
        assert!(matches!(err, AppendChunkError::Sequence { expected: 0, got: 1 }));

        let job = state.store.load_required(&job_id).await.unwrap();
        assert_eq!(job.received_bytes, 0);
        assert_eq!(job.next_chunk_index, 0);
    }

    #[tokio::test]
    async fn test_bad_digest_leaves_state_unchanged() {
        let (_dir, state) = test_state().await;
        let job_id = init_job(&state, 8, None).await;

        let mut cmd = chunk(&job_id, 0, false, b"abcd");
        cmd.digest = "0".repeat(64);
        let err = handle(state.clone(), cmd).await.unwrap_err();
        assert!(matches!(err, AppendChunkError::ChunkChecksum { .. }));

        let job = state.store.load_required(&job_id).await.unwrap();
        assert_eq!(job.received_bytes, 0);
        assert_eq!(job.next_chunk_index, 0);
    }

    #[tokio::test]
    async fn test_overflow_rejected() {
        let (_dir, state) = test_state().await;
        let job_id = init_job(&state, 4, None).await;

        let err = handle(state.clone(), chunk(&job_id, 0, false, b"abcdefgh")).await.unwrap_err();
        assert!(matches!(err, AppendChunkError::Overflow { declared: 4, would: 8 }));
    }

    #[tokio::test]
    async fn test_premature_final_is_size_mismatch() {
        let (_dir, state) = test_state().await;
        let job_id = init_job(&state, 8, None).await;

        let err = handle(state.clone(), chunk(&job_id, 0, true, b"abcd")).await.unwrap_err();
        assert!(matches!(
            err,
            AppendChunkError::SizeMismatch { declared: 8, received: 4 }
        ));

        // The chunk itself was accepted; the job never reached queued
        let job = state.store.load_required(&job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Uploading);
        assert_eq!(job.received_bytes, 4);
    }

    #[tokio::test]
    async fn test_unknown_job_rejected() {
        let (_dir, state) = test_state().await;
        let err = handle(state.clone(), chunk("nope", 0, false, b"abcd")).await.unwrap_err();
        assert!(matches!(err, AppendChunkError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_no_chunks_after_finalize() {
        let (_dir, state) = test_state().await;
        let job_id = init_job(&state, 4, None).await;

        handle(state.clone(), chunk(&job_id, 0, true, b"abcd")).await.unwrap();
        let err = handle(state.clone(), chunk(&job_id, 1, false, b"more")).await.unwrap_err();
        assert!(matches!(err, AppendChunkError::WrongState(_)));
    }

    #[tokio::test]
    async fn test_whole_file_checksum_verified() {
        let (_dir, state) = test_state().await;
        let whole = checksum::compute_sha256(b"abcdefgh");
        let job_id = init_job(&state, 8, Some(whole)).await;

        handle(state.clone(), chunk(&job_id, 0, false, b"abcd")).await.unwrap();
        let response = handle(state.clone(), chunk(&job_id, 1, true, b"efgh")).await.unwrap();
        assert_eq!(response.status, JobStatus::Queued);
    }

    #[tokio::test]
    async fn test_whole_file_checksum_mismatch_fails_job() {
        let (_dir, state) = test_state().await;
        let job_id = init_job(&state, 4, Some("0".repeat(64))).await;

        let err = handle(state.clone(), chunk(&job_id, 0, true, b"abcd")).await.unwrap_err();
        assert!(matches!(err, AppendChunkError::FileChecksum { .. }));

        let job = state.store.load_required(&job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Error);
        assert!(!state.part_path(&job_id).exists());
    }
}
