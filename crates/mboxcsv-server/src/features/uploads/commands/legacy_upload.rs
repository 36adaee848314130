//! Legacy single-shot upload command
//!
//! Compatibility path for simple callers: the whole file arrives in one
//! multipart request, bypassing the chunk protocol. The route streams the
//! field to disk with the size cap enforced mid-stream; this command then
//! registers the job directly in the queued state and submits it.

use serde::Serialize;
use std::path::PathBuf;

use crate::jobs::{ExportOptions, Job, JobStatus};
use crate::state::AppState;

#[derive(Debug, Clone)]
pub struct LegacyUploadCommand {
    pub filename: String,
    pub size: u64,
    /// File already streamed to disk by the transport layer
    pub staged_path: PathBuf,
    pub options: ExportOptions,
}

#[derive(Debug, Clone, Serialize)]
pub struct LegacyUploadResponse {
    pub job_id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum LegacyUploadError {
    #[error("File exceeds the maximum upload size of {max} bytes")]
    TooLarge { max: u64 },
    #[error("Multipart request is missing a 'file' field")]
    FileFieldMissing,
    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

#[tracing::instrument(skip(state, command), fields(filename = %command.filename, size = command.size))]
pub async fn handle(
    state: AppState,
    command: LegacyUploadCommand,
) -> Result<LegacyUploadResponse, LegacyUploadError> {
    let mut job = Job::new(
        command.filename,
        command.size,
        None,
        command.options,
    );
    job.status = JobStatus::Queued;
    job.received_bytes = command.size;

    let input_path = state.input_path(&job.id);
    tokio::fs::rename(&command.staged_path, &input_path)
        .await
        .map_err(|e| LegacyUploadError::Storage(e.into()))?;
    job.input_path = Some(input_path);

    state
        .store
        .create(&job)
        .await
        .map_err(|e| LegacyUploadError::Storage(e.into()))?;

    tracing::info!(job_id = %job.id, size = job.declared_size, "Legacy upload accepted, conversion queued");

    state.pool.submit(job.id.clone());

    Ok(LegacyUploadResponse { job_id: job.id })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[tokio::test]
    async fn test_legacy_upload_queues_job() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.data_dir = dir.path().join("data");
        config.storage.download_dir = dir.path().join("downloads");
        let state = AppState::init(config).await.unwrap();

        let staged = dir.path().join("staged.mbox");
        tokio::fs::write(&staged, b"From a\nSubject: x\n\nhello\n").await.unwrap();

        let response = handle(
            state.clone(),
            LegacyUploadCommand {
                filename: "mail.mbox".to_string(),
                size: 25,
                staged_path: staged.clone(),
                options: ExportOptions::default(),
            },
        )
        .await
        .unwrap();

        let job = state.store.load_required(&response.job_id).await.unwrap();
        assert!(matches!(
            job.status,
            JobStatus::Queued | JobStatus::Processing | JobStatus::Done
        ));
        assert_eq!(job.declared_size, 25);
        assert!(!staged.exists());
    }
}
