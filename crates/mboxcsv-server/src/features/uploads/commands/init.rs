//! Upload initiation command

use serde::{Deserialize, Serialize};

use crate::jobs::{ExportOptions, Job};
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct InitUploadCommand {
    pub filename: String,
    pub size: u64,
    /// Optional whole-file sha256 (hex), verified after the final chunk
    #[serde(default)]
    pub checksum: Option<String>,
    #[serde(flatten)]
    pub options: ExportOptions,
}

#[derive(Debug, Clone, Serialize)]
pub struct InitUploadResponse {
    pub job_id: String,
    /// Chunk size the client must use for every subsequent chunk call
    pub chunk_size: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum InitUploadError {
    #[error("Filename is required and cannot be empty")]
    FilenameRequired,
    #[error("Declared size must be between 1 and {max} bytes")]
    SizeRange { max: u64 },
    #[error("Checksum must be a 64-character hex sha256 digest")]
    ChecksumFormat,
    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl InitUploadCommand {
    pub fn validate(&self, max_bytes: u64) -> Result<(), InitUploadError> {
        if self.filename.trim().is_empty() {
            return Err(InitUploadError::FilenameRequired);
        }
        if self.size == 0 || self.size > max_bytes {
            return Err(InitUploadError::SizeRange { max: max_bytes });
        }
        if let Some(ref checksum) = self.checksum {
            if checksum.len() != 64 || !checksum.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(InitUploadError::ChecksumFormat);
            }
        }
        Ok(())
    }
}

#[tracing::instrument(skip(state, command), fields(filename = %command.filename, size = command.size))]
pub async fn handle(
    state: AppState,
    command: InitUploadCommand,
) -> Result<InitUploadResponse, InitUploadError> {
    command.validate(state.config.upload.max_bytes)?;

    let job = Job::new(
        command.filename,
        command.size,
        command.checksum.map(|c| c.to_ascii_lowercase()),
        command.options,
    );

    // Empty backing file up front, so the first append is a plain append
    tokio::fs::File::create(state.part_path(&job.id))
        .await
        .map_err(|e| InitUploadError::Storage(e.into()))?;

    state
        .store
        .create(&job)
        .await
        .map_err(|e| InitUploadError::Storage(e.into()))?;

    tracing::info!(job_id = %job.id, size = job.declared_size, "Upload initiated");

    Ok(InitUploadResponse {
        job_id: job.id,
        chunk_size: state.config.upload.chunk_size,
    })
}
