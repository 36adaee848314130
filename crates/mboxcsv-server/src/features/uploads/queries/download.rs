//! Export download query
//!
//! Permitted exactly once, and only for a finished job. The handler opens
//! the archive, claims it by unlinking the artifact, then retires the job
//! record; the already-open handle keeps the stream alive while the
//! directory entry is gone, and the unlink guarantees a single winner when
//! downloads race.

use std::path::PathBuf;

use crate::jobs::JobStatus;
use crate::state::AppState;

#[derive(Debug, Clone)]
pub struct DownloadQuery {
    pub job_id: String,
}

/// Open artifact handed back to the route for streaming
#[derive(Debug)]
pub struct DownloadArtifact {
    pub file: tokio::fs::File,
    pub download_name: String,
    pub path: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("Job not found: {0}")]
    NotFound(String),
    #[error("Export is not ready (status: {0})")]
    NotReady(JobStatus),
    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

#[tracing::instrument(skip(state), fields(job_id = %query.job_id))]
pub async fn handle(state: AppState, query: DownloadQuery) -> Result<DownloadArtifact, DownloadError> {
    let mut job = state
        .store
        .load(&query.job_id)
        .await
        .map_err(|e| DownloadError::Storage(e.into()))?
        .ok_or_else(|| DownloadError::NotFound(query.job_id.clone()))?;

    if job.status != JobStatus::Done {
        return Err(DownloadError::NotReady(job.status));
    }
    let path = job
        .output_path
        .clone()
        .ok_or_else(|| DownloadError::NotReady(job.status))?;

    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        // A concurrent download may have claimed the artifact already
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(DownloadError::NotFound(job.id));
        },
        Err(e) => return Err(DownloadError::Storage(e.into())),
    };

    // Single-download semantics: the unlink is the claim. Exactly one request
    // can remove the artifact, so a concurrent download of the same job loses
    // here instead of double-streaming; the winner's open descriptor keeps
    // the bytes streamable after the unlink.
    match tokio::fs::remove_file(&path).await {
        Ok(()) => {},
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(DownloadError::NotFound(job.id));
        },
        Err(e) => return Err(DownloadError::Storage(e.into())),
    }

    job.status = JobStatus::Downloaded;
    if let Err(e) = state.store.save(&job).await {
        tracing::warn!(job_id = %job.id, error = ?e, "Failed to record downloaded status");
    }
    if let Err(e) = state.store.delete(&job.id).await {
        tracing::warn!(job_id = %job.id, error = ?e, "Failed to remove job record");
    }

    tracing::info!(job_id = %job.id, "Export downloaded, job retired");

    Ok(DownloadArtifact {
        file,
        download_name: "emails.zip".to_string(),
        path,
    })
}
