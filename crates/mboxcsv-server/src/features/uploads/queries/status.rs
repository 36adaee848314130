//! Job status query
//!
//! A read-only snapshot of the job record; never blocks on the upload or
//! conversion path. A concurrent save may make the snapshot slightly stale
//! but never torn.

use serde::Serialize;

use crate::jobs::JobStatus;
use crate::state::AppState;

#[derive(Debug, Clone)]
pub struct StatusQuery {
    pub job_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub received_bytes: u64,
    pub declared_size: u64,
    pub processed_messages: u64,
    /// 0 when unknown
    pub total_messages: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum StatusError {
    #[error("Job not found: {0}")]
    NotFound(String),
    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

#[tracing::instrument(skip(state), fields(job_id = %query.job_id))]
pub async fn handle(state: AppState, query: StatusQuery) -> Result<StatusResponse, StatusError> {
    let job = state
        .store
        .load(&query.job_id)
        .await
        .map_err(|e| StatusError::Storage(e.into()))?
        .ok_or_else(|| StatusError::NotFound(query.job_id.clone()))?;

    Ok(StatusResponse {
        job_id: job.id,
        status: job.status,
        received_bytes: job.received_bytes,
        declared_size: job.declared_size,
        processed_messages: job.processed_message_count,
        total_messages: job.total_message_count,
        error: job.error_message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::jobs::{ExportOptions, Job};

    #[tokio::test]
    async fn test_status_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.data_dir = dir.path().join("data");
        config.storage.download_dir = dir.path().join("downloads");
        let state = AppState::init(config).await.unwrap();

        let mut job = Job::new("mail.mbox".to_string(), 100, None, ExportOptions::default());
        job.received_bytes = 40;
        state.store.create(&job).await.unwrap();

        let response = handle(state.clone(), StatusQuery { job_id: job.id.clone() })
            .await
            .unwrap();
        assert_eq!(response.status, JobStatus::Uploading);
        assert_eq!(response.received_bytes, 40);
        assert_eq!(response.declared_size, 100);
        assert!(response.error.is_none());
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.data_dir = dir.path().join("data");
        config.storage.download_dir = dir.path().join("downloads");
        let state = AppState::init(config).await.unwrap();

        let err = handle(state, StatusQuery { job_id: "missing".to_string() })
            .await
            .unwrap_err();
        assert!(matches!(err, StatusError::NotFound(_)));
    }
}
