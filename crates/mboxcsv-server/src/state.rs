//! Process-wide application state
//!
//! Directories, the job store, and the conversion pool are created once at
//! startup and handed to components through this state handle, so tests can
//! build isolated instances against temporary directories.

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::convert::ConversionPool;
use crate::jobs::JobStore;

/// Shared state for all routes and background tasks
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: JobStore,
    pub pool: ConversionPool,
}

impl AppState {
    /// Create directories, open the job store, and size the worker pool
    pub async fn init(config: Config) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(config.storage.uploads_dir()).await?;
        tokio::fs::create_dir_all(&config.storage.download_dir).await?;

        let store = JobStore::open(config.storage.jobs_dir()).await?;
        let pool = ConversionPool::new(
            store.clone(),
            config.storage.download_dir.clone(),
            config.convert.workers,
        );

        Ok(Self {
            config: Arc::new(config),
            store,
            pool,
        })
    }

    /// In-flight upload file for a job
    pub fn part_path(&self, job_id: &str) -> PathBuf {
        self.config
            .storage
            .uploads_dir()
            .join(format!("{}.mbox.part", job_id))
    }

    /// Finalized upload file for a job
    pub fn input_path(&self, job_id: &str) -> PathBuf {
        self.config
            .storage
            .uploads_dir()
            .join(format!("{}.mbox", job_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_init_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.data_dir = dir.path().join("data");
        config.storage.download_dir = dir.path().join("downloads");

        let state = AppState::init(config).await.unwrap();
        assert!(state.config.storage.uploads_dir().is_dir());
        assert!(state.config.storage.jobs_dir().is_dir());
        assert!(state.config.storage.download_dir.is_dir());
    }

    #[tokio::test]
    async fn test_paths_are_distinct_per_job() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.data_dir = dir.path().join("data");
        config.storage.download_dir = dir.path().join("downloads");

        let state = AppState::init(config).await.unwrap();
        assert_ne!(state.part_path("a"), state.part_path("b"));
        assert_ne!(state.part_path("a"), state.input_path("a"));
    }
}
