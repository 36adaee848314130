//! Durable job record store
//!
//! One JSON document per job id under the jobs directory. Saves go through a
//! temp file followed by a rename, so a concurrent reader observes either the
//! prior record or the fully updated one, never a torn write. The upload
//! protocol guarantees a single writer per job at a time, so no further
//! locking is required.

use crate::jobs::Job;
use mboxcsv_common::{CoreError, Result};
use std::path::{Path, PathBuf};

/// Filesystem-backed store mapping job id to job record
#[derive(Debug, Clone)]
pub struct JobStore {
    dir: PathBuf,
}

impl JobStore {
    /// Open a store rooted at `dir`, creating the directory if needed
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    /// Persist a newly created job record
    pub async fn create(&self, job: &Job) -> Result<()> {
        self.save(job).await
    }

    /// Load a job record, or `None` when the id is unknown
    pub async fn load(&self, id: &str) -> Result<Option<Job>> {
        match tokio::fs::read(self.record_path(id)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Load a job record, failing when the id is unknown
    pub async fn load_required(&self, id: &str) -> Result<Job> {
        self.load(id)
            .await?
            .ok_or_else(|| CoreError::JobNotFound(id.to_string()))
    }

    /// Idempotent full overwrite of a job record
    ///
    /// Written to `<id>.json.tmp` first and renamed into place so readers
    /// never see a partial record.
    pub async fn save(&self, job: &Job) -> Result<()> {
        let final_path = self.record_path(&job.id);
        let tmp_path = self.dir.join(format!("{}.json.tmp", job.id));

        let bytes = serde_json::to_vec_pretty(job)?;
        tokio::fs::write(&tmp_path, &bytes).await?;
        tokio::fs::rename(&tmp_path, &final_path).await?;

        Ok(())
    }

    /// Remove a job record; missing records are not an error
    pub async fn delete(&self, id: &str) -> Result<()> {
        match tokio::fs::remove_file(self.record_path(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
