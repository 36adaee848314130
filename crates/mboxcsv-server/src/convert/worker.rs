//! Bounded-concurrency conversion pool
//!
//! One conversion task per finalized job, fire-and-forget from the upload
//! path. The engine reports completion and failure through the job store, not
//! through a return value the submitter sees. Saturation leaves jobs in the
//! queued state until a permit frees up.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tracing::{error, info, warn};

use super::engine;
use crate::jobs::{JobStatus, JobStore};

/// Scheduler for background conversions
#[derive(Clone)]
pub struct ConversionPool {
    store: JobStore,
    output_dir: PathBuf,
    permits: Arc<Semaphore>,
}

impl ConversionPool {
    pub fn new(store: JobStore, output_dir: PathBuf, workers: usize) -> Self {
        Self {
            store,
            output_dir,
            permits: Arc::new(Semaphore::new(workers)),
        }
    }

    /// Submit a finalized job for conversion
    ///
    /// Fire-and-forget: the task acquires a worker permit, runs the engine on
    /// a blocking thread, and writes the outcome back to the job store. The
    /// finalize transition is the only caller, which keeps submission
    /// at-most-once per job; the queued-to-processing transition inside the
    /// task guards against a duplicate ever slipping through.
    pub fn submit(&self, job_id: String) {
        let pool = self.clone();
        tokio::spawn(async move {
            if let Err(e) = pool.run(&job_id).await {
                error!(job_id = %job_id, error = ?e, "Conversion task failed outside the engine");
                pool.record_failure(&job_id, &format!("internal error: {}", e)).await;
            }
        });
    }

    async fn run(&self, job_id: &str) -> anyhow::Result<()> {
        let _permit = self.permits.clone().acquire_owned().await?;

        let mut job = self.store.load_required(job_id).await?;
        if job.status != JobStatus::Queued {
            // A duplicate submission or an already-failed job; never convert
            // the same job twice.
            warn!(job_id = %job_id, status = %job.status, "Skipping conversion for non-queued job");
            return Ok(());
        }

        let input = job
            .input_path
            .clone()
            .ok_or_else(|| anyhow::anyhow!("Queued job has no input path"))?;
        let output = self.output_dir.join(format!("{}-emails.zip", job.id));
        let options = job.options;

        let total = {
            let input = input.clone();
            tokio::task::spawn_blocking(move || engine::count_total_if_cheap(&input)).await?
        };

        job.status = JobStatus::Processing;
        job.processed_message_count = 0;
        job.total_message_count = total;
        self.store.save(&job).await?;
        info!(job_id = %job_id, total_messages = total, "Conversion started");

        // The blocking engine pushes counts through a channel; this side
        // applies them to the store so polling stays responsive.
        let (tx, mut rx) = mpsc::unbounded_channel::<u64>();
        let progress_store = self.store.clone();
        let progress_id = job_id.to_string();
        let progress_task = tokio::spawn(async move {
            while let Some(processed) = rx.recv().await {
                match progress_store.load(&progress_id).await {
                    Ok(Some(mut job)) => {
                        job.processed_message_count = processed;
                        if let Err(e) = progress_store.save(&job).await {
                            warn!(job_id = %progress_id, error = ?e, "Failed to persist progress");
                        }
                    },
                    Ok(None) => break,
                    Err(e) => {
                        warn!(job_id = %progress_id, error = ?e, "Failed to load job for progress");
                    },
                }
            }
        });

        let engine_input = input.clone();
        let engine_output = output.clone();
        let result = tokio::task::spawn_blocking(move || {
            engine::convert(&engine_input, &engine_output, options, total, &mut |n| {
                let _ = tx.send(n);
            })
        })
        .await?;

        // Sender dropped inside the closure; drain the applier before the
        // final save so it cannot clobber the terminal record.
        let _ = progress_task.await;

        let mut job = self.store.load_required(job_id).await?;
        match result {
            Ok(outcome) => {
                job.status = JobStatus::Done;
                job.processed_message_count = outcome.processed;
                job.output_path = Some(output);
                self.store.save(&job).await?;
                info!(job_id = %job_id, processed = outcome.processed, "Conversion finished");
            },
            Err(e) => {
                // Partial output is never exposed
                let _ = tokio::fs::remove_file(&output).await;
                job.status = JobStatus::Error;
                job.error_message = Some(e.to_string());
                self.store.save(&job).await?;
                error!(job_id = %job_id, error = %e, "Conversion failed");
            },
        }

        // The input is removed regardless of outcome
        if let Err(e) = tokio::fs::remove_file(&input).await {
            warn!(job_id = %job_id, error = ?e, "Failed to remove input file");
        }

        Ok(())
    }

    async fn record_failure(&self, job_id: &str, message: &str) {
        if let Ok(Some(mut job)) = self.store.load(job_id).await {
            job.status = JobStatus::Error;
            job.error_message = Some(message.to_string());
            if let Err(e) = self.store.save(&job).await {
                error!(job_id = %job_id, error = ?e, "Failed to record conversion failure");
            }
        }
    }
}
