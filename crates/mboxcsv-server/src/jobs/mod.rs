//! Job domain model
//!
//! A [`Job`] is the unit of work and the only persisted entity: one
//! upload-and-convert request, tracked from the first chunk through download
//! and cleanup.

pub mod store;

pub use store::JobStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Transport and processing lifecycle of a job
///
/// `Uploading → Queued → Processing → {Done | Error} → Downloaded`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Uploading,
    Queued,
    Processing,
    Done,
    Error,
    Downloaded,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Uploading => "uploading",
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
            JobStatus::Downloaded => "downloaded",
        };
        write!(f, "{}", s)
    }
}

/// Export column selection, fixed at job creation
///
/// Every stage of conversion reads the same flags; they are never mutated
/// after the init call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportOptions {
    /// Add a plain-text body column to the primary table
    #[serde(default)]
    pub include_body: bool,
    /// Add a thread/conversation id column to the primary table
    #[serde(default)]
    pub include_thread_id: bool,
    /// Emit the secondary attachments table
    #[serde(default)]
    pub include_attachments: bool,
}

impl ExportOptions {
    /// True when header-only parsing suffices for the selected columns
    pub fn headers_only(&self) -> bool {
        !self.include_body && !self.include_attachments
    }
}

/// One upload-and-convert request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    pub filename: String,
    /// Client-asserted total size in bytes
    pub declared_size: u64,
    /// Bytes accepted so far; never exceeds `declared_size`
    pub received_bytes: u64,
    /// The only chunk index the protocol will accept next
    pub next_chunk_index: u64,
    pub expected_chunk_count: u64,
    /// Optional whole-file sha256 asserted at init, verified on finalize
    pub client_checksum: Option<String>,
    pub options: ExportOptions,
    pub processed_message_count: u64,
    /// Best effort; 0 when unknown
    pub total_message_count: u64,
    pub input_path: Option<PathBuf>,
    pub output_path: Option<PathBuf>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// Create a fresh job in the uploading state
    pub fn new(filename: String, declared_size: u64, client_checksum: Option<String>, options: ExportOptions) -> Self {
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            status: JobStatus::Uploading,
            filename,
            declared_size,
            received_bytes: 0,
            next_chunk_index: 0,
            expected_chunk_count: 0,
            client_checksum,
            options,
            processed_message_count: 0,
            total_message_count: 0,
            input_path: None,
            output_path: None,
            error_message: None,
            created_at: Utc::now(),
        }
    }
}
