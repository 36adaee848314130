//! mboxcsv Server Library
//!
//! HTTP service that converts MBOX email archives to CSV tables packaged in a
//! ZIP container.
//!
//! # Overview
//!
//! - **Upload protocol**: resumable, checksum-verified sequential chunk
//!   uploads plus a legacy single-shot multipart path
//! - **Job store**: one durable JSON record per job, atomic saves
//! - **Conversion engine**: single-pass streaming MBOX → CSV-in-ZIP with
//!   bounded memory, selectable body/thread-id/attachment columns
//! - **Worker pool**: bounded-concurrency background conversions
//!
//! # Architecture
//!
//! Feature slices follow a commands/queries/routes layout: write operations
//! (init upload, append chunk, legacy upload) live under `commands/`, read
//! operations (status, download) under `queries/`, with HTTP mapping confined
//! to each feature's `routes.rs`. The conversion pipeline lives in `convert`
//! and communicates with the rest of the system only through the job store.
//!
//! # Example
//!
//! ```no_run
//! use mboxcsv_server::{config::Config, state::AppState};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let state = AppState::init(config).await?;
//!     let app = mboxcsv_server::router(state);
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:8000").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod convert;
pub mod features;
pub mod jobs;
pub mod middleware;
pub mod state;

// Re-export commonly used types
pub use features::router;
