//! Upload feature slice
//!
//! Owns the chunked-transfer protocol and the job lifecycle it drives:
//! `uploading → queued → processing → {done | error} → downloaded`.

pub mod commands;
pub mod queries;
pub mod routes;

pub use routes::uploads_routes;
