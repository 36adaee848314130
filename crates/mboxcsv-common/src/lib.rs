//! mboxcsv Common Library
//!
//! Shared error handling, checksum utilities, and logging bootstrap for the
//! mboxcsv workspace.
//!
//! # Example
//!
//! ```no_run
//! use mboxcsv_common::{checksum, Result};
//!
//! fn digest_file(path: &str) -> Result<()> {
//!     let digest = checksum::compute_file_sha256(path)?;
//!     println!("sha256: {}", digest);
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod checksum;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{CoreError, Result};
