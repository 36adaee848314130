//! Streaming MBOX to CSV conversion
//!
//! - [`mbox`]: sequential reader over `From `-separated archives
//! - [`headers`]: flattening of structured header values to CSV cell text
//! - [`engine`]: the single-pass transform into a ZIP of CSV tables
//! - [`worker`]: bounded-concurrency pool running one conversion per job

pub mod engine;
pub mod headers;
pub mod mbox;
pub mod worker;

pub use worker::ConversionPool;
