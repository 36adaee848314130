pub mod append_chunk;
pub mod init;
pub mod legacy_upload;

pub use append_chunk::{AppendChunkCommand, AppendChunkError, AppendChunkResponse};
pub use init::{InitUploadCommand, InitUploadError, InitUploadResponse};
pub use legacy_upload::{LegacyUploadCommand, LegacyUploadError, LegacyUploadResponse};
