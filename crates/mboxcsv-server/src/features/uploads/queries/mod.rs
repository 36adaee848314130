pub mod download;
pub mod status;

pub use download::{DownloadError, DownloadQuery};
pub use status::{StatusError, StatusQuery, StatusResponse};
