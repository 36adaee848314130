//! API response types
//!
//! Standard JSON envelopes shared by every feature route.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Standard success response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    /// Create a new success response
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Standard error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    /// Create a new error response
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_envelope() {
        let resp = ApiResponse::success(serde_json::json!({"job_id": "abc"}));
        let encoded = serde_json::to_value(&resp).unwrap();
        assert_eq!(encoded["success"], true);
        assert_eq!(encoded["data"]["job_id"], "abc");
    }

    #[test]
    fn test_error_envelope() {
        let resp = ErrorResponse::new("NOT_FOUND", "Job not found");
        let encoded = serde_json::to_value(&resp).unwrap();
        assert_eq!(encoded["success"], false);
        assert_eq!(encoded["error"]["code"], "NOT_FOUND");
    }
}
