//! Structured failure body and the uniform reply envelope.

use crate::error::AppError;
use serde::Serialize;
use serde_json::Value;

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

impl From<&AppError> for ErrorBody {
    fn from(e: &AppError) -> Self {
        ErrorBody {
            error: ErrorDetail {
                code: e.code().to_string(),
                message: e.to_string(),
            },
        }
    }
}

/// `{"error": {"code", "message"}}` for one failed call.
pub fn failure(e: &AppError) -> Value {
    serde_json::json!(ErrorBody::from(e))
}

/// Successful results pass through; errors become a failure body.
pub fn reply(result: Result<Value, AppError>) -> Value {
    match result {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(code = e.code(), error = %e, "process failed");
            failure(&e)
        }
    }
}
