use crate::services::InvocationResult;
use serde::Serialize;

/// Body returned for every generation attempt that reached the invoker.
#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub status: &'static str,
    pub idea: String,
    pub message: String,
    pub error: String,
    pub return_code: i32,
}

impl GenerateResponse {
    pub fn new(idea: String, result: InvocationResult) -> Self {
        Self {
            status: "success",
            idea,
            message: result.message,
            error: result.error,
            return_code: result.return_code,
        }
    }
}
