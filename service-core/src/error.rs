use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    MethodNotAllowed(String),

    #[error("Server error: {0}")]
    InternalError(#[from] anyhow::Error),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(anyhow::Error::new(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}

/// Body of every non-success response: `{status, message, code}`.
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub status: &'static str,
    pub message: String,
    pub code: u16,
}

impl ErrorEnvelope {
    pub fn new(message: impl Into<String>, code: StatusCode) -> Self {
        Self {
            status: "error",
            message: message.into(),
            code: code.as_u16(),
        }
    }

    /// Render as a pretty-printed JSON response with the given status.
    pub fn into_response_with(self, code: StatusCode) -> Response {
        match serde_json::to_vec_pretty(&self) {
            Ok(body) => json_response(code, body),
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize error envelope");
                (code, self.message).into_response()
            }
        }
    }
}

/// Build a response whose body is already-encoded JSON.
pub fn json_response(status: StatusCode, body: Vec<u8>) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response()
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            AppError::InternalError(_) | AppError::ConfigError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let message = match &self {
            AppError::BadRequest(msg) | AppError::MethodNotAllowed(msg) => msg.clone(),
            AppError::InternalError(err) | AppError::ConfigError(err) => {
                tracing::error!(error = ?err, "Request failed with server error");
                format!("Server error: {}", err)
            }
        };

        ErrorEnvelope::new(message, status).into_response_with(status)
    }
}
