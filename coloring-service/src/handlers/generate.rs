use crate::dtos::GenerateResponse;
use crate::startup::AppState;
use axum::{
    extract::{RawQuery, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
};
use service_core::error::{json_response, AppError};
use std::any::Any;

pub const MISSING_IDEA_MESSAGE: &str = "Missing 'idea' parameter. Usage: ?idea=dinosaur";

/// `GET /<any path>?idea=...`: run the generation script once and report
/// its outcome. Script failures still answer 200; only a missing idea (400)
/// or a server fault (500) change the status.
pub async fn generate(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> Result<Response, AppError> {
    let Some(idea) = idea_from_query(query.as_deref()) else {
        tracing::warn!(query = ?query, "Rejected request without idea");
        return Err(AppError::BadRequest(MISSING_IDEA_MESSAGE.to_string()));
    };

    let cancel = state.shutdown.child_token();
    let result = state.invoker.invoke(&idea, &cancel).await;

    let body = serde_json::to_vec_pretty(&GenerateResponse::new(idea, result))
        .map_err(anyhow::Error::new)?;

    Ok(json_response(StatusCode::OK, body))
}

/// Answer any method other than GET without touching the invoker.
pub async fn method_not_allowed(method: Method) -> Response {
    tracing::warn!(method = %method, "Rejected non-GET request");
    (
        [(header::ALLOW, "GET")],
        AppError::MethodNotAllowed(format!(
            "Method {} not allowed. Usage: GET ?idea=dinosaur",
            method
        )),
    )
        .into_response()
}

/// First non-blank `idea` value of a form-encoded query string.
pub fn idea_from_query(query: Option<&str>) -> Option<String> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query?).ok()?;

    pairs
        .into_iter()
        .find(|(key, value)| key == "idea" && !value.is_empty())
        .map(|(_, value)| value)
}

/// Turn a handler panic into the usual 500 error envelope.
pub fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "handler panicked".to_string()
    };

    AppError::InternalError(anyhow::anyhow!(detail)).into_response()
}
