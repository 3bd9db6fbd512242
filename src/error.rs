use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::service::cors_response;

/// Represents the failures a comparison request can end in
#[derive(Debug)]
pub enum ApiError {
    /// Daily global or per-caller limit reached
    RateLimited,
    /// Request body is not a JSON object of the expected shape
    InvalidJson,
    /// One of the two dates is missing or empty
    DatesRequired,
    /// The model credential is not configured
    ServerConfig,
    /// The model call failed
    Model(String),
}

impl ApiError {
    /// HTTP status for this error
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::InvalidJson | ApiError::DatesRequired => StatusCode::BAD_REQUEST,
            ApiError::ServerConfig | ApiError::Model(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label used for the request outcome metric
    pub fn label(&self) -> &'static str {
        match self {
            ApiError::RateLimited => "rate_limited",
            ApiError::InvalidJson => "invalid_json",
            ApiError::DatesRequired => "dates_required",
            ApiError::ServerConfig => "server_config",
            ApiError::Model(_) => "model_error",
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::RateLimited => write!(f, "Rate limit exceeded."),
            ApiError::InvalidJson => write!(f, "Invalid JSON"),
            ApiError::DatesRequired => write!(f, "Dates required"),
            ApiError::ServerConfig => write!(f, "Server Config Error"),
            ApiError::Model(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

/// Renders as `{"error": "<message>"}` with the CORS headers
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({ "error": self.to_string() }).to_string();
        cors_response(self.status(), body)
    }
}
