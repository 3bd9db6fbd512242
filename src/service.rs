use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderMap, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, MethodRouter},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use serde_json::Value;
use tower_http::trace::TraceLayer;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::Settings;
use crate::core::{build_prompt, DatasetSummary, RateLimiter};
use crate::error::ApiError;
use crate::model::{CompletionModel, GeminiClient};
use crate::storage::LazyStore;
use crate::utils::{create_request_span, log_model_event, CompareResult};

/// Identifier shared by every caller without a forwarding header
pub const UNKNOWN_CALLER: &str = "unknown_ip";

/// Header carrying the client address chain
pub const FORWARDED_FOR: &str = "x-forwarded-for";

/// Largest accepted request body, matching the function host's limit
pub const MAX_BODY_BYTES: usize = 100 * 1024 * 1024;

/// Headers attached to every response, errors and preflight included
const RESPONSE_HEADERS: [(HeaderName, &str); 4] = [
    (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
    (header::ACCESS_CONTROL_ALLOW_METHODS, "POST, OPTIONS"),
    (header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type"),
    (header::CONTENT_TYPE, "application/json"),
];

/// Body of a comparison request
#[derive(Debug, Deserialize)]
struct CompareRequest {
    #[serde(default)]
    date1: Option<String>,
    #[serde(default)]
    date2: Option<String>,
    #[serde(default)]
    data1: Vec<Value>,
    #[serde(default)]
    data2: Vec<Value>,
}

/// Shared state of the comparison endpoint
pub struct AppState {
    /// Daily request limiter
    limiter: RateLimiter,
    /// Model client; `None` when no API key is configured
    model: Option<Arc<dyn CompletionModel>>,
    /// Prometheus handle backing `/metrics`
    metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Creates state from explicit collaborators
    pub fn new(limiter: RateLimiter, model: Option<Arc<dyn CompletionModel>>) -> Self {
        Self {
            limiter,
            model,
            metrics: None,
        }
    }

    /// Creates production state from settings
    ///
    /// The counter store is not contacted here; its client is built on the
    /// first rate limit check.
    pub fn from_settings(settings: &Settings) -> CompareResult<Self> {
        let limiter = RateLimiter::new(
            LazyStore::from_config(settings.storage.clone()),
            settings.rate_limit.clone(),
        );

        let model = match settings.model.api_key.as_deref().filter(|key| !key.is_empty()) {
            Some(key) => Some(Arc::new(GeminiClient::new(key, &settings.model)?) as Arc<dyn CompletionModel>),
            None => {
                tracing::warn!("No model API key configured; comparisons will fail with 500");
                None
            }
        };

        Ok(Self::new(limiter, model))
    }

    /// Attach the Prometheus handle rendered by `/metrics`
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

/// Build the HTTP router
///
/// The comparison route is served at `/compare` and, for hosts that add
/// an `/api` prefix, at `/api/compare`.
pub fn router(state: Arc<AppState>) -> Router {
    let compare: MethodRouter<Arc<AppState>> = post(compare_attacks).options(preflight);

    Router::new()
        .route("/compare", compare.clone())
        .route("/api/compare", compare)
        .route("/metrics", get(render_metrics))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Response with the shared CORS and content-type headers
pub(crate) fn cors_response(status: StatusCode, body: String) -> Response {
    (status, RESPONSE_HEADERS, body).into_response()
}

/// CORS preflight: no rate limiting, no body
async fn preflight() -> Response {
    (StatusCode::NO_CONTENT, RESPONSE_HEADERS).into_response()
}

/// `POST /compare`
async fn compare_attacks(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    let caller = caller_ip(&headers);
    let span = create_request_span(&Uuid::new_v4().to_string(), &caller);

    async move {
        tracing::info!("Compare attacks request received");

        match handle_compare(&state, &caller, &body).await {
            Ok(text) => {
                metrics::increment_counter!("compare_requests_total", "outcome" => "ok");
                cors_response(StatusCode::OK, text)
            }
            Err(err) => {
                metrics::increment_counter!("compare_requests_total", "outcome" => err.label());
                err.into_response()
            }
        }
    }
    .instrument(span)
    .await
}

async fn handle_compare(state: &AppState, caller: &str, body: &[u8]) -> Result<String, ApiError> {
    if !state.limiter.check_and_increment(caller).await {
        return Err(ApiError::RateLimited);
    }

    let request: CompareRequest = serde_json::from_slice(body).map_err(|e| {
        tracing::debug!(error = %e, "Rejecting unparsable request body");
        ApiError::InvalidJson
    })?;

    let (date1, date2) = match (non_empty(request.date1), non_empty(request.date2)) {
        (Some(date1), Some(date2)) => (date1, date2),
        _ => return Err(ApiError::DatesRequired),
    };

    let Some(model) = state.model.as_ref() else {
        tracing::error!("Model API key is not configured");
        return Err(ApiError::ServerConfig);
    };

    let first = DatasetSummary::new(&date1, &request.data1);
    let second = DatasetSummary::new(&date2, &request.data2);
    let prompt = build_prompt(&first, &second);

    let reply = model.generate(&prompt).await.map_err(|e| {
        log_model_event("generate_content", false, Some(&e.to_string()));
        ApiError::Model(e.to_string())
    })?;
    log_model_event("generate_content", true, None);

    Ok(strip_code_fences(&reply))
}

async fn render_metrics(State(state): State<Arc<AppState>>) -> Response {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Identify the caller from the first `x-forwarded-for` entry
pub fn caller_ip(headers: &HeaderMap) -> String {
    let forwarded = headers
        .get(FORWARDED_FOR)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");

    if forwarded.is_empty() {
        return UNKNOWN_CALLER.to_string();
    }

    match forwarded.split_once(',') {
        Some((first, _)) => first.trim().to_string(),
        None => forwarded.to_string(),
    }
}

/// Remove markdown code fences around a model reply
pub fn strip_code_fences(text: &str) -> String {
    text.replace("```json", "").replace("```", "").trim().to_string()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
