use std::env;
use tracing::Level;
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

/// Initialize the logging system with the level from `RUST_LOG`
///
/// Safe to call more than once; only the first call installs a subscriber.
pub fn init_logging() {
    // Get the log level from environment variable or default to INFO
    let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_level(true)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// Create a new span for tracking request context
pub fn create_request_span(request_id: &str, caller: &str) -> tracing::Span {
    tracing::info_span!(
        "request",
        request_id = %request_id,
        caller = %caller,
        timestamp = %chrono::Utc::now()
    )
}

/// Log a rate limit decision
pub fn log_rate_limit(caller: &str, scope: &str, count: i64, limit: i64, exceeded: bool) {
    if exceeded {
        tracing::warn!(
            caller = %caller,
            scope = %scope,
            count = count,
            limit = limit,
            event = "rate_limit_exceeded"
        );
    } else {
        tracing::debug!(
            caller = %caller,
            scope = %scope,
            count = count,
            limit = limit,
            event = "rate_limit_check"
        );
    }
}

/// Log a counter store failure that the rate limiter is about to ignore
pub fn log_store_failure(operation: &str, error: &dyn std::error::Error) {
    tracing::error!(
        operation = %operation,
        error = %error,
        event = "rate_limit_store_failure"
    );
}

/// Log a language model API event
pub fn log_model_event(event_type: &str, success: bool, details: Option<&str>) {
    if success {
        tracing::event!(Level::INFO, event_type = %event_type, success = %success, details = ?details);
    } else {
        tracing::event!(Level::ERROR, event_type = %event_type, success = %success, details = ?details);
    }
}
