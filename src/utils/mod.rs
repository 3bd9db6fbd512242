//! Utility modules for the attack comparison service.
//! This module contains common utilities used across the application.

mod logging;
mod error;

pub use logging::{
    init_logging,
    create_request_span,
    log_rate_limit,
    log_store_failure,
    log_model_event,
};

pub use error::{CompareError, CompareResult};
