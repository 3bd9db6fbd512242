//! Core functionality for the attack comparison service.
//! This module contains the daily rate limiter, dataset statistics
//! and prompt rendering.

mod rate_limiter;
mod stats;
mod prompt;

pub use rate_limiter::{RateLimiter, Decision, GLOBAL_KEY, sanitize_caller};
pub use stats::{AttackStats, summarize, record_count, PRIMARY_COUNT_FIELD, FALLBACK_COUNT_FIELD};
pub use prompt::{DatasetSummary, build_prompt, SAMPLE_LIMIT};
