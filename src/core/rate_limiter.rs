use chrono::{Local, NaiveDate};

use crate::config::RateLimitConfig;
use crate::storage::{CounterStore, LazyStore, StoreResult};
use crate::utils::{log_rate_limit, log_store_failure};

/// Row key of the counter shared by every caller
pub const GLOBAL_KEY: &str = "GLOBAL";

/// Outcome of a rate limit check that reached the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Both counters were under their ceilings and have been incremented
    Allowed,
    /// The global ceiling would be exceeded; nothing was written
    GlobalLimitExceeded { count: i64 },
    /// The caller's ceiling would be exceeded; the global counter was already spent
    CallerLimitExceeded { count: i64 },
}

impl Decision {
    /// Whether the request may proceed
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }

    fn label(&self) -> &'static str {
        match self {
            Decision::Allowed => "allowed",
            Decision::GlobalLimitExceeded { .. } => "global_limit",
            Decision::CallerLimitExceeded { .. } => "caller_limit",
        }
    }
}

/// Result of bumping one counter
enum Increment {
    Counted,
    Exceeded(i64),
}

/// Daily request limiter backed by the counter table
///
/// Two counters are kept per day: one for all callers and one per caller.
/// Reads and writes are not locked, so concurrent requests can push a
/// counter slightly past its ceiling.
pub struct RateLimiter {
    store: LazyStore,
    config: RateLimitConfig,
}

impl RateLimiter {
    /// Create a new rate limiter over a lazily built store
    pub fn new(store: LazyStore, config: RateLimitConfig) -> Self {
        Self { store, config }
    }

    /// Check and count a request from `caller` against today's counters
    pub async fn check_and_increment(&self, caller: &str) -> bool {
        self.check_and_increment_on(caller, Local::now().date_naive()).await
    }

    /// Check and count a request from `caller` against the counters of `day`
    ///
    /// Returns `true` whenever the store is missing or failing: only a
    /// deliberate limit decision can reject a request.
    pub async fn check_and_increment_on(&self, caller: &str, day: NaiveDate) -> bool {
        let Some(store) = self.store.get() else {
            metrics::increment_counter!("rate_limit_fail_open_total", "reason" => "unconfigured");
            return true;
        };

        match self.evaluate(store.as_ref(), caller, day).await {
            Ok(decision) => {
                metrics::increment_counter!("rate_limit_decisions_total", "decision" => decision.label());
                decision.is_allowed()
            }
            Err(err) => {
                log_store_failure("rate_limit_check", &err);
                metrics::increment_counter!("rate_limit_fail_open_total", "reason" => "store_error");
                true
            }
        }
    }

    /// Run both counter checks and report what happened
    ///
    /// The global counter is checked and written first. A caller that is
    /// then rejected by its own ceiling has still used one global unit.
    pub async fn evaluate(&self, store: &dyn CounterStore, caller: &str, day: NaiveDate) -> StoreResult<Decision> {
        if let Err(err) = store.ensure_table_exists().await {
            tracing::debug!(error = %err, "Ignoring table creation failure");
        }

        let partition = day.format("%Y-%m-%d").to_string();

        if let Increment::Exceeded(count) =
            increment(store, &partition, GLOBAL_KEY, self.config.global_daily_limit, caller).await?
        {
            return Ok(Decision::GlobalLimitExceeded { count });
        }

        let key = sanitize_caller(caller);
        if let Increment::Exceeded(count) =
            increment(store, &partition, &key, self.config.caller_daily_limit, caller).await?
        {
            return Ok(Decision::CallerLimitExceeded { count });
        }

        Ok(Decision::Allowed)
    }
}

/// Read-increment-compare-write on a single counter row
async fn increment(
    store: &dyn CounterStore,
    partition: &str,
    key: &str,
    limit: i64,
    caller: &str,
) -> StoreResult<Increment> {
    let scope = if key == GLOBAL_KEY { "global" } else { "caller" };

    match store.get_row(partition, key).await? {
        None => {
            store.create_row(partition, key, 1).await?;
            log_rate_limit(caller, scope, 1, limit, false);
            Ok(Increment::Counted)
        }
        Some(row) => {
            let count = row.count + 1;
            if count > limit {
                log_rate_limit(caller, scope, count, limit, true);
                return Ok(Increment::Exceeded(count));
            }
            store.update_row(partition, key, count).await?;
            log_rate_limit(caller, scope, count, limit, false);
            Ok(Increment::Counted)
        }
    }
}

/// Make a caller identifier usable as a row key
///
/// Colons (IPv6) are not allowed in keys, so each becomes `_`. Identifiers
/// that differ only in that character share a counter.
pub fn sanitize_caller(caller: &str) -> String {
    caller.replace(':', "_")
}
