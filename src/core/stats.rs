use serde_json::Value;

/// Field holding the per-record attack count
pub const PRIMARY_COUNT_FIELD: &str = "attack_count";

/// Field consulted when the primary one is absent
pub const FALLBACK_COUNT_FIELD: &str = "FailureCount";

/// Totals for one dataset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttackStats {
    /// Sum of the per-record attack counts
    pub total_events: i64,
    /// Number of records, e.g. distinct attacking IPs
    pub record_count: usize,
}

/// Reduce a list of attack records to totals
pub fn summarize(records: &[Value]) -> AttackStats {
    AttackStats {
        total_events: records
            .iter()
            .map(record_count)
            .fold(0, i64::saturating_add),
        record_count: records.len(),
    }
}

/// Attack count of one record, 0 when missing or not an integer
///
/// A present primary field wins even if its value is unusable.
pub fn record_count(record: &Value) -> i64 {
    let Some(fields) = record.as_object() else {
        return 0;
    };

    fields
        .get(PRIMARY_COUNT_FIELD)
        .or_else(|| fields.get(FALLBACK_COUNT_FIELD))
        .map(coerce_count)
        .unwrap_or(0)
}

fn coerce_count(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        Value::Bool(b) => i64::from(*b),
        _ => 0,
    }
}
