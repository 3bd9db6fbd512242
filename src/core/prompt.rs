use serde_json::Value;

use super::stats::{summarize, AttackStats};

/// Records per dataset included verbatim in the prompt
pub const SAMPLE_LIMIT: usize = 20;

/// One side of the comparison
#[derive(Debug, Clone, Copy)]
pub struct DatasetSummary<'a> {
    /// Day the records were collected
    pub date: &'a str,
    /// Totals over all records
    pub stats: AttackStats,
    /// Records in input order; only the first [`SAMPLE_LIMIT`] are used
    pub records: &'a [Value],
}

impl<'a> DatasetSummary<'a> {
    /// Summarize `records` collected on `date`
    pub fn new(date: &'a str, records: &'a [Value]) -> Self {
        Self {
            date,
            stats: summarize(records),
            records,
        }
    }

    /// Leading records sent to the model
    pub fn samples(&self) -> &'a [Value] {
        &self.records[..self.records.len().min(SAMPLE_LIMIT)]
    }

    fn render(&self, position: usize) -> String {
        let samples = serde_json::to_string_pretty(self.samples()).unwrap_or_else(|_| "[]".to_string());
        format!(
            "**Date {position}: {date}**\n\
             - Total Attack Events: {total}\n\
             - Unique Attacking IPs: {unique}\n\
             - Top 20 Attackers (IP, Country, Attack Count):\n\
             {samples}",
            position = position,
            date = self.date,
            total = self.stats.total_events,
            unique = self.stats.record_count,
            samples = samples,
        )
    }
}

const PREAMBLE: &str = "You are a cybersecurity analyst reviewing RDP honeypot attack data.\n\n\
Compare attacks between two dates and provide insights.";

const INSTRUCTIONS: &str = r#"Analyze this data and respond with a JSON object containing these STRING fields (not nested objects):
{
    "summary": "One sentence overview of the trend between the two dates.",
    "attack_volume": "Analysis of count changes - was it higher or lower? By how much?",
    "geographic_shifts": "Which countries appeared or disappeared between dates? Any new attack sources?",
    "notable_ips": "Any IPs with unusually high attack counts worth blocking?",
    "target_behavior": "Any patterns in the targeting behavior?"
}

IMPORTANT: All values must be plain text strings, not nested objects."#;

/// Render the comparison instruction for the model
pub fn build_prompt(first: &DatasetSummary<'_>, second: &DatasetSummary<'_>) -> String {
    format!(
        "{}\n\n{}\n\n{}\n\n{}",
        PREAMBLE,
        first.render(1),
        second.render(2),
        INSTRUCTIONS
    )
}
