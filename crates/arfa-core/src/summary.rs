//! Session aggregation and cost estimation.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use crate::entry::{ClassifiedLogEntry, LogEntryType, LogProvider, SessionSummary};

/// Price tier in USD per million tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceTier {
    /// Substring of the model name selecting this tier.
    pub family: &'static str,
    pub input_per_million: f64,
    pub output_per_million: f64,
}

/// Model family price table, checked in order.
pub const PRICE_TIERS: &[PriceTier] = &[
    PriceTier {
        family: "opus",
        input_per_million: 15.0,
        output_per_million: 75.0,
    },
    PriceTier {
        family: "sonnet",
        input_per_million: 3.0,
        output_per_million: 15.0,
    },
    PriceTier {
        family: "haiku",
        input_per_million: 0.25,
        output_per_million: 1.25,
    },
];

/// Tier used when no family matches the model name.
pub const DEFAULT_TIER: PriceTier = PriceTier {
    family: "",
    input_per_million: 3.0,
    output_per_million: 15.0,
};

/// Returns the price tier for a model name.
pub fn price_tier(model: &str) -> PriceTier {
    PRICE_TIERS
        .iter()
        .copied()
        .find(|tier| model.contains(tier.family))
        .unwrap_or(DEFAULT_TIER)
}

/// Estimates the cost in USD of the given token counts.
pub fn estimate_cost(model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
    let tier = price_tier(model);
    let input = input_tokens as f64 / 1_000_000.0 * tier.input_per_million;
    let output = output_tokens as f64 / 1_000_000.0 * tier.output_per_million;
    input + output
}

/// Adds the usage reported by `entry` to the running totals.
///
/// Cumulative counts are combined with `max`, incremental counts with `sum`.
fn add_usage(summary: &mut SessionSummary, entry: &ClassifiedLogEntry, cumulative: bool) {
    if cumulative {
        summary.tokens_input = summary.tokens_input.max(entry.tokens_input);
        summary.tokens_output = summary.tokens_output.max(entry.tokens_output);
    } else {
        summary.tokens_input += entry.tokens_input;
        summary.tokens_output += entry.tokens_output;
    }
}

/// Returns true if `candidate` should replace `current` as the entry naming
/// the session model: more input tokens wins, then the smaller model name,
/// then the smaller provider name.
fn outranks(candidate: &ClassifiedLogEntry, current: &ClassifiedLogEntry) -> bool {
    let rank = |e: &ClassifiedLogEntry| {
        (
            e.tokens_input,
            Reverse(e.model.clone()),
            Reverse(e.provider.as_str()),
        )
    };
    rank(candidate) > rank(current)
}

/// Reduces the entries of one session into a [`SessionSummary`].
///
/// Aggregation does not depend on entry order. Token counts from providers
/// reporting cumulative usage are combined with `max`, others with `sum`.
/// The model is taken from the entry with the most input tokens, ties going
/// to the lexicographically smallest name.
pub fn summarize(session_id: &str, entries: &[ClassifiedLogEntry]) -> SessionSummary {
    let mut summary = SessionSummary {
        session_id: session_id.to_string(),
        ..Default::default()
    };
    let mut model_entry: Option<&ClassifiedLogEntry> = None;
    let mut fallback_provider: Option<LogProvider> = None;

    for entry in entries {
        add_usage(&mut summary, entry, entry.provider.reports_cumulative_usage());

        match entry.entry_type {
            LogEntryType::ToolCall => {
                summary.tool_calls += 1;
                *summary
                    .tools_by_name
                    .entry(entry.tool_name.clone())
                    .or_insert(0) += 1;
            }
            LogEntryType::Error => summary.errors += 1,
            _ => {}
        }

        if !entry.model.is_empty()
            && model_entry.map_or(true, |current| outranks(entry, current))
        {
            model_entry = Some(entry);
        }
        if entry.provider != LogProvider::Unknown
            && fallback_provider.map_or(true, |p| entry.provider.as_str() < p.as_str())
        {
            fallback_provider = Some(entry.provider);
        }

        if let Some(ts) = entry.timestamp {
            if summary.start_time.map_or(true, |start| ts < start) {
                summary.start_time = Some(ts);
            }
            if summary.end_time.map_or(true, |end| ts > end) {
                summary.end_time = Some(ts);
            }
        }
    }

    if let Some(entry) = model_entry {
        summary.model = entry.model.clone();
    }
    summary.provider = match model_entry {
        Some(entry) if entry.provider != LogProvider::Unknown => entry.provider,
        _ => fallback_provider.unwrap_or_default(),
    };

    if let (Some(start), Some(end)) = (summary.start_time, summary.end_time) {
        summary.duration_ms = (end - start).num_milliseconds();
    }

    summary.cost_estimate =
        estimate_cost(&summary.model, summary.tokens_input, summary.tokens_output);

    summary
}

/// Groups entries by session id, preserving their order within each session.
pub fn group_by_session(
    entries: impl IntoIterator<Item = ClassifiedLogEntry>,
) -> BTreeMap<String, Vec<ClassifiedLogEntry>> {
    let mut sessions: BTreeMap<String, Vec<ClassifiedLogEntry>> = BTreeMap::new();
    for entry in entries {
        sessions
            .entry(entry.session_id.clone())
            .or_default()
            .push(entry);
    }
    sessions
}
