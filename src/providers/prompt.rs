use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use serde::Serialize;

use crate::models::{MetricAggregate, MetricKind};

#[derive(Debug, Serialize)]
struct KindSummary {
    window_start: String,
    window_end: String,
    records: usize,
    total_value: u64,
}

#[derive(Debug, Serialize)]
struct Sample {
    kind: MetricKind,
    value: u64,
    timestamp: String,
}

fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn summarize(aggregates: &[MetricAggregate]) -> IndexMap<&'static str, KindSummary> {
    aggregates
        .iter()
        .map(|a| {
            (
                a.kind.as_str(),
                KindSummary {
                    window_start: format_ts(a.window_start),
                    window_end: format_ts(a.window_end),
                    records: a.sample_count(),
                    total_value: a.total_value(),
                },
            )
        })
        .collect()
}

fn samples(aggregates: &[MetricAggregate]) -> Vec<Sample> {
    aggregates
        .iter()
        .flat_map(|a| a.samples.iter())
        .map(|s| Sample {
            kind: s.kind,
            value: s.value,
            timestamp: format_ts(s.timestamp),
        })
        .collect()
}

/// Renders the fixed prompt: a header naming the repository, the per-kind
/// summaries keyed in aggregate order, the raw samples when requested, then
/// the instructions and expected response schema.
///
/// Pure: identical aggregates always produce byte-identical prompts.
pub fn render(aggregates: &[MetricAggregate], include_samples: bool) -> String {
    let repository = aggregates
        .first()
        .map_or("unknown", |a| a.repository_id.as_str());

    // Serializing plain strings and integers cannot fail.
    let summary = serde_json::to_string_pretty(&summarize(aggregates)).unwrap_or_default();

    let mut prompt = format!(
        "I have the following activity data about the repository \"{repository}\".\n\n\
         Summary by metric kind:\n{summary}\n"
    );

    if include_samples {
        let samples = serde_json::to_string_pretty(&samples(aggregates)).unwrap_or_default();
        prompt.push_str(&format!("\nRaw samples:\n{samples}\n"));
    }

    prompt.push_str(
        "\nBased on this data, provide:\n\
         1. A brief insight about the repository's activity\n\
         2. One specific recommendation to improve the development workflow\n\
         3. A priority level for this insight (1-5, where 5 is the most urgent)\n\n\
         If there is little or no data, say so in the insight and still answer.\n\n\
         Respond with only a JSON object with exactly these fields: \
         \"title\" (string), \"description\" (string), \
         \"recommendation\" (string), \"priority\" (integer from 1 to 5).\n",
    );

    prompt
}
