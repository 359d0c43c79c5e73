use chrono::{DateTime, Duration, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Commit,
    #[serde(alias = "pr")]
    #[value(name = "pull_request", alias = "pr")]
    PullRequest,
}

impl MetricKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Commit => "commit",
            Self::PullRequest => "pull_request",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How far back a selection window reaches from "now".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Lookback {
    Day,
    Week,
    Month,
}

impl Lookback {
    pub fn duration(self) -> Duration {
        match self {
            Self::Day => Duration::days(1),
            Self::Week => Duration::days(7),
            Self::Month => Duration::days(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub id: String,
    pub repository_id: String,
    pub kind: MetricKind,
    pub value: u64,
    pub timestamp: DateTime<Utc>,
}

/// A metric as produced by ingestion, before the store assigns an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMetric {
    pub repository_id: String,
    pub kind: MetricKind,
    pub value: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricAggregate {
    pub repository_id: String,
    pub kind: MetricKind,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub samples: Vec<MetricRecord>,
}

impl MetricAggregate {
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn total_value(&self) -> u64 {
        self.samples.iter().map(|s| s.value).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// A model response that passed validation but has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsightCandidate {
    pub title: String,
    pub description: String,
    pub recommendation: String,
    pub priority: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Insight {
    pub id: String,
    pub organization_id: String,
    pub title: String,
    pub description: String,
    pub recommendation: String,
    pub priority: u8,
    pub created_at: DateTime<Utc>,
}

impl Insight {
    #[cfg(test)]
    pub fn same_content(&self, other: &Self) -> bool {
        self.organization_id == other.organization_id
            && self.title == other.title
            && self.description == other.description
            && self.recommendation == other.recommendation
            && self.priority == other.priority
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: String,
    pub name: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}
