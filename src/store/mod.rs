pub mod file;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    Insight, InsightCandidate, MetricKind, MetricRecord, NewMetric, Organization,
};

/// Keyed record store the pipeline reads metrics from and appends insights to.
///
/// Backends: [`memory::InMemoryStore`] in process memory, and
/// [`file::JsonFileStore`] mirroring the records into a JSON document.
#[async_trait]
pub trait Store: Send + Sync {
    /// Metrics for one repository and kind with `start <= timestamp < end`,
    /// ordered by timestamp then id.
    async fn query_metrics(
        &self,
        repository_id: &str,
        kind: MetricKind,
        start_inclusive: DateTime<Utc>,
        end_exclusive: DateTime<Utc>,
    ) -> Result<Vec<MetricRecord>>;

    /// Inserts a batch as one unit: either every metric is stored or none is.
    async fn insert_metrics(&self, metrics: Vec<NewMetric>) -> Result<Vec<MetricRecord>>;

    /// Appends one insight. Never deduplicates.
    async fn insert_insight(
        &self,
        organization_id: &str,
        candidate: &InsightCandidate,
    ) -> Result<Insight>;

    /// Insights for an organization, newest first.
    async fn list_insights(&self, organization_id: &str) -> Result<Vec<Insight>>;

    /// Atomically returns the organization created by `created_by`, creating
    /// it with `name` if none exists. The flag is true when it was created.
    async fn create_organization_if_absent(
        &self,
        created_by: &str,
        name: &str,
    ) -> Result<(Organization, bool)>;
}

/// The full record set shared by both backends.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct StoreData {
    #[serde(default)]
    pub organizations: Vec<Organization>,
    #[serde(default)]
    pub metrics: Vec<MetricRecord>,
    #[serde(default)]
    pub insights: Vec<Insight>,
}

impl StoreData {
    fn query_metrics(
        &self,
        repository_id: &str,
        kind: MetricKind,
        start_inclusive: DateTime<Utc>,
        end_exclusive: DateTime<Utc>,
    ) -> Vec<MetricRecord> {
        let mut records: Vec<MetricRecord> = self
            .metrics
            .iter()
            .filter(|m| m.repository_id == repository_id && m.kind == kind)
            .filter(|m| m.timestamp >= start_inclusive && m.timestamp < end_exclusive)
            .cloned()
            .collect();

        records.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        records
    }

    fn push_metric(&mut self, metric: NewMetric) -> MetricRecord {
        let record = MetricRecord {
            id: Uuid::new_v4().to_string(),
            repository_id: metric.repository_id,
            kind: metric.kind,
            value: metric.value,
            timestamp: metric.timestamp.trunc_subsecs(0),
        };
        self.metrics.push(record.clone());
        record
    }

    fn push_metrics(&mut self, metrics: Vec<NewMetric>) -> Vec<MetricRecord> {
        metrics.into_iter().map(|m| self.push_metric(m)).collect()
    }

    fn push_insight(&mut self, organization_id: &str, candidate: &InsightCandidate) -> Insight {
        let insight = Insight {
            id: Uuid::new_v4().to_string(),
            organization_id: organization_id.to_string(),
            title: candidate.title.clone(),
            description: candidate.description.clone(),
            recommendation: candidate.recommendation.clone(),
            priority: candidate.priority,
            created_at: Utc::now(),
        };
        self.insights.push(insight.clone());
        insight
    }

    fn list_insights(&self, organization_id: &str) -> Vec<Insight> {
        // Reverse first so equal timestamps still come out newest-inserted first.
        let mut insights: Vec<Insight> = self
            .insights
            .iter()
            .rev()
            .filter(|i| i.organization_id == organization_id)
            .cloned()
            .collect();

        insights.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        insights
    }

    fn organization_for(&self, created_by: &str) -> Option<&Organization> {
        self.organizations.iter().find(|o| o.created_by == created_by)
    }

    fn push_organization(&mut self, created_by: &str, name: &str) -> Organization {
        let organization = Organization {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            created_by: created_by.to_string(),
            created_at: Utc::now(),
        };
        self.organizations.push(organization.clone());
        organization
    }
}
