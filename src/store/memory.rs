use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{Store, StoreData};
use crate::error::{DevPulseError, Result};
use crate::models::{
    Insight, InsightCandidate, MetricKind, MetricRecord, NewMetric, Organization,
};

/// Process-local store guarded by a single `RwLock`.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    data: RwLock<StoreData>,
}

impl InMemoryStore {
    pub fn from_data(data: StoreData) -> Self {
        Self {
            data: RwLock::new(data),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, StoreData>> {
        self.data
            .read()
            .map_err(|_| DevPulseError::StoreUnavailable("store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, StoreData>> {
        self.data
            .write()
            .map_err(|_| DevPulseError::StoreUnavailable("store lock poisoned".to_string()))
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn query_metrics(
        &self,
        repository_id: &str,
        kind: MetricKind,
        start_inclusive: DateTime<Utc>,
        end_exclusive: DateTime<Utc>,
    ) -> Result<Vec<MetricRecord>> {
        Ok(self
            .read()?
            .query_metrics(repository_id, kind, start_inclusive, end_exclusive))
    }

    async fn insert_metrics(&self, metrics: Vec<NewMetric>) -> Result<Vec<MetricRecord>> {
        Ok(self.write()?.push_metrics(metrics))
    }

    async fn insert_insight(
        &self,
        organization_id: &str,
        candidate: &InsightCandidate,
    ) -> Result<Insight> {
        Ok(self.write()?.push_insight(organization_id, candidate))
    }

    async fn list_insights(&self, organization_id: &str) -> Result<Vec<Insight>> {
        Ok(self.read()?.list_insights(organization_id))
    }

    async fn create_organization_if_absent(
        &self,
        created_by: &str,
        name: &str,
    ) -> Result<(Organization, bool)> {
        let mut data = self.write()?;
        if let Some(existing) = data.organization_for(created_by) {
            return Ok((existing.clone(), false));
        }
        Ok((data.push_organization(created_by, name), true))
    }
}
