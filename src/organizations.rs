use log::{info, warn};
use serde::Serialize;

use crate::error::Result;
use crate::models::Organization;
use crate::store::Store;

pub const DEFAULT_ORGANIZATION_NAME: &str = "My Organization";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BootstrapState {
    Unprovisioned,
    Provisioning,
    Ready { organization: Organization },
}

/// Provisioning of a user's default organization.
///
/// The only side effect is the store's atomic create-if-absent, so repeated
/// or concurrent bootstraps for the same user converge on one organization.
#[derive(Debug)]
pub struct OrganizationBootstrap {
    created_by: String,
    state: BootstrapState,
}

impl OrganizationBootstrap {
    pub fn new(created_by: impl Into<String>) -> Self {
        Self {
            created_by: created_by.into(),
            state: BootstrapState::Unprovisioned,
        }
    }

    pub fn state(&self) -> &BootstrapState {
        &self.state
    }

    pub async fn ensure(&mut self, store: &dyn Store) -> Result<Organization> {
        if let BootstrapState::Ready { organization } = &self.state {
            return Ok(organization.clone());
        }

        self.state = BootstrapState::Provisioning;
        match store
            .create_organization_if_absent(&self.created_by, DEFAULT_ORGANIZATION_NAME)
            .await
        {
            Ok((organization, created)) => {
                if created {
                    info!(
                        "Created organization {} for user {}",
                        organization.id, self.created_by
                    );
                } else {
                    info!(
                        "User {} already has organization {}",
                        self.created_by, organization.id
                    );
                }
                self.state = BootstrapState::Ready {
                    organization: organization.clone(),
                };
                Ok(organization)
            }
            Err(e) => {
                warn!("Failed to provision organization for {}: {e}", self.created_by);
                self.state = BootstrapState::Unprovisioned;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DevPulseError;
    use crate::models::{Insight, InsightCandidate, MetricKind, MetricRecord, NewMetric};
    use crate::store::memory::InMemoryStore;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_bootstrap_reaches_ready() {
        let store = InMemoryStore::default();
        let mut bootstrap = OrganizationBootstrap::new("user-1");
        assert_eq!(bootstrap.state(), &BootstrapState::Unprovisioned);

        let organization = bootstrap.ensure(&store).await.unwrap();

        assert_eq!(organization.name, DEFAULT_ORGANIZATION_NAME);
        assert_eq!(organization.created_by, "user-1");
        assert_eq!(
            bootstrap.state(),
            &BootstrapState::Ready {
                organization: organization.clone()
            }
        );
    }

    #[tokio::test]
    async fn test_separate_bootstraps_converge_on_one_organization() {
        let store = InMemoryStore::default();

        let first = OrganizationBootstrap::new("user-1").ensure(&store).await.unwrap();
        let second = OrganizationBootstrap::new("user-1").ensure(&store).await.unwrap();
        let other = OrganizationBootstrap::new("user-2").ensure(&store).await.unwrap();

        assert_eq!(first, second);
        assert_ne!(first.id, other.id);
    }

    struct CountingStore {
        inner: InMemoryStore,
        creates: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Store for CountingStore {
        async fn query_metrics(
            &self,
            repository_id: &str,
            kind: MetricKind,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> Result<Vec<MetricRecord>> {
            self.inner.query_metrics(repository_id, kind, start, end).await
        }

        async fn insert_metrics(&self, metrics: Vec<NewMetric>) -> Result<Vec<MetricRecord>> {
            self.inner.insert_metrics(metrics).await
        }

        async fn insert_insight(
            &self,
            organization_id: &str,
            candidate: &InsightCandidate,
        ) -> Result<Insight> {
            self.inner.insert_insight(organization_id, candidate).await
        }

        async fn list_insights(&self, organization_id: &str) -> Result<Vec<Insight>> {
            self.inner.list_insights(organization_id).await
        }

        async fn create_organization_if_absent(
            &self,
            created_by: &str,
            name: &str,
        ) -> Result<(Organization, bool)> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(DevPulseError::StoreUnavailable("insert failed".into()));
            }
            self.inner.create_organization_if_absent(created_by, name).await
        }
    }

    #[tokio::test]
    async fn test_ready_bootstrap_does_not_touch_store_again() {
        let store = CountingStore {
            inner: InMemoryStore::default(),
            creates: AtomicUsize::new(0),
            fail: false,
        };
        let mut bootstrap = OrganizationBootstrap::new("user-1");

        let first = bootstrap.ensure(&store).await.unwrap();
        let second = bootstrap.ensure(&store).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(store.creates.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_create_returns_to_unprovisioned() {
        let store = CountingStore {
            inner: InMemoryStore::default(),
            creates: AtomicUsize::new(0),
            fail: true,
        };
        let mut bootstrap = OrganizationBootstrap::new("user-1");

        let err = bootstrap.ensure(&store).await.unwrap_err();

        assert!(matches!(err, DevPulseError::StoreUnavailable(_)));
        assert_eq!(bootstrap.state(), &BootstrapState::Unprovisioned);
    }
}
