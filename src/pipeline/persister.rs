use log::debug;

use crate::error::Result;
use crate::models::{Insight, InsightCandidate};
use crate::store::Store;

/// Appends exactly one insight for the organization. No dedup.
pub async fn persist(
    store: &dyn Store,
    organization_id: &str,
    candidate: &InsightCandidate,
) -> Result<Insight> {
    let insight = store.insert_insight(organization_id, candidate).await?;
    debug!(
        "Persisted insight {} for organization {organization_id}",
        insight.id
    );
    Ok(insight)
}
