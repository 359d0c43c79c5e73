use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{Store, StoreData};
use crate::error::{DevPulseError, Result};
use crate::models::{
    Insight, InsightCandidate, MetricKind, MetricRecord, NewMetric, Organization,
};

/// Store backed by a single JSON document.
///
/// Every insert is written through before it becomes visible: the new record
/// is staged in memory, the whole document is written to a temp file and
/// renamed over the original, and the staged record is dropped again if the
/// write fails.
pub struct JsonFileStore {
    path: PathBuf,
    data: Mutex<StoreData>,
}

impl JsonFileStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let data = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.is_empty() => StoreData::default(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No store at {}, starting empty", path.display());
                StoreData::default()
            }
            Err(e) => {
                return Err(DevPulseError::StoreUnavailable(format!(
                    "failed to read {}: {e}",
                    path.display()
                )))
            }
        };

        debug!(
            "Opened store {} ({} metrics, {} insights)",
            path.display(),
            data.metrics.len(),
            data.insights.len()
        );

        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A copy of every record currently held.
    pub async fn snapshot(&self) -> StoreData {
        self.data.lock().await.clone()
    }

    async fn flush(&self, data: &StoreData) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(data)?;
        write_atomic(&self.path, &bytes).await.map_err(|e| {
            DevPulseError::StoreUnavailable(format!("failed to write {}: {e}", self.path.display()))
        })
    }
}

fn temp_path(final_path: &Path) -> PathBuf {
    let filename = final_path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("store.json");
    final_path.with_file_name(format!(".tmp.{}.{filename}", Uuid::new_v4().simple()))
}

async fn write_atomic(final_path: &Path, content: &[u8]) -> std::io::Result<()> {
    let temp = temp_path(final_path);
    tokio::fs::write(&temp, content).await?;
    if let Err(e) = tokio::fs::rename(&temp, final_path).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(e);
    }
    Ok(())
}

#[async_trait]
impl Store for JsonFileStore {
    async fn query_metrics(
        &self,
        repository_id: &str,
        kind: MetricKind,
        start_inclusive: DateTime<Utc>,
        end_exclusive: DateTime<Utc>,
    ) -> Result<Vec<MetricRecord>> {
        let data = self.data.lock().await;
        Ok(data.query_metrics(repository_id, kind, start_inclusive, end_exclusive))
    }

    async fn insert_metrics(&self, metrics: Vec<NewMetric>) -> Result<Vec<MetricRecord>> {
        let mut data = self.data.lock().await;
        let committed = data.metrics.len();
        let records = data.push_metrics(metrics);
        if let Err(e) = self.flush(&data).await {
            data.metrics.truncate(committed);
            return Err(e);
        }
        debug!("Flushed {} metrics to {}", records.len(), self.path.display());
        Ok(records)
    }

    async fn insert_insight(
        &self,
        organization_id: &str,
        candidate: &InsightCandidate,
    ) -> Result<Insight> {
        let mut data = self.data.lock().await;
        let insight = data.push_insight(organization_id, candidate);
        if let Err(e) = self.flush(&data).await {
            data.insights.pop();
            return Err(e);
        }
        Ok(insight)
    }

    async fn list_insights(&self, organization_id: &str) -> Result<Vec<Insight>> {
        let data = self.data.lock().await;
        Ok(data.list_insights(organization_id))
    }

    async fn create_organization_if_absent(
        &self,
        created_by: &str,
        name: &str,
    ) -> Result<(Organization, bool)> {
        let mut data = self.data.lock().await;
        if let Some(existing) = data.organization_for(created_by) {
            return Ok((existing.clone(), false));
        }

        let organization = data.push_organization(created_by, name);
        if let Err(e) = self.flush(&data).await {
            data.organizations.pop();
            return Err(e);
        }
        Ok((organization, true))
    }
}
