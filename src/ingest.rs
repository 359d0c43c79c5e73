use std::path::Path;

use log::info;

use crate::error::Result;
use crate::models::{MetricRecord, NewMetric};
use crate::store::Store;

/// Reads a JSON array of metrics (`repository_id`, `kind`, `value`, `timestamp`).
pub async fn load_file(path: &Path) -> Result<Vec<NewMetric>> {
    let bytes = tokio::fs::read(path).await?;
    let metrics: Vec<NewMetric> = serde_json::from_slice(&bytes)?;
    info!("Loaded {} metrics from {}", metrics.len(), path.display());
    Ok(metrics)
}

/// Stores the whole file as one batch; a failure leaves the store untouched.
pub async fn insert_all(store: &dyn Store, metrics: Vec<NewMetric>) -> Result<Vec<MetricRecord>> {
    let records = store.insert_metrics(metrics).await?;
    info!("Inserted {} metrics", records.len());
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DevPulseError;
    use crate::models::MetricKind;
    use crate::store::file::JsonFileStore;
    use crate::store::memory::InMemoryStore;
    use chrono::{Duration, TimeZone, Utc};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_file_parses_kinds_and_legacy_alias() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("metrics.json");
        std::fs::write(
            &path,
            r#"[
                {"repository_id":"acme/api","kind":"commit","value":3,"timestamp":"2024-06-01T10:00:00Z"},
                {"repository_id":"acme/api","kind":"pr","value":1,"timestamp":"2024-06-01T11:00:00Z"}
            ]"#,
        )
        .unwrap();

        let metrics = load_file(&path).await.unwrap();

        assert_eq!(metrics.len(), 2);
        assert_eq!(metrics[0].kind, MetricKind::Commit);
        assert_eq!(metrics[1].kind, MetricKind::PullRequest);
        assert_eq!(
            metrics[1].timestamp,
            Utc.with_ymd_and_hms(2024, 6, 1, 11, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn test_load_file_rejects_negative_values() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("metrics.json");
        std::fs::write(
            &path,
            r#"[{"repository_id":"r","kind":"commit","value":-1,"timestamp":"2024-06-01T10:00:00Z"}]"#,
        )
        .unwrap();

        let result = load_file(&path).await;

        assert!(matches!(result, Err(DevPulseError::Json(_))));
    }

    #[tokio::test]
    async fn test_insert_all_stores_every_metric() {
        let store = InMemoryStore::default();
        let base = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let metrics: Vec<NewMetric> = (0..25)
            .map(|i| NewMetric {
                repository_id: "acme/api".to_string(),
                kind: MetricKind::Commit,
                value: i,
                timestamp: base + Duration::minutes(i as i64),
            })
            .collect();

        let records = insert_all(&store, metrics).await.unwrap();

        assert_eq!(records.len(), 25);
        let stored = store
            .query_metrics("acme/api", MetricKind::Commit, base, base + Duration::days(1))
            .await
            .unwrap();
        assert_eq!(stored.len(), 25);
    }

    #[tokio::test]
    async fn test_insert_all_failure_commits_nothing() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("data");
        std::fs::create_dir(&dir).unwrap();
        let store = JsonFileStore::open(dir.join("store.json")).await.unwrap();
        std::fs::remove_dir_all(&dir).unwrap();
        let base = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let metrics: Vec<NewMetric> = (0..5)
            .map(|i| NewMetric {
                repository_id: "acme/api".to_string(),
                kind: MetricKind::PullRequest,
                value: i,
                timestamp: base,
            })
            .collect();

        let err = insert_all(&store, metrics).await.unwrap_err();

        assert!(matches!(err, DevPulseError::StoreUnavailable(_)));
        assert!(store.snapshot().await.metrics.is_empty());
    }
}
