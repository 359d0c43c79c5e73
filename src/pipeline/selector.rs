use chrono::{DateTime, Utc};
use log::{debug, warn};

use crate::error::Result;
use crate::models::{Lookback, MetricKind, MetricRecord};
use crate::store::Store;

/// The `[start, end)` bounds of a lookback window ending at `now`.
pub fn window(lookback: Lookback, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    (now - lookback.duration(), now)
}

/// Selects the window ending at the moment of the call.
pub async fn select(
    store: &dyn Store,
    repository_id: &str,
    kind: MetricKind,
    lookback: Lookback,
) -> Result<(DateTime<Utc>, DateTime<Utc>, Vec<MetricRecord>)> {
    select_at(store, repository_id, kind, lookback, Utc::now()).await
}

pub async fn select_at(
    store: &dyn Store,
    repository_id: &str,
    kind: MetricKind,
    lookback: Lookback,
    now: DateTime<Utc>,
) -> Result<(DateTime<Utc>, DateTime<Utc>, Vec<MetricRecord>)> {
    let (start, end) = window(lookback, now);

    let fetched = store.query_metrics(repository_id, kind, start, end).await?;
    let fetched_count = fetched.len();

    // Stores are external; drop anything outside the requested slice.
    let mut records: Vec<MetricRecord> = fetched
        .into_iter()
        .filter(|r| r.repository_id == repository_id && r.kind == kind)
        .filter(|r| r.timestamp >= start && r.timestamp < end)
        .collect();

    if records.len() != fetched_count {
        warn!(
            "Store returned {} records outside {repository_id}/{kind} [{start}, {end})",
            fetched_count - records.len()
        );
    }

    records.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));

    debug!(
        "Selected {} {kind} records for {repository_id} in [{start}, {end})",
        records.len()
    );

    Ok((start, end, records))
}
