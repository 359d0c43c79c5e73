pub mod aggregate;
pub mod persister;
pub mod selector;
pub mod validator;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use futures::future::try_join_all;
use indexmap::IndexMap;
use log::{debug, error, info, warn};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::{DevPulseError, PipelineFailure, Stage};
use crate::models::{Insight, Lookback, MetricAggregate, MetricKind};
use crate::providers::InsightModel;
use crate::store::Store;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Retries after the first model call; transient failures only.
    pub max_retries: u32,
    /// Delay before the first retry, doubled for each further one.
    pub initial_backoff: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff: Duration::from_secs(1),
        }
    }
}

impl PipelineConfig {
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_backoff.saturating_mul(1 << exponent)
    }
}

/// Lifecycle of one run: `Selecting → Aggregating → Invoking → Validating →
/// Persisting → Completed`, or `Failed` at whichever stage broke. Only
/// `Invoking` is re-entered, and only for transient model failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Selecting,
    Aggregating,
    Invoking,
    Validating,
    Persisting,
    Completed,
    Failed(Stage),
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed(_))
    }

    pub fn can_advance_to(self, next: Self) -> bool {
        match (self, next) {
            (from, _) if from.is_terminal() => false,
            (_, Self::Failed(_)) => true,
            (Self::Selecting, Self::Aggregating)
            | (Self::Aggregating, Self::Invoking)
            | (Self::Invoking, Self::Invoking)
            | (Self::Invoking, Self::Validating)
            | (Self::Validating, Self::Persisting)
            | (Self::Persisting, Self::Completed) => true,
            _ => false,
        }
    }
}

/// Structured record of one run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRun {
    pub repository_id: String,
    pub organization_id: String,
    pub invoked_at: DateTime<Utc>,
    pub state: RunState,
    pub model_attempts: u32,
    pub sample_counts: IndexMap<String, usize>,
}

impl PipelineRun {
    fn new(repository_id: &str, organization_id: &str) -> Self {
        Self {
            repository_id: repository_id.to_string(),
            organization_id: organization_id.to_string(),
            invoked_at: Utc::now(),
            state: RunState::Selecting,
            model_attempts: 0,
            sample_counts: IndexMap::new(),
        }
    }

    fn advance(&mut self, next: RunState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!(
            "Run {}/{}@{}: {:?} -> {:?}",
            self.repository_id, self.organization_id, self.invoked_at, self.state, next
        );
        self.state = next;
    }
}

#[derive(Debug)]
pub struct RunReport {
    pub run: PipelineRun,
    pub outcome: Result<Insight, PipelineFailure>,
}

pub struct Orchestrator {
    store: Arc<dyn Store>,
    model: Arc<dyn InsightModel>,
    config: PipelineConfig,
}

fn ensure_not_cancelled(cancel: &CancellationToken) -> Result<(), PipelineFailure> {
    if cancel.is_cancelled() {
        Err(PipelineFailure::cancelled())
    } else {
        Ok(())
    }
}

/// Requested kinds in first-seen order; an empty request means every kind.
fn distinct_kinds(kinds: &[MetricKind]) -> Vec<MetricKind> {
    if kinds.is_empty() {
        return MetricKind::value_variants().to_vec();
    }
    let mut distinct = Vec::with_capacity(kinds.len());
    for kind in kinds {
        if !distinct.contains(kind) {
            distinct.push(*kind);
        }
    }
    distinct
}

impl Orchestrator {
    pub fn new(store: Arc<dyn Store>, model: Arc<dyn InsightModel>, config: PipelineConfig) -> Self {
        Self {
            store,
            model,
            config,
        }
    }

    pub async fn run(
        &self,
        repository_id: &str,
        organization_id: &str,
        kinds: &[MetricKind],
        lookback: Lookback,
        cancel: &CancellationToken,
    ) -> Result<Insight, PipelineFailure> {
        self.run_with_report(repository_id, organization_id, kinds, lookback, cancel)
            .await
            .outcome
    }

    pub async fn run_with_report(
        &self,
        repository_id: &str,
        organization_id: &str,
        kinds: &[MetricKind],
        lookback: Lookback,
        cancel: &CancellationToken,
    ) -> RunReport {
        let mut run = PipelineRun::new(repository_id, organization_id);
        info!("Generating insight for repository {repository_id} (organization {organization_id})");

        let outcome = self.execute(&mut run, kinds, lookback, cancel).await;

        match &outcome {
            Ok(insight) => {
                run.advance(RunState::Completed);
                info!(
                    "Insight {} persisted after {} model attempt(s)",
                    insight.id, run.model_attempts
                );
            }
            Err(failure) => {
                run.advance(RunState::Failed(failure.stage));
                error!("Run for repository {repository_id}: {failure}");
            }
        }

        RunReport { run, outcome }
    }

    async fn execute(
        &self,
        run: &mut PipelineRun,
        kinds: &[MetricKind],
        lookback: Lookback,
        cancel: &CancellationToken,
    ) -> Result<Insight, PipelineFailure> {
        let repository_id = run.repository_id.clone();

        ensure_not_cancelled(cancel)?;
        let kinds = distinct_kinds(kinds);
        let selections = try_join_all(
            kinds
                .iter()
                .map(|&kind| selector::select(self.store.as_ref(), &repository_id, kind, lookback)),
        )
        .await
        .map_err(|e| PipelineFailure::new(Stage::Selecting, e))?;

        ensure_not_cancelled(cancel)?;
        run.advance(RunState::Aggregating);
        let aggregates: Vec<MetricAggregate> = kinds
            .into_iter()
            .zip(selections)
            .map(|(kind, (start, end, samples))| {
                aggregate::build(&repository_id, kind, start, end, samples)
            })
            .collect();

        for aggregate in &aggregates {
            run.sample_counts
                .insert(aggregate.kind.to_string(), aggregate.sample_count());
        }
        if aggregates.iter().all(MetricAggregate::is_empty) {
            info!("No metrics in the {lookback:?} window for {repository_id}; insight will be low-information");
        }

        ensure_not_cancelled(cancel)?;
        run.advance(RunState::Invoking);
        let raw = self.invoke_with_retry(run, &aggregates, cancel).await?;

        ensure_not_cancelled(cancel)?;
        run.advance(RunState::Validating);
        let candidate = validator::validate(&raw).map_err(|e| {
            if let DevPulseError::SchemaViolation { field, reason, raw } = &e {
                warn!("Model output rejected on `{field}` ({reason}); raw output: {raw}");
            }
            PipelineFailure::new(Stage::Validating, e)
        })?;

        // Last cancellation point: once the write starts it runs to completion.
        ensure_not_cancelled(cancel)?;
        run.advance(RunState::Persisting);
        persister::persist(self.store.as_ref(), &run.organization_id, &candidate)
            .await
            .map_err(|e| PipelineFailure::new(Stage::Persisting, e))
    }

    async fn invoke_with_retry(
        &self,
        run: &mut PipelineRun,
        aggregates: &[MetricAggregate],
        cancel: &CancellationToken,
    ) -> Result<String, PipelineFailure> {
        loop {
            run.model_attempts += 1;
            let attempt = run.model_attempts;

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PipelineFailure::cancelled()),
                result = self.model.invoke(aggregates) => result,
            };

            match result {
                Ok(raw) => return Ok(raw),
                Err(e) if e.is_transient() && attempt <= self.config.max_retries => {
                    let delay = self.config.backoff(attempt);
                    warn!(
                        "Model attempt {attempt}/{} failed: {e}; retrying in {delay:?}",
                        self.config.max_retries + 1
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(PipelineFailure::cancelled()),
                        () = tokio::time::sleep(delay) => {}
                    }
                    run.advance(RunState::Invoking);
                }
                Err(e) => return Err(PipelineFailure::new(Stage::Invoking, e)),
            }
        }
    }
}
