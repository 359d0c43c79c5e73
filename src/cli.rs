use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::auth::Token;
use crate::ingest;
use crate::models::{Lookback, MetricKind};
use crate::organizations::OrganizationBootstrap;
use crate::pipeline::{Orchestrator, PipelineConfig};
use crate::providers::openai::{OpenAiClient, DEFAULT_API_URL};
use crate::providers::ModelProfile;
use crate::store::file::JsonFileStore;
use crate::store::memory::InMemoryStore;
use crate::store::Store;

#[derive(Parser)]
#[command(name = "devpulse")]
#[command(author, version, about = "Developer activity insights", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON document holding metrics, insights and organizations
    #[arg(short, long, global = true, env = "DEVPULSE_STORE", default_value = "devpulse.json")]
    store: PathBuf,

    /// Output file path (defaults to stdout)
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Pretty print JSON output
    #[arg(short, long, global = true, default_value_t = false)]
    pretty: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the default organization for a user if it does not exist yet
    Provision {
        /// User the organization belongs to
        #[arg(short, long)]
        user: String,
    },

    /// Load metric records from a JSON file into the store
    Ingest {
        /// JSON array of {repository_id, kind, value, timestamp}
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Generate and store one insight for a repository
    Generate {
        /// Repository the metrics belong to
        #[arg(short, long)]
        repository: String,

        /// Organization the insight is stored under
        #[arg(short = 'O', long)]
        organization: String,

        /// Metric kinds to include (repeatable; defaults to all)
        #[arg(short, long = "kind", value_enum)]
        kinds: Vec<MetricKind>,

        /// How far back to look
        #[arg(short, long, value_enum, default_value = "week")]
        lookback: Lookback,

        /// Model API key
        #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
        api_key: Option<String>,

        /// OpenAI-compatible API base URL
        #[arg(long, env = "DEVPULSE_MODEL_URL", default_value = DEFAULT_API_URL)]
        api_url: String,

        /// Model name
        #[arg(short, long, env = "DEVPULSE_MODEL", default_value = "gpt-3.5-turbo")]
        model: String,

        /// Sampling temperature
        #[arg(long, default_value_t = 0.7)]
        temperature: f32,

        /// Hard timeout for each model call
        #[arg(long, default_value_t = 30)]
        timeout_secs: u64,

        /// Retries for transient model failures
        #[arg(long, default_value_t = 2)]
        max_retries: u32,

        /// Delay before the first retry; doubles for each further retry
        #[arg(long, default_value_t = 1000)]
        backoff_ms: u64,

        /// Embed raw samples in the prompt, not only counts
        #[arg(long, default_value_t = false)]
        include_samples: bool,

        /// Run against an in-memory copy of the store; nothing is written
        #[arg(long, default_value_t = false)]
        dry_run: bool,

        /// Print the run record (states, model attempts, sample counts) with the insight
        #[arg(long, default_value_t = false)]
        report: bool,
    },

    /// List stored insights for an organization, newest first
    Insights {
        /// Organization to list
        #[arg(short = 'O', long)]
        organization: String,
    },
}

impl Cli {
    pub async fn execute(&self) -> Result<()> {
        let store = JsonFileStore::open(&self.store).await?;
        info!("Using store {}", store.path().display());

        match &self.command {
            Commands::Provision { user } => {
                let mut bootstrap = OrganizationBootstrap::new(user.as_str());
                let organization = bootstrap.ensure(&store).await?;
                info!("Bootstrap for {user}: {:?}", bootstrap.state());
                self.emit(&organization)
            }
            Commands::Ingest { file } => {
                let metrics = ingest::load_file(file).await?;
                let records = ingest::insert_all(&store, metrics).await?;
                self.emit(&serde_json::json!({ "inserted": records.len() }))
            }
            Commands::Generate {
                repository,
                organization,
                kinds,
                lookback,
                api_key,
                api_url,
                model,
                temperature,
                timeout_secs,
                max_retries,
                backoff_ms,
                include_samples,
                dry_run,
                report,
            } => {
                let token = api_key.as_deref().map(Token::from);
                if token.as_ref().map_or(true, Token::is_empty) {
                    warn!("No model API key configured; the model service may reject the request");
                }

                let profile = ModelProfile {
                    model: model.clone(),
                    temperature: *temperature,
                    timeout: Duration::from_secs(*timeout_secs),
                    include_samples: *include_samples,
                };
                let client = OpenAiClient::new(api_url, token, profile)?;
                info!("Using model {} at {api_url}", client.profile().model);

                let config = PipelineConfig {
                    max_retries: *max_retries,
                    initial_backoff: Duration::from_millis(*backoff_ms),
                };
                let store = pipeline_store(store, *dry_run).await;
                let orchestrator = Orchestrator::new(store, Arc::new(client), config);

                let cancel = CancellationToken::new();
                let trigger = cancel.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        warn!("Interrupt received, cancelling run");
                        trigger.cancel();
                    }
                });

                if !*report {
                    let insight = orchestrator
                        .run(repository, organization, kinds, *lookback, &cancel)
                        .await?;
                    return self.emit(&insight);
                }

                let report = orchestrator
                    .run_with_report(repository, organization, kinds, *lookback, &cancel)
                    .await;
                match report.outcome {
                    Ok(insight) => self.emit(&serde_json::json!({
                        "run": report.run,
                        "insight": insight,
                    })),
                    Err(failure) => {
                        warn!(
                            "Run ended in state {:?} after {} model attempt(s)",
                            report.run.state, report.run.model_attempts
                        );
                        bail!(failure)
                    }
                }
            }
            Commands::Insights { organization } => {
                let insights = store.list_insights(organization).await?;
                if insights.is_empty() {
                    warn!("No insights stored for organization: {organization}");
                }
                self.emit(&insights)
            }
        }
    }

    fn emit<T: Serialize>(&self, value: &T) -> Result<()> {
        let json_output = if self.pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        };

        if let Some(output_path) = &self.output {
            std::fs::write(output_path, json_output)?;
            info!("Output written to: {}", output_path.display());
        } else {
            println!("{json_output}");
        }

        Ok(())
    }
}

/// The store a `generate` run writes to; a dry run gets an in-memory copy.
async fn pipeline_store(store: JsonFileStore, dry_run: bool) -> Arc<dyn Store> {
    if dry_run {
        info!("Dry run: nothing will be written to {}", store.path().display());
        Arc::new(InMemoryStore::from_data(store.snapshot().await))
    } else {
        Arc::new(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MetricAggregate;
    use crate::providers::InsightModel;
    use async_trait::async_trait;
    use clap::CommandFactory;
    use tempfile::TempDir;

    struct FixedModel;

    #[async_trait]
    impl InsightModel for FixedModel {
        async fn invoke(&self, _aggregates: &[MetricAggregate]) -> crate::error::Result<String> {
            Ok(r#"{"title":"Quiet week","description":"No pull requests.","recommendation":"Open smaller PRs.","priority":2}"#.to_string())
        }
    }

    async fn generate_once(store: Arc<dyn Store>) {
        Orchestrator::new(store, Arc::new(FixedModel), PipelineConfig::default())
            .run("acme/api", "org-1", &[], Lookback::Week, &CancellationToken::new())
            .await
            .unwrap();
    }

    async fn seeded_store_file(tmp: &TempDir) -> PathBuf {
        let path = tmp.path().join("devpulse.json");
        let store = JsonFileStore::open(&path).await.unwrap();
        OrganizationBootstrap::new("user-1").ensure(&store).await.unwrap();
        path
    }

    #[tokio::test]
    async fn test_dry_run_leaves_store_file_untouched() {
        let tmp = TempDir::new().unwrap();
        let path = seeded_store_file(&tmp).await;
        let before = std::fs::read(&path).unwrap();

        let store = pipeline_store(JsonFileStore::open(&path).await.unwrap(), true).await;
        generate_once(store.clone()).await;

        assert_eq!(store.list_insights("org-1").await.unwrap().len(), 1);
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[tokio::test]
    async fn test_generate_without_dry_run_writes_through() {
        let tmp = TempDir::new().unwrap();
        let path = seeded_store_file(&tmp).await;

        let store = pipeline_store(JsonFileStore::open(&path).await.unwrap(), false).await;
        generate_once(store).await;

        let reopened = JsonFileStore::open(&path).await.unwrap();
        assert_eq!(reopened.list_insights("org-1").await.unwrap().len(), 1);
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_generate_defaults() {
        let cli = Cli::try_parse_from([
            "devpulse",
            "generate",
            "--repository",
            "acme/api",
            "--organization",
            "org-1",
        ])
        .unwrap();

        match cli.command {
            Commands::Generate {
                kinds,
                lookback,
                timeout_secs,
                max_retries,
                backoff_ms,
                include_samples,
                dry_run,
                report,
                ..
            } => {
                assert!(kinds.is_empty());
                assert_eq!(lookback, Lookback::Week);
                assert_eq!(timeout_secs, 30);
                assert_eq!(max_retries, 2);
                assert_eq!(backoff_ms, 1000);
                assert!(!include_samples);
                assert!(!dry_run);
                assert!(!report);
            }
            _ => panic!("expected generate"),
        }
    }

    #[test]
    fn test_generate_accepts_repeated_kinds() {
        let cli = Cli::try_parse_from([
            "devpulse",
            "generate",
            "-r",
            "acme/api",
            "-O",
            "org-1",
            "--kind",
            "commit",
            "--kind",
            "pr",
            "--lookback",
            "month",
        ])
        .unwrap();

        match cli.command {
            Commands::Generate {
                kinds, lookback, ..
            } => {
                assert_eq!(kinds, vec![MetricKind::Commit, MetricKind::PullRequest]);
                assert_eq!(lookback, Lookback::Month);
            }
            _ => panic!("expected generate"),
        }
    }

    #[test]
    fn test_generate_report_and_dry_run_flags() {
        let cli = Cli::try_parse_from([
            "devpulse", "generate", "-r", "acme/api", "-O", "org-1", "--report", "--dry-run",
        ])
        .unwrap();

        match cli.command {
            Commands::Generate {
                report, dry_run, ..
            } => {
                assert!(report);
                assert!(dry_run);
            }
            _ => panic!("expected generate"),
        }
    }
}
