use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DevPulseError {
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Model service unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Model service rejected the request: {status} - {body}")]
    ModelRejected { status: u16, body: String },

    #[error("Model service returned no content")]
    ModelEmptyResponse,

    #[error("Schema violation on `{field}`: {reason}")]
    SchemaViolation {
        field: String,
        reason: String,
        raw: String,
    },

    #[error("Run cancelled")]
    Cancelled,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DevPulseError {
    /// Only transport-level model failures are worth retrying inside a run.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ModelUnavailable(_))
    }

    pub fn schema(field: &str, reason: impl Into<String>, raw: &str) -> Self {
        Self::SchemaViolation {
            field: field.to_string(),
            reason: reason.into(),
            raw: raw.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DevPulseError>;

/// Stage a run failed at. Aggregation is pure, so no failure carries it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Selecting,
    Invoking,
    Validating,
    Persisting,
    Cancelled,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Selecting => "selecting",
            Self::Invoking => "invoking",
            Self::Validating => "validating",
            Self::Persisting => "persisting",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Terminal failure of a pipeline run, tagged with the stage that failed.
#[derive(Error, Debug)]
#[error("pipeline failed at {stage}: {cause}")]
pub struct PipelineFailure {
    pub stage: Stage,
    #[source]
    pub cause: DevPulseError,
}

impl PipelineFailure {
    pub fn new(stage: Stage, cause: DevPulseError) -> Self {
        Self { stage, cause }
    }

    pub fn cancelled() -> Self {
        Self::new(Stage::Cancelled, DevPulseError::Cancelled)
    }
}
