pub mod openai;
pub mod prompt;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::MetricAggregate;

/// A generative model that turns aggregates into raw insight text.
///
/// Implementations make exactly one external call per `invoke` and never
/// retry; retry policy belongs to the caller.
#[async_trait]
pub trait InsightModel: Send + Sync {
    async fn invoke(&self, aggregates: &[MetricAggregate]) -> Result<String>;
}

/// Request parameters fixed when a client is built.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelProfile {
    pub model: String,
    pub temperature: f32,
    pub timeout: Duration,
    pub include_samples: bool,
}

impl Default for ModelProfile {
    fn default() -> Self {
        Self {
            model: "gpt-3.5-turbo".to_string(),
            temperature: 0.7,
            timeout: Duration::from_secs(30),
            include_samples: false,
        }
    }
}
