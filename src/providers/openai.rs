use async_trait::async_trait;
use log::{debug, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{prompt, InsightModel, ModelProfile};
use crate::auth::Token;
use crate::error::{DevPulseError, Result};
use crate::models::MetricAggregate;

pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1/";

/// Client for an OpenAI-compatible chat completions endpoint.
pub struct OpenAiClient {
    client: Client,
    completions_url: Url,
    token: Option<Token>,
    profile: ModelProfile,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

impl OpenAiClient {
    pub fn new(base_url: &str, token: Option<Token>, profile: ModelProfile) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("DevPulse/", env!("CARGO_PKG_VERSION")))
            .timeout(profile.timeout)
            .build()
            .map_err(|e| DevPulseError::Config(format!("Failed to create HTTP client: {e}")))?;

        // Without a trailing slash `join` would replace the last path segment.
        let mut base = base_url.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }

        let completions_url = Url::parse(&base)
            .map_err(|e| DevPulseError::Config(format!("Invalid model API URL: {e}")))?
            .join("chat/completions")
            .map_err(|e| DevPulseError::Config(format!("Invalid completions URL: {e}")))?;

        Ok(Self {
            client,
            completions_url,
            token: token.filter(|t| !t.is_empty()),
            profile,
        })
    }

    pub fn profile(&self) -> &ModelProfile {
        &self.profile
    }

    fn auth_request(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(token) = &self.token {
            request.bearer_auth(token.as_str())
        } else {
            request
        }
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = ChatRequest {
            model: &self.profile.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.profile.temperature,
        };

        let request = self.auth_request(self.client.post(self.completions_url.clone()).json(&body));

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                DevPulseError::ModelUnavailable(format!(
                    "request timed out after {:?}",
                    self.profile.timeout
                ))
            } else {
                DevPulseError::ModelUnavailable(e.to_string())
            }
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| DevPulseError::ModelUnavailable(format!("failed to read body: {e}")))?;

        if status.is_server_error() {
            return Err(DevPulseError::ModelUnavailable(format!("HTTP {status}: {text}")));
        }

        if !status.is_success() {
            return Err(DevPulseError::ModelRejected {
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: ChatResponse = serde_json::from_str(&text).map_err(|e| {
            warn!("Undecodable completion body ({e}): {text}");
            DevPulseError::ModelEmptyResponse
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(DevPulseError::ModelEmptyResponse)
    }
}

#[async_trait]
impl InsightModel for OpenAiClient {
    async fn invoke(&self, aggregates: &[MetricAggregate]) -> Result<String> {
        let prompt = prompt::render(aggregates, self.profile.include_samples);
        debug!(
            "Invoking {} with {} aggregates ({} prompt bytes)",
            self.profile.model,
            aggregates.len(),
            prompt.len()
        );
        self.complete(&prompt).await
    }
}
