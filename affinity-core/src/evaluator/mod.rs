//! Interaction evaluation.
//!
//! The [`Evaluator`] turns a character and a free-text description of what
//! happened into a [`Verdict`] by asking a remote language model. Providers
//! are interchangeable: they differ in transport and authentication, never in
//! prompt content or output contract.

mod parse;
mod prompt;

pub use parse::parse_verdict;
pub use prompt::{build_prompt, verdict_schema};

use crate::character::Character;
use affinity_llm::{Client, Provider, Request};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Errors from evaluating an interaction.
#[derive(Debug, Error)]
pub enum EvaluateError {
    #[error("Evaluator not configured: {0}")]
    NotConfigured(String),

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Empty response: {0}")]
    EmptyResponse(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

/// Coarse classification of an [`EvaluateError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluateErrorKind {
    Configuration,
    Transport,
    EmptyResponse,
    MalformedResponse,
}

impl EvaluateError {
    pub fn kind(&self) -> EvaluateErrorKind {
        match self {
            EvaluateError::NotConfigured(_) => EvaluateErrorKind::Configuration,
            EvaluateError::Transport(_) => EvaluateErrorKind::Transport,
            EvaluateError::EmptyResponse(_) => EvaluateErrorKind::EmptyResponse,
            EvaluateError::MalformedResponse(_) => EvaluateErrorKind::MalformedResponse,
        }
    }

    /// Short message suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            EvaluateError::NotConfigured(detail) => {
                format!("The model provider is not configured: {detail}")
            }
            EvaluateError::Transport(detail) => {
                format!("The request to the model failed: {detail}")
            }
            EvaluateError::EmptyResponse(_) | EvaluateError::MalformedResponse(_) => {
                "The model's response was unusable. Try again.".to_string()
            }
        }
    }
}

impl From<affinity_llm::Error> for EvaluateError {
    fn from(err: affinity_llm::Error) -> Self {
        use affinity_llm::Error as E;
        match err {
            E::NoApiKey { .. } | E::Config(_) => EvaluateError::NotConfigured(err.to_string()),
            E::Network(_) | E::Timeout(_) | E::Api { .. } => {
                EvaluateError::Transport(err.to_string())
            }
            E::EmptyResponse(reason) => EvaluateError::EmptyResponse(reason),
            E::Parse(reason) => EvaluateError::MalformedResponse(reason),
        }
    }
}

/// The structured result of evaluating one interaction.
///
/// `favorability_change` is whatever the model reported; clamping is the
/// store's job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    pub favorability_change: i32,
    pub new_status: String,
    pub character_response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

impl Verdict {
    pub fn new(
        favorability_change: i32,
        new_status: impl Into<String>,
        character_response: impl Into<String>,
    ) -> Self {
        Self {
            favorability_change,
            new_status: new_status.into(),
            character_response: character_response.into(),
            reasoning: None,
        }
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }
}

/// Anything that can judge an interaction.
#[async_trait]
pub trait Evaluate: Send + Sync {
    /// Evaluate `user_input` in the context of `character`.
    ///
    /// Must not mutate the character; every call is a fresh evaluation.
    async fn evaluate(&self, character: &Character, user_input: &str)
        -> Result<Verdict, EvaluateError>;

    /// Check that evaluations can currently be made.
    ///
    /// A success says nothing about later calls.
    async fn test_connection(&self) -> Result<(), EvaluateError> {
        Ok(())
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Where the provider API key comes from.
#[derive(Clone, Default)]
pub enum Credential {
    /// The provider's standard environment variable.
    #[default]
    Env,
    /// A named environment variable.
    EnvVar(String),
    /// A key supplied directly.
    Key(String),
}

impl Credential {
    /// Resolve the key for `provider`. Blank keys count as missing.
    pub fn resolve(&self, provider: Provider) -> Result<String, EvaluateError> {
        let (key, source) = match self {
            Credential::Env => return Ok(provider.api_key_from_env()?),
            Credential::EnvVar(var) => (std::env::var(var).ok(), var.as_str()),
            Credential::Key(key) => (Some(key.clone()), "supplied key"),
        };

        match key {
            Some(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(EvaluateError::NotConfigured(format!(
                "no {provider} API key ({source} is unset or empty)"
            ))),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Env => f.write_str("Env"),
            Credential::EnvVar(var) => f.debug_tuple("EnvVar").field(var).finish(),
            Credential::Key(_) => f.write_str("Key(<redacted>)"),
        }
    }
}

/// Configuration for the [`Evaluator`].
#[derive(Debug, Clone)]
pub struct EvaluatorConfig {
    /// Which provider to call.
    pub provider: Provider,

    /// Model override (defaults to the provider's default model).
    pub model: Option<String>,

    /// Where to find the API key.
    pub credential: Credential,

    /// API base URL override.
    pub base_url: Option<String>,

    /// Maximum tokens for the model's answer.
    pub max_tokens: usize,

    /// Sampling temperature.
    pub temperature: Option<f32>,

    /// Reasoning budget for thinking models; `Some(0)` disables thinking so
    /// the whole token cap goes to the answer.
    pub thinking_budget: Option<u32>,

    /// Overall HTTP timeout per call.
    pub timeout: Duration,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            model: None,
            credential: Credential::Env,
            base_url: None,
            max_tokens: 2048,
            temperature: Some(0.7),
            thinking_budget: Some(0),
            timeout: affinity_llm::DEFAULT_TIMEOUT,
        }
    }
}

impl EvaluatorConfig {
    /// Create a config for the given provider.
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            ..Default::default()
        }
    }

    /// Read `AFFINITY_PROVIDER`, `AFFINITY_MODEL` and `AFFINITY_TIMEOUT_SECS`.
    ///
    /// Unset variables keep their defaults; unparsable ones are errors.
    pub fn from_env() -> Result<Self, EvaluateError> {
        let mut config = Self::default();

        if let Ok(provider) = std::env::var("AFFINITY_PROVIDER") {
            config.provider = provider
                .parse()
                .map_err(|e: affinity_llm::Error| EvaluateError::NotConfigured(e.to_string()))?;
        }

        if let Ok(model) = std::env::var("AFFINITY_MODEL") {
            if !model.trim().is_empty() {
                config.model = Some(model);
            }
        }

        if let Ok(secs) = std::env::var("AFFINITY_TIMEOUT_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                EvaluateError::NotConfigured(format!(
                    "AFFINITY_TIMEOUT_SECS is not a number: {secs}"
                ))
            })?;
            config.timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }

    /// Set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set where the API key comes from.
    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = credential;
        self
    }

    /// Use an explicit API key.
    pub fn with_api_key(self, key: impl Into<String>) -> Self {
        self.with_credential(Credential::Key(key.into()))
    }

    /// Set the API base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set max tokens for responses.
    pub fn with_max_tokens(mut self, tokens: usize) -> Self {
        self.max_tokens = tokens;
        self
    }

    /// Set temperature for generation.
    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    /// Set the reasoning budget; `None` leaves it to the provider.
    pub fn with_thinking_budget(mut self, tokens: Option<u32>) -> Self {
        self.thinking_budget = tokens;
        self
    }

    /// Set the HTTP timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

// ============================================================================
// Evaluator
// ============================================================================

/// Evaluates interactions against a remote model provider.
#[derive(Debug, Clone, Default)]
pub struct Evaluator {
    config: EvaluatorConfig,
}

impl Evaluator {
    /// Create an evaluator with the given configuration.
    pub fn new(config: EvaluatorConfig) -> Self {
        Self { config }
    }

    /// Create an evaluator configured from the environment.
    pub fn from_env() -> Result<Self, EvaluateError> {
        Ok(Self::new(EvaluatorConfig::from_env()?))
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    pub fn provider(&self) -> Provider {
        self.config.provider
    }

    /// The model that will be asked.
    pub fn model(&self) -> &str {
        self.config
            .model
            .as_deref()
            .unwrap_or_else(|| self.config.provider.default_model())
    }

    /// Build the provider request for an interaction.
    pub fn build_request(&self, character: &Character, user_input: &str) -> Request {
        let mut request = Request::new(build_prompt(character, user_input))
            .with_max_tokens(self.config.max_tokens)
            .with_json_schema(verdict_schema());

        if let Some(temp) = self.config.temperature {
            request = request.with_temperature(temp);
        }
        if let Some(budget) = self.config.thinking_budget {
            request = request.with_thinking_budget(budget);
        }

        request
    }

    /// Build a client, resolving the credential now.
    fn client(&self) -> Result<Client, EvaluateError> {
        let key = self.config.credential.resolve(self.config.provider)?;
        let mut client = Client::new(self.config.provider, key)?.with_timeout(self.config.timeout)?;

        if let Some(ref model) = self.config.model {
            client = client.with_model(model);
        }
        if let Some(ref base_url) = self.config.base_url {
            client = client.with_base_url(base_url);
        }

        Ok(client)
    }
}

#[async_trait]
impl Evaluate for Evaluator {
    async fn evaluate(
        &self,
        character: &Character,
        user_input: &str,
    ) -> Result<Verdict, EvaluateError> {
        let client = self.client()?;
        let request = self.build_request(character, user_input);

        let response = client.complete(request).await?;
        let verdict = parse_verdict(&response.text).inspect_err(|e| {
            warn!(provider = %self.provider(), error = %e, "Discarding unusable model output");
        })?;

        info!(
            provider = %self.provider(),
            character = %character.id,
            delta = verdict.favorability_change,
            "Interaction evaluated"
        );

        Ok(verdict)
    }

    /// Sends a tiny prompt with the current credential.
    async fn test_connection(&self) -> Result<(), EvaluateError> {
        let client = self.client()?;
        let request = Request::new("ping")
            .with_max_tokens(16)
            .with_thinking_budget(0);

        match client.complete(request).await {
            // Any 2xx answer proves the key and endpoint work.
            Ok(_) | Err(affinity_llm::Error::EmptyResponse(_)) => Ok(()),
            Err(e) => {
                warn!(provider = %self.provider(), error = %e, "Connection test failed");
                Err(e.into())
            }
        }
    }
}
