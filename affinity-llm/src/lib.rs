//! Minimal client for the language-model providers affinity talks to.
//!
//! This crate provides a focused, non-streaming client with:
//! - Google Gemini `generateContent` completions
//! - SiliconFlow (OpenAI-compatible) chat completions
//! - JSON-constrained output for either provider
//!
//! Providers differ only in transport, authentication and response
//! unwrapping. Callers pick one through [`Provider`] and talk to it through
//! [`Client`].

mod gemini;
mod siliconflow;

pub use gemini::Gemini;
pub use siliconflow::SiliconFlow;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default overall request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Longest error body kept in [`Error::Api`].
const MAX_ERROR_BODY: usize = 500;

/// Errors that can occur when calling a provider.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{provider} API key not configured (set {var})")]
    NoApiKey {
        provider: Provider,
        var: &'static str,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Empty response: {0}")]
    EmptyResponse(String),

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Error::Timeout(timeout)
        } else {
            Error::Network(err.to_string())
        }
    }

    pub(crate) fn api(status: u16, body: &str) -> Self {
        let message = if body.chars().count() > MAX_ERROR_BODY {
            let mut cut: String = body.chars().take(MAX_ERROR_BODY).collect();
            cut.push_str("...");
            cut
        } else {
            body.to_string()
        };
        Error::Api { status, message }
    }
}

// ============================================================================
// Providers
// ============================================================================

/// The closed set of supported model providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Provider {
    #[default]
    Gemini,
    SiliconFlow,
}

impl Provider {
    /// Every provider, in display order.
    pub const ALL: [Provider; 2] = [Provider::Gemini, Provider::SiliconFlow];

    /// Stable lowercase name, as accepted by [`FromStr`].
    pub fn name(&self) -> &'static str {
        match self {
            Provider::Gemini => "gemini",
            Provider::SiliconFlow => "siliconflow",
        }
    }

    /// Model used when the caller does not pick one.
    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::Gemini => gemini::DEFAULT_MODEL,
            Provider::SiliconFlow => siliconflow::DEFAULT_MODEL,
        }
    }

    /// Environment variable holding this provider's API key.
    pub fn api_key_var(&self) -> &'static str {
        match self {
            Provider::Gemini => "GEMINI_API_KEY",
            Provider::SiliconFlow => "SILICONFLOW_API_KEY",
        }
    }

    /// Read this provider's API key from the environment.
    ///
    /// Empty values count as missing.
    pub fn api_key_from_env(&self) -> Result<String, Error> {
        match std::env::var(self.api_key_var()) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(Error::NoApiKey {
                provider: *self,
                var: self.api_key_var(),
            }),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Provider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gemini" | "google" => Ok(Provider::Gemini),
            "siliconflow" | "silicon-flow" | "silicon_flow" => Ok(Provider::SiliconFlow),
            other => Err(Error::Config(format!("unknown provider '{other}'"))),
        }
    }
}

// ============================================================================
// Client
// ============================================================================

/// A client for one of the supported providers.
#[derive(Clone)]
pub enum Client {
    Gemini(Gemini),
    SiliconFlow(SiliconFlow),
}

impl Client {
    /// Create a client for `provider` with an explicit API key.
    pub fn new(provider: Provider, api_key: impl Into<String>) -> Result<Self, Error> {
        match provider {
            Provider::Gemini => Ok(Client::Gemini(Gemini::new(api_key)?)),
            Provider::SiliconFlow => Ok(Client::SiliconFlow(SiliconFlow::new(api_key)?)),
        }
    }

    /// Create a client for `provider` from its API key environment variable.
    pub fn from_env(provider: Provider) -> Result<Self, Error> {
        Self::new(provider, provider.api_key_from_env()?)
    }

    /// Which provider this client talks to.
    pub fn provider(&self) -> Provider {
        match self {
            Client::Gemini(_) => Provider::Gemini,
            Client::SiliconFlow(_) => Provider::SiliconFlow,
        }
    }

    /// The default model for this client.
    pub fn model(&self) -> &str {
        match self {
            Client::Gemini(c) => c.model(),
            Client::SiliconFlow(c) => c.model(),
        }
    }

    /// Set the default model for this client.
    pub fn with_model(self, model: impl Into<String>) -> Self {
        match self {
            Client::Gemini(c) => Client::Gemini(c.with_model(model)),
            Client::SiliconFlow(c) => Client::SiliconFlow(c.with_model(model)),
        }
    }

    /// Point the client at a different API base URL.
    pub fn with_base_url(self, base_url: impl Into<String>) -> Self {
        match self {
            Client::Gemini(c) => Client::Gemini(c.with_base_url(base_url)),
            Client::SiliconFlow(c) => Client::SiliconFlow(c.with_base_url(base_url)),
        }
    }

    /// Replace the overall request timeout.
    pub fn with_timeout(self, timeout: Duration) -> Result<Self, Error> {
        match self {
            Client::Gemini(c) => Ok(Client::Gemini(c.with_timeout(timeout)?)),
            Client::SiliconFlow(c) => Ok(Client::SiliconFlow(c.with_timeout(timeout)?)),
        }
    }

    /// Send a completion request and return the unwrapped response.
    pub async fn complete(&self, request: Request) -> Result<Response, Error> {
        match self {
            Client::Gemini(c) => c.complete(request).await,
            Client::SiliconFlow(c) => c.complete(request).await,
        }
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("provider", &self.provider())
            .field("model", &self.model())
            .finish_non_exhaustive()
    }
}

pub(crate) fn build_http_client(timeout: Duration) -> Result<reqwest::Client, Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(CONNECT_TIMEOUT.min(timeout))
        .build()
        .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))
}

pub(crate) fn require_key(provider: Provider, api_key: String) -> Result<String, Error> {
    if api_key.trim().is_empty() {
        return Err(Error::NoApiKey {
            provider,
            var: provider.api_key_var(),
        });
    }
    Ok(api_key)
}

// ============================================================================
// Public types
// ============================================================================

/// How the model should shape its output.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ResponseFormat {
    /// Free text.
    #[default]
    Text,
    /// A single JSON object, optionally constrained by a JSON schema.
    Json { schema: Option<serde_json::Value> },
}

/// A single-turn completion request.
#[derive(Debug, Clone)]
pub struct Request {
    pub model: Option<String>,
    pub max_tokens: usize,
    pub system: Option<String>,
    pub prompt: String,
    pub temperature: Option<f32>,
    pub format: ResponseFormat,
    /// Tokens the model may spend reasoning before it answers. `Some(0)`
    /// turns thinking off. Only Gemini honours it.
    pub thinking_budget: Option<u32>,
}

impl Request {
    /// Create a new request with the given user prompt.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            model: None,
            max_tokens: 2048,
            system: None,
            prompt: prompt.into(),
            temperature: None,
            format: ResponseFormat::Text,
            thinking_budget: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Ask for a JSON object matching `schema`.
    pub fn with_json_schema(mut self, schema: serde_json::Value) -> Self {
        self.format = ResponseFormat::Json {
            schema: Some(schema),
        };
        self
    }

    pub fn with_thinking_budget(mut self, tokens: u32) -> Self {
        self.thinking_budget = Some(tokens);
        self
    }

    /// Ask for a JSON object without a schema.
    pub fn with_json(mut self) -> Self {
        self.format = ResponseFormat::Json { schema: None };
        self
    }
}

/// A completion response, unwrapped from the provider envelope.
#[derive(Debug, Clone)]
pub struct Response {
    pub provider: Provider,
    pub model: String,
    pub text: String,
    pub finish_reason: Option<String>,
    pub usage: Option<Usage>,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: usize,
    pub output_tokens: usize,
}
