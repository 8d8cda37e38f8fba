//! SiliconFlow client (OpenAI-compatible chat completions).

use crate::{
    build_http_client, require_key, Error, Provider, Request, Response, ResponseFormat, Usage,
};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

const API_BASE: &str = "https://api.siliconflow.cn/v1";
pub(crate) const DEFAULT_MODEL: &str = "deepseek-ai/DeepSeek-V3";

/// SiliconFlow API client.
#[derive(Clone)]
pub struct SiliconFlow {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    timeout: Duration,
}

impl SiliconFlow {
    /// Create a new SiliconFlow client with the given API key.
    pub fn new(api_key: impl Into<String>) -> Result<Self, Error> {
        let api_key = require_key(Provider::SiliconFlow, api_key.into())?;
        Ok(Self {
            client: build_http_client(crate::DEFAULT_TIMEOUT)?,
            api_key,
            model: DEFAULT_MODEL.to_string(),
            base_url: API_BASE.to_string(),
            timeout: crate::DEFAULT_TIMEOUT,
        })
    }

    /// Create a SiliconFlow client from the SILICONFLOW_API_KEY environment variable.
    pub fn from_env() -> Result<Self, Error> {
        Self::new(Provider::SiliconFlow.api_key_from_env()?)
    }

    /// Set the default model for this client.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Override the API base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Replace the overall request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, Error> {
        self.client = build_http_client(timeout)?;
        self.timeout = timeout;
        Ok(self)
    }

    /// The default model for this client.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send a completion request and return the unwrapped response.
    pub async fn complete(&self, request: Request) -> Result<Response, Error> {
        let api_request = self.build_api_request(&request);
        let headers = self.build_headers()?;
        let url = format!("{}/chat/completions", self.base_url);

        info!(provider = "siliconflow", model = %api_request.model, "Calling LLM API");

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .json(&api_request)
            .send()
            .await
            .map_err(|e| Error::from_reqwest(e, self.timeout))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::api(status, &body));
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| Error::Parse(e.to_string()))?;

        parse_response(api_response, api_request.model)
    }

    fn build_headers(&self) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                .map_err(|e| Error::Config(format!("Invalid API key: {e}")))?,
        );
        Ok(headers)
    }

    fn build_api_request(&self, request: &Request) -> ApiRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(ApiMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        messages.push(ApiMessage {
            role: "user".to_string(),
            content: request.prompt.clone(),
        });

        // The schema itself travels in the prompt; json_object mode only
        // guarantees syntactically valid JSON.
        let response_format = match request.format {
            ResponseFormat::Text => None,
            ResponseFormat::Json { .. } => Some(ApiResponseFormat {
                r#type: "json_object".to_string(),
            }),
        };

        ApiRequest {
            model: request.model.clone().unwrap_or_else(|| self.model.clone()),
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            response_format,
            stream: false,
        }
    }
}

fn parse_response(api_response: ApiResponse, requested_model: String) -> Result<Response, Error> {
    let usage = api_response.usage.map(|u| Usage {
        input_tokens: u.prompt_tokens,
        output_tokens: u.completion_tokens,
    });
    let model = api_response.model.unwrap_or(requested_model);

    let Some(choice) = api_response.choices.into_iter().next() else {
        return Err(Error::EmptyResponse("no choices".to_string()));
    };

    let text = choice
        .message
        .and_then(|m| m.content)
        .unwrap_or_default();

    if text.trim().is_empty() {
        let reason = choice
            .finish_reason
            .map(|r| format!("no content (finish reason: {r})"))
            .unwrap_or_else(|| "no content".to_string());
        return Err(Error::EmptyResponse(reason));
    }

    debug!(model = %model, chars = text.len(), "SiliconFlow response received");

    Ok(Response {
        provider: Provider::SiliconFlow,
        model,
        text,
        finish_reason: choice.finish_reason,
        usage,
    })
}

// ============================================================================
// Internal API types
// ============================================================================

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<ApiMessage>,
    max_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ApiResponseFormat>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ApiResponseFormat {
    r#type: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    #[serde(default)]
    message: Option<ApiChoiceMessage>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: usize,
    #[serde(default)]
    completion_tokens: usize,
}
