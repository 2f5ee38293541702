use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use log::{error, warn};

use crate::errors::ProviderError;
use super::{status_error, transport_error, Provider};

/// Ollama client for interacting with Ollama API
#[derive(Debug)]
pub struct Ollama {
    /// Base URL of the Ollama API
    base_url: String,
    /// HTTP client for making requests
    client: Client,
}

/// Generate request for the Ollama API
#[derive(Debug, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Model name to use for generation
    model: String,
    /// Prompt to generate from
    prompt: String,
    /// System message to guide the model
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    /// Additional model parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<GenerationOptions>,
    /// Whether to stream the response
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

/// Generation options for the Ollama API
#[derive(Debug, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Temperature for generation
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

/// Generation response from the Ollama API
#[derive(Debug, Serialize, Deserialize)]
pub struct GenerationResponse {
    /// Model name
    #[serde(default)]
    pub model: String,
    /// Generated text
    pub response: String,
    /// Whether the generation is complete
    #[serde(default)]
    pub done: bool,
}

impl GenerationRequest {
    /// Create a new non-streaming generation request
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            system: None,
            options: None,
            stream: Some(false),
        }
    }

    /// Set the system prompt
    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Set the temperature
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.options = Some(GenerationOptions { temperature: Some(temperature) });
        self
    }
}

impl Ollama {
    /// Create a new Ollama client from a complete URL
    ///
    /// Ollama speaks HTTP/1.1; the pool is sized for parallel batch requests.
    pub fn new(url: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            base_url: url.into().trim_end_matches('/').to_string(),
            client: Client::builder()
                .timeout(Duration::from_secs(timeout_secs.max(1)))
                .http1_only()
                .pool_idle_timeout(Duration::from_secs(90))
                .pool_max_idle_per_host(20)
                .tcp_keepalive(Duration::from_secs(60))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Parse a generate response, tolerating servers that stream JSONL despite `stream: false`
    fn parse_generation(response_text: &str) -> Result<GenerationResponse, ProviderError> {
        if let Ok(parsed) = serde_json::from_str::<GenerationResponse>(response_text) {
            return Ok(parsed);
        }

        let mut full_response = String::new();
        let mut model = String::new();
        let mut saw_line = false;
        for line in response_text.lines().filter(|l| !l.trim().is_empty()) {
            let chunk: GenerationResponse = serde_json::from_str(line).map_err(|e| {
                error!("Failed to parse Ollama API response line: {}", e);
                ProviderError::ParseError(format!("invalid JSON from Ollama: {}", e))
            })?;
            saw_line = true;
            full_response.push_str(&chunk.response);
            if !chunk.model.is_empty() {
                model = chunk.model;
            }
        }

        if !saw_line {
            return Err(ProviderError::ParseError("empty response from Ollama".to_string()));
        }
        warn!("Ollama returned a streamed response; concatenated {} chars", full_response.chars().count());

        Ok(GenerationResponse { model, response: full_response, done: true })
    }
}

#[async_trait]
impl Provider for Ollama {
    type Request = GenerationRequest;
    type Response = GenerationResponse;

    async fn complete(&self, request: Self::Request) -> Result<Self::Response, ProviderError> {
        let url = format!("{}/api/generate", self.base_url);

        let response = self.client.post(&url)
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await
                .unwrap_or_else(|_| "Failed to get error response text".to_string());
            error!("Ollama API error ({}): {}", status, error_text);
            return Err(status_error(status.as_u16(), error_text));
        }

        let response_text = response.text().await
            .map_err(|e| ProviderError::ParseError(format!("Failed to read Ollama response: {}", e)))?;

        Self::parse_generation(&response_text)
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        let url = format!("{}/api/version", self.base_url);
        let response = self.client.get(&url)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(status_error(status.as_u16(), format!("Ollama version check failed: {}", status)))
        }
    }

    fn extract_text(response: &Self::Response) -> String {
        response.response.clone()
    }
}
