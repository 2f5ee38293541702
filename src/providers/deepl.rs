use std::time::Duration;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use reqwest::Client;
use log::{debug, error};

use crate::errors::ProviderError;
use super::{status_error, transport_error, Provider};

/// DeepL client for the v2 REST API
#[derive(Debug)]
pub struct DeepL {
    /// HTTP client for API requests
    client: Client,
    /// API key for authentication
    api_key: String,
    /// Base URL, e.g. https://api-free.deepl.com
    endpoint: String,
}

/// DeepL translate request
#[derive(Debug, Serialize)]
pub struct DeepLRequest {
    /// Texts to translate, one result per element
    text: Vec<String>,

    /// Target language code (e.g. "ZH", "FR")
    target_lang: String,

    /// Source language code, detected when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    source_lang: Option<String>,

    /// Keep whitespace and punctuation where the input has them
    preserve_formatting: bool,
}

impl DeepLRequest {
    /// Create a request for one text
    pub fn new(text: impl Into<String>, target_lang: &str) -> Self {
        Self {
            text: vec![text.into()],
            target_lang: target_lang.to_uppercase(),
            source_lang: None,
            preserve_formatting: true,
        }
    }

    /// Set the source language; "auto" leaves detection to DeepL
    pub fn source_lang(mut self, source_lang: &str) -> Self {
        if !source_lang.is_empty() && !source_lang.eq_ignore_ascii_case("auto") {
            self.source_lang = Some(source_lang.to_uppercase());
        }
        self
    }
}

/// One translated text
#[derive(Debug, Deserialize)]
pub struct DeepLTranslation {
    /// Language DeepL detected in the input
    #[serde(default)]
    pub detected_source_language: Option<String>,
    /// Translated text
    pub text: String,
}

/// DeepL translate response
#[derive(Debug, Deserialize)]
pub struct DeepLResponse {
    /// Results in request order
    pub translations: Vec<DeepLTranslation>,
}

impl DeepL {
    /// Create a new DeepL client
    pub fn new(api_key: impl Into<String>, endpoint: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(timeout_secs.max(1)))
                .pool_idle_timeout(Duration::from_secs(90))
                .build()
                .unwrap_or_default(),
            api_key: api_key.into(),
            endpoint: endpoint.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v2/{}", self.endpoint.trim_end_matches('/'), path)
    }

    fn auth_header(&self) -> String {
        format!("DeepL-Auth-Key {}", self.api_key)
    }
}

#[async_trait]
impl Provider for DeepL {
    type Request = DeepLRequest;
    type Response = DeepLResponse;

    async fn complete(&self, request: Self::Request) -> Result<Self::Response, ProviderError> {
        let response = self.client.post(self.url("translate"))
            .header("Authorization", self.auth_header())
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await
                .unwrap_or_else(|_| "Failed to get error response text".to_string());
            error!("DeepL API error ({}): {}", status, error_text);
            return Err(status_error(status.as_u16(), error_text));
        }

        let parsed = response.json::<DeepLResponse>().await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        if parsed.translations.is_empty() {
            return Err(ProviderError::ParseError("response contained no translations".to_string()));
        }
        if let Some(lang) = parsed.translations[0].detected_source_language.as_deref() {
            debug!("DeepL detected source language {}", lang);
        }

        Ok(parsed)
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        let response = self.client.get(self.url("usage"))
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let error_text = response.text().await.unwrap_or_default();
            Err(status_error(status.as_u16(), error_text))
        }
    }

    fn extract_text(response: &Self::Response) -> String {
        response.translations.iter()
            .map(|t| t.text.as_str())
            .collect::<Vec<_>>()
            .join("")
    }
}
