/*!
 * Provider implementations for different translation services.
 *
 * This module contains client implementations for the supported backends:
 * - DeepL: DeepL REST API
 * - Ollama: Local LLM server
 * - Mock: In-process translator for tests and dry runs
 */

use async_trait::async_trait;
use std::fmt::Debug;

use crate::errors::ProviderError;

/// Common trait for all translation backends
///
/// A provider performs exactly one request per `complete` call. Retries, pacing and
/// session limits are layered on top by `translation::core::TranslationService`.
#[async_trait]
pub trait Provider: Send + Sync + Debug {
    /// The request type for this provider
    type Request: Send + Sync;

    /// The response type for this provider
    type Response: Send + Sync;

    /// Complete a request using this provider
    ///
    /// # Arguments
    /// * `request` - The request to complete
    ///
    /// # Returns
    /// * `Result<Self::Response, ProviderError>` - The response from the provider or an error
    async fn complete(&self, request: Self::Request) -> Result<Self::Response, ProviderError>;

    /// Test the connection to the provider
    async fn test_connection(&self) -> Result<(), ProviderError>;

    /// Extract text from the provider response
    fn extract_text(response: &Self::Response) -> String;
}

/// Map a non-success HTTP status to a provider error
pub(crate) fn status_error(status_code: u16, message: String) -> ProviderError {
    match status_code {
        401 | 403 => ProviderError::AuthenticationError(message),
        429 => ProviderError::RateLimitExceeded(message),
        _ => ProviderError::ApiError { status_code, message },
    }
}

/// Map a reqwest transport failure to a provider error
pub(crate) fn transport_error(error: reqwest::Error) -> ProviderError {
    if error.is_connect() || error.is_timeout() {
        ProviderError::ConnectionError(error.to_string())
    } else {
        ProviderError::RequestFailed(error.to_string())
    }
}

pub mod deepl;
pub mod ollama;
pub mod mock;
