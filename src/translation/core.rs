/*!
 * Core translation service implementation.
 *
 * This module defines the `Translator` seam used by the dispatcher and repair pass,
 * and the `TranslationService` that puts a configured backend behind it with a
 * bounded session pool, paced retries and exponential backoff.
 */

use anyhow::Result;
use async_trait::async_trait;
use log::{debug, info, warn};
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::app_config::{TranslationConfig, TranslationProvider as ConfigTranslationProvider};
use crate::errors::{ProviderError, TranslationError};
use crate::providers::deepl::{DeepL, DeepLRequest};
use crate::providers::ollama::{GenerationRequest, Ollama};
use crate::providers::Provider;
use super::concurrency::ProviderProfile;

/// Anything that can turn one text into its translation
///
/// Implementations must be safe to call from many tasks at once.
#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate one text
    async fn translate(&self, text: &str) -> Result<String, TranslationError>;

    /// Human readable backend name
    fn name(&self) -> String;

    /// Check that the backend is reachable
    async fn test_connection(&self) -> Result<(), TranslationError> {
        Ok(())
    }
}

#[async_trait]
impl<T: Translator + ?Sized> Translator for Arc<T> {
    async fn translate(&self, text: &str) -> Result<String, TranslationError> {
        (**self).translate(text).await
    }

    fn name(&self) -> String {
        (**self).name()
    }

    async fn test_connection(&self) -> Result<(), TranslationError> {
        (**self).test_connection().await
    }
}

/// Retry bounds and pacing for backend calls
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Backoff before the first retry, doubled per attempt
    pub backoff_base_ms: u64,
    /// Backoff ceiling
    pub max_backoff_ms: u64,
    /// Minimum pause before any retry
    pub pacing_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base_ms: 1000,
            max_backoff_ms: 30_000,
            pacing_delay_ms: 0,
        }
    }
}

impl RetryPolicy {
    /// Build the policy from the translation settings
    pub fn from_config(config: &TranslationConfig) -> Self {
        let pacing_delay_ms = config.common.rate_limit_delay_ms
            .max(ProviderProfile::pacing_delay_ms(config.get_rate_limit()));
        Self {
            max_retries: config.common.retry_count,
            backoff_base_ms: config.common.retry_backoff_ms,
            max_backoff_ms: config.common.max_backoff_ms,
            pacing_delay_ms,
        }
    }

    /// A policy that never waits, for tests
    pub fn immediate(max_retries: u32) -> Self {
        Self { max_retries, backoff_base_ms: 0, max_backoff_ms: 0, pacing_delay_ms: 0 }
    }

    /// Delay before retry number `retry` (1-based), with up to 50% random jitter
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(20);
        let backoff = self.backoff_base_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_backoff_ms);
        let jitter = if backoff > 1 {
            rand::rng().random_range(0..=backoff / 2)
        } else {
            0
        };
        Duration::from_millis((backoff + jitter).max(self.pacing_delay_ms))
    }

    /// Run `operation` until it succeeds, fails permanently, or the retry bound is hit
    ///
    /// The closure receives the zero-based attempt number. Transient provider errors are
    /// retried; anything else is returned at once. When every attempt failed the result
    /// is `TranslationExhausted` carrying the last provider error.
    pub async fn execute<F, Fut>(&self, mut operation: F) -> Result<String, TranslationError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<String, TranslationError>>,
    {
        let mut attempt = 0u32;
        loop {
            let error = match operation(attempt).await {
                Ok(text) => return Ok(text),
                Err(TranslationError::Provider(error)) if error.is_transient() => error,
                Err(other) => return Err(other),
            };

            attempt += 1;
            if attempt > self.max_retries {
                warn!("Giving up after {} attempts: {}", attempt, error);
                return Err(TranslationError::TranslationExhausted {
                    attempts: attempt,
                    last_error: error,
                });
            }

            let delay = self.backoff_for(attempt);
            debug!("Attempt {}/{} failed ({}), retrying in {:?}", attempt, self.max_retries + 1, error, delay);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Bounded pool of backend sessions
///
/// A session is held for the whole of one logical translation, retries included.
#[derive(Debug, Clone)]
pub struct SessionPool {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// A checked-out session; returned to the pool on drop, whatever the outcome
#[derive(Debug)]
pub struct SessionGuard {
    _permit: OwnedSemaphorePermit,
}

impl SessionPool {
    /// Create a pool with room for `capacity` sessions
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Wait for a free session
    pub async fn acquire(&self) -> Result<SessionGuard, TranslationError> {
        let permit = self.semaphore.clone()
            .acquire_owned()
            .await
            .map_err(|_| TranslationError::Cancelled)?;
        Ok(SessionGuard { _permit: permit })
    }

    /// Sessions not currently checked out
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Total sessions
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Translation provider implementation variants
#[derive(Debug)]
enum TranslationProviderImpl {
    /// DeepL REST API
    DeepL {
        /// Client instance
        client: DeepL,
    },

    /// Ollama LLM service
    Ollama {
        /// Client instance
        client: Ollama,
        /// Model name
        model: String,
    },
}

/// A configured backend performing one call per `translate`, with no retries
#[derive(Debug)]
pub struct ProviderBackend {
    provider: TranslationProviderImpl,
    source_language: String,
    target_language: String,
    system_prompt: String,
    temperature: f32,
}

impl ProviderBackend {
    /// Create the backend selected in the configuration
    pub fn new(config: &TranslationConfig, source_language: &str, target_language: &str) -> Result<Self> {
        let timeout_secs = config.get_timeout_secs();
        let provider = match config.provider {
            ConfigTranslationProvider::DeepL => {
                let api_key = config.get_api_key();
                if api_key.is_empty() {
                    return Err(anyhow::anyhow!("DeepL requires an API key"));
                }
                TranslationProviderImpl::DeepL {
                    client: DeepL::new(api_key, config.get_endpoint(), timeout_secs),
                }
            },
            ConfigTranslationProvider::Ollama => {
                let endpoint = url::Url::parse(&config.get_endpoint())?;
                TranslationProviderImpl::Ollama {
                    client: Ollama::new(endpoint.as_str(), timeout_secs),
                    model: config.get_model(),
                }
            },
        };

        let system_prompt = config.common.system_prompt
            .replace("{source_language}", source_language)
            .replace("{target_language}", target_language);

        Ok(Self {
            provider,
            source_language: source_language.to_string(),
            target_language: target_language.to_string(),
            system_prompt,
            temperature: config.common.temperature,
        })
    }
}

#[async_trait]
impl Translator for ProviderBackend {
    async fn translate(&self, text: &str) -> Result<String, TranslationError> {
        if text.trim().is_empty() {
            return Ok(text.to_string());
        }

        let translated = match &self.provider {
            TranslationProviderImpl::DeepL { client } => {
                let request = DeepLRequest::new(text, &self.target_language)
                    .source_lang(&self.source_language);
                let response = client.complete(request).await?;
                DeepL::extract_text(&response)
            },
            TranslationProviderImpl::Ollama { client, model } => {
                let request = GenerationRequest::new(model.as_str(), text)
                    .system(self.system_prompt.as_str())
                    .temperature(self.temperature);
                let response = client.complete(request).await?;
                Ollama::extract_text(&response)
            },
        };

        if translated.trim().is_empty() {
            return Err(ProviderError::ParseError("backend returned an empty translation".to_string()).into());
        }
        Ok(translated)
    }

    fn name(&self) -> String {
        match &self.provider {
            TranslationProviderImpl::DeepL { .. } => "DeepL".to_string(),
            TranslationProviderImpl::Ollama { model, .. } => format!("Ollama ({})", model),
        }
    }

    async fn test_connection(&self) -> Result<(), TranslationError> {
        let result = match &self.provider {
            TranslationProviderImpl::DeepL { client } => client.test_connection().await,
            TranslationProviderImpl::Ollama { client, .. } => client.test_connection().await,
        };
        result.map_err(TranslationError::from)
    }
}

/// Main translation service: a backend behind a session pool and a retry policy
pub struct TranslationService {
    /// Single-shot backend
    backend: Arc<dyn Translator>,
    /// Retry and backoff settings
    retry: RetryPolicy,
    /// Bounded backend sessions
    sessions: SessionPool,
}

impl TranslationService {
    /// Create a new translation service with the given configuration
    pub fn new(config: &TranslationConfig, source_language: &str, target_language: &str) -> Result<Self> {
        let backend = ProviderBackend::new(config, source_language, target_language)?;
        info!("Using {} for {} -> {}", backend.name(), source_language, target_language);
        Ok(Self::with_backend(
            Arc::new(backend),
            RetryPolicy::from_config(config),
            config.common.max_sessions,
        ))
    }

    /// Wrap an arbitrary backend
    pub fn with_backend(backend: Arc<dyn Translator>, retry: RetryPolicy, max_sessions: usize) -> Self {
        Self {
            backend,
            retry,
            sessions: SessionPool::new(max_sessions),
        }
    }

    /// The session pool, for inspection
    pub fn sessions(&self) -> &SessionPool {
        &self.sessions
    }

    /// The retry policy in effect
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }
}

#[async_trait]
impl Translator for TranslationService {
    async fn translate(&self, text: &str) -> Result<String, TranslationError> {
        let _session = self.sessions.acquire().await?;
        let backend = &self.backend;
        self.retry.execute(move |_attempt| backend.translate(text)).await
    }

    fn name(&self) -> String {
        self.backend.name()
    }

    async fn test_connection(&self) -> Result<(), TranslationError> {
        let _session = self.sessions.acquire().await?;
        self.backend.test_connection().await
    }
}
