/*!
 * Provider-specific concurrency tuning.
 *
 * Configured concurrency is an upper bound the user asks for; the profile caps it at
 * what the backend tolerates. A local Ollama server serializes generation on one GPU,
 * so dozens of parallel requests only queue up and time out.
 */

use crate::app_config::{BatchingConfig, TranslationProvider};

/// Provider-specific concurrency profile with tuned limits
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderProfile {
    /// Maximum concurrent batch requests
    pub max_batch_concurrency: usize,
    /// Maximum concurrent single-entry repair requests
    pub max_repair_concurrency: usize,
    /// Target requests per minute, when the service publishes one
    pub target_rpm: Option<u32>,
}

impl ProviderProfile {
    /// Get the profile for a given provider
    pub fn for_provider(provider: TranslationProvider) -> Self {
        match provider {
            TranslationProvider::DeepL => Self {
                max_batch_concurrency: 10,
                max_repair_concurrency: 20,
                target_rpm: None,
            },
            TranslationProvider::Ollama => Self {
                max_batch_concurrency: 4,
                max_repair_concurrency: 8,
                target_rpm: None,
            },
        }
    }

    /// Batch concurrency after capping the configured value
    pub fn effective_batch_concurrency(&self, batching: &BatchingConfig) -> usize {
        batching.batch_concurrency.min(self.max_batch_concurrency).max(1)
    }

    /// Repair concurrency after capping the configured value
    pub fn effective_repair_concurrency(&self, batching: &BatchingConfig) -> usize {
        batching.repair_concurrency.min(self.max_repair_concurrency).max(1)
    }

    /// Minimum delay between calls implied by a requests-per-minute limit
    pub fn pacing_delay_ms(rate_limit: Option<u32>) -> u64 {
        match rate_limit {
            Some(rpm) if rpm > 0 => 60_000 / rpm as u64,
            _ => 0,
        }
    }
}
