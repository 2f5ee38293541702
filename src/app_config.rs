use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::default::Default;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::file_utils::FileManager;

/// Application configuration module
/// This module handles the application configuration including loading,
/// validating and saving configuration settings.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Source language code, "auto" lets the backend detect it
    #[serde(default = "default_source_language")]
    pub source_language: String,

    /// Target language code
    #[serde(default = "default_target_language")]
    pub target_language: String,

    /// Translation config
    #[serde(default)]
    pub translation: TranslationConfig,

    /// Output naming
    #[serde(default)]
    pub output: OutputConfig,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Translation provider type
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TranslationProvider {
    // @provider: DeepL HTTP API
    #[default]
    DeepL,
    // @provider: Ollama local LLM server
    Ollama,
}

impl TranslationProvider {
    // @returns: Lowercase provider identifier
    pub fn to_lowercase_string(&self) -> String {
        match self {
            Self::DeepL => "deepl".to_string(),
            Self::Ollama => "ollama".to_string(),
        }
    }
}

impl std::fmt::Display for TranslationProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_lowercase_string())
    }
}

impl std::str::FromStr for TranslationProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "deepl" => Ok(Self::DeepL),
            "ollama" => Ok(Self::Ollama),
            _ => Err(anyhow!("Invalid provider type: {}", s)),
        }
    }
}

/// Provider configuration wrapper
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProviderConfig {
    // @field: Provider type identifier
    #[serde(rename = "type")]
    pub provider_type: String,

    // @field: Model name (LLM providers only)
    #[serde(default = "String::new")]
    pub model: String,

    // @field: API key
    #[serde(default = "String::new")]
    pub api_key: String,

    // @field: Service URL
    #[serde(default = "String::new")]
    pub endpoint: String,

    // @field: Timeout seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    // @field: Rate limit (requests per minute)
    #[serde(default)]
    pub rate_limit: Option<u32>,
}

impl ProviderConfig {
    // @param provider_type: Provider enum
    // @returns: Provider config with defaults
    pub fn new(provider_type: TranslationProvider) -> Self {
        match provider_type {
            TranslationProvider::DeepL => Self {
                provider_type: "deepl".to_string(),
                model: String::new(),
                api_key: String::new(),
                endpoint: default_deepl_endpoint(),
                timeout_secs: default_timeout_secs(),
                rate_limit: None,
            },
            TranslationProvider::Ollama => Self {
                provider_type: "ollama".to_string(),
                model: default_ollama_model(),
                api_key: String::new(),
                endpoint: default_ollama_endpoint(),
                timeout_secs: default_ollama_timeout_secs(),
                rate_limit: None,
            },
        }
    }
}

/// Batch sizing and pool widths
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BatchingConfig {
    /// Maximum characters in one packed batch
    #[serde(default = "default_max_chars_per_batch")]
    pub max_chars_per_batch: usize,

    /// Concurrent batch-level translate calls
    #[serde(default = "default_batch_concurrency")]
    pub batch_concurrency: usize,

    /// Concurrent entry-level repair calls
    #[serde(default = "default_repair_concurrency")]
    pub repair_concurrency: usize,

    /// How many times unchanged entries are re-dispatched
    #[serde(default = "default_repair_rounds")]
    pub repair_rounds: usize,

    /// Leave entries with no letters (numbers, symbols) out of the repair pass
    #[serde(default = "default_true")]
    pub skip_non_alphabetic: bool,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            max_chars_per_batch: default_max_chars_per_batch(),
            batch_concurrency: default_batch_concurrency(),
            repair_concurrency: default_repair_concurrency(),
            repair_rounds: default_repair_rounds(),
            skip_non_alphabetic: true,
        }
    }
}

/// Translation service configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TranslationConfig {
    /// Translation provider to use
    #[serde(default)]
    pub provider: TranslationProvider,

    /// Available translation providers
    #[serde(default)]
    pub available_providers: Vec<ProviderConfig>,

    /// Batching settings
    #[serde(default)]
    pub batching: BatchingConfig,

    /// Common translation settings
    #[serde(default)]
    pub common: TranslationCommonConfig,
}

/// Common translation settings applicable to all providers
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TranslationCommonConfig {
    /// System prompt template for LLM providers
    /// Placeholders: {source_language}, {target_language}
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Rate limit delay in milliseconds between retry attempts
    #[serde(default = "default_rate_limit_delay_ms")]
    pub rate_limit_delay_ms: u64,

    /// Retry count for failed requests
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Base backoff for retries (in milliseconds), doubled per attempt
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Backoff ceiling in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Concurrent sessions the backend may hold open
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Temperature parameter for LLM providers (0.0 to 1.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for TranslationCommonConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            rate_limit_delay_ms: default_rate_limit_delay_ms(),
            retry_count: default_retry_count(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            max_sessions: default_max_sessions(),
            temperature: default_temperature(),
        }
    }
}

/// Output file naming
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OutputConfig {
    /// Appended to the input stem to name the final document
    #[serde(default = "default_output_suffix")]
    pub output_suffix: String,

    /// Appended to the input stem to name the checkpoint written after batch translation
    #[serde(default = "default_intermediate_suffix")]
    pub intermediate_suffix: String,

    /// Keep the checkpoint after a successful run
    #[serde(default)]
    pub keep_intermediate: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_suffix: default_output_suffix(),
            intermediate_suffix: default_intermediate_suffix(),
            keep_intermediate: false,
        }
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    // @returns: Matching log crate filter
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

fn default_source_language() -> String {
    "auto".to_string()
}

fn default_target_language() -> String {
    "zh".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_chars_per_batch() -> usize {
    1400
}

fn default_batch_concurrency() -> usize {
    10
}

fn default_repair_concurrency() -> usize {
    20
}

fn default_repair_rounds() -> usize {
    2
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_ollama_timeout_secs() -> u64 {
    120
}

fn default_deepl_endpoint() -> String {
    "https://api-free.deepl.com".to_string()
}

fn default_ollama_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "llama3.2:3b".to_string()
}

fn default_system_prompt() -> String {
    "You are a subtitle translator. Translate the user's text from {source_language} to {target_language}. \
     Keep every line break exactly where it is, including runs of blank lines. \
     Reply with the translation only."
        .to_string()
}

fn default_rate_limit_delay_ms() -> u64 {
    0
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_max_sessions() -> usize {
    20
}

fn default_temperature() -> f32 {
    0.3
}

fn default_output_suffix() -> String {
    " zh.srt".to_string()
}

fn default_intermediate_suffix() -> String {
    ".m.srt".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_language: default_source_language(),
            target_language: default_target_language(),
            translation: TranslationConfig::default(),
            output: OutputConfig::default(),
            log_level: LogLevel::default(),
        }
    }
}

impl Config {
    /// Load the configuration file, or write a default one when it is missing
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<(Self, bool)> {
        let path = path.as_ref();
        if path.exists() {
            let file = File::open(path)
                .with_context(|| format!("Failed to open config file: {}", path.display()))?;
            let config: Config = serde_json::from_reader(BufReader::new(file))
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            return Ok((config, false));
        }

        let config = Config::default();
        let config_json = serde_json::to_string_pretty(&config)
            .context("Failed to serialize default config to JSON")?;
        FileManager::write_to_file(path, &config_json)
            .with_context(|| format!("Failed to write default config to file: {}", path.display()))?;

        Ok((config, true))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.target_language.trim().is_empty() {
            return Err(anyhow!("Target language must not be empty"));
        }
        if self.source_language.trim().is_empty() {
            return Err(anyhow!("Source language must not be empty, use \"auto\" for detection"));
        }

        let batching = &self.translation.batching;
        if batching.max_chars_per_batch == 0 {
            return Err(anyhow!("max_chars_per_batch must be at least 1"));
        }
        if batching.batch_concurrency == 0 || batching.repair_concurrency == 0 {
            return Err(anyhow!("Concurrency settings must be at least 1"));
        }
        if self.translation.common.max_sessions == 0 {
            return Err(anyhow!("max_sessions must be at least 1"));
        }

        if self.output.output_suffix.is_empty() {
            return Err(anyhow!("output_suffix must not be empty"));
        }
        if self.output.output_suffix == self.output.intermediate_suffix {
            return Err(anyhow!("output_suffix and intermediate_suffix must differ"));
        }

        match self.translation.provider {
            TranslationProvider::DeepL => {
                if self.translation.get_api_key().is_empty() {
                    return Err(anyhow!("DeepL requires an API key in the provider configuration"));
                }
            },
            TranslationProvider::Ollama => {
                if self.translation.get_model().is_empty() {
                    return Err(anyhow!("Ollama requires a model name"));
                }
            },
        }

        Ok(())
    }
}

impl TranslationConfig {
    /// Get the configuration of the active provider
    pub fn get_active_provider_config(&self) -> Option<&ProviderConfig> {
        self.get_provider_config(&self.provider)
    }

    /// Get a specific provider configuration by type
    pub fn get_provider_config(&self, provider_type: &TranslationProvider) -> Option<&ProviderConfig> {
        let provider_str = provider_type.to_lowercase_string();
        self.available_providers.iter()
            .find(|p| p.provider_type == provider_str)
    }

    /// Mutable access to the active provider, inserting defaults if it is not listed
    pub fn active_provider_config_mut(&mut self) -> &mut ProviderConfig {
        let provider_str = self.provider.to_lowercase_string();
        let position = match self.available_providers.iter().position(|p| p.provider_type == provider_str) {
            Some(position) => position,
            None => {
                self.available_providers.push(ProviderConfig::new(self.provider));
                self.available_providers.len() - 1
            },
        };
        &mut self.available_providers[position]
    }

    /// Get the model for the active provider
    pub fn get_model(&self) -> String {
        if let Some(provider_config) = self.get_active_provider_config() {
            if !provider_config.model.is_empty() {
                return provider_config.model.clone();
            }
        }

        match self.provider {
            TranslationProvider::DeepL => String::new(),
            TranslationProvider::Ollama => default_ollama_model(),
        }
    }

    /// Get the API key for the active provider
    pub fn get_api_key(&self) -> String {
        self.get_active_provider_config()
            .map(|p| p.api_key.clone())
            .unwrap_or_default()
    }

    /// Get the endpoint for the active provider
    pub fn get_endpoint(&self) -> String {
        if let Some(provider_config) = self.get_active_provider_config() {
            if !provider_config.endpoint.is_empty() {
                return provider_config.endpoint.clone();
            }
        }

        match self.provider {
            TranslationProvider::DeepL => default_deepl_endpoint(),
            TranslationProvider::Ollama => default_ollama_endpoint(),
        }
    }

    /// Get the request timeout for the active provider
    pub fn get_timeout_secs(&self) -> u64 {
        self.get_active_provider_config()
            .map(|p| p.timeout_secs)
            .unwrap_or_else(default_timeout_secs)
    }

    /// Get the rate limit for the active provider
    pub fn get_rate_limit(&self) -> Option<u32> {
        self.get_active_provider_config().and_then(|p| p.rate_limit)
    }
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            provider: TranslationProvider::default(),
            available_providers: vec![
                ProviderConfig::new(TranslationProvider::DeepL),
                ProviderConfig::new(TranslationProvider::Ollama),
            ],
            batching: BatchingConfig::default(),
            common: TranslationCommonConfig::default(),
        }
    }
}
