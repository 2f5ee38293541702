/*!
 * Tests for application configuration
 */

use anyhow::Result;
use subrelay::app_config::{Config, LogLevel, TranslationProvider};
use crate::common;

/// Defaults match the documented behavior
#[test]
fn test_default_config_shouldUseDocumentedDefaults() {
    let config = Config::default();

    assert_eq!(config.source_language, "auto");
    assert_eq!(config.target_language, "zh");
    assert_eq!(config.translation.provider, TranslationProvider::DeepL);
    assert_eq!(config.translation.batching.max_chars_per_batch, 1400);
    assert_eq!(config.translation.batching.batch_concurrency, 10);
    assert_eq!(config.translation.batching.repair_concurrency, 20);
    assert_eq!(config.output.output_suffix, " zh.srt");
    assert_eq!(config.output.intermediate_suffix, ".m.srt");
    assert!(!config.output.keep_intermediate);
}

/// A missing file is created with defaults, then loaded back
#[test]
fn test_load_or_create_withMissingFile_shouldCreateThenLoad() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = temp_dir.path().join("conf.json");

    let (created, was_created) = Config::load_or_create(&path)?;
    assert!(was_created);
    assert!(path.exists());

    let (loaded, was_created) = Config::load_or_create(&path)?;
    assert!(!was_created);
    assert_eq!(loaded.target_language, created.target_language);
    assert_eq!(loaded.translation.available_providers.len(), 2);
    Ok(())
}

/// Partial files are completed with defaults
#[test]
fn test_load_or_create_withPartialFile_shouldFillDefaults() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = common::create_test_file(
        temp_dir.path(),
        "conf.json",
        r#"{
            "target_language": "de",
            "log_level": "debug",
            "translation": {
                "provider": "ollama",
                "batching": { "max_chars_per_batch": 900 }
            }
        }"#,
    )?;

    let (config, _) = Config::load_or_create(&path)?;

    assert_eq!(config.target_language, "de");
    assert_eq!(config.log_level, LogLevel::Debug);
    assert_eq!(config.translation.provider, TranslationProvider::Ollama);
    assert_eq!(config.translation.batching.max_chars_per_batch, 900);
    assert_eq!(config.translation.batching.repair_rounds, 2);
    assert_eq!(config.translation.get_model(), "llama3.2:3b");
    assert_eq!(config.translation.get_endpoint(), "http://localhost:11434");
    assert!(config.validate().is_ok());
    Ok(())
}

/// Invalid JSON is reported, not replaced
#[test]
fn test_load_or_create_withInvalidJson_shouldFail() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = common::create_test_file(temp_dir.path(), "conf.json", "{ not json")?;

    assert!(Config::load_or_create(&path).is_err());
    assert_eq!(std::fs::read_to_string(&path)?, "{ not json");
    Ok(())
}

/// Validation rejects settings the pipeline cannot run with
#[test]
fn test_validate_shouldRejectUnusableSettings() {
    let mut config = Config::default();
    assert!(config.validate().is_err(), "DeepL without a key");

    config.translation.active_provider_config_mut().api_key = "key".to_string();
    assert!(config.validate().is_ok());

    let mut zero_limit = config.clone();
    zero_limit.translation.batching.max_chars_per_batch = 0;
    assert!(zero_limit.validate().is_err());

    let mut same_suffix = config.clone();
    same_suffix.output.intermediate_suffix = same_suffix.output.output_suffix.clone();
    assert!(same_suffix.validate().is_err());

    let mut no_target = config.clone();
    no_target.target_language = "  ".to_string();
    assert!(no_target.validate().is_err());
}

/// Provider names parse case-insensitively
#[test]
fn test_translation_provider_from_str_shouldIgnoreCase() {
    assert_eq!("DeepL".parse::<TranslationProvider>().unwrap(), TranslationProvider::DeepL);
    assert_eq!("OLLAMA".parse::<TranslationProvider>().unwrap(), TranslationProvider::Ollama);
    assert!("openai".parse::<TranslationProvider>().is_err());
}

/// Editing the active provider inserts it when missing
#[test]
fn test_active_provider_config_mut_withEmptyList_shouldInsertDefaults() {
    let mut config = Config::default();
    config.translation.available_providers.clear();
    config.translation.provider = TranslationProvider::Ollama;

    config.translation.active_provider_config_mut().model = "qwen2.5:7b".to_string();

    assert_eq!(config.translation.available_providers.len(), 1);
    assert_eq!(config.translation.get_model(), "qwen2.5:7b");
}
