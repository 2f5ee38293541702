/*!
 * # subrelay - batched subtitle translation
 *
 * A Rust library for translating SRT subtitle files through a remote or local
 * translation backend, many lines per request.
 *
 * ## Features
 *
 * - Parse and write SRT documents in UTF-8, UTF-16 or Latin-1
 * - Pack consecutive entries into bounded batches joined by a blank-line delimiter
 * - Translate batches concurrently while keeping document order
 * - Translate with DeepL or a local Ollama server
 * - Detect entries left untranslated and repair them one by one
 * - Write results atomically, with an issues log for anything left over
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management
 * - `subtitle_processor`: SRT parsing and serialization
 * - `translation`: Batching, dispatch, repair and the pipeline driver:
 *   - `translation::core`: The `Translator` trait and retrying service
 *   - `translation::batch`: Packing and reassembly
 *   - `translation::dispatch`: Concurrent, order-preserving dispatch
 *   - `translation::repair`: Verification and repair pass
 *   - `translation::pipeline`: Stage driver for one file
 * - `file_utils`: File system operations
 * - `app_controller`: Main application controller
 * - `providers`: Client implementations for translation backends:
 *   - `providers::deepl`: DeepL API client
 *   - `providers::ollama`: Ollama API client
 *   - `providers::mock`: In-process translator for tests
 * - `errors`: Custom error types for the application
 */

// Global lints configuration
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod file_utils;
pub mod subtitle_processor;
pub mod translation;
pub mod app_controller;
pub mod providers;
pub mod errors;

// Re-export main types for easier usage
pub use app_config::Config;
pub use subtitle_processor::{SubtitleCollection, SubtitleEntry, TextEncoding};
pub use translation::{CancellationFlag, PipelineDriver, TranslationService, Translator};
pub use errors::{AppError, ProviderError, SubtitleError, TranslationError};
