/*!
 * Batched, concurrent subtitle translation.
 *
 * This module contains the translation machinery, split into several submodules:
 *
 * - `core`: The `Translator` seam and the retrying, session-bounded service
 * - `batch`: Packing entries into delimited texts and splitting them back
 * - `dispatch`: Order-preserving concurrent dispatch with cancellation
 * - `repair`: Finding and re-translating entries left in the source language
 * - `pipeline`: The per-file stage driver tying it all together
 * - `concurrency`: Provider-specific concurrency limits
 */

// Re-export main types for easier usage
pub use self::core::{RetryPolicy, TranslationService, Translator};
pub use self::dispatch::{dispatch_all, CancellationFlag, TranslationResult};
pub use self::pipeline::{
    NoopObserver, PipelineDriver, PipelineOptions, PipelineReport, PipelineStage, PipelineWarning,
    ProgressObserver,
};
pub use self::repair::{verify_and_repair, RepairCandidate, RepairConfig, RepairOutcome};

// Submodules
pub mod batch;
pub mod concurrency;
pub mod core;
pub mod dispatch;
pub mod pipeline;
pub mod repair;
