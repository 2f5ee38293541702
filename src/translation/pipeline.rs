/*!
 * End-to-end translation of one subtitle file.
 *
 * The driver moves through a fixed sequence of stages:
 * 1. Parsing: decode and parse the source document
 * 2. Batching: pack entries into bounded texts
 * 3. Translating: dispatch batches concurrently
 * 4. Reassembling: split batches back onto entries, write the intermediate file
 * 5. Verifying: re-parse the intermediate and the source, find entries still in the source language
 * 6. Repairing: re-translate those entries one by one
 * 7. Writing: persist the final file and drop the intermediate
 */

use log::{debug, error, info, warn};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::app_config::Config;
use crate::errors::{AppError, SubtitleError};
use crate::file_utils::FileManager;
use crate::subtitle_processor::{SubtitleCollection, SubtitleEntry, TextEncoding};

use super::batch::{self, BatchFailure, DEFAULT_LENGTH_LIMIT};
use super::concurrency::ProviderProfile;
use super::core::Translator;
use super::dispatch::{dispatch_all, CancellationFlag};
use super::repair::{find_repair_candidates, repair_candidates, RepairConfig};

/// Where the driver currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Idle,
    Parsing,
    Batching,
    Translating,
    Reassembling,
    Verifying,
    Repairing,
    Writing,
    Done,
    Failed,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Parsing => "parsing",
            Self::Batching => "batching",
            Self::Translating => "translating",
            Self::Reassembling => "reassembling",
            Self::Verifying => "verifying",
            Self::Repairing => "repairing",
            Self::Writing => "writing",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Receives progress from a running pipeline
///
/// Percentages restart at 0 for every dispatch phase (the batch pass and each repair round).
pub trait ProgressObserver: Send + Sync {
    /// Percentage of the current phase completed
    fn on_progress(&self, _percent: u8) {}

    /// Human readable description of what is happening
    fn on_status(&self, _message: &str) {}
}

/// Observer that ignores everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {}

/// Something the user should know about a finished run
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineWarning {
    /// A batch fell back to source text and went through repair
    BatchFallback {
        /// Position of the batch in dispatch order
        batch_index: usize,
        /// First sequence number in the batch
        first_seq: usize,
        /// Last sequence number in the batch
        last_seq: usize,
        /// Why the batch could not be used
        reason: String,
    },
    /// An entry is still untranslated after every repair round
    RepairExhausted {
        /// Sequence number of the entry
        seq_num: usize,
        /// Source text that could not be translated
        text: String,
    },
}

impl fmt::Display for PipelineWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BatchFallback { batch_index, first_seq, last_seq, reason } => write!(
                f,
                "Batch {} (entries {}-{}) fell back to per-entry repair: {}",
                batch_index + 1, first_seq, last_seq, reason
            ),
            Self::RepairExhausted { seq_num, text } => {
                write!(f, "Entry {} left untranslated: {:?}", seq_num, text)
            },
        }
    }
}

/// Settings for one pipeline run
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    /// Encoding of the source document
    pub encoding: TextEncoding,
    /// Packed batch length limit, in characters
    pub max_chars_per_batch: usize,
    /// Parallel batch calls
    pub batch_concurrency: usize,
    /// Repair pass settings
    pub repair: RepairConfig,
    /// Suffix of the final file name
    pub output_suffix: String,
    /// Suffix of the intermediate file name
    pub intermediate_suffix: String,
    /// Keep the intermediate file after success
    pub keep_intermediate: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            encoding: TextEncoding::Utf8,
            max_chars_per_batch: DEFAULT_LENGTH_LIMIT,
            batch_concurrency: 10,
            repair: RepairConfig::default(),
            output_suffix: " zh.srt".to_string(),
            intermediate_suffix: ".m.srt".to_string(),
            keep_intermediate: false,
        }
    }
}

impl PipelineOptions {
    /// Derive run settings from the application config
    pub fn from_config(config: &Config, encoding: TextEncoding) -> Self {
        let batching = &config.translation.batching;
        let profile = ProviderProfile::for_provider(config.translation.provider);
        Self {
            encoding,
            max_chars_per_batch: batching.max_chars_per_batch,
            batch_concurrency: profile.effective_batch_concurrency(batching),
            repair: RepairConfig {
                concurrency: profile.effective_repair_concurrency(batching),
                rounds: batching.repair_rounds,
                skip_non_alphabetic: batching.skip_non_alphabetic,
            },
            output_suffix: config.output.output_suffix.clone(),
            intermediate_suffix: config.output.intermediate_suffix.clone(),
            keep_intermediate: config.output.keep_intermediate,
        }
    }

    /// Final file path for an input
    pub fn output_path(&self, input: &Path, output_dir: &Path) -> PathBuf {
        FileManager::generate_output_path(input, output_dir, &self.output_suffix)
    }

    /// Intermediate file path for an input
    pub fn intermediate_path(&self, input: &Path, output_dir: &Path) -> PathBuf {
        FileManager::generate_output_path(input, output_dir, &self.intermediate_suffix)
    }
}

/// Summary of a successful run
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineReport {
    /// Final subtitle file
    pub output_path: PathBuf,
    /// Intermediate file, when it was kept
    pub intermediate_path: Option<PathBuf>,
    /// Entries in the document
    pub entry_count: usize,
    /// Batches dispatched
    pub batch_count: usize,
    /// Entries found untranslated after reassembly
    pub repair_candidates: usize,
    /// Entries fixed by the repair pass
    pub repaired: usize,
    /// Things the user should know about
    pub warnings: Vec<PipelineWarning>,
    /// Wall time of the run
    pub duration: Duration,
}

impl PipelineReport {
    /// Whether every entry ended up translated
    pub fn is_clean(&self) -> bool {
        !self.warnings.iter().any(|w| matches!(w, PipelineWarning::RepairExhausted { .. }))
    }
}

fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        100
    } else {
        ((done * 100) / total).min(100) as u8
    }
}

/// Runs the stages for one file
pub struct PipelineDriver {
    translator: Arc<dyn Translator>,
    options: PipelineOptions,
    observer: Arc<dyn ProgressObserver>,
    cancel: CancellationFlag,
    stage: PipelineStage,
}

impl PipelineDriver {
    /// Create a driver with no observer and its own cancellation flag
    pub fn new(translator: Arc<dyn Translator>, options: PipelineOptions) -> Self {
        Self {
            translator,
            options,
            observer: Arc::new(NoopObserver),
            cancel: CancellationFlag::new(),
            stage: PipelineStage::Idle,
        }
    }

    /// Report progress to `observer`
    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Share a cancellation flag with the caller
    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Stage of the current or last run
    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    /// Settings in effect
    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    fn enter(&mut self, stage: PipelineStage) {
        debug!("Pipeline stage: {} -> {}", self.stage, stage);
        self.stage = stage;
    }

    fn status(&self, message: &str) {
        info!("{}", message);
        self.observer.on_status(message);
    }

    /// Translate `input` and write the result into `output_dir`
    ///
    /// On failure the stage is left at `Failed`; an intermediate file already written
    /// stays on disk.
    pub async fn run(&mut self, input: &Path, output_dir: &Path) -> Result<PipelineReport, AppError> {
        match self.run_stages(input, output_dir).await {
            Ok(report) => {
                self.enter(PipelineStage::Done);
                Ok(report)
            },
            Err(e) => {
                error!("Translation of {} failed during {}: {}", input.display(), self.stage, e);
                self.enter(PipelineStage::Failed);
                Err(e)
            },
        }
    }

    async fn run_stages(&mut self, input: &Path, output_dir: &Path) -> Result<PipelineReport, AppError> {
        let start_time = Instant::now();
        let mut warnings = Vec::new();

        self.enter(PipelineStage::Parsing);
        self.cancel.check()?;
        let bytes = std::fs::read(input)
            .map_err(|e| AppError::File(format!("Failed to read {}: {}", input.display(), e)))?;
        let source_entries = SubtitleCollection::parse_document(&bytes, self.options.encoding)?;
        self.status(&format!("Parsed {} entries from {}", source_entries.len(), input.display()));

        self.enter(PipelineStage::Batching);
        let batches = batch::pack(&source_entries, self.options.max_chars_per_batch);
        let units: Vec<String> = batches.iter().map(|b| b.packed_text.clone()).collect();

        self.enter(PipelineStage::Translating);
        self.status(&format!("Translating {} batches with {}", batches.len(), self.translator.name()));
        self.observer.on_progress(0);
        let observer = Arc::clone(&self.observer);
        let results = dispatch_all(
            &units,
            self.translator.as_ref(),
            self.options.batch_concurrency,
            &self.cancel,
            move |done, total| observer.on_progress(percent(done, total)),
        ).await?;

        self.enter(PipelineStage::Reassembling);
        let reassembly = batch::reassemble(&source_entries, &batches, results);
        for failure in &reassembly.failures {
            let warning = fallback_warning(&source_entries, failure);
            warn!("{}", warning);
            warnings.push(warning);
        }
        let intermediate_path = self.options.intermediate_path(input, output_dir);
        FileManager::write_atomic(&intermediate_path, &SubtitleCollection::serialize_entries(&reassembly.entries))
            .map_err(|e| AppError::File(format!("{:#}", e)))?;
        debug!("Wrote intermediate file {}", intermediate_path.display());

        self.enter(PipelineStage::Verifying);
        self.cancel.check()?;
        let intermediate_text = FileManager::read_to_string(&intermediate_path)
            .map_err(|e| AppError::File(format!("{:#}", e)))?;
        let translated_entries = SubtitleCollection::parse_srt_string(&intermediate_text)?;
        // Both sides are compared as parsed from their documents
        let source_entries = SubtitleCollection::parse_document(&bytes, self.options.encoding)?;
        if translated_entries.len() != source_entries.len() {
            return Err(SubtitleError::EntryCountMismatch {
                expected: source_entries.len(),
                actual: translated_entries.len(),
            }.into());
        }
        let candidates = find_repair_candidates(
            &source_entries,
            &translated_entries,
            self.options.repair.skip_non_alphabetic,
        )?;
        let candidate_count = candidates.len();

        self.enter(PipelineStage::Repairing);
        if candidate_count > 0 {
            self.status(&format!("Repairing {} untranslated entries", candidate_count));
            self.observer.on_progress(0);
        }
        let observer = Arc::clone(&self.observer);
        let outcome = repair_candidates(
            translated_entries,
            candidates,
            self.translator.as_ref(),
            &self.options.repair,
            &self.cancel,
            move |done, total| observer.on_progress(percent(done, total)),
        ).await?;
        for candidate in &outcome.exhausted {
            let warning = PipelineWarning::RepairExhausted {
                seq_num: candidate.seq_num,
                text: candidate.source_text.clone(),
            };
            warn!("{}", warning);
            warnings.push(warning);
        }

        self.enter(PipelineStage::Writing);
        self.cancel.check()?;
        let output_path = self.options.output_path(input, output_dir);
        FileManager::write_atomic(&output_path, &SubtitleCollection::serialize_entries(&outcome.entries))
            .map_err(|e| AppError::File(format!("{:#}", e)))?;

        let intermediate_path = if self.options.keep_intermediate {
            Some(intermediate_path)
        } else {
            FileManager::remove_file_if_exists(&intermediate_path)
                .map_err(|e| AppError::File(format!("{:#}", e)))?;
            None
        };

        self.observer.on_progress(100);
        self.status(&format!(
            "Wrote {} ({} entries, {} repaired, {} warnings)",
            output_path.display(), outcome.entries.len(), outcome.repaired, warnings.len()
        ));

        Ok(PipelineReport {
            output_path,
            intermediate_path,
            entry_count: source_entries.len(),
            batch_count: batches.len(),
            repair_candidates: candidate_count,
            repaired: outcome.repaired,
            warnings,
            duration: start_time.elapsed(),
        })
    }
}

fn fallback_warning(entries: &[SubtitleEntry], failure: &BatchFailure) -> PipelineWarning {
    let seq_of = |index: usize| entries.get(index).map(|e| e.seq_num).unwrap_or(index + 1);
    PipelineWarning::BatchFallback {
        batch_index: failure.batch_index,
        first_seq: seq_of(failure.entry_range.start),
        last_seq: seq_of(failure.entry_range.end.saturating_sub(1)),
        reason: failure.error.to_string(),
    }
}
