use anyhow::{anyhow, Result};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::{debug, error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::app_config::Config;
use crate::file_utils::FileManager;
use crate::subtitle_processor::TextEncoding;
use crate::translation::{
    CancellationFlag, PipelineDriver, PipelineOptions, PipelineReport, ProgressObserver,
    TranslationService, Translator,
};

// @module: Application controller for subtitle processing

/// Name of the log file collecting per-run warnings, written beside the outputs
pub const ISSUES_LOG_FILE: &str = "subrelay.issues.log";

/// What happened to one input file
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The file was translated
    Translated(PipelineReport),
    /// The output already existed and overwriting was not requested
    Skipped(PathBuf),
}

/// Counts from a folder run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FolderSummary {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Progress bar driven by pipeline events
struct IndicatifObserver {
    bar: ProgressBar,
}

impl IndicatifObserver {
    fn new(multi_progress: &MultiProgress, file_name: &str) -> Self {
        let bar = multi_progress.add(ProgressBar::new(100));
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {prefix} {msg}")
            .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}% {msg}"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style.progress_chars("█▓▒░"));
        bar.set_prefix(file_name.to_string());
        Self { bar }
    }
}

impl ProgressObserver for IndicatifObserver {
    fn on_progress(&self, percent: u8) {
        self.bar.set_position(percent as u64);
    }

    fn on_status(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }
}

/// Main application controller for subtitle translation
pub struct Controller {
    // @field: App configuration
    config: Config,
    // @field: Shared translator for every file of the run
    translator: Arc<dyn Translator>,
    // @field: Raised on Ctrl+C
    cancel: CancellationFlag,
    // @field: Encoding of input documents
    encoding: TextEncoding,
}

impl Controller {
    // @method: Create a new controller with the given configuration
    pub fn with_config(config: Config) -> Result<Self> {
        let service = TranslationService::new(
            &config.translation,
            &config.source_language,
            &config.target_language,
        )?;
        Ok(Self::with_translator(config, Arc::new(service)))
    }

    /// Create a controller around an existing translator
    pub fn with_translator(config: Config, translator: Arc<dyn Translator>) -> Self {
        Self {
            config,
            translator,
            cancel: CancellationFlag::new(),
            encoding: TextEncoding::Utf8,
        }
    }

    /// Share a cancellation flag with the caller
    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Decode inputs with `encoding`
    pub fn with_encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// The configuration in use
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Check that the translation backend answers
    pub async fn test_connection(&self) -> Result<()> {
        self.translator.test_connection().await
            .map_err(|e| anyhow!("Failed to connect to {}: {}", self.translator.name(), e))
    }

    /// Translate one subtitle file into `output_dir`
    pub async fn run(&self, input_file: PathBuf, output_dir: PathBuf, force_overwrite: bool) -> Result<RunOutcome> {
        let multi_progress = MultiProgress::new();
        self.run_with_progress(&input_file, &output_dir, &multi_progress, force_overwrite).await
    }

    async fn run_with_progress(
        &self,
        input_file: &Path,
        output_dir: &Path,
        multi_progress: &MultiProgress,
        force_overwrite: bool,
    ) -> Result<RunOutcome> {
        if !FileManager::file_exists(input_file) {
            return Err(anyhow!("Input file does not exist: {:?}", input_file));
        }
        FileManager::ensure_dir(output_dir)?;

        let options = PipelineOptions::from_config(&self.config, self.encoding);
        let output_path = options.output_path(input_file, output_dir);
        if output_path.exists() && !force_overwrite {
            warn!("Skipping {}, translation already exists (use -f to force overwrite)", input_file.display());
            return Ok(RunOutcome::Skipped(output_path));
        }

        let file_name = input_file.file_name()
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let observer = Arc::new(IndicatifObserver::new(multi_progress, &file_name));

        let mut driver = PipelineDriver::new(Arc::clone(&self.translator), options)
            .with_observer(observer.clone())
            .with_cancellation(self.cancel.clone());

        let result = driver.run(input_file, output_dir).await;
        match &result {
            Ok(_) => observer.bar.finish_with_message("done"),
            Err(_) => observer.bar.abandon_with_message(format!("failed ({})", driver.stage())),
        }
        let report = result?;

        if !report.warnings.is_empty() {
            self.write_issues_log(output_dir, input_file, &report);
        }
        info!(
            "Success: {} in {}",
            report.output_path.display(),
            Self::format_duration(report.duration)
        );

        Ok(RunOutcome::Translated(report))
    }

    /// Append a run's warnings to the issues log; failures to log are only reported
    fn write_issues_log(&self, output_dir: &Path, input_file: &Path, report: &PipelineReport) {
        let log_path = output_dir.join(ISSUES_LOG_FILE);
        let mut content = format!("{} ({} warnings)", input_file.display(), report.warnings.len());
        for warning in &report.warnings {
            content.push_str("\n    ");
            content.push_str(&warning.to_string());
        }

        match FileManager::append_to_log_file(&log_path, &content) {
            Ok(()) => warn!("{} issues written to {}", report.warnings.len(), log_path.display()),
            Err(e) => warn!("Failed to write issues log: {}", e),
        }
    }

    // Format duration in a human-readable format
    fn format_duration(duration: std::time::Duration) -> String {
        let total_seconds = duration.as_secs();
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}.{:03}s", seconds, duration.subsec_millis())
        }
    }

    /// Whether a subtitle file is one of our own outputs
    ///
    /// A file counts as generated only when its name is a sibling input's stem plus
    /// one of `suffixes`, so `lecture.m.srt` with no `lecture.srt` beside it is an input.
    fn is_generated_file(path: &Path, all_files: &[PathBuf], suffixes: &[&str]) -> bool {
        let name = match path.file_name() {
            Some(name) => name.to_string_lossy(),
            None => return false,
        };

        suffixes.iter()
            .filter_map(|suffix| name.strip_suffix(suffix))
            .any(|stem| {
                all_files.iter().any(|other| {
                    other != path
                        && other.parent() == path.parent()
                        && other.file_stem().is_some_and(|s| s.to_string_lossy() == stem)
                })
            })
    }

    /// Translate every subtitle file under `input_dir`, writing each result beside its input
    ///
    /// Files whose translation already exists are skipped unless `force_overwrite` is set.
    /// A failing file does not stop the run; cancellation does.
    pub async fn run_folder(&self, input_dir: PathBuf, force_overwrite: bool) -> Result<FolderSummary> {
        let start_time = Instant::now();

        if !FileManager::dir_exists(&input_dir) {
            return Err(anyhow!("Input directory does not exist: {:?}", input_dir));
        }

        let all_files = FileManager::find_files(&input_dir, "srt")?;
        let suffixes = [
            self.config.output.output_suffix.as_str(),
            self.config.output.intermediate_suffix.as_str(),
        ];
        let subtitle_files: Vec<PathBuf> = all_files.iter()
            .filter(|path| {
                let generated = Self::is_generated_file(path, &all_files, &suffixes);
                if generated {
                    debug!("Skipping generated file: {}", path.display());
                }
                !generated
            })
            .cloned()
            .collect();
        if subtitle_files.is_empty() {
            return Err(anyhow!("No subtitle files found in directory: {:?}", input_dir));
        }

        let multi_progress = MultiProgress::new();
        let folder_pb = multi_progress.add(ProgressBar::new(subtitle_files.len() as u64));
        let template_result = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files ({percent}%) {msg} {eta}")
            .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({percent}%) {msg}"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        folder_pb.set_style(template_result.progress_chars("█▓▒░"));
        folder_pb.set_message("Processing files");

        let mut summary = FolderSummary::default();
        for subtitle_file in &subtitle_files {
            if self.cancel.is_cancelled() {
                folder_pb.abandon_with_message("Cancelled");
                return Err(anyhow!("Folder processing cancelled"));
            }

            let output_dir = subtitle_file.parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| input_dir.clone());

            match self.run_with_progress(subtitle_file, &output_dir, &multi_progress, force_overwrite).await {
                Ok(RunOutcome::Translated(_)) => summary.processed += 1,
                Ok(RunOutcome::Skipped(_)) => summary.skipped += 1,
                Err(e) => {
                    error!("Error processing file {}: {}", subtitle_file.display(), e);
                    summary.failed += 1;
                },
            }
            folder_pb.inc(1);
        }

        folder_pb.finish_with_message("Folder processing complete");
        info!(
            "Folder processing completed: {} processed, {} skipped, {} errors in {}",
            summary.processed, summary.skipped, summary.failed, Self::format_duration(start_time.elapsed())
        );

        Ok(summary)
    }
}
