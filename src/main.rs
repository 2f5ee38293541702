// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{anyhow, Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use log::{info, warn, Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use std::io::Write;
use std::path::{Path, PathBuf};

use subrelay::app_config::{self, Config, TranslationProvider};
use subrelay::app_controller::{Controller, RunOutcome};
use subrelay::subtitle_processor::TextEncoding;
use subrelay::translation::CancellationFlag;

/// CLI Wrapper for TranslationProvider to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliTranslationProvider {
    #[value(name = "deepl")]
    DeepL,
    Ollama,
}

impl From<CliTranslationProvider> for TranslationProvider {
    fn from(cli_provider: CliTranslationProvider) -> Self {
        match cli_provider {
            CliTranslationProvider::DeepL => TranslationProvider::DeepL,
            CliTranslationProvider::Ollama => TranslationProvider::Ollama,
        }
    }
}

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Translate subtitle files (default command)
    Translate(TranslateArgs),

    /// Generate shell completions for subrelay
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Parser, Debug, Clone)]
struct TranslateArgs {
    /// Input SRT file or directory to process
    #[arg(value_name = "INPUT_PATH")]
    input_path: PathBuf,

    /// Force overwrite of existing output files
    #[arg(short, long)]
    force_overwrite: bool,

    /// Translation provider to use
    #[arg(short, long, value_enum)]
    provider: Option<CliTranslationProvider>,

    /// Model name to use for translation (Ollama)
    #[arg(short, long)]
    model: Option<String>,

    /// Source language code, or "auto"
    #[arg(short, long)]
    source_language: Option<String>,

    /// Target language code (e.g., 'zh', 'de', 'fr')
    #[arg(short, long)]
    target_language: Option<String>,

    /// Configuration file path
    #[arg(short, long, default_value = "conf.json")]
    config_path: String,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,

    /// Encoding of the input files
    #[arg(short, long, default_value = "utf-8")]
    encoding: String,

    /// Maximum characters per translation batch
    #[arg(long)]
    max_chars: Option<usize>,

    /// Keep the intermediate file after a successful run
    #[arg(long)]
    keep_intermediate: bool,

    /// DeepL API key
    #[arg(long, env = "DEEPL_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
}

/// subrelay - batched subtitle translation
///
/// Translates SRT subtitle files many lines per request, then re-translates
/// any line that came back unchanged.
#[derive(Parser, Debug)]
#[command(name = "subrelay")]
#[command(version)]
#[command(about = "Batched, order-preserving SRT subtitle translation")]
#[command(long_about = "subrelay packs subtitle lines into large requests, translates them concurrently
and verifies the result, repairing lines that were left untranslated.

EXAMPLES:
    subrelay movie.srt                          # Translate using default config
    subrelay -f movie.srt                       # Force overwrite existing output
    subrelay -p ollama -m qwen2.5:7b movie.srt  # Use a local Ollama model
    subrelay -s en -t de movie.srt              # Translate from English to German
    subrelay --log-level debug /subs/           # Process an entire directory
    subrelay completions bash > subrelay.bash   # Generate bash completions

CONFIGURATION:
    Configuration is stored in conf.json by default. If the file doesn't exist,
    a default one is created. The DeepL key may also come from DEEPL_API_KEY.

OUTPUT:
    movie.srt is translated to \"movie zh.srt\" next to it. Problems that survive
    the repair pass are appended to subrelay.issues.log in the same directory.")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Input SRT file or directory to process
    #[arg(value_name = "INPUT_PATH")]
    input_path: Option<PathBuf>,

    /// Force overwrite of existing output files
    #[arg(short, long)]
    force_overwrite: bool,

    /// Translation provider to use
    #[arg(short, long, value_enum)]
    provider: Option<CliTranslationProvider>,

    /// Model name to use for translation (Ollama)
    #[arg(short, long)]
    model: Option<String>,

    /// Source language code, or "auto"
    #[arg(short, long)]
    source_language: Option<String>,

    /// Target language code (e.g., 'zh', 'de', 'fr')
    #[arg(short, long)]
    target_language: Option<String>,

    /// Configuration file path
    #[arg(short, long, default_value = "conf.json")]
    config_path: String,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,

    /// Encoding of the input files
    #[arg(short, long, default_value = "utf-8")]
    encoding: String,

    /// Maximum characters per translation batch
    #[arg(long)]
    max_chars: Option<usize>,

    /// Keep the intermediate file after a successful run
    #[arg(long)]
    keep_intermediate: bool,

    /// DeepL API key
    #[arg(long, env = "DEEPL_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        let logger = Box::new(CustomLogger::new(level));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: Emoji for log level
    fn get_emoji_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "❌ ",
            Level::Warn => "🚧 ",
            Level::Info => " ",
            Level::Debug => "🔍 ",
            Level::Trace => "📋 ",
        }
    }

    // @returns: ANSI color for log level
    fn get_color_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "1;31",
            Level::Warn => "1;33",
            Level::Info => "1;32",
            Level::Debug => "1;36",
            Level::Trace => "1;35",
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let _ = writeln!(
                std::io::stderr(),
                "\x1B[{}m{} {} {}\x1B[0m",
                Self::get_color_for_level(record.level()),
                now,
                Self::get_emoji_for_level(record.level()),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // The logger accepts everything; the effective level is set through set_max_level
    CustomLogger::init(LevelFilter::Trace)?;
    log::set_max_level(LevelFilter::Info);

    let cli = CommandLineOptions::parse();

    match cli.command {
        Some(Commands::Completions { shell }) => {
            let mut cmd = CommandLineOptions::command();
            generate(shell, &mut cmd, "subrelay", &mut std::io::stdout());
            Ok(())
        },
        Some(Commands::Translate(args)) => run_translate(args).await,
        None => {
            // Default behavior - use top-level args
            let input_path = cli.input_path
                .ok_or_else(|| anyhow!("INPUT_PATH is required when no subcommand is specified"))?;

            let translate_args = TranslateArgs {
                input_path,
                force_overwrite: cli.force_overwrite,
                provider: cli.provider,
                model: cli.model,
                source_language: cli.source_language,
                target_language: cli.target_language,
                config_path: cli.config_path,
                log_level: cli.log_level,
                encoding: cli.encoding,
                max_chars: cli.max_chars,
                keep_intermediate: cli.keep_intermediate,
                api_key: cli.api_key,
            };
            run_translate(translate_args).await
        },
    }
}

/// Apply command line overrides on top of the loaded configuration
fn apply_overrides(config: &mut Config, options: &TranslateArgs) {
    if let Some(provider) = &options.provider {
        config.translation.provider = provider.clone().into();
    }
    if let Some(model) = &options.model {
        config.translation.active_provider_config_mut().model = model.clone();
    }
    if let Some(api_key) = &options.api_key {
        config.translation.active_provider_config_mut().api_key = api_key.clone();
    }
    if let Some(source_lang) = &options.source_language {
        config.source_language = source_lang.clone();
    }
    if let Some(target_lang) = &options.target_language {
        config.target_language = target_lang.clone();
    }
    if let Some(max_chars) = options.max_chars {
        config.translation.batching.max_chars_per_batch = max_chars;
    }
    if options.keep_intermediate {
        config.output.keep_intermediate = true;
    }
    if let Some(log_level) = &options.log_level {
        config.log_level = log_level.clone().into();
    }
}

async fn run_translate(options: TranslateArgs) -> Result<()> {
    if let Some(cmd_log_level) = &options.log_level {
        let level: app_config::LogLevel = cmd_log_level.clone().into();
        log::set_max_level(level.to_level_filter());
    }

    let (mut config, created) = Config::load_or_create(&options.config_path)?;
    if created {
        warn!("Config file not found at '{}', created a default config.", options.config_path);
    }
    apply_overrides(&mut config, &options);

    config.validate()
        .context("Configuration validation failed")?;
    log::set_max_level(config.log_level.to_level_filter());

    let encoding: TextEncoding = options.encoding.parse()?;

    let cancel = CancellationFlag::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling outstanding translations");
            ctrl_c.cancel();
        }
    });

    let controller = Controller::with_config(config)?
        .with_encoding(encoding)
        .with_cancellation(cancel);

    if let Err(e) = controller.test_connection().await {
        warn!("{}", e);
    }

    if options.input_path.is_file() {
        let output_dir = options.input_path.parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."))
            .to_path_buf();
        match controller.run(options.input_path.clone(), output_dir, options.force_overwrite).await? {
            RunOutcome::Translated(report) if !report.is_clean() => {
                warn!("Finished with {} warnings", report.warnings.len());
            },
            RunOutcome::Translated(_) => {},
            RunOutcome::Skipped(path) => info!("Nothing to do, {} exists", path.display()),
        }
    } else if options.input_path.is_dir() {
        let summary = controller.run_folder(options.input_path.clone(), options.force_overwrite).await?;
        if summary.failed > 0 {
            return Err(anyhow!("{} files failed to translate", summary.failed));
        }
    } else {
        return Err(anyhow!("Input path does not exist: {:?}", options.input_path));
    }

    Ok(())
}
