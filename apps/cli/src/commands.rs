//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use coursebook_core::{BookOptions, assemble_book, clean_documents, create_covers, download_images};
use coursebook_runner::{
    CancelSignal, ItemOutcome, LogProgress, ProgressReporter, RunnerConfig, TaskRunner,
};
use coursebook_shared::{
    AppConfig, EmojiMode, ExportType, OutputPaths, init_config, language_name, load_config,
    load_config_from, validate_config, validate_language,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// coursebook — turn a scraped online course into book-ready HTML.
#[derive(Parser)]
#[command(
    name = "coursebook",
    version,
    about = "Clean scraped course lessons, fetch their images, and assemble book content.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.coursebook/coursebook.toml).
    #[arg(long, global = true, env = "COURSEBOOK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output root, overriding `paths.output_root`.
    #[arg(long, global = true)]
    pub out: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Content options shared by the stages that render HTML.
#[derive(clap::Args, Clone, Debug, Default)]
pub(crate) struct ContentArgs {
    /// Course language: en, fi, zh, es, fr or ptbr.
    #[arg(long, value_parser = parse_language)]
    pub lang: Option<String>,

    /// Export type: full, course_only or exercises_only.
    #[arg(long = "type")]
    pub export_type: Option<ExportType>,

    /// Emoji handling: replace, remove or keep.
    #[arg(long)]
    pub emoji: Option<EmojiMode>,

    /// Number part chapters in the table of contents.
    #[arg(long)]
    pub chapter_numbers: bool,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Transform raw lessons into clean HTML and collect image URLs.
    Clean {
        #[command(flatten)]
        content: ContentArgs,

        /// Exit with an error if any document fails.
        #[arg(long)]
        strict: bool,
    },

    /// Download every image collected by `clean`.
    Images {
        /// Exit with an error if any image fails.
        #[arg(long)]
        strict: bool,
    },

    /// Generate a cover page for every course part.
    Covers,

    /// Assemble book records, TOC and metadata into book.json.
    Book {
        #[command(flatten)]
        content: ContentArgs,
    },

    /// Run clean, images, covers and book in order.
    Run {
        #[command(flatten)]
        content: ContentArgs,

        /// Exit with an error if any document or image fails.
        #[arg(long)]
        strict: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

fn parse_language(value: &str) -> std::result::Result<String, String> {
    validate_language(value)
        .map(|()| value.to_string())
        .map_err(|e| e.to_string())
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "coursebook=info",
        1 => "coursebook=debug",
        _ => "coursebook=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let ctx = Context::load(&cli)?;
    match cli.command {
        Command::Clean { content, strict } => cmd_clean(&ctx.with(&content)?, strict).await,
        Command::Images { strict } => cmd_images(&ctx, strict).await,
        Command::Covers => cmd_covers(&ctx).await,
        Command::Book { content } => cmd_book(&ctx.with(&content)?).await,
        Command::Run { content, strict } => cmd_run(&ctx.with(&content)?, strict).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(&ctx).await,
        },
    }
}

/// Resolved configuration and everything derived from it.
struct Context {
    config: AppConfig,
    paths: OutputPaths,
    cancel: CancelSignal,
    json_logs: bool,
}

impl Context {
    fn load(cli: &Cli) -> Result<Self> {
        let mut config = match &cli.config {
            Some(path) => load_config_from(path)?,
            None => load_config()?,
        };
        if let Some(out) = &cli.out {
            config.paths.output_root = out.to_string_lossy().into_owned();
        }

        let cancel = CancelSignal::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, finishing in-flight work");
                on_interrupt.cancel();
            }
        });

        Ok(Self {
            paths: OutputPaths::from(&config),
            config,
            cancel,
            json_logs: matches!(cli.log_format, LogFormat::Json),
        })
    }

    /// Same context with command-line content options applied.
    fn with(&self, args: &ContentArgs) -> Result<Self> {
        let mut config = self.config.clone();
        if let Some(lang) = &args.lang {
            config.content.language = lang.clone();
        }
        if let Some(export_type) = args.export_type {
            config.content.export_type = export_type;
        }
        if let Some(emoji) = args.emoji {
            config.content.emoji_mode = emoji;
        }
        if args.chapter_numbers {
            config.content.chapter_numbers = true;
        }
        validate_config(&config)?;

        Ok(Self {
            paths: OutputPaths::from(&config),
            config,
            cancel: self.cancel.clone(),
            json_logs: self.json_logs,
        })
    }

    fn runner(&self, settings: &coursebook_shared::BatchSettings) -> Result<TaskRunner> {
        Ok(TaskRunner::new(RunnerConfig::from(settings))?.with_cancel(self.cancel.clone()))
    }

    /// Spinner on a terminal, throttled log lines with JSON logs.
    fn progress(&self, label: &str) -> Box<dyn ProgressReporter> {
        if self.json_logs {
            Box::new(LogProgress::new(label))
        } else {
            Box::new(CliProgress::new(label))
        }
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_clean(ctx: &Context, strict: bool) -> Result<()> {
    info!(output = %ctx.paths.root.display(), "cleaning documents");
    let runner = ctx.runner(&ctx.config.runner.clean)?;
    let progress = ctx.progress("Cleaning documents");

    let report = clean_documents(&ctx.config, &ctx.paths, &runner, progress.as_ref()).await?;

    println!();
    println!("  Documents cleaned!");
    println!("  Cleaned:  {}/{}", report.cleaned, report.documents);
    println!("  Images:   {}", report.images);
    println!("  Links:    {} rewritten, {} unwrapped", report.links_rewritten, report.links_unwrapped);
    println!("  Output:   {}", ctx.paths.clean.display());
    println!("  Time:     {:.1}s", report.elapsed.as_secs_f64());
    print_failures(&report.failed, report.skipped);
    println!();

    check_strict(strict, report.failed.len() + report.skipped, "documents")
}

async fn cmd_images(ctx: &Context, strict: bool) -> Result<()> {
    let runner = ctx.runner(&ctx.config.runner.images)?;
    let progress = ctx.progress("Downloading images");

    let result = download_images(&ctx.paths, &runner, progress.as_ref()).await?;

    println!();
    println!("  Images downloaded!");
    println!("  Downloaded: {}", result.downloaded);
    println!("  Output:     {}", ctx.paths.imgs.display());
    println!("  Time:       {:.1}s", result.elapsed.as_secs_f64());
    print_failures(&result.failed, result.skipped);
    println!();

    check_strict(strict, result.failed.len() + result.skipped, "images")
}

async fn cmd_covers(ctx: &Context) -> Result<()> {
    let progress = ctx.progress("Creating cover pages");
    let count = create_covers(
        &ctx.paths,
        &ctx.config.content.default_accent_color,
        progress.as_ref(),
    )
    .await?;

    println!();
    println!("  Cover pages generated!");
    println!("  Covers: {count}");
    println!("  Output: {}", ctx.paths.covers.display());
    println!();
    Ok(())
}

async fn cmd_book(ctx: &Context) -> Result<()> {
    let opts = BookOptions::from(&ctx.config);
    let report = assemble_book(&ctx.paths, &opts).await?;

    println!();
    println!("  Book content assembled!");
    println!("  Type:     {}", opts.export_type);
    println!(
        "  Language: {} ({})",
        language_name(&opts.language).unwrap_or("unknown"),
        opts.language
    );
    println!("  Records:  {}", report.records);
    if report.refetched > 0 {
        println!("  Refetched images: {}", report.refetched);
    }
    if !report.missing_images.is_empty() {
        println!("  Images left out:  {}", report.missing_images.len());
    }
    if !report.missing_lessons.is_empty() {
        println!("  Missing lessons:  {}", report.missing_lessons.join(", "));
    }
    println!("  Path:     {}", report.book_path.display());
    println!();
    Ok(())
}

async fn cmd_run(ctx: &Context, strict: bool) -> Result<()> {
    cmd_clean(ctx, strict).await?;
    if ctx.cancel.is_cancelled() {
        return Err(eyre!("interrupted"));
    }
    cmd_images(ctx, strict).await?;
    if ctx.cancel.is_cancelled() {
        return Err(eyre!("interrupted"));
    }
    cmd_covers(ctx).await?;
    cmd_book(ctx).await
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(ctx: &Context) -> Result<()> {
    let toml_str = toml::to_string_pretty(&ctx.config)?;
    println!("{toml_str}");
    Ok(())
}

fn print_failures(failed: &[(String, String)], skipped: usize) {
    if !failed.is_empty() {
        println!("  Failed:   {}", failed.len());
        for (item, error) in failed {
            println!("    - {item}: {error}");
        }
    }
    if skipped > 0 {
        println!("  Skipped:  {skipped} (interrupted)");
    }
}

/// Per-item failures are warnings unless `--strict` is set.
fn check_strict(strict: bool, problems: usize, what: &str) -> Result<()> {
    if problems == 0 {
        return Ok(());
    }
    if strict {
        return Err(eyre!("{problems} {what} failed or were skipped"));
    }
    warn!(count = problems, "{what} finished with failures");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif bar.
struct CliProgress {
    bar: ProgressBar,
    label: String,
}

impl CliProgress {
    fn new(label: &str) -> Self {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg} [{bar:30.cyan/blue}] {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        bar.set_style(style);
        bar.set_message(label.to_string());
        bar.enable_steady_tick(std::time::Duration::from_millis(80));
        Self {
            bar,
            label: label.to_string(),
        }
    }
}

impl ProgressReporter for CliProgress {
    fn batch_started(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_position(0);
    }

    fn item_finished(&self, completed: usize, _total: usize, outcome: &ItemOutcome) {
        self.bar.set_position(completed as u64);
        if let ItemOutcome::Failed { message, .. } = outcome {
            self.bar.set_message(format!("{} (last error: {message})", self.label));
        }
    }

    fn batch_finished(&self, _succeeded: usize, _failed: usize) {
        self.bar.finish_and_clear();
    }
}
