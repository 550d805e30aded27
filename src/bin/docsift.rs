//! CLI binary for docsift.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig`, wires up logging and progress, and prints the run
//! summary.

use anyhow::{Context, Result};
use clap::Parser;
use docsift::{
    run_pipeline, PipelineConfig, PipelineProgressCallback, PipelineSummary, ProgressCallback,
    Stage,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::{self, OpenOptions};
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// One bar, reused for every stage. Each stage resets length and prefix.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_stage_start(&self, stage: Stage, total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>4}/{len}  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        self.bar.set_style(style);
        self.bar.set_length(total as u64);
        self.bar.set_position(0);
        self.bar.set_prefix(stage.to_string());
        self.bar.reset_elapsed();
    }

    fn on_item_complete(&self, _stage: Stage, done: usize, _total: usize) {
        self.bar.set_position(done as u64);
    }

    fn on_stage_complete(&self, stage: Stage) {
        self.bar.println(format!(
            "  {} {:<20} {}",
            green("✓"),
            stage.to_string(),
            dim(&format!("{} items", self.bar.position())),
        ));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Sift everything under ./input into ./work
  docsift input

  # Custom work directory and stricter image matching
  docsift --work-dir out --image-threshold 0.99 input

  # Keep staging directories for inspection, print JSON summary
  docsift --keep-intermediate --json input > summary.json

WORK DIRECTORY LAYOUT:
  text/                     deduplicated text files
  images/                   deduplicated pure images
  quarantine/               mixed images whose extraction failed
  text_dedup_report.csv     duplicate_file,source_file
  image_dedup_report.csv    duplicate_file,source_file
  run.log                   DEBUG-level log of the run

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key (classifier)
  ANTHROPIC_API_KEY       Anthropic API key (classifier)
  GEMINI_API_KEY          Google Gemini API key (classifier)
  EDGEQUAKE_LLM_PROVIDER  Override classifier provider
  PDFIUM_LIB_PATH         Path to libpdfium
  DOCSIFT_*               Any flag below, e.g. DOCSIFT_MAX_PASSES=3
"#;

/// Sift a document corpus into deduplicated text and pure images.
#[derive(Parser, Debug)]
#[command(
    name = "docsift",
    version,
    about = "Sift a document corpus into deduplicated text and pure images",
    long_about = "Route text, PDF and image files from an input tree, separate pure images from \
images with embedded text using a vision model, extract text with an external OCR/layout tool, \
and remove near-duplicates from both the text and image sets.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Directory containing the raw input files (searched recursively).
    input: PathBuf,

    /// Work directory for staging, results and reports.
    #[arg(short, long, env = "DOCSIFT_WORK_DIR", default_value = "work")]
    work_dir: PathBuf,

    /// Cosine threshold above which two images are duplicates.
    #[arg(long, env = "DOCSIFT_IMAGE_THRESHOLD", default_value_t = 0.98)]
    image_threshold: f32,

    /// Cosine threshold above which two texts are duplicates.
    #[arg(long, env = "DOCSIFT_TEXT_THRESHOLD", default_value_t = 0.99)]
    text_threshold: f32,

    /// Maximum classify/extract passes.
    #[arg(long, env = "DOCSIFT_MAX_PASSES", default_value_t = 2)]
    max_passes: usize,

    /// Image embedding model id (resnet50, clip-vit-b32, unicom-vit-b16, unicom-vit-b32).
    #[arg(long, env = "DOCSIFT_IMAGE_MODEL", default_value = "resnet50")]
    image_model: String,

    /// Text embedding model id (paraphrase-multilingual-minilm-l12-v2, multilingual-e5-small, all-minilm-l6-v2, bge-small-en-v1.5).
    #[arg(long, env = "DOCSIFT_TEXT_MODEL", default_value = "paraphrase-multilingual-minilm-l12-v2")]
    text_model: String,

    /// Classifier provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "DOCSIFT_PROVIDER")]
    provider: Option<String>,

    /// Classifier model id (default: gpt-4.1-nano).
    #[arg(long, env = "DOCSIFT_MODEL")]
    model: Option<String>,

    /// Extraction tool binary.
    #[arg(long, env = "DOCSIFT_EXTRACTOR_BIN", default_value = "magic-pdf")]
    extractor_bin: String,

    /// Extraction tool language.
    #[arg(long, env = "DOCSIFT_EXTRACTOR_LANG", default_value = "korean")]
    extractor_lang: String,

    /// Extraction tool method.
    #[arg(long, env = "DOCSIFT_EXTRACTOR_METHOD", default_value = "ocr")]
    extractor_method: String,

    /// Ordered text encodings to try, comma-separated.
    #[arg(
        long,
        env = "DOCSIFT_ENCODINGS",
        value_delimiter = ',',
        default_value = "utf-8,euc-kr"
    )]
    encodings: Vec<String>,

    /// Longest side, in pixels, of rasterised PDF pages.
    #[arg(long, env = "DOCSIFT_MAX_PIXELS", default_value_t = 2000)]
    max_pixels: u32,

    /// Password for encrypted PDFs.
    #[arg(long, env = "DOCSIFT_PDF_PASSWORD")]
    pdf_password: Option<String>,

    /// Delete mixed images whose extraction failed instead of quarantining them.
    #[arg(long, env = "DOCSIFT_NO_QUARANTINE")]
    no_quarantine: bool,

    /// Do not remove intermediate staging directories.
    #[arg(long, env = "DOCSIFT_KEEP_INTERMEDIATE")]
    keep_intermediate: bool,

    /// Print the run summary as JSON on stdout.
    #[arg(long, env = "DOCSIFT_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "DOCSIFT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOCSIFT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOCSIFT_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    init_logging(&cli, show_progress)?;

    let cli_cb = show_progress.then(CliProgressCallback::new);
    let progress_cb: Option<ProgressCallback> = cli_cb
        .clone()
        .map(|cb| cb as Arc<dyn PipelineProgressCallback>);

    let config = build_config(&cli, progress_cb)?;
    let result = run_pipeline(&cli.input, &config).await;
    if let Some(cb) = cli_cb {
        cb.bar.finish_and_clear();
    }
    let summary = result.context("Pipeline failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?;
        println!("{json}");
    } else if !cli.quiet {
        print_summary(&summary, &config);
    }

    Ok(())
}

/// Stderr layer filtered by verbosity, plus a DEBUG file layer at
/// `{work_dir}/run.log`.
fn init_logging(cli: &Cli, show_progress: bool) -> Result<()> {
    // The bar gives all the feedback that matters, so only errors reach
    // stderr while it is shown.
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)));

    fs::create_dir_all(&cli.work_dir)
        .with_context(|| format!("Failed to create work directory {:?}", cli.work_dir))?;
    let log_path = cli.work_dir.join("run.log");
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {:?}", log_path))?;
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(Mutex::new(log_file))
        .with_filter(LevelFilter::DEBUG);

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to initialize tracing")?;
    Ok(())
}

/// Map CLI args to `PipelineConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .work_dir(&cli.work_dir)
        .image_similarity_threshold(cli.image_threshold)
        .text_similarity_threshold(cli.text_threshold)
        .max_passes(cli.max_passes)
        .image_embedding_model(&cli.image_model)
        .text_embedding_model(&cli.text_model)
        .extractor_bin(&cli.extractor_bin)
        .extractor_lang(&cli.extractor_lang)
        .extractor_method(&cli.extractor_method)
        .text_encodings(cli.encodings.iter().map(|s| s.trim().to_string()))
        .max_rendered_pixels(cli.max_pixels)
        .quarantine_failed_extractions(!cli.no_quarantine)
        .keep_intermediate(cli.keep_intermediate);

    if let Some(ref provider) = cli.provider {
        builder = builder.classifier_provider_name(provider);
    }
    if let Some(ref model) = cli.model {
        builder = builder.classifier_model(model);
    }
    if let Some(ref pwd) = cli.pdf_password {
        builder = builder.pdf_password(pwd);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn print_summary(summary: &PipelineSummary, config: &PipelineConfig) {
    let dirs = config.dirs();
    let d = &summary.dispatch;
    eprintln!(
        "{} {}",
        cyan("◆"),
        bold(&format!(
            "Dispatched {} texts, {} images, {} PDFs ({} pages)",
            d.texts, d.images, d.pdfs, d.pages_rendered
        ))
    );
    if !d.skipped.is_empty() || !d.failed.is_empty() {
        eprintln!(
            "   {}",
            dim(&format!("{} skipped, {} failed", d.skipped.len(), d.failed.len()))
        );
    }

    let r = &summary.refinement;
    eprintln!(
        "   {} passes  {} pure  {} text snippets  {} forwarded unclassified",
        r.passes.len(),
        r.total_pure(),
        r.total_texts(),
        r.forwarded_unclassified
    );

    for (label, stage, out) in [
        ("text ", &summary.text_dedup, &dirs.text_final),
        ("image", &summary.image_dedup, &dirs.images_final),
    ] {
        match stage {
            Some(s) => eprintln!(
                "   {label}  {} kept / {} total  ({} duplicates)  →  {}",
                s.kept,
                s.total,
                s.duplicates,
                bold(&out.display().to_string())
            ),
            None => eprintln!("   {label}  {}", dim("nothing to deduplicate")),
        }
    }

    if summary.is_clean() {
        eprintln!("{} done in {}ms", green("✔"), summary.duration_ms);
    } else {
        for e in &summary.stage_errors {
            eprintln!("  {} {}", red("✗"), red(e));
        }
        eprintln!(
            "{} finished with {} stage error(s) in {}ms",
            cyan("⚠"),
            summary.stage_errors.len(),
            summary.duration_ms
        );
    }
}
