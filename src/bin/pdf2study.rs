//! CLI binary for edgequake-pdf2study.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `StudyConfig` and prints a run summary.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_pdf2study::{
    inspect, process, AttachmentMode, GenerationStatus, ProgressCallback, RunReport, StudyConfig,
    StudyProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
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

const TICKS: [&str; 11] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: one bar per document, re-armed on every split.
/// Chapters may finish out of order when `--concurrency` > 1.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    unaccepted: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            unaccepted: AtomicUsize::new(0),
        })
    }

    fn spinner(&self, prefix: &'static str, msg: String) {
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&TICKS);
        self.bar.set_style(style);
        self.bar.set_prefix(prefix);
        self.bar.set_message(msg);
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} chapters  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_position(0);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Generating");
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self, ordinal: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&ordinal))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl StudyProgressCallback for CliProgressCallback {
    fn on_document_start(&self, source: &Path) {
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&source.display().to_string())
        ));
        self.spinner("Resolving", "reading table of contents…".into());
    }

    fn on_split_complete(&self, chapters_found: usize, chapters_written: usize) {
        self.bar.println(format!(
            "  {} {} chapters found, {} written",
            cyan("›"),
            chapters_found,
            chapters_written
        ));
        self.activate_bar(chapters_written);
    }

    fn on_chapter_start(&self, ordinal: usize, _total: usize, name: &str) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(ordinal, Instant::now());
        }
        self.bar.set_message(name.to_string());
    }

    fn on_attempt(&self, ordinal: usize, attempt: u32, max_attempts: u32) {
        if attempt > 0 {
            self.bar.set_message(format!(
                "chapter {ordinal}: correction {attempt}/{}",
                max_attempts.saturating_sub(1)
            ));
        }
    }

    fn on_chapter_complete(&self, ordinal: usize, total: usize, status: &str, attempts: u32) {
        let secs = self.elapsed_secs(ordinal);
        let mark = match status {
            "accepted" => green("✓"),
            "soft-accepted" => yellow("~"),
            _ => {
                self.unaccepted.fetch_add(1, Ordering::SeqCst);
                red("✗")
            }
        };
        self.bar.println(format!(
            "  {} Chapter {:>3}/{:<3}  {:<14}  {}  {}",
            mark,
            ordinal,
            total,
            status,
            dim(&format!("{attempts} attempt(s)")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_document_error(&self, source: &Path, error: &str) {
        let msg = if error.chars().count() > 100 {
            format!("{}\u{2026}", error.chars().take(99).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar
            .println(format!("  {} {}  {}", red("✘"), source.display(), red(&msg)));
    }

    fn on_document_complete(&self, _source: &Path, accepted: usize, total: usize) {
        self.bar.println(format!(
            "  {} {}/{} chapters accepted",
            if accepted == total { green("✔") } else { cyan("⚠") },
            accepted,
            total
        ));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # One textbook; chapters land in ./calculus_chapters/
  pdf2study calculus.pdf --subject "Calculus"

  # Every PDF in a directory, two chapters in parallel
  pdf2study ~/books --concurrency 2

  # Download and process (chapters land in the current directory)
  pdf2study https://example.org/notes.pdf

  # Cheaper model for the table of contents
  pdf2study book.pdf --model gpt-4.1 --structure-model gpt-4.1-mini

  # Inspect PDF metadata (no API key needed)
  pdf2study --inspect-only book.pdf

  # Machine-readable report
  pdf2study --json book.pdf > report.json

OUTPUT LAYOUT:
  <dir>/<stem>_chapters/Chapter_<n>-<title>.pdf
  <dir>/<stem>_chapters/results/Chapter_<n>-<title>-flashcards.tex
  <dir>/<stem>_chapters/results/Chapter_<n>-<title>-flashcards.pdf

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Directory or file of an existing libpdfium

SETUP:
  1. Set API key:      export OPENAI_API_KEY=sk-...
  2. Install LaTeX:    xelatex must be on PATH (TeX Live, MiKTeX)
  3. Run:              pdf2study textbook.pdf

  Without xelatex every sheet is still written, but reported as soft-accepted.
"#;

/// Turn textbook PDFs into per-chapter LaTeX study sheets.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2study",
    version,
    about = "Split textbook PDFs into chapters and generate compiled LaTeX study sheets",
    long_about = "Split textbook PDFs (local files, directories or URLs) into one PDF per chapter, \
then generate a LaTeX study sheet for each chapter, compiling and correcting it until it builds. \
Supports OpenAI, Anthropic, Google Gemini, Azure OpenAI, and any OpenAI-compatible endpoint.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF file, directory of PDFs, or HTTP/HTTPS URL.
    input: String,

    /// Write chapter folders under this directory instead of beside each PDF.
    #[arg(short, long, env = "PDF2STUDY_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Model for study-sheet generation (default: gpt-4.1-mini).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// Model for structure resolution (default: same as --model).
    #[arg(long, env = "PDF2STUDY_STRUCTURE_MODEL")]
    structure_model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(
        long,
        env = "EDGEQUAKE_PROVIDER",
        long_help = "LLM provider. Auto-detected from API key env vars if not set.\n\
          Supported: openai, anthropic, gemini, azure, ollama, or any OpenAI-compatible URL."
    )]
    provider: Option<String>,

    /// Subject of the textbook, used to focus the study sheets.
    #[arg(long, env = "PDF2STUDY_SUBJECT")]
    subject: Option<String>,

    /// Language of the generated sheets.
    #[arg(long, env = "PDF2STUDY_LANGUAGE", default_value = "English")]
    language: String,

    /// Leading pages scanned for the table of contents.
    #[arg(long, env = "PDF2STUDY_CHAPTER_SCAN_PAGES", default_value_t = 10,
          value_parser = clap::value_parser!(u32).range(1..))]
    chapter_scan_pages: u32,

    /// Leading pages scanned to locate the first chapter.
    #[arg(long, env = "PDF2STUDY_PHYSICAL_SCAN_PAGES", default_value_t = 25,
          value_parser = clap::value_parser!(u32).range(1..))]
    physical_scan_pages: u32,

    /// Corrections allowed per chapter after the first generation.
    #[arg(long, env = "PDF2STUDY_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Model requests allowed per rate window.
    #[arg(long, env = "PDF2STUDY_RATE_LIMIT", default_value_t = 10)]
    rate_limit: usize,

    /// Rate window length in seconds.
    #[arg(long, env = "PDF2STUDY_RATE_WINDOW", default_value_t = 60)]
    rate_window: u64,

    /// Chapters generated in parallel per document.
    #[arg(short, long, env = "PDF2STUDY_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// LaTeX engine used to validate sheets.
    #[arg(long, env = "PDF2STUDY_COMPILER", default_value = "xelatex")]
    compiler: String,

    /// How chapters are attached: pages (rendered PNGs) or pdf (inline file).
    #[arg(long, env = "PDF2STUDY_ATTACHMENT", value_enum, default_value = "pages")]
    attachment: AttachmentArg,

    /// Max LLM output tokens per generation.
    #[arg(long, env = "PDF2STUDY_MAX_TOKENS", default_value_t = 16384)]
    max_tokens: usize,

    /// LLM temperature for generation (0.0–2.0).
    #[arg(long, env = "PDF2STUDY_TEMPERATURE", default_value_t = 0.2)]
    temperature: f32,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDF2STUDY_PASSWORD")]
    password: Option<String>,

    /// Output the structured RunReport as JSON.
    #[arg(long, env = "PDF2STUDY_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDF2STUDY_NO_PROGRESS")]
    no_progress: bool,

    /// Print PDF metadata only, no model calls.
    #[arg(long)]
    inspect_only: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2STUDY_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2STUDY_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDF2STUDY_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Per-call LLM timeout in seconds.
    #[arg(long, env = "PDF2STUDY_API_TIMEOUT", default_value_t = 300)]
    api_timeout: u64,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum AttachmentArg {
    Pages,
    Pdf,
}

impl From<AttachmentArg> for AttachmentMode {
    fn from(v: AttachmentArg) -> Self {
        match v {
            AttachmentArg::Pages => AttachmentMode::RenderedPages,
            AttachmentArg::Pdf => AttachmentMode::InlinePdf,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; verbose always wins.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let config = build_config(&cli, None)?;
        let docs = inspect(&cli.input, &config)
            .await
            .context("Failed to inspect PDF")?;

        if cli.json {
            let entries: Vec<_> = docs
                .iter()
                .map(|(path, meta)| serde_json::json!({ "file": path, "metadata": meta }))
                .collect();
            println!(
                "{}",
                serde_json::to_string_pretty(&entries).context("Failed to serialize metadata")?
            );
        } else {
            for (path, meta) in &docs {
                println!("File:         {}", path.display());
                if let Some(ref t) = meta.title {
                    println!("Title:        {}", t);
                }
                if let Some(ref a) = meta.author {
                    println!("Author:       {}", a);
                }
                if let Some(ref s) = meta.subject {
                    println!("Subject:      {}", s);
                }
                println!("Pages:        {}", meta.page_count);
                println!("PDF Version:  {}", meta.pdf_version);
                if let Some(ref p) = meta.producer {
                    println!("Producer:     {}", p);
                }
                if let Some(ref c) = meta.creator {
                    println!("Creator:      {}", c);
                }
                println!();
            }
        }
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new();
        Some(cb as Arc<dyn StudyProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb)?;

    // ── Run ──────────────────────────────────────────────────────────────
    let report = process(&cli.input, &config).await.context("Run failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialise report")?;
        println!("{json}");
    } else if !cli.quiet {
        print_summary(&report);
    }

    if report.stats.documents_failed == report.stats.documents_total && report.stats.documents_total > 0 {
        anyhow::bail!("No document could be processed");
    }
    Ok(())
}

fn print_summary(report: &RunReport) {
    for doc in &report.documents {
        eprintln!(
            "{} {}  →  {}",
            bold("■"),
            doc.source.display(),
            doc.chapter_dir.display()
        );
        for skipped in &doc.skipped {
            eprintln!("  {} {}", yellow("skipped"), dim(&skipped.to_string()));
        }
        for ch in &doc.chapters {
            let status = match ch.status {
                GenerationStatus::Accepted => green(ch.status.as_str()),
                GenerationStatus::SoftAccepted => yellow(ch.status.as_str()),
                _ => red(ch.status.as_str()),
            };
            let target = ch
                .output_source
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "-".into());
            eprintln!("  {:>3}  {:<24}  {}", ch.ordinal, status, dim(&target));
        }
    }
    for failure in &report.failures {
        eprintln!("{} {}  {}", red("✘"), failure.source.display(), red(&failure.error));
    }

    let s = &report.stats;
    eprintln!(
        "{}  {} document(s), {} chapter(s): {} accepted, {} soft-accepted, {} exhausted, {} failed  {}ms",
        if s.chapters_exhausted + s.chapters_failed + s.documents_failed == 0 {
            green("✔")
        } else {
            cyan("⚠")
        },
        s.documents_total,
        s.chapters_written,
        s.chapters_accepted,
        s.chapters_soft_accepted,
        s.chapters_exhausted,
        s.chapters_failed,
        s.total_duration_ms,
    );
    eprintln!(
        "   {} calls  /  {} tokens in  /  {} tokens out",
        dim(&s.usage.calls.to_string()),
        dim(&s.usage.input_tokens.to_string()),
        dim(&s.usage.output_tokens.to_string()),
    );
}

/// Map CLI args to `StudyConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<StudyConfig> {
    let mut builder = StudyConfig::builder()
        .chapter_scan_pages(cli.chapter_scan_pages as usize)
        .physical_scan_pages(cli.physical_scan_pages as usize)
        .max_retries(cli.max_retries)
        .rate_limit(cli.rate_limit, cli.rate_window)
        .concurrency(cli.concurrency)
        .compiler(cli.compiler.clone())
        .attachment(cli.attachment.clone().into())
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .language(cli.language.clone())
        .download_timeout_secs(cli.download_timeout)
        .api_timeout_secs(cli.api_timeout);

    if let Some(ref subject) = cli.subject {
        builder = builder.subject(subject.clone());
    }
    if let Some(ref dir) = cli.output_dir {
        builder = builder.output_dir(dir.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    let mut config = builder.build().context("Invalid configuration")?;

    config.model = cli.model.clone();
    config.structure_model = cli.structure_model.clone();
    config.provider_name = cli.provider.clone();
    config.password = cli.password.clone();

    Ok(config)
}
