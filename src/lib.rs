//! # edgequake-pdf2study
//!
//! Split a textbook PDF into one PDF per chapter, then turn each chapter into
//! a compiled LaTeX study sheet with a generative model.
//!
//! ## Why this crate?
//!
//! Models rarely produce LaTeX that compiles on the first try. This crate
//! treats the compiler as an oracle: every generated sheet is compiled, and
//! the diagnostics are fed back to the model for a bounded number of
//! corrections. All model calls share a sliding-window rate governor so a
//! whole bookshelf can run under one provider quota.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF / directory / URL
//!  │
//!  ├─ 1. Input      resolve local files or download from URL
//!  ├─ 2. Structure  two model calls: chapter list + first-chapter page
//!  ├─ 3. Split      logical → physical ranges, one PDF per chapter (pdfium)
//!  ├─ 4. Generate   generate → check format → compile → correct (bounded)
//!  └─ 5. Report     per-chapter status, attempts, token usage
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf2study::{process, StudyConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = StudyConfig::builder().subject("Linear Algebra").build()?;
//!     let report = process("textbook.pdf", &config).await?;
//!     for doc in &report.documents {
//!         for ch in &doc.chapters {
//!             println!("{} {:?} ({} attempts)", ch.status.as_str(), ch.output_source, ch.attempts);
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2study` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! ## Requirements
//!
//! - The pdfium shared library (`PDFIUM_LIB_PATH`, the working directory, or
//!   a system install).
//! - `xelatex` on `PATH` for validation. Without it sheets are written but
//!   reported as `soft-accepted`.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod governor;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{AttachmentMode, StudyConfig, StudyConfigBuilder};
pub use convert::{inspect, process, process_sync, StudyPipeline};
pub use error::{ChapterError, Pdf2StudyError};
pub use governor::RateGovernor;
pub use model::{BookStructure, ChapterInfo, ChapterList, GenerationAttempt, PageRange};
pub use output::{
    ChapterReport, DocumentFailure, DocumentMetadata, DocumentReport, GenerationStatus, RunReport,
    RunStats, TokenUsage,
};
pub use pipeline::compile::{CompileOutcome, Compiler, XelatexCompiler};
pub use pipeline::llm::{GenerativeService, LlmService};
pub use pipeline::pdf::{PdfBackend, PdfiumBackend};
pub use progress::{NoopProgressCallback, ProgressCallback, StudyProgressCallback};
