//! Result types returned by the pipeline.
//!
//! Everything here is plain data and `serde`-serialisable, so the CLI can
//! print a run as JSON and library callers can persist it.

use crate::error::ChapterError;
use crate::model::BookStructure;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How a chapter's correction loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GenerationStatus {
    /// The compiler accepted the generated source.
    Accepted,
    /// The compiler is not installed; the text was kept unvalidated.
    SoftAccepted,
    /// Every attempt failed validation; the last one was kept anyway.
    Exhausted,
    /// The chapter could not be processed (e.g. output not writable).
    Failed,
}

impl GenerationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationStatus::Accepted => "accepted",
            GenerationStatus::SoftAccepted => "soft-accepted",
            GenerationStatus::Exhausted => "exhausted",
            GenerationStatus::Failed => "failed",
        }
    }
}

/// Outcome for a single chapter PDF.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterReport {
    /// 1-based chapter ordinal (matches the `Chapter_<n>` file prefix).
    pub ordinal: usize,
    /// Chapter PDF the study sheet was generated from.
    pub source_pdf: PathBuf,
    /// Final generated source, persisted regardless of validity.
    pub output_source: Option<PathBuf>,
    /// Compiled artifact, present only when compilation succeeded.
    pub artifact: Option<PathBuf>,
    pub status: GenerationStatus,
    /// Generations consumed (1 ..= max_retries + 1).
    pub attempts: u32,
    /// Last validation or processing error, if any.
    pub last_error: Option<String>,
    pub duration_ms: u64,
}

/// Outcome for one source document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentReport {
    pub source: PathBuf,
    pub total_pages: usize,
    pub structure: BookStructure,
    /// Folder holding the chapter PDFs (and `results/`).
    pub chapter_dir: PathBuf,
    /// Chapters the splitter skipped.
    pub skipped: Vec<ChapterError>,
    pub chapters: Vec<ChapterReport>,
    pub duration_ms: u64,
}

impl DocumentReport {
    pub fn count(&self, status: GenerationStatus) -> usize {
        self.chapters.iter().filter(|c| c.status == status).count()
    }
}

/// A document that could not be processed at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentFailure {
    pub source: PathBuf,
    pub error: String,
}

/// Token usage accumulated over every generative-service call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub calls: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Aggregate numbers for a whole run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStats {
    pub documents_total: usize,
    pub documents_failed: usize,
    pub chapters_written: usize,
    pub chapters_skipped: usize,
    pub chapters_accepted: usize,
    pub chapters_soft_accepted: usize,
    pub chapters_exhausted: usize,
    pub chapters_failed: usize,
    /// Generations consumed across all chapters.
    pub total_attempts: u64,
    pub usage: TokenUsage,
    pub total_duration_ms: u64,
}

/// Result of processing one input (file, directory, or URL).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    pub documents: Vec<DocumentReport>,
    pub failures: Vec<DocumentFailure>,
    pub stats: RunStats,
}

impl RunReport {
    /// Recompute [`RunStats`] from the collected documents.
    pub(crate) fn finalise(&mut self, usage: TokenUsage, total_duration_ms: u64) {
        let chapters = || self.documents.iter().flat_map(|d| d.chapters.iter());
        let by_status = |s: GenerationStatus| chapters().filter(|c| c.status == s).count();

        self.stats = RunStats {
            documents_total: self.documents.len() + self.failures.len(),
            documents_failed: self.failures.len(),
            chapters_written: chapters().count(),
            chapters_skipped: self.documents.iter().map(|d| d.skipped.len()).sum(),
            chapters_accepted: by_status(GenerationStatus::Accepted),
            chapters_soft_accepted: by_status(GenerationStatus::SoftAccepted),
            chapters_exhausted: by_status(GenerationStatus::Exhausted),
            chapters_failed: by_status(GenerationStatus::Failed),
            total_attempts: chapters().map(|c| c.attempts as u64).sum(),
            usage,
            total_duration_ms,
        };
    }
}

/// PDF metadata, available without any service call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub page_count: usize,
    pub pdf_version: String,
}
