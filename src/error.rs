//! Error types for the edgequake-pdf2study library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Pdf2StudyError`] — **Fatal for one document**: the document cannot be
//!   processed at all (bad input file, structure resolution failed, provider
//!   not configured). Returned as `Err(Pdf2StudyError)` from per-document
//!   operations; the run-level orchestrator records it and moves on to the
//!   next document.
//!
//! * [`ChapterError`] — **Non-fatal**: a single chapter could not be split out
//!   (its computed page range falls outside the document, or the range is
//!   empty) but every other chapter is fine. Stored inside
//!   [`crate::output::DocumentReport`] so callers can see what was skipped.
//!
//! Generation failures never surface as errors at all: the correction loop
//! degrades to [`crate::output::GenerationStatus::Exhausted`] and the last
//! attempt is still persisted.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-pdf2study library.
#[derive(Debug, Error)]
pub enum Pdf2StudyError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a file, a directory, or a valid URL.
    #[error("Invalid input '{input}': not a file, a directory, or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// A directory was given but it holds no `.pdf` files.
    #[error("No PDF files found in directory '{dir}'")]
    NoPdfFiles { dir: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}\nTry repairing with: qpdf --decrypt input.pdf output.pdf")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// The PDF opened fine but contains no pages.
    #[error("PDF '{path}' contains no pages")]
    EmptyDocument { path: PathBuf },

    /// A requested page range does not fit the document.
    #[error("Invalid page range [{start}, {end}) for a document with {total} pages")]
    InvalidPageRange {
        start: usize,
        end: usize,
        total: usize,
    },

    /// pdfium-render returned an error while rasterising a page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
You can:\n\
  • Place libpdfium next to the binary or in the current directory.\n\
  • Install libpdfium system-wide.\n\
  • Set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy.\n"
    )]
    PdfiumBindingFailed(String),

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The LLM API returned an error.
    #[error("LLM API error: {message}")]
    LlmApiError { message: String },

    /// LLM call timed out.
    #[error("LLM call timed out after {secs}s")]
    ApiTimeout { secs: u64 },

    /// Structured extraction returned something that does not match the
    /// chapter-list schema.
    #[error("Chapter list does not match the expected schema: {detail}")]
    SchemaMismatch { detail: String },

    /// Scalar extraction did not return a positive integer.
    #[error("First-chapter physical page is not a positive integer: '{answer}'")]
    InvalidPhysicalPage { answer: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file or directory.
    #[error("Failed to write output '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The compiler could be started but failed in an unexpected way
    /// (anything other than "not installed" or "compilation error").
    #[error("Compiler '{program}' failed unexpectedly: {detail}")]
    CompilerFailed { program: String, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single chapter.
///
/// The split continues with the remaining chapters.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum ChapterError {
    /// The computed physical start index is negative or past the last page.
    #[error(
        "Chapter {ordinal} '{title}': logical page {start_page} maps to physical index \
         {start_index}, outside a document of {total_pages} pages"
    )]
    OutOfBounds {
        ordinal: usize,
        title: String,
        start_page: u32,
        start_index: i64,
        total_pages: usize,
    },

    /// The chapter starts where the next one does, so it has no pages.
    #[error("Chapter {ordinal} '{title}': page range is empty")]
    EmptyRange { ordinal: usize, title: String },

    /// Writing the chapter PDF failed.
    #[error("Chapter {ordinal} '{title}': failed to write PDF: {detail}")]
    WriteFailed {
        ordinal: usize,
        title: String,
        detail: String,
    },
}
