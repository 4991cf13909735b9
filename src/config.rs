//! Configuration types for textbook-to-study-sheet processing.
//!
//! All pipeline behaviour is controlled through [`StudyConfig`], built via its
//! [`StudyConfigBuilder`]. Keeping every knob in one struct makes it easy to
//! share configs across tasks, log them, and diff two runs.

use crate::error::Pdf2StudyError;
use crate::progress::StudyProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";

/// Configuration for processing one or more textbook PDFs.
///
/// Built via [`StudyConfig::builder()`] or using [`StudyConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_pdf2study::StudyConfig;
///
/// let config = StudyConfig::builder()
///     .chapter_scan_pages(12)
///     .max_retries(2)
///     .subject("Linear Algebra")
///     .build()
///     .unwrap();
/// assert_eq!(config.max_retries, 2);
/// ```
#[derive(Clone)]
pub struct StudyConfig {
    /// Pages (from the start of the PDF) sent for chapter-list extraction. Default: 10.
    ///
    /// The table of contents almost always sits in the first handful of
    /// pages; sending more costs tokens without adding chapters.
    pub chapter_scan_pages: usize,

    /// Pages sent to locate the physical page of the first numbered chapter. Default: 25.
    ///
    /// Front matter (preface, contents, acknowledgements) can run long, so
    /// this window is wider than the chapter-list one.
    pub physical_scan_pages: usize,

    /// Correction attempts after the initial generation. Default: 3.
    ///
    /// A chapter gets at most `max_retries + 1` generations in total.
    pub max_retries: u32,

    /// Maximum generative-service calls per rate window. Default: 10.
    pub rate_limit_requests: usize,

    /// Length of the rate window in seconds. Default: 60.
    pub rate_limit_window_secs: u64,

    /// Model used to generate chapter study sheets.
    /// If None, uses [`DEFAULT_MODEL`].
    pub model: Option<String>,

    /// Model used for both structure-resolution calls. If None, uses `model`.
    ///
    /// Resolution only reads a table of contents, so a cheaper model is
    /// usually enough.
    pub structure_model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "gemini").
    /// If None along with `provider`, the provider is auto-detected.
    pub provider_name: Option<String>,

    /// Pre-constructed provider for generation. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Pre-constructed provider for structure resolution. Falls back to `provider`.
    pub structure_provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.2.
    pub temperature: f32,

    /// Maximum tokens the LLM may generate per call. Default: 16384.
    ///
    /// A full chapter study sheet easily exceeds 4 000 tokens; truncation
    /// produces LaTeX with unclosed environments that never compiles.
    pub max_tokens: usize,

    /// Subject matter of the book, woven into the generation instruction.
    pub subject: Option<String>,

    /// Language the study sheet is written in. Default: "English".
    pub language: String,

    /// How PDF content is attached to service calls. Default: [`AttachmentMode::RenderedPages`].
    pub attachment: AttachmentMode,

    /// Longest edge, in pixels, of rasterised pages. Default: 1600.
    pub max_rendered_pixels: u32,

    /// Compiler executable used to validate generated LaTeX. Default: "xelatex".
    pub compiler: String,

    /// Pause after a missing-root-marker format error, in ms. Default: 1000.
    pub format_cooldown_ms: u64,

    /// Pause after a compilation or service error, in ms. Default: 2000.
    pub compile_cooldown_ms: u64,

    /// Chapters generated concurrently. Default: 1.
    ///
    /// The rate governor is shared by every chapter, so raising this only
    /// helps when compilation (not the quota) is the bottleneck.
    pub concurrency: usize,

    /// Root directory for chapter folders. Default: next to each source PDF.
    pub output_dir: Option<PathBuf>,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Per-call timeout for the generative service in seconds. Default: 300.
    pub api_timeout_secs: u64,

    /// Optional progress events sink.
    pub progress_callback: Option<Arc<dyn StudyProgressCallback>>,
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            chapter_scan_pages: 10,
            physical_scan_pages: 25,
            max_retries: 3,
            rate_limit_requests: 10,
            rate_limit_window_secs: 60,
            model: None,
            structure_model: None,
            provider_name: None,
            provider: None,
            structure_provider: None,
            temperature: 0.2,
            max_tokens: 16384,
            subject: None,
            language: "English".to_string(),
            attachment: AttachmentMode::default(),
            max_rendered_pixels: 1600,
            compiler: "xelatex".to_string(),
            format_cooldown_ms: 1000,
            compile_cooldown_ms: 2000,
            concurrency: 1,
            output_dir: None,
            password: None,
            download_timeout_secs: 120,
            api_timeout_secs: 300,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for StudyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StudyConfig")
            .field("chapter_scan_pages", &self.chapter_scan_pages)
            .field("physical_scan_pages", &self.physical_scan_pages)
            .field("max_retries", &self.max_retries)
            .field("rate_limit_requests", &self.rate_limit_requests)
            .field("rate_limit_window_secs", &self.rate_limit_window_secs)
            .field("model", &self.model)
            .field("structure_model", &self.structure_model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field(
                "structure_provider",
                &self.structure_provider.as_ref().map(|_| "<dyn LLMProvider>"),
            )
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("subject", &self.subject)
            .field("language", &self.language)
            .field("attachment", &self.attachment)
            .field("compiler", &self.compiler)
            .field("concurrency", &self.concurrency)
            .field("output_dir", &self.output_dir)
            .finish()
    }
}

impl StudyConfig {
    /// Create a new builder for `StudyConfig`.
    pub fn builder() -> StudyConfigBuilder {
        StudyConfigBuilder {
            config: Self::default(),
        }
    }

    /// Rate window as a `Duration`.
    pub fn rate_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    /// Total generations allowed per chapter.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Generation model, falling back to [`DEFAULT_MODEL`].
    pub fn generation_model(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    /// Structure-resolution model, falling back to the generation model.
    pub fn resolution_model(&self) -> &str {
        self.structure_model
            .as_deref()
            .unwrap_or_else(|| self.generation_model())
    }
}

/// Builder for [`StudyConfig`].
pub struct StudyConfigBuilder {
    config: StudyConfig,
}

impl fmt::Debug for StudyConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StudyConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl StudyConfigBuilder {
    pub fn chapter_scan_pages(mut self, n: usize) -> Self {
        self.config.chapter_scan_pages = n;
        self
    }

    pub fn physical_scan_pages(mut self, n: usize) -> Self {
        self.config.physical_scan_pages = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn rate_limit(mut self, requests: usize, window_secs: u64) -> Self {
        self.config.rate_limit_requests = requests;
        self.config.rate_limit_window_secs = window_secs;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn structure_model(mut self, model: impl Into<String>) -> Self {
        self.config.structure_model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn structure_provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.structure_provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.config.subject = Some(subject.into());
        self
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.config.language = language.into();
        self
    }

    pub fn attachment(mut self, mode: AttachmentMode) -> Self {
        self.config.attachment = mode;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn compiler(mut self, program: impl Into<String>) -> Self {
        self.config.compiler = program.into();
        self
    }

    /// Set both correction cooldowns (format error, compile error) in ms.
    pub fn cooldowns_ms(mut self, format_ms: u64, compile_ms: u64) -> Self {
        self.config.format_cooldown_ms = format_ms;
        self.config.compile_cooldown_ms = compile_ms;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = Some(dir.into());
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: Arc<dyn StudyProgressCallback>) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<StudyConfig, Pdf2StudyError> {
        let c = &self.config;
        if c.chapter_scan_pages == 0 {
            return Err(Pdf2StudyError::InvalidConfig(
                "chapter_scan_pages must be ≥ 1".into(),
            ));
        }
        if c.physical_scan_pages == 0 {
            return Err(Pdf2StudyError::InvalidConfig(
                "physical_scan_pages must be ≥ 1".into(),
            ));
        }
        if c.rate_limit_requests == 0 {
            return Err(Pdf2StudyError::InvalidConfig(
                "rate limit must allow at least 1 request per window".into(),
            ));
        }
        if c.rate_limit_window_secs == 0 {
            return Err(Pdf2StudyError::InvalidConfig(
                "rate window must be ≥ 1 second".into(),
            ));
        }
        if c.compiler.trim().is_empty() {
            return Err(Pdf2StudyError::InvalidConfig(
                "compiler executable must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How a PDF (or a slice of one) is handed to the generative service.
///
/// Only some providers accept PDF files directly; every vision model accepts
/// page images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AttachmentMode {
    /// Attach the PDF bytes as a single base64 `application/pdf` part.
    InlinePdf,
    /// Rasterise every page and attach one PNG per page. (default)
    #[default]
    RenderedPages,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = StudyConfig::default();
        assert_eq!(c.chapter_scan_pages, 10);
        assert_eq!(c.physical_scan_pages, 25);
        assert_eq!(c.max_retries, 3);
        assert_eq!(c.max_attempts(), 4);
        assert_eq!(c.rate_limit_requests, 10);
        assert_eq!(c.rate_window(), Duration::from_secs(60));
        assert_eq!(c.compiler, "xelatex");
        assert_eq!(c.attachment, AttachmentMode::RenderedPages);
    }

    #[test]
    fn zero_scan_pages_rejected() {
        let err = StudyConfig::builder().chapter_scan_pages(0).build();
        assert!(matches!(err, Err(Pdf2StudyError::InvalidConfig(_))));
        let err = StudyConfig::builder().physical_scan_pages(0).build();
        assert!(matches!(err, Err(Pdf2StudyError::InvalidConfig(_))));
    }

    #[test]
    fn zero_rate_limit_rejected() {
        let err = StudyConfig::builder().rate_limit(0, 60).build();
        assert!(matches!(err, Err(Pdf2StudyError::InvalidConfig(_))));
        let err = StudyConfig::builder().rate_limit(10, 0).build();
        assert!(matches!(err, Err(Pdf2StudyError::InvalidConfig(_))));
    }

    #[test]
    fn zero_retries_is_allowed() {
        let c = StudyConfig::builder().max_retries(0).build().unwrap();
        assert_eq!(c.max_attempts(), 1);
    }

    #[test]
    fn resolution_model_falls_back_to_generation_model() {
        let c = StudyConfig::builder().model("gemini-2.5-flash").build().unwrap();
        assert_eq!(c.resolution_model(), "gemini-2.5-flash");

        let c = StudyConfig::builder()
            .model("gemini-2.5-flash")
            .structure_model("gemini-2.0-flash")
            .build()
            .unwrap();
        assert_eq!(c.resolution_model(), "gemini-2.0-flash");
        assert_eq!(StudyConfig::default().generation_model(), DEFAULT_MODEL);
    }

    #[test]
    fn concurrency_clamped_to_one() {
        let c = StudyConfig::builder().concurrency(0).build().unwrap();
        assert_eq!(c.concurrency, 1);
    }
}
