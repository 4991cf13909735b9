//! Orchestration: resolve → split → generate for every source document.
//!
//! [`StudyPipeline`] is generic over the generative service and the compiler
//! so the whole flow can run against fakes. [`process`] wires the production
//! collaborators (edgequake-llm providers, xelatex, pdfium) from a
//! [`StudyConfig`].
//!
//! Failures never cross a document boundary: a document whose structure
//! cannot be resolved is recorded as a [`DocumentFailure`] and the run moves
//! on to the next one.

use crate::config::StudyConfig;
use crate::error::Pdf2StudyError;
use crate::governor::RateGovernor;
use crate::output::{
    ChapterReport, DocumentFailure, DocumentMetadata, DocumentReport, GenerationStatus, RunReport,
};
use crate::pipeline::compile::{Compiler, XelatexCompiler};
use crate::pipeline::generate::{generate_chapter, ChapterJob};
use crate::pipeline::llm::{GenerativeService, LlmService};
use crate::pipeline::pdf::{self, PdfBackend, PdfiumBackend};
use crate::pipeline::split::{self, ChapterSlice};
use crate::pipeline::structure::resolve_structure;
use crate::pipeline::input;
use edgequake_llm::{LLMProvider, ProviderFactory};
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Name of the per-document folder holding generated sources.
pub const RESULTS_DIR: &str = "results";

/// Suffix appended to a chapter's file stem for its study sheet.
pub const OUTPUT_SUFFIX: &str = "-flashcards";

/// The full per-document pipeline over pluggable collaborators.
pub struct StudyPipeline<S, C> {
    service: S,
    compiler: C,
    backend: Arc<dyn PdfBackend>,
    governor: Arc<RateGovernor>,
    config: StudyConfig,
}

impl<S, C> StudyPipeline<S, C>
where
    S: GenerativeService,
    C: Compiler,
{
    /// Build a pipeline with its own [`RateGovernor`] sized from `config`.
    pub fn new(service: S, compiler: C, backend: Arc<dyn PdfBackend>, config: StudyConfig) -> Self {
        let governor = Arc::new(RateGovernor::new(
            config.rate_limit_requests,
            config.rate_window(),
        ));
        Self {
            service,
            compiler,
            backend,
            governor,
            config,
        }
    }

    /// Share an existing governor, e.g. across several pipelines hitting the
    /// same provider account.
    pub fn with_governor(mut self, governor: Arc<RateGovernor>) -> Self {
        self.governor = governor;
        self
    }

    pub fn governor(&self) -> &Arc<RateGovernor> {
        &self.governor
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn config(&self) -> &StudyConfig {
        &self.config
    }

    /// Process every document in order, collecting a [`RunReport`].
    ///
    /// Chapter folders go under `output_root` when given, else beside each
    /// source PDF.
    pub async fn process_documents(&self, sources: &[&Path], output_root: Option<&Path>) -> RunReport {
        let start = Instant::now();
        let mut report = RunReport::default();

        for source in sources {
            match self.process_document(source, output_root).await {
                Ok(doc) => report.documents.push(doc),
                Err(e) => {
                    error!("Skipping {}: {}", source.display(), e);
                    if let Some(ref cb) = self.config.progress_callback {
                        cb.on_document_error(source, &e.to_string());
                    }
                    report.failures.push(DocumentFailure {
                        source: source.to_path_buf(),
                        error: e.to_string(),
                    });
                }
            }
        }

        report.finalise(self.service.usage(), start.elapsed().as_millis() as u64);
        report
    }

    /// Resolve, split and generate one document.
    ///
    /// Returns `Err` only when resolution or splitting fails as a whole;
    /// chapter-level problems are recorded in the report.
    pub async fn process_document(
        &self,
        source: &Path,
        output_root: Option<&Path>,
    ) -> Result<DocumentReport, Pdf2StudyError> {
        let start = Instant::now();
        info!("Processing {}", source.display());
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_document_start(source);
        }

        // ── Step 1: Resolve structure ────────────────────────────────────
        let structure = resolve_structure(
            &self.service,
            &self.governor,
            &self.backend,
            source,
            self.config.chapter_scan_pages,
            self.config.physical_scan_pages,
        )
        .await?;

        // ── Step 2: Split ────────────────────────────────────────────────
        let chapter_dir = chapter_dir_for(source, output_root);
        let split = split::split(&self.backend, source, &structure, &chapter_dir).await?;
        info!(
            "Wrote {} of {} chapters to {}",
            split.written_count(),
            structure.chapters.len(),
            chapter_dir.display()
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_split_complete(structure.chapters.len(), split.written_count());
        }

        // ── Step 3: Generate per chapter ─────────────────────────────────
        let results_dir = chapter_dir.join(RESULTS_DIR);
        let total = split.written_count();
        let mut chapters: Vec<ChapterReport> = stream::iter(
            split
                .written
                .iter()
                .map(|(slice, pdf_path)| self.generate_one(slice, pdf_path, total, &results_dir)),
        )
        .buffer_unordered(self.config.concurrency.max(1))
        .collect()
        .await;
        chapters.sort_by_key(|c| c.ordinal);

        let report = DocumentReport {
            source: source.to_path_buf(),
            total_pages: split.total_pages,
            structure,
            chapter_dir,
            skipped: split.skipped,
            chapters,
            duration_ms: start.elapsed().as_millis() as u64,
        };

        let accepted = report.count(GenerationStatus::Accepted) + report.count(GenerationStatus::SoftAccepted);
        info!(
            "Finished {}: {}/{} chapters accepted",
            source.display(),
            accepted,
            report.chapters.len()
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_document_complete(source, accepted, report.chapters.len());
        }

        Ok(report)
    }

    /// Run the correction loop for one written chapter PDF.
    async fn generate_one(
        &self,
        slice: &ChapterSlice,
        pdf_path: &Path,
        total: usize,
        results_dir: &Path,
    ) -> ChapterReport {
        let start = Instant::now();
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_chapter_start(slice.ordinal, total, &slice.file_name);
        }

        let mut report = ChapterReport {
            ordinal: slice.ordinal,
            source_pdf: pdf_path.to_path_buf(),
            output_source: None,
            artifact: None,
            status: GenerationStatus::Failed,
            attempts: 0,
            last_error: None,
            duration_ms: 0,
        };

        let result = match tokio::fs::read(pdf_path).await {
            Ok(document) => {
                let base_name = output_base_name(pdf_path);
                let job = ChapterJob {
                    ordinal: slice.ordinal,
                    total,
                    document: &document,
                    results_dir,
                    base_name: &base_name,
                };
                generate_chapter(&self.service, &self.compiler, &self.governor, job, &self.config).await
            }
            Err(e) => {
                warn!("Cannot read {}: {}", pdf_path.display(), e);
                Err(Pdf2StudyError::FileNotFound {
                    path: pdf_path.to_path_buf(),
                })
            }
        };

        match result {
            Ok(outcome) => {
                report.status = outcome.status;
                report.attempts = outcome.attempts;
                report.last_error = outcome.last_error;
                report.output_source = Some(outcome.source_path);
                report.artifact = outcome.artifact;
            }
            Err(e) => {
                warn!("Chapter {}: {}", slice.ordinal, e);
                report.last_error = Some(e.to_string());
            }
        }
        report.duration_ms = start.elapsed().as_millis() as u64;

        if let Some(ref cb) = self.config.progress_callback {
            cb.on_chapter_complete(slice.ordinal, total, report.status.as_str(), report.attempts);
        }
        report
    }
}

/// `<output_root or source dir>/<source stem>_chapters`.
pub fn chapter_dir_for(source: &Path, output_root: Option<&Path>) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    let name = format!("{stem}_chapters");
    match output_root {
        Some(root) => root.join(name),
        None => source.parent().unwrap_or_else(|| Path::new(".")).join(name),
    }
}

/// `<chapter stem>-flashcards`, the base name of generated sources.
pub fn output_base_name(chapter_pdf: &Path) -> String {
    let stem = chapter_pdf
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{stem}{OUTPUT_SUFFIX}")
}

// ── Public entry points ──────────────────────────────────────────────────

/// Process a PDF file, a directory of PDFs, or a PDF URL.
///
/// This is the primary entry point for the library.
///
/// # Returns
/// `Ok(RunReport)` even when some documents or chapters failed; inspect
/// `report.failures` and the per-chapter statuses.
///
/// # Errors
/// Returns `Err` only for problems that stop the run before any document is
/// touched: unresolvable input or an unconfigured provider.
pub async fn process(input_str: impl AsRef<str>, config: &StudyConfig) -> Result<RunReport, Pdf2StudyError> {
    let input_str = input_str.as_ref();
    info!("Starting run: {}", input_str);

    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;

    let generation = resolve_provider(config, config.provider.as_ref(), config.model.as_deref())?;
    let structure = match (&config.structure_provider, &config.structure_model) {
        (Some(p), _) => Arc::clone(p),
        (None, Some(model)) if config.provider.is_none() => {
            resolve_provider(config, None, Some(model))?
        }
        _ => Arc::clone(&generation),
    };
    let structure_in_use = structure_model_in_use(
        config.provider.is_some(),
        config.structure_provider.is_some(),
        config.generation_model(),
        config.structure_model.as_deref(),
    );
    if let Some(requested) = config.structure_model.as_deref() {
        if structure_in_use != Some(requested) {
            warn!(
                "structure_model '{}' ignored: a pre-built provider is configured",
                requested
            );
        }
    }
    info!(
        "Models: structure={}, generation={}",
        structure_in_use.unwrap_or(PREBUILT_LABEL),
        if config.provider.is_some() {
            PREBUILT_LABEL
        } else {
            config.generation_model()
        }
    );

    let service = LlmService::new(structure, generation, config);
    let compiler = XelatexCompiler::new(config.compiler.clone());
    let backend: Arc<dyn PdfBackend> = Arc::new(PdfiumBackend::new(config.password.clone()));
    let pipeline = StudyPipeline::new(service, compiler, backend, config.clone());

    // Downloads live in a temp dir; their chapters must land somewhere durable.
    let output_root = match (&config.output_dir, resolved.is_downloaded()) {
        (Some(dir), _) => Some(dir.clone()),
        (None, true) => Some(std::env::current_dir().map_err(|e| {
            Pdf2StudyError::Internal(format!("Cannot determine current directory: {e}"))
        })?),
        (None, false) => None,
    };

    let report = pipeline
        .process_documents(&resolved.paths(), output_root.as_deref())
        .await;
    info!(
        "Run complete: {} document(s), {} chapter(s) written, {} accepted, {} exhausted",
        report.stats.documents_total,
        report.stats.chapters_written,
        report.stats.chapters_accepted + report.stats.chapters_soft_accepted,
        report.stats.chapters_exhausted
    );
    Ok(report)
}

/// Synchronous wrapper around [`process`].
///
/// Creates a temporary tokio runtime internally.
pub fn process_sync(input_str: impl AsRef<str>, config: &StudyConfig) -> Result<RunReport, Pdf2StudyError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Pdf2StudyError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(process(input_str, config))
}

/// Read PDF metadata for every resolved input, without any service call.
pub async fn inspect(
    input_str: impl AsRef<str>,
    config: &StudyConfig,
) -> Result<Vec<(PathBuf, DocumentMetadata)>, Pdf2StudyError> {
    let resolved = input::resolve_input(input_str.as_ref(), config.download_timeout_secs).await?;
    let mut out = Vec::new();
    for path in resolved.paths() {
        let meta = pdf::extract_metadata(path, config.password.as_deref()).await?;
        out.push((path.to_path_buf(), meta));
    }
    Ok(out)
}

// ── Provider resolution ──────────────────────────────────────────────────

const PREBUILT_LABEL: &str = "<pre-built provider>";

/// Model the structure calls will actually use, or `None` when a pre-built
/// provider decides it.
///
/// Mirrors the selection in [`process`]: a pre-built structure provider wins,
/// then `structure_model` (only without a pre-built generation provider),
/// then whatever the generation provider uses.
fn structure_model_in_use<'a>(
    has_provider: bool,
    has_structure_provider: bool,
    generation_model: &'a str,
    structure_model: Option<&'a str>,
) -> Option<&'a str> {
    if has_structure_provider {
        return None;
    }
    match structure_model {
        Some(model) if !has_provider => Some(model),
        _ if has_provider => None,
        _ => Some(generation_model),
    }
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, Pdf2StudyError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        Pdf2StudyError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve an LLM provider, from most-specific to least-specific:
///
/// 1. a pre-built provider;
/// 2. `config.provider_name` with `model`;
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL` (an explicit `model` wins);
/// 4. OpenAI when `OPENAI_API_KEY` is set;
/// 5. `ProviderFactory::from_env` auto-detection.
fn resolve_provider(
    config: &StudyConfig,
    prebuilt: Option<&Arc<dyn LLMProvider>>,
    model: Option<&str>,
) -> Result<Arc<dyn LLMProvider>, Pdf2StudyError> {
    if let Some(provider) = prebuilt {
        return Ok(Arc::clone(provider));
    }

    let default_model = config.generation_model();

    if let Some(ref name) = config.provider_name {
        return create_provider(name, model.unwrap_or(default_model));
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            return create_provider(&prov, model.unwrap_or(&env_model));
        }
    }

    if std::env::var("OPENAI_API_KEY").is_ok_and(|k| !k.is_empty()) {
        return create_provider("openai", model.unwrap_or(default_model));
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| Pdf2StudyError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, GEMINI_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chapter_dir_is_sibling_of_source() {
        assert_eq!(
            chapter_dir_for(Path::new("/books/calculus.pdf"), None),
            PathBuf::from("/books/calculus_chapters")
        );
        assert_eq!(
            chapter_dir_for(Path::new("calculus.pdf"), None),
            PathBuf::from("calculus_chapters")
        );
    }

    #[test]
    fn chapter_dir_honours_output_root() {
        assert_eq!(
            chapter_dir_for(Path::new("/tmp/x/book.pdf"), Some(Path::new("/out"))),
            PathBuf::from("/out/book_chapters")
        );
    }

    #[test]
    fn structure_model_follows_provider_selection() {
        assert_eq!(
            structure_model_in_use(false, false, "gpt-4.1", Some("gpt-4.1-mini")),
            Some("gpt-4.1-mini")
        );
        assert_eq!(structure_model_in_use(false, false, "gpt-4.1", None), Some("gpt-4.1"));
        assert_eq!(structure_model_in_use(true, false, "gpt-4.1", None), None);
        assert_eq!(structure_model_in_use(false, true, "gpt-4.1", None), None);
    }

    #[test]
    fn structure_model_is_ignored_with_prebuilt_providers() {
        let requested = Some("gpt-4.1-mini");
        assert_ne!(structure_model_in_use(true, false, "gpt-4.1", requested), requested);
        assert_ne!(structure_model_in_use(false, true, "gpt-4.1", requested), requested);
    }

    #[test]
    fn output_base_name_appends_suffix() {
        assert_eq!(
            output_base_name(Path::new("/b/book_chapters/Chapter_2-Series.pdf")),
            "Chapter_2-Series-flashcards"
        );
    }
}
