//! Generative-service interaction: the three request shapes the pipeline
//! needs, and their implementation over `edgequake-llm` providers.
//!
//! The module is intentionally thin. Prompt wording lives in
//! [`crate::prompts`], rate limiting in [`crate::governor`] and retries in
//! [`crate::pipeline::generate`]; this layer only turns PDF bytes plus an
//! instruction into a provider call and parses what comes back.

use crate::config::{AttachmentMode, StudyConfig};
use crate::error::Pdf2StudyError;
use crate::model::{ChapterInfo, ChapterList};
use crate::output::TokenUsage;
use crate::pipeline::encode::{encode_page, encode_pdf};
use crate::pipeline::pdf::{render_pdf_bytes, run_blocking};
use crate::prompts::{previous_attempt_context, GENERATION_SYSTEM_PROMPT, STRUCTURE_SYSTEM_PROMPT};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use once_cell::sync::Lazy;
use regex::Regex;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// The observable contract of the external generative service.
///
/// Each method is one call; none of them retries. Callers acquire a
/// [`crate::governor::RateGovernor`] slot before every call.
pub trait GenerativeService: Send + Sync {
    /// Structured extraction: a list of `{title, start_page}` records.
    fn extract_chapters(
        &self,
        document: &[u8],
        instruction: &str,
    ) -> impl Future<Output = Result<Vec<ChapterInfo>, Pdf2StudyError>> + Send;

    /// Scalar extraction: a short plain-text answer.
    fn extract_scalar(
        &self,
        document: &[u8],
        instruction: &str,
    ) -> impl Future<Output = Result<String, Pdf2StudyError>> + Send;

    /// Free-form generation, optionally seeded with the previous attempt.
    fn generate(
        &self,
        document: &[u8],
        instruction: &str,
        previous: Option<&str>,
    ) -> impl Future<Output = Result<String, Pdf2StudyError>> + Send;

    /// Usage accumulated so far.
    fn usage(&self) -> TokenUsage {
        TokenUsage::default()
    }
}

/// [`GenerativeService`] backed by `edgequake-llm` providers.
///
/// Structure resolution and generation may use different providers (and
/// therefore different models).
pub struct LlmService {
    structure: Arc<dyn LLMProvider>,
    generation: Arc<dyn LLMProvider>,
    temperature: f32,
    max_tokens: usize,
    attachment: AttachmentMode,
    max_rendered_pixels: u32,
    api_timeout: Duration,
    calls: AtomicU64,
    input_tokens: AtomicU64,
    output_tokens: AtomicU64,
}

impl LlmService {
    pub fn new(
        structure: Arc<dyn LLMProvider>,
        generation: Arc<dyn LLMProvider>,
        config: &StudyConfig,
    ) -> Self {
        Self {
            structure,
            generation,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            attachment: config.attachment,
            max_rendered_pixels: config.max_rendered_pixels,
            api_timeout: Duration::from_secs(config.api_timeout_secs),
            calls: AtomicU64::new(0),
            input_tokens: AtomicU64::new(0),
            output_tokens: AtomicU64::new(0),
        }
    }

    /// Turn PDF bytes into request attachments according to [`AttachmentMode`].
    async fn attachments(&self, document: &[u8]) -> Result<Vec<ImageData>, Pdf2StudyError> {
        match self.attachment {
            AttachmentMode::InlinePdf => Ok(vec![encode_pdf(document)]),
            AttachmentMode::RenderedPages => {
                let bytes = document.to_vec();
                let max_pixels = self.max_rendered_pixels;
                let images =
                    run_blocking("Render", move || render_pdf_bytes(&bytes, max_pixels)).await?;

                images
                    .iter()
                    .enumerate()
                    .map(|(idx, img)| {
                        encode_page(img).map_err(|e| Pdf2StudyError::RasterisationFailed {
                            page: idx + 1,
                            detail: e.to_string(),
                        })
                    })
                    .collect()
            }
        }
    }

    /// One chat round-trip with timeout and usage accounting.
    async fn chat(
        &self,
        provider: &Arc<dyn LLMProvider>,
        system: &str,
        text: &str,
        images: Vec<ImageData>,
        temperature: f32,
    ) -> Result<String, Pdf2StudyError> {
        let messages = vec![
            ChatMessage::system(system),
            ChatMessage::user_with_images(text, images),
        ];
        let options = CompletionOptions {
            temperature: Some(temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        };

        let start = Instant::now();
        let response = tokio::time::timeout(self.api_timeout, provider.chat(&messages, Some(&options)))
            .await
            .map_err(|_| Pdf2StudyError::ApiTimeout {
                secs: self.api_timeout.as_secs(),
            })?
            .map_err(|e| {
                warn!("LLM call failed — {}", e);
                Pdf2StudyError::LlmApiError {
                    message: e.to_string(),
                }
            })?;

        self.calls.fetch_add(1, Ordering::Relaxed);
        self.input_tokens
            .fetch_add(response.prompt_tokens as u64, Ordering::Relaxed);
        self.output_tokens
            .fetch_add(response.completion_tokens as u64, Ordering::Relaxed);
        debug!(
            "{} input tokens, {} output tokens, {:?}",
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        Ok(response.content)
    }
}

impl GenerativeService for LlmService {
    async fn extract_chapters(
        &self,
        document: &[u8],
        instruction: &str,
    ) -> Result<Vec<ChapterInfo>, Pdf2StudyError> {
        let images = self.attachments(document).await?;
        let text = self
            .chat(&self.structure, STRUCTURE_SYSTEM_PROMPT, instruction, images, 0.0)
            .await?;
        parse_chapter_list(&text)
    }

    async fn extract_scalar(
        &self,
        document: &[u8],
        instruction: &str,
    ) -> Result<String, Pdf2StudyError> {
        let images = self.attachments(document).await?;
        self.chat(&self.structure, STRUCTURE_SYSTEM_PROMPT, instruction, images, 0.0)
            .await
    }

    async fn generate(
        &self,
        document: &[u8],
        instruction: &str,
        previous: Option<&str>,
    ) -> Result<String, Pdf2StudyError> {
        let images = self.attachments(document).await?;
        let text = match previous {
            Some(prev) => format!("{}\n\n{}", instruction, previous_attempt_context(prev)),
            None => instruction.to_string(),
        };
        self.chat(
            &self.generation,
            GENERATION_SYSTEM_PROMPT,
            &text,
            images,
            self.temperature,
        )
        .await
    }

    fn usage(&self) -> TokenUsage {
        TokenUsage {
            calls: self.calls.load(Ordering::Relaxed),
            input_tokens: self.input_tokens.load(Ordering::Relaxed),
            output_tokens: self.output_tokens.load(Ordering::Relaxed),
        }
    }
}

// ── Response parsing ────────────────────────────────────────────────────────

static RE_JSON_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:json|JSON)?[ \t]*\n(.*?)\n?```\s*$").unwrap());

/// Parse the structured chapter-list response.
///
/// Accepts `{"chapters": [...]}` or a bare array, optionally fenced. Any
/// record missing `title` or `start_page` is a schema mismatch.
pub fn parse_chapter_list(text: &str) -> Result<Vec<ChapterInfo>, Pdf2StudyError> {
    let trimmed = text.trim();
    let body = RE_JSON_FENCE
        .captures(trimmed)
        .and_then(|c| c.get(1))
        .map_or(trimmed, |m| m.as_str().trim());

    if body.starts_with('[') {
        return serde_json::from_str::<Vec<ChapterInfo>>(body).map_err(schema_mismatch);
    }
    serde_json::from_str::<ChapterList>(body)
        .map(|list| list.chapters)
        .map_err(schema_mismatch)
}

fn schema_mismatch(e: serde_json::Error) -> Pdf2StudyError {
    Pdf2StudyError::SchemaMismatch {
        detail: e.to_string(),
    }
}

/// Parse the scalar first-chapter answer as a positive integer.
pub fn parse_physical_page(answer: &str) -> Result<u32, Pdf2StudyError> {
    let trimmed = answer.trim();
    match trimmed.parse::<u32>() {
        Ok(n) if n >= 1 => Ok(n),
        _ => Err(Pdf2StudyError::InvalidPhysicalPage {
            answer: trimmed.to_string(),
        }),
    }
}
