//! Study-sheet generation: a bounded generate → validate → correct loop.
//!
//! ```text
//!  Init ─▶ Generating ─▶ CheckingFormat ─▶ Validating ─▶ Accepted
//!              ▲               │                │
//!              │               ▼                ▼
//!              └─────────── Correcting ◀────────┘
//!                              │
//!                              ▼
//!                          Exhausted
//! ```
//!
//! Every attempt ends in an [`AttemptVerdict`]. `Correctable` verdicts carry
//! the error text that parameterises the next correction request, plus the
//! cooldown to observe first. At most `max_retries + 1` generations are made;
//! whatever the last one produced is persisted, valid or not.

use crate::config::StudyConfig;
use crate::error::Pdf2StudyError;
use crate::governor::RateGovernor;
use crate::model::GenerationAttempt;
use crate::output::GenerationStatus;
use crate::pipeline::compile::{CompileOutcome, Compiler};
use crate::pipeline::llm::GenerativeService;
use crate::pipeline::sanitize::{has_root_marker, sanitize_latex};
use crate::prompts::{correction_instruction, elaborate_instruction, FORMAT_ERROR_MESSAGE};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// States of one chapter's correction loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationState {
    Init,
    Generating,
    CheckingFormat,
    Validating,
    Correcting,
    Accepted,
    Exhausted,
}

/// How a single attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptVerdict {
    /// Final. `validated` is false when the compiler was unavailable.
    Accepted {
        validated: bool,
        artifact: Option<PathBuf>,
    },
    /// Try again after `cooldown`, feeding `error` back to the service.
    Correctable { error: String, cooldown: Duration },
}

/// One chapter to generate a study sheet for.
#[derive(Debug, Clone, Copy)]
pub struct ChapterJob<'a> {
    pub ordinal: usize,
    /// Chapters being generated for the document, for log lines.
    pub total: usize,
    /// Chapter PDF bytes attached to every request.
    pub document: &'a [u8],
    /// Where `<base_name>.tex` and the compiled PDF go.
    pub results_dir: &'a Path,
    pub base_name: &'a str,
}

/// Result of a finished correction loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationOutcome {
    pub status: GenerationStatus,
    /// Generations consumed.
    pub attempts: u32,
    /// Error of the final attempt, if it was rejected.
    pub last_error: Option<String>,
    /// The persisted source file.
    pub source_path: PathBuf,
    pub artifact: Option<PathBuf>,
}

/// Prefix for service or compiler failures that are not compile errors.
fn generic_error(e: &Pdf2StudyError) -> String {
    format!("Generic error during generation/compilation: {e}")
}

/// Run the correction loop for one chapter.
///
/// Only a failure to persist the final source is returned as `Err`; every
/// service or compiler failure along the way is fed back as a correctable
/// error.
pub async fn generate_chapter<S, C>(
    service: &S,
    compiler: &C,
    governor: &RateGovernor,
    job: ChapterJob<'_>,
    config: &StudyConfig,
) -> Result<GenerationOutcome, Pdf2StudyError>
where
    S: GenerativeService,
    C: Compiler,
{
    let max_attempts = config.max_attempts();
    let format_cooldown = Duration::from_millis(config.format_cooldown_ms);
    let compile_cooldown = Duration::from_millis(config.compile_cooldown_ms);
    let source_path = job.results_dir.join(format!("{}.tex", job.base_name));

    let mut state = GenerationState::Init;
    let mut attempt = GenerationAttempt::default();
    let mut verdict: Option<AttemptVerdict> = None;

    loop {
        let next = match state {
            GenerationState::Init => GenerationState::Generating,

            GenerationState::Generating => {
                if let Some(cb) = &config.progress_callback {
                    cb.on_attempt(job.ordinal, attempt.ordinal, max_attempts);
                }

                // A correction needs a previous text to correct; after a
                // service failure on the first attempt there is none yet.
                let previous = (!attempt.text.is_empty()).then(|| attempt.text.clone());
                let instruction = match (&previous, &attempt.error) {
                    (Some(_), Some(error)) => correction_instruction(error),
                    _ => elaborate_instruction(config.subject.as_deref(), &config.language),
                };

                governor.acquire().await;
                info!(
                    "Chapter {}/{}: generation attempt {}/{}",
                    job.ordinal,
                    job.total,
                    attempt.ordinal + 1,
                    max_attempts
                );

                match service
                    .generate(job.document, &instruction, previous.as_deref())
                    .await
                {
                    Ok(raw) => {
                        attempt.text = sanitize_latex(&raw);
                        attempt.error = None;
                        GenerationState::CheckingFormat
                    }
                    Err(e) => {
                        warn!("Chapter {}: {}", job.ordinal, e);
                        verdict = Some(AttemptVerdict::Correctable {
                            error: generic_error(&e),
                            cooldown: compile_cooldown,
                        });
                        GenerationState::Correcting
                    }
                }
            }

            GenerationState::CheckingFormat => {
                if has_root_marker(&attempt.text) {
                    GenerationState::Validating
                } else {
                    warn!("Chapter {}: {}", job.ordinal, FORMAT_ERROR_MESSAGE);
                    verdict = Some(AttemptVerdict::Correctable {
                        error: FORMAT_ERROR_MESSAGE.to_string(),
                        cooldown: format_cooldown,
                    });
                    GenerationState::Correcting
                }
            }

            GenerationState::Validating => {
                let v = validate(compiler, &attempt.text, &source_path, job.results_dir, compile_cooldown)
                    .await;
                let next = match &v {
                    AttemptVerdict::Accepted { .. } => GenerationState::Accepted,
                    AttemptVerdict::Correctable { .. } => GenerationState::Correcting,
                };
                verdict = Some(v);
                next
            }

            GenerationState::Correcting => {
                if let Some(AttemptVerdict::Correctable { error, cooldown }) = &verdict {
                    attempt.error = Some(error.clone());
                    if attempt.ordinal + 1 >= max_attempts {
                        GenerationState::Exhausted
                    } else {
                        if !cooldown.is_zero() {
                            debug!("Chapter {}: cooling down {:?}", job.ordinal, cooldown);
                            sleep(*cooldown).await;
                        }
                        attempt.ordinal += 1;
                        GenerationState::Generating
                    }
                } else {
                    GenerationState::Exhausted
                }
            }

            GenerationState::Accepted | GenerationState::Exhausted => break,
        };

        debug!("Chapter {}: {:?} → {:?}", job.ordinal, state, next);
        state = next;
    }

    // The last attempt survives whatever happened.
    write_source(&source_path, &attempt.text).await?;

    let attempts = attempt.ordinal + 1;
    let (status, artifact) = match verdict {
        Some(AttemptVerdict::Accepted {
            validated: true,
            artifact,
        }) => (GenerationStatus::Accepted, artifact),
        Some(AttemptVerdict::Accepted {
            validated: false, ..
        }) => (GenerationStatus::SoftAccepted, None),
        _ => (GenerationStatus::Exhausted, None),
    };

    match status {
        GenerationStatus::Exhausted => warn!(
            "Chapter {}: no valid document after {} attempts; kept the last one at {}",
            job.ordinal,
            attempts,
            source_path.display()
        ),
        GenerationStatus::SoftAccepted => warn!(
            "Chapter {}: compiler unavailable; kept unvalidated source at {}",
            job.ordinal,
            source_path.display()
        ),
        _ => info!(
            "Chapter {}: accepted after {} attempt(s)",
            job.ordinal, attempts
        ),
    }

    Ok(GenerationOutcome {
        status,
        attempts,
        last_error: match status {
            GenerationStatus::Exhausted => attempt.error,
            _ => None,
        },
        source_path,
        artifact,
    })
}

/// Persist `text` and ask the compiler for a verdict.
async fn validate<C: Compiler>(
    compiler: &C,
    text: &str,
    source_path: &Path,
    results_dir: &Path,
    compile_cooldown: Duration,
) -> AttemptVerdict {
    let correctable = |error: String| AttemptVerdict::Correctable {
        error,
        cooldown: compile_cooldown,
    };

    if let Err(e) = write_source(source_path, text).await {
        return correctable(generic_error(&e));
    }

    match compiler.compile(source_path, results_dir).await {
        Ok(CompileOutcome::Success { artifact }) => AttemptVerdict::Accepted {
            validated: true,
            artifact,
        },
        Ok(CompileOutcome::ToolchainMissing) => AttemptVerdict::Accepted {
            validated: false,
            artifact: None,
        },
        Ok(CompileOutcome::Failed { diagnostics }) => {
            warn!("Compilation failed:\n{}", diagnostics);
            correctable(diagnostics)
        }
        Err(e) => correctable(generic_error(&e)),
    }
}

async fn write_source(path: &Path, text: &str) -> Result<(), Pdf2StudyError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Pdf2StudyError::OutputWriteFailed {
                path: parent.to_path_buf(),
                source: e,
            })?;
    }
    tokio::fs::write(path, text)
        .await
        .map_err(|e| Pdf2StudyError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ChapterInfo;
    use crate::output::TokenUsage;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    const VALID: &str = "\\documentclass{article}\n\\begin{document}\nx\n\\end{document}\n";

    /// Records every generation request and replays scripted responses.
    #[derive(Default)]
    struct ScriptedGenerator {
        responses: Mutex<VecDeque<Result<String, String>>>,
        requests: Mutex<Vec<(String, Option<String>)>>,
    }

    impl ScriptedGenerator {
        fn new(responses: Vec<Result<&str, &str>>) -> Self {
            Self {
                responses: Mutex::new(
                    responses
                        .into_iter()
                        .map(|r| r.map(str::to_string).map_err(str::to_string))
                        .collect(),
                ),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.requests.lock().expect("lock").len()
        }
    }

    impl GenerativeService for ScriptedGenerator {
        async fn extract_chapters(&self, _d: &[u8], _i: &str) -> Result<Vec<ChapterInfo>, Pdf2StudyError> {
            unreachable!()
        }

        async fn extract_scalar(&self, _d: &[u8], _i: &str) -> Result<String, Pdf2StudyError> {
            unreachable!()
        }

        async fn generate(
            &self,
            _document: &[u8],
            instruction: &str,
            previous: Option<&str>,
        ) -> Result<String, Pdf2StudyError> {
            self.requests
                .lock()
                .expect("lock")
                .push((instruction.to_string(), previous.map(str::to_string)));
            let next = self.responses.lock().expect("lock").pop_front();
            match next {
                Some(Ok(text)) => Ok(text),
                Some(Err(message)) => Err(Pdf2StudyError::LlmApiError { message }),
                None => Ok(VALID.to_string()),
            }
        }

        fn usage(&self) -> TokenUsage {
            TokenUsage {
                calls: self.calls() as u64,
                ..Default::default()
            }
        }
    }

    struct ScriptedCompiler {
        outcomes: Mutex<VecDeque<CompileOutcome>>,
        fallback: CompileOutcome,
        calls: Mutex<u32>,
    }

    impl ScriptedCompiler {
        fn always(outcome: CompileOutcome) -> Self {
            Self::new(vec![], outcome)
        }

        fn new(outcomes: Vec<CompileOutcome>, fallback: CompileOutcome) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                fallback,
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().expect("lock")
        }
    }

    impl Compiler for ScriptedCompiler {
        async fn compile(&self, source: &Path, _out: &Path) -> Result<CompileOutcome, Pdf2StudyError> {
            assert!(source.exists(), "source must be written before compiling");
            *self.calls.lock().expect("lock") += 1;
            let next = self.outcomes.lock().expect("lock").pop_front();
            Ok(next.unwrap_or_else(|| self.fallback.clone()))
        }
    }

    fn config(max_retries: u32) -> StudyConfig {
        StudyConfig::builder()
            .max_retries(max_retries)
            .cooldowns_ms(0, 0)
            .build()
            .expect("valid config")
    }

    fn governor() -> RateGovernor {
        RateGovernor::new(1000, Duration::from_secs(60))
    }

    fn job(dir: &Path) -> ChapterJob<'_> {
        ChapterJob {
            ordinal: 1,
            total: 1,
            document: b"%PDF-chapter",
            results_dir: dir,
            base_name: "Chapter_1-Limits-flashcards",
        }
    }

    fn success() -> CompileOutcome {
        CompileOutcome::Success { artifact: None }
    }

    fn failed(msg: &str) -> CompileOutcome {
        CompileOutcome::Failed {
            diagnostics: msg.to_string(),
        }
    }

    #[tokio::test]
    async fn accepted_on_first_attempt() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = ScriptedGenerator::new(vec![Ok(VALID)]);
        let compiler = ScriptedCompiler::always(success());

        let out = generate_chapter(&service, &compiler, &governor(), job(dir.path()), &config(3))
            .await
            .expect("outcome");

        assert_eq!(out.status, GenerationStatus::Accepted);
        assert_eq!(out.attempts, 1);
        assert_eq!(service.calls(), 1);
        assert_eq!(std::fs::read_to_string(&out.source_path).expect("read"), VALID);
    }

    #[tokio::test]
    async fn format_error_then_success() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = ScriptedGenerator::new(vec![Ok("Here is your study sheet!"), Ok(VALID)]);
        let compiler = ScriptedCompiler::always(success());

        let out = generate_chapter(&service, &compiler, &governor(), job(dir.path()), &config(3))
            .await
            .expect("outcome");

        assert_eq!(out.status, GenerationStatus::Accepted);
        assert_eq!(out.attempts, 2);
        assert_eq!(service.calls(), 2);
        // The compiler never saw the malformed attempt.
        assert_eq!(compiler.calls(), 1);

        let requests = service.requests.lock().expect("lock");
        assert_eq!(requests[0].1, None);
        assert!(requests[1].0.contains(FORMAT_ERROR_MESSAGE));
        assert_eq!(requests[1].1.as_deref(), Some("Here is your study sheet!\n"));
    }

    #[tokio::test]
    async fn missing_toolchain_soft_accepts_after_one_attempt() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = ScriptedGenerator::new(vec![Ok(VALID)]);
        let compiler = ScriptedCompiler::always(CompileOutcome::ToolchainMissing);

        let out = generate_chapter(&service, &compiler, &governor(), job(dir.path()), &config(3))
            .await
            .expect("outcome");

        assert_eq!(out.status, GenerationStatus::SoftAccepted);
        assert_eq!(out.attempts, 1);
        assert_eq!(service.calls(), 1);
        assert!(out.artifact.is_none());
        assert_eq!(std::fs::read_to_string(&out.source_path).expect("read"), VALID);
    }

    #[tokio::test]
    async fn exhaustion_persists_last_invalid_attempt() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = ScriptedGenerator::new(vec![
            Ok("\\documentclass{article} v1"),
            Ok("\\documentclass{article} v2"),
            Ok("\\documentclass{article} v3"),
            Ok("\\documentclass{article} v4"),
            Ok("never requested"),
        ]);
        let compiler = ScriptedCompiler::always(failed("! Undefined control sequence."));

        let out = generate_chapter(&service, &compiler, &governor(), job(dir.path()), &config(3))
            .await
            .expect("outcome");

        assert_eq!(out.status, GenerationStatus::Exhausted);
        assert_eq!(out.attempts, 4);
        assert_eq!(service.calls(), 4);
        assert_eq!(compiler.calls(), 4);
        assert_eq!(out.last_error.as_deref(), Some("! Undefined control sequence."));
        assert_eq!(
            std::fs::read_to_string(&out.source_path).expect("read"),
            "\\documentclass{article} v4\n"
        );

        let requests = service.requests.lock().expect("lock");
        assert!(requests[3].0.contains("! Undefined control sequence."));
        assert_eq!(requests[3].1.as_deref(), Some("\\documentclass{article} v3\n"));
    }

    #[tokio::test]
    async fn zero_retries_means_single_attempt() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = ScriptedGenerator::new(vec![Ok("no marker")]);
        let compiler = ScriptedCompiler::always(success());

        let out = generate_chapter(&service, &compiler, &governor(), job(dir.path()), &config(0))
            .await
            .expect("outcome");

        assert_eq!(out.status, GenerationStatus::Exhausted);
        assert_eq!(out.attempts, 1);
        assert_eq!(out.last_error.as_deref(), Some(FORMAT_ERROR_MESSAGE));
        assert_eq!(std::fs::read_to_string(&out.source_path).expect("read"), "no marker\n");
    }

    #[tokio::test]
    async fn service_error_is_correctable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = ScriptedGenerator::new(vec![Err("429 Too Many Requests"), Ok(VALID)]);
        let compiler = ScriptedCompiler::new(vec![failed("Missing $ inserted.")], success());

        let out = generate_chapter(&service, &compiler, &governor(), job(dir.path()), &config(3))
            .await
            .expect("outcome");

        assert_eq!(out.status, GenerationStatus::Accepted);
        assert_eq!(out.attempts, 3);

        let requests = service.requests.lock().expect("lock");
        // No text to correct yet, so the first retry regenerates from scratch.
        assert_eq!(requests[1].1, None);
        assert!(!requests[1].0.contains("Generic error"));
        // The compile error is then fed back with the text.
        assert!(requests[2].0.contains("Missing $ inserted."));
        assert!(requests[2].1.is_some());
    }

    #[tokio::test]
    async fn every_generation_passes_through_governor() {
        let dir = tempfile::tempdir().expect("tempdir");
        let gov = governor();
        let service = ScriptedGenerator::new(vec![Ok("x"), Ok("y"), Ok(VALID)]);
        let compiler = ScriptedCompiler::always(success());

        generate_chapter(&service, &compiler, &gov, job(dir.path()), &config(5))
            .await
            .expect("outcome");
        assert_eq!(gov.in_flight().await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cooldowns_are_observed_except_after_last_attempt() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = ScriptedGenerator::new(vec![Ok("a"), Ok("b"), Ok("c")]);
        let compiler = ScriptedCompiler::always(success());
        let cfg = StudyConfig::builder()
            .max_retries(2)
            .cooldowns_ms(1000, 2000)
            .build()
            .expect("valid");

        let start = tokio::time::Instant::now();
        let out = generate_chapter(&service, &compiler, &governor(), job(dir.path()), &cfg)
            .await
            .expect("outcome");

        assert_eq!(out.status, GenerationStatus::Exhausted);
        // Two format cooldowns between three attempts, none after the last.
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }
}
