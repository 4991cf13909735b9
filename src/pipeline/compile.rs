//! The compiler oracle: decides whether generated LaTeX is valid.
//!
//! A missing toolchain is reported separately from a compilation error, so
//! the generator can soft-accept instead of burning its retry budget on a
//! machine that cannot validate anything.

use crate::error::Pdf2StudyError;
use std::future::Future;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, warn};

/// Auxiliary files removed after every compile.
const AUX_EXTENSIONS: [&str; 5] = ["aux", "log", "out", "fls", "fdb_latexmk"];

/// At most this many diagnostic lines are fed back to the model.
pub const MAX_DIAGNOSTIC_LINES: usize = 10;

/// Trailing stdout characters used when the log yields no diagnostics.
const STDOUT_TAIL_CHARS: usize = 500;

/// Observable result of one compile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileOutcome {
    /// Compiled cleanly; `artifact` is the produced PDF when it exists.
    Success { artifact: Option<PathBuf> },
    /// The compiler executable could not be found.
    ToolchainMissing,
    /// Compilation failed with these diagnostics.
    Failed { diagnostics: String },
}

/// Anything that can validate a source file.
pub trait Compiler: Send + Sync {
    /// Compile `source`, placing output in `out_dir`.
    ///
    /// `Err` is reserved for unexpected failures (e.g. spawn errors other
    /// than a missing executable).
    fn compile(
        &self,
        source: &Path,
        out_dir: &Path,
    ) -> impl Future<Output = Result<CompileOutcome, Pdf2StudyError>> + Send;
}

/// `xelatex` (or a compatible engine) run as a child process.
#[derive(Debug, Clone)]
pub struct XelatexCompiler {
    program: String,
}

impl XelatexCompiler {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Default for XelatexCompiler {
    fn default() -> Self {
        Self::new("xelatex")
    }
}

impl Compiler for XelatexCompiler {
    async fn compile(&self, source: &Path, out_dir: &Path) -> Result<CompileOutcome, Pdf2StudyError> {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        debug!("Compiling {} with {}", source.display(), self.program);

        let output = Command::new(&self.program)
            .arg("-interaction=nonstopmode")
            .arg("-c-style-errors")
            .arg("-output-directory")
            .arg(out_dir)
            .arg(source)
            .output()
            .await;

        let output = match output {
            Ok(o) => o,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("'{}' not found; install a LaTeX distribution (TeX Live, MiKTeX) and add it to PATH", self.program);
                return Ok(CompileOutcome::ToolchainMissing);
            }
            Err(e) => {
                return Err(Pdf2StudyError::CompilerFailed {
                    program: self.program.clone(),
                    detail: e.to_string(),
                })
            }
        };

        let outcome = if output.status.success() {
            let artifact = out_dir.join(format!("{stem}.pdf"));
            CompileOutcome::Success {
                artifact: tokio::fs::try_exists(&artifact)
                    .await
                    .unwrap_or(false)
                    .then_some(artifact),
            }
        } else {
            let log = tokio::fs::read(out_dir.join(format!("{stem}.log")))
                .await
                .map(|b| String::from_utf8_lossy(&b).into_owned())
                .unwrap_or_default();
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);

            let mut diagnostics = extract_diagnostics(&log, &stderr, &stdout);
            if diagnostics.trim().is_empty() {
                diagnostics = format!("{} exited with {}", self.program, output.status);
            }
            CompileOutcome::Failed { diagnostics }
        };

        clean_aux_files(out_dir, &stem).await;
        Ok(outcome)
    }
}

/// Pick the lines of a compiler log worth showing the model.
///
/// Lines starting with `!` or mentioning a known fatal keyword are kept, up
/// to [`MAX_DIAGNOSTIC_LINES`]. Without any, falls back to stderr plus the
/// tail of stdout.
pub fn extract_diagnostics(log: &str, stderr: &str, stdout: &str) -> String {
    const KEYWORDS: [&str; 4] = [
        "fatal error",
        "undefined control sequence",
        "missing",
        "runaway argument",
    ];

    let lines: Vec<&str> = log
        .lines()
        .filter(|line| {
            let lower = line.to_lowercase();
            line.starts_with('!') || KEYWORDS.iter().any(|k| lower.contains(k))
        })
        .take(MAX_DIAGNOSTIC_LINES)
        .collect();

    if !lines.is_empty() {
        return lines.join("\n");
    }

    let tail_start = stdout
        .char_indices()
        .rev()
        .nth(STDOUT_TAIL_CHARS - 1)
        .map_or(0, |(i, _)| i);
    format!("{}\n{}", stderr, &stdout[tail_start..])
}

async fn clean_aux_files(out_dir: &Path, stem: &str) {
    for ext in AUX_EXTENSIONS {
        let path = out_dir.join(format!("{stem}.{ext}"));
        match tokio::fs::remove_file(&path).await {
            Ok(()) => debug!("Removed {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove {}: {}", path.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostics_keep_marked_and_keyword_lines() {
        let log = "This is XeTeX\n\
                   ! Undefined control sequence.\n\
                   l.12 \\foo\n\
                   Missing $ inserted.\n\
                   (./chapter.aux)\n\
                   Runaway argument?\n\
                   ! Emergency stop.";
        assert_eq!(
            extract_diagnostics(log, "", ""),
            "! Undefined control sequence.\nMissing $ inserted.\nRunaway argument?\n! Emergency stop."
        );
    }

    #[test]
    fn diagnostics_are_capped() {
        let log = (0..25).map(|i| format!("! error {i}")).collect::<Vec<_>>().join("\n");
        let out = extract_diagnostics(&log, "", "");
        assert_eq!(out.lines().count(), MAX_DIAGNOSTIC_LINES);
        assert!(out.ends_with("! error 9"));
    }

    #[test]
    fn diagnostics_fall_back_to_process_output() {
        let stdout = "x".repeat(800) + "END";
        let out = extract_diagnostics("nothing useful", "kpathsea: oops", &stdout);
        assert!(out.starts_with("kpathsea: oops\n"));
        let tail = out.split_once('\n').expect("newline").1;
        assert_eq!(tail.chars().count(), STDOUT_TAIL_CHARS);
        assert!(tail.ends_with("END"));
    }

    #[test]
    fn diagnostics_fallback_with_short_stdout() {
        assert_eq!(extract_diagnostics("", "err", "short"), "err\nshort");
    }

    #[tokio::test]
    async fn missing_program_is_toolchain_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let compiler = XelatexCompiler::new("pdf2study-no-such-compiler");
        let outcome = compiler
            .compile(&dir.path().join("a.tex"), dir.path())
            .await
            .expect("no hard error");
        assert_eq!(outcome, CompileOutcome::ToolchainMissing);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn zero_exit_is_success_and_aux_files_are_removed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let aux = dir.path().join("sheet.aux");
        std::fs::write(&aux, "aux").expect("write");

        let outcome = XelatexCompiler::new("true")
            .compile(&dir.path().join("sheet.tex"), dir.path())
            .await
            .expect("ran");
        assert_eq!(outcome, CompileOutcome::Success { artifact: None });
        assert!(!aux.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_reads_log_diagnostics() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = dir.path().join("sheet.log");
        std::fs::write(&log, "ok line\n! LaTeX Error: Environment foo undefined.\n").expect("write");

        let outcome = XelatexCompiler::new("false")
            .compile(&dir.path().join("sheet.tex"), dir.path())
            .await
            .expect("ran");
        assert_eq!(
            outcome,
            CompileOutcome::Failed {
                diagnostics: "! LaTeX Error: Environment foo undefined.".into()
            }
        );
        assert!(!log.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_without_output_names_the_status() {
        let dir = tempfile::tempdir().expect("tempdir");
        let outcome = XelatexCompiler::new("false")
            .compile(&dir.path().join("sheet.tex"), dir.path())
            .await
            .expect("ran");
        match outcome {
            CompileOutcome::Failed { diagnostics } => assert!(diagnostics.starts_with("false exited with")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
