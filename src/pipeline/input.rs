//! Input resolution: normalise a user-supplied path, directory or URL to a
//! list of local PDF files.
//!
//! ## Why download to a temp file?
//!
//! pdfium opens documents by path, and the splitter writes chapter files
//! beside a real file. Downloading to a `TempDir` gives us that path while
//! cleanup still happens automatically when [`ResolvedInput`] is dropped.
//! Magic bytes (`%PDF`) are checked up front so callers get a meaningful
//! error rather than a pdfium failure deep in the pipeline.

use crate::error::Pdf2StudyError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// The resolved input — local PDFs, or one downloaded temp file.
pub enum ResolvedInput {
    /// A single file or every PDF of a directory, sorted by name.
    Local(Vec<PathBuf>),
    /// Input was a URL; PDF downloaded to a temp directory.
    /// The `TempDir` is kept alive to prevent cleanup until processing completes.
    Downloaded { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedInput {
    /// Source documents in processing order.
    pub fn paths(&self) -> Vec<&Path> {
        match self {
            ResolvedInput::Local(paths) => paths.iter().map(PathBuf::as_path).collect(),
            ResolvedInput::Downloaded { path, .. } => vec![path.as_path()],
        }
    }

    pub fn is_downloaded(&self) -> bool {
        matches!(self, ResolvedInput::Downloaded { .. })
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to one or more local PDF paths.
///
/// * URL → downloaded to a temporary directory.
/// * directory → every `*.pdf` directly inside it (non-recursive).
/// * file → validated for existence, permissions and magic bytes.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, Pdf2StudyError> {
    if is_url(input) {
        return download_url(input, timeout_secs).await;
    }

    let path = PathBuf::from(input);
    if path.is_dir() {
        resolve_directory(&path)
    } else if path.exists() {
        Ok(ResolvedInput::Local(vec![resolve_local(&path)?]))
    } else if input.contains("://") {
        Err(Pdf2StudyError::InvalidInput {
            input: input.to_string(),
        })
    } else {
        Err(Pdf2StudyError::FileNotFound { path })
    }
}

/// Collect the PDFs of a directory, sorted by file name.
///
/// Files with a `.pdf` extension that fail the magic-byte check (or cannot be
/// opened) are skipped with a warning; only a directory left with no valid
/// PDF is an error.
fn resolve_directory(dir: &Path) -> Result<ResolvedInput, Pdf2StudyError> {
    let entries = std::fs::read_dir(dir).map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => Pdf2StudyError::PermissionDenied {
            path: dir.to_path_buf(),
        },
        _ => Pdf2StudyError::FileNotFound {
            path: dir.to_path_buf(),
        },
    })?;

    let mut candidates: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && has_pdf_extension(p))
        .collect();
    candidates.sort();

    // One unreadable or mislabelled file must not hide its siblings.
    let pdfs: Vec<PathBuf> = candidates
        .iter()
        .filter_map(|p| match resolve_local(p) {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("Skipping {}: {}", p.display(), e);
                None
            }
        })
        .collect();

    if pdfs.is_empty() {
        return Err(Pdf2StudyError::NoPdfFiles {
            dir: dir.to_path_buf(),
        });
    }

    info!("Found {} PDF(s) in {}", pdfs.len(), dir.display());
    Ok(ResolvedInput::Local(pdfs))
}

fn has_pdf_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

/// Validate a local file: readable and starting with `%PDF`.
fn resolve_local(path: &Path) -> Result<PathBuf, Pdf2StudyError> {
    match std::fs::File::open(path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            if f.read_exact(&mut magic).is_ok() && &magic != b"%PDF" {
                return Err(Pdf2StudyError::NotAPdf {
                    path: path.to_path_buf(),
                    magic,
                });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(Pdf2StudyError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(_) => {
            return Err(Pdf2StudyError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(path.to_path_buf())
}

/// Download a URL to a temporary directory and return the path.
async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, Pdf2StudyError> {
    info!("Downloading PDF from: {}", url);

    let failed = |reason: String| Pdf2StudyError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            Pdf2StudyError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let filename = filename_from_url(url);
    let temp_dir = TempDir::new().map_err(|e| Pdf2StudyError::Internal(e.to_string()))?;
    let file_path = temp_dir.path().join(&filename);

    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;

    if bytes.len() >= 4 && &bytes[..4] != b"%PDF" {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[..4]);
        return Err(Pdf2StudyError::NotAPdf {
            path: file_path,
            magic,
        });
    }

    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| Pdf2StudyError::OutputWriteFailed {
            path: file_path.clone(),
            source: e,
        })?;

    info!("Downloaded {} bytes to: {}", bytes.len(), file_path.display());

    Ok(ResolvedInput::Downloaded {
        path: file_path,
        _temp_dir: temp_dir,
    })
}

/// Last path segment of the URL when it names a file, else `downloaded.pdf`.
fn filename_from_url(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|last| !last.is_empty() && last.contains('.'))
        .unwrap_or_else(|| "downloaded.pdf".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
        let p = dir.join(name);
        std::fs::write(&p, contents).expect("write fixture");
        p
    }

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn filename_from_url_uses_last_segment() {
        assert_eq!(filename_from_url("https://x.org/books/calculus.pdf"), "calculus.pdf");
        assert_eq!(filename_from_url("https://x.org/download"), "downloaded.pdf");
        assert_eq!(filename_from_url("https://x.org/"), "downloaded.pdf");
    }

    #[tokio::test]
    async fn single_file_resolves() {
        let dir = tempfile::tempdir().expect("tempdir");
        let p = write(dir.path(), "book.pdf", b"%PDF-1.7 rest");

        let resolved = resolve_input(p.to_str().expect("utf8"), 5).await.expect("resolve");
        assert_eq!(resolved.paths(), vec![p.as_path()]);
        assert!(!resolved.is_downloaded());
    }

    #[tokio::test]
    async fn directory_yields_sorted_pdfs_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(dir.path(), "b.pdf", b"%PDF-1.4");
        write(dir.path(), "a.PDF", b"%PDF-1.4");
        write(dir.path(), "notes.txt", b"hello");
        std::fs::create_dir(dir.path().join("nested.pdf")).expect("mkdir");

        let resolved = resolve_input(dir.path().to_str().expect("utf8"), 5)
            .await
            .expect("resolve");
        let names: Vec<_> = resolved
            .paths()
            .iter()
            .map(|p| p.file_name().expect("name").to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.PDF", "b.pdf"]);
    }

    #[tokio::test]
    async fn empty_directory_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(dir.path(), "readme.md", b"# hi");

        let err = resolve_input(dir.path().to_str().expect("utf8"), 5)
            .await
            .err()
            .expect("should fail");
        assert!(matches!(err, Pdf2StudyError::NoPdfFiles { .. }));
    }

    #[tokio::test]
    async fn directory_skips_mislabelled_pdf_and_keeps_the_rest() {
        let dir = tempfile::tempdir().expect("tempdir");
        let good = write(dir.path(), "a.pdf", b"%PDF-1.7");
        write(dir.path(), "b.pdf", b"<html><body>404</body></html>");

        let resolved = resolve_input(dir.path().to_str().expect("utf8"), 5)
            .await
            .expect("valid sibling survives");
        assert_eq!(resolved.paths(), vec![good.as_path()]);
    }

    #[tokio::test]
    async fn directory_of_only_mislabelled_pdfs_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(dir.path(), "b.pdf", b"<html>");

        let err = resolve_input(dir.path().to_str().expect("utf8"), 5)
            .await
            .err()
            .expect("should fail");
        assert!(matches!(err, Pdf2StudyError::NoPdfFiles { .. }));
    }

    #[tokio::test]
    async fn non_pdf_is_rejected_by_magic() {
        let dir = tempfile::tempdir().expect("tempdir");
        let p = write(dir.path(), "fake.pdf", b"PK\x03\x04zip");

        let err = resolve_input(p.to_str().expect("utf8"), 5)
            .await
            .err()
            .expect("should fail");
        assert!(matches!(err, Pdf2StudyError::NotAPdf { magic, .. } if &magic == b"PK\x03\x04"));
    }

    #[tokio::test]
    async fn missing_file_and_bad_scheme() {
        let err = resolve_input("/definitely/not/here.pdf", 5).await.err().expect("fail");
        assert!(matches!(err, Pdf2StudyError::FileNotFound { .. }));

        let err = resolve_input("ftp://example.com/book.pdf", 5).await.err().expect("fail");
        assert!(matches!(err, Pdf2StudyError::InvalidInput { .. }));
    }
}
