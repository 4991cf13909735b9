//! PDF access through pdfium: page counts, sub-documents, chapter files,
//! rasterisation and metadata.
//!
//! ## Why spawn_blocking?
//!
//! pdfium is a C++ library with internal global state and is not safe to
//! drive from async code. Every entry point here is synchronous; async callers
//! go through [`run_blocking`], which moves the work onto tokio's blocking
//! pool.
//!
//! ## Why a trait?
//!
//! Structure resolution and splitting only need three operations. Putting
//! them behind [`PdfBackend`] lets the orchestration be tested against an
//! in-memory backend without a pdfium shared library on the machine.

use crate::error::Pdf2StudyError;
use crate::model::PageRange;
use crate::output::DocumentMetadata;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Page-level PDF operations the pipeline needs.
pub trait PdfBackend: Send + Sync {
    /// Number of physical pages in the document.
    fn page_count(&self, path: &Path) -> Result<usize, Pdf2StudyError>;

    /// Copy `range` into a new in-memory PDF and return its bytes.
    fn extract_pages(&self, path: &Path, range: PageRange) -> Result<Vec<u8>, Pdf2StudyError>;

    /// Copy `range` into a new PDF written at `dest`.
    fn write_pages(&self, path: &Path, range: PageRange, dest: &Path)
        -> Result<(), Pdf2StudyError>;
}

/// Bind to a pdfium shared library.
///
/// Search order: `PDFIUM_LIB_PATH`, the current directory, then the system
/// library path.
pub fn create_pdfium() -> Result<Pdfium, Pdf2StudyError> {
    let from_env = std::env::var("PDFIUM_LIB_PATH")
        .ok()
        .map(PathBuf::from)
        .filter(|p| p.exists());

    let bindings = match from_env {
        Some(path) => Pdfium::bind_to_library(&path),
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./")),
    }
    .or_else(|_| Pdfium::bind_to_system_library())
    .map_err(|e| Pdf2StudyError::PdfiumBindingFailed(format!("{:?}", e)))?;

    Ok(Pdfium::new(bindings))
}

/// Production backend over pdfium.
#[derive(Debug, Clone, Default)]
pub struct PdfiumBackend {
    password: Option<String>,
}

impl PdfiumBackend {
    pub fn new(password: Option<String>) -> Self {
        Self { password }
    }

    fn load<'a>(&'a self, pdfium: &'a Pdfium, path: &Path) -> Result<PdfDocument<'a>, Pdf2StudyError> {
        open_document(pdfium, path, self.password.as_deref())
    }
}

impl PdfBackend for PdfiumBackend {
    fn page_count(&self, path: &Path) -> Result<usize, Pdf2StudyError> {
        let pdfium = create_pdfium()?;
        let document = self.load(&pdfium, path)?;
        let total = document.pages().len() as usize;
        info!("PDF loaded: {} ({} pages)", path.display(), total);
        Ok(total)
    }

    fn extract_pages(&self, path: &Path, range: PageRange) -> Result<Vec<u8>, Pdf2StudyError> {
        let pdfium = create_pdfium()?;
        let source = self.load(&pdfium, path)?;
        let target = copy_range(&pdfium, &source, range)?;

        let bytes = target
            .save_to_bytes()
            .map_err(|e| Pdf2StudyError::Internal(format!("Failed to serialise sub-document: {:?}", e)))?;
        debug!("Extracted pages {} → {} bytes", range.human(), bytes.len());
        Ok(bytes)
    }

    fn write_pages(
        &self,
        path: &Path,
        range: PageRange,
        dest: &Path,
    ) -> Result<(), Pdf2StudyError> {
        let pdfium = create_pdfium()?;
        let source = self.load(&pdfium, path)?;
        let target = copy_range(&pdfium, &source, range)?;

        target.save_to_file(dest).map_err(|e| Pdf2StudyError::OutputWriteFailed {
            path: dest.to_path_buf(),
            source: std::io::Error::other(format!("{:?}", e)),
        })?;
        debug!("Wrote pages {} → {}", range.human(), dest.display());
        Ok(())
    }
}

/// Open a PDF, mapping pdfium's errors onto [`Pdf2StudyError`].
fn open_document<'a>(
    pdfium: &'a Pdfium,
    path: &Path,
    password: Option<&'a str>,
) -> Result<PdfDocument<'a>, Pdf2StudyError> {
    pdfium.load_pdf_from_file(path, password).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.to_lowercase().contains("password") {
            if password.is_some() {
                Pdf2StudyError::WrongPassword {
                    path: path.to_path_buf(),
                }
            } else {
                Pdf2StudyError::PasswordRequired {
                    path: path.to_path_buf(),
                }
            }
        } else {
            Pdf2StudyError::CorruptPdf {
                path: path.to_path_buf(),
                detail: err_str,
            }
        }
    })
}

/// Build a new document holding `range` of `source`.
fn copy_range<'a>(
    pdfium: &'a Pdfium,
    source: &PdfDocument<'a>,
    range: PageRange,
) -> Result<PdfDocument<'a>, Pdf2StudyError> {
    let total = source.pages().len() as usize;
    if !range.fits(total) {
        return Err(Pdf2StudyError::InvalidPageRange {
            start: range.start_index,
            end: range.end_index,
            total,
        });
    }

    let mut target = pdfium
        .create_new_pdf()
        .map_err(|e| Pdf2StudyError::Internal(format!("Failed to create PDF: {:?}", e)))?;

    let first = range.start_index as PdfPageIndex;
    let last = (range.end_index - 1) as PdfPageIndex;
    target
        .pages_mut()
        .copy_page_range_from_document(source, first..=last, 0)
        .map_err(|e| Pdf2StudyError::Internal(format!("Failed to copy pages {}: {:?}", range.human(), e)))?;

    Ok(target)
}

/// Rasterise every page of an in-memory PDF, longest edge capped at `max_pixels`.
pub fn render_pdf_bytes(bytes: &[u8], max_pixels: u32) -> Result<Vec<DynamicImage>, Pdf2StudyError> {
    let pdfium = create_pdfium()?;
    let document = pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|e| Pdf2StudyError::CorruptPdf {
            path: PathBuf::from("<memory>"),
            detail: format!("{:?}", e),
        })?;

    let render_config = PdfRenderConfig::new()
        .set_target_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let mut images = Vec::with_capacity(document.pages().len() as usize);
    for (idx, page) in document.pages().iter().enumerate() {
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| Pdf2StudyError::RasterisationFailed {
                page: idx + 1,
                detail: format!("{:?}", e),
            })?;
        let image = bitmap.as_image();
        debug!("Rendered page {} → {}x{} px", idx + 1, image.width(), image.height());
        images.push(image);
    }

    Ok(images)
}

/// Read document metadata without touching any page content.
pub fn read_metadata(path: &Path, password: Option<&str>) -> Result<DocumentMetadata, Pdf2StudyError> {
    let pdfium = create_pdfium()?;
    let document = open_document(&pdfium, path, password)?;
    let metadata = document.metadata();

    let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
        metadata
            .get(tag)
            .map(|t| t.value().trim().to_string())
            .filter(|v| !v.is_empty())
    };

    Ok(DocumentMetadata {
        title: get_meta(PdfDocumentMetadataTagType::Title),
        author: get_meta(PdfDocumentMetadataTagType::Author),
        subject: get_meta(PdfDocumentMetadataTagType::Subject),
        creator: get_meta(PdfDocumentMetadataTagType::Creator),
        producer: get_meta(PdfDocumentMetadataTagType::Producer),
        page_count: document.pages().len() as usize,
        pdf_version: format!("{:?}", document.version()),
    })
}

/// Run a blocking PDF operation on tokio's blocking pool.
pub async fn run_blocking<T, F>(what: &'static str, f: F) -> Result<T, Pdf2StudyError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, Pdf2StudyError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Pdf2StudyError::Internal(format!("{} task panicked: {}", what, e)))?
}

/// Async page count through any backend.
pub async fn page_count(backend: &Arc<dyn PdfBackend>, path: &Path) -> Result<usize, Pdf2StudyError> {
    let backend = Arc::clone(backend);
    let path = path.to_path_buf();
    run_blocking("Page count", move || backend.page_count(&path)).await
}

/// Async sub-document extraction through any backend.
pub async fn extract_pages(
    backend: &Arc<dyn PdfBackend>,
    path: &Path,
    range: PageRange,
) -> Result<Vec<u8>, Pdf2StudyError> {
    let backend = Arc::clone(backend);
    let path = path.to_path_buf();
    run_blocking("Page extraction", move || backend.extract_pages(&path, range)).await
}

/// Async chapter write through any backend.
pub async fn write_pages(
    backend: &Arc<dyn PdfBackend>,
    path: &Path,
    range: PageRange,
    dest: &Path,
) -> Result<(), Pdf2StudyError> {
    let backend = Arc::clone(backend);
    let path = path.to_path_buf();
    let dest = dest.to_path_buf();
    run_blocking("Chapter write", move || backend.write_pages(&path, range, &dest)).await
}

/// Async metadata extraction.
pub async fn extract_metadata(
    path: &Path,
    password: Option<&str>,
) -> Result<DocumentMetadata, Pdf2StudyError> {
    let path = path.to_path_buf();
    let pwd = password.map(|s| s.to_string());
    run_blocking("Metadata", move || read_metadata(&path, pwd.as_deref())).await
}
