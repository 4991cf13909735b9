//! Book-structure resolution.
//!
//! Two calls against bounded page prefixes of the source document:
//!
//! 1. the chapter list (titles and **logical** start pages), read from the
//!    first `chapter_scan_pages` pages where the table of contents sits;
//! 2. the **physical** page of the first numbered chapter, read from the
//!    first `physical_scan_pages` pages.
//!
//! Both must succeed. There is no retry at this layer: any failure abandons
//! the document before anything is split or generated.

use crate::error::Pdf2StudyError;
use crate::governor::RateGovernor;
use crate::model::{BookStructure, PageRange};
use crate::pipeline::llm::{parse_physical_page, GenerativeService};
use crate::pipeline::pdf::{self, PdfBackend};
use crate::prompts::{chapter_list_instruction, physical_page_instruction};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Resolve the chapter structure of `path`.
///
/// Fails without calling the service when either scan size is zero or the
/// document has no pages.
pub async fn resolve_structure<S: GenerativeService>(
    service: &S,
    governor: &RateGovernor,
    backend: &Arc<dyn PdfBackend>,
    path: &Path,
    chapter_scan_pages: usize,
    physical_scan_pages: usize,
) -> Result<BookStructure, Pdf2StudyError> {
    if chapter_scan_pages == 0 || physical_scan_pages == 0 {
        return Err(Pdf2StudyError::InvalidConfig(
            "scan page counts must be greater than zero".into(),
        ));
    }

    let total_pages = pdf::page_count(backend, path).await?;
    if total_pages == 0 {
        return Err(Pdf2StudyError::EmptyDocument {
            path: path.to_path_buf(),
        });
    }

    // ── Phase 1: chapter list ───────────────────────────────────────────
    let chapter_window = chapter_scan_pages.min(total_pages);
    let prefix = pdf::extract_pages(backend, path, PageRange::prefix(chapter_window)).await?;
    debug!("Chapter scan: first {} of {} pages", chapter_window, total_pages);

    governor.acquire().await;
    let chapters = service
        .extract_chapters(&prefix, &chapter_list_instruction(chapter_window))
        .await?;

    if chapters.is_empty() {
        return Err(Pdf2StudyError::SchemaMismatch {
            detail: "no numbered chapters returned".into(),
        });
    }
    if let Some(bad) = chapters.iter().find(|c| c.start_page < 1) {
        return Err(Pdf2StudyError::SchemaMismatch {
            detail: format!("chapter '{}' has start_page 0", bad.title),
        });
    }
    info!("Found {} chapters", chapters.len());

    // ── Phase 2: first-chapter physical page ────────────────────────────
    let physical_window = physical_scan_pages.min(total_pages);
    let prefix = if physical_window == chapter_window {
        prefix
    } else {
        pdf::extract_pages(backend, path, PageRange::prefix(physical_window)).await?
    };
    debug!("Physical scan: first {} of {} pages", physical_window, total_pages);

    governor.acquire().await;
    let answer = service
        .extract_scalar(&prefix, &physical_page_instruction(physical_window))
        .await?;
    let first_chapter_physical_page = parse_physical_page(&answer)?;
    info!("First numbered chapter starts on physical page {}", first_chapter_physical_page);

    Ok(BookStructure {
        chapters,
        first_chapter_physical_page,
    })
}
