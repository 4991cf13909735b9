//! Chapter splitting: map logical chapter starts onto physical page ranges
//! and write one PDF per chapter.
//!
//! Planning is pure ([`plan_split`]) so the page arithmetic can be tested
//! without a PDF library; [`split`] then writes the planned slices through a
//! [`PdfBackend`].
//!
//! ```text
//! offset        = first_chapter_physical_page - 1
//! start(i)      = offset + chapters[i].start_page - 1
//! end(i)        = start(i + 1)            (i < n - 1)
//! end(n - 1)    = total_pages
//! ```

use crate::error::{ChapterError, Pdf2StudyError};
use crate::model::{BookStructure, ChapterInfo, PageRange};
use crate::pipeline::pdf::{self, PdfBackend};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// One chapter that will be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterSlice {
    /// 1-based position in the sorted chapter list.
    pub ordinal: usize,
    pub title: String,
    pub range: PageRange,
    pub file_name: String,
}

/// The result of planning a split.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitPlan {
    pub slices: Vec<ChapterSlice>,
    pub skipped: Vec<ChapterError>,
}

/// The result of executing a split.
#[derive(Debug, Clone, Default)]
pub struct SplitReport {
    pub total_pages: usize,
    pub written: Vec<(ChapterSlice, PathBuf)>,
    pub skipped: Vec<ChapterError>,
}

impl SplitReport {
    pub fn written_count(&self) -> usize {
        self.written.len()
    }
}

/// Make a chapter title safe for use in a file name.
///
/// Alphanumerics, spaces and hyphens are kept, everything else becomes `_`;
/// surrounding space is trimmed and inner runs of spaces collapse to one `_`.
pub fn sanitize_title(title: &str) -> String {
    let replaced: String = title
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == ' ' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();

    replaced.split(' ').filter(|s| !s.is_empty()).collect::<Vec<_>>().join("_")
}

/// `Chapter_<ordinal>-<title>.pdf`, or `Chapter_<ordinal>.pdf` for blank titles.
pub fn chapter_file_name(ordinal: usize, title: &str) -> String {
    let safe = sanitize_title(title);
    if safe.is_empty() {
        format!("Chapter_{}.pdf", ordinal)
    } else {
        format!("Chapter_{}-{}.pdf", ordinal, safe)
    }
}

/// Compute the physical page range of every chapter.
///
/// Chapters are stably sorted by `start_page` first. A chapter whose start
/// falls outside `[0, total_pages)` is skipped with
/// [`ChapterError::OutOfBounds`]; one whose clamped range is empty is skipped
/// with [`ChapterError::EmptyRange`]. Neither aborts the plan.
pub fn plan_split(
    chapters: &[ChapterInfo],
    first_chapter_physical_page: u32,
    total_pages: usize,
) -> SplitPlan {
    let mut sorted: Vec<&ChapterInfo> = chapters.iter().collect();
    sorted.sort_by_key(|c| c.start_page);

    let offset = i64::from(first_chapter_physical_page) - 1;
    let total = total_pages as i64;
    let start_of = |c: &ChapterInfo| offset + i64::from(c.start_page) - 1;

    let mut plan = SplitPlan::default();
    for (i, chapter) in sorted.iter().copied().enumerate() {
        let ordinal = i + 1;
        let start = start_of(chapter);
        let end = sorted.get(i + 1).map_or(total, |&next| start_of(next)).min(total);

        if start < 0 || start >= total {
            warn!(
                "Chapter {} '{}': logical page {} maps to physical page {}, outside {} pages. Skipping.",
                ordinal,
                chapter.title,
                chapter.start_page,
                start + 1,
                total_pages
            );
            plan.skipped.push(ChapterError::OutOfBounds {
                ordinal,
                title: chapter.title.clone(),
                start_page: chapter.start_page,
                start_index: start,
                total_pages,
            });
            continue;
        }

        if end <= start {
            warn!("Chapter {} '{}': no pages. Skipping.", ordinal, chapter.title);
            plan.skipped.push(ChapterError::EmptyRange {
                ordinal,
                title: chapter.title.clone(),
            });
            continue;
        }

        plan.slices.push(ChapterSlice {
            ordinal,
            title: chapter.title.clone(),
            range: PageRange::new(start as usize, end as usize),
            file_name: chapter_file_name(ordinal, &chapter.title),
        });
    }

    plan
}

/// Split `source` according to `structure`, writing chapter PDFs into
/// `output_dir` (created if absent).
///
/// Only a failure to create the directory or read the source is fatal; a
/// failed chapter write is recorded as [`ChapterError::WriteFailed`].
pub async fn split(
    backend: &Arc<dyn PdfBackend>,
    source: &Path,
    structure: &BookStructure,
    output_dir: &Path,
) -> Result<SplitReport, Pdf2StudyError> {
    tokio::fs::create_dir_all(output_dir)
        .await
        .map_err(|e| Pdf2StudyError::OutputWriteFailed {
            path: output_dir.to_path_buf(),
            source: e,
        })?;

    let total_pages = pdf::page_count(backend, source).await?;
    let plan = plan_split(
        &structure.chapters,
        structure.first_chapter_physical_page,
        total_pages,
    );

    let mut report = SplitReport {
        total_pages,
        written: Vec::with_capacity(plan.slices.len()),
        skipped: plan.skipped,
    };

    for slice in plan.slices {
        let dest = output_dir.join(&slice.file_name);
        match pdf::write_pages(backend, source, slice.range, &dest).await {
            Ok(()) => {
                info!(
                    "Saved {} (physical pages {})",
                    dest.display(),
                    slice.range.human()
                );
                report.written.push((slice, dest));
            }
            Err(e) => {
                warn!("Chapter {} '{}': {}", slice.ordinal, slice.title, e);
                report.skipped.push(ChapterError::WriteFailed {
                    ordinal: slice.ordinal,
                    title: slice.title,
                    detail: e.to_string(),
                });
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn chapters(pairs: &[(&str, u32)]) -> Vec<ChapterInfo> {
        pairs.iter().map(|(t, p)| ChapterInfo::new(*t, *p)).collect()
    }

    #[test]
    fn scenario_offset_mapping() {
        let plan = plan_split(&chapters(&[("Ch1", 1), ("Ch2", 10)]), 5, 50);
        assert!(plan.skipped.is_empty());
        assert_eq!(plan.slices[0].range, PageRange::new(4, 13));
        assert_eq!(plan.slices[1].range, PageRange::new(13, 50));
        assert_eq!(plan.slices[0].range.human(), "5-13");
        assert_eq!(plan.slices[1].range.human(), "14-50");
    }

    #[test]
    fn scenario_out_of_bounds_is_skipped_and_first_clamped() {
        let plan = plan_split(&chapters(&[("Ch1", 1), ("Ch2", 10)]), 1, 8);
        assert_eq!(plan.slices.len(), 1);
        assert_eq!(plan.slices[0].range, PageRange::new(0, 8));
        assert_eq!(
            plan.skipped,
            vec![ChapterError::OutOfBounds {
                ordinal: 2,
                title: "Ch2".into(),
                start_page: 10,
                start_index: 9,
                total_pages: 8,
            }]
        );
    }

    #[test]
    fn unsorted_input_is_sorted_first() {
        let plan = plan_split(&chapters(&[("B", 20), ("A", 1), ("C", 35)]), 3, 60);
        let titles: Vec<_> = plan.slices.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "B", "C"]);
        assert_eq!(plan.slices[0].file_name, "Chapter_1-A.pdf");
    }

    #[test]
    fn ranges_are_contiguous_and_end_at_total() {
        let lists: &[&[(&str, u32)]] = &[
            &[("a", 1), ("b", 2), ("c", 3)],
            &[("a", 1), ("b", 17), ("c", 18), ("d", 90)],
            &[("a", 4), ("b", 9)],
            &[("only", 1)],
        ];
        for list in lists {
            for first in [1u32, 2, 7] {
                let total = 120;
                let plan = plan_split(&chapters(list), first, total);
                assert!(plan.skipped.is_empty(), "{list:?} first={first}");
                for pair in plan.slices.windows(2) {
                    assert_eq!(pair[0].range.end_index, pair[1].range.start_index);
                }
                assert_eq!(plan.slices.last().expect("non-empty").range.end_index, total);
            }
        }
    }

    #[test]
    fn negative_start_is_skipped() {
        // Logical page 0 maps to physical index -1.
        let plan = plan_split(&chapters(&[("Zero", 0), ("One", 1)]), 1, 10);
        assert!(matches!(
            plan.skipped[0],
            ChapterError::OutOfBounds { start_index: -1, .. }
        ));
        assert_eq!(plan.slices[0].range, PageRange::new(0, 10));
    }

    #[test]
    fn duplicate_starts_yield_empty_range() {
        let plan = plan_split(&chapters(&[("A", 5), ("A again", 5), ("B", 9)]), 1, 20);
        assert_eq!(
            plan.skipped,
            vec![ChapterError::EmptyRange {
                ordinal: 1,
                title: "A".into()
            }]
        );
        assert_eq!(plan.slices[0].title, "A again");
        assert_eq!(plan.slices[0].range, PageRange::new(4, 8));
    }

    #[test]
    fn title_sanitisation() {
        assert_eq!(sanitize_title("Limits & Continuity"), "Limits___Continuity");
        assert_eq!(sanitize_title("  Vector   Spaces "), "Vector_Spaces");
        assert_eq!(sanitize_title("Ch. 3: Self-Adjoint/Normal"), "Ch__3__Self-Adjoint_Normal");
        assert_eq!(sanitize_title("Équations différentielles"), "Équations_différentielles");
        assert_eq!(sanitize_title(""), "");
        assert_eq!(chapter_file_name(4, "???"), "Chapter_4-___.pdf");
        assert_eq!(chapter_file_name(4, "   "), "Chapter_4.pdf");
    }

    struct RecordingBackend {
        pages: usize,
        fail_on: Option<String>,
        writes: Mutex<Vec<(PageRange, PathBuf)>>,
    }

    impl PdfBackend for RecordingBackend {
        fn page_count(&self, _path: &Path) -> Result<usize, Pdf2StudyError> {
            Ok(self.pages)
        }
        fn extract_pages(&self, _path: &Path, range: PageRange) -> Result<Vec<u8>, Pdf2StudyError> {
            Ok(vec![0; range.len()])
        }
        fn write_pages(&self, _p: &Path, range: PageRange, dest: &Path) -> Result<(), Pdf2StudyError> {
            let name = dest.file_name().map(|n| n.to_string_lossy().into_owned());
            if name.is_some() && name == self.fail_on {
                return Err(Pdf2StudyError::Internal("disk full".into()));
            }
            self.writes.lock().expect("lock").push((range, dest.to_path_buf()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn split_writes_planned_slices_and_records_failures() {
        let dir = tempfile::tempdir().expect("tempdir");
        let out = dir.path().join("book_chapters");
        let recording = Arc::new(RecordingBackend {
            pages: 50,
            fail_on: Some("Chapter_2-Ch2.pdf".into()),
            writes: Mutex::new(Vec::new()),
        });
        let backend: Arc<dyn PdfBackend> = recording.clone();
        let structure = BookStructure {
            chapters: chapters(&[("Ch1", 1), ("Ch2", 10), ("Ch3", 80)]),
            first_chapter_physical_page: 5,
        };

        let report = split(&backend, Path::new("book.pdf"), &structure, &out)
            .await
            .expect("split");

        assert!(out.is_dir());
        assert_eq!(report.total_pages, 50);
        assert_eq!(report.written_count(), 1);
        assert_eq!(report.written[0].1, out.join("Chapter_1-Ch1.pdf"));
        assert_eq!(report.skipped.len(), 2);
        assert!(matches!(report.skipped[0], ChapterError::OutOfBounds { ordinal: 3, .. }));
        assert!(matches!(report.skipped[1], ChapterError::WriteFailed { ordinal: 2, .. }));
        assert_eq!(recording.writes.lock().expect("lock")[0].0, PageRange::new(4, 13));
    }
}
