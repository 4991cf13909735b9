//! Book-structure data model shared by the resolver, splitter and generator.
//!
//! Two page-numbering systems meet here and are easy to confuse:
//!
//! * **Logical** pages are the numbers printed inside the book
//!   ([`ChapterInfo::start_page`]).
//! * **Physical** pages are positions inside the PDF file
//!   ([`BookStructure::first_chapter_physical_page`] is 1-based,
//!   [`PageRange`] is 0-based and half-open).
//!
//! The bridge between them is a single offset: the physical page on which
//! logical page 1 is printed.

use serde::{Deserialize, Serialize};

/// One numbered chapter as reported by the structure extraction call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterInfo {
    /// Chapter title exactly as printed.
    pub title: String,
    /// 1-based **logical** page on which the chapter starts.
    pub start_page: u32,
}

impl ChapterInfo {
    pub fn new(title: impl Into<String>, start_page: u32) -> Self {
        Self {
            title: title.into(),
            start_page,
        }
    }
}

/// Wire schema of the structured extraction response: `{"chapters": [...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterList {
    pub chapters: Vec<ChapterInfo>,
}

/// The resolved structure of one book.
///
/// Produced once per source document by
/// [`crate::pipeline::structure::resolve_structure`] and consumed once by the
/// splitter. Chapters are in the order the service returned them; they are
/// not guaranteed to be sorted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookStructure {
    pub chapters: Vec<ChapterInfo>,
    /// 1-based **physical** page where logical page 1 (the first numbered
    /// chapter) begins.
    pub first_chapter_physical_page: u32,
}

/// A half-open, 0-based range of physical pages: `[start_index, end_index)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRange {
    pub start_index: usize,
    pub end_index: usize,
}

impl PageRange {
    pub fn new(start_index: usize, end_index: usize) -> Self {
        Self {
            start_index,
            end_index,
        }
    }

    /// The first `n` pages of a document.
    pub fn prefix(n: usize) -> Self {
        Self::new(0, n)
    }

    pub fn len(&self) -> usize {
        self.end_index.saturating_sub(self.start_index)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the range is non-empty and fits inside `total_pages`.
    pub fn fits(&self, total_pages: usize) -> bool {
        self.start_index < self.end_index && self.end_index <= total_pages
    }

    /// 1-based inclusive page numbers, for log messages.
    pub fn human(&self) -> String {
        format!("{}-{}", self.start_index + 1, self.end_index)
    }
}

/// One pass through the generate → validate cycle for a chapter.
///
/// Only the most recent attempt is kept; earlier ones are dropped as soon as
/// the next generation starts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationAttempt {
    /// 0 for the initial generation, 1.. for corrections.
    pub ordinal: u32,
    /// Sanitised text produced by this attempt.
    pub text: String,
    /// Why this attempt was rejected, if it was.
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_range_len_and_empty() {
        assert_eq!(PageRange::new(4, 13).len(), 9);
        assert!(PageRange::new(5, 5).is_empty());
        assert!(PageRange::new(7, 3).is_empty());
    }

    #[test]
    fn page_range_fits() {
        assert!(PageRange::new(0, 8).fits(8));
        assert!(!PageRange::new(0, 9).fits(8));
        assert!(!PageRange::new(3, 3).fits(8));
    }

    #[test]
    fn page_range_human_is_one_based_inclusive() {
        assert_eq!(PageRange::new(4, 13).human(), "5-13");
    }

    #[test]
    fn chapter_list_parses_from_service_json() {
        let json = r#"{"chapters":[{"title":"Limits","start_page":1},{"title":"Derivatives","start_page":23}]}"#;
        let list: ChapterList = serde_json::from_str(json).expect("valid json");
        assert_eq!(list.chapters.len(), 2);
        assert_eq!(list.chapters[1], ChapterInfo::new("Derivatives", 23));
    }
}
