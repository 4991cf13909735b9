//! Pipeline stages for textbook-to-study-sheet processing.
//!
//! Each submodule implements one step and is testable on its own.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ structure ──▶ split ──▶ generate ──▶ results/
//! (path/    (2 calls)    (pdfium)  (generate ⇄ compile)
//!  dir/URL)
//! ```
//!
//! 1. [`input`]     — canonicalise a path, directory or URL to local PDFs
//! 2. [`structure`] — chapter list + first-chapter physical page
//! 3. [`split`]     — logical → physical page ranges, one PDF per chapter
//! 4. [`generate`]  — bounded generate → validate → correct loop per chapter
//!
//! Supporting modules: [`pdf`] (pdfium access, run in `spawn_blocking`),
//! [`encode`] (base64 attachments), [`llm`] (the generative-service seam),
//! [`sanitize`] (cleanup of generated text) and [`compile`] (the compiler
//! oracle).

pub mod compile;
pub mod encode;
pub mod generate;
pub mod input;
pub mod llm;
pub mod pdf;
pub mod sanitize;
pub mod split;
pub mod structure;
