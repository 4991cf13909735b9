//! Every instruction sent to the generative service.
//!
//! Keeping the prompts in one module lets unit tests inspect them without a
//! live provider, and keeps the pipeline modules free of prose.

/// Every generated document must begin with this token.
pub const DOCUMENT_ROOT_MARKER: &str = "\\documentclass";

/// Error fed back to the model when its output lacks [`DOCUMENT_ROOT_MARKER`].
pub const FORMAT_ERROR_MESSAGE: &str =
    "Output does not start with \\documentclass. The LaTeX format was not respected.";

/// System prompt for both structure-resolution calls.
pub const STRUCTURE_SYSTEM_PROMPT: &str = "You analyse scanned and digital textbooks. \
You answer with exactly the data requested and nothing else: no greetings, no explanations, \
no markdown fences.";

/// System prompt for study-sheet generation and correction.
pub const GENERATION_SYSTEM_PROMPT: &str = "You are an assistant specialised in academic \
documents. You restructure technical material into LaTeX study sheets. Your reply is always \
a complete, compilable LaTeX document and nothing else.";

/// Preamble the model is told to reproduce verbatim.
const LATEX_PREAMBLE: &str = r"\documentclass{article}
\usepackage[utf8]{inputenc}
\usepackage{amsmath}
\usepackage{amsfonts}
\usepackage{amssymb}
\usepackage{enumitem}
\usepackage{fancyhdr}
\usepackage{hyperref}
\usepackage{xcolor}
\usepackage{courier}
\usepackage{listings}
\lstset{basicstyle=\ttfamily, columns=fullflexible, breaklines=true, frame=single, showstringspaces=false}
\pagestyle{plain}
\begin{document}";

/// Instruction for the structured chapter-list extraction.
///
/// The response must be JSON matching [`crate::model::ChapterList`].
pub fn chapter_list_instruction(pages_to_scan: usize) -> String {
    format!(
        r#"The attached document holds the first {pages_to_scan} pages of a textbook.

List ONLY the main chapters that carry explicit numbering ("Chapter 1", "Unit 3", "Section 4", "1.", ...).
Exclude introductions, prefaces, tables of contents, indexes, bibliographies, appendices, solutions and any other unnumbered section.

For every chapter return:
- "title": the exact title as printed
- "start_page": the page number as printed INSIDE the book (if the chapter starts on physical page 15 of the file but the book labels that page "1", return 1)

Only include chapters that begin within the first {pages_to_scan} physical pages. If a table of contents is present, prefer it.

Reply with JSON only, in exactly this shape:
{{"chapters": [{{"title": "...", "start_page": 1}}]}}"#
    )
}

/// Instruction for the scalar first-chapter physical page lookup.
pub fn physical_page_instruction(pages_to_scan: usize) -> String {
    format!(
        "The attached document holds the first {pages_to_scan} pages of a textbook.\n\n\
Find the 1-based physical page of this file on which the FIRST explicitly numbered chapter begins. \
Prefaces, tables of contents and other introductory sections are not chapters. \
If the first chapter starts on physical page 8, answer 8.\n\n\
Answer with the integer only. No words, no punctuation, no formatting."
    )
}

/// Instruction for the initial study-sheet generation.
pub fn elaborate_instruction(subject: Option<&str>, language: &str) -> String {
    let topic = match subject.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => format!("related to \"{s}\""),
        None => "on the subject covered by the document".to_string(),
    };

    format!(
        r"The attached document is a chapter of educational material {topic}. Build a LaTeX study sheet from it, written in {language}.

1. Extract the header (title, author, date) if present; render it with \title{{}}, \author{{}} and \maketitle.
2. Extract every theorem, principle or law with its full statement and number. Do not give the proof; leave space for the reader to prove it.
3. Extract every key definition as a prompt: name the term and its number, and ask the reader to define it.
   Theorems and definitions must appear in the same order as in the source.
4. Extract every exercise with its full text. If only a reference is printed (e.g. 'Exercise 1'), write a representative exercise from the context. Do not solve it.
5. For each extracted exercise, write one new exercise needing the same tools but with different data or context.
6. Ignore proofs, commentary, grading rubrics, long explanatory passages, ISBN and other editorial data.

Layout:
- \section*{{Extracted Content}}: theorems and definitions in source order, each an \item of an enumerate.
  Theorem format: \textbf{{Theorem [number/name]:}} [statement]. \par \textbf{{Proof:}}
  Definition format: \textbf{{Definition [number]:}} Define [term].
- \section*{{Original Exercises}}: \textbf{{Exercise [number]:}} [text], each an \item of an enumerate.
- \section*{{AI-Generated Exercises}}: one \item per generated exercise.
- Bold is \textbf{{}}, inline code is \texttt{{}}, inline maths is $...$, display maths is $$...$$ or equation*/align*.
- Close with \end{{document}}.

Start the file with exactly this preamble:
{LATEX_PREAMBLE}

Reply with the LaTeX source only, starting directly with \documentclass{{article}}."
    )
}

/// Instruction for a correction attempt, parameterised by the last error.
///
/// The previous attempt's source is sent alongside, see
/// [`previous_attempt_context`].
pub fn correction_instruction(error_message: &str) -> String {
    format!(
        r"The LaTeX you generated for this document is invalid. The following errors occurred:
```
{error_message}
```
Fix the source so it compiles, keeping the extracted content and structure exactly as they are.

Checklist:
- Every \begin{{env}} has a matching \end{{env}}.
- Inline maths uses single $; display maths uses $$ or equation/align environments.
- Use only commands defined by the preamble packages.
- Escape special characters (# $ % & _ {{ }} ~ ^) used as plain text.
- Braces, brackets and parentheses are balanced. A '>' typed where '}}' was meant is the most common mistake.
- Plain words inside maths go in \text{{}}.

Reply with the corrected LaTeX source only, starting directly with \documentclass{{article}}."
    )
}

/// Wrap the previous attempt so the model can edit rather than regenerate.
pub fn previous_attempt_context(previous: &str) -> String {
    format!("Previous attempt:\n\"\"\"\n{previous}\n\"\"\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chapter_instruction_mentions_window_and_schema() {
        let p = chapter_list_instruction(12);
        assert!(p.contains("first 12 pages"));
        assert!(p.contains(r#"{"chapters": [{"title": "...", "start_page": 1}]}"#));
    }

    #[test]
    fn physical_instruction_asks_for_integer_only() {
        let p = physical_page_instruction(25);
        assert!(p.contains("first 25 pages"));
        assert!(p.contains("integer only"));
    }

    #[test]
    fn elaborate_with_and_without_subject() {
        let with = elaborate_instruction(Some("Linear Algebra"), "English");
        assert!(with.contains("\"Linear Algebra\""));
        assert!(with.contains("written in English"));
        assert!(with.contains(LATEX_PREAMBLE));

        let blank = elaborate_instruction(Some("   "), "Italian");
        assert!(blank.contains("on the subject covered by the document"));
        assert!(blank.contains("written in Italian"));
    }

    #[test]
    fn correction_embeds_error() {
        let p = correction_instruction("! Undefined control sequence.");
        assert!(p.contains("! Undefined control sequence."));
        assert!(p.contains(r"\begin{env}"));
    }

    #[test]
    fn preamble_starts_with_root_marker() {
        assert!(LATEX_PREAMBLE.starts_with(DOCUMENT_ROOT_MARKER));
        assert!(FORMAT_ERROR_MESSAGE.contains(DOCUMENT_ROOT_MARKER));
    }
}
