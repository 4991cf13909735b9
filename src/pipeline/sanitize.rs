//! Deterministic cleanup of generated LaTeX before it is validated.
//!
//! Even well-prompted models wrap their answer in ```` ```latex ```` fences or
//! close an environment with `>` instead of `}`. These rules repair such
//! quirks without touching content, so the compiler only sees real mistakes.
//!
//! ## Rule Order
//!
//! Line endings and invisible characters are normalised before fence
//! detection, otherwise a leading BOM or `\r` would hide the fence on the
//! first pass and expose it on the second. With this order
//! [`sanitize_latex`] is idempotent.

use crate::prompts::DOCUMENT_ROOT_MARKER;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Apply all sanitisation rules to raw service output.
///
/// Rules (applied in order):
/// 1. Normalise line endings (CRLF → LF)
/// 2. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 3. Strip leading/trailing code fences, repeatedly (nested or one-sided)
/// 4. Repair `\begin{env>` / `\end{env>` closers
/// 5. Trim trailing whitespace per line
/// 6. Trim surrounding blank space and end with exactly one newline
pub fn sanitize_latex(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = remove_invisible_chars(&s);
    let s = strip_code_fences(&s);
    let s = fix_malformed_closers(&s);
    let s = trim_trailing_whitespace(&s);
    ensure_final_newline(&s)
}

/// Whether sanitised text begins with the required document-root marker.
pub fn has_root_marker(text: &str) -> bool {
    text.trim_start().starts_with(DOCUMENT_ROOT_MARKER)
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        ['\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}'],
        "",
    )
}

// ── Rule 3: Strip outer code fences ─────────────────────────────────────────

static RE_OPENING_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^```(?:latex|tex|LaTeX)?[ \t]*(?:\n|$)").unwrap());

static RE_CLOSING_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:^|\n)```[ \t]*$").unwrap());

/// Drop a leading fence line and a trailing fence line independently, until
/// neither is left. Truncated replies often carry only one of them.
fn strip_code_fences(input: &str) -> String {
    let mut current = input.trim().to_string();
    loop {
        let mut next = current.as_str();
        if let Some(m) = RE_OPENING_FENCE.find(next) {
            next = &next[m.end()..];
        }
        if let Some(m) = RE_CLOSING_FENCE.find(next) {
            next = &next[..m.start()];
        }
        let next = next.trim();
        if next == current {
            return current;
        }
        current = next.to_string();
    }
}

// ── Rule 4: Repair malformed environment closers ────────────────────────────

static RE_BAD_CLOSER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\(begin|end)\{([A-Za-z]+\*?)>").unwrap());

fn fix_malformed_closers(input: &str) -> String {
    RE_BAD_CLOSER
        .replace_all(input, |caps: &Captures| format!("\\{}{{{}}}", &caps[1], &caps[2]))
        .into_owned()
}

// ── Rule 5: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 6: Surrounding blank space and final newline ───────────────────────

fn ensure_final_newline(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        String::from("\n")
    } else {
        format!("{}\n", trimmed)
    }
}
