//! Canonical text form of a pattern list.

use once_cell::sync::Lazy;
use regex::Regex;

static PIPE_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\|{2,}").expect("valid regex"));
static PIPE_BEFORE_NEWLINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\|+\n").expect("valid regex"));
static PIPE_AFTER_NEWLINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n\|+").expect("valid regex"));
static WHITESPACE_LINES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]+$").expect("valid regex"));
static NEWLINE_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{2,}").expect("valid regex"));
static LEADING_SEPARATORS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\A[|\n]+").expect("valid regex"));
static TRAILING_SEPARATORS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[|\n]+\z").expect("valid regex"));

/// Normalizes pattern-list text before it is persisted.
///
/// Strips NUL and CR, collapses `||` runs, drops `|` next to line breaks, blanks
/// whitespace-only lines, collapses blank-line runs and trims separators at both ends.
/// Idempotent: `normalize_for_persist(normalize_for_persist(t)) == normalize_for_persist(t)`.
pub fn normalize_for_persist(text: &str) -> String {
    let mut current: String = text.chars().filter(|c| *c != '\0' && *c != '\r').collect();

    // Each pass only ever removes characters, so this terminates.
    loop {
        let next = normalize_pass(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn normalize_pass(text: &str) -> String {
    let text = PIPE_RUNS.replace_all(text, "|");
    let text = PIPE_BEFORE_NEWLINE.replace_all(&text, "\n");
    let text = PIPE_AFTER_NEWLINE.replace_all(&text, "\n");
    let text = WHITESPACE_LINES.replace_all(&text, "");
    let text = NEWLINE_RUNS.replace_all(&text, "\n");
    let text = LEADING_SEPARATORS.replace(&text, "");
    let text = TRAILING_SEPARATORS.replace(&text, "");
    text.into_owned()
}
