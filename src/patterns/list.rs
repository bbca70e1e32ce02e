// Ordered, case-insensitive pattern list.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

use super::normalize::normalize_for_persist;

/// Which user list a pattern belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternKind {
    Whitelist,
    Blacklist,
}

impl PatternKind {
    pub fn from_flag(is_whitelist: bool) -> Self {
        if is_whitelist {
            PatternKind::Whitelist
        } else {
            PatternKind::Blacklist
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PatternKind::Whitelist => "whitelist",
            PatternKind::Blacklist => "blacklist",
        }
    }
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User-maintained pattern list.
///
/// Entries are kept in insertion order and never blank. The single-line form joins them
/// with `|`, the persisted form with newlines; both parse back to the same entries.
#[derive(Debug, Clone, Default)]
pub struct PatternList {
    entries: Vec<String>,
    compiled: Vec<Option<Regex>>,
}

impl PatternList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses either text form (`|`-joined or one pattern per line).
    pub fn parse(text: &str) -> Self {
        let mut list = Self::new();
        list.extend(split_entries(text, false));
        list
    }

    /// Parses a list file. Lines without any letter are skipped: they would match
    /// practically everything.
    pub fn from_file_text(text: &str) -> Self {
        let mut list = Self::new();
        list.extend(split_entries(text, true));
        list
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends the entries in `text`; returns how many were added.
    pub fn add(&mut self, text: &str) -> usize {
        let entries = split_entries(text, false);
        let n = entries.len();
        self.extend(entries);
        n
    }

    /// Removes every entry equal to one of the entries in `text`; returns how many went.
    pub fn remove(&mut self, text: &str) -> usize {
        let doomed = split_entries(text, false);
        let before = self.entries.len();

        let mut kept_entries = Vec::with_capacity(before);
        let mut kept_compiled = Vec::with_capacity(before);
        for (entry, re) in self.entries.drain(..).zip(self.compiled.drain(..)) {
            if !doomed.contains(&entry) {
                kept_entries.push(entry);
                kept_compiled.push(re);
            }
        }
        self.entries = kept_entries;
        self.compiled = kept_compiled;

        before - self.entries.len()
    }

    /// Replaces the whole list with the entries in `text`.
    pub fn replace(&mut self, text: &str) {
        self.entries.clear();
        self.compiled.clear();
        self.extend(split_entries(text, false));
    }

    /// `|`-joined form used in memory and by the UI text field.
    pub fn to_single_line(&self) -> String {
        normalize_for_persist(&self.entries.join("|"))
    }

    /// Newline-joined form written to disk.
    pub fn to_persisted(&self) -> String {
        normalize_for_persist(&self.entries.join("\n"))
    }

    /// Returns the first entry found in the candidate path or in its executable name.
    pub fn find_match(&self, candidate: &str) -> Option<&str> {
        let name = executable_name(candidate);

        self.entries
            .iter()
            .zip(self.compiled.iter())
            .find(|(_, re)| match re {
                Some(re) => re.is_match(candidate) || (name != candidate && re.is_match(name)),
                None => false,
            })
            .map(|(entry, _)| entry.as_str())
    }

    pub fn is_match(&self, candidate: &str) -> bool {
        self.find_match(candidate).is_some()
    }

    fn extend(&mut self, entries: Vec<String>) {
        for entry in entries {
            self.compiled.push(compile(&entry));
            self.entries.push(entry);
        }
    }
}

fn compile(entry: &str) -> Option<Regex> {
    match RegexBuilder::new(entry).case_insensitive(true).build() {
        Ok(re) => Some(re),
        Err(e) => {
            warn!(
                component = "patterns",
                event = "invalid_pattern",
                pattern = %entry,
                error = %e,
                "pattern does not compile and will never match"
            );
            None
        }
    }
}

/// Text after the last path separator (either flavour).
fn executable_name(candidate: &str) -> &str {
    candidate
        .rsplit(|c| c == '\\' || c == '/')
        .next()
        .unwrap_or(candidate)
}

fn split_entries(text: &str, require_letter: bool) -> Vec<String> {
    text.split('\n')
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !require_letter || line.chars().any(char::is_alphabetic))
        .flat_map(split_top_level)
        .map(|entry| entry.replace('\0', ""))
        .filter(|entry| !entry.trim().is_empty())
        .collect()
}

/// Splits a line at `|` characters that are not inside a group, a character class, or
/// escaped. Splitting a top-level alternation keeps any-match semantics intact.
pub(crate) fn split_top_level(line: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut depth = 0usize;
    let mut escaped = false;
    // Byte offsets of the `[` of every open class, innermost last.
    let mut classes: Vec<usize> = Vec::new();

    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        if let Some(&open) = classes.last() {
            match c {
                '\\' => escaped = true,
                '[' => classes.push(i),
                ']' => {
                    // `[]...]` and `[^]...]` start with a literal bracket.
                    let body = &line[open + 1..i];
                    if !body.is_empty() && body != "^" {
                        classes.pop();
                    }
                }
                _ => {}
            }
            continue;
        }
        match c {
            '\\' => escaped = true,
            '[' => classes.push(i),
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            '|' if depth == 0 => {
                parts.push(&line[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&line[start..]);
    parts
}
