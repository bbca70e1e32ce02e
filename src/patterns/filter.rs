// Whitelist/blacklist evaluation with built-in overrides.

use tracing::{debug, warn};

use super::list::{PatternKind, PatternList};
use super::store::PatternStore;

// Fixed heuristics, matched case-insensitively anywhere in the candidate.
const WHITELIST_OVERRIDES: &[&str] = &["steamapps"];
const BLACKLIST_OVERRIDES: &[&str] = &["gamebar", "launcher"];

/// Decides which executables the service may act on.
#[derive(Debug, Clone, Default)]
pub struct PatternFilter {
    whitelist: PatternList,
    blacklist: PatternList,
    store: Option<PatternStore>,
}

impl PatternFilter {
    /// Filter without persistence.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter backed by `store`; both lists are loaded immediately.
    pub fn with_store(store: PatternStore) -> Self {
        Self {
            whitelist: store.load(PatternKind::Whitelist),
            blacklist: store.load(PatternKind::Blacklist),
            store: Some(store),
        }
    }

    pub fn list(&self, kind: PatternKind) -> &PatternList {
        match kind {
            PatternKind::Whitelist => &self.whitelist,
            PatternKind::Blacklist => &self.blacklist,
        }
    }

    fn list_mut(&mut self, kind: PatternKind) -> &mut PatternList {
        match kind {
            PatternKind::Whitelist => &mut self.whitelist,
            PatternKind::Blacklist => &mut self.blacklist,
        }
    }

    /// Tests `candidate` (an executable path or name) against a list.
    ///
    /// Built-in overrides win even over an empty list; otherwise an empty list matches
    /// nothing and the first matching entry decides.
    pub fn matches(&self, candidate: &str, kind: PatternKind) -> bool {
        if builtin_override(candidate, kind) {
            return true;
        }

        let list = self.list(kind);
        if list.is_empty() {
            return false;
        }

        match list.find_match(candidate) {
            Some(entry) => {
                debug!(
                    component = "patterns",
                    event = "matched",
                    kind = %kind,
                    pattern = %entry,
                    candidate = %candidate,
                    "candidate matched user pattern"
                );
                true
            }
            None => false,
        }
    }

    /// Appends patterns and persists the list. Returns false when nothing was added or
    /// the list could not be stored.
    pub fn add(&mut self, text: &str, kind: PatternKind) -> bool {
        if self.list_mut(kind).add(text) == 0 {
            return false;
        }
        self.persist(kind)
    }

    /// Removes patterns and persists the list. Returns false when nothing was removed or
    /// the list could not be stored.
    pub fn remove(&mut self, text: &str, kind: PatternKind) -> bool {
        if self.list_mut(kind).remove(text) == 0 {
            return false;
        }
        self.persist(kind)
    }

    /// Replaces a whole list (the UI edits the full text) and persists it.
    pub fn replace(&mut self, text: &str, kind: PatternKind) -> bool {
        self.list_mut(kind).replace(text);
        self.persist(kind)
    }

    fn persist(&self, kind: PatternKind) -> bool {
        let Some(store) = &self.store else {
            return true;
        };
        match store.save(kind, self.list(kind)) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    component = "patterns",
                    event = "store_failed",
                    kind = %kind,
                    error = %e,
                    "failed to persist pattern list"
                );
                false
            }
        }
    }
}

fn builtin_override(candidate: &str, kind: PatternKind) -> bool {
    let overrides = match kind {
        PatternKind::Whitelist => WHITELIST_OVERRIDES,
        PatternKind::Blacklist => BLACKLIST_OVERRIDES,
    };
    let lowered = candidate.to_lowercase();
    overrides.iter().any(|needle| lowered.contains(needle))
}
