// On-disk persistence of the pattern lists.

use std::io;
use std::path::PathBuf;
use tracing::{debug, warn};

use super::list::{PatternKind, PatternList};

#[derive(Debug, thiserror::Error)]
pub enum PatternStoreError {
    #[error("failed to create pattern directory {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write {kind} file {path:?}: {source}")]
    Write {
        kind: PatternKind,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Pattern list files, one per kind, inside a single directory.
#[derive(Debug, Clone)]
pub struct PatternStore {
    dir: PathBuf,
    whitelist_file: String,
    blacklist_file: String,
}

impl PatternStore {
    pub fn new(dir: impl Into<PathBuf>, whitelist_file: &str, blacklist_file: &str) -> Self {
        Self {
            dir: dir.into(),
            whitelist_file: whitelist_file.to_string(),
            blacklist_file: blacklist_file.to_string(),
        }
    }

    pub fn path(&self, kind: PatternKind) -> PathBuf {
        match kind {
            PatternKind::Whitelist => self.dir.join(&self.whitelist_file),
            PatternKind::Blacklist => self.dir.join(&self.blacklist_file),
        }
    }

    /// Loads a list; a missing or unreadable file yields an empty list.
    pub fn load(&self, kind: PatternKind) -> PatternList {
        let path = self.path(kind);
        match std::fs::read(&path) {
            Ok(bytes) => PatternList::from_file_text(&String::from_utf8_lossy(&bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(
                    component = "patterns",
                    event = "list_missing",
                    kind = %kind,
                    path = ?path,
                    "pattern list file not found, starting empty"
                );
                PatternList::new()
            }
            Err(e) => {
                warn!(
                    component = "patterns",
                    event = "list_unreadable",
                    kind = %kind,
                    path = ?path,
                    error = %e,
                    "failed to read pattern list, starting empty"
                );
                PatternList::new()
            }
        }
    }

    /// Writes a list in its normalized, newline-separated form.
    pub fn save(&self, kind: PatternKind, list: &PatternList) -> Result<(), PatternStoreError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| PatternStoreError::CreateDir {
            path: self.dir.clone(),
            source,
        })?;

        let path = self.path(kind);
        std::fs::write(&path, list.to_persisted()).map_err(|source| PatternStoreError::Write {
            kind,
            path,
            source,
        })
    }
}
