// Package watch provides edge-triggered change signals for the service directory.
//
// A signal source reports each observed change once: `is_signaled` consumes the signal and
// re-arms in the same call, `rearm` takes a fresh baseline without reporting.

use std::collections::BTreeSet;
use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, warn};


/// One-shot signal that must be re-armed after every observation.
pub trait SignalSource: Send {
    /// Returns true if the source fired since the last observation, and re-arms it.
    fn is_signaled(&mut self) -> bool;

    /// Discards any pending signal and re-baselines.
    fn rearm(&mut self);
}

/// Polls a directory's file-name set, at most once per debounce interval.
///
/// Only names are compared: a file created, deleted or renamed fires the signal, a file
/// rewritten in place does not.
pub struct DirectoryWatch {
    dir: PathBuf,
    debounce: Duration,
    last_scan: Option<Instant>,
    snapshot: Option<BTreeSet<OsString>>,
}

impl DirectoryWatch {
    pub fn new(dir: impl Into<PathBuf>, debounce: Duration) -> Self {
        let mut watch = Self {
            dir: dir.into(),
            debounce,
            last_scan: None,
            snapshot: None,
        };
        watch.rearm();
        watch
    }

    fn scan(&self) -> Option<BTreeSet<OsString>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    debug!(
                        component = "watch",
                        event = "scan_failed",
                        dir = ?self.dir,
                        error = %e,
                        "failed to scan watched directory"
                    );
                }
                return None;
            }
        };

        Some(
            entries
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.file_name())
                .collect(),
        )
    }
}

impl SignalSource for DirectoryWatch {
    fn is_signaled(&mut self) -> bool {
        let now = Instant::now();
        if let Some(last) = self.last_scan {
            if now.duration_since(last) < self.debounce {
                return false;
            }
        }
        self.last_scan = Some(now);

        let current = self.scan();
        if current == self.snapshot {
            return false;
        }
        self.snapshot = current;
        true
    }

    fn rearm(&mut self) {
        self.snapshot = self.scan();
        self.last_scan = Some(Instant::now());
    }
}

/// Fires once per appearance of a flag file, deleting the file to re-arm.
pub struct FlagFile {
    path: PathBuf,
}

impl FlagFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn clear(&self) -> io::Result<()> {
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

impl SignalSource for FlagFile {
    fn is_signaled(&mut self) -> bool {
        if !self.path.exists() {
            return false;
        }
        match self.clear() {
            Ok(()) => true,
            Err(e) => {
                // A flag we cannot consume would fire on every poll.
                warn!(
                    component = "watch",
                    event = "flag_clear_failed",
                    path = ?self.path,
                    error = %e,
                    "failed to consume flag file, ignoring it"
                );
                false
            }
        }
    }

    fn rearm(&mut self) {
        if let Err(e) = self.clear() {
            warn!(
                component = "watch",
                event = "flag_clear_failed",
                path = ?self.path,
                error = %e,
                "failed to clear stale flag file"
            );
        }
    }
}
