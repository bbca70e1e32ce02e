// Staged binary rollout: retire whatever holds the live binary, then swap old→backup and
// new→live.

use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::worker::{pidfile, ProcessOps};

use super::staged::StagedUpdate;

#[derive(Debug, thiserror::Error)]
pub enum RolloutError {
    #[error("failed to back up {from:?} to {to:?}: {source}")]
    Backup {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to promote {from:?} to {to:?}: {source}")]
    Promote {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    NotStaged,
    Applied,
}

/// Applies every staged component independently and returns how many went live.
///
/// Failures are logged and left in place; the staged file survives, so the next
/// initialization retries. Already applied components are no-ops.
pub fn reconcile(components: &[StagedUpdate], processes: &dyn ProcessOps) -> usize {
    let mut applied = 0;

    for update in components {
        match apply(update, processes) {
            Ok(Outcome::Applied) => {
                applied += 1;
                info!(
                    component = "rollout",
                    event = "applied",
                    name = %update.component_name,
                    live = ?update.live_path,
                    "staged update is live"
                );
            }
            Ok(Outcome::NotStaged) => {}
            Err(e) => {
                warn!(
                    component = "rollout",
                    event = "deferred",
                    name = %update.component_name,
                    error = %e,
                    "staged update could not be applied, will retry on next launch"
                );
            }
        }
    }

    applied
}

/// Applies a single staged component.
pub fn apply(update: &StagedUpdate, processes: &dyn ProcessOps) -> Result<Outcome, RolloutError> {
    if !update.is_staged() {
        return Ok(Outcome::NotStaged);
    }

    release_holder(update, processes);
    swap(update)?;

    Ok(Outcome::Applied)
}

/// Terminates the worker recorded in the component's PID file and deletes the file.
/// Best-effort: the swap is attempted whatever happens here.
fn release_holder(update: &StagedUpdate, processes: &dyn ProcessOps) {
    if !update.pid_file.exists() {
        return;
    }

    if let Some(pid) = pidfile::read(&update.pid_file) {
        match processes.terminate(pid) {
            Ok(()) => info!(
                component = "rollout",
                event = "holder_terminated",
                name = %update.component_name,
                pid,
                "terminated process holding the live binary"
            ),
            Err(e) => warn!(
                component = "rollout",
                event = "holder_terminate_failed",
                name = %update.component_name,
                pid,
                error = %e,
                "could not terminate process holding the live binary, swapping anyway"
            ),
        }
    }

    // The recorded PID is stale from here on, whether or not termination worked.
    if let Err(e) = pidfile::remove(&update.pid_file) {
        warn!(
            component = "rollout",
            event = "pid_file_remove_failed",
            path = ?update.pid_file,
            error = %e,
            "failed to delete pid file"
        );
    }
}

/// Backup must complete before promotion. If promotion fails the backup is moved back,
/// so the live path is never left empty by this function.
fn swap(update: &StagedUpdate) -> Result<(), RolloutError> {
    let had_live = update.live_path.exists();

    if had_live {
        rename_write_through(&update.live_path, &update.backup_path).map_err(|source| {
            RolloutError::Backup {
                from: update.live_path.clone(),
                to: update.backup_path.clone(),
                source,
            }
        })?;
    }

    if let Err(source) = rename_write_through(&update.staged_path, &update.live_path) {
        if had_live {
            if let Err(e) = rename_write_through(&update.backup_path, &update.live_path) {
                error!(
                    component = "rollout",
                    event = "restore_failed",
                    name = %update.component_name,
                    backup = ?update.backup_path,
                    error = %e,
                    "failed to restore live binary from backup"
                );
            }
        }
        return Err(RolloutError::Promote {
            from: update.staged_path.clone(),
            to: update.live_path.clone(),
            source,
        });
    }

    Ok(())
}

/// Renames `from` over `to`, then flushes the destination directory so the rename is
/// durable before we continue.
fn rename_write_through(from: &Path, to: &Path) -> io::Result<()> {
    std::fs::rename(from, to)?;

    if let Some(dir) = to.parent() {
        if let Err(e) = sync_dir(dir) {
            debug!(
                component = "rollout",
                event = "dir_sync_failed",
                dir = ?dir,
                error = %e,
                "directory flush failed after rename"
            );
        }
    }
    Ok(())
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    let dir = if dir.as_os_str().is_empty() {
        Path::new(".")
    } else {
        dir
    };
    std::fs::File::open(dir)?.sync_all()
}

// Directory handles cannot be flushed through std on this platform.
#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}
