// External installer invocation.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use tracing::{debug, info, warn};

use crate::service::{ServiceLayout, WorkerPaths};
use crate::worker::WorkerId;

/// Installer verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Install,
    Remove,
}

impl Verb {
    pub fn as_str(self) -> &'static str {
        match self {
            Verb::Install => "Install",
            Verb::Remove => "Remove",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InstallerError {
    #[error("failed to launch {program:?} for worker {worker}: {source}")]
    Spawn {
        worker: WorkerId,
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Starts/stops one worker. Implementations must not wait for the command to finish.
pub trait Installer: Send {
    fn invoke(&mut self, worker: WorkerId, verb: Verb) -> Result<(), InstallerError>;

    /// Collects finished children; called once per tick.
    fn reap(&mut self) {}
}

/// Launches the configured installer command with the service root as working directory.
///
/// For `Install`, a locally staged service host is preferred when present and started with
/// no arguments.
pub struct CommandInstaller {
    root: PathBuf,
    workers: [WorkerPaths; 2],
    children: Vec<(WorkerId, Verb, Child)>,
}

impl CommandInstaller {
    pub fn new(layout: &ServiceLayout) -> Self {
        Self {
            root: layout.root().to_path_buf(),
            workers: layout.workers().clone(),
            children: Vec::new(),
        }
    }

    fn command_for(&self, worker: WorkerId, verb: Verb) -> (PathBuf, Vec<String>) {
        let paths = &self.workers[worker.index()];

        if verb == Verb::Install {
            if let Some(host) = paths.host.as_ref().filter(|h| h.exists()) {
                return (host.clone(), Vec::new());
            }
        }

        (paths.program.clone(), render_args(paths.args.as_deref(), &paths.binary, verb))
    }
}

impl Installer for CommandInstaller {
    fn invoke(&mut self, worker: WorkerId, verb: Verb) -> Result<(), InstallerError> {
        let (program, args) = self.command_for(worker, verb);

        let child = Command::new(&program)
            .args(&args)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| InstallerError::Spawn {
                worker,
                program: program.clone(),
                source,
            })?;

        info!(
            component = "installer",
            event = "launched",
            worker = %worker,
            verb = %verb,
            program = ?program,
            pid = child.id(),
            "installer command launched"
        );
        self.children.push((worker, verb, child));
        Ok(())
    }

    fn reap(&mut self) {
        self.children.retain_mut(|(worker, verb, child)| match child.try_wait() {
            Ok(Some(status)) => {
                if status.success() {
                    debug!(
                        component = "installer",
                        event = "exited",
                        worker = %worker,
                        verb = %verb,
                        "installer command finished"
                    );
                } else {
                    warn!(
                        component = "installer",
                        event = "exited_with_error",
                        worker = %worker,
                        verb = %verb,
                        status = %status,
                        "installer command reported failure"
                    );
                }
                false
            }
            Ok(None) => true,
            Err(e) => {
                warn!(
                    component = "installer",
                    event = "wait_failed",
                    worker = %worker,
                    error = %e,
                    "failed to poll installer command, dropping handle"
                );
                false
            }
        });
    }
}

/// Substitutes `{component}` (the live binary path) and `{verb}`; the default template is
/// `[component, verb]`.
pub(crate) fn render_args(template: Option<&[String]>, component: &Path, verb: Verb) -> Vec<String> {
    let component = component.to_string_lossy();
    match template {
        Some(args) => args
            .iter()
            .map(|a| a.replace("{component}", &component).replace("{verb}", verb.as_str()))
            .collect(),
        None => vec![component.into_owned(), verb.as_str().to_string()],
    }
}
