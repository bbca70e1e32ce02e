// On-disk layout of the service, computed once from configuration.

use std::path::{Path, PathBuf};

use crate::config::{Config, ConfigTrait};
use crate::rollout::StagedUpdate;
use crate::worker::WorkerId;

/// Per-worker paths.
#[derive(Debug, Clone)]
pub struct WorkerPaths {
    pub pid_file: PathBuf,
    pub component: String,
    pub extension: String,
    /// Live binary, `<install_dir>/<component><extension>`.
    pub binary: PathBuf,
    pub program: PathBuf,
    pub args: Option<Vec<String>>,
    /// Service host executable inside the service root, if one is configured.
    pub host: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ServiceLayout {
    root: PathBuf,
    install_dir: PathBuf,
    workers: [WorkerPaths; 2],
    ack_file: Option<PathBuf>,
    patterns_dir: PathBuf,
    whitelist_file: String,
    blacklist_file: String,
}

impl ServiceLayout {
    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let root = cfg.service().root.clone();
        let install_dir = cfg.install_dir().to_path_buf();

        let paths = |id: WorkerId| -> anyhow::Result<WorkerPaths> {
            let w = cfg
                .worker(id)
                .ok_or_else(|| anyhow::anyhow!("worker {} is not configured", id))?;
            Ok(WorkerPaths {
                pid_file: root.join(&w.pid_file),
                component: w.component.clone(),
                extension: w.extension().to_string(),
                binary: install_dir.join(format!("{}{}", w.component, w.extension())),
                program: w.installer.program.clone(),
                args: w.installer.args.clone(),
                host: w.installer.host.as_ref().map(|h| root.join(h)),
            })
        };
        let workers = [paths(WorkerId::X86)?, paths(WorkerId::X64)?];

        Ok(Self {
            ack_file: cfg.service().ack_file.as_ref().map(|a| root.join(a)),
            patterns_dir: cfg.patterns_dir(),
            whitelist_file: cfg.whitelist_file().to_string(),
            blacklist_file: cfg.blacklist_file().to_string(),
            root,
            install_dir,
            workers,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    pub fn worker(&self, id: WorkerId) -> &WorkerPaths {
        &self.workers[id.index()]
    }

    pub fn workers(&self) -> &[WorkerPaths; 2] {
        &self.workers
    }

    pub fn ack_file(&self) -> Option<&Path> {
        self.ack_file.as_deref()
    }

    pub fn patterns_dir(&self) -> &Path {
        &self.patterns_dir
    }

    pub fn whitelist_file(&self) -> &str {
        &self.whitelist_file
    }

    pub fn blacklist_file(&self) -> &str {
        &self.blacklist_file
    }

    /// Hot-swap candidates, one per worker binary, 64-bit first.
    pub fn staged_updates(&self) -> Vec<StagedUpdate> {
        [WorkerId::X64, WorkerId::X86]
            .into_iter()
            .map(|id| {
                let w = self.worker(id);
                StagedUpdate::new(&w.component, &self.install_dir, &w.extension, &w.pid_file)
            })
            .collect()
    }
}
