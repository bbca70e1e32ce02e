use std::path::{Path, PathBuf};

/// One binary component eligible for hot-swap.
///
/// `<name>.new` is the staged payload, `<name><ext>` the live binary and `<name>.old` the
/// backup of the previous live binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedUpdate {
    pub component_name: String,
    pub live_path: PathBuf,
    pub staged_path: PathBuf,
    pub backup_path: PathBuf,
    pub pid_file: PathBuf,
}

impl StagedUpdate {
    pub fn new(name: &str, dir: &Path, real_ext: &str, pid_file: &Path) -> Self {
        Self {
            component_name: name.to_string(),
            live_path: dir.join(format!("{}{}", name, real_ext)),
            staged_path: dir.join(format!("{}.new", name)),
            backup_path: dir.join(format!("{}.old", name)),
            pid_file: pid_file.to_path_buf(),
        }
    }

    /// A staged payload is waiting to go live.
    pub fn is_staged(&self) -> bool {
        self.staged_path.exists()
    }
}
