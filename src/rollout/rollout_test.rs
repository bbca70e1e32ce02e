#[cfg(test)]
mod tests {
    use std::path::Path;

    use crate::rollout::{apply, reconcile, Outcome, RolloutError, StagedUpdate};
    use crate::support::FakeProcesses;

    fn staged(dir: &Path) -> StagedUpdate {
        StagedUpdate::new("comp", dir, ".dll", &dir.join("comp.pid"))
    }

    fn read(dir: &Path, name: &str) -> Option<String> {
        std::fs::read_to_string(dir.join(name)).ok()
    }

    #[test]
    fn test_unkillable_holder_still_swaps() {
        let dir = tempfile::tempdir().unwrap();
        let processes = FakeProcesses::new();
        processes.spawn(4242);
        processes.lock_against_kill(4242);

        std::fs::write(dir.path().join("comp.dll"), "old").unwrap();
        std::fs::write(dir.path().join("comp.new"), "new").unwrap();
        std::fs::write(dir.path().join("comp.pid"), "4242").unwrap();

        let outcome = apply(&staged(dir.path()), processes.as_ref()).unwrap();
        assert_eq!(outcome, Outcome::Applied);
        assert_eq!(processes.terminated(), vec![4242]);

        assert!(!dir.path().join("comp.pid").exists());
        assert_eq!(read(dir.path(), "comp.dll").as_deref(), Some("new"));
        assert_eq!(read(dir.path(), "comp.old").as_deref(), Some("old"));
        assert!(!dir.path().join("comp.new").exists());
    }

    #[test]
    fn test_holder_is_terminated() {
        let dir = tempfile::tempdir().unwrap();
        let processes = FakeProcesses::new();
        processes.spawn(17);

        std::fs::write(dir.path().join("comp.dll"), "old").unwrap();
        std::fs::write(dir.path().join("comp.new"), "new").unwrap();
        std::fs::write(dir.path().join("comp.pid"), "17").unwrap();

        apply(&staged(dir.path()), processes.as_ref()).unwrap();
        assert!(!processes.is_running(17));
    }

    #[test]
    fn test_nothing_staged_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let processes = FakeProcesses::new();
        processes.spawn(17);
        std::fs::write(dir.path().join("comp.dll"), "live").unwrap();
        std::fs::write(dir.path().join("comp.pid"), "17").unwrap();

        let outcome = apply(&staged(dir.path()), processes.as_ref()).unwrap();
        assert_eq!(outcome, Outcome::NotStaged);
        assert!(processes.terminated().is_empty());
        assert!(dir.path().join("comp.pid").exists());
        assert_eq!(read(dir.path(), "comp.dll").as_deref(), Some("live"));
    }

    #[test]
    fn test_first_install_promotes_directly() {
        let dir = tempfile::tempdir().unwrap();
        let processes = FakeProcesses::new();
        std::fs::write(dir.path().join("comp.new"), "new").unwrap();

        apply(&staged(dir.path()), processes.as_ref()).unwrap();
        assert_eq!(read(dir.path(), "comp.dll").as_deref(), Some("new"));
        assert!(!dir.path().join("comp.old").exists());
    }

    #[test]
    fn test_existing_backup_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let processes = FakeProcesses::new();
        std::fs::write(dir.path().join("comp.old"), "ancient").unwrap();
        std::fs::write(dir.path().join("comp.dll"), "old").unwrap();
        std::fs::write(dir.path().join("comp.new"), "new").unwrap();

        apply(&staged(dir.path()), processes.as_ref()).unwrap();
        assert_eq!(read(dir.path(), "comp.old").as_deref(), Some("old"));
    }

    #[test]
    fn test_garbage_pid_file_is_still_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let processes = FakeProcesses::new();
        std::fs::write(dir.path().join("comp.new"), "new").unwrap();
        std::fs::write(dir.path().join("comp.pid"), "junk").unwrap();

        apply(&staged(dir.path()), processes.as_ref()).unwrap();
        assert!(processes.terminated().is_empty());
        assert!(!dir.path().join("comp.pid").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_backup_leaves_live_binary() {
        let dir = tempfile::tempdir().unwrap();
        let processes = FakeProcesses::new();
        std::fs::write(dir.path().join("comp.dll"), "old").unwrap();
        std::fs::write(dir.path().join("comp.new"), "new").unwrap();
        // A regular file cannot be renamed over a non-empty directory.
        std::fs::create_dir(dir.path().join("comp.old")).unwrap();
        std::fs::write(dir.path().join("comp.old").join("inner"), "x").unwrap();

        let err = apply(&staged(dir.path()), processes.as_ref()).unwrap_err();
        assert!(matches!(err, RolloutError::Backup { .. }));
        assert_eq!(read(dir.path(), "comp.dll").as_deref(), Some("old"));
        assert_eq!(read(dir.path(), "comp.new").as_deref(), Some("new"), "kept for retry");
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let processes = FakeProcesses::new();
        std::fs::write(dir.path().join("comp.dll"), "old").unwrap();
        std::fs::write(dir.path().join("comp.new"), "new").unwrap();
        let other = StagedUpdate::new("other", dir.path(), ".dll", &dir.path().join("other.pid"));
        let updates = vec![staged(dir.path()), other];

        assert_eq!(reconcile(&updates, processes.as_ref()), 1);
        assert_eq!(reconcile(&updates, processes.as_ref()), 0);
        assert_eq!(read(dir.path(), "comp.dll").as_deref(), Some("new"));
        assert_eq!(read(dir.path(), "comp.old").as_deref(), Some("old"));
    }
}
