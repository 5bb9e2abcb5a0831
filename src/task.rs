//! Task orchestration
//!
//! One [`MirrorTask`] is a `(source, target)` directory pair. Before any
//! mutation anywhere, every target must carry an approved guard file — a
//! destructive-operation gate confirming the operator accepts that the
//! target's contents will be made equal to the source, deletions included.
//! Task resolution then maps the source root into snapshot space, fixes up
//! the bare-device-root listing quirk, and hands the pair to the engine.

use crate::engine::{SyncEngine, SyncOptions};
use crate::error::{MirrorError, Result};
use crate::fs::Filesystem;
use crate::path_util::{self, SnapshotRewriter};
use crate::report::Reporter;
use crate::snapshot::Snapshotter;

/// Sentinel file a target must contain before it may be mirrored onto.
/// Never compared, copied, or deleted.
pub const GUARD_FILE_NAME: &str = "__HoboMirrorTarget__.txt";

/// One `(source, target)` directory pair to mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorTask {
    pub source_root: String,
    pub target_root: String,
}

/// A task with its source resolved into snapshot space.
#[derive(Debug, Clone)]
pub struct ResolvedTask {
    pub snapshot_root: String,
    pub target_root: String,
    pub rewriter: SnapshotRewriter,
}

/// Verify the guard file under `target_root` exists and contains "allow"
/// (case-insensitive).
///
/// # Errors
///
/// Returns [`MirrorError::FatalConfig`] when the file is missing,
/// unreadable, or not approving.
pub fn check_guard_file(fs: &dyn Filesystem, target_root: &str) -> Result<()> {
    let guard_path = path_util::join(target_root, GUARD_FILE_NAME);
    let text = fs.read_to_string(&guard_path).map_err(|err| {
        MirrorError::FatalConfig(format!(
            "target {target_root} has no readable {GUARD_FILE_NAME} guard file ({err}); \
             refusing to mirror onto it"
        ))
    })?;
    if text.to_lowercase().contains("allow") {
        Ok(())
    } else {
        Err(MirrorError::FatalConfig(format!(
            "guard file {guard_path} does not contain \"allow\"; refusing to mirror"
        )))
    }
}

/// Map a task's source root into snapshot space and build its display
/// rewriter.
///
/// # Errors
///
/// Fails if the snapshotter cannot produce a snapshot for the source.
pub fn resolve_task(task: &MirrorTask, snapshotter: &mut dyn Snapshotter) -> Result<ResolvedTask> {
    let snapshot_root = path_util::fixup_device_root(&snapshotter.snapshot(&task.source_root)?);
    let rewriter = SnapshotRewriter::new(snapshot_root.clone(), task.source_root.clone());
    Ok(ResolvedTask {
        snapshot_root,
        target_root: task.target_root.clone(),
        rewriter,
    })
}

/// Execute one resolved mirroring pair. All outcomes flow through the
/// reporter.
pub fn run_task(
    fs: &dyn Filesystem,
    report: &Reporter,
    opts: &SyncOptions,
    resolved: &ResolvedTask,
) {
    report.debug(&format!(
        "Mirroring {} (via {}) onto {}",
        resolved.rewriter.to_display(&resolved.snapshot_root),
        resolved.snapshot_root,
        resolved.target_root
    ));
    let engine = SyncEngine::new(fs, report, opts, &resolved.rewriter);
    engine.sync_tree(&resolved.snapshot_root, &resolved.target_root);
}

/// Resolve and run a whole task list: snapshot every source, verify every
/// guard file, then mirror pair by pair. The guard checks all happen before
/// the first mutation of the run — a single unapproved target aborts
/// everything.
///
/// # Errors
///
/// Returns [`MirrorError::FatalConfig`] (also reported on the Error
/// channel) when a guard check fails; per-entry failures during mirroring
/// are reported, not returned.
pub fn run_tasks(
    fs: &dyn Filesystem,
    report: &Reporter,
    opts: &SyncOptions,
    tasks: &[MirrorTask],
    snapshotter: &mut dyn Snapshotter,
) -> Result<()> {
    for (i, task) in tasks.iter().enumerate() {
        for other in &tasks[i + 1..] {
            if path_util::paths_equal(&task.target_root, &other.target_root) {
                let err = MirrorError::FatalConfig(format!(
                    "target {} appears in more than one task",
                    task.target_root
                ));
                report.error(&err.to_string());
                return Err(err);
            }
        }
    }
    let mut resolved = Vec::with_capacity(tasks.len());
    for task in tasks {
        resolved.push(resolve_task(task, snapshotter)?);
    }
    for r in &resolved {
        if let Err(err) = check_guard_file(fs, &r.target_root) {
            report.error(&err.to_string());
            return Err(err);
        }
    }
    for r in &resolved {
        run_task(fs, report, opts, r);
    }
    snapshotter.dispose();
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::error::ErrorKind;
    use crate::fs::memory::MemoryFilesystem;
    use crate::snapshot::PassthroughSnapshotter;

    #[test]
    fn guard_file_must_exist_and_approve() {
        let fs = MemoryFilesystem::new();
        fs.add_dir(r"T:\mirror").unwrap();
        let err = check_guard_file(&fs, r"T:\mirror").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FatalConfig);

        fs.add_file(r"T:\mirror\__HoboMirrorTarget__.txt", b"nope").unwrap();
        assert!(check_guard_file(&fs, r"T:\mirror").is_err());
    }

    #[test]
    fn guard_file_approval_is_case_insensitive_substring() {
        let fs = MemoryFilesystem::new();
        fs.add_file(
            r"T:\mirror\__HoboMirrorTarget__.txt",
            b"I hereby ALLOW mirroring onto this directory.",
        )
        .unwrap();
        check_guard_file(&fs, r"T:\mirror").unwrap();
    }

    #[test]
    fn resolution_fixes_up_bare_device_roots() {
        struct DeviceSnapshotter;
        impl Snapshotter for DeviceSnapshotter {
            fn snapshot(&mut self, _source_root: &str) -> crate::error::Result<String> {
                Ok(r"\\?\GLOBALROOT\Device\HarddiskVolumeShadowCopy4".to_string())
            }
        }
        let task = MirrorTask {
            source_root: r"C:\".to_string(),
            target_root: r"T:\m".to_string(),
        };
        let resolved = resolve_task(&task, &mut DeviceSnapshotter).unwrap();
        assert!(resolved.snapshot_root.ends_with('\\'));
    }

    #[test]
    fn duplicate_targets_are_rejected_before_any_work() {
        let fs = MemoryFilesystem::new();
        fs.add_file(r"T:\m\__HoboMirrorTarget__.txt", b"allow").unwrap();
        let report = Reporter::with_capture();
        let tasks = vec![
            MirrorTask {
                source_root: r"C:\a".to_string(),
                target_root: r"T:\m".to_string(),
            },
            MirrorTask {
                source_root: r"C:\b".to_string(),
                target_root: r"t:\M\".to_string(),
            },
        ];
        let err = run_tasks(
            &fs,
            &report,
            &SyncOptions::everything(),
            &tasks,
            &mut PassthroughSnapshotter,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FatalConfig);
        assert_eq!(report.exit_code(), 1);
    }
}
