//! hobomirror — privileged point-in-time directory mirroring for NTFS
//!
//! Given `(source, target)` directory pairs, hobomirror makes each target a
//! byte-identical mirror of a point-in-time snapshot of its source:
//! contents, junctions and symlinks, timestamps, attribute bits, and
//! security descriptors. It runs with backup/restore privileges so ACLs
//! never block it, and reads sources through volume snapshots so open and
//! locked files come out consistent.
//!
//! The crate is built around a handful of seams:
//!
//! - [`fs::Filesystem`] — the primitive operations, with backup semantics
//!   and reparse awareness; production backend on Windows, in-memory
//!   backend for tests.
//! - [`engine::SyncEngine`] — the four-phase per-directory reconciliation
//!   and whole-tree driver.
//! - [`report::Reporter`] — the five event channels every decision,
//!   mutation, and failure flows through.
//! - [`task`] — guard-file gating and per-pair orchestration.
//!
//! The engine is single-threaded and synchronous on purpose: the ordering
//! requirements of reconciliation (security descriptors before children,
//! removals before additions, leaves before containers) rely on strict
//! sequencing, and nothing here is throughput-bound enough to justify
//! giving that up.

pub mod cli;
pub mod engine;
pub mod error;
pub mod exec;
pub mod fs;
pub mod item;
pub mod path_util;
pub mod report;
pub mod settings;
pub mod snapshot;
pub mod task;

pub use engine::{SyncEngine, SyncOptions};
pub use error::{ErrorKind, MirrorError, Result};
pub use item::{Item, ItemKind};
pub use report::{Channel, Reporter};
pub use task::{MirrorTask, GUARD_FILE_NAME};
