//! Event reporting
//!
//! Five fixed channels with fixed semantics: Action (a mutation is about to
//! happen), Change (a source↔target divergence was detected), Error (an
//! expected failure path), CriticalError (a code path that should have been
//! unreachable), Debug (diagnostics). Every event is mirrored onto `tracing`
//! and fanned out to the attached sinks.
//!
//! The reporter is threaded explicitly through the engine — it is not a
//! global — and is written from the single engine thread only, so interior
//! mutability is plain `RefCell`/`Cell`.

use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::io::Write;

use tracing::{debug, error, info, warn};

use crate::path_util;

/// The five report channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Action,
    Change,
    Error,
    CriticalError,
    Debug,
}

impl Channel {
    /// Stable channel name, used for sink file names.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Action => "actions",
            Self::Change => "changes",
            Self::Error => "errors",
            Self::CriticalError => "critical",
            Self::Debug => "debug",
        }
    }
}

/// Receives formatted report lines. Sinks must tolerate interleaved writes
/// from the engine thread; no other thread writes.
pub trait ReportSink {
    fn write_line(&mut self, channel: Channel, line: &str);
}

/// Appends each line to one text file per channel.
pub struct FileSink {
    files: Vec<(Channel, std::fs::File)>,
}

impl FileSink {
    /// Open (append/create) the five per-channel files under `dir`.
    ///
    /// # Errors
    ///
    /// Fails if a log file cannot be opened.
    pub fn open(dir: &std::path::Path) -> std::io::Result<Self> {
        let channels = [
            Channel::Action,
            Channel::Change,
            Channel::Error,
            Channel::CriticalError,
            Channel::Debug,
        ];
        let mut files = Vec::with_capacity(channels.len());
        for ch in channels {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(dir.join(format!("hobomirror-{}.log", ch.name())))?;
            files.push((ch, file));
        }
        Ok(Self { files })
    }
}

impl ReportSink for FileSink {
    fn write_line(&mut self, channel: Channel, line: &str) {
        if let Some((_, file)) = self.files.iter_mut().find(|(ch, _)| *ch == channel) {
            // A failing log write must not abort the mirror.
            let _ = writeln!(file, "{line}");
        }
    }
}

/// Collects Action/Change/Error/CriticalError/Debug events, tracks the
/// changed-directory set, and maps outcomes to the process exit code.
pub struct Reporter {
    sinks: RefCell<Vec<Box<dyn ReportSink>>>,
    actions: Cell<u64>,
    changes: Cell<u64>,
    errors: Cell<u64>,
    criticals: Cell<u64>,
    changed_dirs: RefCell<BTreeSet<String>>,
    captured: Option<RefCell<Vec<(Channel, String)>>>,
}

impl Reporter {
    /// Reporter with no sinks attached (events still reach `tracing` and
    /// the counters).
    #[must_use]
    pub fn new() -> Self {
        Self {
            sinks: RefCell::new(Vec::new()),
            actions: Cell::new(0),
            changes: Cell::new(0),
            errors: Cell::new(0),
            criticals: Cell::new(0),
            changed_dirs: RefCell::new(BTreeSet::new()),
            captured: None,
        }
    }

    /// Reporter that additionally keeps every event in memory, for tests
    /// and end-of-run inspection.
    #[must_use]
    pub fn with_capture() -> Self {
        Self {
            captured: Some(RefCell::new(Vec::new())),
            ..Self::new()
        }
    }

    /// Attach a sink.
    pub fn add_sink(&self, sink: Box<dyn ReportSink>) {
        self.sinks.borrow_mut().push(sink);
    }

    fn emit(&self, channel: Channel, line: &str) {
        match channel {
            Channel::Action | Channel::Change => info!(target: "hobomirror", "{line}"),
            Channel::Error => warn!(target: "hobomirror", "{line}"),
            Channel::CriticalError => error!(target: "hobomirror", "{line}"),
            Channel::Debug => debug!(target: "hobomirror", "{line}"),
        }
        for sink in self.sinks.borrow_mut().iter_mut() {
            sink.write_line(channel, line);
        }
        if let Some(captured) = &self.captured {
            captured.borrow_mut().push((channel, line.to_string()));
        }
    }

    /// A mutation is about to happen.
    pub fn action(&self, line: &str) {
        self.actions.set(self.actions.get() + 1);
        self.emit(Channel::Action, line);
    }

    /// A divergence was detected. A non-empty `path` records its parent
    /// directory into the changed-directory set.
    pub fn change(&self, path: Option<&str>, line: &str) {
        self.changes.set(self.changes.get() + 1);
        if let Some(parent) = path.and_then(path_util::parent) {
            self.changed_dirs.borrow_mut().insert(parent);
        }
        self.emit(Channel::Change, line);
    }

    /// An expected failure.
    pub fn error(&self, line: &str) {
        self.errors.set(self.errors.get() + 1);
        self.emit(Channel::Error, line);
    }

    /// A should-have-been-unreachable code path.
    pub fn critical(&self, line: &str) {
        self.criticals.set(self.criticals.get() + 1);
        self.emit(Channel::CriticalError, line);
    }

    /// Diagnostic detail.
    pub fn debug(&self, line: &str) {
        self.emit(Channel::Debug, line);
    }

    #[must_use]
    pub fn action_count(&self) -> u64 {
        self.actions.get()
    }

    #[must_use]
    pub fn change_count(&self) -> u64 {
        self.changes.get()
    }

    #[must_use]
    pub fn error_count(&self) -> u64 {
        self.errors.get()
    }

    #[must_use]
    pub fn critical_count(&self) -> u64 {
        self.criticals.get()
    }

    /// Directories (parents of changed entries) touched during this run,
    /// sorted.
    #[must_use]
    pub fn changed_dirs(&self) -> Vec<String> {
        self.changed_dirs.borrow().iter().cloned().collect()
    }

    /// `2` if any critical error, else `1` if any error, else `0`.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        if self.criticals.get() > 0 {
            2
        } else if self.errors.get() > 0 {
            1
        } else {
            0
        }
    }

    /// Captured events (empty unless built via [`Reporter::with_capture`]).
    #[must_use]
    pub fn events(&self) -> Vec<(Channel, String)> {
        self.captured
            .as_ref()
            .map(|c| c.borrow().clone())
            .unwrap_or_default()
    }

    /// Captured lines of one channel.
    #[must_use]
    pub fn lines(&self, channel: Channel) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|(ch, _)| *ch == channel)
            .map(|(_, line)| line)
            .collect()
    }
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new()
    }
}
