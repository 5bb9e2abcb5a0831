//! Error-guarded execution of filesystem primitives
//!
//! Every mutation and every fallible read the engine performs flows through
//! [`Exec`]. A failure is classified, reported on the Error channel, and
//! swallowed — the caller gets `None` and moves on to the next entry.
//! Together with the per-subtree perimeter in the engine these are the only
//! two containment layers; no error crosses a phase loop.

use crate::error::{ErrorKind, MirrorError, Result};
use crate::fs::Filesystem;
use crate::report::Reporter;

/// A filesystem handle paired with the reporter it accounts to.
#[derive(Clone, Copy)]
pub struct Exec<'a> {
    pub fs: &'a dyn Filesystem,
    pub report: &'a Reporter,
}

impl<'a> Exec<'a> {
    #[must_use]
    pub fn new(fs: &'a dyn Filesystem, report: &'a Reporter) -> Self {
        Self { fs, report }
    }

    fn report_failure(&self, what: &str, path: &str, err: &MirrorError) {
        // Unreachable means an engine precondition didn't hold; that goes
        // to the critical channel, everything else is an expected failure.
        if err.kind() == ErrorKind::Unreachable {
            self.report.critical(&format!("Could not {what} {path}: {err}"));
        } else {
            self.report.error(&format!("Could not {what} {path}: {err}"));
        }
    }

    /// Run a primitive, reporting any failure as an Error. Returns the
    /// value on success, `None` on failure.
    pub fn attempt<T>(
        &self,
        what: &str,
        path: &str,
        f: impl FnOnce(&dyn Filesystem) -> Result<T>,
    ) -> Option<T> {
        match f(self.fs) {
            Ok(value) => Some(value),
            Err(err) => {
                self.report_failure(what, path, &err);
                None
            }
        }
    }

    /// Like [`Exec::attempt`], announcing the mutation on the Action
    /// channel first.
    pub fn act<T>(
        &self,
        label: &str,
        path: &str,
        what: &str,
        f: impl FnOnce(&dyn Filesystem) -> Result<T>,
    ) -> Option<T> {
        self.report.action(&format!("{label}: {path}"));
        self.attempt(what, path, f)
    }
}
