//! Command-line interface definitions
//!
//! Arguments are grouped by the component that consumes them: the task
//! pairs feed the orchestrator, the filter lists feed the engine's ignore
//! handling, the behavior toggles feed `SyncOptions`, and the output group
//! feeds logging and the settings store.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use crate::task::MirrorTask;

/// Privileged point-in-time directory mirroring for NTFS
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Mirror pairs
    #[command(flatten)]
    pub paths: PathConfig,

    /// Source-side filtering
    #[command(flatten)]
    pub filter: FilterConfig,

    /// Propagation toggles
    #[command(flatten)]
    pub behavior: BehaviorConfig,

    /// Output, logging, and settings locations
    #[command(flatten)]
    pub output: OutputConfig,
}

/// Mirror pair configuration
///
/// Used by: `main()`, task resolution
#[derive(clap::Args, Debug, Clone)]
pub struct PathConfig {
    /// Alternating SOURCE TARGET pairs; each TARGET must contain an
    /// approved `__HoboMirrorTarget__.txt` guard file
    #[arg(value_name = "SOURCE TARGET", required = true)]
    pub roots: Vec<String>,
}

/// Source-side filtering
///
/// Used by: the sync engine's ignore handling (unioned with the settings
/// file's lists)
#[derive(clap::Args, Debug, Clone)]
#[command(next_help_heading = "Filtering Options")]
pub struct FilterConfig {
    /// Absolute source path to leave out of the mirror (its target
    /// counterpart is deleted); repeatable
    #[arg(long, value_name = "PATH")]
    pub ignore_path: Vec<String>,

    /// Directory leaf name to leave out wherever it appears; repeatable
    #[arg(long, value_name = "NAME")]
    pub ignore_dir_name: Vec<String>,
}

/// Propagation toggles
///
/// Used by: `SyncOptions`
#[derive(clap::Args, Debug, Clone)]
#[command(next_help_heading = "Propagation Options")]
pub struct BehaviorConfig {
    /// Refresh security descriptors this run even if the last full refresh
    /// is still fresh
    #[arg(long)]
    pub refresh_access_control: bool,

    /// Do not propagate timestamps and attribute bits
    #[arg(long)]
    pub no_update_metadata: bool,
}

/// Output and logging configuration
///
/// Used by: `main()`, logging initialization, settings store
#[derive(clap::Args, Debug, Clone)]
#[command(next_help_heading = "Output Options")]
pub struct OutputConfig {
    /// Directory receiving the five per-channel log files; omit for
    /// console-only reporting
    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Settings file (ignore lists, ACL refresh cadence); omit to run with
    /// defaults and skip persistence
    #[arg(long, value_name = "FILE")]
    pub settings_file: Option<PathBuf>,

    /// Verbose output (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress all output except errors)
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Validate command-line arguments
    ///
    /// # Errors
    ///
    /// This function will return an error if:
    /// - The positional list is not a non-empty sequence of SOURCE TARGET
    ///   pairs
    /// - Both `--quiet` and `--verbose` are used
    pub fn validate(&self) -> Result<()> {
        if self.paths.roots.is_empty() {
            anyhow::bail!("No mirror pairs given; expected SOURCE TARGET [SOURCE TARGET]...");
        }
        if self.paths.roots.len() % 2 != 0 {
            anyhow::bail!(
                "Mirror pairs must come as SOURCE TARGET; got {} path(s)",
                self.paths.roots.len()
            );
        }
        if self.output.quiet && self.output.verbose > 0 {
            anyhow::bail!("Cannot use both --quiet and --verbose options");
        }
        Ok(())
    }

    /// The positional path list paired up into mirror tasks.
    #[must_use]
    pub fn tasks(&self) -> Vec<MirrorTask> {
        self.paths
            .roots
            .chunks_exact(2)
            .map(|pair| MirrorTask {
                source_root: pair[0].clone(),
                target_root: pair[1].clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn args_with_roots(roots: &[&str]) -> Args {
        Args {
            paths: PathConfig {
                roots: roots.iter().map(ToString::to_string).collect(),
            },
            filter: FilterConfig {
                ignore_path: Vec::new(),
                ignore_dir_name: Vec::new(),
            },
            behavior: BehaviorConfig {
                refresh_access_control: false,
                no_update_metadata: false,
            },
            output: OutputConfig {
                log_dir: None,
                settings_file: None,
                verbose: 0,
                quiet: false,
            },
        }
    }

    #[test]
    fn pairs_must_be_even_and_present() {
        assert!(args_with_roots(&[]).validate().is_err());
        assert!(args_with_roots(&[r"C:\a"]).validate().is_err());
        assert!(args_with_roots(&[r"C:\a", r"T:\a"]).validate().is_ok());
        assert!(args_with_roots(&[r"C:\a", r"T:\a", r"D:\b"]).validate().is_err());
    }

    #[test]
    fn tasks_pair_up_in_order() {
        let args = args_with_roots(&[r"C:\a", r"T:\a", r"D:\b", r"T:\b"]);
        let tasks = args.tasks();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].source_root, r"C:\a");
        assert_eq!(tasks[0].target_root, r"T:\a");
        assert_eq!(tasks[1].source_root, r"D:\b");
        assert_eq!(tasks[1].target_root, r"T:\b");
    }

    #[test]
    fn quiet_and_verbose_conflict() {
        let mut args = args_with_roots(&[r"C:\a", r"T:\a"]);
        args.output.quiet = true;
        args.output.verbose = 1;
        assert!(args.validate().is_err());
    }
}
