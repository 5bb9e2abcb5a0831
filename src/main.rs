//! Binary entry point
//!
//! Parses arguments, wires up logging and the settings store, verifies the
//! guard files, and runs the mirror tasks. The process exit code is the
//! reporter's outcome mapping: `2` after any critical error, `1` after any
//! error, `0` otherwise.

use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use hobomirror::cli::Args;
use hobomirror::engine::SyncOptions;
use hobomirror::report::{FileSink, Reporter};
use hobomirror::settings::Settings;

fn main() {
    let args = Args::parse();
    init_tracing(&args);
    match run(&args) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            tracing::error!("{err:#}");
            std::process::exit(1);
        }
    }
}

fn init_tracing(args: &Args) {
    let default_level = if args.output.quiet {
        "error"
    } else {
        match args.output.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn unix_now() -> anyhow::Result<i64> {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system clock is before the unix epoch")?;
    Ok(i64::try_from(since_epoch.as_secs()).context("system clock out of range")?)
}

fn run(args: &Args) -> anyhow::Result<i32> {
    args.validate()?;

    let mut settings = match &args.output.settings_file {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    let now = unix_now()?;

    let refresh_access_control =
        args.behavior.refresh_access_control || settings.access_control_refresh_due(now);
    let mut ignore_paths = settings.ignore_paths.clone();
    ignore_paths.extend(args.filter.ignore_path.iter().cloned());
    let mut ignore_dir_names = settings.ignore_dir_names.clone();
    ignore_dir_names.extend(args.filter.ignore_dir_name.iter().cloned());
    let opts = SyncOptions {
        ignore_paths,
        ignore_dir_names,
        refresh_access_control,
        update_metadata: !args.behavior.no_update_metadata,
    };

    let report = Reporter::new();
    if let Some(dir) = &args.output.log_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating log directory {}", dir.display()))?;
        let sink = FileSink::open(dir)
            .with_context(|| format!("opening log files under {}", dir.display()))?;
        report.add_sink(Box::new(sink));
    }

    let ran = match mirror_all(args, &report, &opts) {
        Ok(ran) => ran,
        Err(err) => {
            report.error(&format!("{err:#}"));
            false
        }
    };

    let changed = report.changed_dirs();
    if changed.is_empty() {
        report.debug("No directories changed");
    } else {
        report.debug(&format!("Directories with changes ({}):", changed.len()));
        for dir in &changed {
            report.debug(&format!("  {dir}"));
        }
    }
    report.debug(&format!(
        "Run finished: {} change(s), {} error(s), {} critical error(s)",
        report.change_count(),
        report.error_count(),
        report.critical_count()
    ));

    if ran && refresh_access_control && report.critical_count() == 0 {
        settings.stamp_access_control_refresh(now);
        if let Some(path) = &args.output.settings_file {
            settings.save(path)?;
        }
    }

    Ok(report.exit_code())
}

/// Run every task against the production filesystem. Returns whether the
/// mirror phase was reached (guard failures and per-entry errors are
/// already on the reporter's channels).
#[cfg(windows)]
fn mirror_all(args: &Args, report: &Reporter, opts: &SyncOptions) -> anyhow::Result<bool> {
    use hobomirror::fs::windows::{enable_backup_privileges, WindowsFilesystem};
    use hobomirror::snapshot::PassthroughSnapshotter;

    enable_backup_privileges().context("enabling backup/restore privileges")?;
    let fs = WindowsFilesystem::new();
    // A VSS provider plugs in behind the Snapshotter trait; without one the
    // live volumes are read directly.
    let mut snapshotter = PassthroughSnapshotter;
    // Guard-file failures come back as FatalConfig and have already been
    // reported; the exit code carries the outcome.
    let _ = hobomirror::task::run_tasks(&fs, report, opts, &args.tasks(), &mut snapshotter);
    Ok(true)
}

#[cfg(not(windows))]
fn mirror_all(_args: &Args, _report: &Reporter, _opts: &SyncOptions) -> anyhow::Result<bool> {
    anyhow::bail!(
        "hobomirror mirrors NTFS metadata (reparse points, attributes, security \
         descriptors) and runs on Windows only"
    )
}
