//! Persistent settings
//!
//! A small TOML document on the operator's machine (not on the mirrored
//! volumes, hence plain `std::fs`). It carries the ignore lists and the
//! access-control refresh cadence: refreshing every descriptor on every run
//! is expensive on large trees, so ACL propagation runs only when forced or
//! when the last full refresh is older than the configured number of days.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Structured configuration persisted between runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// How many days an ACL refresh stays fresh.
    pub skip_refresh_access_control_days: u32,
    /// Unix seconds of the last completed ACL refresh, if any.
    pub last_refresh_access_control: Option<i64>,
    /// Absolute source paths excluded from mirroring (and deleted from the
    /// target on the next run).
    pub ignore_paths: Vec<String>,
    /// Leaf directory names excluded wherever they appear.
    pub ignore_dir_names: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            skip_refresh_access_control_days: 7,
            last_refresh_access_control: None,
            ignore_paths: Vec::new(),
            ignore_dir_names: Vec::new(),
        }
    }
}

impl Settings {
    /// Load settings from `path`; a missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Fails if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading settings file {}", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("parsing settings file {}", path.display()))
    }

    /// Write settings to `path`.
    ///
    /// # Errors
    ///
    /// Fails if serialization or the write fails.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let text = toml::to_string_pretty(self).context("serializing settings")?;
        std::fs::write(path, text)
            .with_context(|| format!("writing settings file {}", path.display()))
    }

    /// Is a full ACL refresh due at `now_unix`?
    #[must_use]
    pub fn access_control_refresh_due(&self, now_unix: i64) -> bool {
        match self.last_refresh_access_control {
            None => true,
            Some(last) => {
                let age_days = (now_unix - last) / 86_400;
                age_days >= i64::from(self.skip_refresh_access_control_days)
            }
        }
    }

    /// Record a completed ACL refresh at `now_unix`.
    pub fn stamp_access_control_refresh(&mut self, now_unix: i64) {
        self.last_refresh_access_control = Some(now_unix);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = Settings::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(loaded, Settings::default());
    }

    #[test]
    fn settings_round_trip_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        let mut settings = Settings::default();
        settings.ignore_paths.push(r"D:\data\cache".to_string());
        settings.ignore_dir_names.push("node_modules".to_string());
        settings.stamp_access_control_refresh(1_700_000_000);
        settings.save(&path).unwrap();

        let loaded = Settings::load(&path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn refresh_cadence_compares_whole_days() {
        let mut s = Settings::default();
        assert!(s.access_control_refresh_due(0));
        s.stamp_access_control_refresh(1_000_000);
        assert!(!s.access_control_refresh_due(1_000_000 + 6 * 86_400));
        assert!(s.access_control_refresh_due(1_000_000 + 7 * 86_400));
    }

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let parsed: Settings =
            toml::from_str("skip_refresh_access_control_days = 3\n").unwrap();
        assert_eq!(parsed.skip_refresh_access_control_days, 3);
        assert_eq!(parsed.last_refresh_access_control, None);
    }
}
