//! Runner configuration stored in `typecase.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::mode::RunFilters;
use crate::task::Target;

pub const CONFIG_FILE_NAME: &str = "typecase.toml";

/// Runner configuration (TOML).
///
/// Missing fields take defaults, so an absent file is a valid configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RunnerConfig {
    /// Engine versions to run against, in order.
    pub targets: Vec<String>,

    /// Stop the run at the first error diagnostic.
    pub fail_fast: bool,

    /// Only run nodes whose name contains this (case-insensitive).
    pub only: Option<String>,

    /// Skip nodes whose name contains this (case-insensitive).
    pub skip: Option<String>,

    /// Directory searched for test files, relative to the config file.
    pub root_path: PathBuf,

    /// Regular expressions a test file path must match (any of).
    pub test_file_match: Vec<String>,

    /// Quiet period before watched changes are flushed as one batch.
    pub watch_debounce_ms: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            targets: vec!["current".to_string()],
            fail_fast: false,
            only: None,
            skip: None,
            root_path: PathBuf::from("."),
            test_file_match: vec![r"\.tst\.json$".to_string()],
            watch_debounce_ms: 100,
        }
    }
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub targets: Vec<String>,
    pub fail_fast: bool,
    pub only: Option<String>,
    pub skip: Option<String>,
}

impl RunnerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.targets.is_empty() {
            return Err(anyhow!("targets must be a non-empty array"));
        }
        if self.targets.iter().any(|target| target.trim().is_empty()) {
            return Err(anyhow!("targets must not contain blank entries"));
        }
        if self.watch_debounce_ms == 0 {
            return Err(anyhow!("watch_debounce_ms must be > 0"));
        }
        if self.test_file_match.is_empty() {
            return Err(anyhow!("test_file_match must be a non-empty array"));
        }
        for pattern in &self.test_file_match {
            Regex::new(pattern).with_context(|| format!("test_file_match pattern '{pattern}'"))?;
        }
        Ok(())
    }

    pub fn with_overrides(mut self, overrides: &ConfigOverrides) -> Self {
        if !overrides.targets.is_empty() {
            self.targets = overrides.targets.clone();
        }
        if overrides.fail_fast {
            self.fail_fast = true;
        }
        if overrides.only.is_some() {
            self.only = overrides.only.clone();
        }
        if overrides.skip.is_some() {
            self.skip = overrides.skip.clone();
        }
        self
    }

    pub fn targets(&self) -> Vec<Target> {
        self.targets.iter().map(|t| Target::new(t.trim())).collect()
    }

    /// Run-wide name filters; blank patterns are treated as unset.
    pub fn filters(&self) -> RunFilters {
        RunFilters {
            only: non_blank(self.only.as_deref()),
            skip: non_blank(self.skip.as_deref()),
            position: None,
        }
    }

    pub fn watch_debounce(&self) -> Duration {
        Duration::from_millis(self.watch_debounce_ms)
    }

    /// `root_path` resolved against the directory holding `config_path`.
    pub fn root_dir(&self, config_path: &Path) -> PathBuf {
        let base = config_path.parent().unwrap_or_else(|| Path::new("."));
        base.join(&self.root_path)
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RunnerConfig::default()`.
pub fn load_config(path: &Path) -> Result<RunnerConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "config missing, using defaults");
        let cfg = RunnerConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RunnerConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &RunnerConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
