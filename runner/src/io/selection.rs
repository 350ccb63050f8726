//! Test file selection.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::io::config::RunnerConfig;

/// Decides whether a path is a test file to run.
pub trait FileFilter {
    fn is_eligible(&self, path: &Path) -> bool;
}

/// `test_file_match` patterns plus optional command-line path filters.
#[derive(Debug, Clone)]
pub struct FileSelection {
    patterns: Vec<Regex>,
    path_filters: Vec<String>,
}

impl FileSelection {
    pub fn new(patterns: &[String], path_filters: Vec<String>) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern).with_context(|| format!("compile pattern '{pattern}'"))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            patterns,
            path_filters,
        })
    }

    pub fn from_config(cfg: &RunnerConfig, path_filters: Vec<String>) -> Result<Self> {
        Self::new(&cfg.test_file_match, path_filters)
    }

    /// Eligible files under `root`, sorted. Hidden directories and
    /// `node_modules` are not descended into.
    pub fn select_files(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_excluded_dir(entry));
        for entry in walker {
            let entry = entry.with_context(|| format!("walk {}", root.display()))?;
            if entry.file_type().is_file() && self.is_eligible(entry.path()) {
                files.push(entry.into_path());
            }
        }
        files.sort();
        debug!(root = %root.display(), count = files.len(), "selected test files");
        Ok(files)
    }
}

fn is_excluded_dir(entry: &DirEntry) -> bool {
    if !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || name == "node_modules"
}

impl FileFilter for FileSelection {
    fn is_eligible(&self, path: &Path) -> bool {
        let normalized = path.to_string_lossy().replace('\\', "/");
        if !self.patterns.iter().any(|p| p.is_match(&normalized)) {
            return false;
        }
        self.path_filters.is_empty()
            || self
                .path_filters
                .iter()
                .any(|filter| normalized.contains(filter.as_str()))
    }
}
