//! Replay collaborators backed by JSON fixture files.
//!
//! A fixture holds a collected declaration tree and the recorded outcome of
//! each assertion, keyed by the assertion's start offset. Outcomes may be
//! pinned to a target; unpinned ones apply to every target.
//!
//! ```json
//! {
//!   "project": "tsconfig.json",
//!   "tree": { "children": [ ... ] },
//!   "outcomes": [
//!     { "start": 40, "outcome": "match" },
//!     { "start": 80, "target": "5.4", "outcome": "mismatch", "explain": ["..."] }
//!   ]
//! }
//! ```

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::declaration::{TestDeclaration, TestTree};
use crate::diagnostic::{Diagnostic, DiagnosticOrigin};
use crate::engine::{Collector, EngineProvider, Evaluation, Evaluator};
use crate::task::{Target, Task};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FixtureFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<PathBuf>,
    #[serde(default)]
    pub tree: TestTree,
    #[serde(default)]
    pub outcomes: Vec<RecordedAssertion>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordedAssertion {
    pub start: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(flatten)]
    pub outcome: RecordedOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum RecordedOutcome {
    Match,
    Mismatch {
        #[serde(default)]
        explain: Vec<String>,
    },
    /// The evaluator refused the assertion's arguments.
    Rejected {
        #[serde(default)]
        diagnostics: Vec<String>,
    },
}

pub fn load_fixture(path: &Path) -> Result<FixtureFile> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read fixture {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse fixture {}", path.display()))
}

/// Engine that replays fixtures for one target.
///
/// Each fixture is read once per engine; a fresh engine sees edits made
/// since the previous run.
#[derive(Debug)]
pub struct FixtureEngine {
    target: Target,
    fixtures: HashMap<PathBuf, FixtureFile>,
}

impl FixtureEngine {
    pub fn new(target: Target) -> Self {
        Self {
            target,
            fixtures: HashMap::new(),
        }
    }

    fn fixture(&mut self, task: &Task) -> Result<&FixtureFile> {
        match self.fixtures.entry(task.file.clone()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => Ok(entry.insert(load_fixture(&task.file)?)),
        }
    }

    fn outcome_for(&self, task: &Task, start: usize) -> Option<&RecordedOutcome> {
        let fixture = self.fixtures.get(&task.file)?;
        let candidates = fixture.outcomes.iter().filter(|r| r.start == start);
        let mut fallback = None;
        for recorded in candidates {
            match recorded.target.as_deref() {
                Some(target) if target == self.target.as_str() => return Some(&recorded.outcome),
                Some(_) => {}
                None => fallback = fallback.or(Some(&recorded.outcome)),
            }
        }
        fallback
    }
}

impl Collector for FixtureEngine {
    #[instrument(skip_all, fields(task = %task, target = %self.target))]
    fn collect(&mut self, task: &Task) -> Result<TestTree, Vec<Diagnostic>> {
        let fixture = self
            .fixture(task)
            .map_err(|err| vec![Diagnostic::error(format!("{err:#}"))])?;
        debug!(nodes = fixture.tree.children.len(), "fixture loaded");
        Ok(fixture.tree.clone())
    }

    fn project_for(&mut self, task: &Task) -> Option<PathBuf> {
        // unreadable fixtures are reported by `collect`
        self.fixture(task).ok().and_then(|f| f.project.clone())
    }
}

impl Evaluator for FixtureEngine {
    fn evaluate(
        &mut self,
        task: &Task,
        assertion: &TestDeclaration,
    ) -> Result<Evaluation, Vec<Diagnostic>> {
        let origin = DiagnosticOrigin {
            file: task.file.clone(),
            start: assertion.start,
            end: assertion.end,
        };
        match self.outcome_for(task, assertion.start) {
            Some(RecordedOutcome::Match) => Ok(Evaluation::new(true, Vec::new)),
            Some(RecordedOutcome::Mismatch { explain }) => {
                let explain = explain.clone();
                Ok(Evaluation::new(false, move || {
                    explain
                        .into_iter()
                        .map(|text| Diagnostic::error(text).with_origin(origin.clone()))
                        .collect()
                }))
            }
            Some(RecordedOutcome::Rejected { diagnostics }) => Err(diagnostics
                .iter()
                .map(|text| Diagnostic::error(text.clone()).with_origin(origin.clone()))
                .collect()),
            None => Err(vec![
                Diagnostic::error(format!(
                    "no recorded outcome for assertion at offset {} (target {})",
                    assertion.start, self.target
                ))
                .with_origin(origin),
            ]),
        }
    }
}

/// Hands out fixture engines for the targets it supports.
#[derive(Debug, Clone, Default)]
pub struct FixtureProvider {
    /// `None` accepts every target.
    supported: Option<Vec<Target>>,
}

impl FixtureProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn supporting(targets: Vec<Target>) -> Self {
        Self {
            supported: Some(targets),
        }
    }
}

impl EngineProvider for FixtureProvider {
    type Engine = FixtureEngine;

    fn acquire(&mut self, target: &Target) -> Result<FixtureEngine, Vec<Diagnostic>> {
        if let Some(supported) = &self.supported
            && !supported.contains(target)
        {
            return Err(vec![Diagnostic::error(format!(
                "target '{target}' is not available"
            ))]);
        }
        Ok(FixtureEngine::new(target.clone()))
    }
}
