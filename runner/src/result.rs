//! Result tree mirroring the declaration hierarchy:
//! run ⊃ target ⊃ project ⊃ task ⊃ group/case ⊃ assertion.
//!
//! Counts are incremented as terminal events arrive and never recomputed, so
//! a tree inspected mid-run is a consistent snapshot.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::declaration::NodeKind;
use crate::diagnostic::Diagnostic;
use crate::task::{Target, Task};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Running,
    Passed,
    Failed,
    Skipped,
    Todo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Timing {
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
}

impl Timing {
    fn started() -> Self {
        Self {
            start: Utc::now(),
            end: None,
        }
    }

    fn finish(&mut self) {
        self.end = Some(Utc::now());
    }

    pub fn duration(&self) -> Option<chrono::Duration> {
        self.end.map(|end| end - self.start)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResultCounts {
    pub failed: u32,
    pub passed: u32,
    pub skipped: u32,
    pub todo: u32,
    pub total: u32,
}

impl ResultCounts {
    /// Record one terminal status. `Running` is not terminal and is ignored.
    pub fn record(&mut self, status: ResultStatus) {
        match status {
            ResultStatus::Running => return,
            ResultStatus::Passed => self.passed += 1,
            ResultStatus::Failed => self.failed += 1,
            ResultStatus::Skipped => self.skipped += 1,
            ResultStatus::Todo => self.todo += 1,
        }
        self.total += 1;
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub status: ResultStatus,
    pub timing: Timing,
    pub tasks: Vec<Task>,
    pub file_counts: ResultCounts,
    pub test_counts: ResultCounts,
    pub assertion_counts: ResultCounts,
    pub targets: Vec<TargetResult>,
}

impl RunResult {
    pub(crate) fn new(tasks: Vec<Task>) -> Self {
        Self {
            status: ResultStatus::Running,
            timing: Timing::started(),
            tasks,
            file_counts: ResultCounts::default(),
            test_counts: ResultCounts::default(),
            assertion_counts: ResultCounts::default(),
            targets: Vec::new(),
        }
    }

    pub(crate) fn close(&mut self, failed: bool) {
        self.status = if failed {
            ResultStatus::Failed
        } else {
            ResultStatus::Passed
        };
        self.timing.finish();
    }

    /// True if anything in the run failed or errored.
    pub fn has_failures(&self) -> bool {
        self.status == ResultStatus::Failed
            || self.file_counts.failed > 0
            || self.test_counts.failed > 0
            || self.assertion_counts.failed > 0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TargetResult {
    pub target: Target,
    pub status: ResultStatus,
    pub timing: Timing,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
    pub file_counts: ResultCounts,
    pub test_counts: ResultCounts,
    pub assertion_counts: ResultCounts,
    pub projects: Vec<ProjectResult>,
}

impl TargetResult {
    pub(crate) fn new(target: Target) -> Self {
        Self {
            target,
            status: ResultStatus::Running,
            timing: Timing::started(),
            diagnostics: Vec::new(),
            file_counts: ResultCounts::default(),
            test_counts: ResultCounts::default(),
            assertion_counts: ResultCounts::default(),
            projects: Vec::new(),
        }
    }

    pub(crate) fn close(&mut self, failed: bool) {
        self.status = if failed {
            ResultStatus::Failed
        } else {
            ResultStatus::Passed
        };
        self.timing.finish();
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectResult {
    pub config_file: Option<PathBuf>,
    pub status: ResultStatus,
    pub timing: Timing,
    pub tasks: Vec<TaskResult>,
}

impl ProjectResult {
    pub(crate) fn new(config_file: Option<PathBuf>) -> Self {
        Self {
            config_file,
            status: ResultStatus::Running,
            timing: Timing::started(),
            tasks: Vec::new(),
        }
    }

    pub(crate) fn close(&mut self) {
        let failed = self
            .tasks
            .iter()
            .any(|task| task.status == ResultStatus::Failed);
        self.status = if failed {
            ResultStatus::Failed
        } else {
            ResultStatus::Passed
        };
        self.timing.finish();
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskResult {
    pub task: Task,
    pub status: ResultStatus,
    pub timing: Timing,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
    pub test_counts: ResultCounts,
    pub assertion_counts: ResultCounts,
    pub children: Vec<ResultNode>,
}

impl TaskResult {
    pub(crate) fn new(task: Task) -> Self {
        Self {
            task,
            status: ResultStatus::Running,
            timing: Timing::started(),
            diagnostics: Vec::new(),
            test_counts: ResultCounts::default(),
            assertion_counts: ResultCounts::default(),
            children: Vec::new(),
        }
    }

    /// Decide the file status from what was observed and close the timing.
    pub(crate) fn close(&mut self) -> ResultStatus {
        let tests = self.test_counts;
        let assertions = self.assertion_counts;
        self.status = if !self.diagnostics.is_empty() || tests.failed > 0 || assertions.failed > 0
        {
            ResultStatus::Failed
        } else if tests.passed > 0 || assertions.passed > 0 {
            ResultStatus::Passed
        } else if tests.skipped > 0 || assertions.skipped > 0 {
            ResultStatus::Skipped
        } else if tests.todo > 0 {
            ResultStatus::Todo
        } else {
            ResultStatus::Passed
        };
        self.timing.finish();
        self.status
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ResultNode {
    Group(GroupResult),
    Case(CaseResult),
    Assertion(AssertionResult),
}

impl ResultNode {
    pub fn kind(&self) -> NodeKind {
        match self {
            ResultNode::Group(_) => NodeKind::Group,
            ResultNode::Case(_) => NodeKind::Case,
            ResultNode::Assertion(_) => NodeKind::Assertion,
        }
    }

    pub fn status(&self) -> ResultStatus {
        match self {
            ResultNode::Group(group) => group.status,
            ResultNode::Case(case) => case.status,
            ResultNode::Assertion(assertion) => assertion.status,
        }
    }

    pub fn children(&self) -> &[ResultNode] {
        match self {
            ResultNode::Group(group) => &group.children,
            ResultNode::Case(case) => &case.children,
            ResultNode::Assertion(assertion) => &assertion.children,
        }
    }

    pub(crate) fn children_mut(&mut self) -> &mut Vec<ResultNode> {
        match self {
            ResultNode::Group(group) => &mut group.children,
            ResultNode::Case(case) => &mut case.children,
            ResultNode::Assertion(assertion) => &mut assertion.children,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupResult {
    pub name: String,
    pub status: ResultStatus,
    pub timing: Timing,
    pub children: Vec<ResultNode>,
}

impl GroupResult {
    pub(crate) fn new(name: String) -> Self {
        Self {
            name,
            status: ResultStatus::Running,
            timing: Timing::started(),
            children: Vec::new(),
        }
    }

    /// Failed if any child failed; skipped or todo if every child was; else
    /// passed.
    pub(crate) fn close(&mut self) {
        let statuses: Vec<ResultStatus> = self.children.iter().map(ResultNode::status).collect();
        self.status = if statuses.contains(&ResultStatus::Failed) {
            ResultStatus::Failed
        } else if !statuses.is_empty() && statuses.iter().all(|s| *s == ResultStatus::Todo) {
            ResultStatus::Todo
        } else if !statuses.is_empty()
            && statuses
                .iter()
                .all(|s| matches!(s, ResultStatus::Skipped | ResultStatus::Todo))
        {
            ResultStatus::Skipped
        } else {
            ResultStatus::Passed
        };
        self.timing.finish();
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CaseResult {
    pub name: String,
    pub status: ResultStatus,
    pub timing: Timing,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
    pub assertion_counts: ResultCounts,
    pub children: Vec<ResultNode>,
}

impl CaseResult {
    pub(crate) fn new(name: String) -> Self {
        Self {
            name,
            status: ResultStatus::Running,
            timing: Timing::started(),
            diagnostics: Vec::new(),
            assertion_counts: ResultCounts::default(),
            children: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AssertionResult {
    pub matcher: String,
    pub negated: bool,
    pub status: ResultStatus,
    pub timing: Timing,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
    pub children: Vec<ResultNode>,
}

impl AssertionResult {
    pub(crate) fn new(matcher: String, negated: bool) -> Self {
        Self {
            matcher,
            negated,
            status: ResultStatus::Running,
            timing: Timing::started(),
            diagnostics: Vec::new(),
            children: Vec::new(),
        }
    }
}

/// Set status, attach diagnostics and close timing on a case or assertion.
pub(crate) fn close_leaf(node: &mut ResultNode, status: ResultStatus, diagnostics: &[Diagnostic]) {
    match node {
        ResultNode::Case(case) => {
            case.status = status;
            case.diagnostics.extend_from_slice(diagnostics);
            case.timing.finish();
        }
        ResultNode::Assertion(assertion) => {
            assertion.status = status;
            assertion.diagnostics.extend_from_slice(diagnostics);
            assertion.timing.finish();
        }
        ResultNode::Group(group) => group.close(),
    }
}
