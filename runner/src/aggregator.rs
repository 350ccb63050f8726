//! Event reducer that builds the result tree.
//!
//! The aggregator keeps one open node per level. Targets, projects and tasks
//! are always the last child of their parent, so only the group/case/assertion
//! nesting inside the current task needs an explicit cursor.

use anyhow::{Context, Result, anyhow, bail};

use crate::declaration::NodeKind;
use crate::diagnostic::Diagnostic;
use crate::events::{Event, EventHandler};
use crate::result::{
    AssertionResult, CaseResult, GroupResult, ProjectResult, ResultNode, ResultStatus, RunResult,
    TargetResult, TaskResult, close_leaf,
};

/// Builds a [`RunResult`] from a well-nested event stream.
///
/// One instance serves one run at a time; `run:start` replaces any previous
/// result.
#[derive(Debug, Default)]
pub struct ResultAggregator {
    run: Option<RunResult>,
    /// Index path (and kind) of open nodes inside the current task.
    open: Vec<(usize, NodeKind)>,
    target_failed: bool,
    run_failed: bool,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot, complete once `run:end` was observed.
    pub fn result(&self) -> Option<&RunResult> {
        self.run.as_ref()
    }

    pub fn take_result(&mut self) -> Option<RunResult> {
        self.open.clear();
        self.run.take()
    }

    fn run_mut(&mut self) -> Result<&mut RunResult> {
        self.run.as_mut().ok_or_else(|| anyhow!("no run started"))
    }

    fn target_mut(&mut self) -> Result<&mut TargetResult> {
        self.run_mut()?
            .targets
            .last_mut()
            .ok_or_else(|| anyhow!("no target started"))
    }

    fn project_mut(&mut self) -> Result<&mut ProjectResult> {
        self.target_mut()?
            .projects
            .last_mut()
            .ok_or_else(|| anyhow!("no project started"))
    }

    fn task_mut(&mut self) -> Result<&mut TaskResult> {
        self.project_mut()?
            .tasks
            .last_mut()
            .ok_or_else(|| anyhow!("no task started"))
    }

    fn mark_failed(&mut self) {
        self.target_failed = true;
        self.run_failed = true;
    }

    fn push_node(&mut self, node: ResultNode) -> Result<()> {
        let kind = node.kind();
        let path: Vec<usize> = self.open.iter().map(|(index, _)| *index).collect();
        let task = self.task_mut()?;
        let siblings = children_at(&mut task.children, &path)?;
        siblings.push(node);
        let index = siblings.len() - 1;
        self.open.push((index, kind));
        Ok(())
    }

    /// Close the innermost open node, which must be of `kind`.
    fn pop_node(
        &mut self,
        kind: NodeKind,
        status: Option<ResultStatus>,
        diagnostics: &[Diagnostic],
    ) -> Result<ResultStatus> {
        match self.open.last() {
            Some((_, open_kind)) if *open_kind == kind => {}
            Some((_, open_kind)) => bail!("expected open {kind}, found open {open_kind}"),
            None => bail!("expected open {kind}, found none"),
        }
        let path: Vec<usize> = self.open.iter().map(|(index, _)| *index).collect();
        let task = self.task_mut()?;
        let node = node_at(&mut task.children, &path)?;
        close_leaf(node, status.unwrap_or(ResultStatus::Running), diagnostics);
        let closed = node.status();
        self.open.pop();
        Ok(closed)
    }

    fn finish_case(&mut self, status: ResultStatus, diagnostics: &[Diagnostic]) -> Result<()> {
        let status = self.pop_node(NodeKind::Case, Some(status), diagnostics)?;
        self.task_mut()?.test_counts.record(status);
        self.target_mut()?.test_counts.record(status);
        self.run_mut()?.test_counts.record(status);
        if status == ResultStatus::Failed {
            self.mark_failed();
        }
        Ok(())
    }

    fn finish_assertion(&mut self, status: ResultStatus, diagnostics: &[Diagnostic]) -> Result<()> {
        let status = self.pop_node(NodeKind::Assertion, Some(status), diagnostics)?;

        let case_depth = self
            .open
            .iter()
            .rposition(|(_, kind)| *kind == NodeKind::Case);
        if let Some(depth) = case_depth {
            let path: Vec<usize> = self.open[..=depth].iter().map(|(index, _)| *index).collect();
            let task = self.task_mut()?;
            if let ResultNode::Case(case) = node_at(&mut task.children, &path)? {
                case.assertion_counts.record(status);
            }
        }

        self.task_mut()?.assertion_counts.record(status);
        self.target_mut()?.assertion_counts.record(status);
        self.run_mut()?.assertion_counts.record(status);
        if status == ResultStatus::Failed {
            self.mark_failed();
        }
        Ok(())
    }

    fn apply(&mut self, event: &Event) -> Result<()> {
        match event {
            Event::RunStart { tasks, .. } => {
                self.run = Some(RunResult::new(tasks.clone()));
                self.open.clear();
                self.run_failed = false;
            }
            Event::RunEnd => {
                let failed = self.run_failed;
                self.run_mut()?.close(failed);
            }

            Event::TargetStart { target } => {
                self.run_mut()?
                    .targets
                    .push(TargetResult::new(target.clone()));
                self.target_failed = false;
            }
            Event::TargetError { diagnostics, .. } => {
                self.target_mut()?.diagnostics.extend_from_slice(diagnostics);
                self.mark_failed();
            }
            Event::TargetEnd { .. } => {
                let failed = self.target_failed;
                self.target_mut()?.close(failed);
            }

            Event::ProjectStart { config_file } => {
                self.target_mut()?
                    .projects
                    .push(ProjectResult::new(config_file.clone()));
            }
            Event::ProjectEnd => self.project_mut()?.close(),

            Event::TaskStart { task } => {
                self.project_mut()?.tasks.push(TaskResult::new(task.clone()));
                self.open.clear();
            }
            Event::TaskError { diagnostics, .. } => {
                self.task_mut()?.diagnostics.extend_from_slice(diagnostics);
                self.mark_failed();
            }
            Event::TaskEnd { .. } => {
                if !self.open.is_empty() {
                    bail!("{} node(s) still open", self.open.len());
                }
                let status = self.task_mut()?.close();
                self.target_mut()?.file_counts.record(status);
                self.run_mut()?.file_counts.record(status);
                if status == ResultStatus::Failed {
                    self.mark_failed();
                }
            }

            Event::GroupStart { name } => {
                self.push_node(ResultNode::Group(GroupResult::new(name.clone())))?;
            }
            Event::GroupEnd { .. } => {
                self.pop_node(NodeKind::Group, None, &[])?;
            }

            Event::CaseStart { name } => {
                self.push_node(ResultNode::Case(CaseResult::new(name.clone())))?;
            }
            Event::CaseError { diagnostics, .. } => {
                self.finish_case(ResultStatus::Failed, diagnostics)?;
            }
            Event::CaseFail { .. } => self.finish_case(ResultStatus::Failed, &[])?,
            Event::CasePass { .. } => self.finish_case(ResultStatus::Passed, &[])?,
            Event::CaseSkip { .. } => self.finish_case(ResultStatus::Skipped, &[])?,
            Event::CaseTodo { .. } => self.finish_case(ResultStatus::Todo, &[])?,

            Event::ExpectStart { matcher, negated } => {
                self.push_node(ResultNode::Assertion(AssertionResult::new(
                    matcher.clone(),
                    *negated,
                )))?;
            }
            Event::ExpectError { diagnostics } | Event::ExpectFail { diagnostics } => {
                self.finish_assertion(ResultStatus::Failed, diagnostics)?;
            }
            Event::ExpectPass => self.finish_assertion(ResultStatus::Passed, &[])?,
            Event::ExpectSkip => self.finish_assertion(ResultStatus::Skipped, &[])?,

            Event::WatchError { .. } | Event::DeprecationInfo { .. } => {}
        }
        Ok(())
    }
}

impl EventHandler for ResultAggregator {
    fn handle(&mut self, event: &Event) -> Result<()> {
        self.apply(event)
            .with_context(|| format!("aggregate {}", event.name()))
    }
}

fn node_at<'a>(children: &'a mut [ResultNode], path: &[usize]) -> Result<&'a mut ResultNode> {
    let (first, rest) = path
        .split_first()
        .ok_or_else(|| anyhow!("empty result path"))?;
    let node = children
        .get_mut(*first)
        .ok_or_else(|| anyhow!("result path index {first} out of range"))?;
    if rest.is_empty() {
        return Ok(node);
    }
    node_at(node.children_mut(), rest)
}

fn children_at<'a>(
    children: &'a mut Vec<ResultNode>,
    path: &[usize],
) -> Result<&'a mut Vec<ResultNode>> {
    if path.is_empty() {
        return Ok(children);
    }
    Ok(node_at(children, path)?.children_mut())
}
