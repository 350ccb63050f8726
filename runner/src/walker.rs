//! Depth-first traversal of one file's declaration tree.
//!
//! Every visited node publishes exactly one start and one terminal event, with
//! all descendant events in between. Cancellation is checked before each
//! sibling; siblings left unvisited publish nothing.

use anyhow::Result;
use tracing::debug;

use crate::cancellation::CancellationToken;
use crate::core::mode::{RunFilters, RunMode, resolve};
use crate::core::structure::validate_child;
use crate::declaration::{
    AssertionInfo, DeclarationKind, NodeKind, RAISE_ERROR_MATCHER, TestDeclaration, TestTree,
};
use crate::diagnostic::{Diagnostic, DiagnosticOrigin};
use crate::engine::Evaluator;
use crate::events::{Event, EventBus};
use crate::task::Task;

/// Whether traversal of the file continues after a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    /// Abandon the rest of the file; open ancestors still close.
    Abort,
}

/// Assertion failures observed inside the case being visited.
#[derive(Debug, Default)]
struct CaseTally {
    failed: u32,
}

/// Per-file traversal state, threaded explicitly through the walk.
pub struct TreeWalker<'a, E: Evaluator + ?Sized> {
    bus: &'a mut EventBus,
    token: &'a CancellationToken,
    evaluator: &'a mut E,
    task: &'a Task,
    filters: RunFilters,
    has_only: bool,
}

impl<'a, E: Evaluator + ?Sized> TreeWalker<'a, E> {
    pub fn new(
        bus: &'a mut EventBus,
        token: &'a CancellationToken,
        evaluator: &'a mut E,
        task: &'a Task,
        filters: RunFilters,
        has_only: bool,
    ) -> Self {
        Self {
            bus,
            token,
            evaluator,
            task,
            filters,
            has_only,
        }
    }

    pub fn walk(&mut self, tree: &TestTree) -> Result<()> {
        let flow = self.visit(
            &tree.children,
            None,
            RunMode::default(),
            &mut CaseTally::default(),
        )?;
        if flow == Flow::Abort {
            debug!(task = %self.task, "traversal abandoned");
        }
        Ok(())
    }

    fn visit(
        &mut self,
        nodes: &[TestDeclaration],
        parent: Option<NodeKind>,
        mode: RunMode,
        tally: &mut CaseTally,
    ) -> Result<Flow> {
        for node in nodes {
            if self.token.is_cancellation_requested() {
                break;
            }
            if let Some(violation) = validate_child(self.task.path(), parent, node) {
                self.task_error(vec![violation])?;
                return Ok(Flow::Continue);
            }
            let node_mode = resolve(mode, node, &self.filters);
            let flow = match &node.kind {
                DeclarationKind::Group => self.visit_group(node, node_mode, tally)?,
                DeclarationKind::Case => self.visit_case(node, node_mode)?,
                DeclarationKind::Assertion(info) => {
                    self.visit_assertion(node, info, node_mode, tally)?
                }
            };
            if flow == Flow::Abort {
                return Ok(Flow::Abort);
            }
        }

        Ok(Flow::Continue)
    }

    fn visit_group(
        &mut self,
        node: &TestDeclaration,
        mode: RunMode,
        tally: &mut CaseTally,
    ) -> Result<Flow> {
        self.bus.publish(Event::GroupStart {
            name: node.name.clone(),
        })?;

        let inactive = mode.is_pruned(self.has_only) || mode.todo;
        let flow = if !inactive && !node.diagnostics.is_empty() {
            self.task_error(node.diagnostics.clone())?;
            Flow::Abort
        } else {
            self.visit(&node.children, Some(NodeKind::Group), mode, tally)?
        };

        self.bus.publish(Event::GroupEnd {
            name: node.name.clone(),
        })?;
        Ok(flow)
    }

    fn visit_case(&mut self, node: &TestDeclaration, mode: RunMode) -> Result<Flow> {
        let name = node.name.clone();
        self.bus.publish(Event::CaseStart { name: name.clone() })?;

        if mode.todo {
            self.bus.publish(Event::CaseTodo { name })?;
            return Ok(Flow::Continue);
        }

        let pruned = mode.is_pruned(self.has_only);
        if !pruned && !node.diagnostics.is_empty() {
            self.bus.publish(Event::CaseError {
                name,
                diagnostics: node.diagnostics.clone(),
            })?;
            return Ok(Flow::Continue);
        }

        let mut tally = CaseTally::default();
        let flow = self.visit(&node.children, Some(NodeKind::Case), mode, &mut tally)?;

        let terminal = if pruned {
            Event::CaseSkip { name }
        } else if tally.failed > 0 {
            Event::CaseFail { name }
        } else {
            Event::CasePass { name }
        };
        self.bus.publish(terminal)?;
        Ok(flow)
    }

    fn visit_assertion(
        &mut self,
        node: &TestDeclaration,
        info: &AssertionInfo,
        mode: RunMode,
        tally: &mut CaseTally,
    ) -> Result<Flow> {
        let flow = self.visit(&node.children, Some(NodeKind::Assertion), mode, tally)?;

        self.bus.publish(Event::ExpectStart {
            matcher: info.matcher.clone(),
            negated: info.negated,
        })?;

        if mode.is_pruned(self.has_only) {
            self.bus.publish(Event::ExpectSkip)?;
            return Ok(flow);
        }

        if !node.diagnostics.is_empty() && info.matcher != RAISE_ERROR_MATCHER {
            tally.failed += 1;
            self.bus.publish(Event::ExpectError {
                diagnostics: node.diagnostics.clone(),
            })?;
            return Ok(flow);
        }

        let evaluation = match self.evaluator.evaluate(self.task, node) {
            Ok(evaluation) => evaluation,
            Err(diagnostics) => {
                tally.failed += 1;
                self.bus.publish(Event::ExpectError { diagnostics })?;
                return Ok(flow);
            }
        };

        let holds = if info.negated {
            !evaluation.is_match
        } else {
            evaluation.is_match
        };

        let terminal = match (holds, mode.fail) {
            (true, true) => {
                tally.failed += 1;
                Event::ExpectError {
                    diagnostics: vec![
                        Diagnostic::error("assertion was expected to fail but passed")
                            .with_origin(self.origin(node)),
                    ],
                }
            }
            (true, false) | (false, true) => Event::ExpectPass,
            (false, false) => {
                tally.failed += 1;
                Event::ExpectFail {
                    diagnostics: evaluation.explain(),
                }
            }
        };
        self.bus.publish(terminal)?;
        Ok(flow)
    }

    fn task_error(&mut self, diagnostics: Vec<Diagnostic>) -> Result<()> {
        self.bus.publish(Event::TaskError {
            task: self.task.clone(),
            diagnostics,
        })
    }

    fn origin(&self, node: &TestDeclaration) -> DiagnosticOrigin {
        DiagnosticOrigin {
            file: self.task.file.clone(),
            start: node.start,
            end: node.end,
        }
    }
}
