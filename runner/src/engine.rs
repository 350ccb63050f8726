//! Seams to the external collaborators: collection, evaluation and engine
//! acquisition.
//!
//! Implementations report their own failures as diagnostics. The runner turns
//! them into `target:error`, `task:error` or `expect:error` events.

use std::fmt;
use std::path::PathBuf;

use crate::declaration::{TestDeclaration, TestTree};
use crate::diagnostic::Diagnostic;
use crate::task::{Target, Task};

/// Outcome of evaluating one assertion's type relation.
pub struct Evaluation {
    pub is_match: bool,
    explain: Box<dyn FnOnce() -> Vec<Diagnostic>>,
}

impl Evaluation {
    /// `explain` is only called when the assertion failed.
    pub fn new<F>(is_match: bool, explain: F) -> Self
    where
        F: FnOnce() -> Vec<Diagnostic> + 'static,
    {
        Self {
            is_match,
            explain: Box::new(explain),
        }
    }

    pub fn explain(self) -> Vec<Diagnostic> {
        (self.explain)()
    }
}

impl fmt::Debug for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Evaluation")
            .field("is_match", &self.is_match)
            .finish_non_exhaustive()
    }
}

pub trait Collector {
    /// Produce the declaration tree for a task's file.
    fn collect(&mut self, task: &Task) -> Result<TestTree, Vec<Diagnostic>>;

    /// Project (e.g. configuration file) the task's file belongs to.
    ///
    /// Called before `collect` for the same task.
    fn project_for(&mut self, _task: &Task) -> Option<PathBuf> {
        None
    }
}

pub trait Evaluator {
    /// Evaluate one assertion. `Err` carries argument-validation diagnostics.
    fn evaluate(
        &mut self,
        task: &Task,
        assertion: &TestDeclaration,
    ) -> Result<Evaluation, Vec<Diagnostic>>;
}

pub trait EngineProvider {
    type Engine: Collector + Evaluator;

    /// Acquire a checking engine for `target`. `Err` means nothing runs for it.
    fn acquire(&mut self, target: &Target) -> Result<Self::Engine, Vec<Diagnostic>>;
}
