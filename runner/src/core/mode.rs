//! Effective run mode resolution.
//!
//! Precedence, applied at every node on top of the inherited mode:
//! 1. `fail` flag sets `fail`.
//! 2. `only` flag or an `only` name match sets `only`.
//! 3. `skip` flag or a `skip` name match sets `skip`.
//! 4. `todo` flag sets `todo`.
//! 5. A node starting at the selected position sets `only` and clears
//!    `skip`, whatever was inherited or declared.
//!
//! Bits only accumulate down a subtree, except `skip` which step 5 clears.

use crate::declaration::{TestDeclaration, TestTree};
use crate::task::Task;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunMode {
    pub fail: bool,
    pub only: bool,
    pub skip: bool,
    pub todo: bool,
}

impl RunMode {
    /// Skipped outright, or excluded because the file is in only-pruning
    /// semantics and this node is not selected.
    pub fn is_pruned(self, has_only: bool) -> bool {
        self.skip || (has_only && !self.only)
    }
}

/// Run-time filters for one task.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunFilters {
    /// Case-insensitive substring selecting nodes by name.
    pub only: Option<String>,
    /// Case-insensitive substring skipping nodes by name.
    pub skip: Option<String>,
    /// Start offset of the single declaration to run.
    pub position: Option<usize>,
}

impl RunFilters {
    /// Same name filters, narrowed to the task's position.
    pub fn for_task(&self, task: &Task) -> RunFilters {
        RunFilters {
            only: self.only.clone(),
            skip: self.skip.clone(),
            position: task.position,
        }
    }
}

pub fn resolve(inherited: RunMode, node: &TestDeclaration, filters: &RunFilters) -> RunMode {
    let mut mode = inherited;

    if node.flags.fail {
        mode.fail = true;
    }
    if node.flags.only || name_matches(&node.name, filters.only.as_deref()) {
        mode.only = true;
    }
    if node.flags.skip || name_matches(&node.name, filters.skip.as_deref()) {
        mode.skip = true;
    }
    if node.flags.todo {
        mode.todo = true;
    }
    if filters.position == Some(node.start) {
        mode.only = true;
        mode.skip = false;
    }

    mode
}

/// True if the file must be run with only-pruning semantics.
pub fn has_only(tree: &TestTree, filters: &RunFilters) -> bool {
    tree.contains_only() || filters.only.is_some() || filters.position.is_some()
}

fn name_matches(name: &str, pattern: Option<&str>) -> bool {
    match pattern {
        Some(pattern) => name.to_lowercase().contains(&pattern.to_lowercase()),
        None => false,
    }
}
