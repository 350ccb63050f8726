//! Structural nesting rules not expressible in the declaration schema:
//! - a group must not directly contain assertions
//! - a case or assertion must not directly contain groups or cases

use std::path::Path;

use crate::declaration::{NodeKind, TestDeclaration};
use crate::diagnostic::{Diagnostic, DiagnosticOrigin};

/// Validate one `child` against its parent's kind (`None` at file level).
pub fn validate_child(
    file: &Path,
    parent: Option<NodeKind>,
    child: &TestDeclaration,
) -> Option<Diagnostic> {
    let parent = parent?;
    if allowed(parent, child.node_kind()) {
        return None;
    }

    Some(
        Diagnostic::error(format!(
            "{} '{}' cannot be declared directly inside a {}",
            child.node_kind(),
            child.name,
            parent
        ))
        .with_origin(DiagnosticOrigin {
            file: file.to_path_buf(),
            start: child.start,
            end: child.end,
        }),
    )
}

fn allowed(parent: NodeKind, child: NodeKind) -> bool {
    match parent {
        NodeKind::Group => child != NodeKind::Assertion,
        NodeKind::Case | NodeKind::Assertion => child == NodeKind::Assertion,
    }
}
