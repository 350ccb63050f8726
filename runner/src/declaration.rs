//! Test declarations produced by a collector.
//!
//! A declaration tree is read-only to the engine. Children own their subtree;
//! the walker threads the parent's resolved mode down instead of keeping a
//! back-reference.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::diagnostic::Diagnostic;

/// Matcher whose assertions expect the checker to report an error. Attached
/// diagnostics are the subject of such assertions, not a reason to skip them.
pub const RAISE_ERROR_MATCHER: &str = "toRaiseError";

/// Independent flags declared in source (e.g. `.only`, `.skip`).
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Flags {
    pub fail: bool,
    pub only: bool,
    pub skip: bool,
    pub todo: bool,
}

/// Closed set of declaration kinds.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DeclarationKind {
    Group,
    Case,
    Assertion(AssertionInfo),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Group,
    Case,
    Assertion,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Group => f.write_str("group"),
            NodeKind::Case => f.write_str("case"),
            NodeKind::Assertion => f.write_str("assertion"),
        }
    }
}

/// Assertion-specific payload.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssertionInfo {
    #[serde(default)]
    pub negated: bool,
    pub matcher: String,
    #[serde(default)]
    pub source: Vec<ArgumentRef>,
    #[serde(default)]
    pub target: Vec<ArgumentRef>,
}

/// Reference to an argument expression in source.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArgumentRef {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestDeclaration {
    #[serde(flatten)]
    pub kind: DeclarationKind,
    pub name: String,
    #[serde(default)]
    pub flags: Flags,
    /// Byte offset where the declaration starts in its file.
    pub start: usize,
    #[serde(default)]
    pub end: usize,
    /// Collection diagnostics whose span falls inside this node.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TestDeclaration>,
}

impl TestDeclaration {
    pub fn node_kind(&self) -> NodeKind {
        match self.kind {
            DeclarationKind::Group => NodeKind::Group,
            DeclarationKind::Case => NodeKind::Case,
            DeclarationKind::Assertion(_) => NodeKind::Assertion,
        }
    }

    pub fn assertion(&self) -> Option<&AssertionInfo> {
        match &self.kind {
            DeclarationKind::Assertion(info) => Some(info),
            _ => None,
        }
    }

    /// Depth-first search for any node with `only` set literally.
    pub fn contains_only(&self) -> bool {
        self.flags.only || self.children.iter().any(TestDeclaration::contains_only)
    }
}

/// Everything a collector produced for one file.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TestTree {
    pub children: Vec<TestDeclaration>,
    /// Diagnostics not attached to any node (e.g. syntax errors).
    pub diagnostics: Vec<Diagnostic>,
    pub deprecations: Vec<Diagnostic>,
}

impl TestTree {
    pub fn contains_only(&self) -> bool {
        self.children.iter().any(TestDeclaration::contains_only)
    }
}
