//! Diagnostics carried on events.
//!
//! Structural errors, collection diagnostics, evaluation diagnostics and
//! acquisition failures are all plain data. None of them are Rust errors.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticCategory {
    Error,
    Warning,
    Message,
}

/// Source location a diagnostic points at (byte offsets).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticOrigin {
    pub file: PathBuf,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub category: DiagnosticCategory,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<DiagnosticOrigin>,
}

impl Diagnostic {
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            category: DiagnosticCategory::Error,
            text: text.into(),
            origin: None,
        }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self {
            category: DiagnosticCategory::Warning,
            text: text.into(),
            origin: None,
        }
    }

    pub fn message(text: impl Into<String>) -> Self {
        Self {
            category: DiagnosticCategory::Message,
            text: text.into(),
            origin: None,
        }
    }

    pub fn with_origin(mut self, origin: DiagnosticOrigin) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn is_error(&self) -> bool {
        self.category == DiagnosticCategory::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.origin {
            Some(origin) => write!(
                f,
                "{}:{}: {}",
                origin.file.display(),
                origin.start,
                self.text
            ),
            None => f.write_str(&self.text),
        }
    }
}

/// True if any diagnostic in the slice has error severity.
pub fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(Diagnostic::is_error)
}
