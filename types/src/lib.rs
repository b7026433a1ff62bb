//! Core domain types for lintel.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the application.

#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

use std::fmt;

mod diagnostic;
mod runtime;

pub use diagnostic::{Diagnostic, DiagnosticRange, DiagnosticSeverity, LINE_END, zero_based_line};
pub use runtime::{EditorModePolicy, Invocation, Provenance, ResolvedRuntime};

// ============================================================================
// Redaction
// ============================================================================

/// Option names whose values must never appear in logs.
///
/// Compared case-insensitively against the option name with leading dashes
/// removed and underscores folded to dashes.
pub const SENSITIVE_OPTION_NAMES: &[&str] = &[
    "api-key",
    "apikey",
    "access-token",
    "auth",
    "auth-token",
    "client-secret",
    "credentials",
    "passwd",
    "password",
    "private-key",
    "secret",
    "token",
];

/// Replacement for redacted option values.
pub const REDACTION_MASK: &str = "***";

/// Default `source` label on produced diagnostics.
pub const DEFAULT_SOURCE: &str = "phpstan";

// ============================================================================
// Documents
// ============================================================================

/// A versioned view of one editor buffer.
///
/// `version` increases monotonically per `uri` and is the only staleness
/// oracle: a result computed for an older version is never published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentVersion {
    pub uri: String,
    pub version: i32,
    pub text: String,
}

impl DocumentVersion {
    #[must_use]
    pub fn new(uri: impl Into<String>, version: i32, text: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            version,
            text: text.into(),
        }
    }
}

/// Editor event that requested an analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalysisTrigger {
    Open,
    Change,
    Save,
}

impl AnalysisTrigger {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Change => "change",
            Self::Save => "save",
        }
    }
}

impl fmt::Display for AnalysisTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
