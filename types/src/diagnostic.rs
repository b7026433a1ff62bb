//! Diagnostic value types produced by the analysis pipeline.

use std::path::Path;

/// End character used for diagnostics that cover a whole line.
///
/// Clients clamp characters past the end of a line back to the line length.
/// This is the largest value an LSP `uinteger` may hold.
pub const LINE_END: u32 = 2_147_483_647;

/// Convert a 1-based line number reported by the analysis tool to a 0-based line.
///
/// Values below 1 (including missing lines reported as 0) map to line 0.
#[must_use]
pub fn zero_based_line(one_based: i64) -> u32 {
    let line = one_based.saturating_sub(1).max(0);
    u32::try_from(line).unwrap_or(u32::MAX)
}

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DiagnosticSeverity {
    Error = 1,
    Warning = 2,
    Information = 3,
    Hint = 4,
}

impl DiagnosticSeverity {
    /// Convert from LSP numeric severity (1=Error, 2=Warning, 3=Info, 4=Hint).
    #[must_use]
    pub fn from_lsp(value: u64) -> Option<Self> {
        match value {
            1 => Some(Self::Error),
            2 => Some(Self::Warning),
            3 => Some(Self::Information),
            4 => Some(Self::Hint),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_error(self) -> bool {
        self == Self::Error
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Information => "info",
            Self::Hint => "hint",
        }
    }
}

/// Zero-based range covered by a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiagnosticRange {
    pub start_line: u32,
    pub start_char: u32,
    pub end_line: u32,
    pub end_char: u32,
}

impl DiagnosticRange {
    /// Range anchored at the very start of the document.
    #[must_use]
    pub fn zero() -> Self {
        Self::default()
    }

    /// Range covering the whole of a 0-based line.
    #[must_use]
    pub fn whole_line(line: u32) -> Self {
        Self {
            start_line: line,
            start_char: 0,
            end_line: line,
            end_char: LINE_END,
        }
    }
}

/// A single diagnostic ready to be published for a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    severity: DiagnosticSeverity,
    range: DiagnosticRange,
    message: String,
    source: String,
}

impl Diagnostic {
    #[must_use]
    pub fn new(
        severity: DiagnosticSeverity,
        range: DiagnosticRange,
        message: String,
        source: String,
    ) -> Self {
        Self {
            severity,
            range,
            message,
            source,
        }
    }

    #[must_use]
    pub fn severity(&self) -> DiagnosticSeverity {
        self.severity
    }

    #[must_use]
    pub fn range(&self) -> DiagnosticRange {
        self.range
    }

    /// 0-indexed start line.
    #[must_use]
    pub fn line(&self) -> u32 {
        self.range.start_line
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Tool that produced the diagnostic (e.g. "phpstan").
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Format as `path:line:col: severity: [source] message` (1-indexed for display).
    ///
    /// Multi-line messages are flattened onto one line with ` | ` separators.
    #[must_use]
    pub fn display_with_path(&self, path: &Path) -> String {
        let message = self
            .message
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join(" | ");
        format!(
            "{}:{}:{}: {}: [{}] {}",
            path.display(),
            self.range.start_line.saturating_add(1),
            self.range.start_char.saturating_add(1),
            self.severity.label(),
            self.source,
            message,
        )
    }
}
