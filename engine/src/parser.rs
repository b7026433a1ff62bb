//! Structured-result parsing for the analysis tool.
//!
//! The tool's JSON output looks like:
//!
//! ```json
//! {
//!   "totals": { "errors": 0, "file_errors": 1 },
//!   "files": {
//!     "src/Foo.php": {
//!       "errors": 1,
//!       "messages": [
//!         { "message": "...", "line": 10, "identifier": "parameter.type", "tip": "..." }
//!       ]
//!     }
//!   },
//!   "errors": ["top-level error not tied to a file"]
//! }
//! ```
//!
//! Nothing here fails: malformed input yields an empty result. `files` may be
//! an empty JSON array when there is nothing to report.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use lintel_tools::LAUNCH_FAILURE_EXIT_CODE;
use lintel_types::{
    DEFAULT_SOURCE, Diagnostic, DiagnosticRange, DiagnosticSeverity, zero_based_line,
};
use regex::Regex;
use serde_json::Value;

use crate::paths::normalize_path;

static SYNTAX_ERROR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(syntax|parse) error\b").expect("syntax error pattern is valid")
});

/// Parse the tool output into a JSON object.
///
/// Falls back to the outermost `{...}` span when the tool prints warnings
/// around the JSON document.
fn parse_report(output: &str) -> Option<Value> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&trimmed[start..=end]) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}

/// Index file entries by normalized path. Keys that normalize to the same
/// path keep every entry, in input order.
fn index_files<'a>(report: &'a Value, cwd: &Path) -> BTreeMap<PathBuf, Vec<&'a Value>> {
    let mut index: BTreeMap<PathBuf, Vec<&Value>> = BTreeMap::new();
    let Some(files) = report.get("files").and_then(Value::as_object) else {
        return index;
    };
    for (path, entry) in files {
        index
            .entry(normalize_path(Path::new(path), cwd))
            .or_default()
            .push(entry);
    }
    index
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn one_based_line(value: Option<&Value>) -> i64 {
    match value {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

/// Whether `stdout` holds a structured report, even one with nothing in it.
///
/// A report means the exit code is not authoritative: its contents are the
/// result.
#[must_use]
pub fn has_structured_report(stdout: &str) -> bool {
    parse_report(stdout).is_some()
}

/// Textual heuristic for parse/syntax errors in a run's output.
///
/// Used to tell whether substituting the unsaved buffer itself caused an
/// empty result.
#[must_use]
pub fn has_syntax_error_signal(stdout: &str, stderr: &str) -> bool {
    SYNTAX_ERROR_PATTERN.is_match(stdout) || SYNTAX_ERROR_PATTERN.is_match(stderr)
}

/// Maps tool output to diagnostics.
#[derive(Debug, Clone)]
pub struct OutputParser {
    source: String,
}

impl Default for OutputParser {
    fn default() -> Self {
        Self::new(DEFAULT_SOURCE)
    }
}

impl OutputParser {
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    fn message_to_diagnostic(&self, message: &Value) -> Option<Diagnostic> {
        let text = non_empty_str(message.get("message"))?;
        let line = zero_based_line(one_based_line(message.get("line")));

        let mut body = text.to_string();
        if let Some(identifier) = non_empty_str(message.get("identifier")) {
            body.push_str("\nidentifier: ");
            body.push_str(identifier);
        }
        if let Some(tip) = non_empty_str(message.get("tip")) {
            body.push_str("\ntip: ");
            body.push_str(tip);
        }

        Some(Diagnostic::new(
            DiagnosticSeverity::Error,
            DiagnosticRange::whole_line(line),
            body,
            self.source.clone(),
        ))
    }

    fn entry_diagnostics(&self, entries: &[&Value]) -> Vec<Diagnostic> {
        entries
            .iter()
            .filter_map(|entry| entry.get("messages").and_then(Value::as_array))
            .flatten()
            .filter_map(|message| self.message_to_diagnostic(message))
            .collect()
    }

    /// Diagnostics reported for `target`.
    ///
    /// Relative paths in the output resolve against `cwd`, so `src/Foo.php`
    /// under `/repo` matches a target of `/repo/src/Foo.php`.
    #[must_use]
    pub fn extract_diagnostics_for_file(
        &self,
        output: &str,
        target: &Path,
        cwd: &Path,
    ) -> Vec<Diagnostic> {
        let Some(report) = parse_report(output) else {
            return Vec::new();
        };
        let index = index_files(&report, cwd);
        index
            .get(&normalize_path(target, cwd))
            .map(|entries| self.entry_diagnostics(entries))
            .unwrap_or_default()
    }

    /// Diagnostics for every reported file, keyed by normalized path.
    ///
    /// Files whose messages are all unusable are omitted.
    #[must_use]
    pub fn extract_diagnostics_by_file(
        &self,
        output: &str,
        cwd: &Path,
    ) -> BTreeMap<PathBuf, Vec<Diagnostic>> {
        let Some(report) = parse_report(output) else {
            return BTreeMap::new();
        };
        index_files(&report, cwd)
            .into_iter()
            .map(|(path, entries)| (path, self.entry_diagnostics(&entries)))
            .filter(|(_, diagnostics)| !diagnostics.is_empty())
            .collect()
    }

    /// Top-level errors not tied to a file, anchored at position zero.
    #[must_use]
    pub fn extract_global_errors(&self, output: &str) -> Vec<Diagnostic> {
        let Some(report) = parse_report(output) else {
            return Vec::new();
        };
        let Some(errors) = report.get("errors").and_then(Value::as_array) else {
            return Vec::new();
        };
        errors
            .iter()
            .filter_map(|error| non_empty_str(Some(error)))
            .map(|text| {
                Diagnostic::new(
                    DiagnosticSeverity::Error,
                    DiagnosticRange::zero(),
                    text.to_string(),
                    self.source.clone(),
                )
            })
            .collect()
    }

    /// Last-resort diagnostic built from the first non-empty stderr line.
    #[must_use]
    pub fn create_execution_failure_diagnostic(&self, exit_code: i32, stderr: &str) -> Diagnostic {
        let first_line = stderr.lines().map(str::trim).find(|line| !line.is_empty());
        let message = match (exit_code == LAUNCH_FAILURE_EXIT_CODE, first_line) {
            (true, Some(line)) => format!("{} could not be started: {line}", self.source),
            (true, None) => format!("{} could not be started", self.source),
            (false, Some(line)) => format!("{} failed (exit code {exit_code}): {line}", self.source),
            (false, None) => format!(
                "{} exited with code {exit_code} without reporting results",
                self.source
            ),
        };
        Diagnostic::new(
            DiagnosticSeverity::Error,
            DiagnosticRange::zero(),
            message,
            self.source.clone(),
        )
    }
}
