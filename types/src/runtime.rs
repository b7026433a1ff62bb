//! Descriptors for how the external analysis tool is invoked.

use std::path::PathBuf;

use serde::Deserialize;

/// Program plus the arguments that precede every lintel-generated argument.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Invocation {
    pub program: String,
    pub leading_args: Vec<String>,
}

impl Invocation {
    #[must_use]
    pub fn new(program: impl Into<String>, leading_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            leading_args,
        }
    }

    /// Build an invocation from a `[program, args...]` vector.
    ///
    /// Returns `None` for an empty vector.
    #[must_use]
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, rest) = argv.split_first()?;
        if program.trim().is_empty() {
            return None;
        }
        Some(Self::new(program.clone(), rest.to_vec()))
    }

    /// Stable text form used as a cache key component.
    #[must_use]
    pub fn cache_key(&self) -> String {
        let mut key = self.program.clone();
        for arg in &self.leading_args {
            key.push('\u{1f}');
            key.push_str(arg);
        }
        key
    }
}

/// Where a resolved invocation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provenance {
    /// Explicit command override from user configuration.
    UserOverride,
    /// Project-local install under `vendor/bin`.
    ComposerVendor,
    /// Executable found on `PATH`.
    SystemPath,
    /// Nothing was detected; the bare command name is used as-is.
    Fallback,
}

impl Provenance {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::UserOverride => "user-override",
            Self::ComposerVendor => "composer-vendor",
            Self::SystemPath => "system-path",
            Self::Fallback => "fallback",
        }
    }
}

/// Invocation resolved for one file, together with the directory it runs in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRuntime {
    pub invocation: Invocation,
    pub provenance: Provenance,
    pub working_directory: PathBuf,
}

/// Whether analysis substitutes the unsaved buffer in place ("editor mode").
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditorModePolicy {
    /// Probe the tool version and use editor mode when supported.
    #[default]
    Auto,
    Always,
    Never,
}
