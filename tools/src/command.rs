//! Argument vectors for the analysis tool.
//!
//! An analyze command has a fixed shape:
//!
//! ```text
//! <program> <leading args> analyse --error-format=json --no-progress --no-interaction
//!     [--configuration <path>] [extra args] [--tmp-file <snapshot> --instead-of <original>]
//!     -- <targets...>
//! ```
//!
//! The `--` separator is a hard contract. Everything user-configurable is
//! injected before it, and the positional targets after it are never
//! reordered, filtered, or interpreted as flags.

use std::path::{Path, PathBuf};

use lintel_types::ResolvedRuntime;

use crate::process::CommandSpec;

/// Subcommand that runs an analysis.
pub const ANALYZE_SUBCOMMAND: &str = "analyse";

/// Spellings of the analyze subcommand accepted by the tool.
const ANALYZE_SUBCOMMAND_ALIASES: &[&str] = &["analyse", "analyze"];

/// Separates options from positional targets.
pub const ARGUMENT_SEPARATOR: &str = "--";

const NO_PROGRESS_FLAG: &str = "--no-progress";
const NO_INTERACTION_FLAG: &str = "--no-interaction";
const CONFIGURATION_FLAG: &str = "--configuration";
const TMP_FILE_FLAG: &str = "--tmp-file";
const INSTEAD_OF_FLAG: &str = "--instead-of";
const VERSION_FLAG: &str = "--version";

/// Structured output format requested from the tool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ErrorFormat {
    #[default]
    Json,
    PrettyJson,
}

impl ErrorFormat {
    #[must_use]
    pub fn as_flag(self) -> &'static str {
        match self {
            Self::Json => "--error-format=json",
            Self::PrettyJson => "--error-format=prettyJson",
        }
    }
}

/// In-place substitution of one file's content ("editor mode").
#[derive(Debug, Clone, Copy)]
pub struct EditorModeArgs<'a> {
    /// Snapshot holding the unsaved buffer.
    pub tmp_file: &'a Path,
    /// File whose content the snapshot replaces. Reported paths keep this name.
    pub instead_of: &'a Path,
}

/// Everything besides runtime and targets that shapes an analyze command.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnalyzeOptions<'a> {
    pub config_path: Option<&'a Path>,
    pub format: ErrorFormat,
    pub extra_args: &'a [String],
    pub editor_mode: Option<EditorModeArgs<'a>>,
}

fn is_analyze_subcommand(arg: &str) -> bool {
    ANALYZE_SUBCOMMAND_ALIASES.contains(&arg)
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Build the analyze command for `targets`.
///
/// If the resolved invocation already carries the analyze subcommand (e.g. a
/// user override of `["phpstan", "analyse"]`) it is not added a second time.
#[must_use]
pub fn build_analyze_command(
    runtime: &ResolvedRuntime,
    targets: &[PathBuf],
    options: &AnalyzeOptions<'_>,
) -> CommandSpec {
    let invocation = &runtime.invocation;
    let mut args = invocation.leading_args.clone();

    let has_subcommand = invocation
        .leading_args
        .iter()
        .any(|arg| is_analyze_subcommand(arg));
    if !has_subcommand {
        args.push(ANALYZE_SUBCOMMAND.to_string());
    }

    args.push(options.format.as_flag().to_string());
    args.push(NO_PROGRESS_FLAG.to_string());
    args.push(NO_INTERACTION_FLAG.to_string());

    if let Some(config_path) = options.config_path {
        args.push(CONFIGURATION_FLAG.to_string());
        args.push(path_arg(config_path));
    }

    for extra in options.extra_args {
        if extra == ARGUMENT_SEPARATOR {
            tracing::warn!("Ignoring `--` in extra arguments; targets are appended by lintel");
            continue;
        }
        args.push(extra.clone());
    }

    if let Some(editor_mode) = options.editor_mode {
        args.push(TMP_FILE_FLAG.to_string());
        args.push(path_arg(editor_mode.tmp_file));
        args.push(INSTEAD_OF_FLAG.to_string());
        args.push(path_arg(editor_mode.instead_of));
    }

    args.push(ARGUMENT_SEPARATOR.to_string());
    args.extend(targets.iter().map(|target| path_arg(target)));

    CommandSpec {
        program: invocation.program.clone(),
        args,
        cwd: runtime.working_directory.clone(),
    }
}

/// Build the `--version` probe for the same binary.
///
/// Any analyze subcommand carried by the invocation is dropped.
#[must_use]
pub fn build_version_command(runtime: &ResolvedRuntime) -> CommandSpec {
    let invocation = &runtime.invocation;
    let mut args: Vec<String> = invocation
        .leading_args
        .iter()
        .filter(|arg| !is_analyze_subcommand(arg))
        .cloned()
        .collect();
    args.push(VERSION_FLAG.to_string());

    CommandSpec {
        program: invocation.program.clone(),
        args,
        cwd: runtime.working_directory.clone(),
    }
}
