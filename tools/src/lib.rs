//! External tool invocation for lintel.
//!
//! - [`process`]: runs a command to completion and captures its output as data
//! - [`command`]: builds analyze and version-probe argument vectors
//! - [`capability`]: decides (and caches) whether editor mode is supported

pub mod capability;
pub mod command;
pub mod process;

pub use capability::{CapabilityNegotiator, ToolVersion, classify_version, parse_version};
pub use command::{
    ANALYZE_SUBCOMMAND, ARGUMENT_SEPARATOR, AnalyzeOptions, EditorModeArgs, ErrorFormat,
    build_analyze_command, build_version_command,
};
pub use process::{
    CommandSpec, LAUNCH_FAILURE_EXIT_CODE, ProcessOutput, ProcessRunner, TERMINATED_EXIT_CODE,
    TokioProcessRunner,
};
