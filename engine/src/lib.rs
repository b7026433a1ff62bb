//! Incremental-analysis orchestration.
//!
//! Turns high-frequency edit events into ordered, non-overlapping runs of the
//! external analysis tool:
//!
//! ```text
//! schedule() -> debounce -> serialized queue -> AnalysisRun -> publish
//!                                   |
//!                       SNAPSHOT -> NEGOTIATE -> EXECUTE -> PARSE
//!                                   [-> FALLBACK_EXECUTE -> FALLBACK_PARSE]
//! ```
//!
//! Construction is via [`AnalysisScheduler::start`]; one instance per
//! workspace session, never a process-wide singleton.

pub mod parser;
pub mod paths;
pub mod resolver;
pub mod run;
pub mod scheduler;

pub use parser::{OutputParser, has_structured_report, has_syntax_error_signal};
pub use paths::{file_uri_to_path, normalize_path, path_to_file_uri};
pub use resolver::{RuntimeResolver, WorkspaceRuntimeResolver};
pub use run::{AnalysisSettings, AnalysisTask, Analyzer, PipelineAnalyzer, RunOutcome};
pub use scheduler::{AnalysisScheduler, PublishDiagnostics, VersionLedger};
