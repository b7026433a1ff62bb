//! One analysis run: the SNAPSHOT -> NEGOTIATE -> EXECUTE -> PARSE state machine.
//!
//! A run never publishes a result for a superseded version. Staleness is
//! checked after negotiation, after the primary execution and after the
//! saved-file fallback; a stale run ends with [`RunOutcome::Stale`] and its
//! output is discarded. The tool process itself is never terminated early.

use std::future::Future;
use std::path::{Path, PathBuf};

use anyhow::Context;
use lintel_tools::{
    AnalyzeOptions, CapabilityNegotiator, CommandSpec, EditorModeArgs, ErrorFormat,
    ProcessOutput, ProcessRunner, build_analyze_command,
};
use lintel_types::{
    AnalysisTrigger, DEFAULT_SOURCE, Diagnostic, DocumentVersion, EditorModePolicy,
    ResolvedRuntime,
};
use lintel_utils::{BufferSnapshot, write_snapshot, write_snapshot_in};
use tracing::{debug, warn};

use crate::parser::{OutputParser, has_structured_report, has_syntax_error_signal};
use crate::paths::file_uri_to_path;
use crate::resolver::RuntimeResolver;
use crate::scheduler::VersionLedger;

/// A debounced request to analyze one document version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisTask {
    pub uri: String,
    pub version: i32,
    pub text: String,
    pub trigger: AnalysisTrigger,
}

impl AnalysisTask {
    #[must_use]
    pub fn new(document: DocumentVersion, trigger: AnalysisTrigger) -> Self {
        Self {
            uri: document.uri,
            version: document.version,
            text: document.text,
            trigger,
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Diagnostics to publish for the task's version. May be empty.
    Publish(Vec<Diagnostic>),
    /// A newer version was recorded while the run was in flight.
    Stale,
    /// The document is not a file on disk (e.g. an untitled buffer).
    Skipped,
}

/// Produces diagnostics for one task.
///
/// Errors are infrastructure failures (e.g. the snapshot could not be
/// written); tool failures are reported as diagnostics instead.
pub trait Analyzer: Send + 'static {
    fn analyze(
        &mut self,
        task: &AnalysisTask,
        ledger: &VersionLedger,
    ) -> impl Future<Output = anyhow::Result<RunOutcome>> + Send;
}

/// Knobs for every run in a session.
#[derive(Debug, Clone)]
pub struct AnalysisSettings {
    pub config_path: Option<PathBuf>,
    pub extra_args: Vec<String>,
    pub editor_mode: EditorModePolicy,
    pub format: ErrorFormat,
    /// `source` label on produced diagnostics.
    pub source: String,
    /// Parent directory for buffer snapshots. Defaults to the system temp dir.
    pub snapshot_dir: Option<PathBuf>,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            config_path: None,
            extra_args: Vec::new(),
            editor_mode: EditorModePolicy::Auto,
            format: ErrorFormat::Json,
            source: DEFAULT_SOURCE.to_string(),
            snapshot_dir: None,
        }
    }
}

/// The production [`Analyzer`]: snapshot, negotiate, run the tool, parse.
pub struct PipelineAnalyzer<R, V> {
    runner: R,
    resolver: V,
    negotiator: CapabilityNegotiator,
    parser: OutputParser,
    settings: AnalysisSettings,
}

impl<R: ProcessRunner, V: RuntimeResolver> PipelineAnalyzer<R, V> {
    pub fn new(runner: R, resolver: V, settings: AnalysisSettings) -> Self {
        Self {
            runner,
            resolver,
            negotiator: CapabilityNegotiator::new(),
            parser: OutputParser::new(settings.source.clone()),
            settings,
        }
    }

    fn snapshot(&self, original: &Path, text: &str) -> anyhow::Result<BufferSnapshot> {
        let snapshot = match &self.settings.snapshot_dir {
            Some(parent) => write_snapshot_in(parent, original, text),
            None => write_snapshot(original, text),
        };
        snapshot.with_context(|| format!("snapshotting buffer for {}", original.display()))
    }

    async fn editor_mode_enabled(&mut self, runtime: &ResolvedRuntime) -> bool {
        match self.settings.editor_mode {
            EditorModePolicy::Always => true,
            EditorModePolicy::Never => false,
            EditorModePolicy::Auto => {
                self.negotiator
                    .supports_editor_mode(&self.runner, runtime)
                    .await
            }
        }
    }

    fn command(
        &self,
        runtime: &ResolvedRuntime,
        target: PathBuf,
        editor_mode: Option<EditorModeArgs<'_>>,
    ) -> CommandSpec {
        let options = AnalyzeOptions {
            config_path: self.settings.config_path.as_deref(),
            format: self.settings.format,
            extra_args: &self.settings.extra_args,
            editor_mode,
        };
        build_analyze_command(runtime, &[target], &options)
    }

    /// Per-file diagnostics for `target`, else global errors.
    fn parse_primary(
        &self,
        output: &ProcessOutput,
        original: &Path,
        snapshot: Option<&Path>,
        cwd: &Path,
    ) -> Vec<Diagnostic> {
        let mut diagnostics =
            self.parser
                .extract_diagnostics_for_file(&output.stdout, original, cwd);
        if diagnostics.is_empty()
            && let Some(snapshot) = snapshot
        {
            diagnostics = self
                .parser
                .extract_diagnostics_for_file(&output.stdout, snapshot, cwd);
        }
        if diagnostics.is_empty() {
            diagnostics = self.parser.extract_global_errors(&output.stdout);
        }
        diagnostics
    }

    async fn execute(
        &mut self,
        task: &AnalysisTask,
        ledger: &VersionLedger,
        original: &Path,
        snapshot: &BufferSnapshot,
    ) -> RunOutcome {
        let runtime = self.resolver.resolve(original);
        let editor_mode = self.editor_mode_enabled(&runtime).await;
        if !ledger.is_current(&task.uri, task.version) {
            debug!(uri = %task.uri, version = task.version, "Superseded before execution");
            return RunOutcome::Stale;
        }

        let spec = if editor_mode {
            self.command(
                &runtime,
                original.to_path_buf(),
                Some(EditorModeArgs {
                    tmp_file: snapshot.path(),
                    instead_of: original,
                }),
            )
        } else {
            self.command(&runtime, snapshot.path().to_path_buf(), None)
        };
        debug!(
            uri = %task.uri,
            version = task.version,
            trigger = %task.trigger,
            editor_mode,
            provenance = runtime.provenance.label(),
            command = %spec.display_for_log(),
            "Running analysis"
        );

        let output = self.runner.run(&spec).await;
        if !ledger.is_current(&task.uri, task.version) {
            debug!(uri = %task.uri, version = task.version, "Discarding stale analysis result");
            return RunOutcome::Stale;
        }

        if output.launch_failed() {
            warn!(
                uri = %task.uri,
                command = %spec.display_for_log(),
                "Analysis tool could not be launched"
            );
            return RunOutcome::Publish(vec![
                self.parser
                    .create_execution_failure_diagnostic(output.exit_code, &output.stderr),
            ]);
        }

        let cwd = &runtime.working_directory;
        let snapshot_key = (!editor_mode).then_some(snapshot.path());
        let mut diagnostics = self.parse_primary(&output, original, snapshot_key, cwd);
        let reported = has_structured_report(&output.stdout);

        if diagnostics.is_empty()
            && !reported
            && !output.succeeded()
            && has_syntax_error_signal(&output.stdout, &output.stderr)
            && original.is_file()
        {
            debug!(
                uri = %task.uri,
                exit_code = output.exit_code,
                "Buffer run produced nothing; analyzing saved file"
            );
            let fallback_spec = self.command(&runtime, original.to_path_buf(), None);
            let fallback = self.runner.run(&fallback_spec).await;
            if !ledger.is_current(&task.uri, task.version) {
                debug!(uri = %task.uri, version = task.version, "Discarding stale fallback result");
                return RunOutcome::Stale;
            }
            if !fallback.launch_failed() {
                diagnostics = self.parse_primary(&fallback, original, None, cwd);
            }
        }

        if diagnostics.is_empty() && !reported && !output.succeeded() {
            warn!(
                uri = %task.uri,
                exit_code = output.exit_code,
                "Analysis failed without reporting results"
            );
            diagnostics.push(
                self.parser
                    .create_execution_failure_diagnostic(output.exit_code, &output.stderr),
            );
        }

        RunOutcome::Publish(diagnostics)
    }
}

impl<R, V> Analyzer for PipelineAnalyzer<R, V>
where
    R: ProcessRunner + 'static,
    V: RuntimeResolver + 'static,
{
    async fn analyze(
        &mut self,
        task: &AnalysisTask,
        ledger: &VersionLedger,
    ) -> anyhow::Result<RunOutcome> {
        let Some(original) = file_uri_to_path(&task.uri) else {
            debug!(uri = %task.uri, "Skipping analysis of non-file document");
            return Ok(RunOutcome::Skipped);
        };

        let snapshot = self.snapshot(&original, &task.text)?;
        let outcome = self.execute(task, ledger, &original, &snapshot).await;
        if let Err(e) = snapshot.release() {
            warn!(uri = %task.uri, "Failed to release buffer snapshot: {e}");
        }
        Ok(outcome)
    }
}
