//! lintel CLI.
//!
//! ```text
//! lintel check <files...>   analyze files once and print diagnostics
//! lintel bridge-ping        start the reflection worker and ping it
//! ```
//!
//! Logs go to stderr; stdout carries command output only.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::{env, fs, io};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use lintel_bridge::{BridgeClient, BridgeSettings};
use lintel_config::LintelConfig;
use lintel_engine::{
    AnalysisSettings, AnalysisTask, Analyzer, PipelineAnalyzer, RunOutcome, VersionLedger,
    WorkspaceRuntimeResolver, normalize_path, path_to_file_uri,
};
use lintel_tools::TokioProcessRunner;
use lintel_types::{AnalysisTrigger, DocumentVersion};

#[derive(Debug, Parser)]
#[command(name = "lintel", version, about = "Incremental PHPStan diagnostics")]
struct Cli {
    /// Workspace root. Defaults to the current directory.
    #[arg(long, global = true)]
    workspace: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Analyze files once and print their diagnostics.
    Check {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Check that the configured reflection worker responds.
    BridgePing,
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(env_filter)
        .init();
}

fn analysis_settings(config: Option<&LintelConfig>) -> AnalysisSettings {
    let mut settings = AnalysisSettings::default();
    if let Some(analysis) = config.and_then(|c| c.analysis.as_ref()) {
        settings.config_path.clone_from(&analysis.config_path);
        settings.extra_args.clone_from(&analysis.extra_args);
        settings.editor_mode = analysis.editor_mode;
        settings.source = analysis.source().to_string();
    }
    settings
}

fn runtime_resolver(workspace: &Path, config: Option<&LintelConfig>) -> WorkspaceRuntimeResolver {
    let resolver = WorkspaceRuntimeResolver::new(workspace);
    match config
        .and_then(|c| c.analysis.as_ref())
        .and_then(|a| a.command.as_deref())
    {
        Some(argv) => resolver.with_command_override(argv),
        None => resolver,
    }
}

/// Returns true when any error-severity diagnostic was printed.
async fn check(
    workspace: &Path,
    config: Option<&LintelConfig>,
    files: &[PathBuf],
) -> Result<bool> {
    let mut analyzer = PipelineAnalyzer::new(
        TokioProcessRunner,
        runtime_resolver(workspace, config),
        analysis_settings(config),
    );
    let ledger = VersionLedger::new();
    let mut found_errors = false;

    for file in files {
        let path = normalize_path(file, workspace);
        let text = fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let Some(uri) = path_to_file_uri(&path) else {
            bail!("{} cannot be expressed as a file URI", path.display());
        };

        ledger.record(&uri, 1);
        let task = AnalysisTask::new(DocumentVersion::new(uri, 1, text), AnalysisTrigger::Save);
        match analyzer.analyze(&task, &ledger).await? {
            RunOutcome::Publish(diagnostics) => {
                for diagnostic in &diagnostics {
                    found_errors |= diagnostic.severity().is_error();
                    println!("{}", diagnostic.display_with_path(file));
                }
            }
            RunOutcome::Stale | RunOutcome::Skipped => {
                tracing::debug!(path = %path.display(), "No diagnostics produced");
            }
        }
    }

    Ok(found_errors)
}

async fn bridge_ping(workspace: &Path, config: Option<&LintelConfig>) -> Result<bool> {
    let Some(bridge) = config.and_then(|c| c.bridge.as_ref()) else {
        bail!("no [bridge] section configured");
    };
    let mut settings = BridgeSettings::new(bridge.command.clone(), workspace);
    settings.request_timeout = bridge.request_timeout();

    let client = BridgeClient::new(settings);
    let ok = client.ping().await;
    client.shutdown().await;
    Ok(ok)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing();

    let cli = Cli::parse();
    let workspace = match cli.workspace {
        Some(path) => path,
        None => env::current_dir().context("resolving current directory")?,
    };
    let config = LintelConfig::load(&workspace)?;

    match cli.command {
        Command::Check { files } => {
            let found_errors = check(&workspace, config.as_ref(), &files).await?;
            Ok(if found_errors {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            })
        }
        Command::BridgePing => {
            if bridge_ping(&workspace, config.as_ref()).await? {
                println!("ok");
                Ok(ExitCode::SUCCESS)
            } else {
                println!("no response");
                Ok(ExitCode::FAILURE)
            }
        }
    }
}
