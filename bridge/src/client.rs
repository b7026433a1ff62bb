//! Worker process ownership and request correlation.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Weak};
use std::time::Duration;

use lintel_utils::format_command_for_log;
use serde_json::Value;
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex, mpsc};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::codec::{LineReader, LineWriter};
use crate::protocol::{
    CallArgumentHint, Capability, DefinitionLocation, FeatureRequest, FeatureResult, HoverInfo,
    METHOD_ANALYZE, METHOD_PING, RenameEdit, Request,
};
use crate::state::{BridgeCore, WorkerEvent, WorkerStatus, WorkerTasks, WriterCommand};

/// Per-request timeout when none is configured.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

const WRITER_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct BridgeSettings {
    /// `[program, args...]` of the worker.
    pub command: Vec<String>,
    pub working_directory: PathBuf,
    pub request_timeout: Duration,
}

impl BridgeSettings {
    pub fn new(command: Vec<String>, working_directory: impl Into<PathBuf>) -> Self {
        Self {
            command,
            working_directory: working_directory.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Handle to the reflection worker. Clones share one worker.
///
/// The worker starts on the first request and restarts on the first request
/// after it exits. Requests never fail loudly: a timeout, an error response
/// or a worker crash all resolve to `None`.
#[derive(Clone)]
pub struct BridgeClient {
    settings: Arc<BridgeSettings>,
    core: Arc<Mutex<BridgeCore>>,
}

impl BridgeClient {
    #[must_use]
    pub fn new(settings: BridgeSettings) -> Self {
        Self {
            settings: Arc::new(settings),
            core: Arc::new(Mutex::new(BridgeCore::new())),
        }
    }

    pub async fn status(&self) -> WorkerStatus {
        self.core.lock().await.status()
    }

    /// Number of spawns so far.
    pub async fn generation(&self) -> u64 {
        self.core.lock().await.generation()
    }

    pub async fn pending_len(&self) -> usize {
        self.core.lock().await.pending_len()
    }

    /// Send `method` and wait for its result.
    pub async fn send(&self, method: &str, params: Option<Value>) -> Option<Value> {
        let (id, writer, line, rx) = {
            let mut core = self.core.lock().await;
            if core.status() == WorkerStatus::Stopped {
                self.start_worker(&mut core);
            }
            let writer = core.writer()?.clone();
            let (id, rx) = core.register();
            match Request::new(id, method, params).to_line() {
                Ok(line) => (id, writer, line, rx),
                Err(e) => {
                    core.cancel(id);
                    warn!(method, "Failed to serialize bridge request: {e}");
                    return None;
                }
            }
        };

        if writer.send(WriterCommand::Send(line)).await.is_err() {
            self.core.lock().await.cancel(id);
            debug!(id, method, "Bridge writer closed before request was sent");
            return None;
        }

        match timeout(self.settings.request_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => None,
            Err(_) => {
                self.core.lock().await.cancel(id);
                debug!(id, method, "Bridge request timed out");
                None
            }
        }
    }

    /// Health check. True when the worker answered successfully.
    pub async fn ping(&self) -> bool {
        self.send(METHOD_PING, None).await.is_some()
    }

    /// Run one bundled feature query.
    pub async fn query(&self, request: &FeatureRequest) -> Option<FeatureResult> {
        let params = match serde_json::to_value(request) {
            Ok(params) => params,
            Err(e) => {
                warn!("Failed to serialize feature request: {e}");
                return None;
            }
        };
        let result = self.send(METHOD_ANALYZE, Some(params)).await?;
        match serde_json::from_value(result) {
            Ok(result) => Some(result),
            Err(e) => {
                warn!("Dropping malformed feature result: {e}");
                None
            }
        }
    }

    pub async fn hover(&self, file: &Path, text: &str, offset: usize) -> Option<HoverInfo> {
        let request = FeatureRequest::new(file.to_string_lossy(), text, offset)
            .with_capability(Capability::Hover);
        self.query(&request).await?.hover
    }

    pub async fn definition(
        &self,
        file: &Path,
        text: &str,
        offset: usize,
    ) -> Option<Vec<DefinitionLocation>> {
        let request = FeatureRequest::new(file.to_string_lossy(), text, offset)
            .with_capability(Capability::Definition);
        self.query(&request).await?.definition
    }

    /// Parameter hints for every call argument between `start` and `end`.
    pub async fn call_arguments(
        &self,
        file: &Path,
        text: &str,
        start: usize,
        end: usize,
    ) -> Option<Vec<CallArgumentHint>> {
        let request = FeatureRequest::new(file.to_string_lossy(), text, start)
            .with_range(start, end)
            .with_capability(Capability::CallArguments);
        self.query(&request).await?.call_arguments
    }

    pub async fn rename(
        &self,
        file: &Path,
        text: &str,
        offset: usize,
        new_name: &str,
    ) -> Option<Vec<RenameEdit>> {
        let request = FeatureRequest::new(file.to_string_lossy(), text, offset)
            .with_new_name(new_name)
            .with_capability(Capability::Rename);
        self.query(&request).await?.rename
    }

    /// Stop the worker. Pending requests resolve to `None`.
    pub async fn shutdown(&self) {
        let mut core = self.core.lock().await;
        if core.status() != WorkerStatus::Stopped {
            info!(generation = core.generation(), "Stopping bridge worker");
            core.stop();
        }
    }

    /// Spawn a worker and its background tasks. Runs under the core lock.
    fn start_worker(&self, core: &mut BridgeCore) {
        let generation = core.begin_start();
        let Some((program, args)) = self.settings.command.split_first() else {
            core.handle_event(WorkerEvent::Error {
                generation,
                message: "no bridge command configured".to_string(),
            });
            return;
        };

        info!(
            generation,
            command = %format_command_for_log(program, args),
            "Starting bridge worker"
        );

        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(&self.settings.working_directory)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                core.handle_event(WorkerEvent::Error {
                    generation,
                    message: format!("spawning {program}: {e}"),
                });
                return;
            }
        };

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            core.handle_event(WorkerEvent::Error {
                generation,
                message: "worker stdio unavailable".to_string(),
            });
            return;
        };

        let (writer_tx, writer_rx) = mpsc::channel(WRITER_CHANNEL_CAPACITY);
        let writer = tokio::spawn(write_loop(stdin, writer_rx));
        let supervisor = tokio::spawn(supervise(
            child,
            stdout,
            stderr,
            generation,
            Arc::downgrade(&self.core),
        ));
        core.attach(
            generation,
            writer_tx.clone(),
            WorkerTasks::new(vec![writer, supervisor]),
        );
        core.handle_event(WorkerEvent::Spawned { generation });

        self.health_check(core, generation, &writer_tx);
    }

    /// Ping the fresh worker without blocking the caller. Failure is only logged.
    fn health_check(
        &self,
        core: &mut BridgeCore,
        generation: u64,
        writer: &mpsc::Sender<WriterCommand>,
    ) {
        let (id, rx) = core.register();
        let sent = Request::new(id, METHOD_PING, None)
            .to_line()
            .ok()
            .is_some_and(|line| writer.try_send(WriterCommand::Send(line)).is_ok());
        if !sent {
            core.cancel(id);
            warn!(generation, "Could not send bridge health check");
            return;
        }

        let limit = self.settings.request_timeout;
        let weak = Arc::downgrade(&self.core);
        tokio::spawn(async move {
            match timeout(limit, rx).await {
                Ok(Ok(Some(_))) => debug!(generation, "Bridge health check passed"),
                Ok(_) => warn!(generation, "Bridge health check failed"),
                Err(_) => {
                    if let Some(core) = weak.upgrade() {
                        core.lock().await.cancel(id);
                    }
                    warn!(generation, "Bridge health check timed out");
                }
            }
        });
    }
}

async fn write_loop(stdin: ChildStdin, mut rx: mpsc::Receiver<WriterCommand>) {
    let mut writer = LineWriter::new(stdin);
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WriterCommand::Send(line) => {
                if let Err(e) = writer.write_line(&line).await {
                    warn!("Bridge write error: {e}");
                    break;
                }
            }
            WriterCommand::Shutdown => break,
        }
    }
}

/// Pump stdout into the core, forward stderr to the log, and report the exit.
async fn supervise(
    mut child: Child,
    stdout: ChildStdout,
    stderr: ChildStderr,
    generation: u64,
    core: Weak<Mutex<BridgeCore>>,
) {
    let read_responses = async {
        let mut reader = LineReader::new(stdout);
        loop {
            match reader.read_line().await {
                Ok(Some(line)) => {
                    let Some(core) = core.upgrade() else { break };
                    core.lock()
                        .await
                        .handle_event(WorkerEvent::Line { generation, line });
                }
                Ok(None) => break,
                Err(e) if e.is_recoverable() => warn!(generation, "Dropping bridge line: {e}"),
                Err(e) => {
                    warn!(generation, "Bridge read error: {e}");
                    break;
                }
            }
        }
    };

    let forward_stderr = async {
        let mut reader = LineReader::new(stderr);
        loop {
            match reader.read_line().await {
                Ok(Some(line)) => debug!(generation, "bridge stderr: {line}"),
                Ok(None) => break,
                Err(e) if e.is_recoverable() => {}
                Err(_) => break,
            }
        }
    };

    let (status, (), ()) = tokio::join!(child.wait(), read_responses, forward_stderr);
    let event = match status {
        Ok(status) => WorkerEvent::Exited {
            generation,
            code: status.code(),
        },
        Err(e) => WorkerEvent::Error {
            generation,
            message: format!("waiting for worker: {e}"),
        },
    };
    if let Some(core) = core.upgrade() {
        core.lock().await.handle_event(event);
    }
}
