//! Worker lifecycle state machine.
//!
//! ```text
//! STOPPED --begin_start--> STARTING --Spawned--> READY
//!    ^                         |                   |
//!    +-------- Error / Exited -+-------------------+
//! ```
//!
//! [`BridgeCore`] reacts to discrete [`WorkerEvent`]s, so it can be driven by
//! a real process or by a synthetic event sequence. Every spawn gets a new
//! generation; events carrying an older generation are ignored.

use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::protocol::parse_response;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    Stopped,
    Starting,
    Ready,
}

/// Something that happened to a worker process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    Spawned { generation: u64 },
    Line { generation: u64, line: String },
    Error { generation: u64, message: String },
    Exited { generation: u64, code: Option<i32> },
}

impl WorkerEvent {
    fn generation(&self) -> u64 {
        match self {
            Self::Spawned { generation }
            | Self::Line { generation, .. }
            | Self::Error { generation, .. }
            | Self::Exited { generation, .. } => *generation,
        }
    }
}

pub(crate) enum WriterCommand {
    Send(String),
    Shutdown,
}

/// Background tasks of one worker. Aborted on drop.
#[derive(Default)]
pub(crate) struct WorkerTasks {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerTasks {
    pub fn new(handles: Vec<JoinHandle<()>>) -> Self {
        Self { handles }
    }
}

impl Drop for WorkerTasks {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

type Responder = oneshot::Sender<Option<Value>>;

/// Worker state plus the pending-request map.
///
/// Each pending id is resolved exactly once: by its response, by
/// [`BridgeCore::cancel`] (timeout), or with `None` when the worker stops.
pub struct BridgeCore {
    status: WorkerStatus,
    generation: u64,
    writer: Option<mpsc::Sender<WriterCommand>>,
    pending: HashMap<u64, Responder>,
    next_id: u64,
    tasks: Option<WorkerTasks>,
}

impl Default for BridgeCore {
    fn default() -> Self {
        Self::new()
    }
}

impl BridgeCore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            status: WorkerStatus::Stopped,
            generation: 0,
            writer: None,
            pending: HashMap::new(),
            next_id: 1,
            tasks: None,
        }
    }

    #[must_use]
    pub fn status(&self) -> WorkerStatus {
        self.status
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn writer(&self) -> Option<&mpsc::Sender<WriterCommand>> {
        self.writer.as_ref()
    }

    /// Enter STARTING with a fresh generation.
    pub fn begin_start(&mut self) -> u64 {
        self.generation += 1;
        self.status = WorkerStatus::Starting;
        self.generation
    }

    pub(crate) fn attach(
        &mut self,
        generation: u64,
        writer: mpsc::Sender<WriterCommand>,
        tasks: WorkerTasks,
    ) {
        if generation != self.generation {
            return;
        }
        self.writer = Some(writer);
        self.tasks = Some(tasks);
    }

    /// Allocate an id and its pending entry.
    pub fn register(&mut self) -> (u64, oneshot::Receiver<Option<Value>>) {
        let id = self.next_id;
        self.next_id += 1;
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        (id, rx)
    }

    /// Drop the pending entry for `id`. Returns whether it was still pending.
    pub fn cancel(&mut self, id: u64) -> bool {
        self.pending.remove(&id).is_some()
    }

    pub fn handle_event(&mut self, event: WorkerEvent) {
        if event.generation() != self.generation {
            debug!(
                event_generation = event.generation(),
                generation = self.generation,
                "Ignoring event from previous bridge worker"
            );
            return;
        }

        match event {
            WorkerEvent::Spawned { generation } => {
                if self.status == WorkerStatus::Starting {
                    self.status = WorkerStatus::Ready;
                    info!(generation, "Bridge worker ready");
                }
            }
            WorkerEvent::Line { line, .. } => self.dispatch_line(&line),
            WorkerEvent::Error {
                generation,
                message,
            } => {
                warn!(generation, "Bridge worker failed: {message}");
                self.stop();
            }
            WorkerEvent::Exited { generation, code } => {
                info!(generation, ?code, "Bridge worker exited");
                self.stop();
            }
        }
    }

    fn dispatch_line(&mut self, line: &str) {
        if line.trim().is_empty() {
            return;
        }
        let response = match parse_response(line) {
            Ok(response) => response,
            Err(e) => {
                warn!("Dropping bridge line: {e}");
                return;
            }
        };

        let Some(responder) = self.pending.remove(&response.id) else {
            debug!(id = response.id, "Dropping response for unknown or expired request");
            return;
        };
        let result = if response.ok {
            Some(response.result.unwrap_or(Value::Null))
        } else {
            debug!(id = response.id, error = ?response.error, "Bridge request failed");
            None
        };
        let _ = responder.send(result);
    }

    /// Enter STOPPED: release the worker and resolve every pending request
    /// with `None`.
    pub fn stop(&mut self) {
        self.status = WorkerStatus::Stopped;
        if let Some(writer) = self.writer.take() {
            let _ = writer.try_send(WriterCommand::Shutdown);
        }
        self.tasks = None;

        if !self.pending.is_empty() {
            debug!(count = self.pending.len(), "Failing pending bridge requests");
        }
        for (_, responder) in self.pending.drain() {
            let _ = responder.send(None);
        }
    }
}
