//! Debounced, serialized analysis scheduling.
//!
//! Every `schedule()` records the document version and restarts that
//! document's debounce timer. When a timer fires its task goes onto a single
//! bounded queue drained by one consumer, so at most one analysis runs at a
//! time. The consumer checks the [`VersionLedger`] before running a task and
//! again before publishing; a superseded result is never published.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::FutureExt;
use lintel_types::{AnalysisTrigger, Diagnostic, DocumentVersion};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::run::{AnalysisTask, Analyzer, RunOutcome};

/// Delay between the last edit and the analysis it triggers.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(400);

/// Debounced tasks waiting for the consumer.
const QUEUE_CAPACITY: usize = 256;

/// Latest recorded version per document URI.
///
/// Cheap to clone; clones share state.
#[derive(Debug, Clone, Default)]
pub struct VersionLedger {
    versions: Arc<Mutex<HashMap<String, i32>>>,
}

impl VersionLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, i32>> {
        self.versions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record(&self, uri: &str, version: i32) {
        self.lock().insert(uri.to_string(), version);
    }

    #[must_use]
    pub fn latest(&self, uri: &str) -> Option<i32> {
        self.lock().get(uri).copied()
    }

    /// True if `version` is still the latest recorded version for `uri`.
    #[must_use]
    pub fn is_current(&self, uri: &str, version: i32) -> bool {
        self.latest(uri) == Some(version)
    }

    pub fn forget(&self, uri: &str) {
        self.lock().remove(uri);
    }
}

/// Diagnostics to hand to the editor for one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishDiagnostics {
    pub uri: String,
    /// `None` when clearing a closed document.
    pub version: Option<i32>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Per-session scheduler. Create with [`AnalysisScheduler::start`].
pub struct AnalysisScheduler {
    ledger: VersionLedger,
    timers: HashMap<String, JoinHandle<()>>,
    queue_tx: mpsc::Sender<AnalysisTask>,
    publish_tx: mpsc::Sender<PublishDiagnostics>,
    debounce: Duration,
    consumer: JoinHandle<()>,
}

impl AnalysisScheduler {
    /// Spawn the queue consumer. Results are sent to `publish_tx`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<A: Analyzer>(
        analyzer: A,
        debounce: Duration,
        publish_tx: mpsc::Sender<PublishDiagnostics>,
    ) -> Self {
        let ledger = VersionLedger::new();
        let (queue_tx, queue_rx) = mpsc::channel(QUEUE_CAPACITY);
        let consumer = tokio::spawn(drain_queue(
            analyzer,
            queue_rx,
            ledger.clone(),
            publish_tx.clone(),
        ));
        info!(debounce_ms = debounce.as_millis() as u64, "Analysis scheduler started");

        Self {
            ledger,
            timers: HashMap::new(),
            queue_tx,
            publish_tx,
            debounce,
            consumer,
        }
    }

    #[must_use]
    pub fn ledger(&self) -> &VersionLedger {
        &self.ledger
    }

    /// Record `document` as the latest version and (re)start its debounce timer.
    pub fn schedule(&mut self, document: DocumentVersion, trigger: AnalysisTrigger) {
        self.timers.retain(|_, timer| !timer.is_finished());
        self.ledger.record(&document.uri, document.version);
        if let Some(previous) = self.timers.remove(&document.uri) {
            previous.abort();
        }

        debug!(
            uri = %document.uri,
            version = document.version,
            %trigger,
            "Scheduling analysis"
        );

        let uri = document.uri.clone();
        let task = AnalysisTask::new(document, trigger);
        let queue_tx = self.queue_tx.clone();
        let debounce = self.debounce;
        let timer = tokio::spawn(async move {
            sleep(debounce).await;
            if queue_tx.send(task).await.is_err() {
                debug!("Analysis queue closed; dropping task");
            }
        });
        self.timers.insert(uri, timer);
    }

    /// Forget `uri` and publish an empty diagnostic set for it.
    ///
    /// Used when a document closes. Queued or in-flight runs for `uri` are
    /// discarded by the staleness checks.
    pub async fn clear(&mut self, uri: &str) {
        if let Some(timer) = self.timers.remove(uri) {
            timer.abort();
        }
        self.ledger.forget(uri);

        let cleared = PublishDiagnostics {
            uri: uri.to_string(),
            version: None,
            diagnostics: Vec::new(),
        };
        if self.publish_tx.send(cleared).await.is_err() {
            debug!(uri, "Publish channel closed while clearing diagnostics");
        }
    }

    /// Abort pending timers and the queue consumer.
    pub fn shutdown(&mut self) {
        for (_, timer) in self.timers.drain() {
            timer.abort();
        }
        if !self.consumer.is_finished() {
            self.consumer.abort();
            info!("Analysis scheduler stopped");
        }
    }
}

impl Drop for AnalysisScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn panic_payload_to_string(payload: &Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

async fn drain_queue<A: Analyzer>(
    mut analyzer: A,
    mut queue_rx: mpsc::Receiver<AnalysisTask>,
    ledger: VersionLedger,
    publish_tx: mpsc::Sender<PublishDiagnostics>,
) {
    while let Some(task) = queue_rx.recv().await {
        if !ledger.is_current(&task.uri, task.version) {
            debug!(uri = %task.uri, version = task.version, "Skipping superseded analysis");
            continue;
        }

        let run = AssertUnwindSafe(analyzer.analyze(&task, &ledger))
            .catch_unwind()
            .await;

        match run {
            Ok(Ok(RunOutcome::Publish(diagnostics))) => {
                if !ledger.is_current(&task.uri, task.version) {
                    debug!(uri = %task.uri, version = task.version, "Dropping stale diagnostics");
                    continue;
                }
                debug!(
                    uri = %task.uri,
                    version = task.version,
                    count = diagnostics.len(),
                    "Publishing diagnostics"
                );
                let publish = PublishDiagnostics {
                    uri: task.uri,
                    version: Some(task.version),
                    diagnostics,
                };
                if publish_tx.send(publish).await.is_err() {
                    info!("Publish channel closed; stopping analysis queue");
                    break;
                }
            }
            Ok(Ok(RunOutcome::Stale)) => {
                debug!(uri = %task.uri, version = task.version, "Analysis superseded mid-run");
            }
            Ok(Ok(RunOutcome::Skipped)) => {}
            Ok(Err(e)) => {
                warn!(uri = %task.uri, version = task.version, "Analysis task failed: {e:#}");
            }
            Err(payload) => {
                warn!(
                    uri = %task.uri,
                    version = task.version,
                    "Analysis task panicked: {}",
                    panic_payload_to_string(&payload)
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use lintel_types::{DiagnosticRange, DiagnosticSeverity};
    use tokio::sync::Notify;

    const DEBOUNCE: Duration = Duration::from_millis(400);

    type Seen = Arc<Mutex<Vec<(String, i32)>>>;

    fn diagnostic(text: &str) -> Diagnostic {
        Diagnostic::new(
            DiagnosticSeverity::Error,
            DiagnosticRange::whole_line(0),
            text.to_string(),
            "phpstan".to_string(),
        )
    }

    /// Publishes one diagnostic naming the analyzed version, except for the
    /// special URIs `fail` and `panic`.
    struct RecordingAnalyzer {
        seen: Seen,
    }

    impl Analyzer for RecordingAnalyzer {
        async fn analyze(
            &mut self,
            task: &AnalysisTask,
            _ledger: &VersionLedger,
        ) -> anyhow::Result<RunOutcome> {
            self.seen
                .lock()
                .unwrap()
                .push((task.uri.clone(), task.version));
            match task.uri.as_str() {
                "file:///fail.php" => anyhow::bail!("snapshot directory missing"),
                "file:///panic.php" => panic!("analyzer bug"),
                _ => Ok(RunOutcome::Publish(vec![diagnostic(&format!(
                    "v{}",
                    task.version
                ))])),
            }
        }
    }

    /// Blocks the run of version 1 until released.
    struct GatedAnalyzer {
        started: Arc<Notify>,
        release: Arc<Notify>,
    }

    impl Analyzer for GatedAnalyzer {
        async fn analyze(
            &mut self,
            task: &AnalysisTask,
            _ledger: &VersionLedger,
        ) -> anyhow::Result<RunOutcome> {
            if task.version == 1 {
                self.started.notify_one();
                self.release.notified().await;
            }
            Ok(RunOutcome::Publish(vec![diagnostic(&format!(
                "v{}",
                task.version
            ))]))
        }
    }

    fn recording() -> (
        AnalysisScheduler,
        mpsc::Receiver<PublishDiagnostics>,
        Seen,
    ) {
        let seen = Seen::default();
        let (publish_tx, publish_rx) = mpsc::channel(16);
        let scheduler = AnalysisScheduler::start(
            RecordingAnalyzer { seen: seen.clone() },
            DEBOUNCE,
            publish_tx,
        );
        (scheduler, publish_rx, seen)
    }

    fn doc(uri: &str, version: i32) -> DocumentVersion {
        DocumentVersion::new(uri, version, "<?php")
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_edits_coalesce_into_one_run() {
        let (mut scheduler, mut publish_rx, seen) = recording();
        let uri = "file:///a.php";

        scheduler.schedule(doc(uri, 1), AnalysisTrigger::Open);
        sleep(Duration::from_millis(100)).await;
        scheduler.schedule(doc(uri, 2), AnalysisTrigger::Change);
        sleep(Duration::from_millis(100)).await;
        scheduler.schedule(doc(uri, 3), AnalysisTrigger::Change);

        let published = publish_rx.recv().await.unwrap();
        assert_eq!(published.uri, uri);
        assert_eq!(published.version, Some(3));
        assert_eq!(published.diagnostics[0].message(), "v3");
        assert_eq!(*seen.lock().unwrap(), vec![(uri.to_string(), 3)]);
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_runs_before_debounce_elapses() {
        let (mut scheduler, mut publish_rx, seen) = recording();
        scheduler.schedule(doc("file:///a.php", 1), AnalysisTrigger::Save);

        sleep(DEBOUNCE - Duration::from_millis(1)).await;
        assert!(publish_rx.try_recv().is_err());
        assert!(seen.lock().unwrap().is_empty());

        let published = publish_rx.recv().await.unwrap();
        assert_eq!(published.version, Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn result_of_superseded_run_is_never_published() {
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let (publish_tx, mut publish_rx) = mpsc::channel(16);
        let mut scheduler = AnalysisScheduler::start(
            GatedAnalyzer {
                started: started.clone(),
                release: release.clone(),
            },
            DEBOUNCE,
            publish_tx,
        );
        let uri = "file:///a.php";

        scheduler.schedule(doc(uri, 1), AnalysisTrigger::Change);
        started.notified().await;
        scheduler.schedule(doc(uri, 2), AnalysisTrigger::Change);
        release.notify_one();

        let published = publish_rx.recv().await.unwrap();
        assert_eq!(published.version, Some(2));
        assert_eq!(published.diagnostics[0].message(), "v2");

        sleep(DEBOUNCE * 4).await;
        assert!(publish_rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn clear_cancels_timer_and_publishes_empty_set() {
        let (mut scheduler, mut publish_rx, seen) = recording();
        let uri = "file:///a.php";

        scheduler.schedule(doc(uri, 1), AnalysisTrigger::Open);
        scheduler.clear(uri).await;

        let cleared = publish_rx.recv().await.unwrap();
        assert_eq!(cleared.uri, uri);
        assert_eq!(cleared.version, None);
        assert!(cleared.diagnostics.is_empty());
        assert_eq!(scheduler.ledger().latest(uri), None);

        sleep(DEBOUNCE * 4).await;
        assert!(publish_rx.try_recv().is_err());
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failing_and_panicking_tasks_do_not_stop_the_queue() {
        let (mut scheduler, mut publish_rx, seen) = recording();

        scheduler.schedule(doc("file:///fail.php", 1), AnalysisTrigger::Save);
        scheduler.schedule(doc("file:///panic.php", 1), AnalysisTrigger::Save);
        scheduler.schedule(doc("file:///ok.php", 7), AnalysisTrigger::Save);

        let published = publish_rx.recv().await.unwrap();
        assert_eq!(published.uri, "file:///ok.php");
        assert_eq!(published.version, Some(7));

        sleep(DEBOUNCE * 4).await;
        assert!(publish_rx.try_recv().is_err());

        let mut seen: Vec<String> = seen.lock().unwrap().iter().map(|(u, _)| u.clone()).collect();
        seen.sort();
        assert_eq!(
            seen,
            vec!["file:///fail.php", "file:///ok.php", "file:///panic.php"]
        );

        scheduler.schedule(doc("file:///ok.php", 8), AnalysisTrigger::Change);
        assert_eq!(publish_rx.recv().await.unwrap().version, Some(8));
    }

    #[tokio::test(start_paused = true)]
    async fn documents_are_debounced_independently() {
        let (mut scheduler, mut publish_rx, _seen) = recording();

        scheduler.schedule(doc("file:///a.php", 1), AnalysisTrigger::Open);
        scheduler.schedule(doc("file:///b.php", 1), AnalysisTrigger::Open);

        let mut uris = vec![
            publish_rx.recv().await.unwrap().uri,
            publish_rx.recv().await.unwrap().uri,
        ];
        uris.sort();
        assert_eq!(uris, vec!["file:///a.php", "file:///b.php"]);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_pending_work() {
        let (mut scheduler, mut publish_rx, seen) = recording();

        scheduler.schedule(doc("file:///a.php", 1), AnalysisTrigger::Open);
        scheduler.shutdown();

        sleep(DEBOUNCE * 4).await;
        assert!(publish_rx.try_recv().is_err());
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn ledger_tracks_latest_version() {
        let ledger = VersionLedger::new();
        let shared = ledger.clone();
        assert_eq!(ledger.latest("file:///a.php"), None);
        assert!(!ledger.is_current("file:///a.php", 1));

        ledger.record("file:///a.php", 1);
        shared.record("file:///a.php", 2);
        assert!(!ledger.is_current("file:///a.php", 1));
        assert!(ledger.is_current("file:///a.php", 2));

        shared.forget("file:///a.php");
        assert_eq!(ledger.latest("file:///a.php"), None);
    }
}
