use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::batcher::Batcher;
use crate::config::{Config, ConfigError};
use crate::counters::{CounterSnapshot, PipelineCounters};
use crate::exporter::{DispatchOutcome, ExportDriver, ExportError, Exporter};
use crate::queue::{BoundedQueue, EnqueueError, EnqueueOutcome};
use crate::record::Record;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StartError {
    #[error("processor is already running")]
    AlreadyStarted,

    #[error("processor has already been stopped")]
    AlreadyStopped,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FlushError {
    #[error("processor is not running")]
    NotRunning,

    #[error("flush did not complete within the timeout")]
    TimedOut,
}

/// Aggregate result of [`BatchProcessor::stop`].
#[derive(Debug, Clone)]
pub struct StopSummary {
    /// Records successfully exported over the processor's lifetime.
    pub exported: u64,
    /// Records dropped on any path (overflow, export failure, deadline).
    pub dropped: u64,
    /// First export failure that cost a batch, if any.
    pub first_error: Option<Arc<ExportError>>,
}

/// Cheap clonable producer handle: accepts records into the queue.
///
/// Handed to every component that needs to emit telemetry; explicit
/// injection, no global singleton. Producers are decoupled from export
/// outcomes: the only errors surfaced here are queue-admission errors.
#[derive(Clone)]
pub struct RecordSink {
    queue: Arc<BoundedQueue>,
    counters: Arc<PipelineCounters>,
}

impl RecordSink {
    /// Enqueue honoring the configured overflow policy; suspends while the
    /// queue is full under the blocking policy.
    pub async fn enqueue(&self, record: Record) -> Result<(), EnqueueError> {
        let outcome = self.queue.enqueue(record).await?;
        self.count(outcome);
        Ok(())
    }

    /// Non-suspending enqueue, usable from synchronous code. Under the
    /// blocking policy a full queue fails immediately with `QueueFull`.
    pub fn try_enqueue(&self, record: Record) -> Result<(), EnqueueError> {
        let outcome = self.queue.try_enqueue(record)?;
        self.count(outcome);
        Ok(())
    }

    pub fn counters(&self) -> CounterSnapshot {
        self.counters.snapshot()
    }

    fn count(&self, outcome: EnqueueOutcome) {
        self.counters.incr_enqueued();
        if outcome == EnqueueOutcome::AcceptedEvictedOldest {
            self.counters.incr_dropped_overflow();
        }
    }
}

struct DrainReport {
    first_error: Option<ExportError>,
}

/// The orchestrator: owns the queue, the background drain loop, and the
/// start/stop lifecycle. States: stopped → running → draining → stopped.
pub struct BatchProcessor<E: Exporter> {
    config: Config,
    queue: Arc<BoundedQueue>,
    counters: Arc<PipelineCounters>,
    cancel: CancellationToken,
    exporter: Option<E>,
    worker: Option<JoinHandle<DrainReport>>,
    flush_tx: Option<mpsc::Sender<oneshot::Sender<()>>>,
    summary: Option<StopSummary>,
}

impl<E: Exporter> BatchProcessor<E> {
    /// Build a processor around `exporter`. The configuration is validated
    /// here; the drain loop does not run until [`start`](Self::start).
    pub fn new(config: Config, exporter: E) -> Result<Self, ConfigError> {
        config.validate()?;
        let queue = Arc::new(BoundedQueue::new(
            config.queue_capacity,
            config.overflow_policy,
        ));
        Ok(Self {
            config,
            queue,
            counters: Arc::new(PipelineCounters::default()),
            cancel: CancellationToken::new(),
            exporter: Some(exporter),
            worker: None,
            flush_tx: None,
            summary: None,
        })
    }

    /// Launch the background drain loop. Errors if the processor is already
    /// running or has been stopped.
    pub fn start(&mut self) -> Result<(), StartError> {
        if self.summary.is_some() {
            return Err(StartError::AlreadyStopped);
        }
        if self.worker.is_some() {
            return Err(StartError::AlreadyStarted);
        }
        let exporter = self.exporter.take().ok_or(StartError::AlreadyStarted)?;

        let (flush_tx, flush_rx) = mpsc::channel(4);
        let drain = DrainLoop {
            queue: Arc::clone(&self.queue),
            batcher: Batcher::new(self.config.max_batch_size, self.config.max_delay),
            driver: ExportDriver::new(
                exporter,
                self.config.retry_policy(),
                self.config.export_timeout,
                Arc::clone(&self.counters),
            ),
            counters: Arc::clone(&self.counters),
            cancel: self.cancel.clone(),
            flush_rx,
            shutdown_deadline: self.config.shutdown_deadline,
            first_error: None,
            scratch: Vec::new(),
        };
        self.flush_tx = Some(flush_tx);
        self.worker = Some(tokio::spawn(drain.run()));
        debug!("batch processor started");
        Ok(())
    }

    /// Producer handle for this processor's queue.
    pub fn handle(&self) -> RecordSink {
        RecordSink {
            queue: Arc::clone(&self.queue),
            counters: Arc::clone(&self.counters),
        }
    }

    /// See [`RecordSink::enqueue`].
    pub async fn enqueue(&self, record: Record) -> Result<(), EnqueueError> {
        self.handle().enqueue(record).await
    }

    /// See [`RecordSink::try_enqueue`].
    pub fn try_enqueue(&self, record: Record) -> Result<(), EnqueueError> {
        self.handle().try_enqueue(record)
    }

    pub fn counters(&self) -> CounterSnapshot {
        self.counters.snapshot()
    }

    /// Flush the current partial batch and everything queued ahead of it,
    /// waiting up to `timeout` for the export to finish.
    pub async fn flush(&self, timeout: Duration) -> Result<(), FlushError> {
        if self.summary.is_some() {
            return Err(FlushError::NotRunning);
        }
        let flush_tx = self.flush_tx.as_ref().ok_or(FlushError::NotRunning)?;

        let (ack_tx, ack_rx) = oneshot::channel();
        flush_tx
            .send(ack_tx)
            .await
            .map_err(|_| FlushError::NotRunning)?;
        match time::timeout(timeout, ack_rx).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(FlushError::NotRunning),
            Err(_) => Err(FlushError::TimedOut),
        }
    }

    /// Stop accepting records, drain outstanding work bounded by the
    /// configured shutdown deadline, and report what happened. Never hangs;
    /// calling it again is a no-op returning the same summary.
    pub async fn stop(&mut self) -> StopSummary {
        if let Some(summary) = &self.summary {
            return summary.clone();
        }
        debug!("stopping batch processor");
        self.queue.close();
        self.cancel.cancel();

        let mut first_error = None;
        if let Some(worker) = self.worker.take() {
            // The drain loop bounds its own drain by the shutdown deadline;
            // the outer timeout is a backstop so stop can never hang on a
            // worker that stopped making progress.
            let backstop = self.config.shutdown_deadline + Duration::from_secs(1);
            let abort = worker.abort_handle();
            match time::timeout(backstop, worker).await {
                Ok(Ok(report)) => first_error = report.first_error.map(Arc::new),
                Ok(Err(join_err)) => error!(error = %join_err, "drain loop task failed"),
                Err(_) => {
                    abort.abort();
                    warn!("drain loop overran the shutdown deadline, aborting");
                }
            }
        }

        // Conservation: anything accepted but neither exported nor already
        // counted as dropped was lost with the worker.
        let snapshot = self.counters.snapshot();
        let accounted = snapshot.exported + snapshot.dropped();
        if snapshot.enqueued > accounted {
            self.counters
                .add_dropped_shutdown(snapshot.enqueued - accounted);
        }

        let snapshot = self.counters.snapshot();
        let summary = StopSummary {
            exported: snapshot.exported,
            dropped: snapshot.dropped(),
            first_error,
        };
        self.summary = Some(summary.clone());
        summary
    }
}

impl<E: Exporter> Drop for BatchProcessor<E> {
    fn drop(&mut self) {
        // A dropped processor must not leak its background task: cancel so
        // the drain loop runs its bounded shutdown drain and exits.
        self.cancel.cancel();
    }
}

struct DrainLoop<E: Exporter> {
    queue: Arc<BoundedQueue>,
    batcher: Batcher,
    driver: ExportDriver<E>,
    counters: Arc<PipelineCounters>,
    cancel: CancellationToken,
    flush_rx: mpsc::Receiver<oneshot::Sender<()>>,
    shutdown_deadline: Duration,
    first_error: Option<ExportError>,
    scratch: Vec<Record>,
}

impl<E: Exporter> DrainLoop<E> {
    async fn run(mut self) -> DrainReport {
        debug!("drain loop started");
        loop {
            self.ingest().await;
            if self.batcher.should_flush() {
                // Delay trigger passed while an export was in flight.
                self.export_pending(None).await;
            }
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = self.queue.items_available() => {}
                _ = Self::sleep_until(self.batcher.deadline()) => {
                    self.export_pending(None).await;
                }
                Some(ack) = self.flush_rx.recv() => {
                    self.ingest().await;
                    self.export_pending(None).await;
                    let _ = ack.send(());
                }
            }
        }
        self.drain_remaining().await
    }

    /// Move queued records into the batcher, exporting every time the size
    /// trigger fires.
    async fn ingest(&mut self) {
        loop {
            let room = self.batcher.remaining_capacity();
            let moved = self.queue.dequeue_up_to(room, &mut self.scratch);
            for record in self.scratch.drain(..) {
                self.batcher.add(record);
            }
            if self.batcher.is_full() {
                self.export_pending(None).await;
            }
            if moved == 0 {
                return;
            }
        }
    }

    async fn export_pending(&mut self, deadline: Option<Instant>) {
        if let Some(batch) = self.batcher.take_batch() {
            match self.driver.dispatch(batch, deadline).await {
                DispatchOutcome::Exported | DispatchOutcome::DeadlineExceeded => {}
                DispatchOutcome::Dropped(error) => {
                    if self.first_error.is_none() {
                        self.first_error = Some(error);
                    }
                }
            }
        }
    }

    /// Shutdown drain: flush everything queued and pending, bounded by the
    /// shutdown deadline. Whatever misses the deadline is dropped and
    /// counted, never awaited past it.
    async fn drain_remaining(mut self) -> DrainReport {
        let deadline = Instant::now() + self.shutdown_deadline;
        debug!(
            queued = self.queue.len(),
            pending = self.batcher.len(),
            "draining before shutdown"
        );

        loop {
            if Instant::now() >= deadline {
                self.abandon_remaining();
                break;
            }
            let room = self.batcher.remaining_capacity();
            self.queue.dequeue_up_to(room, &mut self.scratch);
            for record in self.scratch.drain(..) {
                self.batcher.add(record);
            }
            if !self.batcher.has_pending() {
                break;
            }
            self.export_pending(Some(deadline)).await;
        }

        debug!("drain loop exited");
        DrainReport {
            first_error: self.first_error,
        }
    }

    fn abandon_remaining(&mut self) {
        let mut lost = self.batcher.take_batch().map_or(0, |b| b.len() as u64);
        lost += self.queue.dequeue_up_to(usize::MAX, &mut self.scratch) as u64;
        self.scratch.clear();
        if lost > 0 {
            self.counters.add_dropped_shutdown(lost);
            warn!(lost, "shutdown deadline reached with records unexported");
        }
    }

    async fn sleep_until(deadline: Option<Instant>) {
        match deadline {
            Some(deadline) => time::sleep_until(deadline).await,
            // No partial batch pending: nothing to wake for.
            None => std::future::pending().await,
        }
    }
}
