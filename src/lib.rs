//! Bounded, batching telemetry pipeline.
//!
//! Producers hand [`Record`]s to a [`RecordSink`]; a background drain loop
//! owned by the [`BatchProcessor`] groups them into [`Batch`]es under size
//! and delay triggers and ships each batch through a pluggable [`Exporter`],
//! retrying transient failures with exponential backoff. Memory is bounded
//! by a fixed-capacity queue with a configurable overflow policy, and
//! shutdown drains outstanding work under a hard deadline.

mod batcher;
mod config;
mod counters;
mod exporter;
mod layer;
mod processor;
mod queue;
mod record;

#[cfg(test)]
mod testing;

pub use config::{Config, ConfigError, OverflowPolicy};
pub use counters::{CounterSnapshot, PipelineCounters};
pub use exporter::{BoxError, ConsoleExporter, ExportError, Exporter, RetryPolicy};
pub use layer::TelemetryLayer;
pub use processor::{BatchProcessor, FlushError, RecordSink, StartError, StopSummary};
pub use queue::EnqueueError;
pub use record::{Batch, Record, Severity, Value};
