use std::collections::HashMap;

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

use crate::processor::RecordSink;
use crate::record::{Record, Severity, Value};

/// `tracing` layer that feeds every event into the batch pipeline as a
/// [`Record`].
///
/// The event's level maps to [`Severity`], the `message` field becomes the
/// record message, remaining fields become attributes, and the current span
/// id (when inside one) is attached for correlation. Installed explicitly by
/// the application alongside its other layers; the pipeline never replaces a
/// global logger.
///
/// Uses the non-suspending enqueue: when the queue is full under the
/// blocking policy the event is dropped rather than stalling the caller's
/// thread inside a log statement.
pub struct TelemetryLayer {
    sink: RecordSink,
    min_severity: Severity,
}

impl TelemetryLayer {
    pub fn new(sink: RecordSink) -> Self {
        Self {
            sink,
            min_severity: Severity::Trace,
        }
    }

    /// Ignore events below `severity`.
    pub fn with_min_severity(mut self, severity: Severity) -> Self {
        self.min_severity = severity;
        self
    }
}

fn severity_of(level: &Level) -> Severity {
    match *level {
        Level::TRACE => Severity::Trace,
        Level::DEBUG => Severity::Debug,
        Level::INFO => Severity::Info,
        Level::WARN => Severity::Warn,
        Level::ERROR => Severity::Error,
    }
}

impl<S> Layer<S> for TelemetryLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let severity = severity_of(event.metadata().level());
        if severity < self.min_severity {
            return;
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let mut record = Record::new(severity, visitor.message.unwrap_or_default());
        record.attributes = visitor.fields;
        record
            .attributes
            .insert("target".to_owned(), event.metadata().target().into());
        if let Some(span) = ctx.lookup_current() {
            record.span_id = Some(span.id().into_u64());
        }

        // Queue-admission failure here means overload or shutdown; a log
        // sink cannot report its own errors anywhere better, so the event
        // is dropped and shows up in the overflow counters.
        let _ = self.sink.try_enqueue(record);
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: HashMap<String, Value>,
}

impl FieldVisitor {
    fn put(&mut self, field: &Field, value: Value) {
        if field.name() == "message" {
            if let Value::Str(s) = value {
                self.message = Some(s);
                return;
            }
        }
        self.fields.insert(field.name().to_owned(), value);
    }
}

impl Visit for FieldVisitor {
    fn record_bool(&mut self, field: &Field, value: bool) {
        self.put(field, Value::Bool(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.put(field, Value::I64(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.put(field, Value::I64(value.try_into().unwrap_or(i64::MAX)));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.put(field, Value::F64(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, Value::Str(value.to_owned()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.put(field, Value::Str(format!("{value:?}")));
    }
}
