use std::collections::HashMap;
use std::time::SystemTime;

use serde::Serialize;

/// Severity of a telemetry record, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// An attribute value attached to a [`Record`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    I64(i64),
    F64(f64),
    Str(String),
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::I64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::F64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

/// One unit of telemetry data.
///
/// Immutable once handed to the pipeline: ownership transfers on enqueue and
/// the record is released after the batch carrying it is exported or dropped.
#[derive(Debug, Clone, Serialize)]
pub struct Record {
    pub timestamp: SystemTime,
    pub severity: Severity,
    pub message: String,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<u128>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span_id: Option<u64>,
}

impl Record {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            timestamp: SystemTime::now(),
            severity,
            message: message.into(),
            attributes: HashMap::new(),
            trace_id: None,
            span_id: None,
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// An ordered group of records dispatched together to an [`Exporter`].
///
/// Formed by the batcher, consumed by exactly one export dispatch.
///
/// [`Exporter`]: crate::Exporter
#[derive(Debug)]
pub struct Batch {
    records: Vec<Record>,
}

impl Batch {
    pub(crate) fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }
}
