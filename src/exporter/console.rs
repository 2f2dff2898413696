use std::io::{self, Write};
use std::sync::Mutex;

use super::{ExportError, Exporter};
use crate::record::Batch;

/// Exporter that serializes each record as a JSON line to a writer.
///
/// Useful for local debugging and as the reference non-network
/// implementation of the [`Exporter`] capability. Selected at construction
/// like any other exporter variant.
pub struct ConsoleExporter<W = io::Stdout> {
    writer: Mutex<W>,
}

impl ConsoleExporter<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send + 'static> ConsoleExporter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }
}

impl<W: Write + Send + 'static> Exporter for ConsoleExporter<W> {
    async fn export(&self, batch: &Batch) -> Result<(), ExportError> {
        let mut writer = self.writer.lock().unwrap();
        for record in batch.records() {
            // Serialization failure means the record itself is unencodable;
            // retrying cannot fix it.
            let line = serde_json::to_vec(record).map_err(ExportError::permanent)?;
            writer
                .write_all(&line)
                .and_then(|()| writer.write_all(b"\n"))
                .map_err(ExportError::retryable)?;
        }
        writer.flush().map_err(ExportError::retryable)
    }
}
