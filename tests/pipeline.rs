use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing_subscriber::prelude::*;

use telpipe::{
    BatchProcessor, Batch, Config, ExportError, Exporter, OverflowPolicy, Record, Severity,
    TelemetryLayer,
};

#[derive(Clone, Default)]
struct CollectingExporter {
    batches: Arc<Mutex<Vec<Vec<Record>>>>,
}

impl CollectingExporter {
    fn messages(&self) -> Vec<String> {
        self.batches
            .lock()
            .unwrap()
            .iter()
            .flatten()
            .map(|r| r.message.clone())
            .collect()
    }

    fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().unwrap().iter().map(Vec::len).collect()
    }
}

impl Exporter for CollectingExporter {
    async fn export(&self, batch: &Batch) -> Result<(), ExportError> {
        self.batches.lock().unwrap().push(batch.records().to_vec());
        Ok(())
    }
}

fn config() -> Config {
    Config {
        max_batch_size: 100,
        max_delay: Duration::from_millis(50),
        queue_capacity: 4096,
        overflow_policy: OverflowPolicy::DropOldest,
        ..Config::default()
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_producers_lose_nothing_and_keep_per_producer_order() {
    let exporter = CollectingExporter::default();
    let mut processor = BatchProcessor::new(config(), exporter.clone()).unwrap();
    processor.start().unwrap();

    let producers: Vec<_> = (0..4)
        .map(|p| {
            let sink = processor.handle();
            tokio::spawn(async move {
                for i in 0..250 {
                    sink.enqueue(Record::new(Severity::Info, format!("p{p}-{i}")))
                        .await
                        .unwrap();
                }
            })
        })
        .collect();
    for producer in producers {
        producer.await.unwrap();
    }

    let summary = processor.stop().await;
    assert_eq!(summary.exported, 1000);
    assert_eq!(summary.dropped, 0);
    assert!(summary.first_error.is_none());

    let messages = exporter.messages();
    assert_eq!(messages.len(), 1000);

    // Every flushed batch respects the size bound, and each producer's
    // records appear in its own enqueue order.
    assert!(exporter.batch_sizes().iter().all(|&n| n >= 1 && n <= 100));
    for p in 0..4 {
        let prefix = format!("p{p}-");
        let indexes: Vec<usize> = messages
            .iter()
            .filter_map(|m| m.strip_prefix(&prefix))
            .map(|i| i.parse().unwrap())
            .collect();
        assert_eq!(indexes.len(), 250);
        assert!(indexes.windows(2).all(|w| w[0] < w[1]));
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn tracing_events_flow_through_the_pipeline() {
    let exporter = CollectingExporter::default();
    let mut processor = BatchProcessor::new(config(), exporter.clone()).unwrap();
    processor.start().unwrap();

    let layer = TelemetryLayer::new(processor.handle()).with_min_severity(Severity::Info);
    tracing::subscriber::with_default(tracing_subscriber::registry().with(layer), || {
        tracing::info!(request_id = 7, "request handled");
        tracing::trace!("filtered out");
    });

    let summary = processor.stop().await;
    assert_eq!(summary.exported, 1);
    assert_eq!(exporter.messages(), vec!["request handled"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn counters_reconcile_after_overflow() {
    let exporter = CollectingExporter::default();
    let mut processor = BatchProcessor::new(
        Config {
            queue_capacity: 8,
            ..config()
        },
        exporter.clone(),
    )
    .unwrap();

    // No drain loop yet: pushing 20 into capacity 8 must evict 12.
    for i in 0..20 {
        processor
            .try_enqueue(Record::new(Severity::Info, format!("r{i}")))
            .unwrap();
    }
    processor.start().unwrap();
    let summary = processor.stop().await;

    assert_eq!(summary.exported, 8);
    assert_eq!(summary.dropped, 12);
    let counters = processor.counters();
    assert_eq!(counters.enqueued, 20);
    assert_eq!(counters.dropped_overflow, 12);
    assert_eq!(counters.exported + counters.dropped(), counters.enqueued);
}
