//! OpenTelemetry dispatch metrics.
//!
//! Key metrics:
//! - qdispatch_cache_hits_total / qdispatch_cache_stale_hits_total /
//!   qdispatch_cache_misses_total: read lookups by outcome
//! - qdispatch_refreshes_enqueued_total: stale hits that queued a refresh
//! - qdispatch_writes_executed_total / qdispatch_reads_executed_total:
//!   successful executions
//! - qdispatch_executions_failed_total: swallowed connection or statement
//!   failures
//!
//! Each [`DispatchMetrics`] owns its own meter provider backed by a
//! `ManualReader`, so counts never leak between dispatchers in one
//! process. [`DispatchMetrics::snapshot`] collects through that reader.

use opentelemetry::metrics::{Counter, Meter, MeterProvider as _, Result as MetricsResult};
use opentelemetry_sdk::metrics::data::{ResourceMetrics, Sum, Temporality};
use opentelemetry_sdk::metrics::reader::{MetricReader, TemporalitySelector};
use opentelemetry_sdk::metrics::{InstrumentKind, ManualReader, Pipeline, SdkMeterProvider};
use opentelemetry_sdk::Resource;
use serde::Serialize;
use std::sync::{Arc, Weak};

const CACHE_HITS: &str = "qdispatch_cache_hits_total";
const CACHE_STALE_HITS: &str = "qdispatch_cache_stale_hits_total";
const CACHE_MISSES: &str = "qdispatch_cache_misses_total";
const REFRESHES_ENQUEUED: &str = "qdispatch_refreshes_enqueued_total";
const WRITES_EXECUTED: &str = "qdispatch_writes_executed_total";
const READS_EXECUTED: &str = "qdispatch_reads_executed_total";
const EXECUTIONS_FAILED: &str = "qdispatch_executions_failed_total";

/// `ManualReader` shared between the meter provider and the snapshot path.
#[derive(Debug, Clone)]
struct SharedReader(Arc<ManualReader>);

impl TemporalitySelector for SharedReader {
    fn temporality(&self, kind: InstrumentKind) -> Temporality {
        self.0.temporality(kind)
    }
}

impl MetricReader for SharedReader {
    fn register_pipeline(&self, pipeline: Weak<Pipeline>) {
        self.0.register_pipeline(pipeline);
    }

    fn collect(&self, rm: &mut ResourceMetrics) -> MetricsResult<()> {
        self.0.collect(rm)
    }

    fn force_flush(&self) -> MetricsResult<()> {
        self.0.force_flush()
    }

    fn shutdown(&self) -> MetricsResult<()> {
        self.0.shutdown()
    }
}

/// Dispatch metrics registry.
#[derive(Debug)]
pub struct DispatchMetrics {
    reader: SharedReader,
    _provider: SdkMeterProvider,
    cache_hits: Counter<u64>,
    cache_stale_hits: Counter<u64>,
    cache_misses: Counter<u64>,
    refreshes_enqueued: Counter<u64>,
    writes_executed: Counter<u64>,
    reads_executed: Counter<u64>,
    executions_failed: Counter<u64>,
}

/// Point-in-time totals of [`DispatchMetrics`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub cache_hits: u64,
    pub cache_stale_hits: u64,
    pub cache_misses: u64,
    pub refreshes_enqueued: u64,
    pub writes_executed: u64,
    pub reads_executed: u64,
    pub executions_failed: u64,
}

fn counter(meter: &Meter, name: &'static str, description: &'static str) -> Counter<u64> {
    meter
        .u64_counter(name)
        .with_description(description)
        .with_unit("1")
        .init()
}

impl DispatchMetrics {
    pub fn new() -> Self {
        let reader = SharedReader(Arc::new(ManualReader::builder().build()));
        let provider = SdkMeterProvider::builder()
            .with_reader(reader.clone())
            .build();
        let meter = provider.meter("qdispatch");

        Self {
            cache_hits: counter(&meter, CACHE_HITS, "Reads served fresh from the cache"),
            cache_stale_hits: counter(&meter, CACHE_STALE_HITS, "Reads served stale from the cache"),
            cache_misses: counter(&meter, CACHE_MISSES, "Reads with no cache entry"),
            refreshes_enqueued: counter(&meter, REFRESHES_ENQUEUED, "Background refreshes queued"),
            writes_executed: counter(&meter, WRITES_EXECUTED, "Non-queries executed successfully"),
            reads_executed: counter(&meter, READS_EXECUTED, "Reader queries executed successfully"),
            executions_failed: counter(&meter, EXECUTIONS_FAILED, "Executions dropped after a failure"),
            reader,
            _provider: provider,
        }
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.add(1, &[]);
    }

    pub fn record_cache_stale_hit(&self) {
        self.cache_stale_hits.add(1, &[]);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.add(1, &[]);
    }

    pub fn record_refresh_enqueued(&self) {
        self.refreshes_enqueued.add(1, &[]);
    }

    pub fn record_write(&self) {
        self.writes_executed.add(1, &[]);
    }

    pub fn record_read(&self) {
        self.reads_executed.add(1, &[]);
    }

    pub fn record_failure(&self) {
        self.executions_failed.add(1, &[]);
    }

    /// Collect current counter totals.
    ///
    /// Counters that were never incremented read as zero. A failed
    /// collection is logged and yields an all-zero snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut rm = ResourceMetrics {
            resource: Resource::empty(),
            scope_metrics: Vec::new(),
        };
        if let Err(e) = self.reader.collect(&mut rm) {
            tracing::warn!(error = %e, "Failed to collect metrics");
            return MetricsSnapshot::default();
        }

        let mut snapshot = MetricsSnapshot::default();
        for metric in rm.scope_metrics.iter().flat_map(|scope| &scope.metrics) {
            let Some(sum) = metric.data.as_any().downcast_ref::<Sum<u64>>() else {
                continue;
            };
            let total: u64 = sum.data_points.iter().map(|point| point.value).sum();
            let slot = match metric.name.as_ref() {
                CACHE_HITS => &mut snapshot.cache_hits,
                CACHE_STALE_HITS => &mut snapshot.cache_stale_hits,
                CACHE_MISSES => &mut snapshot.cache_misses,
                REFRESHES_ENQUEUED => &mut snapshot.refreshes_enqueued,
                WRITES_EXECUTED => &mut snapshot.writes_executed,
                READS_EXECUTED => &mut snapshot.reads_executed,
                EXECUTIONS_FAILED => &mut snapshot.executions_failed,
                _ => continue,
            };
            *slot = total;
        }
        snapshot
    }
}

impl Default for DispatchMetrics {
    fn default() -> Self {
        Self::new()
    }
}
