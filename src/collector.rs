//! # Collector
//!
//! Per-invocation [metrics::Recorder] for counters and gauges emitted by the handler itself.
//!
//! The recorder is installed with [metrics::with_local_recorder] while the handler runs, so
//! concurrent invocations on other threads never see each other's metrics.

use super::sfx::Datapoint;
use metrics::SharedString;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::error;

/// Metric information stored in the recorder
enum MetricInfo {
    Counter(Arc<AtomicU64>),
    /// f64 bits, as kept by the [metrics::GaugeFn] impl for AtomicU64
    Gauge(Arc<AtomicU64>),
}

/// Counters and gauges drained from an [InvocationRecorder]
#[derive(Debug, Default, PartialEq)]
pub struct Recorded {
    pub counters: Vec<Datapoint>,
    pub gauges: Vec<Datapoint>,
}

/// Collects handler emitted metrics for a single invocation
#[derive(Clone, Default)]
pub struct InvocationRecorder {
    metrics: Arc<Mutex<BTreeMap<metrics::Key, MetricInfo>>>,
}

impl InvocationRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take everything recorded so far
    /// * Counters without a delta since the last drain are omitted
    /// * Gauges report their current value
    pub fn drain(&self) -> Recorded {
        let metrics = self.metrics.lock().unwrap_or_else(PoisonError::into_inner);
        let mut recorded = Recorded::default();

        for (key, info) in metrics.iter() {
            match info {
                MetricInfo::Counter(value) => {
                    let value = value.swap(0, Ordering::Relaxed);
                    if value != 0 {
                        recorded.counters.push(datapoint(key, value.into()));
                    }
                }
                MetricInfo::Gauge(value) => {
                    let value = f64::from_bits(value.load(Ordering::Relaxed));
                    recorded.gauges.push(datapoint(key, value.into()));
                }
            }
        }

        recorded
    }

    #[allow(clippy::mutable_key_type)] // metrics::Key has interior mutability
    fn register(&self, key: &metrics::Key, gauge: bool) -> Option<Arc<AtomicU64>> {
        let mut metrics = self.metrics.lock().unwrap_or_else(PoisonError::into_inner);

        match metrics.get(key) {
            Some(MetricInfo::Counter(value)) if !gauge => Some(value.clone()),
            Some(MetricInfo::Gauge(value)) if gauge => Some(value.clone()),
            Some(MetricInfo::Counter(_)) => {
                error!("Unable to register gauge {key} as it was already registered as a counter");
                None
            }
            Some(MetricInfo::Gauge(_)) => {
                error!("Unable to register counter {key} as it was already registered as a gauge");
                None
            }
            None => {
                let value = Arc::new(AtomicU64::new(0));
                let info = if gauge {
                    MetricInfo::Gauge(value.clone())
                } else {
                    MetricInfo::Counter(value.clone())
                };
                metrics.insert(key.clone(), info);
                Some(value)
            }
        }
    }
}

/// Labels become per-datapoint dimensions
fn datapoint(key: &metrics::Key, value: serde_json::Value) -> Datapoint {
    key.labels()
        .fold(Datapoint::new(key.name(), value), |datapoint, label| {
            datapoint.with_dimension(label.key(), label.value())
        })
}

impl metrics::Recorder for InvocationRecorder {
    // SignalFx datapoints carry neither units nor descriptions
    fn describe_counter(&self, _key: metrics::KeyName, _unit: Option<metrics::Unit>, _description: SharedString) {}

    fn describe_gauge(&self, _key: metrics::KeyName, _unit: Option<metrics::Unit>, _description: SharedString) {}

    fn describe_histogram(&self, _key: metrics::KeyName, _unit: Option<metrics::Unit>, _description: SharedString) {}

    fn register_counter(&self, key: &metrics::Key, _metadata: &metrics::Metadata) -> metrics::Counter {
        match self.register(key, false) {
            Some(value) => metrics::Counter::from_arc(value),
            None => metrics::Counter::noop(),
        }
    }

    fn register_gauge(&self, key: &metrics::Key, _metadata: &metrics::Metadata) -> metrics::Gauge {
        match self.register(key, true) {
            Some(value) => metrics::Gauge::from_arc(value),
            None => metrics::Gauge::noop(),
        }
    }

    fn register_histogram(&self, key: &metrics::Key, _metadata: &metrics::Metadata) -> metrics::Histogram {
        error!("Unable to register histogram {key}, histograms are not sent to SignalFx");
        metrics::Histogram::noop()
    }
}
