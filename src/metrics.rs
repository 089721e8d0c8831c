use std::time::Instant;

use prometheus::{histogram_opts, opts, HistogramVec, IntCounter, IntCounterVec, Registry};

use crate::Error;

#[derive(Clone)]
pub struct Metrics {
    pub watch_events: IntCounterVec,
    pub creations: IntCounterVec,
    pub failures: IntCounterVec,
    pub syncs: IntCounter,
    pub sync_duration: HistogramVec,
}

impl Default for Metrics {
    fn default() -> Self {
        let sync_duration = HistogramVec::new(
            histogram_opts!(
                "presence_operator_sync_duration_seconds",
                "The duration of a reconciliation pass over all watchers in seconds"
            )
            .buckets(vec![0.01, 0.1, 0.25, 0.5, 1., 5., 15., 60.]),
            &[],
        )
        .unwrap();
        let watch_events = IntCounterVec::new(
            opts!(
                "presence_operator_watch_events_total",
                "change events observed per resource kind"
            ),
            &["kind", "event"],
        )
        .unwrap();
        let creations = IntCounterVec::new(
            opts!(
                "presence_operator_creations_total",
                "creation attempts for missing required objects"
            ),
            &["kind"],
        )
        .unwrap();
        let failures = IntCounterVec::new(
            opts!(
                "presence_operator_creation_errors_total",
                "failed creation attempts"
            ),
            &["kind", "error"],
        )
        .unwrap();
        let syncs = IntCounter::new("presence_operator_syncs_total", "reconciliation passes").unwrap();
        Metrics {
            watch_events,
            creations,
            failures,
            syncs,
            sync_duration,
        }
    }
}

impl Metrics {
    /// Register API metrics to start tracking them.
    pub fn register(self, registry: &Registry) -> Result<Self, prometheus::Error> {
        registry.register(Box::new(self.sync_duration.clone()))?;
        registry.register(Box::new(self.watch_events.clone()))?;
        registry.register(Box::new(self.creations.clone()))?;
        registry.register(Box::new(self.failures.clone()))?;
        registry.register(Box::new(self.syncs.clone()))?;
        Ok(self)
    }

    pub fn watch_event(&self, kind: &str, event: &str) {
        self.watch_events.with_label_values(&[kind, event]).inc();
    }

    pub fn creation(&self, kind: &str) {
        self.creations.with_label_values(&[kind]).inc();
    }

    pub fn creation_failure(&self, kind: &str, e: &Error) {
        self.failures
            .with_label_values(&[kind, e.metric_label().as_ref()])
            .inc()
    }

    pub fn count_and_measure(&self) -> SyncMeasurer {
        self.syncs.inc();
        SyncMeasurer {
            start: Instant::now(),
            metric: self.sync_duration.clone(),
        }
    }
}

/// Smart function duration measurer
///
/// Relies on Drop to calculate duration and register the observation in the histogram
pub struct SyncMeasurer {
    start: Instant,
    metric: HistogramVec,
}

impl Drop for SyncMeasurer {
    fn drop(&mut self) {
        #[allow(clippy::cast_precision_loss)]
        let duration = self.start.elapsed().as_millis() as f64 / 1000.0;
        self.metric.with_label_values(&[]).observe(duration);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn registers_and_counts() {
        let registry = Registry::new();
        let metrics = Metrics::default().register(&registry).unwrap();

        metrics.watch_event("ConfigMap", "deleted");
        metrics.creation("ConfigMap");
        drop(metrics.count_and_measure());

        let names: Vec<String> = registry
            .gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();
        assert!(names.contains(&"presence_operator_watch_events_total".to_string()));
        assert!(names.contains(&"presence_operator_syncs_total".to_string()));
        assert_eq!(metrics.syncs.get(), 1);
        assert_eq!(metrics.creations.with_label_values(&["ConfigMap"]).get(), 1);
    }
}
