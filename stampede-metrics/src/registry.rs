use dashmap::DashMap;
use std::sync::Arc;

use crate::metrics::{Metric, MetricHandle, MetricKind, MetricSummary};

/// Name-keyed metric store, shared by every writer in a run.
///
/// Metrics are created lazily on first reference and never removed while
/// the run lives. One registry is constructed per run and passed by
/// reference wherever samples are recorded; there is no global instance.
#[derive(Debug, Default)]
pub struct Registry {
    metrics: DashMap<Arc<str>, Arc<Metric>>,
}

impl Registry {
    /// Returns a writer for `name`, creating the metric on first use.
    ///
    /// If the name already exists with a different kind, the existing
    /// metric wins and mismatched writes through the handle are no-ops.
    pub fn handle(&self, kind: MetricKind, name: &str) -> MetricHandle {
        if let Some(existing) = self.metrics.get(name) {
            return MetricHandle::new(existing.clone());
        }

        let key: Arc<str> = Arc::from(name);
        let metric = self
            .metrics
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Metric::new(kind, key)))
            .clone();

        MetricHandle::new(metric)
    }

    /// Final value of a single metric; `None` if it was never referenced.
    pub fn summary_of(&self, name: &str) -> Option<MetricSummary> {
        self.metrics.get(name).map(|m| m.summarize())
    }

    /// Immutable snapshot of every metric, sorted by name.
    pub fn snapshot(&self) -> Vec<MetricSummary> {
        let mut out: Vec<MetricSummary> = self.metrics.iter().map(|m| m.summarize()).collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }
}
