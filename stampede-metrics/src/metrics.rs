use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Trend,
    Rate,
}

#[derive(Debug)]
enum Storage {
    Counter(Mutex<f64>),
    Trend(Mutex<Vec<f64>>),
    Rate(RateCounters),
}

#[derive(Debug, Default)]
struct RateCounters {
    total: AtomicU64,
    trues: AtomicU64,
}

#[derive(Debug)]
pub struct Metric {
    kind: MetricKind,
    name: Arc<str>,
    storage: Storage,
}

impl Metric {
    pub(crate) fn new(kind: MetricKind, name: Arc<str>) -> Self {
        let storage = match kind {
            MetricKind::Counter => Storage::Counter(Mutex::new(0.0)),
            MetricKind::Trend => Storage::Trend(Mutex::new(Vec::new())),
            MetricKind::Rate => Storage::Rate(RateCounters::default()),
        };
        Self { kind, name, storage }
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn add(&self, value: f64) {
        if !value.is_finite() {
            return;
        }
        match &self.storage {
            Storage::Counter(sum) => {
                let mut sum = sum.lock();
                *sum += value;
            }
            Storage::Trend(samples) => {
                let mut samples = samples.lock();
                samples.push(value);
            }
            // Rate samples go through add_bool.
            Storage::Rate(_) => {}
        }
    }

    fn add_bool(&self, value: bool) {
        if let Storage::Rate(rate) = &self.storage {
            rate.total.fetch_add(1, Ordering::Relaxed);
            if value {
                rate.trues.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn summarize(&self) -> MetricSummary {
        let value = match &self.storage {
            Storage::Counter(sum) => MetricValue::Counter { total: *sum.lock() },
            Storage::Trend(samples) => {
                let samples = samples.lock();
                MetricValue::Trend(TrendSummary::from_samples(&samples))
            }
            Storage::Rate(rate) => MetricValue::Rate(RateSummary {
                total: rate.total.load(Ordering::Relaxed),
                trues: rate.trues.load(Ordering::Relaxed),
            }),
        };

        MetricSummary {
            name: self.name.to_string(),
            kind: self.kind,
            value,
        }
    }
}

/// Cheap cloneable writer for one metric.
///
/// Writes that don't match the metric's kind are ignored (a `Trend` handle
/// obtained under a name already registered as a `Counter` silently no-ops),
/// so racing creators can never corrupt each other's storage.
#[derive(Debug, Clone)]
pub struct MetricHandle {
    metric: Arc<Metric>,
}

impl MetricHandle {
    pub(crate) fn new(metric: Arc<Metric>) -> Self {
        Self { metric }
    }

    pub fn kind(&self) -> MetricKind {
        self.metric.kind()
    }

    #[inline]
    pub fn add(&self, value: f64) {
        self.metric.add(value);
    }

    /// Records a duration as milliseconds into a trend.
    #[inline]
    pub fn add_duration(&self, elapsed: Duration) {
        self.metric.add(elapsed.as_secs_f64() * 1000.0);
    }

    #[inline]
    pub fn add_bool(&self, value: bool) {
        self.metric.add_bool(value);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricSummary {
    pub name: String,
    pub kind: MetricKind,
    #[serde(flatten)]
    pub value: MetricValue,
}

impl MetricSummary {
    pub fn as_trend(&self) -> Option<&TrendSummary> {
        match &self.value {
            MetricValue::Trend(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_rate(&self) -> Option<&RateSummary> {
        match &self.value {
            MetricValue::Rate(r) => Some(r),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum MetricValue {
    Counter { total: f64 },
    Trend(TrendSummary),
    Rate(RateSummary),
}

/// Immutable snapshot of one trend's full sample set.
///
/// Percentiles use linear interpolation over the sorted samples: for
/// quantile `q` in `[0, 100]` over `n` samples, the rank is
/// `q / 100 * (n - 1)` and the result interpolates between the two
/// adjacent sorted values. `percentile(0)` is the minimum and
/// `percentile(100)` is the maximum; repeated queries of the same snapshot
/// always return the same value.
#[derive(Debug, Clone)]
pub struct TrendSummary {
    sorted: Arc<[f64]>,
    sum: f64,
}

impl TrendSummary {
    pub fn from_samples(samples: &[f64]) -> Self {
        let mut sorted: Vec<f64> = samples.to_vec();
        sorted.sort_by(f64::total_cmp);
        let sum = sorted.iter().sum();
        Self {
            sorted: Arc::from(sorted.into_boxed_slice()),
            sum,
        }
    }

    pub fn count(&self) -> u64 {
        self.sorted.len() as u64
    }

    pub fn min(&self) -> Option<f64> {
        self.sorted.first().copied()
    }

    pub fn max(&self) -> Option<f64> {
        self.sorted.last().copied()
    }

    pub fn avg(&self) -> Option<f64> {
        if self.sorted.is_empty() {
            None
        } else {
            Some(self.sum / self.sorted.len() as f64)
        }
    }

    pub fn percentile(&self, q: f64) -> Option<f64> {
        if self.sorted.is_empty() || !q.is_finite() || !(0.0..=100.0).contains(&q) {
            return None;
        }

        let rank = q / 100.0 * (self.sorted.len() - 1) as f64;
        let lo = rank.floor() as usize;
        let hi = rank.ceil() as usize;
        if lo == hi {
            return Some(self.sorted[lo]);
        }

        let frac = rank - lo as f64;
        Some(self.sorted[lo] + (self.sorted[hi] - self.sorted[lo]) * frac)
    }
}

impl Serialize for TrendSummary {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        #[derive(Serialize)]
        struct Values {
            count: u64,
            min: Option<f64>,
            max: Option<f64>,
            avg: Option<f64>,
            p50: Option<f64>,
            p90: Option<f64>,
            p95: Option<f64>,
            p99: Option<f64>,
        }

        Values {
            count: self.count(),
            min: self.min(),
            max: self.max(),
            avg: self.avg(),
            p50: self.percentile(50.0),
            p90: self.percentile(90.0),
            p95: self.percentile(95.0),
            p99: self.percentile(99.0),
        }
        .serialize(serializer)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RateSummary {
    pub total: u64,
    pub trues: u64,
}

impl RateSummary {
    /// Fraction of true observations; 0 when nothing was recorded.
    pub fn rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.trues as f64 / self.total as f64
        }
    }
}

impl Serialize for RateSummary {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        #[derive(Serialize)]
        struct Values {
            total: u64,
            trues: u64,
            rate: f64,
        }

        Values {
            total: self.total,
            trues: self.trues,
            rate: self.rate(),
        }
        .serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trend_of(samples: &[f64]) -> TrendSummary {
        TrendSummary::from_samples(samples)
    }

    #[test]
    fn trend_percentile_interpolates_linearly() {
        let t = trend_of(&[10.0, 20.0, 30.0, 40.0]);
        // rank = 0.5 * 3 = 1.5 => halfway between 20 and 30.
        assert_eq!(t.percentile(50.0), Some(25.0));
        // rank = 0.25 * 3 = 0.75 => 10 + 0.75 * 10.
        assert_eq!(t.percentile(25.0), Some(17.5));
    }

    #[test]
    fn trend_percentile_bounds_are_min_and_max() {
        let t = trend_of(&[5.0, 1.0, 9.0, 3.0]);
        assert_eq!(t.percentile(0.0), t.min());
        assert_eq!(t.percentile(100.0), t.max());
        assert_eq!(t.min(), Some(1.0));
        assert_eq!(t.max(), Some(9.0));
    }

    #[test]
    fn trend_percentile_is_deterministic_across_queries() {
        let t = trend_of(&[3.0, 1.0, 4.0, 1.0, 5.0, 9.0, 2.0, 6.0]);
        let first = t.percentile(95.0);
        for _ in 0..10 {
            assert_eq!(t.percentile(95.0), first);
        }
    }

    #[test]
    fn trend_empty_has_no_stats() {
        let t = trend_of(&[]);
        assert_eq!(t.count(), 0);
        assert_eq!(t.min(), None);
        assert_eq!(t.max(), None);
        assert_eq!(t.avg(), None);
        assert_eq!(t.percentile(50.0), None);
    }

    #[test]
    fn trend_rejects_out_of_range_quantiles() {
        let t = trend_of(&[1.0, 2.0]);
        assert_eq!(t.percentile(-1.0), None);
        assert_eq!(t.percentile(100.1), None);
        assert_eq!(t.percentile(f64::NAN), None);
    }

    #[test]
    fn metric_ignores_non_finite_samples() {
        let m = Metric::new(MetricKind::Trend, Arc::from("t"));
        m.add(f64::NAN);
        m.add(f64::INFINITY);
        m.add(1.0);

        let summary = m.summarize();
        let MetricValue::Trend(t) = summary.value else {
            panic!("expected trend values");
        };
        assert_eq!(t.count(), 1);
    }

    #[test]
    fn counter_sums_added_values() {
        let m = Metric::new(MetricKind::Counter, Arc::from("c"));
        m.add(2.0);
        m.add(3.5);

        let MetricValue::Counter { total } = m.summarize().value else {
            panic!("expected counter values");
        };
        assert_eq!(total, 5.5);
    }

    #[test]
    fn rate_is_trues_over_total_and_zero_when_empty() {
        let m = Metric::new(MetricKind::Rate, Arc::from("r"));
        let empty = match m.summarize().value {
            MetricValue::Rate(r) => r,
            _ => panic!("expected rate values"),
        };
        assert_eq!(empty.rate(), 0.0);

        for _ in 0..3 {
            m.add_bool(true);
        }
        m.add_bool(false);

        let r = match m.summarize().value {
            MetricValue::Rate(r) => r,
            _ => panic!("expected rate values"),
        };
        assert_eq!(r.total, 4);
        assert_eq!(r.trues, 3);
        assert_eq!(r.rate(), 0.75);
    }

    #[test]
    fn kind_mismatched_writes_are_ignored() {
        let m = Metric::new(MetricKind::Rate, Arc::from("r"));
        m.add(1.0);

        let r = match m.summarize().value {
            MetricValue::Rate(r) => r,
            _ => panic!("expected rate values"),
        };
        assert_eq!(r.total, 0);
    }
}
