pub mod metrics;
pub mod registry;

pub use metrics::{Metric, MetricHandle, MetricKind, MetricSummary, MetricValue, RateSummary, TrendSummary};
pub use registry::Registry;
