//! Metering module
//!
//! Turns raw metric rows into per-app usage:
//! - rows: raw per-source rows and validation
//! - UsageAggregator: joins and normalizes rows into one usage vector per app

pub mod aggregator;
pub mod rows;

pub use aggregator::{AggregatorConfig, AppMeasurement, UsageAggregator};
pub use rows::{
    ContainerMetricsRow, DoDurationRow, DoRequestRow, MetricSource, RawMetrics,
    WorkerInvocationRow,
};
