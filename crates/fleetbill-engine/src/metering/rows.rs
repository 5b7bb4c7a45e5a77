//! Raw metric rows
//!
//! One row type per metric source, as returned by a [`MetricsSource`]:
//! - Worker invocations, keyed by script id (sampled)
//! - Durable Object requests, keyed by namespace id (sampled)
//! - Durable Object duration, keyed by namespace id (not sampled)
//! - Container metrics, keyed by application id (not sampled)
//!
//! [`MetricsSource`]: crate::sources::MetricsSource

use fleetbill_common::{FleetBillError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The four independent metric sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricSource {
    WorkerInvocations,
    DurableObjectRequests,
    DurableObjectDuration,
    ContainerMetrics,
}

impl MetricSource {
    pub const ALL: [MetricSource; 4] = [
        MetricSource::WorkerInvocations,
        MetricSource::DurableObjectRequests,
        MetricSource::DurableObjectDuration,
        MetricSource::ContainerMetrics,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            MetricSource::WorkerInvocations => "worker_invocations",
            MetricSource::DurableObjectRequests => "durable_object_requests",
            MetricSource::DurableObjectDuration => "durable_object_duration",
            MetricSource::ContainerMetrics => "container_metrics",
        }
    }
}

impl fmt::Display for MetricSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sampling multiplier actually applied to a row.
///
/// Missing, zero, negative or non-finite intervals mean the row was not
/// sampled.
pub fn effective_sample_interval(sample_interval: f64) -> f64 {
    if sample_interval.is_finite() && sample_interval > 0.0 {
        sample_interval
    } else {
        1.0
    }
}

fn check_counter(source: MetricSource, key: &str, field: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(FleetBillError::upstream(
            source.as_str(),
            format!("{} for '{}' is not a non-negative number: {}", field, key, value),
        ));
    }
    Ok(())
}

fn check_key(source: MetricSource, key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(FleetBillError::upstream(source.as_str(), "row without grouping key"));
    }
    Ok(())
}

/// Worker invocation totals for one script
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerInvocationRow {
    pub script_id: String,
    /// Sampled request count
    pub requests: f64,
    /// Sampled CPU time (microseconds)
    pub cpu_time_micros: f64,
    /// Reciprocal of the sampling probability
    pub sample_interval: f64,
}

impl WorkerInvocationRow {
    pub fn new(script_id: impl Into<String>, requests: f64, cpu_time_micros: f64) -> Self {
        Self {
            script_id: script_id.into(),
            requests,
            cpu_time_micros,
            sample_interval: 1.0,
        }
    }

    pub fn with_sample_interval(mut self, sample_interval: f64) -> Self {
        self.sample_interval = sample_interval;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let source = MetricSource::WorkerInvocations;
        check_key(source, &self.script_id)?;
        check_counter(source, &self.script_id, "requests", self.requests)?;
        check_counter(source, &self.script_id, "cpuTimeMicros", self.cpu_time_micros)
    }
}

/// Durable Object HTTP invocations for one namespace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoRequestRow {
    pub namespace_id: String,
    /// Sampled request count
    pub requests: f64,
    /// Reciprocal of the sampling probability
    pub sample_interval: f64,
}

impl DoRequestRow {
    pub fn new(namespace_id: impl Into<String>, requests: f64) -> Self {
        Self {
            namespace_id: namespace_id.into(),
            requests,
            sample_interval: 1.0,
        }
    }

    pub fn with_sample_interval(mut self, sample_interval: f64) -> Self {
        self.sample_interval = sample_interval;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let source = MetricSource::DurableObjectRequests;
        check_key(source, &self.namespace_id)?;
        check_counter(source, &self.namespace_id, "requests", self.requests)
    }
}

/// Durable Object active time for one namespace (exact, not sampled)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoDurationRow {
    pub namespace_id: String,
    /// Active wall time (microseconds)
    pub active_time_micros: f64,
    /// Inbound websocket messages
    pub inbound_message_count: f64,
}

impl DoDurationRow {
    pub fn new(
        namespace_id: impl Into<String>,
        active_time_micros: f64,
        inbound_message_count: f64,
    ) -> Self {
        Self {
            namespace_id: namespace_id.into(),
            active_time_micros,
            inbound_message_count,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let source = MetricSource::DurableObjectDuration;
        check_key(source, &self.namespace_id)?;
        check_counter(source, &self.namespace_id, "activeTimeMicros", self.active_time_micros)?;
        check_counter(
            source,
            &self.namespace_id,
            "inboundMessageCount",
            self.inbound_message_count,
        )
    }
}

/// Container resource consumption for one application (exact, not sampled)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerMetricsRow {
    pub application_id: String,
    pub cpu_seconds: f64,
    pub allocated_memory_byte_seconds: f64,
    pub allocated_disk_byte_seconds: f64,
    pub egress_bytes: f64,
}

impl ContainerMetricsRow {
    pub fn new(application_id: impl Into<String>) -> Self {
        Self {
            application_id: application_id.into(),
            ..Default::default()
        }
    }

    pub fn with_cpu_seconds(mut self, cpu_seconds: f64) -> Self {
        self.cpu_seconds = cpu_seconds;
        self
    }

    pub fn with_memory(mut self, byte_seconds: f64) -> Self {
        self.allocated_memory_byte_seconds = byte_seconds;
        self
    }

    pub fn with_disk(mut self, byte_seconds: f64) -> Self {
        self.allocated_disk_byte_seconds = byte_seconds;
        self
    }

    pub fn with_egress(mut self, bytes: f64) -> Self {
        self.egress_bytes = bytes;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let source = MetricSource::ContainerMetrics;
        let key = &self.application_id;
        check_key(source, key)?;
        check_counter(source, key, "cpuSeconds", self.cpu_seconds)?;
        check_counter(
            source,
            key,
            "allocatedMemoryByteSeconds",
            self.allocated_memory_byte_seconds,
        )?;
        check_counter(source, key, "allocatedDiskByteSeconds", self.allocated_disk_byte_seconds)?;
        check_counter(source, key, "egressBytes", self.egress_bytes)
    }
}

/// All four row sets for one window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMetrics {
    #[serde(default)]
    pub workers: Vec<WorkerInvocationRow>,
    #[serde(default)]
    pub do_requests: Vec<DoRequestRow>,
    #[serde(default)]
    pub do_duration: Vec<DoDurationRow>,
    #[serde(default)]
    pub containers: Vec<ContainerMetricsRow>,
}

impl RawMetrics {
    /// Validate every row; a malformed row fails its whole source
    pub fn validate(&self) -> Result<()> {
        self.workers.iter().try_for_each(WorkerInvocationRow::validate)?;
        self.do_requests.iter().try_for_each(DoRequestRow::validate)?;
        self.do_duration.iter().try_for_each(DoDurationRow::validate)?;
        self.containers.iter().try_for_each(ContainerMetricsRow::validate)
    }

    /// Total number of rows across sources
    pub fn len(&self) -> usize {
        self.workers.len() + self.do_requests.len() + self.do_duration.len() + self.containers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
