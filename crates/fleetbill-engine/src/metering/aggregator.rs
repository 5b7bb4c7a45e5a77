//! Per-app usage aggregation
//!
//! Joins the four raw row sets into exactly one [`UsageVector`] per target
//! app, in target order. Sampled sources are scaled by their sample
//! interval; units are converted to the billing units of each
//! [`PricingDimension`].

use super::rows::{
    effective_sample_interval, ContainerMetricsRow, DoDurationRow, DoRequestRow, RawMetrics,
    WorkerInvocationRow,
};
use fleetbill_common::{
    AppTarget, FleetBillError, PricingDimension, Result, UsageVector, BYTES_PER_GB,
    BYTES_PER_GIB, DEFAULT_DO_MEMORY_MIB, DEFAULT_MESSAGES_PER_REQUEST, MICROS_PER_SECOND,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, instrument};

/// Vendor billing constants used during aggregation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatorConfig {
    /// Inbound websocket messages billed as one Durable Object request
    pub messages_per_request: f64,
    /// Memory footprint charged per active Durable Object second (MiB)
    pub do_memory_mib: f64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            messages_per_request: DEFAULT_MESSAGES_PER_REQUEST,
            do_memory_mib: DEFAULT_DO_MEMORY_MIB,
        }
    }
}

impl AggregatorConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.messages_per_request.is_finite() || self.messages_per_request <= 0.0 {
            return Err(FleetBillError::Config(format!(
                "messages_per_request must be positive, got {}",
                self.messages_per_request
            )));
        }
        if !self.do_memory_mib.is_finite() || self.do_memory_mib < 0.0 {
            return Err(FleetBillError::Config(format!(
                "do_memory_mib must be non-negative, got {}",
                self.do_memory_mib
            )));
        }
        Ok(())
    }

    /// GB charged per active second
    fn do_gb_per_second(&self) -> f64 {
        self.do_memory_mib / 1024.0
    }
}

/// Aggregated usage for one app
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppMeasurement {
    pub app_name: String,
    pub usage: UsageVector,
    /// Inbound websocket messages folded into `doRequests`
    pub do_inbound_messages: f64,
}

impl AppMeasurement {
    pub fn new(app_name: impl Into<String>, usage: UsageVector) -> Self {
        Self {
            app_name: app_name.into(),
            usage,
            do_inbound_messages: 0.0,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct WorkerTotals {
    requests: f64,
    cpu_micros: f64,
}

#[derive(Debug, Default, Clone, Copy)]
struct DurationTotals {
    active_micros: f64,
    inbound_messages: f64,
}

#[derive(Debug, Default, Clone, Copy)]
struct ContainerTotals {
    cpu_seconds: f64,
    memory_byte_seconds: f64,
    disk_byte_seconds: f64,
    egress_bytes: f64,
}

/// Grouped totals per key space
#[derive(Debug, Default)]
struct Grouped {
    workers: HashMap<String, WorkerTotals>,
    do_requests: HashMap<String, f64>,
    do_duration: HashMap<String, DurationTotals>,
    containers: HashMap<String, ContainerTotals>,
}

impl Grouped {
    fn from_raw(raw: RawMetrics) -> Self {
        let mut grouped = Grouped::default();
        for row in raw.workers {
            grouped.add_worker(row);
        }
        for row in raw.do_requests {
            grouped.add_do_request(row);
        }
        for row in raw.do_duration {
            grouped.add_do_duration(row);
        }
        for row in raw.containers {
            grouped.add_container(row);
        }
        grouped
    }

    fn add_worker(&mut self, row: WorkerInvocationRow) {
        let scale = effective_sample_interval(row.sample_interval);
        let totals = self.workers.entry(row.script_id).or_default();
        totals.requests += row.requests * scale;
        totals.cpu_micros += row.cpu_time_micros * scale;
    }

    fn add_do_request(&mut self, row: DoRequestRow) {
        let scale = effective_sample_interval(row.sample_interval);
        *self.do_requests.entry(row.namespace_id).or_default() += row.requests * scale;
    }

    fn add_do_duration(&mut self, row: DoDurationRow) {
        let totals = self.do_duration.entry(row.namespace_id).or_default();
        totals.active_micros += row.active_time_micros;
        totals.inbound_messages += row.inbound_message_count;
    }

    fn add_container(&mut self, row: ContainerMetricsRow) {
        let totals = self.containers.entry(row.application_id).or_default();
        totals.cpu_seconds += row.cpu_seconds;
        totals.memory_byte_seconds += row.allocated_memory_byte_seconds;
        totals.disk_byte_seconds += row.allocated_disk_byte_seconds;
        totals.egress_bytes += row.egress_bytes;
    }
}

/// Joins raw metric rows into per-app usage vectors
#[derive(Debug, Clone, Default)]
pub struct UsageAggregator {
    config: AggregatorConfig,
}

impl UsageAggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Produce one measurement per target, in target order.
    ///
    /// Consumes the raw rows. An app without matching rows in a source gets
    /// zero for that source's dimensions.
    #[instrument(skip_all, fields(apps = targets.len(), rows = raw.len()))]
    pub fn aggregate(&self, targets: &[AppTarget], raw: RawMetrics) -> Vec<AppMeasurement> {
        let grouped = Grouped::from_raw(raw);
        debug!(
            scripts = grouped.workers.len(),
            namespaces = grouped.do_requests.len().max(grouped.do_duration.len()),
            applications = grouped.containers.len(),
            "Grouped metric rows"
        );

        targets
            .iter()
            .map(|target| self.measure(target, &grouped))
            .collect()
    }

    fn measure(&self, target: &AppTarget, grouped: &Grouped) -> AppMeasurement {
        let worker = grouped
            .workers
            .get(&target.script_id)
            .copied()
            .unwrap_or_default();

        let (do_http, duration) = match target.namespace_id.as_deref() {
            Some(ns) => (
                grouped.do_requests.get(ns).copied().unwrap_or_default(),
                grouped.do_duration.get(ns).copied().unwrap_or_default(),
            ),
            None => (0.0, DurationTotals::default()),
        };

        let container = target
            .application_id
            .as_deref()
            .and_then(|id| grouped.containers.get(id).copied())
            .unwrap_or_default();

        let do_billable =
            do_http + duration.inbound_messages / self.config.messages_per_request;
        let do_gb_seconds =
            duration.active_micros / MICROS_PER_SECOND * self.config.do_gb_per_second();

        let usage = UsageVector::zero()
            .with(PricingDimension::WorkerRequests, worker.requests)
            .with(PricingDimension::WorkerCpuMs, worker.cpu_micros / 1000.0)
            .with(PricingDimension::DoRequests, do_billable)
            .with(PricingDimension::DoGbSeconds, do_gb_seconds)
            .with(PricingDimension::ContainerVcpuSec, container.cpu_seconds)
            .with(
                PricingDimension::ContainerMemGibSec,
                container.memory_byte_seconds / BYTES_PER_GIB,
            )
            .with(
                PricingDimension::ContainerDiskGbSec,
                container.disk_byte_seconds / BYTES_PER_GB,
            )
            .with(
                PricingDimension::ContainerEgressGb,
                container.egress_bytes / BYTES_PER_GB,
            );

        AppMeasurement {
            app_name: target.app_name.clone(),
            usage,
            do_inbound_messages: duration.inbound_messages,
        }
    }
}
