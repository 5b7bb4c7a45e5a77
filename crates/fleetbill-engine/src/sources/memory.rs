//! In-memory metric source
//!
//! Serves a fixed [`RawMetrics`] set, filtered by the requested identifiers.
//! Individual sources can be marked as failing. Used by tests, benchmarks
//! and offline replays of captured metrics.

use super::MetricsSource;
use crate::metering::{
    ContainerMetricsRow, DoDurationRow, DoRequestRow, MetricSource, RawMetrics,
    WorkerInvocationRow,
};
use async_trait::async_trait;
use fleetbill_common::{DateRange, FleetBillError, Result};
use parking_lot::Mutex;
use std::collections::HashSet;

pub struct InMemoryMetricsSource {
    rows: RawMetrics,
    failing: HashSet<MetricSource>,
    calls: Mutex<Vec<MetricSource>>,
}

impl InMemoryMetricsSource {
    pub fn new(rows: RawMetrics) -> Self {
        Self {
            rows,
            failing: HashSet::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Make every fetch of `source` fail as unavailable
    pub fn failing(mut self, source: MetricSource) -> Self {
        self.failing.insert(source);
        self
    }

    /// Sources fetched so far, in call order
    pub fn calls(&self) -> Vec<MetricSource> {
        self.calls.lock().clone()
    }

    fn begin(&self, source: MetricSource) -> Result<()> {
        self.calls.lock().push(source);
        if self.failing.contains(&source) {
            return Err(FleetBillError::upstream(source.as_str(), "source marked as failing"));
        }
        Ok(())
    }

    fn select<T: Clone>(rows: &[T], ids: &[String], key: impl Fn(&T) -> &str) -> Vec<T> {
        let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
        rows.iter()
            .filter(|row| wanted.contains(key(row)))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl MetricsSource for InMemoryMetricsSource {
    async fn worker_invocations(
        &self,
        script_ids: &[String],
        _range: &DateRange,
    ) -> Result<Vec<WorkerInvocationRow>> {
        self.begin(MetricSource::WorkerInvocations)?;
        Ok(Self::select(&self.rows.workers, script_ids, |r| r.script_id.as_str()))
    }

    async fn durable_object_requests(
        &self,
        namespace_ids: &[String],
        _range: &DateRange,
    ) -> Result<Vec<DoRequestRow>> {
        self.begin(MetricSource::DurableObjectRequests)?;
        Ok(Self::select(&self.rows.do_requests, namespace_ids, |r| r.namespace_id.as_str()))
    }

    async fn durable_object_duration(
        &self,
        namespace_ids: &[String],
        _range: &DateRange,
    ) -> Result<Vec<DoDurationRow>> {
        self.begin(MetricSource::DurableObjectDuration)?;
        Ok(Self::select(&self.rows.do_duration, namespace_ids, |r| r.namespace_id.as_str()))
    }

    async fn container_metrics(
        &self,
        application_ids: &[String],
        _range: &DateRange,
    ) -> Result<Vec<ContainerMetricsRow>> {
        self.begin(MetricSource::ContainerMetrics)?;
        Ok(Self::select(&self.rows.containers, application_ids, |r| r.application_id.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rows_filtered_by_ids() {
        let source = InMemoryMetricsSource::new(RawMetrics {
            workers: vec![
                WorkerInvocationRow::new("a", 1.0, 1.0),
                WorkerInvocationRow::new("b", 2.0, 2.0),
            ],
            ..Default::default()
        });
        let range = DateRange::resolve_now(None).unwrap();
        let rows = source
            .worker_invocations(&["b".to_string()], &range)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].script_id, "b");
    }
}
