//! Metric sources
//!
//! The engine consumes four independent fetch operations through the
//! [`MetricsSource`] trait:
//! - `worker_invocations` keyed by script id
//! - `durable_object_requests` keyed by namespace id
//! - `durable_object_duration` keyed by namespace id
//! - `container_metrics` keyed by application id
//!
//! [`fetch_all`] issues them concurrently. A fetch with no identifiers is
//! skipped; failure of any whole fetch aborts the estimate.

pub mod directory;
pub mod graphql;
pub mod memory;

use crate::metering::{
    ContainerMetricsRow, DoDurationRow, DoRequestRow, MetricSource, RawMetrics,
    WorkerInvocationRow,
};
use async_trait::async_trait;
use fleetbill_common::{DateRange, Result, TargetKeys};
use std::future::Future;
use tracing::{debug, info, instrument};

pub use directory::{select_targets, ApiAppDirectory, AppDirectory, StaticAppDirectory};
pub use graphql::GraphQlMetricsSource;
pub use memory::InMemoryMetricsSource;

/// Supplier of raw per-source metric rows
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Worker invocations for the given scripts (sampled)
    async fn worker_invocations(
        &self,
        script_ids: &[String],
        range: &DateRange,
    ) -> Result<Vec<WorkerInvocationRow>>;

    /// Durable Object HTTP invocations for the given namespaces (sampled)
    async fn durable_object_requests(
        &self,
        namespace_ids: &[String],
        range: &DateRange,
    ) -> Result<Vec<DoRequestRow>>;

    /// Durable Object active time and websocket messages (not sampled)
    async fn durable_object_duration(
        &self,
        namespace_ids: &[String],
        range: &DateRange,
    ) -> Result<Vec<DoDurationRow>>;

    /// Container resource consumption for the given applications
    async fn container_metrics(
        &self,
        application_ids: &[String],
        range: &DateRange,
    ) -> Result<Vec<ContainerMetricsRow>>;
}

async fn fetch_one<T, F>(source: MetricSource, ids: &[String], fetch: F) -> Result<Vec<T>>
where
    F: Future<Output = Result<Vec<T>>>,
{
    if ids.is_empty() {
        debug!(source = %source, "No identifiers, skipping fetch");
        return Ok(Vec::new());
    }
    let rows = fetch.await.map_err(|e| e.into_upstream(source.as_str()))?;
    debug!(source = %source, ids = ids.len(), rows = rows.len(), "Fetched rows");
    Ok(rows)
}

/// Fetch all four row sets concurrently.
///
/// Returns once every fetch has completed; the first whole-source failure
/// is returned as `UpstreamUnavailable` and no rows are kept.
#[instrument(skip_all, fields(since = %range.since_iso(), until = %range.until_iso()))]
pub async fn fetch_all(
    source: &dyn MetricsSource,
    keys: &TargetKeys,
    range: &DateRange,
) -> Result<RawMetrics> {
    let (workers, do_requests, do_duration, containers) = tokio::try_join!(
        fetch_one(
            MetricSource::WorkerInvocations,
            &keys.script_ids,
            source.worker_invocations(&keys.script_ids, range),
        ),
        fetch_one(
            MetricSource::DurableObjectRequests,
            &keys.namespace_ids,
            source.durable_object_requests(&keys.namespace_ids, range),
        ),
        fetch_one(
            MetricSource::DurableObjectDuration,
            &keys.namespace_ids,
            source.durable_object_duration(&keys.namespace_ids, range),
        ),
        fetch_one(
            MetricSource::ContainerMetrics,
            &keys.application_ids,
            source.container_metrics(&keys.application_ids, range),
        ),
    )?;

    let raw = RawMetrics {
        workers,
        do_requests,
        do_duration,
        containers,
    };
    raw.validate()?;

    info!(rows = raw.len(), "Fetched metrics");
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetbill_common::{AppTarget, FleetBillError};

    fn range() -> DateRange {
        DateRange::resolve_now(Some("7d")).unwrap()
    }

    #[tokio::test]
    async fn test_empty_key_lists_are_not_fetched() {
        let source = InMemoryMetricsSource::new(RawMetrics::default());
        let keys = TargetKeys::from_targets(&[AppTarget::new("web", "fp-web")]);

        let raw = fetch_all(&source, &keys, &range()).await.unwrap();
        assert!(raw.is_empty());
        assert_eq!(source.calls(), vec![MetricSource::WorkerInvocations]);
    }

    #[tokio::test]
    async fn test_all_sources_fetched_when_keys_present() {
        let source = InMemoryMetricsSource::new(RawMetrics::default());
        let target = AppTarget::new("web", "fp-web")
            .with_namespace("ns")
            .with_application("ca");
        let keys = TargetKeys::from_targets(&[target]);

        fetch_all(&source, &keys, &range()).await.unwrap();
        let mut calls = source.calls();
        calls.sort_by_key(|s| s.as_str());
        assert_eq!(calls.len(), 4);
    }

    #[tokio::test]
    async fn test_source_failure_aborts() {
        let source = InMemoryMetricsSource::new(RawMetrics::default())
            .failing(MetricSource::ContainerMetrics);
        let target = AppTarget::new("web", "fp-web").with_application("ca");
        let keys = TargetKeys::from_targets(&[target]);

        let err = fetch_all(&source, &keys, &range()).await.unwrap_err();
        match err {
            FleetBillError::UpstreamUnavailable { source_name, .. } => {
                assert_eq!(source_name, "container_metrics")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_failing_source_without_keys_is_skipped() {
        let source = InMemoryMetricsSource::new(RawMetrics::default())
            .failing(MetricSource::DurableObjectDuration);
        let keys = TargetKeys::from_targets(&[AppTarget::new("web", "fp-web")]);
        assert!(fetch_all(&source, &keys, &range()).await.is_ok());
    }

    #[tokio::test]
    async fn test_malformed_rows_fail_the_source() {
        let source = InMemoryMetricsSource::new(RawMetrics {
            workers: vec![WorkerInvocationRow::new("fp-web", -4.0, 0.0)],
            ..Default::default()
        });
        let keys = TargetKeys::from_targets(&[AppTarget::new("web", "fp-web")]);
        let err = fetch_all(&source, &keys, &range()).await.unwrap_err();
        assert!(err.is_upstream());
    }
}
