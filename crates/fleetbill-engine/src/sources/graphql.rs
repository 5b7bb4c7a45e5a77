//! GraphQL analytics transport
//!
//! Backs the four metric fetches with the account analytics GraphQL API.
//! Each fetch is a single POST filtered by hour window and identifier list.
//! Any transport, status or GraphQL-level error fails the whole fetch.

use super::MetricsSource;
use crate::metering::{
    ContainerMetricsRow, DoDurationRow, DoRequestRow, MetricSource, WorkerInvocationRow,
};
use async_trait::async_trait;
use fleetbill_common::{DateRange, FleetBillError, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument};

/// Default analytics endpoint
pub const DEFAULT_GRAPHQL_ENDPOINT: &str = "https://api.cloudflare.com/client/v4/graphql";

const WORKERS_QUERY: &str = r#"query Workers($accountTag: string!, $filter: WorkersInvocationsAdaptiveFilter_InputObject!) {
  viewer {
    accounts(filter: { accountTag: $accountTag }) {
      workersInvocationsAdaptive(limit: 10000, filter: $filter) {
        dimensions { scriptName }
        sum { requests cpuTimeUs }
        avg { sampleInterval }
      }
    }
  }
}"#;

const DO_REQUESTS_QUERY: &str = r#"query DORequests($accountTag: string!, $filter: DurableObjectsInvocationsAdaptiveGroupsFilter_InputObject!) {
  viewer {
    accounts(filter: { accountTag: $accountTag }) {
      durableObjectsInvocationsAdaptiveGroups(limit: 10000, filter: $filter) {
        dimensions { namespaceId }
        sum { requests }
        avg { sampleInterval }
      }
    }
  }
}"#;

const DO_DURATION_QUERY: &str = r#"query DODuration($accountTag: string!, $filter: DurableObjectsPeriodicGroupsFilter_InputObject!) {
  viewer {
    accounts(filter: { accountTag: $accountTag }) {
      durableObjectsPeriodicGroups(limit: 10000, filter: $filter) {
        dimensions { namespaceId }
        sum { activeTime inboundWebsocketMsgCount }
      }
    }
  }
}"#;

const CONTAINERS_QUERY: &str = r#"query Containers($accountTag: string!, $filter: AccountContainersMetricsAdaptiveGroupsFilter_InputObject!) {
  viewer {
    accounts(filter: { accountTag: $accountTag }) {
      containersMetricsAdaptiveGroups(limit: 10000, filter: $filter) {
        dimensions { applicationId }
        sum { cpuTimeSec allocatedMemory allocatedDisk txBytes }
      }
    }
  }
}"#;

// Wire shapes of the analytics datasets

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScriptDimension {
    script_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NamespaceDimension {
    namespace_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApplicationDimension {
    application_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SampleAvg {
    sample_interval: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WorkerSum {
    requests: Option<f64>,
    cpu_time_us: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct WorkerGroup {
    dimensions: ScriptDimension,
    sum: Option<WorkerSum>,
    avg: Option<SampleAvg>,
}

#[derive(Debug, Default, Deserialize)]
struct RequestSum {
    requests: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct DoRequestGroup {
    dimensions: NamespaceDimension,
    sum: Option<RequestSum>,
    avg: Option<SampleAvg>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DurationSum {
    active_time: Option<f64>,
    inbound_websocket_msg_count: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct DoDurationGroup {
    dimensions: NamespaceDimension,
    sum: Option<DurationSum>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContainerSum {
    cpu_time_sec: Option<f64>,
    allocated_memory: Option<f64>,
    allocated_disk: Option<f64>,
    tx_bytes: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ContainerGroup {
    dimensions: ApplicationDimension,
    sum: Option<ContainerSum>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<Value>,
    errors: Option<Vec<GraphQlError>>,
}

/// One dataset query
struct DatasetQuery<'a> {
    source: MetricSource,
    query: &'static str,
    dataset: &'static str,
    filter_field: &'static str,
    ids: &'a [String],
}

/// Analytics GraphQL client implementing [`MetricsSource`]
pub struct GraphQlMetricsSource {
    client: reqwest::Client,
    endpoint: String,
    account_id: String,
    api_token: String,
}

impl fmt::Debug for GraphQlMetricsSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphQlMetricsSource")
            .field("endpoint", &self.endpoint)
            .field("account_id", &self.account_id)
            .field("api_token", &"[redacted]")
            .finish()
    }
}

impl GraphQlMetricsSource {
    pub fn new(
        endpoint: impl Into<String>,
        account_id: impl Into<String>,
        api_token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("fleetbill/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| FleetBillError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self::with_client(client, endpoint, account_id, api_token))
    }

    pub fn with_client(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        account_id: impl Into<String>,
        api_token: impl Into<String>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            account_id: account_id.into(),
            api_token: api_token.into(),
        }
    }

    fn variables(&self, q: &DatasetQuery<'_>, range: &DateRange) -> Value {
        let mut filter = Map::new();
        filter.insert("datetimeHour_geq".into(), Value::String(range.since_iso()));
        filter.insert("datetimeHour_leq".into(), Value::String(range.until_iso()));
        filter.insert(format!("{}_in", q.filter_field), json!(q.ids));
        json!({
            "accountTag": self.account_id,
            "filter": Value::Object(filter),
        })
    }

    #[instrument(skip_all, fields(source = %q.source, ids = q.ids.len()))]
    async fn fetch_dataset<T: DeserializeOwned>(
        &self,
        q: DatasetQuery<'_>,
        range: &DateRange,
    ) -> Result<Vec<T>> {
        let upstream = |reason: String| FleetBillError::upstream(q.source.as_str(), reason);
        let body = json!({
            "query": q.query,
            "variables": self.variables(&q, range),
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| upstream(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(upstream(format!("HTTP {}: {}", status.as_u16(), text)));
        }

        let parsed: GraphQlResponse = response
            .json()
            .await
            .map_err(|e| upstream(format!("invalid response body: {}", e)))?;

        if let Some(errors) = parsed.errors.filter(|errs| !errs.is_empty()) {
            let messages: Vec<_> = errors.into_iter().map(|e| e.message).collect();
            return Err(upstream(messages.join(", ")));
        }

        let pointer = format!("/viewer/accounts/0/{}", q.dataset);
        let rows = match parsed.data.as_ref().and_then(|d| d.pointer(&pointer)) {
            None | Some(Value::Null) => Vec::new(),
            Some(rows) => serde_json::from_value(rows.clone())
                .map_err(|e| upstream(format!("unexpected {} shape: {}", q.dataset, e)))?,
        };
        debug!(rows = rows.len(), "Dataset fetched");
        Ok(rows)
    }
}

#[async_trait]
impl MetricsSource for GraphQlMetricsSource {
    async fn worker_invocations(
        &self,
        script_ids: &[String],
        range: &DateRange,
    ) -> Result<Vec<WorkerInvocationRow>> {
        let groups: Vec<WorkerGroup> = self
            .fetch_dataset(
                DatasetQuery {
                    source: MetricSource::WorkerInvocations,
                    query: WORKERS_QUERY,
                    dataset: "workersInvocationsAdaptive",
                    filter_field: "scriptName",
                    ids: script_ids,
                },
                range,
            )
            .await?;

        Ok(groups
            .into_iter()
            .map(|g| {
                let sum = g.sum.unwrap_or_default();
                let avg = g.avg.unwrap_or_default();
                WorkerInvocationRow::new(
                    g.dimensions.script_name,
                    sum.requests.unwrap_or(0.0),
                    sum.cpu_time_us.unwrap_or(0.0),
                )
                .with_sample_interval(avg.sample_interval.unwrap_or(1.0))
            })
            .collect())
    }

    async fn durable_object_requests(
        &self,
        namespace_ids: &[String],
        range: &DateRange,
    ) -> Result<Vec<DoRequestRow>> {
        let groups: Vec<DoRequestGroup> = self
            .fetch_dataset(
                DatasetQuery {
                    source: MetricSource::DurableObjectRequests,
                    query: DO_REQUESTS_QUERY,
                    dataset: "durableObjectsInvocationsAdaptiveGroups",
                    filter_field: "namespaceId",
                    ids: namespace_ids,
                },
                range,
            )
            .await?;

        Ok(groups
            .into_iter()
            .map(|g| {
                let requests = g.sum.unwrap_or_default().requests.unwrap_or(0.0);
                let interval = g.avg.unwrap_or_default().sample_interval.unwrap_or(1.0);
                DoRequestRow::new(g.dimensions.namespace_id, requests).with_sample_interval(interval)
            })
            .collect())
    }

    async fn durable_object_duration(
        &self,
        namespace_ids: &[String],
        range: &DateRange,
    ) -> Result<Vec<DoDurationRow>> {
        let groups: Vec<DoDurationGroup> = self
            .fetch_dataset(
                DatasetQuery {
                    source: MetricSource::DurableObjectDuration,
                    query: DO_DURATION_QUERY,
                    dataset: "durableObjectsPeriodicGroups",
                    filter_field: "namespaceId",
                    ids: namespace_ids,
                },
                range,
            )
            .await?;

        Ok(groups
            .into_iter()
            .map(|g| {
                let sum = g.sum.unwrap_or_default();
                DoDurationRow::new(
                    g.dimensions.namespace_id,
                    sum.active_time.unwrap_or(0.0),
                    sum.inbound_websocket_msg_count.unwrap_or(0.0),
                )
            })
            .collect())
    }

    async fn container_metrics(
        &self,
        application_ids: &[String],
        range: &DateRange,
    ) -> Result<Vec<ContainerMetricsRow>> {
        let groups: Vec<ContainerGroup> = self
            .fetch_dataset(
                DatasetQuery {
                    source: MetricSource::ContainerMetrics,
                    query: CONTAINERS_QUERY,
                    dataset: "containersMetricsAdaptiveGroups",
                    filter_field: "applicationId",
                    ids: application_ids,
                },
                range,
            )
            .await?;

        Ok(groups
            .into_iter()
            .map(|g| {
                let sum = g.sum.unwrap_or_default();
                ContainerMetricsRow::new(g.dimensions.application_id)
                    .with_cpu_seconds(sum.cpu_time_sec.unwrap_or(0.0))
                    .with_memory(sum.allocated_memory.unwrap_or(0.0))
                    .with_disk(sum.allocated_disk.unwrap_or(0.0))
                    .with_egress(sum.tx_bytes.unwrap_or(0.0))
            })
            .collect())
    }
}
