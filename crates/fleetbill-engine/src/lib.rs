//! # FleetBill Engine
//!
//! Usage aggregation and shared free-tier cost allocation for a fleet of
//! serverless apps billed against one account.
//!
//! ## Pipeline
//!
//! - **Sources**: four concurrent metric fetches plus app discovery
//! - **Metering**: sampling correction, unit conversion, per-app usage
//! - **Pricing**: gross cost per dimension, fleet overage, proportional discount
//! - **Report**: fleet-wide or single-app JSON breakdown

pub mod config;
pub mod metering;
pub mod pricing;
pub mod report;
pub mod sources;

use chrono::{DateTime, Utc};
use config::FleetBillConfig;
use fleetbill_common::{AppTarget, DateRange, FleetBillError, Result, TargetKeys};
use metering::UsageAggregator;
use pricing::{FleetResult, FreeTierAllocator, PricingTable};
use report::{CostReport, FleetReport, SingleAppReport};
use sources::{select_targets, ApiAppDirectory, AppDirectory, GraphQlMetricsSource, MetricsSource};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};

pub use fleetbill_common::VERSION;

/// Cost estimation service
pub struct FleetBill {
    table: PricingTable,
    aggregator: UsageAggregator,
    source: Arc<dyn MetricsSource>,
    directory: Option<Arc<dyn AppDirectory>>,
}

impl FleetBill {
    pub fn new(table: PricingTable, aggregator: UsageAggregator, source: Arc<dyn MetricsSource>) -> Self {
        Self {
            table,
            aggregator,
            source,
            directory: None,
        }
    }

    /// Attach an app directory used by [`FleetBill::report`]
    pub fn with_directory(mut self, directory: Arc<dyn AppDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Wire the HTTP-backed source and directory from configuration
    pub fn from_config(config: &FleetBillConfig) -> Result<Self> {
        let mut builder = PricingTable::builder().from_env();
        if let Some(path) = &config.pricing_file {
            builder = builder.from_file(path)?;
        }
        let table = builder.build()?;
        let timeout = Duration::from_secs(config.request_timeout_secs);

        let source = GraphQlMetricsSource::new(
            config.graphql_endpoint(),
            &config.account_id,
            &config.api_token,
            timeout,
        )?;
        let directory = ApiAppDirectory::new(&config.api_base, &config.account_id, &config.api_token, timeout)?
            .with_script_prefix(&config.script_prefix)
            .with_do_class(&config.do_class);

        Ok(Self::new(table, UsageAggregator::new(config.aggregator), Arc::new(source))
            .with_directory(Arc::new(directory)))
    }

    pub fn pricing_table(&self) -> &PricingTable {
        &self.table
    }

    /// Fetch, aggregate and allocate costs for the given apps.
    ///
    /// The free tier is shared across exactly the apps passed in.
    #[instrument(skip(self, targets), fields(apps = targets.len(), since = %range.since_iso()))]
    pub async fn estimate(&self, targets: &[AppTarget], range: &DateRange) -> Result<FleetResult> {
        let keys = TargetKeys::from_targets(targets);
        let raw = sources::fetch_all(self.source.as_ref(), &keys, range).await?;
        let measurements = self.aggregator.aggregate(targets, raw);
        let result = FreeTierAllocator::new(&self.table).allocate(measurements);

        info!(
            gross = result.gross_fleet_total,
            discount = result.free_tier_discount,
            net = result.net_fleet_total,
            "Estimate complete"
        );
        Ok(result)
    }

    /// Resolve the period, discover apps and build the report
    pub async fn report(&self, app: Option<&str>, selector: Option<&str>) -> Result<CostReport> {
        self.report_at(app, selector, Utc::now()).await
    }

    /// [`FleetBill::report`] against an explicit clock
    pub async fn report_at(
        &self,
        app: Option<&str>,
        selector: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<CostReport> {
        // Selector errors surface before any upstream call
        let range = DateRange::resolve(selector, now)?;

        let directory = self
            .directory
            .as_ref()
            .ok_or_else(|| FleetBillError::Internal("no app directory configured".into()))?;
        let apps = directory.list_apps().await?;
        let targets = select_targets(apps, app)?;

        let result = self.estimate(&targets, &range).await?;
        match app {
            Some(_) => Ok(CostReport::App(SingleAppReport::new(&range, &result)?)),
            None => Ok(CostReport::Fleet(FleetReport::new(&range, &result))),
        }
    }
}

impl std::fmt::Debug for FleetBill {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FleetBill")
            .field("table", &self.table)
            .field("aggregator", &self.aggregator)
            .field("has_directory", &self.directory.is_some())
            .finish_non_exhaustive()
    }
}
