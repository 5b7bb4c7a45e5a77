//! Structured cost reports
//!
//! The JSON shapes consumed by a rendering layer. Values are unrounded;
//! rounding is a presentation concern.

use crate::pricing::{AppUsage, FleetResult};
use fleetbill_common::{CostVector, DateRange, DimensionCategory, FleetBillError, Result, UsageVector};
use serde::{Deserialize, Serialize};

/// Reporting window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Period {
    /// ISO 8601, second precision
    pub since: String,
    /// ISO 8601, second precision
    pub until: String,
    pub label: String,
}

impl From<&DateRange> for Period {
    fn from(range: &DateRange) -> Self {
        Self {
            since: range.since_iso(),
            until: range.until_iso(),
            label: range.label.clone(),
        }
    }
}

/// Gross cost per product category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryCosts {
    pub workers: f64,
    pub durable_objects: f64,
    pub containers: f64,
}

impl From<&CostVector> for CategoryCosts {
    fn from(costs: &CostVector) -> Self {
        Self {
            workers: costs.category_total(DimensionCategory::Workers),
            durable_objects: costs.category_total(DimensionCategory::DurableObjects),
            containers: costs.category_total(DimensionCategory::Containers),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppUsageReport {
    pub name: String,
    /// Raw units per dimension
    pub usage: UsageVector,
    /// Gross currency per dimension
    pub costs: CostVector,
    pub categories: CategoryCosts,
    /// Inbound websocket messages behind `usage.doRequests`
    #[serde(rename = "doWsMsgs")]
    pub do_ws_msgs: f64,
    pub gross_total: f64,
    pub free_tier_discount: f64,
    pub net_total: f64,
}

impl From<&AppUsage> for AppUsageReport {
    fn from(app: &AppUsage) -> Self {
        Self {
            name: app.app_name.clone(),
            usage: app.usage,
            costs: app.gross_costs,
            categories: CategoryCosts::from(&app.gross_costs),
            do_ws_msgs: app.do_inbound_messages,
            gross_total: app.gross_total,
            free_tier_discount: app.free_tier_discount,
            net_total: app.net_total,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetReport {
    pub period: Period,
    pub apps: Vec<AppUsageReport>,
    pub gross_fleet_total: f64,
    pub free_tier_discount: f64,
    pub net_fleet_total: f64,
    /// Flat platform fee
    pub platform: f64,
    /// `netFleetTotal + platform`
    pub total: f64,
}

impl FleetReport {
    pub fn new(range: &DateRange, result: &FleetResult) -> Self {
        Self {
            period: Period::from(range),
            apps: result.apps.iter().map(AppUsageReport::from).collect(),
            gross_fleet_total: result.gross_fleet_total,
            free_tier_discount: result.free_tier_discount,
            net_fleet_total: result.net_fleet_total,
            platform: result.platform_fee,
            total: result.grand_total(),
        }
    }
}

/// Report for a one-app query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleAppReport {
    pub app: String,
    pub period: Period,
    pub usage: UsageVector,
    pub costs: CostVector,
    pub categories: CategoryCosts,
    #[serde(rename = "doWsMsgs")]
    pub do_ws_msgs: f64,
    pub gross_total: f64,
    pub free_tier_discount: f64,
    pub net_total: f64,
}

impl SingleAppReport {
    /// Build from a one-app fleet result
    pub fn new(range: &DateRange, result: &FleetResult) -> Result<Self> {
        let [app] = result.apps.as_slice() else {
            return Err(FleetBillError::Internal(format!(
                "single-app report needs exactly one app, got {}",
                result.apps.len()
            )));
        };
        let app = AppUsageReport::from(app);
        Ok(Self {
            app: app.name,
            period: Period::from(range),
            usage: app.usage,
            costs: app.costs,
            categories: app.categories,
            do_ws_msgs: app.do_ws_msgs,
            gross_total: app.gross_total,
            free_tier_discount: app.free_tier_discount,
            net_total: app.net_total,
        })
    }
}

/// Either report shape
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CostReport {
    Fleet(FleetReport),
    App(SingleAppReport),
}

impl CostReport {
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metering::AppMeasurement;
    use crate::pricing::{FreeTierAllocator, PricingTable};
    use chrono::{TimeZone, Utc};
    use fleetbill_common::PricingDimension;

    fn range() -> DateRange {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 8, 0, 0).unwrap();
        DateRange::resolve(None, now).unwrap()
    }

    fn result(apps: &[(&str, f64)]) -> FleetResult {
        let table = PricingTable::default();
        let measurements = apps
            .iter()
            .map(|(name, requests)| {
                AppMeasurement::new(
                    *name,
                    UsageVector::zero().with(PricingDimension::WorkerRequests, *requests),
                )
            })
            .collect();
        FreeTierAllocator::new(&table).allocate(measurements)
    }

    #[test]
    fn test_fleet_report_json_shape() {
        let report = FleetReport::new(&range(), &result(&[("a", 8e6), ("b", 4e6)]));
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["period"]["since"], "2024-03-01T00:00:00Z");
        assert_eq!(json["period"]["until"], "2024-03-10T08:00:00Z");
        assert_eq!(json["period"]["label"], "Mar 1 – Mar 10");
        assert_eq!(json["apps"].as_array().unwrap().len(), 2);
        assert_eq!(json["apps"][0]["name"], "a");
        assert_eq!(json["apps"][0]["usage"]["workerRequests"], 8e6);
        assert!(json["apps"][0]["costs"]["containerEgressGb"].is_number());
        assert!(json["apps"][0]["categories"]["durableObjects"].is_number());
        assert_eq!(json["platform"], 5.0);
        let total = json["total"].as_f64().unwrap();
        let net = json["netFleetTotal"].as_f64().unwrap();
        assert!((total - net - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_single_app_report() {
        let report = SingleAppReport::new(&range(), &result(&[("solo", 12e6)])).unwrap();
        let json = serde_json::to_value(CostReport::App(report)).unwrap();
        assert_eq!(json["app"], "solo");
        assert!(json.get("apps").is_none());
        assert!((json["netTotal"].as_f64().unwrap() - 0.60).abs() < 1e-9);
    }

    #[test]
    fn test_single_app_report_rejects_fleet() {
        let err = SingleAppReport::new(&range(), &result(&[("a", 1.0), ("b", 1.0)])).unwrap_err();
        assert!(matches!(err, FleetBillError::Internal(_)));
    }

    #[test]
    fn test_categories_sum_to_gross() {
        let fleet = result(&[("a", 20e6)]);
        let report = AppUsageReport::from(&fleet.apps[0]);
        let c = &report.categories;
        assert!((c.workers + c.durable_objects + c.containers - report.gross_total).abs() < 1e-12);
    }
}
