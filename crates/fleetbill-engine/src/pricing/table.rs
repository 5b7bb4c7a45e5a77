//! Static pricing table
//!
//! One [`PricingRule`] per [`PricingDimension`] plus a flat platform fee.
//! Defaults follow the Workers Paid plan; rules can be overridden via
//! environment variables or a JSON pricing file.

use fleetbill_common::{FleetBillError, PricingDimension, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

/// Monthly platform subscription fee
pub const DEFAULT_PLATFORM_FEE: f64 = 5.0;

/// Free allowance and marginal price for one dimension
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingRule {
    /// Usage granted free once per account per billing period
    pub included_quota: f64,
    /// Currency per unit of usage
    pub marginal_rate: f64,
}

impl PricingRule {
    pub const fn new(included_quota: f64, marginal_rate: f64) -> Self {
        Self {
            included_quota,
            marginal_rate,
        }
    }

    /// Cost ignoring the free allowance
    pub fn gross_cost(&self, usage: f64) -> f64 {
        usage * self.marginal_rate
    }

    /// Usage beyond the free allowance
    pub fn overage(&self, usage: f64) -> f64 {
        (usage - self.included_quota).max(0.0)
    }

    fn validate(&self, dim: PricingDimension) -> Result<()> {
        let ok = |v: f64| v.is_finite() && v >= 0.0;
        if !ok(self.included_quota) || !ok(self.marginal_rate) {
            return Err(FleetBillError::Config(format!(
                "pricing rule for {} must be non-negative: included={}, rate={}",
                dim, self.included_quota, self.marginal_rate
            )));
        }
        Ok(())
    }
}

/// Default rule for each dimension
pub fn default_rule(dim: PricingDimension) -> PricingRule {
    match dim {
        PricingDimension::WorkerRequests => PricingRule::new(10_000_000.0, 0.30 / 1_000_000.0),
        PricingDimension::WorkerCpuMs => PricingRule::new(30_000_000.0, 0.02 / 1_000_000.0),
        PricingDimension::DoRequests => PricingRule::new(1_000_000.0, 0.15 / 1_000_000.0),
        PricingDimension::DoGbSeconds => PricingRule::new(400_000.0, 12.50 / 1_000_000.0),
        // 375 vCPU-minutes
        PricingDimension::ContainerVcpuSec => PricingRule::new(375.0 * 60.0, 0.000020),
        // 25 GiB-hours
        PricingDimension::ContainerMemGibSec => PricingRule::new(25.0 * 3600.0, 0.0000025),
        // 200 GB-hours
        PricingDimension::ContainerDiskGbSec => PricingRule::new(200.0 * 3600.0, 0.00000007),
        PricingDimension::ContainerEgressGb => PricingRule::new(0.0, 0.025),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PricingTable {
    rules: [PricingRule; PricingDimension::COUNT],
    platform_fee: f64,
}

impl PricingTable {
    pub fn builder() -> PricingTableBuilder {
        PricingTableBuilder::new()
    }

    pub fn rule(&self, dim: PricingDimension) -> &PricingRule {
        &self.rules[dim.index()]
    }

    pub fn platform_fee(&self) -> f64 {
        self.platform_fee
    }

    /// Rules in canonical dimension order
    pub fn iter(&self) -> impl Iterator<Item = (PricingDimension, &PricingRule)> + '_ {
        PricingDimension::ALL
            .into_iter()
            .map(move |d| (d, &self.rules[d.index()]))
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        Self {
            rules: PricingDimension::ALL.map(default_rule),
            platform_fee: DEFAULT_PLATFORM_FEE,
        }
    }
}

/// Partial rule as found in a pricing file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RuleOverride {
    included_quota: Option<f64>,
    marginal_rate: Option<f64>,
}

/// Pricing file layout
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PricingFile {
    #[serde(default)]
    rules: HashMap<PricingDimension, RuleOverride>,
    platform_fee: Option<f64>,
}

/// Builder starting from the default table
#[derive(Debug, Clone)]
pub struct PricingTableBuilder {
    rules: [PricingRule; PricingDimension::COUNT],
    platform_fee: f64,
}

impl Default for PricingTableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PricingTableBuilder {
    pub fn new() -> Self {
        let defaults = PricingTable::default();
        Self {
            rules: defaults.rules,
            platform_fee: defaults.platform_fee,
        }
    }

    /// Every rule free of charge with no allowance; useful as a blank slate
    pub fn zeroed() -> Self {
        Self {
            rules: [PricingRule::new(0.0, 0.0); PricingDimension::COUNT],
            platform_fee: 0.0,
        }
    }

    pub fn rule(mut self, dim: PricingDimension, rule: PricingRule) -> Self {
        self.rules[dim.index()] = rule;
        self
    }

    pub fn rate(mut self, dim: PricingDimension, marginal_rate: f64) -> Self {
        self.rules[dim.index()].marginal_rate = marginal_rate;
        self
    }

    pub fn included(mut self, dim: PricingDimension, included_quota: f64) -> Self {
        self.rules[dim.index()].included_quota = included_quota;
        self
    }

    pub fn platform_fee(mut self, fee: f64) -> Self {
        self.platform_fee = fee;
        self
    }

    /// Apply `FLEETBILL_PRICING_<DIM>_RATE`, `FLEETBILL_PRICING_<DIM>_INCLUDED`
    /// and `FLEETBILL_PLATFORM_FEE` from the process environment
    pub fn from_env(self) -> Self {
        self.from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Self::from_env`] with an explicit variable lookup
    pub fn from_lookup(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let parse = |key: String| -> Option<f64> {
            let raw = lookup(&key)?;
            match raw.trim().parse::<f64>() {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!(key = %key, value = %raw, "Ignoring unparsable pricing override");
                    None
                }
            }
        };

        for dim in PricingDimension::ALL {
            if let Some(rate) = parse(format!("FLEETBILL_PRICING_{}_RATE", dim.env_key())) {
                debug!(dimension = %dim, rate, "Pricing rate override");
                self.rules[dim.index()].marginal_rate = rate;
            }
            if let Some(included) = parse(format!("FLEETBILL_PRICING_{}_INCLUDED", dim.env_key())) {
                debug!(dimension = %dim, included, "Pricing quota override");
                self.rules[dim.index()].included_quota = included;
            }
        }
        if let Some(fee) = parse("FLEETBILL_PLATFORM_FEE".to_string()) {
            self.platform_fee = fee;
        }
        self
    }

    /// Apply overrides from a JSON pricing file
    pub fn from_file(self, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            FleetBillError::Config(format!(
                "Failed to read pricing file {}: {}",
                path.display(),
                e
            ))
        })?;
        self.from_json(&content)
    }

    /// Apply overrides from a JSON document
    pub fn from_json(mut self, content: &str) -> Result<Self> {
        let file: PricingFile = serde_json::from_str(content)
            .map_err(|e| FleetBillError::Config(format!("Failed to parse pricing JSON: {}", e)))?;

        for (dim, rule) in file.rules {
            let slot = &mut self.rules[dim.index()];
            if let Some(included) = rule.included_quota {
                slot.included_quota = included;
            }
            if let Some(rate) = rule.marginal_rate {
                slot.marginal_rate = rate;
            }
        }
        if let Some(fee) = file.platform_fee {
            self.platform_fee = fee;
        }
        Ok(self)
    }

    pub fn build(self) -> Result<PricingTable> {
        for dim in PricingDimension::ALL {
            self.rules[dim.index()].validate(dim)?;
        }
        if !self.platform_fee.is_finite() || self.platform_fee < 0.0 {
            return Err(FleetBillError::Config(format!(
                "platform fee must be non-negative, got {}",
                self.platform_fee
            )));
        }
        Ok(PricingTable {
            rules: self.rules,
            platform_fee: self.platform_fee,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table() {
        let table = PricingTable::default();
        let rule = table.rule(PricingDimension::WorkerRequests);
        assert_eq!(rule.included_quota, 10_000_000.0);
        assert!((rule.marginal_rate - 0.30e-6).abs() < 1e-18);
        assert_eq!(table.rule(PricingDimension::ContainerVcpuSec).included_quota, 22_500.0);
        assert_eq!(table.platform_fee(), 5.0);
    }

    #[test]
    fn test_rule_overage() {
        let rule = PricingRule::new(100.0, 2.0);
        assert_eq!(rule.overage(40.0), 0.0);
        assert_eq!(rule.overage(150.0), 50.0);
        assert_eq!(rule.gross_cost(150.0), 300.0);
    }

    #[test]
    fn test_builder_overrides() {
        let table = PricingTable::builder()
            .rate(PricingDimension::ContainerEgressGb, 0.05)
            .included(PricingDimension::ContainerEgressGb, 10.0)
            .platform_fee(0.0)
            .build()
            .unwrap();
        let rule = table.rule(PricingDimension::ContainerEgressGb);
        assert_eq!(rule.marginal_rate, 0.05);
        assert_eq!(rule.included_quota, 10.0);
        assert_eq!(table.platform_fee(), 0.0);
    }

    #[test]
    fn test_builder_rejects_negative_rate() {
        let result = PricingTable::builder()
            .rate(PricingDimension::DoRequests, -1.0)
            .build();
        assert!(matches!(result, Err(FleetBillError::Config(_))));
    }

    #[test]
    fn test_lookup_overrides() {
        let vars: HashMap<&str, &str> = [
            ("FLEETBILL_PRICING_DO_GB_SECONDS_RATE", "0.00002"),
            ("FLEETBILL_PRICING_DO_GB_SECONDS_INCLUDED", "1000"),
            ("FLEETBILL_PRICING_WORKER_REQUESTS_RATE", "not-a-number"),
            ("FLEETBILL_PLATFORM_FEE", "7.5"),
        ]
        .into_iter()
        .collect();

        let table = PricingTableBuilder::new()
            .from_lookup(|k| vars.get(k).map(|v| v.to_string()))
            .build()
            .unwrap();

        let rule = table.rule(PricingDimension::DoGbSeconds);
        assert_eq!(rule.marginal_rate, 0.00002);
        assert_eq!(rule.included_quota, 1000.0);
        assert_eq!(
            table.rule(PricingDimension::WorkerRequests),
            &default_rule(PricingDimension::WorkerRequests)
        );
        assert_eq!(table.platform_fee(), 7.5);
    }

    #[test]
    fn test_json_overrides() {
        let table = PricingTableBuilder::new()
            .from_json(
                r#"{
                    "rules": { "workerCpuMs": { "marginalRate": 0.00000003 } },
                    "platformFee": 0
                }"#,
            )
            .unwrap()
            .build()
            .unwrap();
        let rule = table.rule(PricingDimension::WorkerCpuMs);
        assert_eq!(rule.marginal_rate, 0.00000003);
        assert_eq!(rule.included_quota, 30_000_000.0);
        assert_eq!(table.platform_fee(), 0.0);
    }

    #[test]
    fn test_json_rejects_unknown_dimension() {
        let result = PricingTableBuilder::new().from_json(r#"{"rules": {"gpuHours": {}}}"#);
        assert!(matches!(result, Err(FleetBillError::Config(_))));
    }
}
