//! Shared free-tier allocation
//!
//! Free allowances are granted once per account, not once per app. The
//! fleet is billed on its combined overage, and the resulting discount
//! (gross − net) is spread over apps in proportion to each app's share of
//! gross cost:
//!
//! ```text
//! discount_app = (G − N) × gross_app / G      (0 when G == 0)
//! net_app      = max(0, gross_app − discount_app)
//! ```
//!
//! This is an order-independent approximation: true attribution of a
//! shared quota would depend on the order in which usage occurred.

use super::calculator::CostCalculator;
use super::table::PricingTable;
use crate::metering::AppMeasurement;
use fleetbill_common::{CostVector, DimensionCategory, UsageVector};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Final cost breakdown for one app
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppUsage {
    pub app_name: String,
    /// Usage in raw billing units
    pub usage: UsageVector,
    /// Gross cost per dimension
    pub gross_costs: CostVector,
    pub gross_total: f64,
    /// Allocated share of the fleet free-tier discount
    pub free_tier_discount: f64,
    pub net_total: f64,
    /// Inbound websocket messages behind `doRequests`
    pub do_inbound_messages: f64,
}

impl AppUsage {
    /// Gross cost of one product category
    pub fn category_cost(&self, category: DimensionCategory) -> f64 {
        self.gross_costs.category_total(category)
    }
}

/// Fleet-wide cost estimate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetResult {
    /// Apps in input order
    pub apps: Vec<AppUsage>,
    /// Combined usage per dimension
    pub fleet_usage: UsageVector,
    /// Combined usage beyond the free allowance
    pub overage: UsageVector,
    /// Cost of the overage per dimension
    pub overage_costs: CostVector,
    pub gross_fleet_total: f64,
    pub free_tier_discount: f64,
    pub net_fleet_total: f64,
    /// Flat fee charged once per fleet
    pub platform_fee: f64,
}

impl FleetResult {
    /// Amount due: net usage cost plus the platform fee
    pub fn grand_total(&self) -> f64 {
        self.net_fleet_total + self.platform_fee
    }

    pub fn app(&self, name: &str) -> Option<&AppUsage> {
        self.apps.iter().find(|a| a.app_name == name)
    }
}

pub struct FreeTierAllocator<'a> {
    table: &'a PricingTable,
}

impl<'a> FreeTierAllocator<'a> {
    pub fn new(table: &'a PricingTable) -> Self {
        Self { table }
    }

    /// Price every app and distribute the shared free tier
    #[instrument(skip_all, fields(apps = measurements.len()))]
    pub fn allocate(&self, measurements: Vec<AppMeasurement>) -> FleetResult {
        let calculator = CostCalculator::new(self.table);

        let mut fleet_usage = UsageVector::zero();
        let mut gross_fleet_total = 0.0;
        let mut priced = Vec::with_capacity(measurements.len());

        for m in measurements {
            let gross = calculator.calculate(&m.usage);
            fleet_usage.add_assign(&m.usage);
            gross_fleet_total += gross.total;
            priced.push((m, gross));
        }

        let overage = fleet_usage.map(|dim, used| self.table.rule(dim).overage(used));
        let overage_costs = calculator.gross_costs(&overage);
        let net_fleet_total = overage_costs.total();
        let free_tier_discount = (gross_fleet_total - net_fleet_total).max(0.0);

        let apps = priced
            .into_iter()
            .map(|(m, gross)| {
                let discount = if gross_fleet_total > 0.0 {
                    (free_tier_discount * (gross.total / gross_fleet_total))
                        .max(0.0)
                        .min(gross.total)
                } else {
                    0.0
                };
                AppUsage {
                    app_name: m.app_name,
                    usage: m.usage,
                    gross_costs: gross.costs,
                    gross_total: gross.total,
                    free_tier_discount: discount,
                    net_total: (gross.total - discount).max(0.0),
                    do_inbound_messages: m.do_inbound_messages,
                }
            })
            .collect::<Vec<_>>();

        debug!(
            gross = gross_fleet_total,
            net = net_fleet_total,
            discount = free_tier_discount,
            "Allocated free tier"
        );

        FleetResult {
            apps,
            fleet_usage,
            overage,
            overage_costs,
            gross_fleet_total,
            free_tier_discount,
            net_fleet_total,
            platform_fee: self.table.platform_fee(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::table::{PricingRule, PricingTableBuilder};
    use fleetbill_common::{PricingDimension, ALLOCATION_TOLERANCE};
    use proptest::prelude::*;

    fn measurement(name: &str, usage: UsageVector) -> AppMeasurement {
        AppMeasurement::new(name, usage)
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() <= ALLOCATION_TOLERANCE * a.abs().max(b.abs()).max(1.0)
    }

    #[test]
    fn test_single_app_worker_overage() {
        let table = PricingTable::default();
        let usage = UsageVector::zero().with(PricingDimension::WorkerRequests, 12_000_000.0);
        let result = FreeTierAllocator::new(&table).allocate(vec![measurement("api", usage)]);

        assert_eq!(result.overage[PricingDimension::WorkerRequests], 2_000_000.0);
        assert!(close(result.overage_costs[PricingDimension::WorkerRequests], 0.60));
        assert!(close(result.net_fleet_total, 0.60));
        assert!(close(result.gross_fleet_total, 3.60));
        assert!(close(result.free_tier_discount, 3.00));

        let app = &result.apps[0];
        assert!(close(app.free_tier_discount, 3.00));
        assert!(close(app.net_total, 0.60));
        assert!(close(result.grand_total(), 5.60));
    }

    #[test]
    fn test_two_apps_discount_follows_gross_share() {
        // vCPU is cheap, egress is expensive: raw-usage share and cost share differ
        let table = PricingTable::default();
        let a = UsageVector::zero().with(PricingDimension::ContainerVcpuSec, 80_000.0);
        let b = UsageVector::zero()
            .with(PricingDimension::ContainerVcpuSec, 20_000.0)
            .with(PricingDimension::ContainerEgressGb, 100.0);

        let result =
            FreeTierAllocator::new(&table).allocate(vec![measurement("a", a), measurement("b", b)]);

        assert_eq!(result.fleet_usage[PricingDimension::ContainerVcpuSec], 100_000.0);
        assert_eq!(result.overage[PricingDimension::ContainerVcpuSec], 77_500.0);

        let gross_a = 80_000.0 * 0.000020;
        let gross_b = 20_000.0 * 0.000020 + 100.0 * 0.025;
        let gross = gross_a + gross_b;
        let net = 77_500.0 * 0.000020 + 100.0 * 0.025;
        let discount = gross - net;

        assert!(close(result.gross_fleet_total, gross));
        assert!(close(result.net_fleet_total, net));
        assert!(close(result.apps[0].free_tier_discount, discount * gross_a / gross));
        assert!(close(result.apps[1].free_tier_discount, discount * gross_b / gross));
        // Not the raw vCPU share (80/20)
        assert!(!close(result.apps[0].free_tier_discount, discount * 0.8));

        let net_sum: f64 = result.apps.iter().map(|a| a.net_total).sum();
        assert!(close(net_sum, result.net_fleet_total));
    }

    #[test]
    fn test_idle_fleet_has_no_discount() {
        let table = PricingTable::default();
        let result = FreeTierAllocator::new(&table).allocate(vec![
            measurement("a", UsageVector::zero()),
            measurement("b", UsageVector::zero()),
        ]);
        assert_eq!(result.gross_fleet_total, 0.0);
        assert_eq!(result.net_fleet_total, 0.0);
        for app in &result.apps {
            assert_eq!(app.free_tier_discount, 0.0);
            assert_eq!(app.net_total, 0.0);
        }
        assert_eq!(result.grand_total(), table.platform_fee());
    }

    #[test]
    fn test_usage_within_free_tier_nets_to_zero() {
        let table = PricingTable::default();
        let usage = UsageVector::zero()
            .with(PricingDimension::WorkerRequests, 1_000_000.0)
            .with(PricingDimension::DoGbSeconds, 1_000.0);
        let result = FreeTierAllocator::new(&table).allocate(vec![measurement("a", usage)]);
        assert!(result.gross_fleet_total > 0.0);
        assert_eq!(result.net_fleet_total, 0.0);
        assert!(close(result.apps[0].free_tier_discount, result.apps[0].gross_total));
        assert_eq!(result.apps[0].net_total, 0.0);
    }

    #[test]
    fn test_empty_fleet() {
        let table = PricingTable::default();
        let result = FreeTierAllocator::new(&table).allocate(Vec::new());
        assert!(result.apps.is_empty());
        assert_eq!(result.net_fleet_total, 0.0);
    }

    #[test]
    fn test_category_cost() {
        let table = PricingTableBuilder::zeroed()
            .rule(PricingDimension::WorkerRequests, PricingRule::new(0.0, 1.0))
            .rule(PricingDimension::DoRequests, PricingRule::new(0.0, 2.0))
            .build()
            .unwrap();
        let usage = UsageVector::zero()
            .with(PricingDimension::WorkerRequests, 3.0)
            .with(PricingDimension::DoRequests, 5.0);
        let result = FreeTierAllocator::new(&table).allocate(vec![measurement("a", usage)]);
        let app = result.app("a").unwrap();
        assert_eq!(app.category_cost(DimensionCategory::Workers), 3.0);
        assert_eq!(app.category_cost(DimensionCategory::DurableObjects), 10.0);
        assert_eq!(app.category_cost(DimensionCategory::Containers), 0.0);
    }

    #[test]
    fn test_allocation_is_reproducible() {
        let table = PricingTable::default();
        let build = || {
            (0..25)
                .map(|i| {
                    let f = i as f64;
                    measurement(
                        &format!("app-{i}"),
                        UsageVector::zero()
                            .with(PricingDimension::WorkerRequests, 1_234_567.0 * f)
                            .with(PricingDimension::ContainerMemGibSec, 3_333.3 * f)
                            .with(PricingDimension::ContainerEgressGb, 0.1 * f),
                    )
                })
                .collect::<Vec<_>>()
        };
        let first = FreeTierAllocator::new(&table).allocate(build());
        let second = FreeTierAllocator::new(&table).allocate(build());
        assert_eq!(first, second);
    }

    fn usage_strategy() -> impl Strategy<Value = UsageVector> {
        prop::array::uniform8(0.0f64..5e7).prop_map(|values| {
            let mut usage = UsageVector::zero();
            for (dim, v) in PricingDimension::ALL.into_iter().zip(values) {
                usage.set(dim, v);
            }
            usage
        })
    }

    proptest! {
        #[test]
        fn prop_discount_bounded_by_gross(usages in prop::collection::vec(usage_strategy(), 1..8)) {
            let table = PricingTable::default();
            let ms = usages
                .into_iter()
                .enumerate()
                .map(|(i, u)| measurement(&format!("app-{i}"), u))
                .collect();
            let result = FreeTierAllocator::new(&table).allocate(ms);
            for app in &result.apps {
                prop_assert!(app.free_tier_discount >= 0.0);
                prop_assert!(app.free_tier_discount <= app.gross_total);
                prop_assert_eq!(app.net_total, (app.gross_total - app.free_tier_discount).max(0.0));
            }
        }

        #[test]
        fn prop_net_totals_sum_to_fleet_net(usages in prop::collection::vec(usage_strategy(), 1..8)) {
            let table = PricingTable::default();
            let ms = usages
                .into_iter()
                .enumerate()
                .map(|(i, u)| measurement(&format!("app-{i}"), u))
                .collect();
            let result = FreeTierAllocator::new(&table).allocate(ms);
            prop_assume!(result.gross_fleet_total > 0.0);
            let net_sum: f64 = result.apps.iter().map(|a| a.net_total).sum();
            let scale = result.gross_fleet_total.max(1.0);
            prop_assert!((net_sum - result.net_fleet_total).abs() <= ALLOCATION_TOLERANCE * scale);
        }

        #[test]
        fn prop_gross_cost_monotone(
            usage in usage_strategy(),
            extra in 0.0f64..1e6,
            idx in 0usize..8,
        ) {
            let table = PricingTable::default();
            let calculator = CostCalculator::new(&table);
            let dim = PricingDimension::ALL[idx];
            let base = calculator.gross_costs(&usage);
            let mut more = usage;
            more[dim] += extra;
            let bumped = calculator.gross_costs(&more);
            prop_assert!(base[dim] >= 0.0);
            prop_assert!(bumped[dim] >= base[dim]);
        }
    }
}
