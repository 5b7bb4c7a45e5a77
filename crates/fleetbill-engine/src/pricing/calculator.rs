//! Gross cost calculation: cost = usage × marginal rate, per dimension
//!
//! Free allowances are ignored here; they are applied fleet-wide by the
//! [`FreeTierAllocator`](super::allocator::FreeTierAllocator).

use super::table::PricingTable;
use fleetbill_common::{CostVector, UsageVector};

/// Gross cost of one usage vector
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrossCost {
    pub costs: CostVector,
    pub total: f64,
}

pub struct CostCalculator<'a> {
    table: &'a PricingTable,
}

impl<'a> CostCalculator<'a> {
    pub fn new(table: &'a PricingTable) -> Self {
        Self { table }
    }

    /// Per-dimension gross cost "as if nothing were free"
    pub fn gross_costs(&self, usage: &UsageVector) -> CostVector {
        usage.map(|dim, amount| self.table.rule(dim).gross_cost(amount))
    }

    pub fn calculate(&self, usage: &UsageVector) -> GrossCost {
        let costs = self.gross_costs(usage);
        GrossCost {
            total: costs.total(),
            costs,
        }
    }
}
