//! Pricing module
//!
//! Provides cost estimation over aggregated usage:
//! - PricingTable: static per-dimension quotas and rates
//! - CostCalculator: gross cost ignoring free allowances
//! - FreeTierAllocator: fleet overage and proportional discount allocation

pub mod allocator;
pub mod calculator;
pub mod table;

pub use allocator::{AppUsage, FleetResult, FreeTierAllocator};
pub use calculator::{CostCalculator, GrossCost};
pub use table::{default_rule, PricingRule, PricingTable, PricingTableBuilder, DEFAULT_PLATFORM_FEE};
