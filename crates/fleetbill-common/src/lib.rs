//! # FleetBill Common
//!
//! Shared types and errors for the FleetBill usage and cost estimation engine.
//!
//! ## Core Types
//!
//! - [`PricingDimension`]: the eight fixed billable dimensions
//! - [`DimensionVector`]: one amount per dimension ([`UsageVector`], [`CostVector`])
//! - [`DateRange`]: resolved UTC billing window
//! - [`AppTarget`]: an application and its identifier in each metric key space

pub mod error;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{FleetBillError, Result};
pub use types::{
    app::{AppTarget, TargetKeys},
    date_range::{DateRange, ACCEPTED_SELECTORS},
    dimension::{CostVector, DimensionCategory, DimensionVector, PricingDimension, UsageVector},
};

/// FleetBill version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Inbound websocket messages billed as one Durable Object request
pub const DEFAULT_MESSAGES_PER_REQUEST: f64 = 20.0;

/// Fixed memory footprint assumed for an active Durable Object (MiB)
pub const DEFAULT_DO_MEMORY_MIB: f64 = 128.0;

/// Bytes per GiB (memory is billed in binary units)
pub const BYTES_PER_GIB: f64 = 1_073_741_824.0;

/// Bytes per GB (disk and egress are billed in decimal units)
pub const BYTES_PER_GB: f64 = 1_000_000_000.0;

/// Microseconds per second
pub const MICROS_PER_SECOND: f64 = 1_000_000.0;

/// Relative tolerance for comparing allocated totals
pub const ALLOCATION_TOLERANCE: f64 = 1e-6;
