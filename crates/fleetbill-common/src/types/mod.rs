//! Core data types for FleetBill

pub mod app;
pub mod date_range;
pub mod dimension;
