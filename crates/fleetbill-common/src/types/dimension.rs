//! Pricing dimensions and per-dimension vectors
//!
//! Every billable quantity falls into one of eight fixed dimensions. A
//! [`DimensionVector`] always carries a value for each of them, so usage
//! and cost vectors are never partial.

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Index, IndexMut};

/// A billable usage dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PricingDimension {
    /// Worker invocations (requests)
    WorkerRequests,
    /// Worker CPU time (milliseconds)
    WorkerCpuMs,
    /// Billable Durable Object requests
    DoRequests,
    /// Durable Object memory-time (GB-seconds)
    DoGbSeconds,
    /// Container CPU (vCPU-seconds)
    ContainerVcpuSec,
    /// Container allocated memory (GiB-seconds)
    ContainerMemGibSec,
    /// Container allocated disk (GB-seconds)
    ContainerDiskGbSec,
    /// Container network egress (GB)
    ContainerEgressGb,
}

/// Display grouping of dimensions by product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DimensionCategory {
    Workers,
    DurableObjects,
    Containers,
}

impl PricingDimension {
    /// All dimensions in canonical order. Every fleet-wide sum iterates in
    /// this order so repeated runs are bit-reproducible.
    pub const ALL: [PricingDimension; 8] = [
        PricingDimension::WorkerRequests,
        PricingDimension::WorkerCpuMs,
        PricingDimension::DoRequests,
        PricingDimension::DoGbSeconds,
        PricingDimension::ContainerVcpuSec,
        PricingDimension::ContainerMemGibSec,
        PricingDimension::ContainerDiskGbSec,
        PricingDimension::ContainerEgressGb,
    ];

    pub const COUNT: usize = Self::ALL.len();

    /// Position in [`PricingDimension::ALL`]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Wire / JSON name
    pub const fn as_str(self) -> &'static str {
        match self {
            PricingDimension::WorkerRequests => "workerRequests",
            PricingDimension::WorkerCpuMs => "workerCpuMs",
            PricingDimension::DoRequests => "doRequests",
            PricingDimension::DoGbSeconds => "doGbSeconds",
            PricingDimension::ContainerVcpuSec => "containerVcpuSec",
            PricingDimension::ContainerMemGibSec => "containerMemGibSec",
            PricingDimension::ContainerDiskGbSec => "containerDiskGbSec",
            PricingDimension::ContainerEgressGb => "containerEgressGb",
        }
    }

    /// Upper-snake name used for environment variable overrides
    pub const fn env_key(self) -> &'static str {
        match self {
            PricingDimension::WorkerRequests => "WORKER_REQUESTS",
            PricingDimension::WorkerCpuMs => "WORKER_CPU_MS",
            PricingDimension::DoRequests => "DO_REQUESTS",
            PricingDimension::DoGbSeconds => "DO_GB_SECONDS",
            PricingDimension::ContainerVcpuSec => "CONTAINER_VCPU_SEC",
            PricingDimension::ContainerMemGibSec => "CONTAINER_MEM_GIB_SEC",
            PricingDimension::ContainerDiskGbSec => "CONTAINER_DISK_GB_SEC",
            PricingDimension::ContainerEgressGb => "CONTAINER_EGRESS_GB",
        }
    }

    /// Unit the usage amount is expressed in
    pub const fn unit(self) -> &'static str {
        match self {
            PricingDimension::WorkerRequests | PricingDimension::DoRequests => "requests",
            PricingDimension::WorkerCpuMs => "CPU-ms",
            PricingDimension::DoGbSeconds => "GB-s",
            PricingDimension::ContainerVcpuSec => "vCPU-s",
            PricingDimension::ContainerMemGibSec => "GiB-s",
            PricingDimension::ContainerDiskGbSec => "GB-s",
            PricingDimension::ContainerEgressGb => "GB",
        }
    }

    pub const fn category(self) -> DimensionCategory {
        match self {
            PricingDimension::WorkerRequests | PricingDimension::WorkerCpuMs => {
                DimensionCategory::Workers
            }
            PricingDimension::DoRequests | PricingDimension::DoGbSeconds => {
                DimensionCategory::DurableObjects
            }
            PricingDimension::ContainerVcpuSec
            | PricingDimension::ContainerMemGibSec
            | PricingDimension::ContainerDiskGbSec
            | PricingDimension::ContainerEgressGb => DimensionCategory::Containers,
        }
    }

    /// Parse a wire name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.as_str() == name)
    }
}

impl fmt::Display for PricingDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One non-negative amount per [`PricingDimension`]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DimensionVector {
    values: [f64; PricingDimension::COUNT],
}

/// Usage in raw billing units
pub type UsageVector = DimensionVector;

/// Cost in currency per dimension
pub type CostVector = DimensionVector;

impl DimensionVector {
    /// All dimensions zero
    pub const fn zero() -> Self {
        Self {
            values: [0.0; PricingDimension::COUNT],
        }
    }

    pub fn get(&self, dim: PricingDimension) -> f64 {
        self.values[dim.index()]
    }

    pub fn set(&mut self, dim: PricingDimension, value: f64) {
        self.values[dim.index()] = value;
    }

    /// Builder-style setter
    pub fn with(mut self, dim: PricingDimension, value: f64) -> Self {
        self.set(dim, value);
        self
    }

    /// Iterate `(dimension, value)` in canonical order
    pub fn iter(&self) -> impl Iterator<Item = (PricingDimension, f64)> + '_ {
        PricingDimension::ALL
            .into_iter()
            .map(move |d| (d, self.values[d.index()]))
    }

    /// Sum over dimensions in canonical order
    pub fn total(&self) -> f64 {
        self.values.iter().sum()
    }

    /// Sum of the dimensions belonging to `category`
    pub fn category_total(&self, category: DimensionCategory) -> f64 {
        self.iter()
            .filter(|(d, _)| d.category() == category)
            .map(|(_, v)| v)
            .sum()
    }

    /// Element-wise accumulate
    pub fn add_assign(&mut self, other: &DimensionVector) {
        for (slot, v) in self.values.iter_mut().zip(other.values.iter()) {
            *slot += v;
        }
    }

    /// Apply `f` to every dimension
    pub fn map(&self, mut f: impl FnMut(PricingDimension, f64) -> f64) -> Self {
        let mut out = Self::zero();
        for (d, v) in self.iter() {
            out.set(d, f(d, v));
        }
        out
    }

    pub fn is_zero(&self) -> bool {
        self.values.iter().all(|v| *v == 0.0)
    }
}

impl Index<PricingDimension> for DimensionVector {
    type Output = f64;

    fn index(&self, dim: PricingDimension) -> &f64 {
        &self.values[dim.index()]
    }
}

impl IndexMut<PricingDimension> for DimensionVector {
    fn index_mut(&mut self, dim: PricingDimension) -> &mut f64 {
        &mut self.values[dim.index()]
    }
}

impl Serialize for DimensionVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(PricingDimension::COUNT))?;
        for (d, v) in self.iter() {
            map.serialize_entry(d.as_str(), &v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for DimensionVector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct VectorVisitor;

        impl<'de> Visitor<'de> for VectorVisitor {
            type Value = DimensionVector;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of pricing dimension to number")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                // Absent dimensions stay zero
                let mut out = DimensionVector::zero();
                while let Some((dim, value)) = access.next_entry::<PricingDimension, f64>()? {
                    out.set(dim, value);
                }
                Ok(out)
            }
        }

        deserializer.deserialize_map(VectorVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_order_matches_index() {
        for (i, d) in PricingDimension::ALL.iter().enumerate() {
            assert_eq!(d.index(), i);
            assert_eq!(PricingDimension::from_name(d.as_str()), Some(*d));
        }
    }

    #[test]
    fn test_serde_name_matches_as_str() {
        for d in PricingDimension::ALL {
            let json = serde_json::to_string(&d).unwrap();
            assert_eq!(json, format!("\"{}\"", d.as_str()));
        }
    }

    #[test]
    fn test_vector_serializes_every_dimension() {
        let v = DimensionVector::zero().with(PricingDimension::DoRequests, 120.0);
        let json = serde_json::to_value(v).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), 8);
        assert_eq!(obj["doRequests"], 120.0);
        assert_eq!(obj["workerRequests"], 0.0);
    }

    #[test]
    fn test_vector_deserialize_defaults_missing() {
        let v: DimensionVector =
            serde_json::from_str(r#"{"containerEgressGb": 2.5}"#).unwrap();
        assert_eq!(v[PricingDimension::ContainerEgressGb], 2.5);
        assert_eq!(v.total(), 2.5);
    }

    #[test]
    fn test_category_totals() {
        let v = DimensionVector::zero()
            .with(PricingDimension::WorkerRequests, 1.0)
            .with(PricingDimension::WorkerCpuMs, 2.0)
            .with(PricingDimension::DoGbSeconds, 4.0)
            .with(PricingDimension::ContainerEgressGb, 8.0);
        assert_eq!(v.category_total(DimensionCategory::Workers), 3.0);
        assert_eq!(v.category_total(DimensionCategory::DurableObjects), 4.0);
        assert_eq!(v.category_total(DimensionCategory::Containers), 8.0);
    }

    #[test]
    fn test_add_assign() {
        let mut a = DimensionVector::zero().with(PricingDimension::WorkerRequests, 1.0);
        let b = DimensionVector::zero()
            .with(PricingDimension::WorkerRequests, 2.0)
            .with(PricingDimension::DoRequests, 3.0);
        a.add_assign(&b);
        assert_eq!(a[PricingDimension::WorkerRequests], 3.0);
        assert_eq!(a[PricingDimension::DoRequests], 3.0);
    }
}
