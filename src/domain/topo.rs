//! Topology domain types
//!
//! Domain types, domain references as accepted from callers, and the static
//! topology model a backend reports.

use crate::error::PioError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Number of domain types
pub const NUM_DOMAIN: usize = 11;

/// Hardware domain types, ordered from the whole board down to accelerator chips
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainType {
    Board = 0,
    Package = 1,
    Core = 2,
    Cpu = 3,
    Memory = 4,
    PackageIntegratedMemory = 5,
    Nic = 6,
    PackageIntegratedNic = 7,
    Gpu = 8,
    PackageIntegratedGpu = 9,
    GpuChip = 10,
}

impl DomainType {
    /// Every domain type in enumeration order
    pub const ALL: [DomainType; NUM_DOMAIN] = [
        Self::Board,
        Self::Package,
        Self::Core,
        Self::Cpu,
        Self::Memory,
        Self::PackageIntegratedMemory,
        Self::Nic,
        Self::PackageIntegratedNic,
        Self::Gpu,
        Self::PackageIntegratedGpu,
        Self::GpuChip,
    ];

    /// Canonical domain name
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Board => "board",
            Self::Package => "package",
            Self::Core => "core",
            Self::Cpu => "cpu",
            Self::Memory => "memory",
            Self::PackageIntegratedMemory => "package_integrated_memory",
            Self::Nic => "nic",
            Self::PackageIntegratedNic => "package_integrated_nic",
            Self::Gpu => "gpu",
            Self::PackageIntegratedGpu => "package_integrated_gpu",
            Self::GpuChip => "gpu_chip",
        }
    }

    /// Look up a domain type by canonical name (case-sensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|d| d.name() == name)
    }

    /// Look up a domain type by its enumeration value
    pub fn from_index(index: i32) -> Option<Self> {
        usize::try_from(index)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
    }

    /// Enumeration value of this domain type
    #[inline]
    pub const fn as_index(&self) -> i32 {
        *self as i32
    }
}

impl fmt::Display for DomainType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DomainType {
    type Err = PioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
            .ok_or_else(|| PioError::InvalidDomain(format!("unknown domain name \"{}\"", s)))
    }
}

impl TryFrom<i32> for DomainType {
    type Error = PioError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Self::from_index(value).ok_or_else(|| {
            PioError::InvalidDomain(format!(
                "domain type is out of range: {} (valid range: 0-{})",
                value,
                NUM_DOMAIN - 1
            ))
        })
    }
}

/// A domain as given by a caller: either a name or an enumeration value
///
/// Resolved once into a [`DomainType`]; both forms are validated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DomainRef {
    Named(String),
    Indexed(i32),
}

impl DomainRef {
    /// Resolve to a canonical domain type
    pub fn resolve(&self) -> Result<DomainType, PioError> {
        match self {
            Self::Named(name) => name.parse(),
            Self::Indexed(index) => DomainType::try_from(*index),
        }
    }
}

impl From<&str> for DomainRef {
    fn from(name: &str) -> Self {
        Self::Named(name.to_string())
    }
}

impl From<String> for DomainRef {
    fn from(name: String) -> Self {
        Self::Named(name)
    }
}

impl From<&String> for DomainRef {
    fn from(name: &String) -> Self {
        Self::Named(name.clone())
    }
}

impl From<i32> for DomainRef {
    fn from(index: i32) -> Self {
        Self::Indexed(index)
    }
}

impl From<DomainType> for DomainRef {
    fn from(domain: DomainType) -> Self {
        Self::Indexed(domain.as_index())
    }
}

impl fmt::Display for DomainRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.write_str(name),
            Self::Indexed(index) => write!(f, "{}", index),
        }
    }
}

/// A validated domain instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DomainDescriptor {
    pub domain: DomainType,
    pub index: usize,
}

impl DomainDescriptor {
    /// Create a new descriptor (not validated against a topology)
    pub const fn new(domain: DomainType, index: usize) -> Self {
        Self { domain, index }
    }
}

impl fmt::Display for DomainDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.domain, self.index)
    }
}

/// Inner domain instances contained in each outer domain instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NestedDomains {
    pub inner: DomainType,
    pub outer: DomainType,
    /// `members[outer_idx]` lists the inner indices within that outer instance
    pub members: Vec<Vec<usize>>,
}

/// Static topology model reported by a backend
///
/// Holds the cardinality of every domain type, the CPU-to-instance map for
/// domains that are addressed through logical CPUs, and explicit nesting for
/// domains that are not (e.g. accelerator chips within an accelerator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    counts: BTreeMap<DomainType, usize>,
    #[serde(default)]
    cpu_map: BTreeMap<DomainType, Vec<usize>>,
    #[serde(default)]
    nested: Vec<NestedDomains>,
}

impl Topology {
    /// Create a topology with a single board and nothing else
    pub fn new() -> Self {
        let mut counts = BTreeMap::new();
        counts.insert(DomainType::Board, 1);
        Self {
            counts,
            cpu_map: BTreeMap::new(),
            nested: Vec::new(),
        }
    }

    /// Uniform CPU node: every package has the same number of cores and
    /// every core the same number of hardware threads
    ///
    /// Logical CPUs are numbered thread-major, so CPU `t * num_core + c` is
    /// thread `t` of core `c`. Each package has one memory domain.
    pub fn uniform(packages: usize, cores_per_package: usize, threads_per_core: usize) -> Self {
        let num_core = packages * cores_per_package;
        let num_cpu = num_core * threads_per_core;

        let core_of: Vec<usize> = (0..num_cpu).map(|cpu| cpu % num_core.max(1)).collect();
        let package_of: Vec<usize> = core_of
            .iter()
            .map(|core| core / cores_per_package.max(1))
            .collect();

        Self::new()
            .with_cpu_map(DomainType::Board, vec![0; num_cpu])
            .with_count(DomainType::Package, packages)
            .with_cpu_map(DomainType::Package, package_of.clone())
            .with_count(DomainType::Core, num_core)
            .with_cpu_map(DomainType::Core, core_of)
            .with_count(DomainType::Cpu, num_cpu)
            .with_cpu_map(DomainType::Cpu, (0..num_cpu).collect())
            .with_count(DomainType::Memory, packages)
            .with_cpu_map(DomainType::Memory, package_of)
    }

    /// Add discrete accelerators, each with `chips_per_gpu` chips
    pub fn with_gpus(self, gpus: usize, chips_per_gpu: usize) -> Self {
        let members = (0..gpus)
            .map(|gpu| (gpu * chips_per_gpu..(gpu + 1) * chips_per_gpu).collect())
            .collect();
        self.with_count(DomainType::Gpu, gpus)
            .with_count(DomainType::GpuChip, gpus * chips_per_gpu)
            .with_nested(DomainType::GpuChip, DomainType::Gpu, members)
    }

    /// Set the cardinality of a domain type (board stays at one)
    pub fn with_count(mut self, domain: DomainType, count: usize) -> Self {
        if domain != DomainType::Board {
            self.counts.insert(domain, count);
        }
        self
    }

    /// Set the CPU-to-instance map of a domain type
    pub fn with_cpu_map(mut self, domain: DomainType, map: Vec<usize>) -> Self {
        self.cpu_map.insert(domain, map);
        self
    }

    /// Record explicit nesting of `inner` instances within `outer` instances
    pub fn with_nested(mut self, inner: DomainType, outer: DomainType, members: Vec<Vec<usize>>) -> Self {
        self.nested
            .retain(|n| !(n.inner == inner && n.outer == outer));
        self.nested.push(NestedDomains {
            inner,
            outer,
            members,
        });
        self
    }

    /// Cardinality of a domain type (zero when absent)
    pub fn num_domain(&self, domain: DomainType) -> usize {
        if domain == DomainType::Board {
            return 1;
        }
        self.counts.get(&domain).copied().unwrap_or(0)
    }

    /// Number of logical CPUs
    pub fn num_cpu(&self) -> usize {
        self.num_domain(DomainType::Cpu)
    }

    /// CPU-to-instance map, if the domain is addressed through CPUs
    pub fn cpu_map(&self, domain: DomainType) -> Option<&[usize]> {
        self.cpu_map.get(&domain).map(Vec::as_slice)
    }

    /// Explicit nesting lists, if recorded
    pub fn explicit_nested(&self, inner: DomainType, outer: DomainType) -> Option<&[Vec<usize>]> {
        self.nested
            .iter()
            .find(|n| n.inner == inner && n.outer == outer)
            .map(|n| n.members.as_slice())
    }
}

impl Default for Topology {
    fn default() -> Self {
        Self::new()
    }
}
