//! Domain registry
//!
//! Resolves domain references and answers cardinality and nesting queries
//! against the topology a backend reported at startup.

use crate::domain::{DomainDescriptor, DomainRef, DomainType, Topology};
use crate::error::{BackendError, PioError, PioResult};

/// Read-only view of the node topology
#[derive(Debug, Clone)]
pub struct DomainRegistry {
    topology: Topology,
}

impl DomainRegistry {
    /// Create a registry over a backend's topology
    pub fn new(topology: Topology) -> Self {
        Self { topology }
    }

    /// The underlying topology
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Resolve a domain name or enumeration value
    pub fn domain_type(&self, domain: impl Into<DomainRef>) -> PioResult<DomainType> {
        domain.into().resolve()
    }

    /// Canonical name of a domain
    pub fn domain_name(&self, domain: impl Into<DomainRef>) -> PioResult<&'static str> {
        Ok(self.domain_type(domain)?.name())
    }

    /// Number of instances of a domain on this node
    pub fn num_domain(&self, domain: impl Into<DomainRef>) -> PioResult<usize> {
        Ok(self.topology.num_domain(self.domain_type(domain)?))
    }

    /// Every domain type with its cardinality
    pub fn domains(&self) -> Vec<(DomainType, usize)> {
        DomainType::ALL
            .iter()
            .map(|d| (*d, self.topology.num_domain(*d)))
            .collect()
    }

    /// Check that `index` names an existing instance of `domain`
    pub fn validate(&self, domain: impl Into<DomainRef>, index: i32) -> PioResult<DomainDescriptor> {
        let domain = self.domain_type(domain)?;
        let count = self.topology.num_domain(domain);
        match usize::try_from(index) {
            Ok(index) if index < count => Ok(DomainDescriptor::new(domain, index)),
            _ => Err(PioError::InvalidDomain(format!(
                "{} index out of range: {} (valid range: 0-{})",
                domain,
                index,
                count as i64 - 1
            ))),
        }
    }

    /// Instance of `domain` that contains logical CPU `cpu_idx`
    pub fn domain_idx(&self, domain: impl Into<DomainRef>, cpu_idx: i32) -> PioResult<usize> {
        let domain = self.domain_type(domain)?;
        let num_cpu = self.topology.num_cpu();
        let cpu = usize::try_from(cpu_idx)
            .ok()
            .filter(|cpu| *cpu < num_cpu)
            .ok_or_else(|| {
                BackendError::invalid(format!(
                    "cpu_idx is out of range: {} (number of CPUs: {})",
                    cpu_idx, num_cpu
                ))
            })?;
        let map = self.topology.cpu_map(domain).ok_or_else(|| {
            BackendError::invalid(format!("{} domain is not addressable by CPU", domain))
        })?;
        map.get(cpu).copied().ok_or_else(|| {
            PioError::from(BackendError::invalid(format!(
                "{} domain has no entry for CPU {}",
                domain, cpu
            )))
        })
    }

    /// Every `inner` instance contained in instance `outer_idx` of `outer`
    ///
    /// The result is sorted and free of duplicates.
    pub fn domain_nested(
        &self,
        inner: impl Into<DomainRef>,
        outer: impl Into<DomainRef>,
        outer_idx: i32,
    ) -> PioResult<Vec<usize>> {
        let inner = self.domain_type(inner)?;
        let outer = self.validate(outer, outer_idx)?;

        if inner == outer.domain {
            return Ok(vec![outer.index]);
        }
        if outer.domain == DomainType::Board {
            return Ok((0..self.topology.num_domain(inner)).collect());
        }
        if let Some(members) = self.topology.explicit_nested(inner, outer.domain) {
            let mut nested = members.get(outer.index).cloned().unwrap_or_default();
            nested.sort_unstable();
            nested.dedup();
            return Ok(nested);
        }

        let not_nested = || {
            PioError::from(BackendError::invalid(format!(
                "{} domain is not nested within {} domain",
                inner, outer.domain
            )))
        };
        if inner == DomainType::Board {
            return Err(not_nested());
        }
        let (Some(inner_map), Some(outer_map)) = (
            self.topology.cpu_map(inner),
            self.topology.cpu_map(outer.domain),
        ) else {
            return Err(not_nested());
        };

        // Each inner instance must sit entirely within one outer instance
        let mut owner: Vec<Option<usize>> = vec![None; self.topology.num_domain(inner)];
        for (inner_idx, outer_of) in inner_map.iter().zip(outer_map) {
            let Some(slot) = owner.get_mut(*inner_idx) else {
                continue;
            };
            match *slot {
                None => *slot = Some(*outer_of),
                Some(existing) if existing != *outer_of => return Err(not_nested()),
                Some(_) => {}
            }
        }

        Ok(owner
            .iter()
            .enumerate()
            .filter(|(_, o)| **o == Some(outer.index))
            .map(|(i, _)| i)
            .collect())
    }
}
