//! Metric catalog
//!
//! Every signal and control the backend offers, with its description.
//! Built once at startup and read-only afterwards.

use crate::backend::PlatformBackend;
use crate::domain::{DomainType, MetricInfo, MetricKind, NAME_MAX};
use crate::error::{PioError, PioResult};

use log::warn;
use std::collections::BTreeMap;

/// Reject names that no backend can hold
pub fn check_name(name: &str) -> PioResult<()> {
    if name.len() > NAME_MAX {
        return Err(PioError::TooLong {
            what: format!("name \"{}...\"", name.chars().take(32).collect::<String>()),
            max: NAME_MAX,
        });
    }
    Ok(())
}

/// Signal and control descriptions, keyed by name
#[derive(Debug, Clone, Default)]
pub struct MetricCatalog {
    signals: BTreeMap<String, MetricInfo>,
    controls: BTreeMap<String, MetricInfo>,
}

impl MetricCatalog {
    /// Build a catalog from already collected descriptions
    ///
    /// Duplicate names keep the first description.
    pub fn new(signals: Vec<MetricInfo>, controls: Vec<MetricInfo>) -> Self {
        Self {
            signals: Self::index(MetricKind::Signal, signals),
            controls: Self::index(MetricKind::Control, controls),
        }
    }

    fn index(kind: MetricKind, infos: Vec<MetricInfo>) -> BTreeMap<String, MetricInfo> {
        let mut map = BTreeMap::new();
        for info in infos {
            if map.contains_key(&info.name) {
                warn!("Backend reported {} {} more than once", kind, info.name);
                continue;
            }
            map.insert(info.name.clone(), info);
        }
        map
    }

    /// Query a backend for every signal and control description
    pub fn from_backend<B: PlatformBackend + ?Sized>(backend: &B) -> PioResult<Self> {
        let signals = backend
            .signal_names()?
            .iter()
            .map(|name| backend.signal_info(name))
            .collect::<Result<Vec<_>, _>>()?;
        let controls = backend
            .control_names()?
            .iter()
            .map(|name| backend.control_info(name))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(signals, controls))
    }

    fn table(&self, kind: MetricKind) -> &BTreeMap<String, MetricInfo> {
        match kind {
            MetricKind::Signal => &self.signals,
            MetricKind::Control => &self.controls,
        }
    }

    /// Sorted names of one kind
    pub fn names(&self, kind: MetricKind) -> Vec<String> {
        self.table(kind).keys().cloned().collect()
    }

    /// Sorted signal names
    pub fn signal_names(&self) -> Vec<String> {
        self.names(MetricKind::Signal)
    }

    /// Sorted control names
    pub fn control_names(&self) -> Vec<String> {
        self.names(MetricKind::Control)
    }

    /// Full description of a signal or control
    pub fn info(&self, kind: MetricKind, name: &str) -> PioResult<&MetricInfo> {
        check_name(name)?;
        self.table(kind)
            .get(name)
            .ok_or_else(|| PioError::UnknownMetric {
                kind,
                name: name.to_string(),
            })
    }

    pub fn signal_info(&self, name: &str) -> PioResult<&MetricInfo> {
        self.info(MetricKind::Signal, name)
    }

    pub fn control_info(&self, name: &str) -> PioResult<&MetricInfo> {
        self.info(MetricKind::Control, name)
    }

    /// Finest domain a metric is natively available at
    pub fn native_domain(&self, kind: MetricKind, name: &str) -> PioResult<DomainType> {
        Ok(self.info(kind, name)?.domain)
    }

    pub fn signal_description(&self, name: &str) -> PioResult<&str> {
        Ok(&self.signal_info(name)?.description)
    }

    pub fn control_description(&self, name: &str) -> PioResult<&str> {
        Ok(&self.control_info(name)?.description)
    }
}
