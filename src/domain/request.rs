//! Access requests and saved control state

use crate::domain::DomainType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Key of a one-shot or batched access: metric name at one domain instance
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Request {
    pub name: String,
    pub domain: DomainType,
    pub index: usize,
}

impl Request {
    /// Create a new request (the domain index is not validated here)
    pub fn new(name: impl Into<String>, domain: DomainType, index: usize) -> Self {
        Self {
            name: name.into(),
            domain,
            index,
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.name, self.domain, self.index)
    }
}

/// One control value captured for later restore
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlSetting {
    pub request: Request,
    pub value: f64,
}

/// Snapshot of every control setting
///
/// A backend that keeps saved values itself returns a `held` state with no
/// settings listed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlState {
    pub settings: Vec<ControlSetting>,
    #[serde(default)]
    pub held: bool,
}

impl ControlState {
    /// State whose values are kept by the backend
    pub fn held() -> Self {
        Self {
            settings: Vec::new(),
            held: true,
        }
    }

    /// Number of captured settings
    pub fn len(&self) -> usize {
        self.settings.len()
    }

    /// Check if nothing was captured
    pub fn is_empty(&self) -> bool {
        self.settings.is_empty()
    }
}
