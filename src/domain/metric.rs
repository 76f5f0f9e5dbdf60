//! Metric domain types
//!
//! Describes signals and controls: native domain, aggregation, display
//! format and behavior class.

use crate::domain::DomainType;
use crate::error::PioError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Region hash reported when nested values disagree
pub const REGION_HASH_UNMARKED: f64 = 2_086_568_038.0; // 0x725e8066
/// Region hint reported when nested values disagree
pub const REGION_HINT_UNKNOWN: f64 = 4_294_967_296.0; // 1 << 32

/// Signals and controls live in separate namespaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Signal,
    Control,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signal => write!(f, "signal"),
            Self::Control => write!(f, "control"),
        }
    }
}

/// How values of nested domains combine into a value for an enclosing domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    Sum = 0,
    Average = 1,
    Median = 2,
    IntegerBitwiseOr = 3,
    LogicalAnd = 4,
    LogicalOr = 5,
    RegionHash = 6,
    RegionHint = 7,
    Min = 8,
    Max = 9,
    Stddev = 10,
    SelectFirst = 11,
    ExpectSame = 12,
}

impl Aggregation {
    /// Map a raw aggregation type from the platform library
    pub fn from_raw(raw: i32) -> Option<Self> {
        let agg = match raw {
            0 => Self::Sum,
            1 => Self::Average,
            2 => Self::Median,
            3 => Self::IntegerBitwiseOr,
            4 => Self::LogicalAnd,
            5 => Self::LogicalOr,
            6 => Self::RegionHash,
            7 => Self::RegionHint,
            8 => Self::Min,
            9 => Self::Max,
            10 => Self::Stddev,
            11 => Self::SelectFirst,
            12 => Self::ExpectSame,
            _ => return None,
        };
        Some(agg)
    }

    /// Short lower-case name
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Average => "average",
            Self::Median => "median",
            Self::IntegerBitwiseOr => "integer_bitwise_or",
            Self::LogicalAnd => "logical_and",
            Self::LogicalOr => "logical_or",
            Self::RegionHash => "region_hash",
            Self::RegionHint => "region_hint",
            Self::Min => "min",
            Self::Max => "max",
            Self::Stddev => "stddev",
            Self::SelectFirst => "select_first",
            Self::ExpectSame => "expect_same",
        }
    }

    /// Combine values of nested domain instances
    ///
    /// An empty input yields the identity for sum and the logical
    /// operations, and NaN for everything else.
    pub fn apply(&self, values: &[f64]) -> f64 {
        match self {
            Self::Sum => values.iter().sum(),
            Self::Average => {
                if values.is_empty() {
                    f64::NAN
                } else {
                    values.iter().sum::<f64>() / values.len() as f64
                }
            }
            Self::Median => {
                if values.is_empty() {
                    return f64::NAN;
                }
                let mut sorted = values.to_vec();
                sorted.sort_by(f64::total_cmp);
                let mid = sorted.len() / 2;
                if sorted.len() % 2 == 0 {
                    (sorted[mid - 1] + sorted[mid]) / 2.0
                } else {
                    sorted[mid]
                }
            }
            Self::IntegerBitwiseOr => values.iter().fold(0u64, |acc, v| acc | (*v as u64)) as f64,
            Self::LogicalAnd => bool_value(values.iter().all(|v| *v != 0.0)),
            Self::LogicalOr => bool_value(values.iter().any(|v| *v != 0.0)),
            Self::RegionHash => same_or(values, REGION_HASH_UNMARKED),
            Self::RegionHint => same_or(values, REGION_HINT_UNKNOWN),
            Self::Min => values.iter().copied().reduce(f64::min).unwrap_or(f64::NAN),
            Self::Max => values.iter().copied().reduce(f64::max).unwrap_or(f64::NAN),
            Self::Stddev => {
                let n = values.len() as f64;
                if values.len() < 2 {
                    return 0.0;
                }
                let sum: f64 = values.iter().sum();
                let sum_sq: f64 = values.iter().map(|v| v * v).sum();
                ((sum_sq - sum * sum / n) / (n - 1.0)).max(0.0).sqrt()
            }
            Self::SelectFirst => values.first().copied().unwrap_or(f64::NAN),
            Self::ExpectSame => same_or(values, f64::NAN),
        }
    }
}

fn bool_value(flag: bool) -> f64 {
    if flag {
        1.0
    } else {
        0.0
    }
}

fn same_or(values: &[f64], fallback: f64) -> f64 {
    match values.split_first() {
        Some((first, rest)) if rest.iter().all(|v| v == first) => *first,
        _ => fallback,
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a signal value is rendered as text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatPolicy {
    Double = 0,
    Integer = 1,
    Hex = 2,
    Raw64 = 3,
}

impl TryFrom<i32> for FormatPolicy {
    type Error = PioError;

    fn try_from(raw: i32) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(Self::Double),
            1 => Ok(Self::Integer),
            2 => Ok(Self::Hex),
            3 => Ok(Self::Raw64),
            other => Err(PioError::UnknownFormat(other)),
        }
    }
}

impl fmt::Display for FormatPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Double => write!(f, "double"),
            Self::Integer => write!(f, "integer"),
            Self::Hex => write!(f, "hex"),
            Self::Raw64 => write!(f, "raw64"),
        }
    }
}

/// How a signal changes over time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Behavior {
    /// Never changes after startup
    Constant = 0,
    /// Never decreases (counters, accumulated energy, time)
    Monotone = 1,
    /// Changes arbitrarily
    Variable = 2,
    /// Encodes a label rather than a quantity
    Label = 3,
}

impl Behavior {
    /// Map a raw behavior type from the platform library
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Self::Constant),
            1 => Some(Self::Monotone),
            2 => Some(Self::Variable),
            3 => Some(Self::Label),
            _ => None,
        }
    }
}

impl fmt::Display for Behavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant => write!(f, "constant"),
            Self::Monotone => write!(f, "monotone"),
            Self::Variable => write!(f, "variable"),
            Self::Label => write!(f, "label"),
        }
    }
}

/// Full description of a signal or control
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricInfo {
    pub name: String,
    /// Finest domain the metric is natively available at
    pub domain: DomainType,
    pub description: String,
    pub aggregation: Aggregation,
    pub format: FormatPolicy,
    pub behavior: Behavior,
}

impl MetricInfo {
    /// Create a metric description with `average`/`double`/`variable` defaults
    pub fn new(name: impl Into<String>, domain: DomainType, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            domain,
            description: description.into(),
            aggregation: Aggregation::Average,
            format: FormatPolicy::Double,
            behavior: Behavior::Variable,
        }
    }

    /// Set the aggregation
    pub fn with_aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = aggregation;
        self
    }

    /// Set the format policy
    pub fn with_format(mut self, format: FormatPolicy) -> Self {
        self.format = format;
        self
    }

    /// Set the behavior class
    pub fn with_behavior(mut self, behavior: Behavior) -> Self {
        self.behavior = behavior;
        self
    }
}
