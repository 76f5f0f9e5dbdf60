//! Domain models for platio
//!
//! Topology, metric descriptions and access requests. Types that come from
//! callers (domain references, raw format values) are validated on
//! conversion.

pub mod format;
pub mod hash;
pub mod metric;
pub mod request;
pub mod topo;

/// Longest accepted signal or control name, in bytes
pub const NAME_MAX: usize = 255;

pub use format::{format_signal, format_signal_raw};
pub use hash::crc32_str;
pub use metric::{
    Aggregation, Behavior, FormatPolicy, MetricInfo, MetricKind, REGION_HASH_UNMARKED,
    REGION_HINT_UNKNOWN,
};
pub use request::{ControlSetting, ControlState, Request};
pub use topo::{DomainDescriptor, DomainRef, DomainType, NestedDomains, Topology, NUM_DOMAIN};
