//! Service layer for platform access
//!
//! Services hold the topology and catalog queries, the batch session and the
//! control state stack. [`Platform`] ties them to one backend.

pub mod batch;
pub mod catalog;
pub mod control_stack;
pub mod platform;
pub mod registry;

pub use batch::{BatchEngine, BatchState, ControlHandle, SignalHandle};
pub use catalog::{check_name, MetricCatalog};
pub use control_stack::ControlStack;
pub use platform::Platform;
pub use registry::DomainRegistry;
