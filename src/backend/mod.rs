//! Platform backends
//!
//! Each backend owns one source of signals and controls behind the
//! [`PlatformBackend`] trait, so the access layer can be tested against a
//! simulated platform.

pub mod batch;
pub mod geopmd;
pub mod nvml;
pub mod traits;

pub use batch::SoftBatch;
pub use geopmd::{GeopmdBackend, DEFAULT_LIBRARY};
pub use nvml::NvmlBackend;
pub use traits::PlatformBackend;
