//! Trait definitions for platform backends
//!
//! A backend is the opaque layer that actually reads hardware registers and
//! applies settings. These traits abstract over it to enable testing with a
//! simulated node.

use crate::domain::{crc32_str, ControlState, MetricInfo, Request, Topology};
use crate::error::BackendError;

use log::warn;

/// Trait for platform backend operations
///
/// Calls are synchronous. Requests handed to a backend have already been
/// validated against its topology and catalog, so a refusal here means the
/// backend itself cannot serve the request.
pub trait PlatformBackend: Send {
    /// Short backend name for diagnostics
    fn name(&self) -> &str;

    /// Prepare the backend for use
    fn initialize(&mut self) -> Result<(), BackendError> {
        Ok(())
    }

    /// Release backend resources
    fn shutdown(&mut self) {}

    /// Static topology of the node
    fn topology(&self) -> Result<Topology, BackendError>;

    /// Write the topology cache used to speed up later startups
    fn create_cache(&self) -> Result<(), BackendError>;

    /// Names of every readable signal
    fn signal_names(&self) -> Result<Vec<String>, BackendError>;

    /// Names of every writable control
    fn control_names(&self) -> Result<Vec<String>, BackendError>;

    /// Full description of a signal
    fn signal_info(&self, name: &str) -> Result<MetricInfo, BackendError>;

    /// Full description of a control
    fn control_info(&self, name: &str) -> Result<MetricInfo, BackendError>;

    /// Read one signal immediately
    fn read_signal(&mut self, request: &Request) -> Result<f64, BackendError>;

    /// Write one control immediately
    fn write_control(&mut self, request: &Request, value: f64) -> Result<(), BackendError>;

    /// Register a signal for batch reads, returning its batch index
    fn push_signal(&mut self, request: &Request) -> Result<usize, BackendError>;

    /// Register a control for batch writes, returning its batch index
    fn push_control(&mut self, request: &Request) -> Result<usize, BackendError>;

    /// Read every pushed signal
    ///
    /// Values are returned in push order, one per `push_signal` call since
    /// the last reset.
    fn read_batch(&mut self) -> Result<Vec<f64>, BackendError>;

    /// Apply `(batch index, value)` settings to pushed controls
    fn write_batch(&mut self, settings: &[(usize, f64)]) -> Result<(), BackendError>;

    /// Forget every pushed signal and control
    fn reset(&mut self) -> Result<(), BackendError>;

    /// Capture the current value of every control, write-only ones included
    fn save_controls(&mut self) -> Result<ControlState, BackendError>;

    /// Write back a state returned by `save_controls`
    ///
    /// Every setting is attempted even after a failure; the first failure is
    /// returned.
    fn restore_controls(&mut self, state: &ControlState) -> Result<(), BackendError> {
        let mut first_error = None;
        for setting in &state.settings {
            if let Err(e) = self.write_control(&setting.request, setting.value) {
                warn!("Failed to restore {}: {}", setting.request, e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Region hash of a name
    fn hash_str(&self, key: &str) -> Result<u32, BackendError> {
        Ok(crc32_str(key))
    }
}

impl<T: PlatformBackend + ?Sized> PlatformBackend for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn initialize(&mut self) -> Result<(), BackendError> {
        (**self).initialize()
    }

    fn shutdown(&mut self) {
        (**self).shutdown()
    }

    fn topology(&self) -> Result<Topology, BackendError> {
        (**self).topology()
    }

    fn create_cache(&self) -> Result<(), BackendError> {
        (**self).create_cache()
    }

    fn signal_names(&self) -> Result<Vec<String>, BackendError> {
        (**self).signal_names()
    }

    fn control_names(&self) -> Result<Vec<String>, BackendError> {
        (**self).control_names()
    }

    fn signal_info(&self, name: &str) -> Result<MetricInfo, BackendError> {
        (**self).signal_info(name)
    }

    fn control_info(&self, name: &str) -> Result<MetricInfo, BackendError> {
        (**self).control_info(name)
    }

    fn read_signal(&mut self, request: &Request) -> Result<f64, BackendError> {
        (**self).read_signal(request)
    }

    fn write_control(&mut self, request: &Request, value: f64) -> Result<(), BackendError> {
        (**self).write_control(request, value)
    }

    fn push_signal(&mut self, request: &Request) -> Result<usize, BackendError> {
        (**self).push_signal(request)
    }

    fn push_control(&mut self, request: &Request) -> Result<usize, BackendError> {
        (**self).push_control(request)
    }

    fn read_batch(&mut self) -> Result<Vec<f64>, BackendError> {
        (**self).read_batch()
    }

    fn write_batch(&mut self, settings: &[(usize, f64)]) -> Result<(), BackendError> {
        (**self).write_batch(settings)
    }

    fn reset(&mut self) -> Result<(), BackendError> {
        (**self).reset()
    }

    fn save_controls(&mut self) -> Result<ControlState, BackendError> {
        (**self).save_controls()
    }

    fn restore_controls(&mut self, state: &ControlState) -> Result<(), BackendError> {
        (**self).restore_controls(state)
    }

    fn hash_str(&self, key: &str) -> Result<u32, BackendError> {
        (**self).hash_str(key)
    }
}
