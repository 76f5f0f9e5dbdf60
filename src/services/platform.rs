//! Platform access facade
//!
//! One value owning a backend, the topology and metric catalogs built from
//! it, a batch session and a control state stack. Every operation takes
//! `&self`, so a `Platform` can be shared between threads.

use crate::backend::PlatformBackend;
use crate::domain::{DomainRef, DomainType, MetricInfo, MetricKind, Request};
use crate::error::PioResult;
use crate::services::batch::{BatchEngine, BatchState, ControlHandle, SignalHandle};
use crate::services::catalog::check_name;
use crate::services::{ControlStack, DomainRegistry, MetricCatalog};

use log::info;
use parking_lot::{Mutex, MutexGuard};

/// Platform telemetry and control access
///
/// Lock order is session (batch engine or control stack) first, backend
/// second; the engine and the stack are never held together.
pub struct Platform<B: PlatformBackend> {
    registry: DomainRegistry,
    catalog: MetricCatalog,
    batch: Mutex<BatchEngine>,
    controls: Mutex<ControlStack>,
    backend: Mutex<B>,
}

impl<B: PlatformBackend> Platform<B> {
    /// Initialize the backend and load its topology and metric catalog
    pub fn new(mut backend: B) -> PioResult<Self> {
        backend.initialize()?;
        let registry = DomainRegistry::new(backend.topology()?);
        let catalog = MetricCatalog::from_backend(&backend)?;
        info!(
            "Platform backend {} ready: {} signals, {} controls, {} CPUs",
            backend.name(),
            catalog.signal_names().len(),
            catalog.control_names().len(),
            registry.topology().num_cpu()
        );
        Ok(Self {
            registry,
            catalog,
            batch: Mutex::new(BatchEngine::new()),
            controls: Mutex::new(ControlStack::new()),
            backend: Mutex::new(backend),
        })
    }

    /// Topology queries
    pub fn registry(&self) -> &DomainRegistry {
        &self.registry
    }

    /// Signal and control descriptions
    pub fn catalog(&self) -> &MetricCatalog {
        &self.catalog
    }

    /// Locked access to the backend
    pub fn backend(&self) -> MutexGuard<'_, B> {
        self.backend.lock()
    }

    /// Validate a name, a domain and an index into a request
    fn request(&self, kind: MetricKind, name: &str, domain: DomainRef, index: i32) -> PioResult<Request> {
        check_name(name)?;
        let domain = self.registry.domain_type(domain)?;
        self.catalog.info(kind, name)?;
        let descriptor = self.registry.validate(domain, index)?;
        Ok(Request::new(name, descriptor.domain, descriptor.index))
    }

    // Topology

    pub fn num_domain(&self, domain: impl Into<DomainRef>) -> PioResult<usize> {
        self.registry.num_domain(domain)
    }

    pub fn domain_type(&self, domain: impl Into<DomainRef>) -> PioResult<DomainType> {
        self.registry.domain_type(domain)
    }

    pub fn domain_name(&self, domain: impl Into<DomainRef>) -> PioResult<&'static str> {
        self.registry.domain_name(domain)
    }

    pub fn domain_idx(&self, domain: impl Into<DomainRef>, cpu_idx: i32) -> PioResult<usize> {
        self.registry.domain_idx(domain, cpu_idx)
    }

    pub fn domain_nested(
        &self,
        inner: impl Into<DomainRef>,
        outer: impl Into<DomainRef>,
        outer_idx: i32,
    ) -> PioResult<Vec<usize>> {
        self.registry.domain_nested(inner, outer, outer_idx)
    }

    /// Write the backend's topology cache
    pub fn create_cache(&self) -> PioResult<()> {
        self.backend.lock().create_cache()?;
        info!("Topology cache created");
        Ok(())
    }

    // Catalog

    pub fn signal_names(&self) -> Vec<String> {
        self.catalog.signal_names()
    }

    pub fn control_names(&self) -> Vec<String> {
        self.catalog.control_names()
    }

    pub fn signal_info(&self, name: &str) -> PioResult<&MetricInfo> {
        self.catalog.signal_info(name)
    }

    pub fn control_info(&self, name: &str) -> PioResult<&MetricInfo> {
        self.catalog.control_info(name)
    }

    pub fn native_domain(&self, kind: MetricKind, name: &str) -> PioResult<DomainType> {
        self.catalog.native_domain(kind, name)
    }

    pub fn signal_description(&self, name: &str) -> PioResult<&str> {
        self.catalog.signal_description(name)
    }

    pub fn control_description(&self, name: &str) -> PioResult<&str> {
        self.catalog.control_description(name)
    }

    /// Render a value with the format policy of the named signal
    pub fn format_signal(&self, name: &str, value: f64) -> PioResult<String> {
        Ok(self.catalog.signal_info(name)?.format.format(value))
    }

    // One-shot access

    /// Read a signal immediately, outside the batch session
    pub fn read_signal(&self, name: &str, domain: impl Into<DomainRef>, index: i32) -> PioResult<f64> {
        let request = self.request(MetricKind::Signal, name, domain.into(), index)?;
        Ok(self.backend.lock().read_signal(&request)?)
    }

    /// Write a control immediately, outside the batch session
    pub fn write_control(
        &self,
        name: &str,
        domain: impl Into<DomainRef>,
        index: i32,
        value: f64,
    ) -> PioResult<()> {
        let request = self.request(MetricKind::Control, name, domain.into(), index)?;
        Ok(self.backend.lock().write_control(&request, value)?)
    }

    // Batch session

    /// Register a signal for batch reads
    pub fn push_signal(&self, name: &str, domain: impl Into<DomainRef>, index: i32) -> PioResult<SignalHandle> {
        let request = self.request(MetricKind::Signal, name, domain.into(), index)?;
        let mut batch = self.batch.lock();
        batch.push_signal(&mut *self.backend.lock(), request)
    }

    /// Register a control for batch writes
    pub fn push_control(&self, name: &str, domain: impl Into<DomainRef>, index: i32) -> PioResult<ControlHandle> {
        let request = self.request(MetricKind::Control, name, domain.into(), index)?;
        let mut batch = self.batch.lock();
        batch.push_control(&mut *self.backend.lock(), request)
    }

    /// Read every pushed signal
    pub fn read_batch(&self) -> PioResult<()> {
        let mut batch = self.batch.lock();
        batch.read_batch(&mut *self.backend.lock())
    }

    /// Commit every staged control adjustment
    pub fn write_batch(&self) -> PioResult<()> {
        let mut batch = self.batch.lock();
        batch.write_batch(&mut *self.backend.lock())
    }

    /// Value of a pushed signal from the latest batch read
    pub fn sample(&self, handle: SignalHandle) -> PioResult<f64> {
        self.batch.lock().sample(handle)
    }

    /// Stage a control value for the next batch write
    pub fn adjust(&self, handle: ControlHandle, value: f64) -> PioResult<()> {
        self.batch.lock().adjust(handle, value)
    }

    /// Current batch session state
    pub fn batch_state(&self) -> BatchState {
        self.batch.lock().state()
    }

    /// Drop every handle and start a new batch session
    pub fn reset(&self) -> PioResult<()> {
        let mut batch = self.batch.lock();
        batch.reset(&mut *self.backend.lock())
    }

    // Control state

    /// Push a snapshot of every control setting
    pub fn save_controls(&self) -> PioResult<()> {
        let mut stack = self.controls.lock();
        stack.save(&mut *self.backend.lock())
    }

    /// Restore the most recently saved control settings
    pub fn restore_controls(&self) -> PioResult<()> {
        let mut stack = self.controls.lock();
        stack.restore(&mut *self.backend.lock())
    }

    /// Number of saved control snapshots
    pub fn saved_depth(&self) -> usize {
        self.controls.lock().depth()
    }

    /// Region hash of a name
    pub fn hash_str(&self, key: &str) -> PioResult<u32> {
        Ok(self.backend.lock().hash_str(key)?)
    }

    /// Drop the batch session and shut the backend down
    pub fn shutdown(self) -> B {
        let Self { backend, .. } = self;
        let mut backend = backend.into_inner();
        backend.shutdown();
        info!("Platform backend {} shut down", backend.name());
        backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{format_signal, FormatPolicy};
    use crate::error::{ErrorCode, PioError};
    use crate::mock::SimBackend;
    use std::sync::Arc;
    use std::thread;

    fn platform() -> Platform<SimBackend> {
        Platform::new(SimBackend::new()).unwrap()
    }

    #[test]
    fn test_new_initializes_backend() {
        let platform = platform();
        assert!(platform.backend().is_initialized());
        assert_eq!(platform.num_domain("board").unwrap(), 1);
    }

    #[test]
    fn test_every_domain_has_a_count() {
        let platform = platform();
        for domain in DomainType::ALL {
            let count = platform.num_domain(domain).unwrap();
            if domain == DomainType::Board {
                assert_eq!(count, 1);
            }
        }
    }

    #[test]
    fn test_time_batch_read() {
        let platform = platform();
        let handle = platform.push_signal("TIME", "board", 0).unwrap();
        assert_eq!(platform.sample(handle), Err(PioError::StaleHandle(0)));
        platform.read_batch().unwrap();
        let time = platform.sample(handle).unwrap();
        assert!(time >= 0.0);
        assert_eq!(format_signal(3.0, FormatPolicy::Integer), "3");
        assert_eq!(format_signal(255.0, FormatPolicy::Hex), "0xff");
    }

    #[test]
    fn test_push_validation() {
        let platform = platform();
        assert!(matches!(
            platform.push_signal("TIME", "socket", 0),
            Err(PioError::InvalidDomain(_))
        ));
        assert!(matches!(
            platform.push_signal("NOT_A_SIGNAL", "board", 0),
            Err(PioError::UnknownMetric { kind: MetricKind::Signal, .. })
        ));
        assert!(matches!(
            platform.push_signal("CPU_ENERGY", "package", 2),
            Err(PioError::InvalidDomain(_))
        ));
        assert!(matches!(
            platform.push_control("CPU_ENERGY", "package", 0),
            Err(PioError::UnknownMetric { kind: MetricKind::Control, .. })
        ));
        assert!(matches!(
            platform.push_signal(&"A".repeat(300), "board", 0),
            Err(PioError::TooLong { .. })
        ));
        // Validation failures never reach the backend
        assert_eq!(platform.backend().num_pushed_signals(), 0);
    }

    #[test]
    fn test_backend_refusal_surfaces() {
        let platform = platform();
        assert!(matches!(
            platform.push_signal("CPU_ENERGY", "cpu", 0),
            Err(PioError::Backend(_))
        ));
    }

    #[test]
    fn test_native_domain_per_namespace() {
        let platform = platform();
        assert_eq!(
            platform.native_domain(MetricKind::Control, "CPU_FREQUENCY_MAX_CONTROL").unwrap(),
            DomainType::Core
        );
        assert!(platform.native_domain(MetricKind::Signal, "CPU_POWER_TIME_WINDOW").is_err());
    }

    #[test]
    fn test_domain_accepts_index_or_name() {
        let platform = platform();
        let by_name = platform.push_signal("CPU_ENERGY", "package", 1).unwrap();
        let by_index = platform.push_signal("CPU_ENERGY", 1, 1).unwrap();
        let by_type = platform.push_signal("CPU_ENERGY", DomainType::Package, 1).unwrap();
        assert_eq!(by_name, by_index);
        assert_eq!(by_name, by_type);
    }

    #[test]
    fn test_one_shot_access_leaves_session_alone() {
        let platform = platform();
        platform
            .write_control("CPU_POWER_LIMIT_CONTROL", "package", 0, 120.0)
            .unwrap();
        let value = platform
            .read_signal("CPU_POWER_LIMIT_CONTROL", "package", 0)
            .unwrap();
        assert_eq!(value, 120.0);
        assert_eq!(platform.batch_state(), BatchState::Empty);
    }

    #[test]
    fn test_batch_write_applies_adjustments() {
        let platform = platform();
        let gpu = platform.push_control("GPU_POWER_LIMIT_CONTROL", "gpu", 0).unwrap();
        let window = platform.push_control("CPU_POWER_TIME_WINDOW", "board", 0).unwrap();
        platform.adjust(gpu, 250.0).unwrap();
        platform.adjust(window, 0.01).unwrap();
        platform.write_batch().unwrap();

        let backend = platform.backend();
        assert_eq!(backend.control_value("GPU_POWER_LIMIT_CONTROL", 0), Some(250.0));
        assert_eq!(backend.control_value("CPU_POWER_TIME_WINDOW", 1), Some(0.01));
    }

    #[test]
    fn test_reset_invalidates_handles() {
        let platform = platform();
        let handle = platform.push_signal("TIME", "board", 0).unwrap();
        platform.read_batch().unwrap();
        platform.reset().unwrap();
        assert!(matches!(
            platform.sample(handle),
            Err(PioError::InvalidHandle { .. })
        ));
        assert_eq!(platform.batch_state(), BatchState::Empty);
    }

    #[test]
    fn test_save_restore_leaves_controls_unchanged() {
        let platform = platform();
        assert_eq!(platform.restore_controls(), Err(PioError::EmptyStack));

        let before: Vec<f64> = (0..4)
            .map(|core| {
                platform
                    .read_signal("CPU_FREQUENCY_MAX_CONTROL", "core", core)
                    .unwrap()
            })
            .collect();
        platform.save_controls().unwrap();
        platform
            .write_control("CPU_FREQUENCY_MAX_CONTROL", "board", 0, 1.2e9)
            .unwrap();
        platform.restore_controls().unwrap();

        let after: Vec<f64> = (0..4)
            .map(|core| {
                platform
                    .read_signal("CPU_FREQUENCY_MAX_CONTROL", "core", core)
                    .unwrap()
            })
            .collect();
        assert_eq!(before, after);
        assert_eq!(platform.saved_depth(), 0);
    }

    #[test]
    fn test_nested_save_restore_includes_write_only_control() {
        let platform = platform();
        platform
            .write_control("CPU_POWER_TIME_WINDOW", "package", 1, 0.5)
            .unwrap();
        platform.save_controls().unwrap();
        platform
            .write_control("CPU_POWER_TIME_WINDOW", "board", 0, 9.0)
            .unwrap();
        platform.save_controls().unwrap();
        platform
            .write_control("CPU_POWER_TIME_WINDOW", "board", 0, 1.0)
            .unwrap();
        assert_eq!(platform.saved_depth(), 2);

        platform.restore_controls().unwrap();
        assert_eq!(platform.backend().control_value("CPU_POWER_TIME_WINDOW", 1), Some(9.0));
        platform.restore_controls().unwrap();
        assert_eq!(platform.backend().control_value("CPU_POWER_TIME_WINDOW", 0), Some(0.015));
        assert_eq!(platform.backend().control_value("CPU_POWER_TIME_WINDOW", 1), Some(0.5));
        assert_eq!(platform.restore_controls(), Err(PioError::EmptyStack));
    }

    #[test]
    fn test_hash_str_matches_unmarked_sentinel() {
        let platform = platform();
        let hash = platform.hash_str("GEOPM_REGION_HASH_UNMARKED").unwrap();
        assert_eq!(f64::from(hash), crate::domain::REGION_HASH_UNMARKED);
    }

    #[test]
    fn test_domain_idx_on_two_packages() {
        let platform = platform();
        let num_cpu = platform.num_domain("cpu").unwrap() as i32;
        for cpu in 0..num_cpu {
            let pkg = platform.domain_idx("package", cpu).unwrap();
            assert!(pkg < 2);
        }
        let first = platform.domain_idx("package", -1).unwrap_err();
        assert_eq!(first, platform.domain_idx("package", -1).unwrap_err());
        assert!(matches!(
            first,
            PioError::Backend(ref e) if e.code == ErrorCode::Invalid
        ));
    }

    #[test]
    fn test_format_by_signal_policy() {
        let platform = platform();
        let hash = platform.read_signal("REGION_HASH", "board", 0).unwrap();
        assert_eq!(platform.format_signal("REGION_HASH", hash).unwrap(), "0xdeadbeef");
        assert_eq!(platform.format_signal("CPU_ENERGY", 2.5).unwrap(), "2.5");
    }

    #[test]
    fn test_create_cache_passes_through() {
        let platform = platform();
        platform.create_cache().unwrap();
        assert!(platform.backend().cache_created());
    }

    #[test]
    fn test_concurrent_sessions_are_serialized() {
        let platform = Arc::new(platform());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let platform = Arc::clone(&platform);
                thread::spawn(move || {
                    let handle = platform.push_signal("TIME", "board", 0).unwrap();
                    platform.read_batch().unwrap();
                    platform.sample(handle).unwrap()
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap() >= 0.0);
        }
        assert_eq!(platform.backend().num_pushed_signals(), 1);
    }

    #[test]
    fn test_shutdown_returns_backend() {
        let platform = platform();
        let backend = platform.shutdown();
        assert!(!backend.is_initialized());
    }
}
