//! Simulated platform for testing
//!
//! Provides a backend with a configurable uniform topology, a handful of CPU
//! and GPU metrics, and failure injection, so the access layer can be tested
//! without real hardware.

use crate::backend::batch::SoftBatch;
use crate::backend::PlatformBackend;
use crate::domain::{
    Aggregation, Behavior, ControlSetting, ControlState, DomainType, FormatPolicy, MetricInfo,
    Request, Topology,
};
use crate::error::{BackendError, ErrorCode, PioError};
use crate::services::DomainRegistry;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Region hash reported by every simulated CPU
pub const SIM_REGION_HASH: f64 = 3_735_928_559.0; // 0xdeadbeef

/// Energy added to each package per read, in joules
const ENERGY_STEP: f64 = 12.5;

fn signal_table() -> Vec<MetricInfo> {
    vec![
        MetricInfo::new("TIME", DomainType::Board, "Time in seconds since the simulation started")
            .with_aggregation(Aggregation::SelectFirst)
            .with_behavior(Behavior::Monotone),
        MetricInfo::new("CPU_ENERGY", DomainType::Package, "Package energy in joules")
            .with_aggregation(Aggregation::Sum)
            .with_behavior(Behavior::Monotone),
        MetricInfo::new("CPU_FREQUENCY_STATUS", DomainType::Cpu, "Current CPU frequency in hertz"),
        MetricInfo::new("CPU_POWER_LIMIT_CONTROL", DomainType::Package, "Package power limit in watts")
            .with_aggregation(Aggregation::Sum),
        MetricInfo::new("CPU_FREQUENCY_MAX_CONTROL", DomainType::Core, "Core frequency limit in hertz")
            .with_aggregation(Aggregation::ExpectSame),
        MetricInfo::new("GPU_POWER_LIMIT_CONTROL", DomainType::Gpu, "GPU power limit in watts")
            .with_aggregation(Aggregation::Sum),
        MetricInfo::new("REGION_HASH", DomainType::Cpu, "Hash of the current region")
            .with_aggregation(Aggregation::RegionHash)
            .with_format(FormatPolicy::Hex)
            .with_behavior(Behavior::Label),
    ]
}

fn control_table() -> Vec<MetricInfo> {
    vec![
        MetricInfo::new("CPU_POWER_LIMIT_CONTROL", DomainType::Package, "Set the package power limit in watts"),
        MetricInfo::new("CPU_FREQUENCY_MAX_CONTROL", DomainType::Core, "Set the core frequency limit in hertz"),
        MetricInfo::new("GPU_POWER_LIMIT_CONTROL", DomainType::Gpu, "Set the GPU power limit in watts"),
        MetricInfo::new(
            "CPU_POWER_TIME_WINDOW",
            DomainType::Package,
            "Set the package power limit time window in seconds",
        ),
    ]
}

fn default_setting(name: &str) -> f64 {
    match name {
        "CPU_POWER_LIMIT_CONTROL" => 150.0,
        "CPU_FREQUENCY_MAX_CONTROL" => 3.0e9,
        "GPU_POWER_LIMIT_CONTROL" => 300.0,
        "CPU_POWER_TIME_WINDOW" => 0.015,
        _ => 0.0,
    }
}

fn to_backend_error(err: PioError) -> BackendError {
    match err {
        PioError::Backend(e) => e,
        other => BackendError::invalid(other.to_string()),
    }
}

/// Simulated compute node
pub struct SimBackend {
    registry: DomainRegistry,
    signals: Vec<MetricInfo>,
    controls: Vec<MetricInfo>,
    settings: BTreeMap<String, Vec<f64>>,
    energy: Vec<f64>,
    start: Instant,
    batch: SoftBatch,
    initialized: bool,
    cache_created: AtomicBool,
    fail_read_batch: bool,
    short_read_batch: bool,
    fail_write_batch: bool,
    fail_write_control: Option<String>,
    fail_save_controls: bool,
    write_count: usize,
}

impl Default for SimBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SimBackend {
    /// Two packages of two cores with two threads each, plus one GPU with
    /// two chips
    pub fn new() -> Self {
        Self::with_topology(Topology::uniform(2, 2, 2).with_gpus(1, 2))
    }

    /// Simulate a node with the given topology
    pub fn with_topology(topology: Topology) -> Self {
        let controls = control_table();
        let settings = controls
            .iter()
            .map(|info| {
                let count = topology.num_domain(info.domain);
                (info.name.clone(), vec![default_setting(&info.name); count])
            })
            .collect();
        let energy = vec![0.0; topology.num_domain(DomainType::Package)];

        Self {
            registry: DomainRegistry::new(topology),
            signals: signal_table(),
            controls,
            settings,
            energy,
            start: Instant::now(),
            batch: SoftBatch::new(),
            initialized: false,
            cache_created: AtomicBool::new(false),
            fail_read_batch: false,
            short_read_batch: false,
            fail_write_batch: false,
            fail_write_control: None,
            fail_save_controls: false,
            write_count: 0,
        }
    }

    /// Make the next batch reads fail
    pub fn set_fail_read_batch(&mut self, fail: bool) {
        self.fail_read_batch = fail;
    }

    /// Make batch reads return one value too few
    pub fn set_short_read_batch(&mut self, short: bool) {
        self.short_read_batch = short;
    }

    /// Make batch writes fail
    pub fn set_fail_write_batch(&mut self, fail: bool) {
        self.fail_write_batch = fail;
    }

    /// Make every write to the named control fail
    pub fn set_fail_write_control(&mut self, name: Option<&str>) {
        self.fail_write_control = name.map(str::to_string);
    }

    /// Make control state saves fail
    pub fn set_fail_save_controls(&mut self, fail: bool) {
        self.fail_save_controls = fail;
    }

    /// Setting of a control at one native-domain instance
    pub fn control_value(&self, name: &str, index: usize) -> Option<f64> {
        self.settings.get(name).and_then(|v| v.get(index)).copied()
    }

    /// Number of signals pushed to the backend since the last reset
    pub fn num_pushed_signals(&self) -> usize {
        self.batch.signals().len()
    }

    /// Number of native control writes performed
    pub fn write_count(&self) -> usize {
        self.write_count
    }

    /// Whether `initialize` has been called
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Whether `create_cache` has been called
    pub fn cache_created(&self) -> bool {
        self.cache_created.load(Ordering::Relaxed)
    }

    fn signal_info_of(&self, name: &str) -> Result<&MetricInfo, BackendError> {
        self.signals
            .iter()
            .find(|info| info.name == name)
            .ok_or_else(|| BackendError::invalid(format!("unknown signal: {}", name)))
    }

    fn control_info_of(&self, name: &str) -> Result<&MetricInfo, BackendError> {
        self.controls
            .iter()
            .find(|info| info.name == name)
            .ok_or_else(|| BackendError::invalid(format!("unknown control: {}", name)))
    }

    /// Native instances covered by a request
    fn native_indices(&self, native: DomainType, request: &Request) -> Result<Vec<usize>, BackendError> {
        let index = i32::try_from(request.index)
            .map_err(|_| BackendError::invalid(format!("domain index out of range: {}", request.index)))?;
        self.registry
            .domain_nested(native, request.domain, index)
            .map_err(to_backend_error)
    }

    fn read_native(&self, name: &str, index: usize) -> f64 {
        match name {
            "TIME" => self.start.elapsed().as_secs_f64(),
            "CPU_ENERGY" => self.energy.get(index).copied().unwrap_or(f64::NAN),
            "CPU_FREQUENCY_STATUS" => self
                .registry
                .topology()
                .cpu_map(DomainType::Core)
                .and_then(|map| map.get(index))
                .and_then(|core| self.control_value("CPU_FREQUENCY_MAX_CONTROL", *core))
                .unwrap_or(f64::NAN),
            "REGION_HASH" => SIM_REGION_HASH,
            other => self.control_value(other, index).unwrap_or(f64::NAN),
        }
    }

    fn tick(&mut self) {
        for energy in &mut self.energy {
            *energy += ENERGY_STEP;
        }
    }
}

impl PlatformBackend for SimBackend {
    fn name(&self) -> &str {
        "sim"
    }

    fn initialize(&mut self) -> Result<(), BackendError> {
        self.initialized = true;
        Ok(())
    }

    fn shutdown(&mut self) {
        self.batch.clear();
        self.initialized = false;
    }

    fn topology(&self) -> Result<Topology, BackendError> {
        Ok(self.registry.topology().clone())
    }

    fn create_cache(&self) -> Result<(), BackendError> {
        self.cache_created.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn signal_names(&self) -> Result<Vec<String>, BackendError> {
        Ok(self.signals.iter().map(|info| info.name.clone()).collect())
    }

    fn control_names(&self) -> Result<Vec<String>, BackendError> {
        Ok(self.controls.iter().map(|info| info.name.clone()).collect())
    }

    fn signal_info(&self, name: &str) -> Result<MetricInfo, BackendError> {
        self.signal_info_of(name).cloned()
    }

    fn control_info(&self, name: &str) -> Result<MetricInfo, BackendError> {
        self.control_info_of(name).cloned()
    }

    fn read_signal(&mut self, request: &Request) -> Result<f64, BackendError> {
        let info = self.signal_info_of(&request.name)?;
        let (native, aggregation) = (info.domain, info.aggregation);
        let indices = self.native_indices(native, request)?;
        self.tick();
        let values: Vec<f64> = indices
            .iter()
            .map(|idx| self.read_native(&request.name, *idx))
            .collect();
        Ok(aggregation.apply(&values))
    }

    fn write_control(&mut self, request: &Request, value: f64) -> Result<(), BackendError> {
        let native = self.control_info_of(&request.name)?.domain;
        if self.fail_write_control.as_deref() == Some(request.name.as_str()) {
            return Err(BackendError::new(
                ErrorCode::MsrWrite,
                format!("simulated write failure for {}", request),
            ));
        }
        let indices = self.native_indices(native, request)?;
        let settings = self
            .settings
            .get_mut(&request.name)
            .ok_or_else(|| BackendError::invalid(format!("unknown control: {}", request.name)))?;
        for idx in indices {
            if let Some(slot) = settings.get_mut(idx) {
                *slot = value;
                self.write_count += 1;
            }
        }
        Ok(())
    }

    fn push_signal(&mut self, request: &Request) -> Result<usize, BackendError> {
        let native = self.signal_info_of(&request.name)?.domain;
        self.native_indices(native, request)?;
        Ok(self.batch.push_signal(request))
    }

    fn push_control(&mut self, request: &Request) -> Result<usize, BackendError> {
        let native = self.control_info_of(&request.name)?.domain;
        self.native_indices(native, request)?;
        Ok(self.batch.push_control(request))
    }

    fn read_batch(&mut self) -> Result<Vec<f64>, BackendError> {
        if self.fail_read_batch {
            return Err(BackendError::new(ErrorCode::MsrRead, "simulated batch read failure"));
        }
        let requests = self.batch.signals().to_vec();
        let mut values = requests
            .iter()
            .map(|req| self.read_signal(req))
            .collect::<Result<Vec<_>, _>>()?;
        if self.short_read_batch {
            values.pop();
        }
        Ok(values)
    }

    fn write_batch(&mut self, settings: &[(usize, f64)]) -> Result<(), BackendError> {
        if self.fail_write_batch {
            return Err(BackendError::new(ErrorCode::MsrWrite, "simulated batch write failure"));
        }
        for (request, value) in self.batch.control_settings(settings)? {
            self.write_control(&request, value)?;
        }
        Ok(())
    }

    fn reset(&mut self) -> Result<(), BackendError> {
        self.batch.clear();
        Ok(())
    }

    fn save_controls(&mut self) -> Result<ControlState, BackendError> {
        if self.fail_save_controls {
            return Err(BackendError::new(ErrorCode::MsrRead, "simulated control save failure"));
        }
        let mut state = ControlState::default();
        for (name, values) in &self.settings {
            let native = self.control_info_of(name)?.domain;
            state.settings.extend(values.iter().enumerate().map(|(index, value)| ControlSetting {
                request: Request::new(name.clone(), native, index),
                value: *value,
            }));
        }
        Ok(state)
    }
}
