//! NVML backend
//!
//! Exposes NVIDIA GPU telemetry and the power limit control through
//! nvml-wrapper. Batches are served in software.

use crate::backend::batch::SoftBatch;
use crate::backend::traits::PlatformBackend;
use crate::domain::{
    Aggregation, Behavior, ControlSetting, ControlState, DomainType, FormatPolicy, MetricInfo, Request,
    Topology,
};
use crate::error::{BackendError, ErrorCode};

use log::{debug, info};
use nvml_wrapper::enum_wrappers::device::{Clock, TemperatureSensor};
use nvml_wrapper::{Device, Nvml};
use std::fs;
use std::path::PathBuf;
use std::time::Instant;

const POWER_LIMIT_CONTROL: &str = "NVML::GPU_POWER_LIMIT_CONTROL";

/// Static description of one GPU signal
struct SignalDef {
    name: &'static str,
    description: &'static str,
    aggregation: Aggregation,
    format: FormatPolicy,
    behavior: Behavior,
}

const fn def(name: &'static str, description: &'static str, aggregation: Aggregation) -> SignalDef {
    SignalDef {
        name,
        description,
        aggregation,
        format: FormatPolicy::Double,
        behavior: Behavior::Variable,
    }
}

const GPU_SIGNALS: &[SignalDef] = &[
    def("NVML::GPU_POWER", "GPU power usage in watts", Aggregation::Sum),
    def("NVML::GPU_TEMPERATURE", "GPU temperature in degrees Celsius", Aggregation::Average),
    def(
        "NVML::GPU_CORE_FREQUENCY_STATUS",
        "Streaming multiprocessor frequency in hertz",
        Aggregation::Average,
    ),
    def("NVML::GPU_UNCORE_FREQUENCY_STATUS", "GPU memory frequency in hertz", Aggregation::Average),
    def(
        "NVML::GPU_UTILIZATION",
        "Fraction of time the GPU operated on a kernel in the last set of driver samples",
        Aggregation::Average,
    ),
    def(
        "NVML::GPU_UNCORE_UTILIZATION",
        "Fraction of time the GPU memory was accessed in the last set of driver samples",
        Aggregation::Average,
    ),
    SignalDef {
        behavior: Behavior::Monotone,
        ..def(
            "NVML::GPU_ENERGY_CONSUMPTION_TOTAL",
            "GPU energy consumption in joules since the driver was loaded",
            Aggregation::Sum,
        )
    },
    def(
        "NVML::GPU_PERFORMANCE_STATE",
        "GPU performance state from 0 (maximum performance) to 15 (minimum), 32 when unknown",
        Aggregation::ExpectSame,
    ),
    SignalDef {
        format: FormatPolicy::Hex,
        ..def(
            "NVML::GPU_CORE_THROTTLE_REASONS",
            "GPU clock throttling reasons bit mask",
            Aggregation::IntegerBitwiseOr,
        )
    },
    def(POWER_LIMIT_CONTROL, "GPU power limit in watts", Aggregation::Sum),
];

/// Convert an NVML error into a backend error
fn convert_error(err: nvml_wrapper::error::NvmlError) -> BackendError {
    use nvml_wrapper::error::NvmlError as NE;
    match err {
        NE::NotSupported => {
            BackendError::not_implemented("Operation not supported by this GPU")
        }
        NE::NoPermission => BackendError::new(ErrorCode::Os(13), "Insufficient permissions"),
        NE::NotFound => BackendError::invalid("GPU not found"),
        NE::GpuLost => BackendError::runtime("GPU has fallen off the bus"),
        NE::InvalidArg => BackendError::invalid("Invalid argument"),
        other => BackendError::runtime(other.to_string()),
    }
}

/// Backend for NVIDIA GPUs
pub struct NvmlBackend {
    nvml: Option<Nvml>,
    cache_path: Option<PathBuf>,
    start: Instant,
    batch: SoftBatch,
}

impl NvmlBackend {
    /// Create an uninitialized backend
    ///
    /// `cache_path` is where the probed topology is cached between runs.
    pub fn new(cache_path: Option<PathBuf>) -> Self {
        Self {
            nvml: None,
            cache_path,
            start: Instant::now(),
            batch: SoftBatch::new(),
        }
    }

    fn nvml(&self) -> Result<&Nvml, BackendError> {
        self.nvml
            .as_ref()
            .ok_or_else(|| BackendError::runtime("NVML is not initialized"))
    }

    fn device(&self, index: usize) -> Result<Device<'_>, BackendError> {
        let index = u32::try_from(index)
            .map_err(|_| BackendError::invalid(format!("GPU index out of range: {}", index)))?;
        self.nvml()?.device_by_index(index).map_err(convert_error)
    }

    fn num_gpu(&self) -> Result<usize, BackendError> {
        Ok(self.nvml()?.device_count().map_err(convert_error)? as usize)
    }

    fn probe_topology(&self) -> Result<Topology, BackendError> {
        let num_cpu = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let num_gpu = self.num_gpu()?;
        Ok(Topology::new()
            .with_cpu_map(DomainType::Board, vec![0; num_cpu])
            .with_count(DomainType::Cpu, num_cpu)
            .with_cpu_map(DomainType::Cpu, (0..num_cpu).collect())
            .with_gpus(num_gpu, 1))
    }

    fn read_gpu(&self, name: &str, gpu: usize) -> Result<f64, BackendError> {
        let device = self.device(gpu)?;
        let value = match name {
            "NVML::GPU_POWER" => device.power_usage().map_err(convert_error)? as f64 / 1000.0,
            "NVML::GPU_TEMPERATURE" => device
                .temperature(TemperatureSensor::Gpu)
                .map_err(convert_error)? as f64,
            "NVML::GPU_CORE_FREQUENCY_STATUS" => {
                device.clock_info(Clock::Graphics).map_err(convert_error)? as f64 * 1e6
            }
            "NVML::GPU_UNCORE_FREQUENCY_STATUS" => {
                device.clock_info(Clock::Memory).map_err(convert_error)? as f64 * 1e6
            }
            "NVML::GPU_UTILIZATION" => {
                device.utilization_rates().map_err(convert_error)?.gpu as f64 / 100.0
            }
            "NVML::GPU_UNCORE_UTILIZATION" => {
                device.utilization_rates().map_err(convert_error)?.memory as f64 / 100.0
            }
            "NVML::GPU_ENERGY_CONSUMPTION_TOTAL" => {
                device.total_energy_consumption().map_err(convert_error)? as f64 / 1000.0
            }
            "NVML::GPU_PERFORMANCE_STATE" => {
                device.performance_state().map_err(convert_error)? as u32 as f64
            }
            "NVML::GPU_CORE_THROTTLE_REASONS" => {
                device.current_throttle_reasons().map_err(convert_error)?.bits() as f64
            }
            POWER_LIMIT_CONTROL => {
                device.power_management_limit().map_err(convert_error)? as f64 / 1000.0
            }
            other => return Err(BackendError::invalid(format!("unknown signal: {}", other))),
        };
        Ok(value)
    }

    fn write_gpu(&self, gpu: usize, watts: f64) -> Result<(), BackendError> {
        if !watts.is_finite() || watts < 0.0 {
            return Err(BackendError::invalid(format!("invalid power limit: {}", watts)));
        }
        let mut device = self.device(gpu)?;
        device
            .set_power_management_limit((watts * 1000.0).round() as u32)
            .map_err(convert_error)
    }

    fn signal_def(name: &str) -> Option<&'static SignalDef> {
        GPU_SIGNALS.iter().find(|d| d.name == name)
    }

    /// Refuse signal requests this backend cannot serve
    fn check_signal(request: &Request) -> Result<Option<&'static SignalDef>, BackendError> {
        if request.name == "TIME" {
            if request.domain != DomainType::Board {
                return Err(BackendError::invalid("TIME is only available at the board domain"));
            }
            return Ok(None);
        }
        let def = Self::signal_def(&request.name)
            .ok_or_else(|| BackendError::invalid(format!("unknown signal: {}", request.name)))?;
        match request.domain {
            DomainType::Gpu | DomainType::Board => Ok(Some(def)),
            other => Err(BackendError::invalid(format!(
                "{} cannot be read at the {} domain",
                request.name, other
            ))),
        }
    }

    /// Refuse control requests this backend cannot serve
    fn check_control(request: &Request) -> Result<(), BackendError> {
        if request.name != POWER_LIMIT_CONTROL {
            return Err(BackendError::invalid(format!("unknown control: {}", request.name)));
        }
        match request.domain {
            DomainType::Gpu | DomainType::Board => Ok(()),
            other => Err(BackendError::invalid(format!(
                "{} cannot be written at the {} domain",
                request.name, other
            ))),
        }
    }
}

impl PlatformBackend for NvmlBackend {
    fn name(&self) -> &str {
        "nvml"
    }

    fn initialize(&mut self) -> Result<(), BackendError> {
        if self.nvml.is_some() {
            return Ok(());
        }
        let nvml = Nvml::init().map_err(|e| match e {
            nvml_wrapper::error::NvmlError::LibloadingError(_) => BackendError::new(
                ErrorCode::PlatformUnsupported,
                "NVML library not found",
            ),
            nvml_wrapper::error::NvmlError::DriverNotLoaded => BackendError::new(
                ErrorCode::PlatformUnsupported,
                "NVIDIA driver not loaded",
            ),
            other => BackendError::runtime(format!("NVML initialization failed: {}", other)),
        })?;
        self.nvml = Some(nvml);
        self.start = Instant::now();
        info!("NVML initialized with {} GPUs", self.num_gpu()?);
        Ok(())
    }

    fn shutdown(&mut self) {
        self.batch.clear();
        // Dropping the handle shuts NVML down
        self.nvml = None;
    }

    fn topology(&self) -> Result<Topology, BackendError> {
        if let Some(path) = &self.cache_path {
            if let Ok(contents) = fs::read_to_string(path) {
                match serde_json::from_str(&contents) {
                    Ok(topo) => {
                        debug!("Loaded topology cache from {}", path.display());
                        return Ok(topo);
                    }
                    Err(e) => debug!("Ignoring unreadable topology cache {}: {}", path.display(), e),
                }
            }
        }
        self.probe_topology()
    }

    fn create_cache(&self) -> Result<(), BackendError> {
        let Some(path) = &self.cache_path else {
            return Err(BackendError::invalid("no topology cache path configured"));
        };
        if path.exists() {
            return Ok(());
        }
        let topo = self.probe_topology()?;
        let json = serde_json::to_string_pretty(&topo)
            .map_err(|e| BackendError::runtime(format!("Failed to serialize topology: {}", e)))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                BackendError::new(
                    ErrorCode::Os(e.raw_os_error().unwrap_or(5)),
                    format!("Failed to create {}: {}", parent.display(), e),
                )
            })?;
        }
        fs::write(path, json).map_err(|e| {
            BackendError::new(
                ErrorCode::Os(e.raw_os_error().unwrap_or(5)),
                format!("Failed to write {}: {}", path.display(), e),
            )
        })?;
        info!("Created topology cache {}", path.display());
        Ok(())
    }

    fn signal_names(&self) -> Result<Vec<String>, BackendError> {
        let mut names: Vec<String> = GPU_SIGNALS.iter().map(|d| d.name.to_string()).collect();
        names.push("TIME".to_string());
        Ok(names)
    }

    fn control_names(&self) -> Result<Vec<String>, BackendError> {
        Ok(vec![POWER_LIMIT_CONTROL.to_string()])
    }

    fn signal_info(&self, name: &str) -> Result<MetricInfo, BackendError> {
        if name == "TIME" {
            return Ok(MetricInfo::new(
                "TIME",
                DomainType::Board,
                "Time in seconds since the backend was initialized",
            )
            .with_aggregation(Aggregation::SelectFirst)
            .with_behavior(Behavior::Monotone));
        }
        let def = Self::signal_def(name)
            .ok_or_else(|| BackendError::invalid(format!("unknown signal: {}", name)))?;
        Ok(MetricInfo::new(def.name, DomainType::Gpu, def.description)
            .with_aggregation(def.aggregation)
            .with_format(def.format)
            .with_behavior(def.behavior))
    }

    fn control_info(&self, name: &str) -> Result<MetricInfo, BackendError> {
        if name != POWER_LIMIT_CONTROL {
            return Err(BackendError::invalid(format!("unknown control: {}", name)));
        }
        Ok(
            MetricInfo::new(name, DomainType::Gpu, "Sets the GPU power limit in watts")
                .with_aggregation(Aggregation::Sum),
        )
    }

    fn read_signal(&mut self, request: &Request) -> Result<f64, BackendError> {
        let Some(def) = Self::check_signal(request)? else {
            return Ok(self.start.elapsed().as_secs_f64());
        };
        if request.domain == DomainType::Gpu {
            return self.read_gpu(&request.name, request.index);
        }
        let values = (0..self.num_gpu()?)
            .map(|gpu| self.read_gpu(&request.name, gpu))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(def.aggregation.apply(&values))
    }

    fn write_control(&mut self, request: &Request, value: f64) -> Result<(), BackendError> {
        Self::check_control(request)?;
        if request.domain == DomainType::Gpu {
            return self.write_gpu(request.index, value);
        }
        for gpu in 0..self.num_gpu()? {
            self.write_gpu(gpu, value)?;
        }
        Ok(())
    }

    fn push_signal(&mut self, request: &Request) -> Result<usize, BackendError> {
        Self::check_signal(request)?;
        Ok(self.batch.push_signal(request))
    }

    fn push_control(&mut self, request: &Request) -> Result<usize, BackendError> {
        Self::check_control(request)?;
        Ok(self.batch.push_control(request))
    }

    fn read_batch(&mut self) -> Result<Vec<f64>, BackendError> {
        let requests = self.batch.signals().to_vec();
        requests.iter().map(|req| self.read_signal(req)).collect()
    }

    fn write_batch(&mut self, settings: &[(usize, f64)]) -> Result<(), BackendError> {
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
        let mut state = ControlState::default();
        for gpu in 0..self.num_gpu()? {
            let value = self.read_gpu(POWER_LIMIT_CONTROL, gpu)?;
            state.settings.push(ControlSetting {
                request: Request::new(POWER_LIMIT_CONTROL, DomainType::Gpu, gpu),
                value,
            });
        }
        debug!("Saved power limits of {} GPUs", state.len());
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_signal_catalog_is_static() {
        let backend = NvmlBackend::new(None);
        let names = backend.signal_names().unwrap();
        assert!(names.iter().any(|n| n == "TIME"));
        assert!(names.iter().all(|n| n == "TIME" || n.starts_with("NVML::")));

        let info = backend.signal_info("NVML::GPU_CORE_THROTTLE_REASONS").unwrap();
        assert_eq!(info.format, FormatPolicy::Hex);
        assert_eq!(info.aggregation, Aggregation::IntegerBitwiseOr);
        assert_eq!(info.domain, DomainType::Gpu);
    }

    #[test]
    fn test_unknown_control_is_rejected() {
        let backend = NvmlBackend::new(None);
        assert!(backend.control_info("NVML::GPU_FAN_SPEED").is_err());
        assert!(backend.control_info(POWER_LIMIT_CONTROL).is_ok());
    }

    #[test]
    fn test_time_without_init() {
        let mut backend = NvmlBackend::new(None);
        let time = backend
            .read_signal(&Request::new("TIME", DomainType::Board, 0))
            .unwrap();
        assert!(time >= 0.0);
        assert!(backend
            .read_signal(&Request::new("TIME", DomainType::Cpu, 0))
            .is_err());
    }

    #[test]
    fn test_push_refuses_unservable_requests() {
        let mut backend = NvmlBackend::new(None);
        assert!(backend.push_signal(&Request::new("TIME", DomainType::Cpu, 0)).is_err());
        assert!(backend
            .push_signal(&Request::new("NVML::GPU_POWER", DomainType::Cpu, 0))
            .is_err());
        assert!(backend
            .push_signal(&Request::new("NVML::GPU_FAN_SPEED", DomainType::Gpu, 0))
            .is_err());
        assert!(backend
            .push_control(&Request::new(POWER_LIMIT_CONTROL, DomainType::Package, 0))
            .is_err());

        // Refused pushes leave the batch usable
        assert_eq!(backend.push_signal(&Request::new("TIME", DomainType::Board, 0)).unwrap(), 0);
        assert_eq!(
            backend
                .push_control(&Request::new(POWER_LIMIT_CONTROL, DomainType::Board, 0))
                .unwrap(),
            0
        );
        let values = backend.read_batch().unwrap();
        assert_eq!(values.len(), 1);
        assert!(values[0] >= 0.0);
    }

    #[test]
    fn test_topology_from_cache() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("topo.json");
        let cached = Topology::new().with_gpus(3, 1);
        fs::write(&path, serde_json::to_string(&cached).unwrap()).unwrap();

        let backend = NvmlBackend::new(Some(path));
        assert_eq!(backend.topology().unwrap(), cached);
    }

    #[test]
    fn test_requires_initialization() {
        let backend = NvmlBackend::new(None);
        let err = backend.topology().unwrap_err();
        assert_eq!(err.code, ErrorCode::Runtime);
    }

    #[test]
    #[ignore = "Requires NVIDIA GPU"]
    fn test_nvml_power_read() {
        let mut backend = NvmlBackend::new(None);
        backend.initialize().unwrap();
        let power = backend
            .read_signal(&Request::new("NVML::GPU_POWER", DomainType::Board, 0))
            .unwrap();
        assert!(power >= 0.0);
    }

    #[test]
    #[ignore = "Requires NVIDIA GPU"]
    fn test_nvml_save_restore_power_limit() {
        let mut backend = NvmlBackend::new(None);
        backend.initialize().unwrap();
        let state = backend.save_controls().unwrap();
        assert_eq!(state.len(), backend.num_gpu().unwrap());
        backend.restore_controls(&state).unwrap();
    }

    #[test]
    #[ignore = "Requires NVIDIA GPU"]
    fn test_nvml_create_cache() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("topo.json");
        let mut backend = NvmlBackend::new(Some(path.clone()));
        backend.initialize().unwrap();
        backend.create_cache().unwrap();
        assert!(path.exists());
    }
}
