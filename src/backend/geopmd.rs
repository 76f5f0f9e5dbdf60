//! libgeopmd backend
//!
//! Loads the platform library at runtime and drives its C interface.
//! Every entry point is resolved once at load time so a missing symbol is
//! reported up front rather than on first use.

use crate::backend::traits::PlatformBackend;
use crate::domain::{
    Aggregation, Behavior, ControlState, DomainType, FormatPolicy, MetricInfo, Request, Topology,
    NAME_MAX,
};
use crate::error::{BackendError, ErrorCode};

use libloading::{Library, Symbol};
use log::{debug, info};
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_double, c_int};

/// Default shared object name
pub const DEFAULT_LIBRARY: &str = "libgeopmd.so.2";

const DESCRIPTION_MAX: usize = 1024;
const MESSAGE_MAX: usize = 4096;

type CountFn = unsafe extern "C" fn() -> c_int;
type NameFn = unsafe extern "C" fn(c_int, usize, *mut c_char) -> c_int;
type DomainTypeFn = unsafe extern "C" fn(*const c_char) -> c_int;
type ReadSignalFn = unsafe extern "C" fn(*const c_char, c_int, c_int, *mut c_double) -> c_int;
type WriteControlFn = unsafe extern "C" fn(*const c_char, c_int, c_int, c_double) -> c_int;
type PushFn = unsafe extern "C" fn(*const c_char, c_int, c_int) -> c_int;
type SampleFn = unsafe extern "C" fn(c_int, *mut c_double) -> c_int;
type AdjustFn = unsafe extern "C" fn(c_int, c_double) -> c_int;
type DescriptionFn = unsafe extern "C" fn(*const c_char, usize, *mut c_char) -> c_int;
type SignalInfoFn = unsafe extern "C" fn(*const c_char, *mut c_int, *mut c_int, *mut c_int) -> c_int;
type NumDomainFn = unsafe extern "C" fn(c_int) -> c_int;
type DomainIdxFn = unsafe extern "C" fn(c_int, c_int) -> c_int;
type NumNestedFn = unsafe extern "C" fn(c_int, c_int) -> c_int;
type NestedFn = unsafe extern "C" fn(c_int, c_int, c_int, usize, *mut c_int) -> c_int;
type ErrorMessageFn = unsafe extern "C" fn(c_int, *mut c_char, usize);
type HashFn = unsafe extern "C" fn(*const c_char) -> u64;

/// Entry points of the platform library
struct GeopmApi {
    num_signal_name: CountFn,
    signal_name: NameFn,
    num_control_name: CountFn,
    control_name: NameFn,
    signal_domain_type: DomainTypeFn,
    control_domain_type: DomainTypeFn,
    read_signal: ReadSignalFn,
    write_control: WriteControlFn,
    push_signal: PushFn,
    push_control: PushFn,
    sample: SampleFn,
    adjust: AdjustFn,
    read_batch: CountFn,
    write_batch: CountFn,
    reset: CountFn,
    signal_description: DescriptionFn,
    control_description: DescriptionFn,
    signal_info: SignalInfoFn,
    num_domain: NumDomainFn,
    domain_idx: DomainIdxFn,
    num_domain_nested: NumNestedFn,
    domain_nested: NestedFn,
    create_cache: CountFn,
    save_control: CountFn,
    restore_control: CountFn,
    error_message: ErrorMessageFn,
    crc32_str: HashFn,
    // Keeps the function pointers above valid
    _lib: Library,
}

fn symbol<T: Copy>(lib: &Library, name: &str) -> Result<T, BackendError> {
    let sym: Symbol<T> = unsafe { lib.get(name.as_bytes()) }.map_err(|e| {
        BackendError::new(
            ErrorCode::PlatformUnsupported,
            format!("Function not available: {}: {}", name, e),
        )
    })?;
    Ok(*sym)
}

impl GeopmApi {
    fn load(path: &str) -> Result<Self, BackendError> {
        let lib = unsafe { Library::new(path) }
            .map_err(|e| {
                BackendError::new(
                    ErrorCode::PlatformUnsupported,
                    format!("Failed to load {}: {}", path, e),
                )
            })?;

        Ok(Self {
            num_signal_name: symbol(&lib, "geopm_pio_num_signal_name")?,
            signal_name: symbol(&lib, "geopm_pio_signal_name")?,
            num_control_name: symbol(&lib, "geopm_pio_num_control_name")?,
            control_name: symbol(&lib, "geopm_pio_control_name")?,
            signal_domain_type: symbol(&lib, "geopm_pio_signal_domain_type")?,
            control_domain_type: symbol(&lib, "geopm_pio_control_domain_type")?,
            read_signal: symbol(&lib, "geopm_pio_read_signal")?,
            write_control: symbol(&lib, "geopm_pio_write_control")?,
            push_signal: symbol(&lib, "geopm_pio_push_signal")?,
            push_control: symbol(&lib, "geopm_pio_push_control")?,
            sample: symbol(&lib, "geopm_pio_sample")?,
            adjust: symbol(&lib, "geopm_pio_adjust")?,
            read_batch: symbol(&lib, "geopm_pio_read_batch")?,
            write_batch: symbol(&lib, "geopm_pio_write_batch")?,
            reset: symbol(&lib, "geopm_pio_reset")?,
            signal_description: symbol(&lib, "geopm_pio_signal_description")?,
            control_description: symbol(&lib, "geopm_pio_control_description")?,
            signal_info: symbol(&lib, "geopm_pio_signal_info")?,
            num_domain: symbol(&lib, "geopm_topo_num_domain")?,
            domain_idx: symbol(&lib, "geopm_topo_domain_idx")?,
            num_domain_nested: symbol(&lib, "geopm_topo_num_domain_nested")?,
            domain_nested: symbol(&lib, "geopm_topo_domain_nested")?,
            create_cache: symbol(&lib, "geopm_topo_create_cache")?,
            save_control: symbol(&lib, "geopm_pio_save_control")?,
            restore_control: symbol(&lib, "geopm_pio_restore_control")?,
            error_message: symbol(&lib, "geopm_error_message")?,
            crc32_str: symbol(&lib, "geopm_crc32_str")?,
            _lib: lib,
        })
    }
}

/// Backend driving libgeopmd
pub struct GeopmdBackend {
    api: GeopmApi,
    library: String,
    signal_indices: Vec<c_int>,
    control_indices: Vec<c_int>,
    // The library keeps a single saved control state
    control_saved: bool,
}

impl GeopmdBackend {
    /// Load the default platform library
    pub fn new() -> Result<Self, BackendError> {
        Self::load(DEFAULT_LIBRARY)
    }

    /// Load the platform library from a specific path or soname
    pub fn load(library: &str) -> Result<Self, BackendError> {
        let api = GeopmApi::load(library)?;
        debug!("Resolved platform library entry points from {}", library);
        Ok(Self {
            api,
            library: library.to_string(),
            signal_indices: Vec::new(),
            control_indices: Vec::new(),
            control_saved: false,
        })
    }

    /// Message text for a library return code
    fn error_message(&self, code: c_int) -> String {
        let mut buf = vec![0u8; MESSAGE_MAX];
        unsafe { (self.api.error_message)(code, buf.as_mut_ptr().cast(), buf.len()) };
        match read_buffer(&buf) {
            Ok(text) if !text.is_empty() => text,
            _ => ErrorCode::from_raw(code).message(),
        }
    }

    /// Turn a negative return code into a backend error
    fn check(&self, func: &str, ret: c_int) -> Result<c_int, BackendError> {
        if ret < 0 {
            Err(BackendError::new(
                ErrorCode::from_raw(ret),
                format!("{}() failed: {}", func, self.error_message(ret)),
            ))
        } else {
            Ok(ret)
        }
    }

    fn names(&self, kind: &str, count: CountFn, name: NameFn) -> Result<Vec<String>, BackendError> {
        let num = self.check(&format!("geopm_pio_num_{}_name", kind), unsafe { count() })?;
        let func = format!("geopm_pio_{}_name", kind);
        let mut names = Vec::with_capacity(num as usize);
        for idx in 0..num {
            let mut buf = vec![0u8; NAME_MAX + 1];
            let ret = unsafe { name(idx, buf.len(), buf.as_mut_ptr().cast()) };
            self.check(&func, ret)?;
            names.push(read_buffer(&buf).map_err(|_| too_long(&func))?);
        }
        Ok(names)
    }

    fn describe(&self, func: &str, describe: DescriptionFn, name: &CStr) -> Result<String, BackendError> {
        let mut buf = vec![0u8; DESCRIPTION_MAX];
        let ret = unsafe { describe(name.as_ptr(), buf.len(), buf.as_mut_ptr().cast()) };
        self.check(func, ret)?;
        read_buffer(&buf).map_err(|_| too_long(func))
    }

    fn native_domain(&self, func: &str, domain_type: DomainTypeFn, name: &CStr) -> Result<DomainType, BackendError> {
        let raw = self.check(func, unsafe { domain_type(name.as_ptr()) })?;
        DomainType::from_index(raw)
            .ok_or_else(|| BackendError::invalid(format!("{}() returned unknown domain type {}", func, raw)))
    }

    fn num_domain(&self, domain: DomainType) -> Result<usize, BackendError> {
        let ret = unsafe { (self.api.num_domain)(domain.as_index()) };
        Ok(self.check("geopm_topo_num_domain", ret)? as usize)
    }

    /// CPU map of a domain, or `None` when the domain is not CPU-addressable
    fn probe_cpu_map(&self, domain: DomainType, num_cpu: usize) -> Option<Vec<usize>> {
        (0..num_cpu)
            .map(|cpu| {
                let ret = unsafe { (self.api.domain_idx)(domain.as_index(), cpu as c_int) };
                usize::try_from(ret).ok()
            })
            .collect()
    }

    fn probe_nested(&self, inner: DomainType, outer: DomainType, num_outer: usize) -> Result<Option<Vec<Vec<usize>>>, BackendError> {
        let num_nested = unsafe { (self.api.num_domain_nested)(inner.as_index(), outer.as_index()) };
        if num_nested <= 0 {
            return Ok(None);
        }
        let mut members = Vec::with_capacity(num_outer);
        for outer_idx in 0..num_outer {
            let mut buf: Vec<c_int> = vec![0; num_nested as usize];
            let ret = unsafe {
                (self.api.domain_nested)(
                    inner.as_index(),
                    outer.as_index(),
                    outer_idx as c_int,
                    buf.len(),
                    buf.as_mut_ptr(),
                )
            };
            self.check("geopm_topo_domain_nested", ret)?;
            let mut indices: Vec<usize> = buf.into_iter().filter_map(|i| usize::try_from(i).ok()).collect();
            indices.sort_unstable();
            indices.dedup();
            members.push(indices);
        }
        Ok(Some(members))
    }
}

fn to_cstring(name: &str) -> Result<CString, BackendError> {
    CString::new(name).map_err(|_| BackendError::invalid(format!("name contains a NUL byte: {:?}", name)))
}

fn too_long(func: &str) -> BackendError {
    BackendError::invalid(format!("{}() result exceeds the output buffer", func))
}

/// Read a NUL-terminated string out of an output buffer
///
/// A result that fills the whole buffer may have been truncated and is
/// rejected.
fn read_buffer(buf: &[u8]) -> Result<String, ()> {
    let text = CStr::from_bytes_until_nul(buf).map_err(|_| ())?;
    if text.to_bytes().len() + 1 >= buf.len() {
        return Err(());
    }
    Ok(text.to_string_lossy().into_owned())
}

fn domain_args(request: &Request) -> Result<(CString, c_int, c_int), BackendError> {
    let index = c_int::try_from(request.index)
        .map_err(|_| BackendError::invalid(format!("domain index out of range: {}", request.index)))?;
    Ok((to_cstring(&request.name)?, request.domain.as_index(), index))
}

impl PlatformBackend for GeopmdBackend {
    fn name(&self) -> &str {
        "geopmd"
    }

    fn initialize(&mut self) -> Result<(), BackendError> {
        let num_signal = self.check("geopm_pio_num_signal_name", unsafe { (self.api.num_signal_name)() })?;
        info!(
            "Platform library {} reports {} signals",
            self.library, num_signal
        );
        Ok(())
    }

    fn shutdown(&mut self) {
        if let Err(e) = self.reset() {
            debug!("Batch reset at shutdown failed: {}", e);
        }
    }

    fn topology(&self) -> Result<Topology, BackendError> {
        let mut topo = Topology::new();
        for domain in DomainType::ALL {
            topo = topo.with_count(domain, self.num_domain(domain)?);
        }

        let num_cpu = topo.num_cpu();
        for domain in DomainType::ALL {
            if topo.num_domain(domain) == 0 {
                continue;
            }
            if let Some(map) = self.probe_cpu_map(domain, num_cpu) {
                topo = topo.with_cpu_map(domain, map);
            }
        }

        // Domains without a CPU map are only reachable through explicit nesting
        for inner in DomainType::ALL {
            if topo.num_domain(inner) == 0 || topo.cpu_map(inner).is_some() {
                continue;
            }
            for outer in DomainType::ALL {
                let num_outer = topo.num_domain(outer);
                if outer == inner || outer == DomainType::Board || num_outer == 0 {
                    continue;
                }
                if let Some(members) = self.probe_nested(inner, outer, num_outer)? {
                    topo = topo.with_nested(inner, outer, members);
                }
            }
        }
        Ok(topo)
    }

    fn create_cache(&self) -> Result<(), BackendError> {
        self.check("geopm_topo_create_cache", unsafe { (self.api.create_cache)() })?;
        Ok(())
    }

    fn signal_names(&self) -> Result<Vec<String>, BackendError> {
        self.names("signal", self.api.num_signal_name, self.api.signal_name)
    }

    fn control_names(&self) -> Result<Vec<String>, BackendError> {
        self.names("control", self.api.num_control_name, self.api.control_name)
    }

    fn signal_info(&self, name: &str) -> Result<MetricInfo, BackendError> {
        let c_name = to_cstring(name)?;
        let domain = self.native_domain("geopm_pio_signal_domain_type", self.api.signal_domain_type, &c_name)?;
        let description = self.describe("geopm_pio_signal_description", self.api.signal_description, &c_name)?;

        let (mut agg, mut fmt, mut behavior): (c_int, c_int, c_int) = (0, 0, 0);
        let ret = unsafe { (self.api.signal_info)(c_name.as_ptr(), &mut agg, &mut fmt, &mut behavior) };
        self.check("geopm_pio_signal_info", ret)?;

        let aggregation = Aggregation::from_raw(agg)
            .ok_or_else(|| BackendError::invalid(format!("unknown aggregation type {} for {}", agg, name)))?;
        let format = FormatPolicy::try_from(fmt)
            .map_err(|e| BackendError::invalid(format!("{} for {}", e, name)))?;
        let behavior = Behavior::from_raw(behavior)
            .ok_or_else(|| BackendError::invalid(format!("unknown behavior type {} for {}", behavior, name)))?;

        Ok(MetricInfo::new(name, domain, description)
            .with_aggregation(aggregation)
            .with_format(format)
            .with_behavior(behavior))
    }

    fn control_info(&self, name: &str) -> Result<MetricInfo, BackendError> {
        let c_name = to_cstring(name)?;
        let domain = self.native_domain("geopm_pio_control_domain_type", self.api.control_domain_type, &c_name)?;
        let description = self.describe("geopm_pio_control_description", self.api.control_description, &c_name)?;
        // The library has no aggregation or format query for controls
        Ok(MetricInfo::new(name, domain, description))
    }

    fn read_signal(&mut self, request: &Request) -> Result<f64, BackendError> {
        let (name, domain, index) = domain_args(request)?;
        let mut value: c_double = 0.0;
        let ret = unsafe { (self.api.read_signal)(name.as_ptr(), domain, index, &mut value) };
        self.check("geopm_pio_read_signal", ret)?;
        Ok(value)
    }

    fn write_control(&mut self, request: &Request, value: f64) -> Result<(), BackendError> {
        let (name, domain, index) = domain_args(request)?;
        let ret = unsafe { (self.api.write_control)(name.as_ptr(), domain, index, value) };
        self.check("geopm_pio_write_control", ret)?;
        Ok(())
    }

    fn push_signal(&mut self, request: &Request) -> Result<usize, BackendError> {
        let (name, domain, index) = domain_args(request)?;
        let ret = unsafe { (self.api.push_signal)(name.as_ptr(), domain, index) };
        let native_idx = self.check("geopm_pio_push_signal", ret)?;
        self.signal_indices.push(native_idx);
        Ok(self.signal_indices.len() - 1)
    }

    fn push_control(&mut self, request: &Request) -> Result<usize, BackendError> {
        let (name, domain, index) = domain_args(request)?;
        let ret = unsafe { (self.api.push_control)(name.as_ptr(), domain, index) };
        let native_idx = self.check("geopm_pio_push_control", ret)?;
        self.control_indices.push(native_idx);
        Ok(self.control_indices.len() - 1)
    }

    fn read_batch(&mut self) -> Result<Vec<f64>, BackendError> {
        self.check("geopm_pio_read_batch", unsafe { (self.api.read_batch)() })?;
        self.signal_indices
            .iter()
            .map(|native_idx| {
                let mut value: c_double = 0.0;
                let ret = unsafe { (self.api.sample)(*native_idx, &mut value) };
                self.check("geopm_pio_sample", ret).map(|_| value)
            })
            .collect()
    }

    fn write_batch(&mut self, settings: &[(usize, f64)]) -> Result<(), BackendError> {
        for (idx, value) in settings {
            let native_idx = self.control_indices.get(*idx).copied().ok_or_else(|| {
                BackendError::invalid(format!("control batch index out of range: {}", idx))
            })?;
            let ret = unsafe { (self.api.adjust)(native_idx, *value) };
            self.check("geopm_pio_adjust", ret)?;
        }
        self.check("geopm_pio_write_batch", unsafe { (self.api.write_batch)() })?;
        Ok(())
    }

    fn reset(&mut self) -> Result<(), BackendError> {
        self.signal_indices.clear();
        self.control_indices.clear();
        self.check("geopm_pio_reset", unsafe { (self.api.reset)() })?;
        Ok(())
    }

    fn save_controls(&mut self) -> Result<ControlState, BackendError> {
        if self.control_saved {
            return Err(BackendError::not_implemented(
                "the platform library holds one saved control state; restore it before saving again",
            ));
        }
        self.check("geopm_pio_save_control", unsafe { (self.api.save_control)() })?;
        self.control_saved = true;
        Ok(ControlState::held())
    }

    fn restore_controls(&mut self, state: &ControlState) -> Result<(), BackendError> {
        if !state.held || !std::mem::take(&mut self.control_saved) {
            return Err(BackendError::invalid("no control state saved in the platform library"));
        }
        self.check("geopm_pio_restore_control", unsafe { (self.api.restore_control)() })?;
        Ok(())
    }

    fn hash_str(&self, key: &str) -> Result<u32, BackendError> {
        let key = to_cstring(key)?;
        // The library returns the 32-bit CRC widened to 64 bits
        Ok(unsafe { (self.api.crc32_str)(key.as_ptr()) } as u32)
    }
}
