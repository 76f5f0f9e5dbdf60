//! Batch access engine
//!
//! Holds the handle table, the last bulk-read snapshot and the staged
//! control adjustments of one batch session. Requests reaching the engine
//! are already validated; the engine only talks to the backend.

use crate::backend::PlatformBackend;
use crate::domain::{MetricKind, Request};
use crate::error::{BackendError, ErrorCode, PioError, PioResult};

use log::debug;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

// Generations are unique across engines so a handle can't be used on
// another session
static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

fn next_generation() -> u64 {
    NEXT_GENERATION.fetch_add(1, Ordering::Relaxed)
}

/// Handle of a pushed signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SignalHandle {
    generation: u64,
    index: usize,
}

impl SignalHandle {
    /// Position in push order
    pub fn index(&self) -> usize {
        self.index
    }
}

impl fmt::Display for SignalHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index)
    }
}

/// Handle of a pushed control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ControlHandle {
    generation: u64,
    index: usize,
}

impl ControlHandle {
    /// Position in push order
    pub fn index(&self) -> usize {
        self.index
    }
}

impl fmt::Display for ControlHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index)
    }
}

/// Lifecycle of a batch session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    /// Nothing pushed
    Empty,
    /// At least one push, no successful bulk read yet
    Configured,
    /// At least one successful bulk read
    Sampled,
}

#[derive(Debug)]
struct SignalSlot {
    request: Request,
    backend_idx: usize,
    // Number of completed bulk reads when the signal was pushed
    pushed_after: u64,
}

#[derive(Debug)]
struct ControlSlot {
    request: Request,
    backend_idx: usize,
}

/// State of one batch session
#[derive(Debug)]
pub struct BatchEngine {
    generation: u64,
    signals: Vec<SignalSlot>,
    controls: Vec<ControlSlot>,
    signal_lookup: HashMap<Request, usize>,
    control_lookup: HashMap<Request, usize>,
    snapshot: Vec<f64>,
    reads: u64,
    staged: BTreeMap<usize, f64>,
}

impl Default for BatchEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchEngine {
    /// Create an empty session
    pub fn new() -> Self {
        Self {
            generation: next_generation(),
            signals: Vec::new(),
            controls: Vec::new(),
            signal_lookup: HashMap::new(),
            control_lookup: HashMap::new(),
            snapshot: Vec::new(),
            reads: 0,
            staged: BTreeMap::new(),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> BatchState {
        if self.signals.is_empty() && self.controls.is_empty() {
            BatchState::Empty
        } else if self.reads == 0 {
            BatchState::Configured
        } else {
            BatchState::Sampled
        }
    }

    /// Number of pushed signals
    pub fn num_signals(&self) -> usize {
        self.signals.len()
    }

    /// Number of staged control adjustments
    pub fn num_staged(&self) -> usize {
        self.staged.len()
    }

    /// Register a signal, reusing the handle of an identical earlier push
    pub fn push_signal<B: PlatformBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        request: Request,
    ) -> PioResult<SignalHandle> {
        if let Some(index) = self.signal_lookup.get(&request) {
            return Ok(self.signal_handle(*index));
        }
        let backend_idx = backend.push_signal(&request)?;
        let index = self.signals.len();
        debug!("Pushed signal {} as handle {}", request, index);
        self.signal_lookup.insert(request.clone(), index);
        self.signals.push(SignalSlot {
            request,
            backend_idx,
            pushed_after: self.reads,
        });
        Ok(self.signal_handle(index))
    }

    /// Register a control, reusing the handle of an identical earlier push
    pub fn push_control<B: PlatformBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        request: Request,
    ) -> PioResult<ControlHandle> {
        if let Some(index) = self.control_lookup.get(&request) {
            return Ok(self.control_handle(*index));
        }
        let backend_idx = backend.push_control(&request)?;
        let index = self.controls.len();
        debug!("Pushed control {} as handle {}", request, index);
        self.control_lookup.insert(request.clone(), index);
        self.controls.push(ControlSlot {
            request,
            backend_idx,
        });
        Ok(self.control_handle(index))
    }

    fn signal_handle(&self, index: usize) -> SignalHandle {
        SignalHandle {
            generation: self.generation,
            index,
        }
    }

    fn control_handle(&self, index: usize) -> ControlHandle {
        ControlHandle {
            generation: self.generation,
            index,
        }
    }

    /// Read every pushed signal in one backend call
    ///
    /// The snapshot is only replaced when the backend returns one value per
    /// pushed signal.
    pub fn read_batch<B: PlatformBackend + ?Sized>(&mut self, backend: &mut B) -> PioResult<()> {
        let values = backend.read_batch()?;
        if values.len() != self.signals.len() {
            return Err(BackendError::new(
                ErrorCode::Logic,
                format!(
                    "batch read returned {} values for {} pushed signals",
                    values.len(),
                    self.signals.len()
                ),
            )
            .into());
        }
        let snapshot = self
            .signals
            .iter()
            .map(|slot| {
                values.get(slot.backend_idx).copied().ok_or_else(|| {
                    BackendError::new(
                        ErrorCode::Logic,
                        format!("no batch value for {}", slot.request),
                    )
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        debug!("Batch read of {} signals", snapshot.len());
        self.snapshot = snapshot;
        self.reads += 1;
        Ok(())
    }

    /// Value of a signal in the latest snapshot
    pub fn sample(&self, handle: SignalHandle) -> PioResult<f64> {
        let slot = self
            .signals
            .get(handle.index)
            .filter(|_| handle.generation == self.generation)
            .ok_or(PioError::InvalidHandle {
                kind: MetricKind::Signal,
                index: handle.index,
            })?;
        if self.reads <= slot.pushed_after {
            return Err(PioError::StaleHandle(handle.index));
        }
        self.snapshot
            .get(handle.index)
            .copied()
            .ok_or(PioError::StaleHandle(handle.index))
    }

    /// Stage a control value for the next batch write
    pub fn adjust(&mut self, handle: ControlHandle, value: f64) -> PioResult<()> {
        if handle.generation != self.generation || handle.index >= self.controls.len() {
            return Err(PioError::InvalidHandle {
                kind: MetricKind::Control,
                index: handle.index,
            });
        }
        self.staged.insert(handle.index, value);
        Ok(())
    }

    /// Commit staged adjustments in one backend call
    ///
    /// Staged values are cleared only when the backend accepts them.
    pub fn write_batch<B: PlatformBackend + ?Sized>(&mut self, backend: &mut B) -> PioResult<()> {
        if self.staged.is_empty() {
            return Ok(());
        }
        let settings: Vec<(usize, f64)> = self
            .staged
            .iter()
            .map(|(index, value)| (self.controls[*index].backend_idx, *value))
            .collect();
        backend.write_batch(&settings)?;
        debug!("Batch write of {} controls", settings.len());
        self.staged.clear();
        Ok(())
    }

    /// Drop every handle, the snapshot and staged values
    ///
    /// Local state is cleared even when the backend fails to reset.
    pub fn reset<B: PlatformBackend + ?Sized>(&mut self, backend: &mut B) -> PioResult<()> {
        let result = backend.reset();
        *self = Self::new();
        result.map_err(PioError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DomainType;
    use crate::mock::SimBackend;

    fn time() -> Request {
        Request::new("TIME", DomainType::Board, 0)
    }

    fn power_limit(pkg: usize) -> Request {
        Request::new("CPU_POWER_LIMIT_CONTROL", DomainType::Package, pkg)
    }

    #[test]
    fn test_state_transitions() {
        let mut backend = SimBackend::new();
        let mut engine = BatchEngine::new();
        assert_eq!(engine.state(), BatchState::Empty);

        engine.push_signal(&mut backend, time()).unwrap();
        assert_eq!(engine.state(), BatchState::Configured);

        engine.read_batch(&mut backend).unwrap();
        assert_eq!(engine.state(), BatchState::Sampled);

        engine.reset(&mut backend).unwrap();
        assert_eq!(engine.state(), BatchState::Empty);
    }

    #[test]
    fn test_handles_follow_push_order() {
        let mut backend = SimBackend::new();
        let mut engine = BatchEngine::new();
        let a = engine.push_signal(&mut backend, time()).unwrap();
        let b = engine
            .push_signal(&mut backend, Request::new("CPU_ENERGY", DomainType::Package, 0))
            .unwrap();
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
    }

    #[test]
    fn test_duplicate_push_returns_same_handle() {
        let mut backend = SimBackend::new();
        let mut engine = BatchEngine::new();
        let first = engine.push_signal(&mut backend, time()).unwrap();
        let second = engine.push_signal(&mut backend, time()).unwrap();
        assert_eq!(first, second);
        assert_eq!(engine.num_signals(), 1);
        assert_eq!(backend.num_pushed_signals(), 1);
    }

    #[test]
    fn test_sample_before_read_is_stale() {
        let mut backend = SimBackend::new();
        let mut engine = BatchEngine::new();
        let handle = engine.push_signal(&mut backend, time()).unwrap();
        assert_eq!(engine.sample(handle), Err(PioError::StaleHandle(0)));

        engine.read_batch(&mut backend).unwrap();
        let late = engine
            .push_signal(&mut backend, Request::new("CPU_ENERGY", DomainType::Board, 0))
            .unwrap();
        assert!(engine.sample(handle).unwrap() >= 0.0);
        assert_eq!(engine.sample(late), Err(PioError::StaleHandle(1)));
    }

    #[test]
    fn test_reset_invalidates_handles() {
        let mut backend = SimBackend::new();
        let mut engine = BatchEngine::new();
        let handle = engine.push_signal(&mut backend, time()).unwrap();
        let control = engine.push_control(&mut backend, power_limit(0)).unwrap();
        engine.read_batch(&mut backend).unwrap();
        engine.reset(&mut backend).unwrap();

        assert!(matches!(
            engine.sample(handle),
            Err(PioError::InvalidHandle { kind: MetricKind::Signal, .. })
        ));
        assert!(matches!(
            engine.adjust(control, 1.0),
            Err(PioError::InvalidHandle { kind: MetricKind::Control, .. })
        ));

        // A fresh push reuses index 0 but is a different handle
        let fresh = engine.push_signal(&mut backend, time()).unwrap();
        assert_eq!(fresh.index(), handle.index());
        assert_ne!(fresh, handle);
    }

    #[test]
    fn test_handles_from_other_engine_are_invalid() {
        let mut backend = SimBackend::new();
        let mut engine = BatchEngine::new();
        let mut other = BatchEngine::new();
        engine.push_signal(&mut backend, time()).unwrap();
        let foreign = other.push_signal(&mut backend, time()).unwrap();
        engine.read_batch(&mut backend).ok();
        assert!(matches!(
            engine.sample(foreign),
            Err(PioError::InvalidHandle { .. })
        ));
    }

    #[test]
    fn test_failed_read_keeps_snapshot() {
        let mut backend = SimBackend::new();
        let mut engine = BatchEngine::new();
        let handle = engine
            .push_signal(&mut backend, Request::new("CPU_POWER_LIMIT_CONTROL", DomainType::Package, 0))
            .unwrap();
        engine.read_batch(&mut backend).unwrap();
        let before = engine.sample(handle).unwrap();

        backend.set_fail_read_batch(true);
        assert!(matches!(
            engine.read_batch(&mut backend),
            Err(PioError::Backend(_))
        ));
        assert_eq!(engine.sample(handle).unwrap(), before);
    }

    #[test]
    fn test_short_read_is_logic_error() {
        let mut backend = SimBackend::new();
        let mut engine = BatchEngine::new();
        let handle = engine.push_signal(&mut backend, time()).unwrap();
        backend.set_short_read_batch(true);
        match engine.read_batch(&mut backend) {
            Err(PioError::Backend(e)) => assert_eq!(e.code, ErrorCode::Logic),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(engine.state(), BatchState::Configured);
        assert_eq!(engine.sample(handle), Err(PioError::StaleHandle(0)));
    }

    #[test]
    fn test_adjust_keeps_latest_value() {
        let mut backend = SimBackend::new();
        let mut engine = BatchEngine::new();
        let handle = engine.push_control(&mut backend, power_limit(1)).unwrap();
        engine.adjust(handle, 100.0).unwrap();
        engine.adjust(handle, 120.0).unwrap();
        assert_eq!(engine.num_staged(), 1);
        engine.write_batch(&mut backend).unwrap();
        assert_eq!(engine.num_staged(), 0);
        assert_eq!(backend.control_value("CPU_POWER_LIMIT_CONTROL", 1), Some(120.0));
    }

    #[test]
    fn test_failed_write_keeps_staged_values() {
        let mut backend = SimBackend::new();
        let mut engine = BatchEngine::new();
        let handle = engine.push_control(&mut backend, power_limit(0)).unwrap();
        engine.adjust(handle, 90.0).unwrap();

        backend.set_fail_write_batch(true);
        assert!(engine.write_batch(&mut backend).is_err());
        assert_eq!(engine.num_staged(), 1);

        backend.set_fail_write_batch(false);
        engine.write_batch(&mut backend).unwrap();
        assert_eq!(backend.control_value("CPU_POWER_LIMIT_CONTROL", 0), Some(90.0));
    }

    #[test]
    fn test_empty_write_is_noop() {
        let mut backend = SimBackend::new();
        let mut engine = BatchEngine::new();
        engine.push_control(&mut backend, power_limit(0)).unwrap();
        backend.set_fail_write_batch(true);
        assert!(engine.write_batch(&mut backend).is_ok());
    }
}
