//! Control state stack
//!
//! Saves the full control state of the backend and restores it later, LIFO.

use crate::backend::PlatformBackend;
use crate::domain::ControlState;
use crate::error::{PioError, PioResult};

use log::debug;

/// Saved control snapshots, most recent last
#[derive(Debug, Default)]
pub struct ControlStack {
    stack: Vec<ControlState>,
}

impl ControlStack {
    /// Create an empty stack
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of saved snapshots
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Capture every control setting and push it
    ///
    /// Nothing is pushed if the backend fails to capture.
    pub fn save<B: PlatformBackend + ?Sized>(&mut self, backend: &mut B) -> PioResult<()> {
        let state = backend.save_controls()?;
        self.stack.push(state);
        debug!("Saved control state (depth {})", self.stack.len());
        Ok(())
    }

    /// Write back the most recently saved snapshot
    ///
    /// The snapshot is consumed even if the restore fails.
    pub fn restore<B: PlatformBackend + ?Sized>(&mut self, backend: &mut B) -> PioResult<()> {
        let state = self.stack.pop().ok_or(PioError::EmptyStack)?;
        backend.restore_controls(&state)?;
        debug!("Restored control settings (depth {})", self.stack.len());
        Ok(())
    }
}
