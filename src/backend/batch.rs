//! Software batching for backends without a native batch interface
//!
//! Requests are recorded at push time and served one by one when the batch
//! is read or written.

use crate::domain::Request;
use crate::error::BackendError;

/// Requests pushed since the last reset
#[derive(Debug, Clone, Default)]
pub struct SoftBatch {
    signals: Vec<Request>,
    controls: Vec<Request>,
}

impl SoftBatch {
    /// Create an empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a signal request and return its batch index
    pub fn push_signal(&mut self, request: &Request) -> usize {
        self.signals.push(request.clone());
        self.signals.len() - 1
    }

    /// Record a control request and return its batch index
    pub fn push_control(&mut self, request: &Request) -> usize {
        self.controls.push(request.clone());
        self.controls.len() - 1
    }

    /// Pushed signal requests in push order
    pub fn signals(&self) -> &[Request] {
        &self.signals
    }

    /// Resolve `(batch index, value)` settings to control requests
    pub fn control_settings(&self, settings: &[(usize, f64)]) -> Result<Vec<(Request, f64)>, BackendError> {
        settings
            .iter()
            .map(|(idx, value)| {
                self.controls
                    .get(*idx)
                    .map(|req| (req.clone(), *value))
                    .ok_or_else(|| BackendError::invalid(format!("control batch index out of range: {}", idx)))
            })
            .collect()
    }

    /// Forget every request
    pub fn clear(&mut self) {
        self.signals.clear();
        self.controls.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DomainType;

    #[test]
    fn test_indices_follow_push_order() {
        let mut batch = SoftBatch::new();
        assert_eq!(batch.push_signal(&Request::new("TIME", DomainType::Board, 0)), 0);
        assert_eq!(batch.push_signal(&Request::new("CPU_ENERGY", DomainType::Package, 1)), 1);
        assert_eq!(batch.push_control(&Request::new("CPU_POWER_LIMIT_CONTROL", DomainType::Package, 0)), 0);
        assert_eq!(batch.signals()[1].name, "CPU_ENERGY");
    }

    #[test]
    fn test_control_settings_rejects_unknown_index() {
        let mut batch = SoftBatch::new();
        batch.push_control(&Request::new("CPU_POWER_LIMIT_CONTROL", DomainType::Package, 0));
        assert!(batch.control_settings(&[(0, 100.0)]).is_ok());
        assert!(batch.control_settings(&[(3, 100.0)]).is_err());
    }

    #[test]
    fn test_clear() {
        let mut batch = SoftBatch::new();
        batch.push_signal(&Request::new("TIME", DomainType::Board, 0));
        batch.clear();
        assert!(batch.signals().is_empty());
        assert_eq!(batch.push_signal(&Request::new("TIME", DomainType::Board, 0)), 0);
    }
}
