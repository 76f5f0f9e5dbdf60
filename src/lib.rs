//! platio - platform telemetry and control access library
//!
//! This library reads hardware signals and writes hardware controls of a
//! compute node, one at a time or in batches, with a stack for saving and
//! restoring control settings.
//!
//! # Modules
//!
//! - [`backend`]: Platform backends (libgeopmd, NVML)
//! - [`cli`]: Command-line interface definitions
//! - [`commands`]: Command handlers
//! - [`config`]: Configuration system
//! - [`domain`]: Domain types, metric descriptions and value formatting
//! - [`error`]: Error types
//! - [`services`]: Topology, catalog, batch and control state services

pub mod backend;
pub mod cli;
pub mod commands;
pub mod config;
pub mod domain;
pub mod error;
pub mod services;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use backend::PlatformBackend;
pub use error::{AppError, PioError, PioResult, Result};
pub use services::Platform;
