//! Command handlers
//!
//! Each command handler orchestrates the execution of a CLI command.

pub mod read;
pub mod write;

pub use read::run_read;
pub use write::{parse_write_requests, run_write, WriteRequest};

use crate::backend::{GeopmdBackend, NvmlBackend, PlatformBackend};
use crate::cli::args::{ListArgs, OutputFormat};
use crate::cli::output::{print_output, DomainList, Message, MetricDescriptions, NameList};
use crate::config::{BackendKind, Config};
use crate::domain::MetricKind;
use crate::error::Result;
use crate::services::Platform;

/// Platform over whichever backend the configuration selects
pub type DynPlatform = Platform<Box<dyn PlatformBackend>>;

/// Open the configured backend
pub fn open_platform(config: &Config) -> Result<DynPlatform> {
    let backend: Box<dyn PlatformBackend> = match config.backend.kind {
        BackendKind::Geopmd => Box::new(GeopmdBackend::load(&config.backend.library)?),
        BackendKind::Nvml => Box::new(NvmlBackend::new(Some(config.backend.cache_path()))),
    };
    log::debug!("Opening {} backend", config.backend.kind);
    Ok(Platform::new(backend)?)
}

/// Handle the listing flags shared by read and write
///
/// Returns `false` when no listing flag was given.
fn run_listing<B: PlatformBackend>(
    platform: &Platform<B>,
    kind: MetricKind,
    list: &ListArgs,
    format: OutputFormat,
) -> Result<bool> {
    if list.cache {
        platform.create_cache()?;
        print_output(
            &Message {
                message: "Topology cache created".to_string(),
                success: true,
            },
            format,
        )?;
        return Ok(true);
    }
    if list.domain {
        print_output(&DomainList::new(platform.registry().domains()), format)?;
        return Ok(true);
    }
    if let Some(name) = &list.info {
        let info = platform.catalog().info(kind, name)?.clone();
        print_output(
            &MetricDescriptions {
                kind,
                metrics: vec![info],
            },
            format,
        )?;
        return Ok(true);
    }
    if list.info_all {
        let catalog = platform.catalog();
        let metrics = catalog
            .names(kind)
            .iter()
            .map(|name| catalog.info(kind, name).cloned())
            .collect::<std::result::Result<Vec<_>, _>>()?;
        print_output(&MetricDescriptions { kind, metrics }, format)?;
        return Ok(true);
    }
    Ok(false)
}

/// Print every name of one kind
fn print_names<B: PlatformBackend>(
    platform: &Platform<B>,
    kind: MetricKind,
    format: OutputFormat,
) -> Result<()> {
    let names = platform.catalog().names(kind);
    print_output(&NameList { kind, names }, format)?;
    Ok(())
}
