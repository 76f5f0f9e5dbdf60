//! Read command implementation
//!
//! Reads one signal, or lists what can be read.

use crate::backend::PlatformBackend;
use crate::cli::args::{OutputFormat, ReadArgs};
use crate::cli::output::{print_output, SignalValue};
use crate::commands::{open_platform, print_names, run_listing};
use crate::config::Config;
use crate::domain::MetricKind;
use crate::error::{AppError, Result};
use crate::services::Platform;

/// Execute the read command
pub fn run_read(args: &ReadArgs, config: &Config, format: OutputFormat) -> Result<()> {
    let platform = open_platform(config)?;
    read_with(&platform, args, format)
}

fn read_with<B: PlatformBackend>(platform: &Platform<B>, args: &ReadArgs, format: OutputFormat) -> Result<()> {
    if run_listing(platform, MetricKind::Signal, &args.list, format)? {
        return Ok(());
    }
    match read_request(platform, args)? {
        Some(value) => print_output(&value, format)?,
        None => print_names(platform, MetricKind::Signal, format)?,
    }
    Ok(())
}

/// Read the requested signal; `None` when no signal was named
fn read_request<B: PlatformBackend>(platform: &Platform<B>, args: &ReadArgs) -> Result<Option<SignalValue>> {
    let (signal, domain, index) = match (&args.signal, &args.domain_type, args.domain_index) {
        (None, None, None) => return Ok(None),
        (Some(signal), Some(domain), Some(index)) => (signal, domain, index),
        _ => {
            return Err(AppError::Usage(
                "read requires SIGNAL DOMAIN_TYPE DOMAIN_INDEX".to_string(),
            ))
        }
    };

    let domain_type = platform.domain_type(domain.as_str())?;
    let value = platform.read_signal(signal, domain_type, index)?;
    Ok(Some(SignalValue {
        signal: signal.clone(),
        domain: domain_type,
        index,
        value,
        formatted: platform.format_signal(signal, value)?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::args::ListArgs;
    use crate::domain::DomainType;
    use crate::error::PioError;
    use crate::mock::{SimBackend, SIM_REGION_HASH};

    fn args(signal: Option<&str>, domain: Option<&str>, index: Option<i32>) -> ReadArgs {
        ReadArgs {
            list: ListArgs::default(),
            signal: signal.map(str::to_string),
            domain_type: domain.map(str::to_string),
            domain_index: index,
        }
    }

    #[test]
    fn test_read_formats_by_policy() {
        let platform = Platform::new(SimBackend::new()).unwrap();
        let value = read_request(&platform, &args(Some("REGION_HASH"), Some("cpu"), Some(3)))
            .unwrap()
            .unwrap();
        assert_eq!(value.value, SIM_REGION_HASH);
        assert_eq!(value.formatted, "0xdeadbeef");
        assert_eq!(value.domain, DomainType::Cpu);
    }

    #[test]
    fn test_no_arguments_lists_names() {
        let platform = Platform::new(SimBackend::new()).unwrap();
        assert!(read_request(&platform, &args(None, None, None)).unwrap().is_none());
    }

    #[test]
    fn test_partial_request_is_usage_error() {
        let platform = Platform::new(SimBackend::new()).unwrap();
        let result = read_request(&platform, &args(Some("TIME"), Some("board"), None));
        assert!(matches!(result, Err(AppError::Usage(_))));
    }

    #[test]
    fn test_unknown_domain_name() {
        let platform = Platform::new(SimBackend::new()).unwrap();
        let result = read_request(&platform, &args(Some("TIME"), Some("socket"), Some(0)));
        assert!(matches!(result, Err(AppError::Pio(PioError::InvalidDomain(_)))));
    }
}
