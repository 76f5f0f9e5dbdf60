//! Write command implementation
//!
//! Writes one control, a batch of controls from a file, or lists what can be
//! written.

use crate::backend::PlatformBackend;
use crate::cli::args::{OutputFormat, WriteArgs};
use crate::cli::output::{print_output, Message};
use crate::commands::{open_platform, print_names, run_listing};
use crate::config::Config;
use crate::domain::MetricKind;
use crate::error::{AppError, Result};
use crate::services::Platform;

use std::fs::File;
use std::io::{self, BufRead, BufReader};

/// One `NAME DOMAIN_TYPE DOMAIN_INDEX VALUE` setting
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRequest {
    pub control: String,
    pub domain: String,
    pub index: i32,
    pub value: f64,
}

/// Parse batch lines, skipping blank lines
pub fn parse_write_requests<R: BufRead>(reader: R) -> Result<Vec<WriteRequest>> {
    let mut requests = Vec::new();
    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() {
            continue;
        }
        let malformed = || AppError::Usage(format!("malformed request on line {}: \"{}\"", number + 1, line.trim()));
        let [control, domain, index, value] = fields.as_slice() else {
            return Err(malformed());
        };
        requests.push(WriteRequest {
            control: control.to_string(),
            domain: domain.to_string(),
            index: index.parse().map_err(|_| malformed())?,
            value: value.parse().map_err(|_| malformed())?,
        });
    }
    Ok(requests)
}

/// Execute the write command
pub fn run_write(args: &WriteArgs, config: &Config, format: OutputFormat) -> Result<()> {
    let platform = open_platform(config)?;
    write_with(&platform, args, format)
}

fn write_with<B: PlatformBackend>(platform: &Platform<B>, args: &WriteArgs, format: OutputFormat) -> Result<()> {
    if run_listing(platform, MetricKind::Control, &args.list, format)? {
        return Ok(());
    }

    let requests = match &args.batch_file {
        Some(path) if path == "-" => parse_write_requests(io::stdin().lock())?,
        Some(path) => parse_write_requests(BufReader::new(File::open(path)?))?,
        None => match single_request(args)? {
            Some(request) => vec![request],
            None => return print_names(platform, MetricKind::Control, format),
        },
    };

    let count = apply_requests(platform, &requests)?;
    print_output(
        &Message {
            message: format!("Wrote {} control setting(s)", count),
            success: true,
        },
        format,
    )?;
    Ok(())
}

fn single_request(args: &WriteArgs) -> Result<Option<WriteRequest>> {
    match (&args.control, &args.domain_type, args.domain_index, args.value) {
        (None, None, None, None) => Ok(None),
        (Some(control), Some(domain), Some(index), Some(value)) => Ok(Some(WriteRequest {
            control: control.clone(),
            domain: domain.clone(),
            index,
            value,
        })),
        _ => Err(AppError::Usage(
            "write requires CONTROL DOMAIN_TYPE DOMAIN_INDEX VALUE".to_string(),
        )),
    }
}

/// Push, adjust and commit every request in one batch write
fn apply_requests<B: PlatformBackend>(platform: &Platform<B>, requests: &[WriteRequest]) -> Result<usize> {
    let mut handles = Vec::with_capacity(requests.len());
    for request in requests {
        let domain = platform.domain_type(request.domain.as_str())?;
        handles.push(platform.push_control(&request.control, domain, request.index)?);
    }
    for (handle, request) in handles.iter().zip(requests) {
        platform.adjust(*handle, request.value)?;
    }
    platform.write_batch()?;
    Ok(requests.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::SimBackend;
    use std::io::Cursor;

    #[test]
    fn test_parse_write_requests() {
        let input = "CPU_FREQUENCY_MAX_CONTROL board 0 2e9\n\n  GPU_POWER_LIMIT_CONTROL gpu 0 250.5  \n";
        let requests = parse_write_requests(Cursor::new(input)).unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].value, 2e9);
        assert_eq!(
            requests[1],
            WriteRequest {
                control: "GPU_POWER_LIMIT_CONTROL".to_string(),
                domain: "gpu".to_string(),
                index: 0,
                value: 250.5,
            }
        );
    }

    #[test]
    fn test_malformed_line_names_line_number() {
        let input = "CPU_FREQUENCY_MAX_CONTROL board 0 2e9\nGPU_POWER_LIMIT_CONTROL gpu zero 250\n";
        match parse_write_requests(Cursor::new(input)) {
            Err(AppError::Usage(message)) => assert!(message.contains("line 2")),
            other => panic!("Expected usage error, got {:?}", other),
        }
        assert!(parse_write_requests(Cursor::new("TIME board 0\n")).is_err());
    }

    #[test]
    fn test_apply_requests_commits_batch() {
        let platform = Platform::new(SimBackend::new()).unwrap();
        let requests = parse_write_requests(Cursor::new(
            "CPU_POWER_LIMIT_CONTROL package 1 95\nGPU_POWER_LIMIT_CONTROL board 0 200\n",
        ))
        .unwrap();
        assert_eq!(apply_requests(&platform, &requests).unwrap(), 2);

        let backend = platform.backend();
        assert_eq!(backend.control_value("CPU_POWER_LIMIT_CONTROL", 0), Some(150.0));
        assert_eq!(backend.control_value("CPU_POWER_LIMIT_CONTROL", 1), Some(95.0));
        assert_eq!(backend.control_value("GPU_POWER_LIMIT_CONTROL", 0), Some(200.0));
    }

    #[test]
    fn test_unknown_control_writes_nothing() {
        let platform = Platform::new(SimBackend::new()).unwrap();
        let requests = parse_write_requests(Cursor::new(
            "CPU_POWER_LIMIT_CONTROL package 0 95\nCPU_ENERGY package 0 1\n",
        ))
        .unwrap();
        assert!(apply_requests(&platform, &requests).is_err());
        assert_eq!(platform.backend().write_count(), 0);
    }

    #[test]
    fn test_partial_single_request_is_usage_error() {
        let args = WriteArgs {
            list: Default::default(),
            batch_file: None,
            control: Some("CPU_POWER_LIMIT_CONTROL".to_string()),
            domain_type: Some("package".to_string()),
            domain_index: Some(0),
            value: None,
        };
        assert!(matches!(single_request(&args), Err(AppError::Usage(_))));
    }
}
