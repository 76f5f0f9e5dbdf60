//! Output formatting utilities
//!
//! Provides table and JSON output formatting for CLI commands.

use crate::cli::args::OutputFormat;
use crate::domain::{DomainType, MetricInfo, MetricKind};
use serde::Serialize;
use std::io::{self, Write};

/// Format and print output based on the selected format
pub fn print_output<T: Serialize + TableDisplay>(data: &T, format: OutputFormat) -> io::Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();

    match format {
        OutputFormat::Table => {
            writeln!(handle, "{}", data.to_table())?;
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(data).map_err(io::Error::other)?;
            writeln!(handle, "{}", json)?;
        }
    }

    Ok(())
}

/// Trait for types that can be displayed as a table
pub trait TableDisplay {
    /// Format as a table string
    fn to_table(&self) -> String;
}

/// Sorted signal or control names
#[derive(Debug, Clone, Serialize)]
pub struct NameList {
    pub kind: MetricKind,
    pub names: Vec<String>,
}

impl TableDisplay for NameList {
    fn to_table(&self) -> String {
        self.names.join("\n")
    }
}

/// One domain type with its instance count
#[derive(Debug, Clone, Serialize)]
pub struct DomainEntry {
    pub domain: DomainType,
    pub count: usize,
}

/// Every domain type of the platform
#[derive(Debug, Clone, Serialize)]
pub struct DomainList {
    pub domains: Vec<DomainEntry>,
}

impl DomainList {
    pub fn new(domains: Vec<(DomainType, usize)>) -> Self {
        Self {
            domains: domains
                .into_iter()
                .map(|(domain, count)| DomainEntry { domain, count })
                .collect(),
        }
    }
}

impl TableDisplay for DomainList {
    fn to_table(&self) -> String {
        let width = self
            .domains
            .iter()
            .map(|entry| entry.domain.name().len())
            .max()
            .unwrap_or(0)
            + 2;
        self.domains
            .iter()
            .map(|entry| format!("{:<width$}{}", entry.domain.name(), entry.count))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Descriptions of one or more signals or controls
#[derive(Debug, Clone, Serialize)]
pub struct MetricDescriptions {
    pub kind: MetricKind,
    pub metrics: Vec<MetricInfo>,
}

impl TableDisplay for MetricDescriptions {
    fn to_table(&self) -> String {
        let mut output = String::new();
        for info in &self.metrics {
            output.push_str(&format!("{}:\n", info.name));
            output.push_str(&format!("    description: {}\n", info.description));
            output.push_str(&format!("    domain: {}\n", info.domain.name()));
            if self.kind == MetricKind::Signal {
                output.push_str(&format!("    aggregation: {}\n", info.aggregation));
                output.push_str(&format!("    format: {}\n", info.format));
                output.push_str(&format!("    behavior: {}\n", info.behavior));
            }
        }
        output.trim_end().to_string()
    }
}

/// One value read from a signal
#[derive(Debug, Clone, Serialize)]
pub struct SignalValue {
    pub signal: String,
    pub domain: DomainType,
    pub index: i32,
    pub value: f64,
    /// Value rendered with the signal's format policy
    pub formatted: String,
}

impl TableDisplay for SignalValue {
    fn to_table(&self) -> String {
        self.formatted.clone()
    }
}

/// Simple message output
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub message: String,
    pub success: bool,
}

impl TableDisplay for Message {
    fn to_table(&self) -> String {
        if self.success {
            format!("✓ {}", self.message)
        } else {
            format!("✗ {}", self.message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_list_table() {
        let list = DomainList::new(vec![(DomainType::Board, 1), (DomainType::Cpu, 8)]);
        let output = list.to_table();
        assert!(output.starts_with("board"));
        assert!(output.lines().nth(1).unwrap().ends_with('8'));
    }

    #[test]
    fn test_domain_list_aligns_long_names() {
        let list = DomainList::new(vec![
            (DomainType::Board, 1),
            (DomainType::PackageIntegratedMemory, 2),
            (DomainType::Gpu, 4),
        ]);
        let output = list.to_table();
        let columns: Vec<usize> = output
            .lines()
            .map(|line| line.rfind(' ').unwrap() + 1)
            .collect();
        assert_eq!(columns, vec![27, 27, 27]);
        assert!(output.contains("package_integrated_memory  2"));
    }

    #[test]
    fn test_control_description_omits_signal_fields() {
        let info = MetricInfo::new("CPU_POWER_LIMIT_CONTROL", DomainType::Package, "Power limit");
        let signal = MetricDescriptions {
            kind: MetricKind::Signal,
            metrics: vec![info.clone()],
        };
        let control = MetricDescriptions {
            kind: MetricKind::Control,
            metrics: vec![info],
        };
        assert!(signal.to_table().contains("aggregation: average"));
        assert!(!control.to_table().contains("aggregation"));
        assert!(control.to_table().starts_with("CPU_POWER_LIMIT_CONTROL:"));
    }

    #[test]
    fn test_signal_value_prints_formatted() {
        let value = SignalValue {
            signal: "REGION_HASH".to_string(),
            domain: DomainType::Board,
            index: 0,
            value: 255.0,
            formatted: "0xff".to_string(),
        };
        assert_eq!(value.to_table(), "0xff");
        let json = serde_json::to_string(&value).unwrap();
        assert!(json.contains("\"domain\":\"board\""));
    }

    #[test]
    fn test_message_display() {
        let msg = Message {
            message: "Operation completed".to_string(),
            success: true,
        };

        assert!(msg.to_table().starts_with('✓'));
    }
}
