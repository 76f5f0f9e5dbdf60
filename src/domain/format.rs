//! Signal value rendering

use crate::domain::FormatPolicy;
use crate::error::PioError;

impl FormatPolicy {
    /// Render a value under this policy
    pub fn format(&self, value: f64) -> String {
        match self {
            Self::Double => format_double(value),
            Self::Integer => format!("{}", value as i64),
            Self::Hex => format!("{:#x}", value as u64),
            Self::Raw64 => format!("{}", value.to_bits()),
        }
    }
}

fn format_double(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else {
        // Display already prints the shortest round-tripping form and "inf"
        format!("{}", value)
    }
}

/// Render a signal value according to its format policy
pub fn format_signal(value: f64, format: FormatPolicy) -> String {
    format.format(value)
}

/// Render a signal value given a raw format policy value
pub fn format_signal_raw(value: f64, format: i32) -> Result<String, PioError> {
    FormatPolicy::try_from(format).map(|policy| policy.format(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_double() {
        assert_eq!(format_signal(3.0, FormatPolicy::Double), "3");
        assert_eq!(format_signal(2.5, FormatPolicy::Double), "2.5");
        assert_eq!(format_signal(0.1, FormatPolicy::Double), "0.1");
        assert_eq!(format_signal(f64::NAN, FormatPolicy::Double), "nan");
        assert_eq!(format_signal(f64::INFINITY, FormatPolicy::Double), "inf");
        assert_eq!(format_signal(f64::NEG_INFINITY, FormatPolicy::Double), "-inf");
    }

    #[test]
    fn test_format_integer() {
        assert_eq!(format_signal(3.0, FormatPolicy::Integer), "3");
        assert_eq!(format_signal(3.9, FormatPolicy::Integer), "3");
        assert_eq!(format_signal(-2.7, FormatPolicy::Integer), "-2");
    }

    #[test]
    fn test_format_hex() {
        assert_eq!(format_signal(255.0, FormatPolicy::Hex), "0xff");
        assert_eq!(format_signal(0.0, FormatPolicy::Hex), "0x0");
        assert_eq!(format_signal(-5.0, FormatPolicy::Hex), "0x0");
    }

    #[test]
    fn test_format_raw64() {
        assert_eq!(format_signal(1.0, FormatPolicy::Raw64), "4607182418800017408");
        assert_eq!(format_signal(0.0, FormatPolicy::Raw64), "0");
    }

    #[test]
    fn test_format_raw_policy() {
        assert_eq!(format_signal_raw(255.0, 2), Ok("0xff".to_string()));
        assert_eq!(format_signal_raw(1.0, 7), Err(PioError::UnknownFormat(7)));
    }
}
