use bytesize::ByteSize;
use std::time::Duration;

/// Human-readable byte count
pub fn format_size(bytes: u64) -> String {
    ByteSize::b(bytes).to_string()
}

/// Elapsed time with two decimals, e.g. `40.06s`
pub fn format_duration(elapsed: Duration) -> String {
    format!("{:.2}s", elapsed.as_secs_f64())
}

/// Share of `input` saved by `output`, 0 when there was no input
pub fn reduction_percent(input: u64, output: u64) -> f64 {
    if input == 0 {
        return 0.0;
    }
    (input as f64 - output as f64) / input as f64 * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size_small_values() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(512), "512 B");
    }

    #[test]
    fn test_format_size_grows_with_input() {
        assert_ne!(format_size(2_000_000_000), format_size(150_000_000));
        assert!(format_size(2_000_000_000).contains('G'));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(40_060)), "40.06s");
        assert_eq!(format_duration(Duration::ZERO), "0.00s");
    }

    #[test]
    fn test_reduction_percent() {
        assert_eq!(reduction_percent(0, 0), 0.0);
        assert_eq!(reduction_percent(0, 10), 0.0);
        assert_eq!(reduction_percent(200, 50), 75.0);
        assert!(reduction_percent(100, 150) < 0.0);
    }
}
