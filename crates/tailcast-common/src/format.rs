//! Human-readable formatting for sizes, speeds and ages in log lines.

use std::time::Duration;

const UNITS: [&str; 3] = ["KiB", "MiB", "GiB"];

/// Format a byte count, e.g. `1.5 MiB`.
///
/// Values are scaled by 1024 while strictly above 1024 and truncated (not
/// rounded) to three decimals, so `1024` stays `1024 bytes`.
pub fn format_bytes(bytes: u64) -> String {
    format_scaled(bytes as f64)
}

/// Format a transfer rate, e.g. `312.5 KiB/s`.
pub fn format_speed(bytes_per_sec: f64) -> String {
    format!("{}/s", format_scaled(bytes_per_sec.max(0.0)))
}

fn format_scaled(mut value: f64) -> String {
    let mut unit = "bytes";
    for next in UNITS {
        if value > 1024.0 {
            value /= 1024.0;
            unit = next;
        }
    }
    let truncated = (value * 1000.0).trunc() / 1000.0;
    let text = format!("{truncated:.3}");
    let text = text.trim_end_matches('0').trim_end_matches('.');
    format!("{text} {unit}")
}

/// Format an age or elapsed time, e.g. `850 ms`, `42s`, `3m 7s`, `2h 5m 0s`.
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1000 {
        return format!("{millis} ms");
    }

    let secs = duration.as_secs();
    let (hours, mins, secs) = (secs / 3600, (secs / 60) % 60, secs % 60);
    if hours > 0 {
        format!("{hours}h {mins}m {secs}s")
    } else if mins > 0 {
        format!("{mins}m {secs}s")
    } else {
        format!("{secs}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_below_threshold() {
        assert_eq!(format_bytes(0), "0 bytes");
        assert_eq!(format_bytes(500), "500 bytes");
        assert_eq!(format_bytes(1024), "1024 bytes");
    }

    #[test]
    fn bytes_scaled() {
        assert_eq!(format_bytes(2048), "2 KiB");
        assert_eq!(format_bytes(1536), "1.5 KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5 MiB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3 GiB");
    }

    #[test]
    fn bytes_truncate_not_round() {
        // 1025 / 1024 = 1.0009765...
        assert_eq!(format_bytes(1025), "1 KiB");
        // 1999 / 1024 = 1.9521...
        assert_eq!(format_bytes(1999), "1.952 KiB");
    }

    #[test]
    fn speed_suffix() {
        assert_eq!(format_speed(2048.0), "2 KiB/s");
        assert_eq!(format_speed(0.0), "0 bytes/s");
        assert_eq!(format_speed(-5.0), "0 bytes/s");
    }

    #[test]
    fn durations() {
        assert_eq!(format_duration(Duration::from_millis(850)), "850 ms");
        assert_eq!(format_duration(Duration::from_secs(42)), "42s");
        assert_eq!(format_duration(Duration::from_secs(187)), "3m 7s");
        assert_eq!(format_duration(Duration::from_secs(7500)), "2h 5m 0s");
    }
}
