//! Clock and timestamp utilities.
//!
//! Two concerns live here:
//! - High-resolution wall-clock stamps used to namespace intermediate files
//! - Conversion between seconds and the `HH:MM:SS.ff` positions the
//!   transcoder reads and prints

/// Nanoseconds since the Unix epoch, used to make file names unique.
pub fn unique_stamp() -> i64 {
    let now = chrono::Utc::now();
    now.timestamp_nanos_opt()
        .unwrap_or_else(|| now.timestamp_micros().saturating_mul(1_000))
}

/// Format seconds as a transcoder position argument (`12.345`).
///
/// Negative and non-finite inputs are clamped to zero.
pub fn format_seconds(secs: f64) -> String {
    let secs = if secs.is_finite() { secs.max(0.0) } else { 0.0 };
    format!("{secs:.3}")
}

/// Format seconds as `HH:MM:SS.mmm` for human-facing output.
pub fn format_hms(secs: f64) -> String {
    let total_ms = if secs.is_finite() {
        (secs.max(0.0) * 1000.0).round() as u64
    } else {
        0
    };
    let ms = total_ms % 1000;
    let total_secs = total_ms / 1000;
    format!(
        "{:02}:{:02}:{:02}.{:03}",
        total_secs / 3600,
        (total_secs / 60) % 60,
        total_secs % 60,
        ms
    )
}

/// Parse a transcoder position (`HH:MM:SS.ff`, `MM:SS.ff` or plain seconds).
///
/// Returns `None` for `N/A` and malformed values. A leading `-` is honoured;
/// early frames are occasionally reported with a small negative offset.
pub fn parse_timestamp(value: &str) -> Option<f64> {
    let value = value.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("n/a") {
        return None;
    }

    let (sign, body) = match value.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, value),
    };

    let mut secs = 0.0f64;
    let mut parts = 0;
    for part in body.split(':') {
        parts += 1;
        if parts > 3 {
            return None;
        }
        let parsed = part.parse::<f64>().ok()?;
        if !parsed.is_finite() || parsed < 0.0 {
            return None;
        }
        secs = secs * 60.0 + parsed;
    }

    Some(sign * secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_stamp_advances() {
        let a = unique_stamp();
        let b = unique_stamp();
        assert!(a > 0);
        assert!(b >= a);
    }

    #[test]
    fn test_format_seconds_clamps() {
        assert_eq!(format_seconds(1.5), "1.500");
        assert_eq!(format_seconds(-3.0), "0.000");
        assert_eq!(format_seconds(f64::NAN), "0.000");
    }

    #[test]
    fn test_format_hms() {
        assert_eq!(format_hms(0.0), "00:00:00.000");
        assert_eq!(format_hms(3723.25), "01:02:03.250");
    }

    #[test]
    fn test_parse_timestamp_variants() {
        assert!((parse_timestamp("00:00:04.00").unwrap() - 4.0).abs() < 1e-9);
        assert!((parse_timestamp("01:02:03.50").unwrap() - 3723.5).abs() < 1e-9);
        assert!((parse_timestamp("02:30").unwrap() - 150.0).abs() < 1e-9);
        assert!((parse_timestamp("12.25").unwrap() - 12.25).abs() < 1e-9);
        assert!((parse_timestamp("-00:00:00.02").unwrap() + 0.02).abs() < 1e-9);
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        assert!(parse_timestamp("N/A").is_none());
        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("aa:bb").is_none());
        assert!(parse_timestamp("1:2:3:4").is_none());
    }
}
