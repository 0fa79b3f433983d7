//! Human-readable renderings of numbers, durations and timestamps.

use chrono::DateTime;

use crate::template::printf::format_float;

const SI_LARGE: [&str; 8] = ["k", "M", "G", "T", "P", "E", "Z", "Y"];
const SI_SMALL: [&str; 8] = ["m", "u", "n", "p", "f", "a", "z", "y"];
const IEC: [&str; 8] = ["ki", "Mi", "Gi", "Ti", "Pi", "Ei", "Zi", "Yi"];

/// Largest magnitude, in seconds, whose nanosecond count fits in an i64.
const MAX_TIMESTAMP_SECS: f64 = i64::MAX as f64 / 1e9;

fn g4(v: f64) -> String {
    format_float(v, Some(4))
}

/// Scales `v` by powers of 1000 and appends an SI prefix.
pub(crate) fn humanize(mut v: f64) -> String {
    if v == 0.0 || !v.is_finite() {
        return g4(v);
    }
    let mut prefix = "";
    if v.abs() >= 1.0 {
        for p in SI_LARGE {
            if v.abs() < 1000.0 {
                break;
            }
            prefix = p;
            v /= 1000.0;
        }
    } else {
        for p in SI_SMALL {
            if v.abs() >= 1.0 {
                break;
            }
            prefix = p;
            v *= 1000.0;
        }
    }
    format!("{}{prefix}", g4(v))
}

/// Scales `v` by powers of 1024 and appends an IEC prefix.
pub(crate) fn humanize_1024(mut v: f64) -> String {
    if v.abs() <= 1.0 || !v.is_finite() {
        return g4(v);
    }
    let mut prefix = "";
    for p in IEC {
        if v.abs() < 1024.0 {
            break;
        }
        prefix = p;
        v /= 1024.0;
    }
    format!("{}{prefix}", g4(v))
}

/// Renders a number of seconds as `1d 2h 3m 4s`, or with an SI prefix below
/// one second.
pub(crate) fn humanize_duration(mut v: f64) -> String {
    if !v.is_finite() {
        return g4(v);
    }
    if v == 0.0 {
        return "0s".to_string();
    }
    if v.abs() >= 1.0 {
        let sign = if v < 0.0 { "-" } else { "" };
        v = v.abs();
        let total = v as i64;
        let seconds = total % 60;
        let minutes = (total / 60) % 60;
        let hours = (total / 3600) % 24;
        let days = total / 86_400;
        return if days != 0 {
            format!("{sign}{days}d {hours}h {minutes}m {seconds}s")
        } else if hours != 0 {
            format!("{sign}{hours}h {minutes}m {seconds}s")
        } else if minutes != 0 {
            format!("{sign}{minutes}m {seconds}s")
        } else {
            format!("{sign}{}s", g4(v))
        };
    }

    let mut prefix = "";
    for p in SI_SMALL {
        if v.abs() >= 1.0 {
            break;
        }
        prefix = p;
        v *= 1000.0;
    }
    format!("{}{prefix}s", g4(v))
}

/// Renders a ratio as a percentage.
pub(crate) fn humanize_percentage(v: f64) -> String {
    format!("{}%", g4(v * 100.0))
}

/// Renders a Unix timestamp in seconds as a UTC time.
pub(crate) fn humanize_timestamp(v: f64) -> Result<String, String> {
    if !v.is_finite() {
        return Ok(g4(v));
    }
    if v.abs() >= MAX_TIMESTAMP_SECS {
        return Err(format!(
            "{} cannot be represented as a nanoseconds timestamp since it overflows int64",
            format_float(v, None)
        ));
    }

    // Timestamps carry millisecond precision, truncated toward zero.
    let millis = (v * 1e9) as i64 / 1_000_000;
    let time = DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| format!("timestamp {} out of range", format_float(v, None)))?;
    let nanos = time.timestamp_subsec_nanos();

    let mut out = time.format("%Y-%m-%d %H:%M:%S").to_string();
    if nanos > 0 {
        let frac = format!("{nanos:09}");
        out.push('.');
        out.push_str(frac.trim_end_matches('0'));
    }
    out.push_str(" +0000 UTC");
    Ok(out)
}

/// Converts a Unix timestamp in seconds to a UTC time.
pub(crate) fn to_time(v: f64) -> Result<String, String> {
    if !v.is_finite() {
        return Err("value is NaN or Inf".to_string());
    }
    humanize_timestamp(v)
}

/// Renders seconds the way Go prints a `time.Duration`: `1h2m3.5s`, or a
/// single sub-second unit such as `1.5ms`.
pub(crate) fn go_duration(secs: f64) -> String {
    const SECOND: u64 = 1_000_000_000;
    const MINUTE: u64 = 60 * SECOND;
    const HOUR: u64 = 60 * MINUTE;

    let nanos = (secs * 1e9) as i64;
    if nanos == 0 {
        return "0s".to_string();
    }
    let mut out = String::new();
    if nanos < 0 {
        out.push('-');
    }
    let u = nanos.unsigned_abs();

    if u < SECOND {
        let (scale, unit) = match u {
            0..1_000 => (1, "ns"),
            1_000..1_000_000 => (1_000, "µs"),
            _ => (1_000_000, "ms"),
        };
        out.push_str(&decimal(u, scale));
        out.push_str(unit);
        return out;
    }

    let hours = u / HOUR;
    let minutes = u % HOUR / MINUTE;
    if hours > 0 {
        out.push_str(&format!("{hours}h"));
    }
    if hours > 0 || minutes > 0 {
        out.push_str(&format!("{minutes}m"));
    }
    out.push_str(&decimal(u % MINUTE, SECOND));
    out.push('s');
    out
}

/// `v / scale` with the fraction's trailing zeros dropped.
fn decimal(v: u64, scale: u64) -> String {
    let (whole, frac) = (v / scale, v % scale);
    if frac == 0 {
        return whole.to_string();
    }
    let digits = scale.ilog10() as usize;
    let frac = format!("{frac:0digits$}");
    format!("{whole}.{}", frac.trim_end_matches('0'))
}
