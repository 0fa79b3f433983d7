//! Prometheus-style durations.
//!
//! Rule files, validator parameters and the `parseDuration` template function
//! all use the Prometheus duration syntax: an ordered sequence of
//! `<integer><unit>` pairs with units `y`, `w`, `d`, `h`, `m`, `s` and `ms`,
//! or the bare string `0`.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use once_cell::sync::Lazy;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use regex::Regex;
use thiserror::Error;

const MS_PER_SECOND: u64 = 1000;
const MS_PER_MINUTE: u64 = 60 * MS_PER_SECOND;
const MS_PER_HOUR: u64 = 60 * MS_PER_MINUTE;
const MS_PER_DAY: u64 = 24 * MS_PER_HOUR;
const MS_PER_WEEK: u64 = 7 * MS_PER_DAY;
const MS_PER_YEAR: u64 = 365 * MS_PER_DAY;

/// Largest representable duration in milliseconds (i64 nanoseconds).
const MAX_MILLIS: u64 = i64::MAX as u64 / 1_000_000;

static DURATION_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(([0-9]+)y)?(([0-9]+)w)?(([0-9]+)d)?(([0-9]+)h)?(([0-9]+)m)?(([0-9]+)s)?(([0-9]+)ms)?$",
    )
    .unwrap_or_else(|_| unreachable!())
});

/// Capture group index and millisecond multiplier for each unit, largest first.
const UNITS: [(usize, u64); 7] = [
    (2, MS_PER_YEAR),
    (4, MS_PER_WEEK),
    (6, MS_PER_DAY),
    (8, MS_PER_HOUR),
    (10, MS_PER_MINUTE),
    (12, MS_PER_SECOND),
    (14, 1),
];

/// Errors produced while parsing a duration string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationError {
    /// The input was empty.
    #[error("empty duration string")]
    Empty,

    /// The input did not match the duration syntax.
    #[error("not a valid duration string: {0:?}")]
    Invalid(String),

    /// The input overflowed the representable range.
    #[error("duration out of range: {0:?}")]
    OutOfRange(String),
}

/// A non-negative duration with millisecond precision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PromDuration(Duration);

impl PromDuration {
    /// The zero duration, meaning "not set" wherever a duration is optional.
    pub const ZERO: Self = Self(Duration::ZERO);

    /// Creates a duration from milliseconds.
    #[must_use]
    pub const fn from_millis(ms: u64) -> Self {
        Self(Duration::from_millis(ms))
    }

    /// Creates a duration from seconds.
    #[must_use]
    pub const fn from_secs(secs: u64) -> Self {
        Self(Duration::from_secs(secs))
    }

    /// Creates a duration from minutes.
    #[must_use]
    pub const fn from_mins(mins: u64) -> Self {
        Self(Duration::from_secs(mins * 60))
    }

    /// Returns true for the zero duration.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Returns the duration in whole milliseconds.
    #[must_use]
    pub const fn as_millis(&self) -> u64 {
        self.0.as_millis() as u64
    }

    /// Returns the duration in fractional seconds.
    #[must_use]
    pub fn as_secs_f64(&self) -> f64 {
        self.0.as_secs_f64()
    }

    /// Returns the underlying [`Duration`].
    #[must_use]
    pub const fn as_duration(&self) -> Duration {
        self.0
    }
}

impl From<Duration> for PromDuration {
    fn from(duration: Duration) -> Self {
        // Sub-millisecond precision is not representable in the text form.
        Self::from_millis(duration.as_millis() as u64)
    }
}

impl FromStr for PromDuration {
    type Err = DurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "0" => return Ok(Self::ZERO),
            "" => return Err(DurationError::Empty),
            _ => {}
        }

        let caps = DURATION_REGEX
            .captures(s)
            .ok_or_else(|| DurationError::Invalid(s.to_string()))?;

        let mut total: u64 = 0;
        for (group, mult) in UNITS {
            let Some(m) = caps.get(group) else {
                continue;
            };
            let n: u64 = m
                .as_str()
                .parse()
                .map_err(|_| DurationError::OutOfRange(s.to_string()))?;
            total = n
                .checked_mul(mult)
                .and_then(|v| total.checked_add(v))
                .filter(|v| *v <= MAX_MILLIS)
                .ok_or_else(|| DurationError::OutOfRange(s.to_string()))?;
        }

        Ok(Self::from_millis(total))
    }
}

impl fmt::Display for PromDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ms = self.as_millis();
        if ms == 0 {
            return f.write_str("0s");
        }

        // Weeks are only used when they divide the remainder evenly; 90d
        // reads better than 12w6d.
        let units: [(&str, u64, bool); 7] = [
            ("y", MS_PER_YEAR, false),
            ("w", MS_PER_WEEK, true),
            ("d", MS_PER_DAY, false),
            ("h", MS_PER_HOUR, false),
            ("m", MS_PER_MINUTE, false),
            ("s", MS_PER_SECOND, false),
            ("ms", 1, false),
        ];
        for (unit, mult, exact) in units {
            if exact && ms % mult != 0 {
                continue;
            }
            let v = ms / mult;
            if v > 0 {
                write!(f, "{v}{unit}")?;
                ms -= v * mult;
            }
        }
        Ok(())
    }
}

impl Serialize for PromDuration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PromDuration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DurationVisitor;

        impl Visitor<'_> for DurationVisitor {
            type Value = PromDuration;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a duration string such as \"5m\" or \"1h30m\"")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                v.parse().map_err(E::custom)
            }

            // YAML scalars like `0` arrive as integers.
            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                self.visit_str(&v.to_string())
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                self.visit_str(&v.to_string())
            }
        }

        deserializer.deserialize_any(DurationVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("0", 0 ; "bare zero")]
    #[test_case("0s", 0 ; "zero seconds")]
    #[test_case("500ms", 500 ; "milliseconds")]
    #[test_case("5m", 5 * MS_PER_MINUTE ; "minutes")]
    #[test_case("1h30m", MS_PER_HOUR + 30 * MS_PER_MINUTE ; "hours and minutes")]
    #[test_case("2w", 2 * MS_PER_WEEK ; "weeks")]
    #[test_case("1y", MS_PER_YEAR ; "years")]
    #[test_case("1d2h3m4s5ms", MS_PER_DAY + 2 * MS_PER_HOUR + 3 * MS_PER_MINUTE + 4 * MS_PER_SECOND + 5 ; "every unit")]
    fn parse_valid(input: &str, expected_ms: u64) {
        let parsed: PromDuration = input.parse().unwrap();
        assert_eq!(parsed.as_millis(), expected_ms);
    }

    #[test_case("" ; "empty")]
    #[test_case("5" ; "no unit")]
    #[test_case("5x" ; "unknown unit")]
    #[test_case("1m1h" ; "wrong order")]
    #[test_case("-5m" ; "negative")]
    #[test_case("1.5h" ; "fractional")]
    #[test_case(" 5m" ; "leading space")]
    fn parse_invalid(input: &str) {
        assert!(input.parse::<PromDuration>().is_err());
    }

    #[test]
    fn parse_empty_is_distinct_error() {
        assert_eq!("".parse::<PromDuration>(), Err(DurationError::Empty));
    }

    #[test]
    fn parse_overflow() {
        let result = "99999999999999999y".parse::<PromDuration>();
        assert!(matches!(result, Err(DurationError::OutOfRange(_))));
    }

    #[test_case(0, "0s")]
    #[test_case(1, "1ms")]
    #[test_case(10 * MS_PER_MINUTE, "10m")]
    #[test_case(MS_PER_HOUR + 30 * MS_PER_MINUTE, "1h30m")]
    #[test_case(90 * MS_PER_DAY, "90d")]
    #[test_case(14 * MS_PER_DAY, "2w")]
    #[test_case(MS_PER_YEAR, "1y")]
    #[test_case(MS_PER_SECOND + 500, "1s500ms")]
    #[test_case(366 * MS_PER_DAY, "1y1d" ; "year with day remainder")]
    #[test_case(400 * MS_PER_DAY, "1y5w" ; "year with week remainder")]
    #[test_case(MS_PER_YEAR + MS_PER_HOUR, "1y1h" ; "year with hour remainder")]
    fn display(ms: u64, expected: &str) {
        assert_eq!(PromDuration::from_millis(ms).to_string(), expected);
    }

    #[test]
    fn display_round_trips_through_parse() {
        let d = PromDuration::from_millis(3 * MS_PER_DAY + 4 * MS_PER_HOUR + 7);
        assert_eq!(d.to_string().parse::<PromDuration>(), Ok(d));
    }

    #[test]
    fn ordering_follows_length() {
        assert!(PromDuration::from_mins(10) > PromDuration::from_mins(5));
        assert!(PromDuration::ZERO < PromDuration::from_millis(1));
    }

    #[test]
    fn deserialize_from_yaml() {
        let d: PromDuration = serde_yaml::from_str("1h").unwrap();
        assert_eq!(d, PromDuration::from_mins(60));

        let zero: PromDuration = serde_yaml::from_str("0").unwrap_or(PromDuration::from_secs(1));
        assert!(zero.is_zero());

        assert!(serde_yaml::from_str::<PromDuration>("ten minutes").is_err());
    }

    #[test]
    fn serialize_to_yaml() {
        let yaml = serde_yaml::to_string(&PromDuration::from_mins(5)).unwrap();
        assert_eq!(yaml.trim(), "5m");
    }
}
