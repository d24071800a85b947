//! Shared configuration.

use core::fmt;
use once_cell::sync::Lazy;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::str::FromStr;
use std::time::Duration as StdDuration;

use crate::Error;

/// How a value differs from the one seen in the previous reconciliation cycle.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// No difference since the last cycle.
    #[default]
    Unchanged,

    /// Added or modified since the last cycle.
    Changed,

    /// Present in the last cycle, gone now.
    Removed,
}

impl Status {
    pub fn is_unchanged(&self) -> bool {
        matches!(self, Status::Unchanged)
    }

    pub fn is_removed(&self) -> bool {
        matches!(self, Status::Removed)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Unchanged => "unchanged",
            Status::Changed => "changed",
            Status::Removed => "removed",
        };
        f.write_str(s)
    }
}

/// Parse a boolean from the strict `true`/`false` vocabulary.
///
/// ```
/// use lbconf_api::parse_bool;
///
/// assert_eq!(parse_bool("true"), Ok(true));
/// assert_eq!(parse_bool("false"), Ok(false));
/// assert!(parse_bool("yes").is_err());
/// ```
pub fn parse_bool(value: &str) -> Result<bool, Error> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(Error::parse(format!(
            "expected 'true' or 'false', got '{other}'"
        ))),
    }
}

/// Parse a non-negative integer.
pub(crate) fn parse_u64(value: &str) -> Result<u64, Error> {
    value
        .parse()
        .map_err(|e| Error::parse(format!("invalid integer '{value}': {e}")))
}

// RFC 1123 hostname, optionally with a leading dot so cookies can be scoped to
// a whole domain.
const HOSTNAME_PATTERN: &str =
    r"^\.?[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?(\.[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?)*$";

/// Check that a string is a valid hostname.
pub(crate) fn validate_hostname(hostname: &str) -> Result<(), Error> {
    // the pattern is a compile-time constant. if it doesn't compile, that's a
    // bug, not bad input.
    static RE: Lazy<regex::Regex> = Lazy::new(|| {
        regex::Regex::new(HOSTNAME_PATTERN).unwrap_or_else(|_| {
            panic!(r#"hostname regex "{HOSTNAME_PATTERN}" did not compile (this is a bug!)"#)
        })
    });

    if hostname.len() > 253 || !RE.is_match(hostname) {
        return Err(Error::validation(format!("invalid hostname '{hostname}'")));
    }
    Ok(())
}

/// A wrapper around [std::time::Duration] that parses the proxy's time
/// format, `<n>[us|ms|s|m|h|d]`, where a bare number is in milliseconds.
///
/// Serializes to and from a f64 number of seconds. Deserializing also accepts
/// the string format.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Duration(StdDuration);

impl Duration {
    pub const fn new(secs: u64, nanos: u32) -> Duration {
        Duration(StdDuration::new(secs, nanos))
    }
}

impl AsRef<StdDuration> for Duration {
    fn as_ref(&self) -> &StdDuration {
        &self.0
    }
}

impl std::ops::Deref for Duration {
    type Target = StdDuration;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Debug for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

/// Formats in the proxy's time format, using the largest unit that represents
/// the duration exactly.
impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let micros = self.0.as_micros();
        if micros == 0 {
            return f.write_str("0ms");
        }

        for (unit, scale) in UNITS.iter().rev() {
            if micros % scale == 0 {
                return write!(f, "{}{unit}", micros / scale);
            }
        }
        write!(f, "{micros}us")
    }
}

// ordered smallest to largest, scaled to microseconds.
const UNITS: &[(&str, u128)] = &[
    ("us", 1),
    ("ms", 1_000),
    ("s", 1_000_000),
    ("m", 60_000_000),
    ("h", 3_600_000_000),
    ("d", 86_400_000_000),
];

impl FromStr for Duration {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        static RE: Lazy<regex::Regex> = Lazy::new(|| {
            regex::Regex::new(r"^(\d+)(us|ms|s|m|h|d)?$")
                .unwrap_or_else(|_| panic!("duration regex did not compile (this is a bug!)"))
        });

        let captures = RE
            .captures(s.trim())
            .ok_or_else(|| Error::parse(format!("invalid duration '{s}'")))?;

        let value: u64 = captures[1]
            .parse()
            .map_err(|_| Error::parse(format!("duration '{s}' is out of range")))?;

        let duration = match captures.get(2).map(|m| m.as_str()) {
            Some("us") => Some(StdDuration::from_micros(value)),
            Some("ms") | None => Some(StdDuration::from_millis(value)),
            Some("s") => Some(StdDuration::from_secs(value)),
            Some("m") => value.checked_mul(60).map(StdDuration::from_secs),
            Some("h") => value.checked_mul(3_600).map(StdDuration::from_secs),
            Some("d") => value.checked_mul(86_400).map(StdDuration::from_secs),
            Some(_) => None,
        };

        duration
            .map(Duration)
            .ok_or_else(|| Error::parse(format!("duration '{s}' is out of range")))
    }
}

impl From<Duration> for StdDuration {
    fn from(val: Duration) -> Self {
        val.0
    }
}

impl From<StdDuration> for Duration {
    fn from(duration: StdDuration) -> Self {
        Duration(duration)
    }
}

macro_rules! duration_from {
    ($($(#[$attr:meta])* $method:ident: $arg:ty),* $(,)*) => {
        impl Duration {
            $(
            $(#[$attr])*
            pub fn $method(val: $arg) -> Self {
                Duration(StdDuration::$method(val))
            }
            )*
        }
    };
}

duration_from! {
    /// Create a new `Duration` from a whole number of seconds. See
    /// [Duration::from_secs][std::time::Duration::from_secs].
    from_secs: u64,

    /// Create a new `Duration` from a whole number of milliseconds. See
    /// [Duration::from_millis][std::time::Duration::from_millis].
    from_millis: u64,

    /// Create a new `Duration` from a whole number of microseconds. See
    /// [Duration::from_micros][std::time::Duration::from_micros].
    from_micros: u64,
}

impl Serialize for Duration {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(self.as_secs_f64())
    }
}

impl<'de> Deserialize<'de> for Duration {
    fn deserialize<D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct DurationVisitor;

        impl<'de> Visitor<'de> for DurationVisitor {
            type Value = Duration;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a number of seconds or a duration string")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Duration::from_str(v).map_err(E::custom)
            }

            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                StdDuration::try_from_secs_f64(v)
                    .map(Duration)
                    .map_err(E::custom)
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(Duration(StdDuration::from_secs(v)))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                let v: u64 = v
                    .try_into()
                    .map_err(|_| E::custom("Duration cannot be negative"))?;

                Ok(Duration(StdDuration::from_secs(v)))
            }
        }

        deserializer.deserialize_any(DurationVisitor)
    }
}
