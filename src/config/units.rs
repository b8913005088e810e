// src/config/units.rs

//! Parsers for the human-readable quantities used in the config file:
//! byte sizes (`"500M"`) and durations (`"3s"`).

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::errors::ProcwardenError;

const KIB: u64 = 1024;
const MIB: u64 = KIB * 1024;
const GIB: u64 = MIB * 1024;

/// A number of bytes, parsed from strings like `"500M"`, `"1G"`, `"512K"`
/// or a plain `"1048576"`.
///
/// Units are 1024-based and case-insensitive; a trailing `B` is allowed
/// (`"500MB"`). TOML integers are accepted as a raw byte count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ByteSize(pub u64);

impl ByteSize {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl FromStr for ByteSize {
    type Err = ProcwardenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_byte_size(s).map(ByteSize)
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = self.0;
        if n != 0 && n % GIB == 0 {
            write!(f, "{}G", n / GIB)
        } else if n != 0 && n % MIB == 0 {
            write!(f, "{}M", n / MIB)
        } else if n != 0 && n % KIB == 0 {
            write!(f, "{}K", n / KIB)
        } else {
            write!(f, "{n}B")
        }
    }
}

impl<'de> Deserialize<'de> for ByteSize {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(u64),
            Str(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Int(n) => Ok(ByteSize(n)),
            Raw::Str(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// Parse a byte quantity. See [`ByteSize`] for the accepted forms.
pub fn parse_byte_size(s: &str) -> Result<u64, ProcwardenError> {
    let invalid = |reason: &str| ProcwardenError::InvalidSize {
        value: s.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(invalid("empty size string"));
    }

    let idx = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (num_part, unit_part) = trimmed.split_at(idx);
    if num_part.is_empty() {
        return Err(invalid("missing number"));
    }

    let value: u64 = num_part
        .parse()
        .map_err(|_| invalid("number out of range"))?;

    let unit = unit_part.trim().to_ascii_uppercase();
    let multiplier = match unit.as_str() {
        "" | "B" => 1,
        "K" | "KB" => KIB,
        "M" | "MB" => MIB,
        "G" | "GB" => GIB,
        _ => return Err(invalid("unknown unit; expected K, M or G")),
    };

    value
        .checked_mul(multiplier)
        .ok_or_else(|| invalid("size overflows 64 bits"))
}

/// Parse a simple duration string like `"3s"`, `"250ms"`, `"1m"`, `"2h"`.
pub fn parse_duration(s: &str) -> Result<Duration, ProcwardenError> {
    let invalid = |reason: String| ProcwardenError::InvalidDuration {
        value: s.to_string(),
        reason,
    };

    let s = s.trim();
    if s.is_empty() {
        return Err(invalid("empty duration string".to_string()));
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| invalid("duration missing unit suffix".to_string()))?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| invalid(format!("invalid duration number '{num_part}': {e}")))?;
    let unit = unit_part.trim().to_lowercase();

    let secs = |per: u64| {
        value
            .checked_mul(per)
            .map(Duration::from_secs)
            .ok_or_else(|| invalid("duration out of range".to_string()))
    };

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => secs(60),
        "h" => secs(60 * 60),
        _ => Err(invalid(format!(
            "unsupported duration unit '{unit}'; expected ms, s, m, or h"
        ))),
    }
}

/// Serde helper for `Duration` fields written as strings.
pub(crate) fn de_duration<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let s = String::deserialize(deserializer)?;
    parse_duration(&s).map_err(serde::de::Error::custom)
}

/// Serde helper for optional `Duration` fields written as strings.
pub(crate) fn de_opt_duration<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Duration>, D::Error> {
    let s = Option::<String>::deserialize(deserializer)?;
    s.map(|s| parse_duration(&s).map_err(serde::de::Error::custom))
        .transpose()
}
