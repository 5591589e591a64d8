use std::fmt;
use std::str::FromStr;
use std::time::Duration;

const MILLIS_PER_SECOND: u64 = 1_000;
const MILLIS_PER_MINUTE: u64 = 60 * MILLIS_PER_SECOND;
const MILLIS_PER_HOUR: u64 = 60 * MILLIS_PER_MINUTE;
const MILLIS_PER_DAY: u64 = 24 * MILLIS_PER_HOUR;
const MILLIS_PER_WEEK: u64 = 7 * MILLIS_PER_DAY;
const MILLIS_PER_YEAR: u64 = 365 * MILLIS_PER_DAY;

/// Units in the order they must appear, largest first.
const UNITS: [(&str, u64); 7] = [
    ("y", MILLIS_PER_YEAR),
    ("w", MILLIS_PER_WEEK),
    ("d", MILLIS_PER_DAY),
    ("h", MILLIS_PER_HOUR),
    ("m", MILLIS_PER_MINUTE),
    ("s", MILLIS_PER_SECOND),
    ("ms", 1),
];

/// Units used when rendering. Weeks and years are left out so that `7d`
/// stays `7d` in generated queries and logs.
const DISPLAY_UNITS: [(&str, u64); 5] = [
    ("d", MILLIS_PER_DAY),
    ("h", MILLIS_PER_HOUR),
    ("m", MILLIS_PER_MINUTE),
    ("s", MILLIS_PER_SECOND),
    ("ms", 1),
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DurationError {
    #[error("empty duration")]
    Empty,

    #[error("invalid duration '{0}': expected one or more <number><unit> groups")]
    Malformed(String),

    #[error("invalid duration '{input}': unknown unit '{unit}'")]
    UnknownUnit { input: String, unit: String },

    #[error("invalid duration '{0}': units must appear once each, largest first")]
    UnitOrder(String),

    #[error("duration '{0}' is too large")]
    Overflow(String),
}

/// A non-negative duration written in Prometheus syntax (`5m`, `1h30m`, `3d`).
///
/// # Examples
///
/// ```
/// use alertcheck_common::duration::PromDuration;
///
/// let d: PromDuration = "1h30m".parse().unwrap();
/// assert_eq!(d.as_millis(), 90 * 60 * 1000);
/// assert_eq!(d.to_string(), "1h30m");
/// assert_eq!("7d".parse::<PromDuration>().unwrap().to_string(), "7d");
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PromDuration(u64);

impl PromDuration {
    pub const ZERO: PromDuration = PromDuration(0);

    pub fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    pub fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(MILLIS_PER_SECOND))
    }

    pub fn parse(input: &str) -> Result<Self, DurationError> {
        let text = input.trim();
        if text.is_empty() {
            return Err(DurationError::Empty);
        }

        let bytes = text.as_bytes();
        let mut pos = 0;
        let mut total: u64 = 0;
        // Index into UNITS of the last unit seen; each group must use a smaller one.
        let mut last_rank: Option<usize> = None;

        while pos < bytes.len() {
            let digits_start = pos;
            while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                pos += 1;
            }
            if digits_start == pos {
                return Err(DurationError::Malformed(input.to_string()));
            }
            let value: u64 = text[digits_start..pos]
                .parse()
                .map_err(|_| DurationError::Overflow(input.to_string()))?;

            let unit_start = pos;
            while pos < bytes.len() && bytes[pos].is_ascii_alphabetic() {
                pos += 1;
            }
            let unit = &text[unit_start..pos];
            if unit.is_empty() {
                return Err(DurationError::Malformed(input.to_string()));
            }

            let rank = UNITS
                .iter()
                .position(|(name, _)| *name == unit)
                .ok_or_else(|| DurationError::UnknownUnit {
                    input: input.to_string(),
                    unit: unit.to_string(),
                })?;
            if last_rank.is_some_and(|last| rank <= last) {
                return Err(DurationError::UnitOrder(input.to_string()));
            }
            last_rank = Some(rank);

            total = value
                .checked_mul(UNITS[rank].1)
                .and_then(|millis| total.checked_add(millis))
                .ok_or_else(|| DurationError::Overflow(input.to_string()))?;
        }

        Ok(Self(total))
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Drops everything below a whole minute.
    pub fn truncate_to_minute(&self) -> Self {
        Self(self.0 - self.0 % MILLIS_PER_MINUTE)
    }

    pub fn checked_sub(&self, other: PromDuration) -> Option<PromDuration> {
        self.0.checked_sub(other.0).map(Self)
    }

    pub fn as_std(&self) -> Duration {
        Duration::from_millis(self.0)
    }
}

impl fmt::Display for PromDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return f.write_str("0s");
        }
        let mut rest = self.0;
        for (unit, millis) in DISPLAY_UNITS {
            let count = rest / millis;
            if count > 0 {
                write!(f, "{count}{unit}")?;
                rest %= millis;
            }
        }
        Ok(())
    }
}

impl FromStr for PromDuration {
    type Err = DurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<PromDuration> for Duration {
    fn from(value: PromDuration) -> Self {
        value.as_std()
    }
}
