//! Requested credential lifetimes.

use std::{fmt, str::FromStr, time::Duration};

use crate::ValidationError;

/// A credential lifetime accepted by the role-assumption endpoint.
///
/// The value is always within [`MIN`](Self::MIN) and [`MAX`](Self::MAX) inclusive, so it can be
/// sent as `DurationSeconds` without further checks.
#[allow(clippy::module_name_repetitions)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionDuration(Duration);

impl SessionDuration {
    /// The shortest lifetime, 15 minutes.
    pub const MIN: Duration = Duration::from_secs(15 * 60);

    /// The longest lifetime, 12 hours.
    pub const MAX: Duration = Duration::from_secs(12 * 60 * 60);

    /// The lifetime used when none is given, 1 hour.
    pub const DEFAULT: Self = Self(Duration::from_secs(60 * 60));

    /// Validate `duration` against the accepted bounds.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::DurationOutOfRange`] naming the violated bound.
    pub fn new(duration: Duration) -> Result<Self, ValidationError> {
        if duration < Self::MIN {
            return Err(ValidationError::DurationOutOfRange {
                bound: "be less than 15 minutes",
                specified: format(duration),
            });
        }
        if duration > Self::MAX {
            return Err(ValidationError::DurationOutOfRange {
                bound: "exceed 12 hours",
                specified: format(duration),
            });
        }
        Ok(Self(duration))
    }

    /// Validate a lifetime given in whole seconds.
    ///
    /// # Errors
    ///
    /// See [`new`](Self::new).
    pub fn from_secs(secs: u64) -> Result<Self, ValidationError> {
        Self::new(Duration::from_secs(secs))
    }

    /// Parse and validate a duration string. See [`parse`] for the accepted syntax.
    ///
    /// # Errors
    ///
    /// Fails if the string cannot be parsed or the value is out of bounds.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        parse(input).and_then(Self::new)
    }

    /// Whole seconds, as sent in `DurationSeconds`.
    #[must_use]
    pub fn as_secs(self) -> u64 {
        self.0.as_secs()
    }

    /// The lifetime as a [`Duration`].
    #[must_use]
    pub fn as_duration(self) -> Duration {
        self.0
    }
}

impl Default for SessionDuration {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl FromStr for SessionDuration {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for SessionDuration {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&format(self.0))
    }
}

impl From<SessionDuration> for Duration {
    fn from(duration: SessionDuration) -> Self {
        duration.0
    }
}

/// Parse a duration string without checking bounds.
///
/// Accepts bare seconds (`3600`), or one or more `<number><unit>` groups where the unit is `h`,
/// `m` or `s` and the number may have a fractional part (`1h30m`, `1.5h`, `90m`, `3600s`). An
/// empty string means one hour.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidDuration`] for anything else, including negative values.
pub fn parse(input: &str) -> Result<Duration, ValidationError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(SessionDuration::DEFAULT.0);
    }

    let invalid = || ValidationError::InvalidDuration(input.to_string());

    if trimmed.bytes().all(|byte| byte.is_ascii_digit()) {
        return trimmed.parse().map(Duration::from_secs).map_err(|_| invalid());
    }

    let mut total = 0f64;
    let mut rest = trimmed;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(invalid)?;
        if number_len == 0 {
            return Err(invalid());
        }
        let value: f64 = rest[..number_len].parse().map_err(|_| invalid())?;
        let scale = match rest[number_len..].chars().next() {
            Some('h') => 3600.0,
            Some('m') => 60.0,
            Some('s') => 1.0,
            _ => return Err(invalid()),
        };
        total += value * scale;
        rest = &rest[number_len + 1..];
    }

    Duration::try_from_secs_f64(total).map_err(|_| invalid())
}

/// Format a duration the way it is shown to users: `1h`, `1h 30m`, `20m 30s`, `45s`.
///
/// Only the two most significant non-zero units are shown, and seconds are dropped once the
/// duration reaches an hour.
#[must_use]
pub fn format(duration: Duration) -> String {
    let total = duration.as_secs();
    let hours = total / 3600;
    let minutes = total / 60 % 60;
    let seconds = total % 60;

    match (hours, minutes, seconds) {
        (0, 0, s) => format!("{s}s"),
        (0, m, 0) => format!("{m}m"),
        (0, m, s) => format!("{m}m {s}s"),
        (h, 0, _) => format!("{h}h"),
        (h, m, _) => format!("{h}h {m}m"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_known_forms() {
        let cases = [
            ("", 3600),
            ("3600", 3600),
            ("30m", 1800),
            ("2h", 7200),
            ("1800s", 1800),
            ("1h30m", 5400),
            ("1.5h", 5400),
            ("1h30m15s", 5415),
            (" 45m ", 2700),
        ];
        for (input, secs) in cases {
            assert_eq!(parse(input), Ok(Duration::from_secs(secs)), "{input:?}");
        }
    }

    #[test]
    fn parse_rejects_garbage() {
        for input in ["invalid", "-30m", "1x", "h", "1h30", "1..5h", "30 m"] {
            let error = parse(input).unwrap_err();
            assert!(
                matches!(error, ValidationError::InvalidDuration(_)),
                "{input:?}: {error:?}"
            );
        }
    }

    #[test]
    fn bounds_are_inclusive() {
        assert!(SessionDuration::from_secs(900).is_ok());
        assert!(SessionDuration::from_secs(43200).is_ok());

        let short = SessionDuration::from_secs(899).unwrap_err();
        assert!(short.to_string().contains("less than 15 minutes"), "{short}");
        let long = SessionDuration::from_secs(43201).unwrap_err();
        assert!(long.to_string().contains("exceed 12 hours"), "{long}");
        assert!(SessionDuration::from_secs(0).is_err());
    }

    #[test]
    fn from_str_parses_then_validates() {
        assert_eq!("2h".parse::<SessionDuration>().unwrap().as_secs(), 7200);
        assert_eq!("".parse::<SessionDuration>().unwrap(), SessionDuration::DEFAULT);
        assert!("14m".parse::<SessionDuration>().is_err());
        assert!("13h".parse::<SessionDuration>().is_err());
    }

    #[test]
    fn format_matches_cli_output() {
        let cases = [
            (3600, "1h"),
            (1800, "30m"),
            (5400, "1h 30m"),
            (1890, "31m 30s"),
            (9045, "2h 30m"),
            (45, "45s"),
            (0, "0s"),
        ];
        for (secs, expected) in cases {
            assert_eq!(format(Duration::from_secs(secs)), expected);
        }
    }
}
