//! Lookback windows and their resolution against a cutoff.
//!
//! Every window resolves to a half-open interval `[start, cutoff)`:
//!
//! | syntax          | interval                      |
//! |-----------------|-------------------------------|
//! | `30d`           | `[cutoff − 30 days, cutoff)`  |
//! | `12h`           | `[cutoff − 12 hours, cutoff)` |
//! | `4w`            | `[cutoff − 28 days, cutoff)`  |
//! | `up_to_cutoff`  | `(−∞, cutoff)`                |
//! | `since:<date>`  | `[date, cutoff)`              |
//!
//! The upper bound is always the cutoff itself and is exclusive, so an event
//! stamped exactly at the cutoff never falls inside any window.

use std::{fmt, str::FromStr};

use asof_data::Timestamp;
use chrono::TimeDelta;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    Lookback { amount: u32, unit: WindowUnit },
    UpToCutoff,
    Since(Timestamp),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowUnit {
    Hours,
    Days,
    Weeks,
}

#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
pub enum WindowError {
    #[display("unrecognized window syntax {input:?}")]
    Syntax { input: String },
    #[display("window length must be positive")]
    ZeroLength,
    #[display("lookback overflows the representable time range")]
    Overflow,
    #[display("window start {since} is not before cutoff {cutoff}")]
    NotBeforeCutoff { since: Timestamp, cutoff: Timestamp },
}

/// `[start, end)` with `start = None` meaning unbounded below.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedWindow {
    pub start: Option<Timestamp>,
    pub end: Timestamp,
}

impl ResolvedWindow {
    #[must_use]
    pub fn contains(&self, ts: Timestamp) -> bool {
        ts < self.end && self.start.is_none_or(|start| start <= ts)
    }
}

impl Window {
    /// Resolves the window against `cutoff`.
    pub fn resolve(self, cutoff: Timestamp) -> Result<ResolvedWindow, WindowError> {
        let start = match self {
            Self::UpToCutoff => None,
            Self::Lookback { amount, unit } => {
                if amount == 0 {
                    return Err(WindowError::ZeroLength);
                }
                let amount = i64::from(amount);
                let delta = match unit {
                    WindowUnit::Hours => TimeDelta::try_hours(amount),
                    WindowUnit::Days => TimeDelta::try_days(amount),
                    WindowUnit::Weeks => TimeDelta::try_weeks(amount),
                }
                .ok_or(WindowError::Overflow)?;
                Some(cutoff.checked_sub(delta).ok_or(WindowError::Overflow)?)
            }
            Self::Since(since) => {
                if since >= cutoff {
                    return Err(WindowError::NotBeforeCutoff { since, cutoff });
                }
                Some(since)
            }
        };
        Ok(ResolvedWindow { start, end: cutoff })
    }
}

impl FromStr for Window {
    type Err = WindowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let syntax = || WindowError::Syntax { input: s.to_owned() };
        let trimmed = s.trim();
        if trimmed == "up_to_cutoff" {
            return Ok(Self::UpToCutoff);
        }
        if let Some(date) = trimmed.strip_prefix("since:") {
            let since = date.parse().map_err(|_| syntax())?;
            return Ok(Self::Since(since));
        }
        let unit = match trimmed.chars().next_back() {
            Some('h') => WindowUnit::Hours,
            Some('d') => WindowUnit::Days,
            Some('w') => WindowUnit::Weeks,
            _ => return Err(syntax()),
        };
        let digits = &trimmed[..trimmed.len() - 1];
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(syntax());
        }
        // too many digits for u32 is an overflow, not a syntax problem
        let amount = digits.parse().map_err(|_| WindowError::Overflow)?;
        Ok(Self::Lookback { amount, unit })
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lookback { amount, unit } => {
                let unit = match unit {
                    WindowUnit::Hours => "h",
                    WindowUnit::Days => "d",
                    WindowUnit::Weeks => "w",
                };
                write!(f, "{amount}{unit}")
            }
            Self::UpToCutoff => f.write_str("up_to_cutoff"),
            Self::Since(since) => write!(f, "since:{since}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> Timestamp {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_forms() {
        assert_eq!(
            "30d".parse::<Window>().unwrap(),
            Window::Lookback {
                amount: 30,
                unit: WindowUnit::Days
            }
        );
        assert_eq!(
            "12h".parse::<Window>().unwrap(),
            Window::Lookback {
                amount: 12,
                unit: WindowUnit::Hours
            }
        );
        assert_eq!("up_to_cutoff".parse::<Window>().unwrap(), Window::UpToCutoff);
        assert_eq!(
            "since:2016-06-01".parse::<Window>().unwrap(),
            Window::Since(ts("2016-06-01"))
        );
    }

    #[test]
    fn test_parse_rejects() {
        for bad in ["", "d", "30", "30x", "-3d", "3.5d", "since:someday", "thirty days"] {
            assert!(
                matches!(bad.parse::<Window>(), Err(WindowError::Syntax { .. })),
                "{bad:?} should be a syntax error"
            );
        }
        assert_eq!("99999999999d".parse::<Window>(), Err(WindowError::Overflow));
    }

    #[test]
    fn test_resolve_lookback_is_half_open() {
        let cutoff = ts("2017-03-01");
        let w = "30d".parse::<Window>().unwrap().resolve(cutoff).unwrap();
        assert_eq!(w.start, Some(ts("2017-01-30")));
        assert!(w.contains(ts("2017-01-30")));
        assert!(w.contains(ts("2017-02-28T23:59:59Z")));
        assert!(!w.contains(cutoff));
        assert!(!w.contains(ts("2017-01-29T23:59:59Z")));
    }

    #[test]
    fn test_resolve_up_to_cutoff() {
        let cutoff = ts("2017-03-01");
        let w = Window::UpToCutoff.resolve(cutoff).unwrap();
        assert!(w.contains(ts("1970-01-01")));
        assert!(!w.contains(cutoff));
    }

    #[test]
    fn test_resolve_failures() {
        let cutoff = ts("2017-03-01");
        assert_eq!(
            "0d".parse::<Window>().unwrap().resolve(cutoff),
            Err(WindowError::ZeroLength)
        );
        assert_eq!(
            "4000000000w".parse::<Window>().unwrap().resolve(cutoff),
            Err(WindowError::Overflow)
        );
        assert_eq!(
            "since:2017-03-01".parse::<Window>().unwrap().resolve(cutoff),
            Err(WindowError::NotBeforeCutoff {
                since: cutoff,
                cutoff
            })
        );
    }

    #[test]
    fn test_display_round_trips() {
        for s in ["7d", "48h", "2w", "up_to_cutoff", "since:2016-06-01T00:00:00Z"] {
            assert_eq!(s.parse::<Window>().unwrap().to_string(), s);
        }
    }
}
