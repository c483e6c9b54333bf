//! Aggregations over the events inside one resolved window.
//!
//! Aggregations are written as calls:
//!
//! ```text
//! count()                 number of events
//! sum(amount)             sum of a payload field
//! mean(amount)            mean of a payload field
//! min(amount) max(amount) extremes of a payload field
//! latest(amount)          field value of the most recent event carrying it
//! days_since_latest()     whole days from the most recent event to the cutoff
//! active_days()           distinct calendar days with at least one event
//! ratio(cancels, txns)    sum(cancels) / sum(txns)
//! ```
//!
//! Only finite payload values take part. An aggregation with nothing to
//! aggregate reports [`Outcome::Empty`], and a ratio whose denominator sums to
//! zero reports [`Outcome::ZeroDenominator`]; the caller maps both to
//! configured fills, so neither ever surfaces as a null or NaN.

use std::{collections::BTreeSet, fmt, str::FromStr};

use asof_data::{RawEvent, Timestamp};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Aggregation {
    Count,
    Sum(String),
    Mean(String),
    Min(String),
    Max(String),
    Latest(String),
    DaysSinceLatest,
    ActiveDays,
    Ratio { numerator: String, denominator: String },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    Value(f64),
    Empty,
    ZeroDenominator,
}

#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
#[display("invalid aggregation {input:?}: {reason}")]
pub struct AggregationParseError {
    pub input: String,
    pub reason: &'static str,
}

impl Aggregation {
    /// Payload fields this aggregation reads.
    #[must_use]
    pub fn fields(&self) -> Vec<&str> {
        match self {
            Self::Count | Self::DaysSinceLatest | Self::ActiveDays => vec![],
            Self::Sum(f) | Self::Mean(f) | Self::Min(f) | Self::Max(f) | Self::Latest(f) => {
                vec![f.as_str()]
            }
            Self::Ratio {
                numerator,
                denominator,
            } => vec![numerator.as_str(), denominator.as_str()],
        }
    }

    /// Aggregates `events`, which must be ordered by `(event_ts, seq)` and
    /// already restricted to the window ending at `cutoff`.
    #[expect(clippy::cast_precision_loss)]
    #[must_use]
    pub fn apply(&self, events: &[&RawEvent], cutoff: Timestamp) -> Outcome {
        if events.is_empty() {
            return Outcome::Empty;
        }
        let found = |v: Option<f64>| v.map_or(Outcome::Empty, Outcome::Value);

        match self {
            Self::Count => Outcome::Value(events.len() as f64),
            Self::Sum(f) => {
                let mut it = finite_values(events, f).peekable();
                if it.peek().is_none() {
                    return Outcome::Empty;
                }
                Outcome::Value(it.sum())
            }
            Self::Mean(f) => {
                let (sum, n) =
                    finite_values(events, f).fold((0.0, 0_usize), |(s, n), v| (s + v, n + 1));
                if n == 0 {
                    Outcome::Empty
                } else {
                    Outcome::Value(sum / n as f64)
                }
            }
            Self::Min(f) => found(finite_values(events, f).reduce(f64::min)),
            Self::Max(f) => found(finite_values(events, f).reduce(f64::max)),
            Self::Latest(f) => found(
                events
                    .iter()
                    .rev()
                    .find_map(|e| e.field(f).filter(|v| v.is_finite())),
            ),
            Self::DaysSinceLatest => {
                // non-empty, so last() exists
                let latest = events[events.len() - 1].event_ts;
                Outcome::Value(cutoff.since(latest).num_days() as f64)
            }
            Self::ActiveDays => {
                let days = events
                    .iter()
                    .map(|e| e.event_ts.date())
                    .collect::<BTreeSet<_>>();
                Outcome::Value(days.len() as f64)
            }
            Self::Ratio {
                numerator,
                denominator,
            } => {
                let num = finite_values(events, numerator).sum::<f64>();
                let den = finite_values(events, denominator).sum::<f64>();
                if den == 0.0 {
                    Outcome::ZeroDenominator
                } else {
                    Outcome::Value(num / den)
                }
            }
        }
    }
}

fn finite_values<'a>(
    events: &'a [&'a RawEvent],
    field: &'a str,
) -> impl Iterator<Item = f64> + 'a {
    events
        .iter()
        .filter_map(move |e| e.field(field))
        .filter(|v| v.is_finite())
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'.' || b == b'-')
}

impl FromStr for Aggregation {
    type Err = AggregationParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = |reason| AggregationParseError {
            input: s.to_owned(),
            reason,
        };
        let s_trim = s.trim();
        let (func, rest) = s_trim
            .split_once('(')
            .ok_or_else(|| err("expected `name(args)`"))?;
        let args = rest
            .strip_suffix(')')
            .ok_or_else(|| err("missing closing parenthesis"))?;
        let args = if args.trim().is_empty() {
            vec![]
        } else {
            args.split(',').map(str::trim).collect::<Vec<_>>()
        };
        if !args.iter().all(|a| is_identifier(a)) {
            return Err(err("arguments must be payload field names"));
        }

        let field = |args: &[&str]| match args {
            [f] => Ok((*f).to_owned()),
            _ => Err(err("expected exactly one field argument")),
        };
        let nullary = |args: &[&str], agg| {
            if args.is_empty() {
                Ok(agg)
            } else {
                Err(err("expected no arguments"))
            }
        };

        match func.trim() {
            "count" => nullary(&args, Self::Count),
            "days_since_latest" => nullary(&args, Self::DaysSinceLatest),
            "active_days" => nullary(&args, Self::ActiveDays),
            "sum" => field(&args).map(Self::Sum),
            "mean" => field(&args).map(Self::Mean),
            "min" => field(&args).map(Self::Min),
            "max" => field(&args).map(Self::Max),
            "latest" => field(&args).map(Self::Latest),
            "ratio" => match args.as_slice() {
                [num, den] => Ok(Self::Ratio {
                    numerator: (*num).to_owned(),
                    denominator: (*den).to_owned(),
                }),
                _ => Err(err("ratio takes a numerator and a denominator field")),
            },
            _ => Err(err("unknown aggregation")),
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count => f.write_str("count()"),
            Self::DaysSinceLatest => f.write_str("days_since_latest()"),
            Self::ActiveDays => f.write_str("active_days()"),
            Self::Sum(x) => write!(f, "sum({x})"),
            Self::Mean(x) => write!(f, "mean({x})"),
            Self::Min(x) => write!(f, "min({x})"),
            Self::Max(x) => write!(f, "max({x})"),
            Self::Latest(x) => write!(f, "latest({x})"),
            Self::Ratio {
                numerator,
                denominator,
            } => write!(f, "ratio({numerator}, {denominator})"),
        }
    }
}

impl Serialize for Aggregation {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Aggregation {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
