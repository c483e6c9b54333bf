//! UTC timestamps with lenient input and canonical output.
//!
//! Input accepts, in order of preference:
//!
//! - RFC 3339 (`2017-01-31T12:00:00Z`, `2017-01-31T12:00:00+09:00`)
//! - naive date-time treated as UTC (`2017-01-31T12:00:00`, `2017-01-31 12:00:00`)
//! - ISO date at midnight UTC (`2017-01-31`)
//! - compact date at midnight UTC (`20170131`, as a string or an integer)
//!
//! Output is always RFC 3339 in UTC. Whole seconds print without a fraction
//! (`2017-01-31T00:00:00Z`); sub-second instants keep the milli, micro or
//! nano digits they need, so a timestamp survives a round trip unchanged.

use std::{fmt, str::FromStr};

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeDelta, Utc};
use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{self, Visitor},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(DateTime<Utc>);

#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
#[display("invalid timestamp: {input:?}")]
pub struct TimestampParseError {
    pub input: String,
}

impl Timestamp {
    #[must_use]
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Midnight UTC of `date`.
    #[must_use]
    pub fn from_date(date: NaiveDate) -> Self {
        Self(date.and_time(chrono::NaiveTime::MIN).and_utc())
    }

    #[must_use]
    pub fn datetime(self) -> DateTime<Utc> {
        self.0
    }

    #[must_use]
    pub fn date(self) -> NaiveDate {
        self.0.date_naive()
    }

    /// `self - delta`, or `None` on overflow.
    #[must_use]
    pub fn checked_sub(self, delta: TimeDelta) -> Option<Self> {
        self.0.checked_sub_signed(delta).map(Self)
    }

    /// `self + delta`, or `None` on overflow.
    #[must_use]
    pub fn checked_add(self, delta: TimeDelta) -> Option<Self> {
        self.0.checked_add_signed(delta).map(Self)
    }

    /// Signed duration `self - earlier`.
    #[must_use]
    pub fn since(self, earlier: Self) -> TimeDelta {
        self.0.signed_duration_since(earlier.0)
    }
}

impl FromStr for Timestamp {
    type Err = TimestampParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(Self(dt.with_timezone(&Utc)));
        }
        for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
                return Ok(Self(dt.and_utc()));
            }
        }
        if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            return Ok(Self::from_date(date));
        }
        parse_compact_date(s)
            .map(Self::from_date)
            .ok_or_else(|| TimestampParseError { input: s.to_owned() })
    }
}

pub(crate) fn parse_compact_date(s: &str) -> Option<NaiveDate> {
    if s.len() != 8 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let year = s[0..4].parse().ok()?;
    let month = s[4..6].parse().ok()?;
    let day = s[6..8].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }
}

impl From<NaiveDate> for Timestamp {
    fn from(date: NaiveDate) -> Self {
        Self::from_date(date)
    }
}

impl Serialize for Timestamp {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(TimestampVisitor)
    }
}

struct TimestampVisitor;

impl Visitor<'_> for TimestampVisitor {
    type Value = Timestamp;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an RFC 3339 timestamp, a YYYY-MM-DD date, or a YYYYMMDD date")
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        v.parse().map_err(E::custom)
    }

    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        v.to_string().parse().map_err(E::custom)
    }

    fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        v.to_string().parse().map_err(E::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> Timestamp {
        s.parse().unwrap()
    }

    #[test]
    fn test_all_input_forms_agree() {
        let expected = ts("2017-01-31T00:00:00Z");
        assert_eq!(ts("2017-01-31"), expected);
        assert_eq!(ts("20170131"), expected);
        assert_eq!(ts("2017-01-31T00:00:00"), expected);
        assert_eq!(ts("2017-01-31 00:00:00"), expected);
        assert_eq!(ts("2017-01-31T09:00:00+09:00"), expected);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!("".parse::<Timestamp>().is_err());
        assert!("2017-13-01".parse::<Timestamp>().is_err());
        assert!("20171301".parse::<Timestamp>().is_err());
        assert!("yesterday".parse::<Timestamp>().is_err());
    }

    #[test]
    fn test_display_is_utc_rfc3339() {
        assert_eq!(
            ts("2017-01-31T09:30:00+09:00").to_string(),
            "2017-01-31T00:30:00Z"
        );
    }

    #[test]
    fn test_sub_second_instants_round_trip() {
        let t = ts("2017-03-01T00:00:00.500Z");
        assert_eq!(t.to_string(), "2017-03-01T00:00:00.500Z");
        assert_eq!(ts(&t.to_string()), t);
        assert_ne!(t, ts("2017-03-01T00:00:00Z"));

        let json = serde_json::to_string(&ts("2017-03-01T00:00:00.000123Z")).unwrap();
        assert_eq!(json, r#""2017-03-01T00:00:00.000123Z""#);
        assert_eq!(ts("2017-03-01").to_string(), "2017-03-01T00:00:00Z");
    }

    #[test]
    fn test_serde_accepts_integer_dates() {
        let t: Timestamp = serde_json::from_str("20170131").unwrap();
        assert_eq!(t, ts("2017-01-31"));
        let t: Timestamp = serde_json::from_str("\"2017-01-31\"").unwrap();
        assert_eq!(serde_json::to_string(&t).unwrap(), "\"2017-01-31T00:00:00Z\"");
        assert!(serde_json::from_str::<Timestamp>("1.5").is_err());
    }

    #[test]
    fn test_checked_arithmetic() {
        let t = ts("2017-02-01");
        assert_eq!(t.checked_sub(TimeDelta::days(31)), Some(ts("2017-01-01")));
        assert_eq!(t.since(ts("2017-01-01")), TimeDelta::days(31));
        assert_eq!(t.date(), NaiveDate::from_ymd_opt(2017, 2, 1).unwrap());
    }
}
