//! Date handling for usage queries.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{BikeResult, BikeshareError};

/// Date format accepted on the wire and stored in the snapshot.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parse a `YYYY-MM-DD` calendar date, naming the offending parameter on error.
pub fn parse_date(param: &str, value: &str) -> BikeResult<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|_| {
        BikeshareError::invalid(param, format!("expected YYYY-MM-DD, got '{}'", value))
    })
}

/// Inclusive calendar date range; either end may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
}

impl DateRange {
    /// Build a range, rejecting `start > end`.
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> BikeResult<Self> {
        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err(BikeshareError::InvalidFilter(format!(
                    "start date {} is after end date {}",
                    s, e
                )));
            }
        }
        Ok(Self { start, end })
    }

    /// Range with no bounds.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Range covering exactly one day.
    pub fn day(date: NaiveDate) -> Self {
        Self {
            start: Some(date),
            end: Some(date),
        }
    }

    /// Parse optional `start`/`end` query values.
    pub fn parse(start: Option<&str>, end: Option<&str>) -> BikeResult<Self> {
        let start = non_empty(start).map(|s| parse_date("start", s)).transpose()?;
        let end = non_empty(end).map(|s| parse_date("end", s)).transpose()?;
        Self::new(start, end)
    }

    pub fn start(&self) -> Option<NaiveDate> {
        self.start
    }

    pub fn end(&self) -> Option<NaiveDate> {
        self.end
    }

    /// Raise the lower bound to `floor` if it is later than the current start.
    pub fn clamp_start(&self, floor: Option<NaiveDate>) -> Self {
        let start = match (self.start, floor) {
            (Some(s), Some(f)) => Some(s.max(f)),
            (None, f) => f,
            (s, None) => s,
        };
        Self {
            start,
            end: self.end,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |s| date >= s) && self.end.map_or(true, |e| date <= e)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Time-bucketing unit for aggregation queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// One bucket per observation instant.
    None,
    #[default]
    Day,
    Month,
    Year,
}

impl Granularity {
    /// Length of the `YYYY-MM-DD HH:MM:SS` prefix that identifies a bucket.
    pub fn period_len(&self) -> usize {
        match self {
            Granularity::None => 19,
            Granularity::Day => 10,
            Granularity::Month => 7,
            Granularity::Year => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::None => "none",
            Granularity::Day => "day",
            Granularity::Month => "month",
            Granularity::Year => "year",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = BikeshareError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "raw" => Ok(Granularity::None),
            "day" | "daily" => Ok(Granularity::Day),
            "month" | "monthly" => Ok(Granularity::Month),
            "year" | "yearly" | "annual" => Ok(Granularity::Year),
            other => Err(BikeshareError::invalid(
                "granularity",
                format!("expected one of none, day, month, year; got '{}'", other),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(parse_date("start", "2023-01-31").unwrap(), d("2023-01-31"));
        assert!(parse_date("start", "2023-02-30").is_err());
        assert!(parse_date("start", "31/01/2023").is_err());
    }

    #[test]
    fn test_range_rejects_inverted() {
        let err = DateRange::new(Some(d("2023-02-01")), Some(d("2023-01-01"))).unwrap_err();
        assert!(matches!(err, BikeshareError::InvalidFilter(_)));
        assert!(DateRange::new(Some(d("2023-01-01")), Some(d("2023-01-01"))).is_ok());
    }

    #[test]
    fn test_range_parse_blank_values_are_open() {
        let range = DateRange::parse(Some(""), Some("2023-01-31")).unwrap();
        assert_eq!(range.start(), None);
        assert_eq!(range.end(), Some(d("2023-01-31")));
    }

    #[test]
    fn test_range_parse_names_bad_param() {
        let err = DateRange::parse(Some("2023-01-01"), Some("tomorrow")).unwrap_err();
        assert!(err.to_string().contains("'end'"));
    }

    #[test]
    fn test_contains_inclusive() {
        let range = DateRange::new(Some(d("2023-01-01")), Some(d("2023-01-31"))).unwrap();
        assert!(range.contains(d("2023-01-01")));
        assert!(range.contains(d("2023-01-31")));
        assert!(!range.contains(d("2023-02-01")));
        assert!(DateRange::unbounded().contains(d("1999-12-31")));
    }

    #[test]
    fn test_clamp_start() {
        let floor = Some(d("2024-07-01"));
        assert_eq!(DateRange::unbounded().clamp_start(floor).start(), floor);
        let later = DateRange::day(d("2024-08-01"));
        assert_eq!(later.clamp_start(floor).start(), Some(d("2024-08-01")));
    }

    #[test]
    fn test_granularity_from_str() {
        assert_eq!("Month".parse::<Granularity>().unwrap(), Granularity::Month);
        assert_eq!("none".parse::<Granularity>().unwrap(), Granularity::None);
        assert!("week".parse::<Granularity>().is_err());
        assert_eq!(Granularity::Day.period_len(), "2023-01-05".len());
    }
}
