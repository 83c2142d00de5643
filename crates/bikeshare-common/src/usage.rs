//! Usage observations and aggregate result rows.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::station::StationId;
use crate::time::{DateRange, Granularity};

/// One hourly dock observation for a station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub station_id: StationId,
    /// Observation instant (hour resolution, local operator time).
    pub observed_at: NaiveDateTime,
    /// Bikes anchored at the station.
    pub docked: i64,
    /// Free docks.
    pub free_docks: i64,
    /// Bikes left beyond the station's capacity.
    pub overflow: i64,
    pub active: bool,
    /// Station attributes valid at `observed_at`, when the history has them.
    pub name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Aggregate counters over a set of observations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageAggregate {
    pub avg_overflow: f64,
    pub max_overflow: i64,
    pub total_overflow: i64,
    /// Observations with `overflow > 0`.
    pub hours_with_overflow: i64,
    /// Number of observations.
    pub total_hours: i64,
    pub avg_docked: f64,
    pub avg_free_docks: f64,
}

/// Aggregate for one calendar bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodAggregate {
    /// Bucket label: `YYYY`, `YYYY-MM`, `YYYY-MM-DD` or `YYYY-MM-DD HH:MM:SS`.
    pub period: String,
    pub year: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub month: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub day: Option<u32>,
    #[serde(flatten)]
    pub aggregate: UsageAggregate,
}

impl PeriodAggregate {
    /// Build from a bucket label, splitting out its calendar components.
    ///
    /// Returns `None` when the label is not a date prefix.
    pub fn from_label(period: impl Into<String>, aggregate: UsageAggregate) -> Option<Self> {
        let period = period.into();
        let year = period.get(0..4)?.parse().ok()?;
        let month = match period.get(5..7) {
            Some(m) => Some(m.parse().ok()?),
            None => None,
        };
        let day = match period.get(8..10) {
            Some(d) => Some(d.parse().ok()?),
            None => None,
        };
        Some(Self {
            period,
            year,
            month,
            day,
            aggregate,
        })
    }
}

/// Average overflow by hour of day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyPattern {
    pub hour: u32,
    pub avg_overflow: f64,
    pub max_overflow: i64,
    pub total_observations: i64,
}

/// Average overflow by ISO weekday (1 = Monday, 7 = Sunday).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeekdayPattern {
    pub day_of_week: u32,
    pub avg_overflow: f64,
    pub max_overflow: i64,
    pub total_observations: i64,
}

/// Occupancy and overflow relative to station capacity at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacityPoint {
    pub observed_at: NaiveDateTime,
    pub docked: i64,
    pub free_docks: i64,
    pub overflow: i64,
    /// `docked + free_docks`.
    pub capacity: i64,
    pub occupancy_pct: f64,
    pub overflow_pct_capacity: f64,
}

impl CapacityPoint {
    pub fn new(observed_at: NaiveDateTime, docked: i64, free_docks: i64, overflow: i64) -> Self {
        let capacity = docked + free_docks;
        let pct = |v: i64| {
            if capacity > 0 {
                v as f64 / capacity as f64 * 100.0
            } else {
                0.0
            }
        };
        Self {
            observed_at,
            docked,
            free_docks,
            overflow,
            capacity,
            occupancy_pct: pct(docked),
            overflow_pct_capacity: pct(overflow),
        }
    }
}

/// Validated filters for one request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryRequest {
    pub station: Option<StationId>,
    pub range: DateRange,
    pub granularity: Granularity,
}
