//! Common types and utilities shared across the bike-share usage services.

pub mod error;
pub mod station;
pub mod time;
pub mod usage;

pub use error::{BikeResult, BikeshareError};
pub use station::{Station, StationDirectory, StationId};
pub use time::{parse_date, DateRange, Granularity};
pub use usage::{
    CapacityPoint, HourlyPattern, PeriodAggregate, QueryRequest, UsageAggregate, UsageRecord,
    WeekdayPattern,
};
