//! Query parameter parsing and validation.
//!
//! Every handler validates its inputs here before touching the store, so a
//! bad request never reaches the query engine.

use axum::{
    async_trait,
    extract::{FromRequestParts, Query},
    http::request::Parts,
};
use chrono::NaiveDate;
use serde::{de::DeserializeOwned, Deserialize};

use bikeshare_common::{
    parse_date, BikeResult, BikeshareError, DateRange, Granularity, QueryRequest,
    StationDirectory, StationId,
};

use crate::error::ApiError;

pub const MIN_YEAR: i32 = 1900;
pub const MAX_YEAR: i32 = 9999;

/// Query string extractor whose rejection is a structured `invalid_parameter`
/// error instead of axum's plain-text body.
#[derive(Debug)]
pub struct ValidQuery<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ValidQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(ValidQuery(value)),
            Err(rejection) => Err(BikeshareError::invalid("query", rejection.body_text()).into()),
        }
    }
}

/// Station and date range parameters of the raw record routes.
#[derive(Debug, Default, Deserialize)]
pub struct RecordParams {
    pub station_id: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
}

impl RecordParams {
    /// Validate into a query request, resolving the station against `stations`.
    pub fn into_request(self, stations: &StationDirectory) -> BikeResult<QueryRequest> {
        let range = DateRange::parse(self.start.as_deref(), self.end.as_deref())?;
        let station = stations.resolve_optional(self.station_id.as_deref())?;
        Ok(QueryRequest {
            station,
            range,
            ..Default::default()
        })
    }
}

/// Station, date range and granularity parameters of the time series route.
#[derive(Debug, Default, Deserialize)]
pub struct UsageQueryParams {
    pub station_id: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub granularity: Option<String>,
}

impl UsageQueryParams {
    /// Validate into a query request, resolving the station against `stations`.
    pub fn into_request(self, stations: &StationDirectory) -> BikeResult<QueryRequest> {
        let range = DateRange::parse(self.start.as_deref(), self.end.as_deref())?;
        let granularity = parse_granularity(self.granularity.as_deref())?;
        let station = stations.resolve_optional(self.station_id.as_deref())?;
        Ok(QueryRequest {
            station,
            range,
            granularity,
        })
    }
}

/// Parameters of the calendar summary and pattern routes.
#[derive(Debug, Default, Deserialize)]
pub struct CalendarParams {
    pub station_id: Option<String>,
    pub year: Option<String>,
    pub month: Option<String>,
}

/// Parameters of the city snapshot route.
#[derive(Debug, Default, Deserialize)]
pub struct SnapshotParams {
    pub date: Option<String>,
    pub hour: Option<String>,
}

/// A parameter value, treating blanks as absent.
pub fn present<'a>(value: Option<&'a str>) -> Option<&'a str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// A parameter that must be given.
pub fn required<'a>(name: &str, value: Option<&'a str>) -> BikeResult<&'a str> {
    present(value).ok_or_else(|| BikeshareError::MissingParameter(name.to_string()))
}

fn parse_bounded<T>(name: &str, value: &str, min: T, max: T) -> BikeResult<T>
where
    T: std::str::FromStr + PartialOrd + std::fmt::Display + Copy,
{
    let parsed: T = value
        .parse()
        .map_err(|_| BikeshareError::invalid(name, format!("expected an integer, got '{}'", value)))?;
    if parsed < min || parsed > max {
        return Err(BikeshareError::invalid(
            name,
            format!("must be between {} and {}, got {}", min, max, parsed),
        ));
    }
    Ok(parsed)
}

pub fn parse_year(value: &str) -> BikeResult<i32> {
    parse_bounded("year", value, MIN_YEAR, MAX_YEAR)
}

pub fn parse_month(value: &str) -> BikeResult<u32> {
    parse_bounded("month", value, 1, 12)
}

pub fn parse_hour(value: &str) -> BikeResult<u32> {
    parse_bounded("hour", value, 0, 23)
}

pub fn optional_year(value: Option<&str>) -> BikeResult<Option<i32>> {
    present(value).map(parse_year).transpose()
}

pub fn optional_month(value: Option<&str>) -> BikeResult<Option<u32>> {
    present(value).map(parse_month).transpose()
}

/// Granularity, defaulting to `day` when absent.
pub fn parse_granularity(value: Option<&str>) -> BikeResult<Granularity> {
    present(value)
        .map(str::parse::<Granularity>)
        .transpose()
        .map(Option::unwrap_or_default)
}

pub fn required_date(name: &str, value: Option<&str>) -> BikeResult<NaiveDate> {
    parse_date(name, required(name, value)?)
}

pub fn required_station(stations: &StationDirectory, value: Option<&str>) -> BikeResult<StationId> {
    stations.resolve(required("station_id", value)?)
}
