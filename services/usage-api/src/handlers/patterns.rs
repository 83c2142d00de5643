//! Hour-of-day and day-of-week overflow patterns.

use std::sync::Arc;

use axum::{
    extract::Extension,
    Json,
};

use bikeshare_common::{HourlyPattern, WeekdayPattern};

use crate::error::ApiResult;
use crate::params::{optional_month, optional_year, CalendarParams, ValidQuery};
use crate::state::AppState;

/// GET /api/patterns/hourly?station_id=&year=&month=
pub async fn hourly_handler(
    Extension(state): Extension<Arc<AppState>>,
    ValidQuery(params): ValidQuery<CalendarParams>,
) -> ApiResult<Json<Vec<HourlyPattern>>> {
    let year = optional_year(params.year.as_deref())?;
    let month = optional_month(params.month.as_deref())?;
    let station = state.stations.resolve_optional(params.station_id.as_deref())?;

    let pattern = state
        .store
        .hourly_pattern(station.as_ref(), year, month)
        .await?;
    Ok(Json(pattern))
}

/// GET /api/patterns/weekday?station_id=&year=
///
/// Days are ISO numbered, 1 = Monday.
pub async fn weekday_handler(
    Extension(state): Extension<Arc<AppState>>,
    ValidQuery(params): ValidQuery<CalendarParams>,
) -> ApiResult<Json<Vec<WeekdayPattern>>> {
    let year = optional_year(params.year.as_deref())?;
    let station = state.stations.resolve_optional(params.station_id.as_deref())?;

    let pattern = state.store.weekday_pattern(station.as_ref(), year).await?;
    Ok(Json(pattern))
}
