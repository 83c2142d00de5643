//! Monthly and annual summaries.

use std::sync::Arc;

use axum::{
    extract::Extension,
    Json,
};

use bikeshare_common::PeriodAggregate;

use crate::error::ApiResult;
use crate::params::{parse_year, required, CalendarParams, ValidQuery};
use crate::state::AppState;

/// GET /api/summary/monthly?year=&station_id=
///
/// A year without data yields an empty list.
pub async fn monthly_handler(
    Extension(state): Extension<Arc<AppState>>,
    ValidQuery(params): ValidQuery<CalendarParams>,
) -> ApiResult<Json<Vec<PeriodAggregate>>> {
    let year = parse_year(required("year", params.year.as_deref())?)?;
    let station = state.stations.resolve_optional(params.station_id.as_deref())?;

    let summary = state.store.monthly_summary(station.as_ref(), year).await?;
    Ok(Json(summary))
}

/// GET /api/summary/annual?station_id=
pub async fn annual_handler(
    Extension(state): Extension<Arc<AppState>>,
    ValidQuery(params): ValidQuery<CalendarParams>,
) -> ApiResult<Json<Vec<PeriodAggregate>>> {
    let station = state.stations.resolve_optional(params.station_id.as_deref())?;

    let summary = state.store.annual_summary(station.as_ref()).await?;
    Ok(Json(summary))
}
