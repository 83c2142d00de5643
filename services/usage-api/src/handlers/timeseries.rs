//! Bucketed time series.

use std::sync::Arc;

use axum::{
    extract::Extension,
    Json,
};

use bikeshare_common::PeriodAggregate;

use crate::error::ApiResult;
use crate::params::{UsageQueryParams, ValidQuery};
use crate::state::AppState;

/// GET /api/timeseries?station_id=&granularity=&start=&end=
///
/// `granularity` defaults to `day`.
pub async fn timeseries_handler(
    Extension(state): Extension<Arc<AppState>>,
    ValidQuery(params): ValidQuery<UsageQueryParams>,
) -> ApiResult<Json<Vec<PeriodAggregate>>> {
    let request = params.into_request(&state.stations)?;

    let series = state
        .store
        .time_series(request.station.as_ref(), &request.range, request.granularity)
        .await?;

    Ok(Json(series))
}
