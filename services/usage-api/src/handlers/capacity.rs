//! Capacity analysis for one station.

use std::sync::Arc;

use axum::{
    extract::Extension,
    Json,
};

use bikeshare_common::{CapacityPoint, DateRange};

use crate::error::ApiResult;
use crate::params::{required_station, RecordParams, ValidQuery};
use crate::state::AppState;

/// GET /api/capacity?station_id=&start=&end=
pub async fn capacity_handler(
    Extension(state): Extension<Arc<AppState>>,
    ValidQuery(params): ValidQuery<RecordParams>,
) -> ApiResult<Json<Vec<CapacityPoint>>> {
    let range = DateRange::parse(params.start.as_deref(), params.end.as_deref())?;
    let station = required_station(&state.stations, params.station_id.as_deref())?;

    let points = state.store.capacity_analysis(&station, &range).await?;
    Ok(Json(points))
}
