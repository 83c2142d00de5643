//! Raw observation queries.

use std::sync::Arc;

use axum::{
    extract::Extension,
    Json,
};

use bikeshare_common::UsageRecord;

use crate::error::ApiResult;
use crate::params::{RecordParams, ValidQuery};
use crate::state::AppState;

/// GET /api/records?station_id=&start=&end=
pub async fn records_handler(
    Extension(state): Extension<Arc<AppState>>,
    ValidQuery(params): ValidQuery<RecordParams>,
) -> ApiResult<Json<Vec<UsageRecord>>> {
    let request = params.into_request(&state.stations)?;

    let records = state
        .store
        .query_by_station_and_date(request.station.as_ref(), &request.range)
        .await?;

    Ok(Json(records))
}
