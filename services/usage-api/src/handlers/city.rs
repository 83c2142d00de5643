//! City-wide snapshot at one instant.

use std::sync::Arc;

use axum::{
    extract::Extension,
    Json,
};

use bikeshare_common::UsageRecord;

use crate::error::ApiResult;
use crate::params::{parse_hour, required, required_date, SnapshotParams, ValidQuery};
use crate::state::AppState;

/// GET /api/city/snapshot?date=&hour=
pub async fn city_snapshot_handler(
    Extension(state): Extension<Arc<AppState>>,
    ValidQuery(params): ValidQuery<SnapshotParams>,
) -> ApiResult<Json<Vec<UsageRecord>>> {
    let date = required_date("date", params.date.as_deref())?;
    let hour = parse_hour(required("hour", params.hour.as_deref())?)?;

    let records = state.store.city_snapshot(date, hour).await?;
    Ok(Json(records))
}
