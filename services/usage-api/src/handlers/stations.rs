//! Station listing.

use std::sync::Arc;

use axum::{extract::Extension, Json};

use bikeshare_common::Station;

use crate::state::AppState;

/// GET /api/stations
///
/// Served from the directory loaded at startup; the snapshot never changes
/// while the process runs.
pub async fn stations_handler(Extension(state): Extension<Arc<AppState>>) -> Json<Vec<Station>> {
    Json(state.stations.all())
}
