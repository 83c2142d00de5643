//! Spreadsheet export of raw observations.

use std::sync::Arc;

use axum::{
    extract::Extension,
    http::header,
    response::{IntoResponse, Response},
};
use metrics::{counter, histogram};
use tracing::{info, instrument};

use bikeshare_common::{BikeshareError, QueryRequest};

use crate::error::ApiResult;
use crate::params::{RecordParams, ValidQuery};
use crate::state::AppState;
use crate::xlsx::{records_workbook, XLSX_CONTENT_TYPE};

/// GET /api/export.xlsx?station_id=&start=&end=
///
/// Same rows as `/api/records`, as a single-sheet workbook. The row count is
/// checked against the export limit before any data is fetched.
#[instrument(skip_all)]
pub async fn export_handler(
    Extension(state): Extension<Arc<AppState>>,
    ValidQuery(params): ValidQuery<RecordParams>,
) -> ApiResult<Response> {
    let request = params.into_request(&state.stations)?;
    let station = request.station.as_ref();

    let rows = state.store.count_records(station, &request.range).await?;
    if rows > state.export_limit {
        return Err(BikeshareError::ExportTooLarge {
            rows,
            limit: state.export_limit,
        }
        .into());
    }

    let records = state
        .store
        .query_by_station_and_date(station, &request.range)
        .await?;

    let bytes = tokio::task::spawn_blocking(move || records_workbook(&records).to_bytes())
        .await
        .map_err(|e| BikeshareError::Export(format!("Export task failed: {}", e)))??;

    let filename = export_filename(&request);
    counter!("usage_api_exports_total").increment(1);
    histogram!("usage_api_export_rows").record(rows as f64);
    info!(rows, bytes = bytes.len(), filename = %filename, "Export generated");

    Ok((
        [
            (header::CONTENT_TYPE, XLSX_CONTENT_TYPE.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        bytes,
    )
        .into_response())
}

/// `bikeshare_<station|all>_<start|any>_<end|any>.xlsx`
pub fn export_filename(request: &QueryRequest) -> String {
    let station = request
        .station
        .as_ref()
        .map(|s| s.to_string())
        .unwrap_or_else(|| "all".to_string());
    let start = request
        .range
        .start()
        .map(|d| d.to_string())
        .unwrap_or_else(|| "any".to_string());
    let end = request
        .range
        .end()
        .map(|d| d.to_string())
        .unwrap_or_else(|| "any".to_string());

    format!("bikeshare_{}_{}_{}.xlsx", station, start, end)
}
