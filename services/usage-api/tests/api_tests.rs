//! End-to-end tests driving the router against a fixture snapshot.

use std::io::{Cursor, Read};
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body, Bytes},
    http::{header, HeaderMap, Request, StatusCode},
    Router,
};
use clap::Parser;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use storage::{StoreOptions, UsageStore};
use test_utils::{snapshot_path, temp_test_dir, SnapshotFixture};
use usage_api::config::ApiConfig;
use usage_api::error::ErrorBody;
use usage_api::router::build_router;
use usage_api::state::AppState;
use usage_api::xlsx::XLSX_CONTENT_TYPE;

struct TestApp {
    _dir: TempDir,
    state: Arc<AppState>,
    router: Router,
}

async fn sample_state() -> (TempDir, AppState) {
    let dir = temp_test_dir();
    let path = snapshot_path(&dir);
    SnapshotFixture::sample().write_to(&path).await.unwrap();
    let store = UsageStore::open(&path, StoreOptions::default()).await.unwrap();
    let state = AppState::from_store(store).await.unwrap();
    (dir, state)
}

fn into_app(dir: TempDir, state: AppState) -> TestApp {
    let state = Arc::new(state);
    TestApp {
        _dir: dir,
        router: build_router(Arc::clone(&state)),
        state,
    }
}

async fn sample_app() -> TestApp {
    let (dir, state) = sample_state().await;
    into_app(dir, state)
}

async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, body)
}

async fn get(app: &TestApp, uri: &str) -> (StatusCode, HeaderMap, Bytes) {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

async fn get_json(app: &TestApp, uri: &str) -> (StatusCode, Value) {
    let (status, _, body) = get(app, uri).await;
    (status, serde_json::from_slice(&body).unwrap())
}

async fn get_error(app: &TestApp, uri: &str) -> ErrorBody {
    let (_, _, body) = get(app, uri).await;
    serde_json::from_slice(&body).unwrap()
}

fn sheet_row_count(bytes: &[u8]) -> usize {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut sheet = String::new();
    archive
        .by_name("xl/worksheets/sheet1.xml")
        .unwrap()
        .read_to_string(&mut sheet)
        .unwrap();
    sheet.matches("<row ").count()
}

#[tokio::test]
async fn test_health_and_ready() {
    let app = sample_app().await;

    let (status, body) = get_json(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = get_json(&app, "/ready").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], true);
    assert_eq!(body["stations"], 3);

    let (status, _, _) = get(&app, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_stations_use_current_names() {
    let app = sample_app().await;

    let (status, body) = get_json(&app, "/api/stations").await;
    assert_eq!(status, StatusCode::OK);

    let stations = body.as_array().unwrap();
    assert_eq!(stations.len(), 3);
    assert_eq!(stations[0]["station_id"], "1");
    assert_eq!(stations[0]["name"], "Puerta del Sol A");
}

#[tokio::test]
async fn test_records_for_station_and_month() {
    let app = sample_app().await;

    let (status, body) =
        get_json(&app, "/api/records?station_id=1&start=2023-01-01&end=2023-01-31").await;
    assert_eq!(status, StatusCode::OK);

    let records = body.as_array().unwrap();
    let times: Vec<&str> = records
        .iter()
        .map(|r| r["observed_at"].as_str().unwrap())
        .collect();
    assert_eq!(
        times,
        vec![
            "2023-01-05T08:00:00",
            "2023-01-15T18:00:00",
            "2023-01-31T23:00:00"
        ]
    );
    assert!(records.iter().all(|r| r["station_id"] == "1"));
}

#[tokio::test]
async fn test_records_without_filters_are_ordered() {
    let app = sample_app().await;

    let (status, body) = get_json(&app, "/api/records").await;
    assert_eq!(status, StatusCode::OK);

    let records = body.as_array().unwrap();
    assert_eq!(records.len(), 10);
    let times: Vec<&str> = records
        .iter()
        .map(|r| r["observed_at"].as_str().unwrap())
        .collect();
    let mut sorted = times.clone();
    sorted.sort_unstable();
    assert_eq!(times, sorted);
}

#[tokio::test]
async fn test_inverted_range_is_rejected_before_querying() {
    let app = sample_app().await;
    app.state.shutdown().await;

    // A closed store fails every query, so a 400 proves it was never reached.
    let (status, _, _) = get(&app, "/api/records?start=2023-02-01&end=2023-01-01").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let body = get_error(&app, "/api/records?start=2023-02-01&end=2023-01-01").await;
    assert_eq!(body.code, "invalid_filter");
    assert_eq!(body.status, 400);
    assert_eq!(body.title, "Bad Request");

    let (status, _, _) = get(&app, "/api/records?start=2023-01-01&end=2023-02-01").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_data_errors_return_structured_500() {
    let app = sample_app().await;
    app.state.shutdown().await;

    let body = get_error(&app, "/api/summary/annual").await;
    assert_eq!(body.status, 500);
    assert_eq!(body.code, "connection_error");

    let (status, _) = get_json(&app, "/ready").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_validation_errors() {
    let app = sample_app().await;

    let cases = [
        ("/api/records?start=2023-13-01", 400, "invalid_parameter"),
        ("/api/records?station_id=99", 404, "unknown_station"),
        ("/api/records?station_id=1;drop", 400, "invalid_parameter"),
        ("/api/timeseries?granularity=week", 400, "invalid_parameter"),
        ("/api/summary/monthly", 400, "missing_parameter"),
        ("/api/summary/monthly?year=1899", 400, "invalid_parameter"),
        ("/api/patterns/hourly?month=13", 400, "invalid_parameter"),
        ("/api/city/snapshot?date=2024-07-01&hour=24", 400, "invalid_parameter"),
        ("/api/city/snapshot?hour=8", 400, "missing_parameter"),
        ("/api/capacity", 400, "missing_parameter"),
        ("/api/records?station_id=1&station_id=2", 400, "invalid_parameter"),
        ("/api/summary/monthly?year=2023&year=2024", 400, "invalid_parameter"),
    ];

    for (uri, status, code) in cases {
        let body = get_error(&app, uri).await;
        assert_eq!(body.status, status, "{}", uri);
        assert_eq!(body.code, code, "{}", uri);
    }
}

#[tokio::test]
async fn test_malformed_query_string_is_json_error() {
    let app = sample_app().await;

    let (status, headers, body) = get(&app, "/api/records?station_id=1&station_id=2").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(headers[header::CONTENT_TYPE], "application/json");

    let body: ErrorBody = serde_json::from_slice(&body).unwrap();
    assert_eq!(body.code, "invalid_parameter");
}

#[tokio::test]
async fn test_granularity_is_ignored_outside_timeseries() {
    let app = sample_app().await;

    let (status, plain) = get_json(&app, "/api/records?station_id=1").await;
    assert_eq!(status, StatusCode::OK);
    let (status, with_granularity) =
        get_json(&app, "/api/records?station_id=1&granularity=week").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(plain, with_granularity);

    let (status, _) = get_json(&app, "/api/capacity?station_id=3&granularity=week").await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, _) = get(&app, "/api/export.xlsx?station_id=1&granularity=week").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_monthly_summary_for_year_without_data_is_empty() {
    let app = sample_app().await;

    let (status, body) = get_json(&app, "/api/summary/monthly?year=2021").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::Array(vec![]));
}

#[tokio::test]
async fn test_monthly_totals_match_annual() {
    let app = sample_app().await;

    let (_, monthly) = get_json(&app, "/api/summary/monthly?year=2023").await;
    let (_, annual) = get_json(&app, "/api/summary/annual").await;

    let year = annual
        .as_array()
        .unwrap()
        .iter()
        .find(|p| p["year"] == 2023)
        .unwrap();

    let months = monthly.as_array().unwrap();
    let sum = |field: &str| -> i64 { months.iter().map(|m| m[field].as_i64().unwrap()).sum() };
    let max = months
        .iter()
        .map(|m| m["max_overflow"].as_i64().unwrap())
        .max()
        .unwrap();

    assert_eq!(sum("total_hours"), year["total_hours"].as_i64().unwrap());
    assert_eq!(
        sum("hours_with_overflow"),
        year["hours_with_overflow"].as_i64().unwrap()
    );
    assert_eq!(sum("total_overflow"), year["total_overflow"].as_i64().unwrap());
    assert_eq!(max, year["max_overflow"].as_i64().unwrap());
}

#[tokio::test]
async fn test_timeseries_by_month() {
    let app = sample_app().await;

    let (status, body) = get_json(
        &app,
        "/api/timeseries?station_id=1&granularity=month&start=2023-01-01&end=2023-12-31",
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let periods: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["period"].as_str().unwrap())
        .collect();
    assert_eq!(periods, vec!["2023-01", "2023-02"]);
}

#[tokio::test]
async fn test_patterns() {
    let app = sample_app().await;

    let (status, body) = get_json(&app, "/api/patterns/hourly").await;
    assert_eq!(status, StatusCode::OK);
    let eight = body
        .as_array()
        .unwrap()
        .iter()
        .find(|p| p["hour"] == 8)
        .unwrap();
    assert_eq!(eight["total_observations"], 3);

    let (status, body) = get_json(&app, "/api/patterns/weekday?year=2023").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body
        .as_array()
        .unwrap()
        .iter()
        .all(|p| (1..=7).contains(&p["day_of_week"].as_i64().unwrap())));
}

#[tokio::test]
async fn test_city_snapshot() {
    let app = sample_app().await;

    let (status, body) = get_json(&app, "/api/city/snapshot?date=2024-07-01&hour=8").await;
    assert_eq!(status, StatusCode::OK);

    let records = body.as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["station_id"], "3");
}

#[tokio::test]
async fn test_capacity_handles_zero_capacity() {
    let app = sample_app().await;

    let (status, body) = get_json(&app, "/api/capacity?station_id=3").await;
    assert_eq!(status, StatusCode::OK);

    let points = body.as_array().unwrap();
    assert_eq!(points.len(), 2);
    assert_eq!(points[0]["capacity"], 20);
    assert_eq!(points[1]["capacity"], 0);
    assert_eq!(points[1]["occupancy_pct"], 0.0);
}

#[tokio::test]
async fn test_export_matches_json_rows() {
    let app = sample_app().await;
    let query = "station_id=1&start=2023-01-01&end=2023-01-31";

    let (_, json) = get_json(&app, &format!("/api/records?{}", query)).await;
    let json_rows = json.as_array().unwrap().len();

    let (status, headers, body) = get(&app, &format!("/api/export.xlsx?{}", query)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], XLSX_CONTENT_TYPE);
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"bikeshare_1_2023-01-01_2023-01-31.xlsx\""
    );

    // Header row plus one row per record.
    assert_eq!(sheet_row_count(&body), json_rows + 1);
    assert_eq!(json_rows, 3);
}

#[tokio::test]
async fn test_export_over_limit_is_rejected() {
    let (dir, state) = sample_state().await;
    let app = into_app(dir, state.with_export_limit(2));

    let body = get_error(&app, "/api/export.xlsx?station_id=1").await;
    assert_eq!(body.status, 413);
    assert_eq!(body.code, "export_too_large");

    let (status, _, _) = get(&app, "/api/export.xlsx?station_id=3").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_shared_secret_guards_api_routes() {
    let (dir, state) = sample_state().await;
    let app = into_app(dir, state.with_shared_secret("s3cret"));

    let body = get_error(&app, "/api/stations").await;
    assert_eq!(body.status, 401);
    assert_eq!(body.code, "unauthorized");

    let request = Request::get("/api/stations")
        .header("x-api-key", "wrong")
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::get("/api/stations")
        .header("x-api-key", "s3cret")
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, _) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_mutating_methods_are_not_allowed() {
    let app = sample_app().await;

    let request = Request::post("/api/records").body(Body::empty()).unwrap();
    let (status, _, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_initialize_reuses_local_snapshot() {
    let dir = temp_test_dir();
    let path = snapshot_path(&dir);
    SnapshotFixture::sample().write_to(&path).await.unwrap();

    // No object storage settings: the existing file must be enough.
    let config = ApiConfig::try_parse_from([
        "usage-api",
        "--snapshot-path",
        path.to_str().unwrap(),
        "--export-max-rows",
        "10",
    ])
    .unwrap();

    let state = AppState::initialize(&config, None).await.unwrap();
    assert_eq!(state.stations.len(), 3);
    assert_eq!(state.export_limit, 10);
    state.shutdown().await;
}

#[tokio::test]
async fn test_initialize_without_snapshot_or_storage_fails() {
    let dir = temp_test_dir();
    let config = ApiConfig::try_parse_from([
        "usage-api",
        "--snapshot-path",
        snapshot_path(&dir).to_str().unwrap(),
    ])
    .unwrap();

    let err = AppState::initialize(&config, None).await.err().unwrap();
    assert!(err.to_string().contains("S3_ENDPOINT"));
}
