//! Route table and middleware stack.

use std::sync::Arc;

use axum::{middleware, routing::get, Extension, Router};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::auth::require_api_key;
use crate::handlers;
use crate::state::AppState;

/// Build the full application router over `state`.
///
/// Every route is `GET`; other methods get 405 from the method router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/api/stations", get(handlers::stations::stations_handler))
        .route("/api/records", get(handlers::records::records_handler))
        .route(
            "/api/timeseries",
            get(handlers::timeseries::timeseries_handler),
        )
        // Summaries
        .route(
            "/api/summary/monthly",
            get(handlers::summary::monthly_handler),
        )
        .route("/api/summary/annual", get(handlers::summary::annual_handler))
        // Patterns
        .route(
            "/api/patterns/hourly",
            get(handlers::patterns::hourly_handler),
        )
        .route(
            "/api/patterns/weekday",
            get(handlers::patterns::weekday_handler),
        )
        .route(
            "/api/city/snapshot",
            get(handlers::city::city_snapshot_handler),
        )
        .route("/api/capacity", get(handlers::capacity::capacity_handler))
        // Export
        .route("/api/export.xlsx", get(handlers::export::export_handler))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            require_api_key,
        ));

    Router::new()
        // Health and metrics
        .route("/health", get(handlers::health::health_handler))
        .route("/ready", get(handlers::health::ready_handler))
        .route("/metrics", get(handlers::health::metrics_handler))
        .merge(api)
        // Middleware
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
}
