//! Application state for the usage API.

use metrics_exporter_prometheus::PrometheusHandle;
use tracing::{info, warn};

use bikeshare_common::{BikeResult, StationDirectory};
use storage::{ensure_local_copy, is_present, ObjectStorage, UsageStore};

use crate::config::ApiConfig;
use crate::xlsx::MAX_DATA_ROWS;

/// Shared application state.
pub struct AppState {
    /// Read-only query engine over the local snapshot.
    pub store: UsageStore,

    /// Stations known to the snapshot, used to validate `station_id`.
    pub stations: StationDirectory,

    /// Maximum data rows in a spreadsheet export.
    pub export_limit: u64,

    /// Value required in `x-api-key` on `/api` routes, if any.
    pub shared_secret: Option<String>,

    /// Prometheus renderer for `/metrics`.
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Startup phase one: provision the snapshot, open the store and load
    /// the station directory.
    pub async fn initialize(
        config: &ApiConfig,
        metrics: Option<PrometheusHandle>,
    ) -> BikeResult<Self> {
        if is_present(&config.snapshot_path).await? {
            info!(path = %config.snapshot_path.display(), "Using existing snapshot");
        } else {
            let (storage_config, key) = config.object_storage()?;
            let storage = ObjectStorage::new(&storage_config)?;
            ensure_local_copy(&storage, &key, &config.snapshot_path).await?;
        }

        let store = UsageStore::open(&config.snapshot_path, config.store_options()).await?;

        let mut state = Self::from_store(store).await?;
        state.export_limit = config.export_limit();
        state.shared_secret = config.shared_secret();
        state.metrics = metrics;
        Ok(state)
    }

    /// State over an already opened store, with default limits and no secret.
    pub async fn from_store(store: UsageStore) -> BikeResult<Self> {
        let stations = StationDirectory::new(store.list_stations().await?);
        if stations.is_empty() {
            warn!("Snapshot has no stations, every station_id will be rejected");
        } else {
            info!(stations = stations.len(), "Loaded station directory");
        }

        Ok(Self {
            store,
            stations,
            export_limit: MAX_DATA_ROWS,
            shared_secret: None,
            metrics: None,
        })
    }

    pub fn with_export_limit(mut self, limit: u64) -> Self {
        self.export_limit = limit.min(MAX_DATA_ROWS);
        self
    }

    pub fn with_shared_secret(mut self, secret: impl Into<String>) -> Self {
        self.shared_secret = Some(secret.into());
        self
    }

    /// Release the connection pool.
    pub async fn shutdown(&self) {
        self.store.close().await;
        info!("Closed usage snapshot");
    }
}
