//! Process configuration.
//!
//! Every setting can be given as a flag or through the environment (a `.env`
//! file is loaded first when present).

use std::net::SocketAddr;
use std::path::PathBuf;

use chrono::NaiveDate;
use clap::Parser;

use bikeshare_common::{BikeResult, BikeshareError};
use storage::{ObjectStorageConfig, StoreOptions};

use crate::xlsx::MAX_DATA_ROWS;

/// Usage API server configuration.
#[derive(Parser, Debug, Clone)]
#[command(name = "usage-api")]
#[command(about = "Read-only REST API over historical bike-share usage data")]
pub struct ApiConfig {
    /// Listen address
    #[arg(short, long, default_value = "0.0.0.0:8000", env = "USAGE_API_LISTEN_ADDR")]
    pub listen: String,

    /// Log level
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    pub log_level: String,

    /// Number of worker threads
    #[arg(long, env = "USAGE_API_WORKER_THREADS")]
    pub worker_threads: Option<usize>,

    /// Local path of the snapshot database
    #[arg(long, default_value = "./data/bikeshare.sqlite", env = "SNAPSHOT_PATH")]
    pub snapshot_path: PathBuf,

    /// S3-compatible endpoint holding the snapshot
    #[arg(long, env = "S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    /// Bucket holding the snapshot
    #[arg(long, env = "S3_BUCKET")]
    pub s3_bucket: Option<String>,

    /// Object key of the snapshot
    #[arg(long, env = "S3_OBJECT_KEY")]
    pub s3_object_key: Option<String>,

    #[arg(long, env = "S3_ACCESS_KEY_ID", hide_env_values = true)]
    pub s3_access_key_id: Option<String>,

    #[arg(long, env = "S3_SECRET_ACCESS_KEY", hide_env_values = true)]
    pub s3_secret_access_key: Option<String>,

    #[arg(long, default_value = "auto", env = "S3_REGION")]
    pub s3_region: String,

    /// Allow plain HTTP endpoints (local MinIO)
    #[arg(long, env = "S3_ALLOW_HTTP")]
    pub s3_allow_http: bool,

    /// Read-only connections to the snapshot
    #[arg(long, default_value_t = 8, env = "READ_POOL_SIZE")]
    pub read_pool_size: u32,

    /// Ignore observations before this date (YYYY-MM-DD)
    #[arg(long, env = "DATA_FLOOR_DATE")]
    pub data_floor: Option<NaiveDate>,

    /// Maximum data rows in a spreadsheet export
    #[arg(long, default_value_t = MAX_DATA_ROWS, env = "EXPORT_MAX_ROWS")]
    pub export_max_rows: u64,

    /// When set, /api requests must send this value in the x-api-key header
    #[arg(long, env = "API_SHARED_SECRET", hide_env_values = true)]
    pub shared_secret: Option<String>,
}

impl ApiConfig {
    /// Object storage settings and snapshot key.
    ///
    /// Only needed when the snapshot has to be downloaded; each missing
    /// setting is reported by its variable name.
    pub fn object_storage(&self) -> BikeResult<(ObjectStorageConfig, String)> {
        let endpoint = require(&self.s3_endpoint, "S3_ENDPOINT")?;
        let bucket = require(&self.s3_bucket, "S3_BUCKET")?;
        let key = require(&self.s3_object_key, "S3_OBJECT_KEY")?;
        let access_key_id = require(&self.s3_access_key_id, "S3_ACCESS_KEY_ID")?;
        let secret_access_key = require(&self.s3_secret_access_key, "S3_SECRET_ACCESS_KEY")?;

        let config = ObjectStorageConfig {
            endpoint,
            bucket,
            access_key_id,
            secret_access_key,
            region: self.s3_region.clone(),
            allow_http: self.s3_allow_http,
        };
        Ok((config, key))
    }

    /// Parsed listen address.
    pub fn listen_addr(&self) -> BikeResult<SocketAddr> {
        self.listen.parse().map_err(|_| {
            BikeshareError::Config(format!("Invalid listen address: {}", self.listen))
        })
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            max_connections: self.read_pool_size,
            data_floor: self.data_floor,
        }
    }

    /// Export row limit, capped at what a single sheet can hold.
    pub fn export_limit(&self) -> u64 {
        self.export_max_rows.min(MAX_DATA_ROWS)
    }

    /// Shared secret, ignoring blank values.
    pub fn shared_secret(&self) -> Option<String> {
        self.shared_secret
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }
}

fn require(value: &Option<String>, name: &str) -> BikeResult<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            BikeshareError::Config(format!(
                "Snapshot is missing locally and {} is not set",
                name
            ))
        })
}
