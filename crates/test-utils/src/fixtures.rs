//! Snapshot fixtures for bike-share usage tests.
//!
//! Fixtures are written as real SQLite files with the same schema the
//! service reads, so tests exercise the actual query paths.

use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

/// Schema of the snapshot file.
pub const SNAPSHOT_SCHEMA: &str = r#"
CREATE TABLE stations (
    station_id TEXT NOT NULL,
    name TEXT NOT NULL,
    latitude REAL NOT NULL,
    longitude REAL NOT NULL,
    valid_from TEXT NOT NULL,
    valid_to TEXT NOT NULL
);
CREATE TABLE observations (
    station_id TEXT NOT NULL,
    observed_at TEXT NOT NULL,
    docked INTEGER NOT NULL,
    free_docks INTEGER NOT NULL,
    overflow INTEGER NOT NULL,
    active INTEGER NOT NULL
);
CREATE INDEX idx_observations_station_time ON observations(station_id, observed_at);
CREATE INDEX idx_observations_time ON observations(observed_at)
"#;

/// One row of the station history table.
#[derive(Debug, Clone)]
pub struct StationRow {
    pub station_id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub valid_from: String,
    pub valid_to: String,
}

/// One hourly observation.
#[derive(Debug, Clone)]
pub struct ObservationRow {
    pub station_id: String,
    pub observed_at: String,
    pub docked: i64,
    pub free_docks: i64,
    pub overflow: i64,
    pub active: bool,
}

/// Builder for snapshot contents.
#[derive(Debug, Clone, Default)]
pub struct SnapshotFixture {
    pub stations: Vec<StationRow>,
    pub observations: Vec<ObservationRow>,
}

impl SnapshotFixture {
    /// A snapshot with the schema but no rows.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Add a station valid for the whole fixture period.
    pub fn station(self, id: &str, name: &str, latitude: f64, longitude: f64) -> Self {
        self.station_between(
            id,
            name,
            latitude,
            longitude,
            "2020-01-01 00:00:00",
            "2099-12-31 23:59:59",
        )
    }

    /// Add a station history entry valid between two instants (inclusive).
    pub fn station_between(
        mut self,
        id: &str,
        name: &str,
        latitude: f64,
        longitude: f64,
        valid_from: &str,
        valid_to: &str,
    ) -> Self {
        self.stations.push(StationRow {
            station_id: id.to_string(),
            name: name.to_string(),
            latitude,
            longitude,
            valid_from: valid_from.to_string(),
            valid_to: valid_to.to_string(),
        });
        self
    }

    /// Add an active observation. `observed_at` is `YYYY-MM-DD HH:MM:SS`.
    pub fn observe(
        mut self,
        id: &str,
        observed_at: &str,
        docked: i64,
        free_docks: i64,
        overflow: i64,
    ) -> Self {
        self.observations.push(ObservationRow {
            station_id: id.to_string(),
            observed_at: observed_at.to_string(),
            docked,
            free_docks,
            overflow,
            active: true,
        });
        self
    }

    /// The shared sample data set.
    ///
    /// - Station 1 has exactly three observations in January 2023, one on
    ///   2022-12-31 and one on 2023-02-01 (just outside the month).
    /// - Station 1 was renamed on 2020-01-01; older rows keep the old name.
    /// - Station 2 has data in 2023 and 2024; station 3 only from 2024-07-01,
    ///   including one observation with zero capacity.
    /// - There is no data for 2021.
    pub fn sample() -> Self {
        Self::empty()
            .station_between(
                "1",
                "Sol (old)",
                40.41700,
                -3.70300,
                "2010-01-01 00:00:00",
                "2019-12-31 23:59:59",
            )
            .station("1", "Puerta del Sol A", 40.41731, -3.70275)
            .station("2", "Puerta del Sol B", 40.41669, -3.70290)
            .station("3", "Miguel Moya", 40.42069, -3.70581)
            .observe("1", "2022-12-31 23:00:00", 7, 17, 2)
            .observe("1", "2023-01-05 08:00:00", 10, 14, 0)
            .observe("1", "2023-01-15 18:00:00", 20, 4, 3)
            .observe("1", "2023-01-31 23:00:00", 5, 19, 0)
            .observe("1", "2023-02-01 00:00:00", 6, 18, 1)
            .observe("2", "2023-01-10 09:00:00", 12, 8, 4)
            .observe("2", "2023-03-03 07:00:00", 3, 17, 0)
            .observe("2", "2024-07-02 08:00:00", 15, 5, 6)
            .observe("3", "2024-07-01 08:00:00", 9, 11, 0)
            .observe("3", "2024-08-15 19:00:00", 0, 0, 2)
    }

    /// Write the fixture as a new SQLite file at `path`.
    pub async fn write_to(&self, path: &Path) -> Result<(), sqlx::Error> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Delete);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        for statement in SNAPSHOT_SCHEMA.split(';') {
            let trimmed = statement.trim();
            if !trimmed.is_empty() {
                sqlx::query(trimmed).execute(&pool).await?;
            }
        }

        for s in &self.stations {
            sqlx::query(
                "INSERT INTO stations (station_id, name, latitude, longitude, valid_from, valid_to) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&s.station_id)
            .bind(&s.name)
            .bind(s.latitude)
            .bind(s.longitude)
            .bind(&s.valid_from)
            .bind(&s.valid_to)
            .execute(&pool)
            .await?;
        }

        for o in &self.observations {
            sqlx::query(
                "INSERT INTO observations (station_id, observed_at, docked, free_docks, overflow, active) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&o.station_id)
            .bind(&o.observed_at)
            .bind(o.docked)
            .bind(o.free_docks)
            .bind(o.overflow)
            .bind(o.active as i64)
            .execute(&pool)
            .await?;
        }

        pool.close().await;
        Ok(())
    }
}
