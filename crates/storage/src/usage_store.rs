//! Read-only analytical queries over the usage snapshot (SQLite).

use std::path::Path;
use std::time::Instant;

use chrono::{NaiveDate, NaiveDateTime};
use metrics::{counter, histogram};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{FromRow, QueryBuilder, Sqlite};
use tracing::{debug, info, instrument};

use bikeshare_common::time::DATE_FORMAT;
use bikeshare_common::{
    BikeResult, BikeshareError, CapacityPoint, DateRange, Granularity, HourlyPattern,
    PeriodAggregate, Station, StationId, UsageAggregate, UsageRecord, WeekdayPattern,
};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Observations joined with the station attributes valid at each instant.
///
/// At most one history entry joins each observation: when intervals touch,
/// the one that started last wins.
const RECORDS_FROM: &str = "FROM observations o \
     LEFT JOIN stations s \
       ON s.rowid = (SELECT h.rowid FROM stations h \
                     WHERE h.station_id = o.station_id \
                       AND o.observed_at BETWEEN h.valid_from AND h.valid_to \
                     ORDER BY h.valid_from DESC LIMIT 1) \
     WHERE 1 = 1";

const AGGREGATE_COLUMNS: &str = "COALESCE(AVG(o.overflow), 0.0) AS avg_overflow, \
     COALESCE(MAX(o.overflow), 0) AS max_overflow, \
     COALESCE(SUM(o.overflow), 0) AS total_overflow, \
     COALESCE(SUM(CASE WHEN o.overflow > 0 THEN 1 ELSE 0 END), 0) AS hours_with_overflow, \
     COUNT(*) AS total_hours, \
     COALESCE(AVG(o.docked), 0.0) AS avg_docked, \
     COALESCE(AVG(o.free_docks), 0.0) AS avg_free_docks";

/// Options for opening the store.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Size of the read-only connection pool.
    pub max_connections: u32,
    /// Observations before this date are ignored by every query.
    pub data_floor: Option<NaiveDate>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            max_connections: 8,
            data_floor: None,
        }
    }
}

/// Query engine over the local snapshot.
///
/// Holds a pool of read-only connections opened once at startup; SQLite
/// allows any number of concurrent readers, so queries never wait on each
/// other beyond pool checkout.
pub struct UsageStore {
    pool: SqlitePool,
    data_floor: Option<NaiveDate>,
}

impl UsageStore {
    /// Open the snapshot at `path` read-only and check its schema.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub async fn open(path: &Path, options: StoreOptions) -> BikeResult<Self> {
        if !path.is_file() {
            return Err(BikeshareError::Connection(format!(
                "Snapshot not found at {}",
                path.display()
            )));
        }

        let connect = SqliteConnectOptions::new().filename(path).read_only(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(options.max_connections.max(1))
            .connect_with(connect)
            .await
            .map_err(|e| BikeshareError::Connection(format!("Failed to open snapshot: {}", e)))?;

        let tables: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('stations', 'observations')",
        )
        .fetch_one(&pool)
        .await
        .map_err(|e| BikeshareError::Connection(format!("Snapshot is not readable: {}", e)))?;

        if tables != 2 {
            pool.close().await;
            return Err(BikeshareError::Connection(
                "Snapshot is missing the stations or observations table".to_string(),
            ));
        }

        info!(
            max_connections = options.max_connections,
            data_floor = ?options.data_floor,
            "Opened usage snapshot"
        );

        Ok(Self {
            pool,
            data_floor: options.data_floor,
        })
    }

    /// Close all pooled connections.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Cheap liveness query for readiness checks.
    pub async fn ping(&self) -> BikeResult<()> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| ())
            .map_err(query_failed)
    }

    /// Current name and position of every station.
    #[instrument(skip(self))]
    pub async fn list_stations(&self) -> BikeResult<Vec<Station>> {
        let started = Instant::now();

        let rows = sqlx::query_as::<_, StationRow>(
            "SELECT s.station_id, s.name, s.latitude, s.longitude FROM stations s \
             WHERE s.valid_to = (SELECT MAX(h.valid_to) FROM stations h \
                                 WHERE h.station_id = s.station_id) \
             GROUP BY s.station_id \
             ORDER BY s.station_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed)?;

        observe("list_stations", started, rows.len());
        Ok(rows.into_iter().map(Station::from).collect())
    }

    /// Observations matching the optional station and date filters,
    /// ordered by timestamp then station.
    #[instrument(skip(self))]
    pub async fn query_by_station_and_date(
        &self,
        station: Option<&StationId>,
        range: &DateRange,
    ) -> BikeResult<Vec<UsageRecord>> {
        let started = Instant::now();

        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT o.station_id, o.observed_at, o.docked, o.free_docks, o.overflow, o.active, \
             s.name, s.latitude, s.longitude ",
        );
        qb.push(RECORDS_FROM);
        self.push_filters(&mut qb, station, range);
        qb.push(" ORDER BY o.observed_at, o.station_id");

        let rows = qb
            .build_query_as::<RecordRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(query_failed)?;

        observe("records", started, rows.len());
        rows.into_iter().map(UsageRecord::try_from).collect()
    }

    /// Number of rows `query_by_station_and_date` would return.
    #[instrument(skip(self))]
    pub async fn count_records(
        &self,
        station: Option<&StationId>,
        range: &DateRange,
    ) -> BikeResult<u64> {
        let started = Instant::now();

        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) ");
        qb.push(RECORDS_FROM);
        self.push_filters(&mut qb, station, range);

        let count: i64 = qb
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .map_err(query_failed)?;

        observe("count_records", started, 1);
        Ok(count.max(0) as u64)
    }

    /// Aggregates bucketed by `granularity`, ordered by period.
    #[instrument(skip(self))]
    pub async fn time_series(
        &self,
        station: Option<&StationId>,
        range: &DateRange,
        granularity: Granularity,
    ) -> BikeResult<Vec<PeriodAggregate>> {
        let started = Instant::now();

        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT substr(o.observed_at, 1, {}) AS period, {} FROM observations o WHERE 1 = 1",
            granularity.period_len(),
            AGGREGATE_COLUMNS
        ));
        self.push_filters(&mut qb, station, range);
        qb.push(" GROUP BY period ORDER BY period");

        let rows = qb
            .build_query_as::<AggregateRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(query_failed)?;

        observe("time_series", started, rows.len());
        rows.into_iter().map(PeriodAggregate::try_from).collect()
    }

    /// One aggregate per month of `year` that has data.
    pub async fn monthly_summary(
        &self,
        station: Option<&StationId>,
        year: i32,
    ) -> BikeResult<Vec<PeriodAggregate>> {
        let range = year_range(year)?;
        self.time_series(station, &range, Granularity::Month).await
    }

    /// One aggregate per year with data.
    pub async fn annual_summary(
        &self,
        station: Option<&StationId>,
    ) -> BikeResult<Vec<PeriodAggregate>> {
        self.time_series(station, &DateRange::unbounded(), Granularity::Year)
            .await
    }

    /// Overflow by hour of day (0-23).
    #[instrument(skip(self))]
    pub async fn hourly_pattern(
        &self,
        station: Option<&StationId>,
        year: Option<i32>,
        month: Option<u32>,
    ) -> BikeResult<Vec<HourlyPattern>> {
        let started = Instant::now();

        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT CAST(substr(o.observed_at, 12, 2) AS INTEGER) AS bucket, \
             COALESCE(AVG(o.overflow), 0.0) AS avg_overflow, \
             COALESCE(MAX(o.overflow), 0) AS max_overflow, \
             COUNT(*) AS total_observations \
             FROM observations o WHERE 1 = 1",
        );
        self.push_filters(&mut qb, station, &DateRange::unbounded());
        push_calendar_filters(&mut qb, year, month);
        qb.push(" GROUP BY bucket ORDER BY bucket");

        let rows = qb
            .build_query_as::<PatternRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(query_failed)?;

        observe("hourly_pattern", started, rows.len());
        Ok(rows
            .into_iter()
            .map(|r| HourlyPattern {
                hour: r.bucket as u32,
                avg_overflow: r.avg_overflow,
                max_overflow: r.max_overflow,
                total_observations: r.total_observations,
            })
            .collect())
    }

    /// Overflow by ISO weekday (1 = Monday ... 7 = Sunday).
    #[instrument(skip(self))]
    pub async fn weekday_pattern(
        &self,
        station: Option<&StationId>,
        year: Option<i32>,
    ) -> BikeResult<Vec<WeekdayPattern>> {
        let started = Instant::now();

        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT CASE strftime('%w', o.observed_at) \
                 WHEN '0' THEN 7 \
                 ELSE CAST(strftime('%w', o.observed_at) AS INTEGER) END AS bucket, \
             COALESCE(AVG(o.overflow), 0.0) AS avg_overflow, \
             COALESCE(MAX(o.overflow), 0) AS max_overflow, \
             COUNT(*) AS total_observations \
             FROM observations o WHERE 1 = 1",
        );
        self.push_filters(&mut qb, station, &DateRange::unbounded());
        push_calendar_filters(&mut qb, year, None);
        qb.push(" GROUP BY bucket ORDER BY bucket");

        let rows = qb
            .build_query_as::<PatternRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(query_failed)?;

        observe("weekday_pattern", started, rows.len());
        Ok(rows
            .into_iter()
            .map(|r| WeekdayPattern {
                day_of_week: r.bucket as u32,
                avg_overflow: r.avg_overflow,
                max_overflow: r.max_overflow,
                total_observations: r.total_observations,
            })
            .collect())
    }

    /// Every station's observation at one date and hour, ordered by station.
    #[instrument(skip(self))]
    pub async fn city_snapshot(&self, date: NaiveDate, hour: u32) -> BikeResult<Vec<UsageRecord>> {
        let started = Instant::now();

        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT o.station_id, o.observed_at, o.docked, o.free_docks, o.overflow, o.active, \
             s.name, s.latitude, s.longitude ",
        );
        qb.push(RECORDS_FROM);
        self.push_filters(&mut qb, None, &DateRange::day(date));
        qb.push(" AND substr(o.observed_at, 1, 13) = ");
        qb.push_bind(format!("{} {:02}", date.format(DATE_FORMAT), hour));
        qb.push(" ORDER BY o.station_id");

        let rows = qb
            .build_query_as::<RecordRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(query_failed)?;

        observe("city_snapshot", started, rows.len());
        rows.into_iter().map(UsageRecord::try_from).collect()
    }

    /// Occupancy and overflow relative to capacity for one station.
    #[instrument(skip(self))]
    pub async fn capacity_analysis(
        &self,
        station: &StationId,
        range: &DateRange,
    ) -> BikeResult<Vec<CapacityPoint>> {
        let started = Instant::now();

        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT o.observed_at, o.docked, o.free_docks, o.overflow \
             FROM observations o WHERE 1 = 1",
        );
        self.push_filters(&mut qb, Some(station), range);
        qb.push(" ORDER BY o.observed_at");

        let rows = qb
            .build_query_as::<CapacityRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(query_failed)?;

        observe("capacity_analysis", started, rows.len());
        rows.into_iter()
            .map(|r| {
                Ok(CapacityPoint::new(
                    parse_timestamp(&r.observed_at)?,
                    r.docked,
                    r.free_docks,
                    r.overflow,
                ))
            })
            .collect()
    }

    /// Append station, date range and data floor conditions.
    fn push_filters(
        &self,
        qb: &mut QueryBuilder<'_, Sqlite>,
        station: Option<&StationId>,
        range: &DateRange,
    ) {
        if let Some(station) = station {
            qb.push(" AND o.station_id = ");
            qb.push_bind(station.as_str().to_string());
        }

        let range = range.clamp_start(self.data_floor);
        if let Some(start) = range.start() {
            qb.push(" AND substr(o.observed_at, 1, 10) >= ");
            qb.push_bind(start.format(DATE_FORMAT).to_string());
        }
        if let Some(end) = range.end() {
            qb.push(" AND substr(o.observed_at, 1, 10) <= ");
            qb.push_bind(end.format(DATE_FORMAT).to_string());
        }
    }
}

fn push_calendar_filters(qb: &mut QueryBuilder<'_, Sqlite>, year: Option<i32>, month: Option<u32>) {
    if let Some(year) = year {
        qb.push(" AND substr(o.observed_at, 1, 4) = ");
        qb.push_bind(format!("{:04}", year));
    }
    if let Some(month) = month {
        qb.push(" AND substr(o.observed_at, 6, 2) = ");
        qb.push_bind(format!("{:02}", month));
    }
}

fn year_range(year: i32) -> BikeResult<DateRange> {
    let start = NaiveDate::from_ymd_opt(year, 1, 1);
    let end = NaiveDate::from_ymd_opt(year, 12, 31);
    match (start, end) {
        (Some(start), Some(end)) => DateRange::new(Some(start), Some(end)),
        _ => Err(BikeshareError::invalid("year", format!("{} is out of range", year))),
    }
}

fn query_failed(e: sqlx::Error) -> BikeshareError {
    BikeshareError::Connection(format!("Query failed: {}", e))
}

fn parse_timestamp(value: &str) -> BikeResult<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT).map_err(|_| {
        BikeshareError::Connection(format!("Snapshot holds a malformed timestamp: '{}'", value))
    })
}

fn observe(query: &'static str, started: Instant, rows: usize) {
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
    counter!("usage_store_queries_total", "query" => query).increment(1);
    histogram!("usage_store_query_duration_ms", "query" => query).record(elapsed_ms);
    debug!(query, rows, elapsed_ms, "Query completed");
}

#[derive(Debug, FromRow)]
struct StationRow {
    station_id: String,
    name: String,
    latitude: f64,
    longitude: f64,
}

impl From<StationRow> for Station {
    fn from(row: StationRow) -> Self {
        Station {
            station_id: StationId::new(row.station_id),
            name: row.name,
            latitude: row.latitude,
            longitude: row.longitude,
        }
    }
}

#[derive(Debug, FromRow)]
struct RecordRow {
    station_id: String,
    observed_at: String,
    docked: i64,
    free_docks: i64,
    overflow: i64,
    active: i64,
    name: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

impl TryFrom<RecordRow> for UsageRecord {
    type Error = BikeshareError;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        Ok(UsageRecord {
            station_id: StationId::new(row.station_id),
            observed_at: parse_timestamp(&row.observed_at)?,
            docked: row.docked,
            free_docks: row.free_docks,
            overflow: row.overflow,
            active: row.active != 0,
            name: row.name,
            latitude: row.latitude,
            longitude: row.longitude,
        })
    }
}

#[derive(Debug, FromRow)]
struct AggregateRow {
    period: String,
    avg_overflow: f64,
    max_overflow: i64,
    total_overflow: i64,
    hours_with_overflow: i64,
    total_hours: i64,
    avg_docked: f64,
    avg_free_docks: f64,
}

impl TryFrom<AggregateRow> for PeriodAggregate {
    type Error = BikeshareError;

    fn try_from(row: AggregateRow) -> Result<Self, Self::Error> {
        let aggregate = UsageAggregate {
            avg_overflow: row.avg_overflow,
            max_overflow: row.max_overflow,
            total_overflow: row.total_overflow,
            hours_with_overflow: row.hours_with_overflow,
            total_hours: row.total_hours,
            avg_docked: row.avg_docked,
            avg_free_docks: row.avg_free_docks,
        };
        let label = row.period;
        PeriodAggregate::from_label(label.clone(), aggregate).ok_or_else(|| {
            BikeshareError::Connection(format!("Snapshot holds a malformed period: '{}'", label))
        })
    }
}

#[derive(Debug, FromRow)]
struct PatternRow {
    bucket: i64,
    avg_overflow: f64,
    max_overflow: i64,
    total_observations: i64,
}

#[derive(Debug, FromRow)]
struct CapacityRow {
    observed_at: String,
    docked: i64,
    free_docks: i64,
    overflow: i64,
}
