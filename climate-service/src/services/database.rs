//! Database service for climate-service.
//!
//! The observation store is opened read-only. Every public operation checks
//! out exactly one pooled connection and runs all of its statements on it; the
//! connection goes back to the pool when the guard drops, on every path.

use crate::models::{
    trailing_window_start, Measurement, Station, StationActivity, TemperatureAggregate,
    TemperatureSummary, DATE_FORMAT,
};
use crate::services::metrics::{record_error, DB_QUERY_DURATION};
use chrono::NaiveDate;
use service_core::error::AppError;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, SqliteConnection};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Observations keyed by the stored `YYYY-MM-DD` date text.
pub type DatedObservations = BTreeMap<String, Option<f64>>;

/// Temperature observations of the busiest station over the trailing window.
#[derive(Debug, Clone)]
pub struct TrailingObservations {
    pub station: String,
    pub station_observations: i64,
    pub most_recent_date: NaiveDate,
    pub window_start: NaiveDate,
    pub observations: DatedObservations,
}

const SELECT_PRECIPITATION: &str = r#"
    SELECT date, prcp
    FROM measurement
    ORDER BY id
"#;

const SELECT_ACTIVE_STATIONS: &str = r#"
    SELECT DISTINCT s.station, s.name
    FROM station s
    INNER JOIN measurement m ON s.station = m.station
    ORDER BY s.station
"#;

const SELECT_MOST_RECENT_DATE: &str = "SELECT MAX(date) FROM measurement";

const SELECT_MOST_ACTIVE_STATION: &str = r#"
    SELECT station, COUNT(id) AS observations
    FROM measurement
    GROUP BY station
    ORDER BY observations DESC
    LIMIT 1
"#;

const SELECT_STATION_TEMPERATURES_SINCE: &str = r#"
    SELECT date, tobs
    FROM measurement
    WHERE date >= ?1 AND station = ?2
    ORDER BY id
"#;

const SELECT_TEMPERATURE_FROM: &str = r#"
    SELECT CAST(MAX(tobs) AS REAL) AS temp_max,
           CAST(MIN(tobs) AS REAL) AS temp_min,
           AVG(tobs) AS temp_avg
    FROM measurement
    WHERE date >= ?1
"#;

const SELECT_TEMPERATURE_BETWEEN: &str = r#"
    SELECT CAST(MAX(tobs) AS REAL) AS temp_max,
           CAST(MIN(tobs) AS REAL) AS temp_min,
           AVG(tobs) AS temp_avg
    FROM measurement
    WHERE date >= ?1 AND date <= ?2
"#;

/// Count `err` under its kind before handing it back.
fn counted(err: AppError) -> AppError {
    record_error(err.kind());
    err
}

fn query_failed(operation: &'static str) -> impl FnOnce(sqlx::Error) -> AppError {
    move |e| {
        tracing::error!(operation, error = %e, "Database query failed");
        counted(AppError::DatabaseError(anyhow::anyhow!(
            "Failed to {}: {}",
            operation,
            e
        )))
    }
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open a read-only connection pool on the observation store.
    #[instrument(skip(database_url), fields(service = "climate-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to SQLite"
        );

        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| {
                AppError::ConfigError(anyhow::anyhow!("Invalid DATABASE_URL: {}", e))
            })?
            .read_only(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect_with(options)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("SQLite connection pool established");

        Ok(Self { pool })
    }

    async fn acquire(&self) -> Result<PoolConnection<Sqlite>, AppError> {
        self.pool.acquire().await.map_err(|e| {
            counted(AppError::DatabaseError(anyhow::anyhow!(
                "Failed to acquire connection: {}",
                e
            )))
        })
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;

        timer.observe_duration();
        Ok(())
    }

    // =========================================================================
    // Precipitation & Stations
    // =========================================================================

    /// Precipitation of every measurement keyed by date.
    ///
    /// Rows are read in id order, so when several stations report the same
    /// date the highest id wins.
    #[instrument(skip(self))]
    pub async fn precipitation_by_date(&self) -> Result<DatedObservations, AppError> {
        let mut conn = self.acquire().await?;
        let timer = DB_QUERY_DURATION
            .with_label_values(&["precipitation_by_date"])
            .start_timer();

        let rows = sqlx::query_as::<_, Measurement>(SELECT_PRECIPITATION)
            .fetch_all(&mut *conn)
            .await
            .map_err(query_failed("load precipitation"))?;

        timer.observe_duration();
        debug!(rows = rows.len(), "Precipitation rows loaded");

        Ok(rows.into_iter().map(|m| (m.date, m.prcp)).collect())
    }

    /// Names of the stations that have at least one measurement, keyed by code.
    #[instrument(skip(self))]
    pub async fn station_names(&self) -> Result<BTreeMap<String, Option<String>>, AppError> {
        let mut conn = self.acquire().await?;
        let timer = DB_QUERY_DURATION
            .with_label_values(&["station_names"])
            .start_timer();

        let stations = sqlx::query_as::<_, Station>(SELECT_ACTIVE_STATIONS)
            .fetch_all(&mut *conn)
            .await
            .map_err(query_failed("load stations"))?;

        timer.observe_duration();
        debug!(stations = stations.len(), "Stations loaded");

        Ok(stations.into_iter().map(|s| (s.station, s.name)).collect())
    }

    // =========================================================================
    // Temperature Observations
    // =========================================================================

    /// Latest date present in the measurement table, if any.
    #[instrument(skip(self))]
    pub async fn most_recent_date(&self) -> Result<Option<NaiveDate>, AppError> {
        let mut conn = self.acquire().await?;
        fetch_most_recent_date(&mut conn).await
    }

    /// Station with the most measurement rows. Ties resolve in whatever order
    /// SQLite's grouping yields.
    #[instrument(skip(self))]
    pub async fn most_active_station(&self) -> Result<Option<StationActivity>, AppError> {
        let mut conn = self.acquire().await?;
        fetch_most_active_station(&mut conn).await
    }

    /// Temperature observations of the most active station from 365 days
    /// before the latest stored date onwards. `None` when there are no
    /// measurements at all.
    #[instrument(skip(self))]
    pub async fn trailing_year_observations(
        &self,
    ) -> Result<Option<TrailingObservations>, AppError> {
        let mut conn = self.acquire().await?;

        let Some(most_recent_date) = fetch_most_recent_date(&mut conn).await? else {
            return Ok(None);
        };
        let window_start = trailing_window_start(most_recent_date).ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!(
                "Trailing window underflows before {}",
                most_recent_date
            ))
        })?;
        let Some(activity) = fetch_most_active_station(&mut conn).await? else {
            return Ok(None);
        };

        let timer = DB_QUERY_DURATION
            .with_label_values(&["trailing_year_observations"])
            .start_timer();

        let rows = sqlx::query_as::<_, Measurement>(SELECT_STATION_TEMPERATURES_SINCE)
            .bind(window_start)
            .bind(&activity.station)
            .fetch_all(&mut *conn)
            .await
            .map_err(query_failed("load temperature observations"))?;

        timer.observe_duration();
        info!(
            station = %activity.station,
            window_start = %window_start,
            most_recent_date = %most_recent_date,
            rows = rows.len(),
            "Trailing year observations loaded"
        );

        Ok(Some(TrailingObservations {
            station: activity.station,
            station_observations: activity.observations,
            most_recent_date,
            window_start,
            observations: rows.into_iter().map(|m| (m.date, m.tobs)).collect(),
        }))
    }

    // =========================================================================
    // Temperature Summaries
    // =========================================================================

    /// MAX/MIN/AVG temperature on or after `start`. `end_date` reports the
    /// latest stored date; it does not bound the query.
    #[instrument(skip(self))]
    pub async fn temperature_summary_from(
        &self,
        start: NaiveDate,
    ) -> Result<TemperatureSummary, AppError> {
        let mut conn = self.acquire().await?;
        let most_recent_date = fetch_most_recent_date(&mut conn).await?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["temperature_summary_from"])
            .start_timer();

        let aggregate = sqlx::query_as::<_, TemperatureAggregate>(SELECT_TEMPERATURE_FROM)
            .bind(start)
            .fetch_one(&mut *conn)
            .await
            .map_err(query_failed("summarize temperatures"))?;

        timer.observe_duration();

        Ok(TemperatureSummary::new(start, most_recent_date, aggregate))
    }

    /// MAX/MIN/AVG temperature for `start <= date <= end`. Both dates are
    /// echoed back unchanged.
    #[instrument(skip(self))]
    pub async fn temperature_summary_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<TemperatureSummary, AppError> {
        let mut conn = self.acquire().await?;
        let timer = DB_QUERY_DURATION
            .with_label_values(&["temperature_summary_between"])
            .start_timer();

        let aggregate = sqlx::query_as::<_, TemperatureAggregate>(SELECT_TEMPERATURE_BETWEEN)
            .bind(start)
            .bind(end)
            .fetch_one(&mut *conn)
            .await
            .map_err(query_failed("summarize temperatures"))?;

        timer.observe_duration();

        Ok(TemperatureSummary::new(start, Some(end), aggregate))
    }
}

async fn fetch_most_recent_date(
    conn: &mut SqliteConnection,
) -> Result<Option<NaiveDate>, AppError> {
    let timer = DB_QUERY_DURATION
        .with_label_values(&["most_recent_date"])
        .start_timer();

    let latest = sqlx::query_scalar::<_, Option<String>>(SELECT_MOST_RECENT_DATE)
        .fetch_one(&mut *conn)
        .await
        .map_err(query_failed("find most recent date"))?;

    timer.observe_duration();

    latest
        .map(|raw| {
            NaiveDate::parse_from_str(&raw, DATE_FORMAT).map_err(|e| {
                counted(AppError::DatabaseError(anyhow::anyhow!(
                    "Stored date '{}' is not YYYY-MM-DD: {}",
                    raw,
                    e
                )))
            })
        })
        .transpose()
}

async fn fetch_most_active_station(
    conn: &mut SqliteConnection,
) -> Result<Option<StationActivity>, AppError> {
    let timer = DB_QUERY_DURATION
        .with_label_values(&["most_active_station"])
        .start_timer();

    let activity = sqlx::query_as::<_, StationActivity>(SELECT_MOST_ACTIVE_STATION)
        .fetch_optional(&mut *conn)
        .await
        .map_err(query_failed("find most active station"))?;

    timer.observe_duration();
    Ok(activity)
}
