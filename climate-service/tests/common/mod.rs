//! Common test utilities for climate-service integration tests.
//!
//! Each test gets its own SQLite file in a temp directory, seeded through a
//! writable pool and then reopened read-only the same way the service does.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use climate_service::config::{ClimateConfig, DatabaseConfig};
use climate_service::services::Database;
use climate_service::{build_router, AppState};
use serde_json::Value;
use service_core::config::Config as CommonConfig;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::sync::{Arc, Once};
use tempfile::TempDir;
use tower::ServiceExt;

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,climate_service=debug,sqlx=warn")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// `(station, name)` rows of the `station` table.
pub const STATIONS: &[(&str, &str)] = &[
    ("USC00519397", "WAIKIKI 717.2, HI US"),
    ("USC00519281", "WAIHEE 837.5, HI US"),
    ("USC00513117", "KANEOHE 838.1, HI US"),
    // No measurements: must never show up in /stations.
    ("USC00517948", "PEARL CITY, HI US"),
];

/// `(station, date, prcp, tobs)` rows of the `measurement` table, in id order.
pub const MEASUREMENTS: &[(&str, &str, Option<f64>, f64)] = &[
    ("USC00519397", "2017-08-18", Some(0.0), 78.0),
    ("USC00519397", "2017-08-19", Some(0.0), 79.0),
    ("USC00519397", "2017-08-20", Some(0.01), 80.0),
    ("USC00519397", "2017-08-21", Some(0.0), 81.0),
    ("USC00519397", "2017-08-22", Some(0.0), 80.0),
    ("USC00519397", "2017-08-23", Some(0.0), 81.0),
    ("USC00519281", "2016-08-22", Some(0.4), 70.0),
    ("USC00519281", "2016-08-23", Some(1.79), 77.0),
    ("USC00519281", "2017-01-01", None, 72.0),
    ("USC00519281", "2017-08-15", Some(0.32), 77.0),
    ("USC00519281", "2017-08-16", Some(0.12), 76.0),
    ("USC00519281", "2017-08-17", Some(0.01), 76.0),
    ("USC00519281", "2017-08-18", Some(0.06), 79.0),
    ("USC00513117", "2010-01-01", Some(0.08), 65.0),
    ("USC00513117", "2017-07-01", Some(0.02), 74.0),
];

const SCHEMA: &[&str] = &[
    "CREATE TABLE station (id INTEGER PRIMARY KEY, station TEXT, name TEXT, latitude FLOAT, longitude FLOAT, elevation FLOAT)",
    "CREATE TABLE measurement (id INTEGER PRIMARY KEY, station TEXT, date TEXT, prcp FLOAT, tobs FLOAT)",
];

/// Which tables and rows to put in the test store.
#[derive(Debug, Clone, Copy)]
pub enum Fixture {
    /// `STATIONS` and `MEASUREMENTS`.
    Hawaii,
    /// Both tables, no rows.
    Empty,
    /// No tables at all, so every data query fails.
    Unprovisioned,
}

/// Create and seed a SQLite file at `path`.
pub async fn seed_database(path: &Path, fixture: Fixture) {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Delete);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .expect("Failed to create test database");

    if !matches!(fixture, Fixture::Unprovisioned) {
        for statement in SCHEMA {
            sqlx::query(*statement).execute(&pool).await.unwrap();
        }
    }

    if matches!(fixture, Fixture::Hawaii) {
        for (station, name) in STATIONS {
            sqlx::query(
                "INSERT INTO station (station, name, latitude, longitude, elevation) VALUES (?1, ?2, 21.3, -157.8, 3.0)",
            )
            .bind(*station)
            .bind(*name)
            .execute(&pool)
            .await
            .unwrap();
        }
        for (station, date, prcp, tobs) in MEASUREMENTS {
            sqlx::query(
                "INSERT INTO measurement (station, date, prcp, tobs) VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(*station)
            .bind(*date)
            .bind(*prcp)
            .bind(*tobs)
            .execute(&pool)
            .await
            .unwrap();
        }
    }

    pool.close().await;
}

/// Run raw SQL against an already seeded store.
pub async fn execute_statements(path: &Path, statements: &[&str]) {
    if statements.is_empty() {
        return;
    }
    let options = SqliteConnectOptions::new()
        .filename(path)
        .journal_mode(SqliteJournalMode::Delete);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .expect("Failed to open test database for writing");

    for statement in statements {
        sqlx::query(*statement).execute(&pool).await.unwrap();
    }

    pool.close().await;
}

pub fn database_url(path: &Path) -> String {
    format!("sqlite://{}", path.display())
}

/// Configuration pointing at `database_url`, listening on an ephemeral port.
pub fn test_config(database_url: String) -> ClimateConfig {
    ClimateConfig {
        common: CommonConfig {
            port: 0,
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        },
        service_name: "climate-service-test".to_string(),
        service_version: "test".to_string(),
        log_level: "debug".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            url: database_url,
            // A single connection: a request that failed to release it would
            // stall every later request in the test.
            max_connections: 1,
            min_connections: 1,
        },
    }
}

/// Router over a freshly seeded store, driven in-process.
pub struct TestApp {
    pub router: Router,
    pub db: Arc<Database>,
    _dir: TempDir,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(Fixture::Hawaii).await
    }

    pub async fn spawn_with(fixture: Fixture) -> Self {
        Self::spawn_with_statements(fixture, &[]).await
    }

    /// Seed `fixture`, then run extra `statements` before reopening read-only.
    pub async fn spawn_with_statements(fixture: Fixture, statements: &[&str]) -> Self {
        init_tracing();

        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("hawaii.sqlite");
        seed_database(&path, fixture).await;
        execute_statements(&path, statements).await;

        let config = test_config(database_url(&path));
        let db = Database::new(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .expect("Failed to open test database");
        let db = Arc::new(db);

        let router = build_router(AppState {
            config,
            db: db.clone(),
        });

        Self {
            router,
            db,
            _dir: dir,
        }
    }

    /// GET `uri` and return the status and raw body.
    pub async fn get_text(&self, uri: &str) -> (StatusCode, String) {
        let response = self
            .router
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    /// GET `uri` and parse the body as JSON.
    pub async fn get_json(&self, uri: &str) -> (StatusCode, Value) {
        let (status, body) = self.get_text(uri).await;
        let json = serde_json::from_str(&body)
            .unwrap_or_else(|e| panic!("Body of {} is not JSON ({}): {}", uri, e, body));
        (status, json)
    }
}

/// Expected `(max, min, avg)` of `tobs` over fixture rows matching `keep`.
pub fn expected_aggregate(keep: impl Fn(&str) -> bool) -> Option<(f64, f64, f64)> {
    let temps: Vec<f64> = MEASUREMENTS
        .iter()
        .filter(|m| keep(m.1))
        .map(|m| m.3)
        .collect();
    if temps.is_empty() {
        return None;
    }
    let max = temps.iter().cloned().fold(f64::MIN, f64::max);
    let min = temps.iter().cloned().fold(f64::MAX, f64::min);
    let avg = temps.iter().sum::<f64>() / temps.len() as f64;
    Some((max, min, avg))
}

pub fn assert_close(actual: &Value, expected: f64) {
    let actual = actual
        .as_f64()
        .unwrap_or_else(|| panic!("Expected a number, got {}", actual));
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {}, got {}",
        expected,
        actual
    );
}
