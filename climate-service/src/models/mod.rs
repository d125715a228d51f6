//! Record types for the observation store.
//!
//! Both tables are provisioned externally; these structs pin down the columns
//! the service relies on instead of discovering them at runtime.

use chrono::{Days, NaiveDate};
use serde::Serialize;
use sqlx::FromRow;

/// Date format of the `measurement.date` column and of path segments.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Length of the trailing observation window used by `/api/v1.0/tobs`.
pub const TRAILING_WINDOW_DAYS: u64 = 365;

/// First day of the trailing window ending at `most_recent`.
///
/// A fixed 365-day subtraction, so a window spanning Feb 29 covers one day
/// less than a calendar year.
pub fn trailing_window_start(most_recent: NaiveDate) -> Option<NaiveDate> {
    most_recent.checked_sub_days(Days::new(TRAILING_WINDOW_DAYS))
}

// ============================================================================
// Table Records
// ============================================================================

/// Columns of the `station` table the service reads. Coordinates and
/// elevation are stored but never mapped.
#[derive(Debug, Clone, FromRow)]
pub struct Station {
    pub station: String,
    pub name: Option<String>,
}

/// Dated reading from the `measurement` table. `date` is kept as stored text.
///
/// Each query selects `date` plus the one reading it needs; the other reading
/// defaults to `None`.
#[derive(Debug, Clone, FromRow)]
pub struct Measurement {
    pub date: String,
    #[sqlx(default)]
    pub prcp: Option<f64>,
    #[sqlx(default)]
    pub tobs: Option<f64>,
}

// ============================================================================
// Projections
// ============================================================================

/// Row count per station, used to pick the busiest one.
#[derive(Debug, Clone, FromRow)]
pub struct StationActivity {
    pub station: String,
    pub observations: i64,
}

/// MAX/MIN/AVG of `tobs` over a filtered row set. All null when nothing matched.
#[derive(Debug, Clone, Copy, Default, PartialEq, FromRow)]
pub struct TemperatureAggregate {
    pub temp_max: Option<f64>,
    pub temp_min: Option<f64>,
    pub temp_avg: Option<f64>,
}

/// Response element of the temperature summary routes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemperatureSummary {
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub temp_max: Option<f64>,
    pub temp_min: Option<f64>,
    pub temp_avg: Option<f64>,
}

impl TemperatureSummary {
    pub fn new(
        start_date: NaiveDate,
        end_date: Option<NaiveDate>,
        aggregate: TemperatureAggregate,
    ) -> Self {
        Self {
            start_date,
            end_date,
            temp_max: aggregate.temp_max,
            temp_min: aggregate.temp_min,
            temp_avg: aggregate.temp_avg,
        }
    }
}
