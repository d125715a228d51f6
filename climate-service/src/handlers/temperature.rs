use axum::{
    extract::{Path, State},
    Json,
};
use chrono::NaiveDate;
use thiserror::Error;

use crate::models::{TemperatureSummary, DATE_FORMAT};
use crate::services::record_error;
use crate::startup::AppState;
use service_core::error::AppError;

/// A path segment that is not a `YYYY-MM-DD` calendar date.
#[derive(Debug, Error)]
#[error("Invalid {field} date '{value}': expected YYYY-MM-DD")]
pub struct InvalidDate {
    pub field: &'static str,
    pub value: String,
}

impl From<InvalidDate> for AppError {
    fn from(err: InvalidDate) -> Self {
        let err = AppError::BadRequest(anyhow::Error::new(err));
        record_error(err.kind());
        err
    }
}

/// Exactly ten bytes: four-digit year, two-digit month and day, `-` between.
///
/// `%Y` alone also takes signed or wider years and skips leading spaces, and
/// those bind as text that no longer orders like the stored dates.
fn is_iso_date_shape(value: &str) -> bool {
    value.len() == 10
        && value.bytes().enumerate().all(|(i, b)| match i {
            4 | 7 => b == b'-',
            _ => b.is_ascii_digit(),
        })
}

pub fn parse_date_segment(field: &'static str, value: &str) -> Result<NaiveDate, InvalidDate> {
    let invalid = || InvalidDate {
        field,
        value: value.to_string(),
    };
    if !is_iso_date_shape(value) {
        return Err(invalid());
    }
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|_| invalid())
}

/// Min, max and average temperature on or after `start`.
#[tracing::instrument(skip(state))]
pub async fn summarize_temp_after_date(
    State(state): State<AppState>,
    Path(start): Path<String>,
) -> Result<Json<Vec<TemperatureSummary>>, AppError> {
    let start = parse_date_segment("start", &start)?;
    let summary = state.db.temperature_summary_from(start).await?;
    Ok(Json(vec![summary]))
}

/// Min, max and average temperature between `start` and `end`, inclusive.
#[tracing::instrument(skip(state))]
pub async fn summarize_temp_between_dates(
    State(state): State<AppState>,
    Path((start, end)): Path<(String, String)>,
) -> Result<Json<Vec<TemperatureSummary>>, AppError> {
    let start = parse_date_segment("start", &start)?;
    let end = parse_date_segment("end", &end)?;
    let summary = state.db.temperature_summary_between(start, end).await?;
    Ok(Json(vec![summary]))
}
