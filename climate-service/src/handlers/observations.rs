use axum::{extract::State, Json};
use std::collections::BTreeMap;

use crate::services::database::DatedObservations;
use crate::startup::AppState;
use service_core::error::AppError;

/// Precipitation keyed by date across all stations.
#[tracing::instrument(skip(state))]
pub async fn precipitation(
    State(state): State<AppState>,
) -> Result<Json<DatedObservations>, AppError> {
    let observations = state.db.precipitation_by_date().await?;
    Ok(Json(observations))
}

/// Station names keyed by station code, limited to stations with measurements.
#[tracing::instrument(skip(state))]
pub async fn stations(
    State(state): State<AppState>,
) -> Result<Json<BTreeMap<String, Option<String>>>, AppError> {
    let stations = state.db.station_names().await?;
    Ok(Json(stations))
}

/// Temperature observations of the most active station over the trailing year.
#[tracing::instrument(skip(state))]
pub async fn tobs(State(state): State<AppState>) -> Result<Json<DatedObservations>, AppError> {
    let observations = state
        .db
        .trailing_year_observations()
        .await?
        .map(|trailing| trailing.observations)
        .unwrap_or_default();

    Ok(Json(observations))
}
