//! HTTP handlers for climate-service.

pub mod health;
pub mod observations;
pub mod routes;
pub mod temperature;

pub use health::{health_check, metrics_handler, readiness_check};
pub use observations::{precipitation, stations, tobs};
pub use routes::list_routes;
pub use temperature::{summarize_temp_after_date, summarize_temp_between_dates};
