//! `GET /usage` (§4.7, §6).

use crate::error_map::error_response;
use crate::types::{ErrorResponse, UsageQuery, UsageResponse};
use crate::AppState;
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Json, Response};
use std::sync::Arc;
use vecdex_core::model::Period;
use vecdex_core::Error;

fn parse_period(period: &str) -> Result<Period, Error> {
    match period {
        "day" => Ok(Period::Day),
        "month" => Ok(Period::Month),
        "total" => Ok(Period::Total),
        other => Err(Error::InvalidSchema(format!("unknown usage period '{other}'"))),
    }
}

/// Reports embedding usage and budget state for a period. Defaults to
/// `day` when the caller omits `period`.
#[utoipa::path(
    get,
    path = "/usage",
    tag = "usage",
    params(("period" = Option<String>, Query, description = "day, month, or total; defaults to day")),
    responses(
        (status = 200, description = "Usage report", body = UsageResponse),
        (status = 400, description = "Invalid period", body = ErrorResponse)
    )
)]
pub async fn get_usage(State(state): State<Arc<AppState>>, Query(query): Query<UsageQuery>) -> Response {
    let period = match query.period.as_deref().map(parse_period) {
        Some(Ok(period)) => period,
        Some(Err(e)) => return error_response(&e),
        None => Period::Day,
    };

    match state.service.usage.get_report(period).await {
        Ok(report) => Json(UsageResponse::from(report)).into_response(),
        Err(e) => error_response(&e),
    }
}
