use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::tracking::LocationPoint;
use crate::state::AppState;
use crate::tracking::{self, LocationUpdateRequest};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/locations", post(update_location))
        .route("/tracking/alerts/low-battery", get(low_battery_alerts))
        .route("/tracking/:assignment_id/latest", get(latest))
        .route("/tracking/:assignment_id/history", get(history))
        .route("/tracking/:assignment_id/status", get(tracking_status))
        .route("/partners/:id/tracking", get(partner_tracking))
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
pub struct MinutesQuery {
    pub minutes: Option<i64>,
}

#[derive(Serialize)]
struct TrackingStatusResponse {
    is_recent: bool,
    is_moving: bool,
    point_count: usize,
}

async fn update_location(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LocationUpdateRequest>,
) -> Result<Json<LocationPoint>, AppError> {
    Ok(Json(tracking::update_location(&state, payload)?))
}

async fn latest(
    State(state): State<Arc<AppState>>,
    Path(assignment_id): Path<Uuid>,
) -> Result<Json<LocationPoint>, AppError> {
    tracking::latest(&state, assignment_id)?
        .map(Json)
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "no tracking points for assignment {assignment_id}"
            ))
        })
}

async fn history(
    State(state): State<Arc<AppState>>,
    Path(assignment_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<LocationPoint>>, AppError> {
    let points = match (query.from, query.to) {
        (Some(from), Some(to)) => tracking::history_in_range(&state, assignment_id, from, to)?,
        (None, None) => tracking::history(&state, assignment_id)?,
        _ => {
            return Err(AppError::Validation(
                "history range needs both from and to".to_string(),
            ));
        }
    };
    Ok(Json(points))
}

async fn tracking_status(
    State(state): State<Arc<AppState>>,
    Path(assignment_id): Path<Uuid>,
    Query(query): Query<MinutesQuery>,
) -> Result<Json<TrackingStatusResponse>, AppError> {
    if !state.assignments.contains_key(&assignment_id) {
        return Err(AppError::NotFound(format!(
            "assignment {assignment_id} not found"
        )));
    }

    let minutes = query.minutes.unwrap_or(5);
    Ok(Json(TrackingStatusResponse {
        is_recent: tracking::is_tracking_recent(&state, assignment_id, minutes)?,
        is_moving: tracking::is_partner_moving(&state, assignment_id),
        point_count: tracking::point_count(&state, assignment_id),
    }))
}

async fn partner_tracking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<MinutesQuery>,
) -> Result<Json<Vec<LocationPoint>>, AppError> {
    if !state.partners.contains_key(&id) {
        return Err(AppError::NotFound(format!("partner {id} not found")));
    }

    let minutes = query.minutes.unwrap_or(30);
    Ok(Json(tracking::recent_by_partner(&state, id, minutes)?))
}

async fn low_battery_alerts(State(state): State<Arc<AppState>>) -> Json<Vec<LocationPoint>> {
    Json(tracking::low_battery_alerts(&state))
}
