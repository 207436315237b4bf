use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::orchestrator::{self, AssignOrderRequest};
use crate::error::AppError;
use crate::models::assignment::{Assignment, AssignmentStatus, AssignmentType};
use crate::models::partner::GeoPoint;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/assignments", post(assign_order).get(list_assignments))
        .route("/assignments/:id", get(get_assignment))
        .route("/assignments/:id/accept", post(accept))
        .route("/assignments/:id/reject", post(reject))
        .route("/assignments/:id/pickup", post(pickup))
        .route("/assignments/:id/start", post(start))
        .route("/assignments/:id/complete", post(complete))
        .route("/assignments/:id/confirm", post(confirm))
        .route("/assignments/:id/fail", post(fail))
}

#[derive(Deserialize)]
pub struct CreateAssignmentRequest {
    pub order_id: Uuid,
    pub partner_id: Option<Uuid>,
    pub assigned_by: Option<Uuid>,
    pub assignment_type: Option<AssignmentType>,
    pub delivery_fee: Decimal,
    pub partner_commission: Option<Decimal>,
    pub pickup_location: Option<GeoPoint>,
    pub delivery_location: Option<GeoPoint>,
}

#[derive(Deserialize)]
pub struct PartnerActionRequest {
    pub partner_id: Uuid,
    pub reason: Option<String>,
    pub notes: Option<String>,
}

#[derive(Deserialize)]
pub struct ConfirmRequest {
    pub rating: Option<u8>,
    pub feedback: Option<String>,
}

#[derive(Deserialize)]
pub struct ListAssignmentsQuery {
    pub status: Option<AssignmentStatus>,
}

async fn assign_order(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateAssignmentRequest>,
) -> Result<Json<Assignment>, AppError> {
    // Explicit partner means a manual assignment unless the caller says
    // otherwise.
    let assignment_type = payload.assignment_type.unwrap_or(match payload.partner_id {
        Some(_) => AssignmentType::Manual,
        None => AssignmentType::Auto,
    });

    let assignment = orchestrator::assign_order(
        &state,
        AssignOrderRequest {
            order_id: payload.order_id,
            partner_id: payload.partner_id,
            assigned_by: payload.assigned_by,
            assignment_type,
            delivery_fee: payload.delivery_fee,
            partner_commission: payload.partner_commission,
            pickup_location: payload.pickup_location,
            delivery_location: payload.delivery_location,
        },
    )?;

    Ok(Json(assignment))
}

async fn list_assignments(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListAssignmentsQuery>,
) -> Json<Vec<Assignment>> {
    let assignments = match query.status {
        Some(status) => orchestrator::assignments_by_status(&state, status),
        None => state
            .assignments
            .iter()
            .map(|entry| entry.value().clone())
            .collect(),
    };
    Json(assignments)
}

async fn get_assignment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Assignment>, AppError> {
    Ok(Json(orchestrator::get_assignment(&state, id)?))
}

async fn accept(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<PartnerActionRequest>,
) -> Result<Json<Assignment>, AppError> {
    Ok(Json(orchestrator::accept_assignment(
        &state,
        id,
        payload.partner_id,
    )?))
}

async fn reject(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<PartnerActionRequest>,
) -> Result<Json<Assignment>, AppError> {
    Ok(Json(orchestrator::reject_assignment(
        &state,
        id,
        payload.partner_id,
        payload.reason,
    )?))
}

async fn pickup(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<PartnerActionRequest>,
) -> Result<Json<Assignment>, AppError> {
    Ok(Json(orchestrator::mark_picked_up(
        &state,
        id,
        payload.partner_id,
    )?))
}

async fn start(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<PartnerActionRequest>,
) -> Result<Json<Assignment>, AppError> {
    Ok(Json(orchestrator::start_delivery(
        &state,
        id,
        payload.partner_id,
    )?))
}

async fn complete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<PartnerActionRequest>,
) -> Result<Json<Assignment>, AppError> {
    Ok(Json(orchestrator::complete_delivery(
        &state,
        id,
        payload.partner_id,
        payload.notes,
    )?))
}

async fn confirm(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ConfirmRequest>,
) -> Result<Json<Assignment>, AppError> {
    Ok(Json(orchestrator::confirm_delivery(
        &state,
        id,
        payload.rating,
        payload.feedback,
    )?))
}

async fn fail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<PartnerActionRequest>,
) -> Result<Json<Assignment>, AppError> {
    Ok(Json(orchestrator::mark_failed(
        &state,
        id,
        payload.partner_id,
        payload.reason,
    )?))
}
