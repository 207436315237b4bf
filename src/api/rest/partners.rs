use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::earnings;
use crate::engine::orchestrator;
use crate::error::AppError;
use crate::models::assignment::Assignment;
use crate::models::earning::Earning;
use crate::models::partner::{Partner, VehicleType, VerificationStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/partners", post(register_partner).get(list_partners))
        .route("/partners/:id", get(get_partner))
        .route("/partners/:id/status", patch(update_status))
        .route("/partners/:id/verification", patch(update_verification))
        .route("/partners/:id/assignments", get(partner_assignments))
        .route("/partners/:id/earnings", get(partner_earnings))
}

#[derive(Deserialize)]
pub struct RegisterPartnerRequest {
    pub full_name: String,
    pub phone_number: String,
    pub vehicle_type: VehicleType,
    pub vehicle_number: String,
    pub max_radius_km: Option<f64>,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub is_online: Option<bool>,
    pub is_available: Option<bool>,
}

#[derive(Deserialize)]
pub struct UpdateVerificationRequest {
    pub verification_status: VerificationStatus,
}

#[derive(Deserialize)]
pub struct PartnerAssignmentsQuery {
    #[serde(default)]
    pub active: bool,
}

async fn register_partner(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterPartnerRequest>,
) -> Result<Json<Partner>, AppError> {
    if payload.full_name.trim().is_empty() {
        return Err(AppError::Validation("full name cannot be empty".to_string()));
    }
    if payload.phone_number.trim().is_empty() {
        return Err(AppError::Validation(
            "phone number cannot be empty".to_string(),
        ));
    }
    if payload.max_radius_km.is_some_and(|radius| radius <= 0.0) {
        return Err(AppError::Validation(
            "delivery radius must be positive".to_string(),
        ));
    }

    let partner = Partner {
        id: Uuid::new_v4(),
        full_name: payload.full_name,
        phone_number: payload.phone_number,
        vehicle_type: payload.vehicle_type,
        vehicle_number: payload.vehicle_number,
        verification_status: VerificationStatus::Pending,
        is_online: false,
        is_available: false,
        rating: 5.0,
        total_deliveries: 0,
        successful_deliveries: 0,
        total_earnings: Decimal::ZERO,
        max_radius_km: payload.max_radius_km.unwrap_or(state.config.service_radius_km),
        current_location: None,
        last_location_update: None,
        registered_at: Utc::now(),
    };

    state.partners.insert(partner.id, partner.clone());
    Ok(Json(partner))
}

async fn list_partners(State(state): State<Arc<AppState>>) -> Json<Vec<Partner>> {
    let partners = state
        .partners
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    Json(partners)
}

async fn get_partner(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Partner>, AppError> {
    let partner = state
        .partners
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("partner {id} not found")))?;
    Ok(Json(partner.value().clone()))
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Partner>, AppError> {
    let mut partner = state
        .partners
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("partner {id} not found")))?;

    if let Some(is_online) = payload.is_online {
        partner.is_online = is_online;
        // Going offline always revokes availability.
        if !is_online {
            partner.is_available = false;
        }
    }

    if let Some(is_available) = payload.is_available {
        if is_available && !partner.is_online {
            return Err(AppError::Validation(
                "partner must be online to become available".to_string(),
            ));
        }
        partner.is_available = is_available;
    }

    Ok(Json(partner.clone()))
}

async fn update_verification(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateVerificationRequest>,
) -> Result<Json<Partner>, AppError> {
    let mut partner = state
        .partners
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("partner {id} not found")))?;

    partner.verification_status = payload.verification_status;
    Ok(Json(partner.clone()))
}

async fn partner_assignments(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    axum::extract::Query(query): axum::extract::Query<PartnerAssignmentsQuery>,
) -> Result<Json<Vec<Assignment>>, AppError> {
    if !state.partners.contains_key(&id) {
        return Err(AppError::NotFound(format!("partner {id} not found")));
    }
    Ok(Json(orchestrator::assignments_by_partner(
        &state,
        id,
        query.active,
    )))
}

async fn partner_earnings(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Earning>>, AppError> {
    if !state.partners.contains_key(&id) {
        return Err(AppError::NotFound(format!("partner {id} not found")));
    }
    Ok(Json(earnings::earnings_by_partner(&state, id)))
}
