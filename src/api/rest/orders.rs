use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::orchestrator;
use crate::error::AppError;
use crate::models::assignment::Assignment;
use crate::models::order::{Order, OrderStatus};
use crate::models::partner::GeoPoint;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create_order))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/assignments", get(order_assignments))
}

/// Collaborator seed: the dispatch core does not own orders, but exposing a
/// minimal create lets the assignment flow run end to end.
#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub order_number: Option<String>,
    pub status: Option<OrderStatus>,
    pub shop_location: Option<GeoPoint>,
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<Json<Order>, AppError> {
    if let Some(location) = payload.shop_location {
        if !location.is_valid() {
            return Err(AppError::Validation(format!(
                "coordinates out of range: {}, {}",
                location.lat, location.lng
            )));
        }
    }

    let id = Uuid::new_v4();
    let order = Order {
        id,
        order_number: payload
            .order_number
            .unwrap_or_else(|| format!("ORD-{}", &id.simple().to_string()[..8])),
        status: payload.status.unwrap_or(OrderStatus::Confirmed),
        shop_location: payload.shop_location,
        created_at: Utc::now(),
    };

    state.orders.insert(order.id, order.clone());
    Ok(Json(order))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    let order = state
        .orders
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))?;
    Ok(Json(order.value().clone()))
}

async fn order_assignments(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Assignment>>, AppError> {
    if !state.orders.contains_key(&id) {
        return Err(AppError::NotFound(format!("order {id} not found")));
    }
    Ok(Json(orchestrator::assignments_by_order(&state, id)))
}
