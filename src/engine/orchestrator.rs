use std::time::Instant;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::selection::find_candidates;
use crate::error::AppError;
use crate::models::assignment::{Assignment, AssignmentAction, AssignmentStatus, AssignmentType};
use crate::models::earning::{Earning, EarningStatus};
use crate::models::order::OrderStatus;
use crate::models::partner::GeoPoint;
use crate::state::AppState;

const EXPIRY_REASON: &str = "assignment timed out with no partner response";

#[derive(Debug, Clone)]
pub struct AssignOrderRequest {
    pub order_id: Uuid,
    pub partner_id: Option<Uuid>,
    pub assigned_by: Option<Uuid>,
    pub assignment_type: AssignmentType,
    pub delivery_fee: Decimal,
    pub partner_commission: Option<Decimal>,
    pub pickup_location: Option<GeoPoint>,
    pub delivery_location: Option<GeoPoint>,
}

/// Partner share of the delivery fee when no explicit commission is given:
/// 80%, rounded half-up to two decimals.
pub fn default_commission(delivery_fee: Decimal) -> Decimal {
    (delivery_fee * dec!(0.80)).round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

pub fn assign_order(state: &AppState, request: AssignOrderRequest) -> Result<Assignment, AppError> {
    let start = Instant::now();
    let result = create_assignment(state, request);

    let outcome = if result.is_ok() { "success" } else { "error" };
    state
        .metrics
        .assignment_latency_seconds
        .with_label_values(&[outcome])
        .observe(start.elapsed().as_secs_f64());

    result
}

fn create_assignment(
    state: &AppState,
    request: AssignOrderRequest,
) -> Result<Assignment, AppError> {
    if request.delivery_fee < Decimal::ZERO {
        return Err(AppError::Validation(
            "delivery fee must not be negative".to_string(),
        ));
    }
    if let Some(commission) = request.partner_commission {
        if commission < Decimal::ZERO {
            return Err(AppError::Validation(
                "partner commission must not be negative".to_string(),
            ));
        }
    }
    for point in [request.pickup_location, request.delivery_location]
        .into_iter()
        .flatten()
    {
        if !point.is_valid() {
            return Err(AppError::Validation(format!(
                "coordinates out of range: {}, {}",
                point.lat, point.lng
            )));
        }
    }

    let order = state
        .orders
        .get(&request.order_id)
        .map(|entry| entry.clone())
        .ok_or_else(|| AppError::NotFound(format!("order {} not found", request.order_id)))?;

    if order.status != OrderStatus::Confirmed {
        return Err(AppError::InvalidStateTransition(format!(
            "order {} must be confirmed before assignment, currently {:?}",
            order.id, order.status
        )));
    }

    // Cheap early check so an already-taken order reports a conflict rather
    // than falling through to candidate selection; the entry claim below is
    // still what actually decides the race.
    if state.active_by_order.contains_key(&request.order_id) {
        return Err(AppError::Conflict(format!(
            "order {} already has an active assignment",
            request.order_id
        )));
    }

    let pickup = request.pickup_location.or(order.shop_location);
    let partner_id = resolve_partner(state, &request, pickup)?;

    let commission = request
        .partner_commission
        .unwrap_or_else(|| default_commission(request.delivery_fee));

    let assignment_id = Uuid::new_v4();

    // The entry claim is the uniqueness constraint: the first writer wins
    // the order slot, any concurrent creator observes Occupied.
    match state.active_by_order.entry(request.order_id) {
        Entry::Occupied(_) => {
            return Err(AppError::Conflict(format!(
                "order {} already has an active assignment",
                request.order_id
            )));
        }
        Entry::Vacant(slot) => {
            slot.insert(assignment_id);
        }
    }

    let now = Utc::now();
    let assignment = Assignment {
        id: assignment_id,
        order_id: request.order_id,
        partner_id,
        assigned_by: request.assigned_by,
        status: AssignmentStatus::Assigned,
        assignment_type: request.assignment_type,
        assigned_at: now,
        accepted_at: None,
        pickup_time: None,
        delivery_completed_at: None,
        delivery_fee: request.delivery_fee,
        partner_commission: commission,
        pickup_location: pickup,
        delivery_location: request.delivery_location,
        rejection_reason: None,
        delivery_notes: None,
        customer_rating: None,
        customer_feedback: None,
        settlement_id: None,
        is_settled: false,
    };

    let earning = Earning {
        assignment_id,
        partner_id,
        base_amount: commission,
        total_amount: commission,
        status: EarningStatus::Pending,
        earned_at: now,
        processed_at: None,
        settlement_id: None,
    };

    state.assignments.insert(assignment_id, assignment.clone());
    state.earnings.insert(assignment_id, earning);
    state.metrics.active_assignments.inc();

    info!(
        order_id = %request.order_id,
        partner_id = %partner_id,
        assignment_id = %assignment_id,
        commission = %commission,
        "order assigned"
    );

    Ok(assignment)
}

fn resolve_partner(
    state: &AppState,
    request: &AssignOrderRequest,
    pickup: Option<GeoPoint>,
) -> Result<Uuid, AppError> {
    match request.partner_id {
        Some(partner_id) => {
            let partner = state
                .partners
                .get(&partner_id)
                .ok_or_else(|| AppError::NotFound(format!("partner {partner_id} not found")))?;

            if !partner.can_take_orders() {
                return Err(AppError::Validation(format!(
                    "partner {partner_id} is not available for assignments"
                )));
            }

            Ok(partner_id)
        }
        None => {
            let candidates = find_candidates(state, pickup);
            candidates
                .first()
                .map(|partner| partner.id)
                .ok_or(AppError::NoAvailablePartner)
        }
    }
}

pub fn accept_assignment(
    state: &AppState,
    assignment_id: Uuid,
    partner_id: Uuid,
) -> Result<Assignment, AppError> {
    let assignment = transition(
        state,
        assignment_id,
        Some(partner_id),
        AssignmentAction::Accept,
        |assignment, now| assignment.accepted_at = Some(now),
    )?;

    info!(assignment_id = %assignment_id, partner_id = %partner_id, "assignment accepted");
    Ok(assignment)
}

pub fn reject_assignment(
    state: &AppState,
    assignment_id: Uuid,
    partner_id: Uuid,
    reason: Option<String>,
) -> Result<Assignment, AppError> {
    let assignment = transition(
        state,
        assignment_id,
        Some(partner_id),
        AssignmentAction::Reject,
        |assignment, _| assignment.rejection_reason = reason,
    )?;

    info!(assignment_id = %assignment_id, partner_id = %partner_id, "assignment rejected");
    Ok(assignment)
}

pub fn mark_picked_up(
    state: &AppState,
    assignment_id: Uuid,
    partner_id: Uuid,
) -> Result<Assignment, AppError> {
    let assignment = transition(
        state,
        assignment_id,
        Some(partner_id),
        AssignmentAction::PickUp,
        |assignment, now| assignment.pickup_time = Some(now),
    )?;

    set_order_status(state, assignment.order_id, OrderStatus::OutForDelivery);

    info!(assignment_id = %assignment_id, partner_id = %partner_id, "order picked up");
    Ok(assignment)
}

pub fn start_delivery(
    state: &AppState,
    assignment_id: Uuid,
    partner_id: Uuid,
) -> Result<Assignment, AppError> {
    let assignment = transition(
        state,
        assignment_id,
        Some(partner_id),
        AssignmentAction::StartDelivery,
        |_, _| {},
    )?;

    info!(assignment_id = %assignment_id, partner_id = %partner_id, "delivery started");
    Ok(assignment)
}

pub fn complete_delivery(
    state: &AppState,
    assignment_id: Uuid,
    partner_id: Uuid,
    notes: Option<String>,
) -> Result<Assignment, AppError> {
    let assignment = transition(
        state,
        assignment_id,
        Some(partner_id),
        AssignmentAction::CompleteDelivery,
        |assignment, now| {
            assignment.delivery_completed_at = Some(now);
            assignment.delivery_notes = notes;
        },
    )?;

    // The transition guard above fires at most once per assignment, so the
    // counter and earning effects below cannot double-apply.
    let earning_amount = process_earning(state, assignment_id);
    update_delivery_stats(state, partner_id, true, earning_amount);
    set_order_status(state, assignment.order_id, OrderStatus::Delivered);

    info!(assignment_id = %assignment_id, partner_id = %partner_id, "delivery completed");
    Ok(assignment)
}

pub fn confirm_delivery(
    state: &AppState,
    assignment_id: Uuid,
    rating: Option<u8>,
    feedback: Option<String>,
) -> Result<Assignment, AppError> {
    if let Some(rating) = rating {
        if !(1..=5).contains(&rating) {
            return Err(AppError::Validation(format!(
                "customer rating must be between 1 and 5, got {rating}"
            )));
        }
    }

    let assignment = transition(
        state,
        assignment_id,
        None,
        AssignmentAction::Confirm,
        |assignment, _| {
            assignment.customer_rating = rating;
            assignment.customer_feedback = feedback;
        },
    )?;

    info!(assignment_id = %assignment_id, "delivery confirmed by customer");
    Ok(assignment)
}

pub fn mark_failed(
    state: &AppState,
    assignment_id: Uuid,
    partner_id: Uuid,
    reason: Option<String>,
) -> Result<Assignment, AppError> {
    let assignment = transition(
        state,
        assignment_id,
        Some(partner_id),
        AssignmentAction::Fail,
        |assignment, _| assignment.rejection_reason = reason,
    )?;

    update_delivery_stats(state, partner_id, false, None);

    info!(assignment_id = %assignment_id, partner_id = %partner_id, "delivery failed");
    Ok(assignment)
}

/// System-side cancellation used by the expiry sweep; bypasses the partner
/// ownership check but still goes through the transition table.
pub fn expire_assignment(state: &AppState, assignment_id: Uuid) -> Result<Assignment, AppError> {
    let assignment = transition(
        state,
        assignment_id,
        None,
        AssignmentAction::Expire,
        |assignment, _| assignment.rejection_reason = Some(EXPIRY_REASON.to_string()),
    )?;

    info!(assignment_id = %assignment_id, order_id = %assignment.order_id, "assignment expired");
    Ok(assignment)
}

pub fn get_assignment(state: &AppState, assignment_id: Uuid) -> Result<Assignment, AppError> {
    state
        .assignments
        .get(&assignment_id)
        .map(|entry| entry.clone())
        .ok_or_else(|| AppError::NotFound(format!("assignment {assignment_id} not found")))
}

pub fn assignments_by_order(state: &AppState, order_id: Uuid) -> Vec<Assignment> {
    let mut assignments: Vec<Assignment> = state
        .assignments
        .iter()
        .filter(|entry| entry.order_id == order_id)
        .map(|entry| entry.clone())
        .collect();
    assignments.sort_by_key(|a| a.assigned_at);
    assignments
}

pub fn assignments_by_partner(
    state: &AppState,
    partner_id: Uuid,
    active_only: bool,
) -> Vec<Assignment> {
    let mut assignments: Vec<Assignment> = state
        .assignments
        .iter()
        .filter(|entry| {
            entry.partner_id == partner_id && (!active_only || !entry.status.is_terminal())
        })
        .map(|entry| entry.clone())
        .collect();
    assignments.sort_by_key(|a| a.assigned_at);
    assignments
}

pub fn assignments_by_status(state: &AppState, status: AssignmentStatus) -> Vec<Assignment> {
    state
        .assignments
        .iter()
        .filter(|entry| entry.status == status)
        .map(|entry| entry.clone())
        .collect()
}

/// Applies one action through the legal-transition table while holding the
/// assignment's entry lock, so concurrent actions race for the precondition
/// and the loser fails without mutating anything.
fn transition(
    state: &AppState,
    assignment_id: Uuid,
    acting_partner: Option<Uuid>,
    action: AssignmentAction,
    mutate: impl FnOnce(&mut Assignment, DateTime<Utc>),
) -> Result<Assignment, AppError> {
    let result = apply_transition(state, assignment_id, acting_partner, action, mutate);

    let outcome = if result.is_ok() { "success" } else { "error" };
    state
        .metrics
        .transitions_total
        .with_label_values(&[&action.to_string(), outcome])
        .inc();

    result
}

fn apply_transition(
    state: &AppState,
    assignment_id: Uuid,
    acting_partner: Option<Uuid>,
    action: AssignmentAction,
    mutate: impl FnOnce(&mut Assignment, DateTime<Utc>),
) -> Result<Assignment, AppError> {
    let (updated, became_terminal) = {
        let mut assignment = state.assignments.get_mut(&assignment_id).ok_or_else(|| {
            AppError::NotFound(format!("assignment {assignment_id} not found"))
        })?;

        if let Some(partner_id) = acting_partner {
            if assignment.partner_id != partner_id {
                return Err(AppError::Unauthorized(format!(
                    "assignment {assignment_id} does not belong to partner {partner_id}"
                )));
            }
        }

        let next = assignment.status.apply(action).ok_or_else(|| {
            AppError::InvalidStateTransition(format!(
                "cannot {action} assignment {assignment_id} in status {:?}",
                assignment.status
            ))
        })?;

        let was_active = !assignment.status.is_terminal();
        assignment.status = next;
        mutate(&mut assignment, Utc::now());

        (assignment.clone(), was_active && next.is_terminal())
    };

    if became_terminal {
        state
            .active_by_order
            .remove_if(&updated.order_id, |_, active| *active == assignment_id);
        state.metrics.active_assignments.dec();
    }

    Ok(updated)
}

fn process_earning(state: &AppState, assignment_id: Uuid) -> Option<Decimal> {
    let Some(mut earning) = state.earnings.get_mut(&assignment_id) else {
        warn!(assignment_id = %assignment_id, "no earning record for completed delivery");
        return None;
    };

    earning.status = EarningStatus::Processed;
    earning.processed_at = Some(Utc::now());
    Some(earning.total_amount)
}

fn update_delivery_stats(
    state: &AppState,
    partner_id: Uuid,
    successful: bool,
    earned: Option<Decimal>,
) {
    let Some(mut partner) = state.partners.get_mut(&partner_id) else {
        warn!(partner_id = %partner_id, "partner missing during stat update");
        return;
    };

    partner.total_deliveries += 1;
    if successful {
        partner.successful_deliveries += 1;
    }
    if let Some(amount) = earned {
        partner.total_earnings += amount;
    }
}

fn set_order_status(state: &AppState, order_id: Uuid, status: OrderStatus) {
    match state.orders.get_mut(&order_id) {
        Some(mut order) => order.status = status,
        None => warn!(order_id = %order_id, "order missing during status update"),
    }
}
