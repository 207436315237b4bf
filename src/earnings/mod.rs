use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::earning::{Earning, EarningStatus, Settlement, SettlementStatus};
use crate::state::AppState;

pub fn earnings_by_partner(state: &AppState, partner_id: Uuid) -> Vec<Earning> {
    let mut earnings: Vec<Earning> = state
        .earnings
        .iter()
        .filter(|entry| entry.partner_id == partner_id)
        .map(|entry| entry.clone())
        .collect();
    earnings.sort_by_key(|earning| earning.earned_at);
    earnings
}

pub fn earnings_by_status(state: &AppState, status: EarningStatus) -> Vec<Earning> {
    state
        .earnings
        .iter()
        .filter(|entry| entry.status == status)
        .map(|entry| entry.clone())
        .collect()
}

/// Sum of a partner's processed earnings; the figure the partner has
/// actually been credited.
pub fn total_processed(state: &AppState, partner_id: Uuid) -> Decimal {
    state
        .earnings
        .iter()
        .filter(|entry| {
            entry.partner_id == partner_id && entry.status == EarningStatus::Processed
        })
        .map(|entry| entry.total_amount)
        .sum()
}

/// Rolls a partner's processed, not-yet-settled earnings in the period into
/// one pending settlement, marking each earning and its assignment settled.
pub fn build_settlement(
    state: &AppState,
    partner_id: Uuid,
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
) -> Result<Settlement, AppError> {
    if period_end <= period_start {
        return Err(AppError::Validation(
            "settlement period end must be after its start".to_string(),
        ));
    }
    if !state.partners.contains_key(&partner_id) {
        return Err(AppError::NotFound(format!("partner {partner_id} not found")));
    }

    let settlement_id = Uuid::new_v4();
    let mut commission_earned = Decimal::ZERO;
    let mut earning_ids = Vec::new();

    for mut entry in state.earnings.iter_mut() {
        let in_scope = entry.partner_id == partner_id
            && entry.status == EarningStatus::Processed
            && entry.settlement_id.is_none()
            && entry
                .processed_at
                .is_some_and(|at| at >= period_start && at <= period_end);
        if !in_scope {
            continue;
        }

        entry.settlement_id = Some(settlement_id);
        commission_earned += entry.total_amount;
        earning_ids.push(entry.assignment_id);
    }

    if earning_ids.is_empty() {
        return Err(AppError::Validation(format!(
            "no unsettled processed earnings for partner {partner_id} in period"
        )));
    }

    let mut cash_collected = Decimal::ZERO;
    for assignment_id in &earning_ids {
        if let Some(mut assignment) = state.assignments.get_mut(assignment_id) {
            assignment.settlement_id = Some(settlement_id);
            assignment.is_settled = true;
            cash_collected += assignment.delivery_fee;
        }
    }

    let settlement = Settlement {
        id: settlement_id,
        partner_id,
        period_start,
        period_end,
        cash_collected,
        commission_earned,
        net_amount: cash_collected - commission_earned,
        status: SettlementStatus::Pending,
        earning_ids,
        created_at: Utc::now(),
    };

    state.settlements.insert(settlement_id, settlement.clone());
    info!(
        settlement_id = %settlement_id,
        partner_id = %partner_id,
        commission = %settlement.commission_earned,
        "settlement created"
    );

    Ok(settlement)
}

/// Moves a pending settlement to its final status. Completed, cancelled and
/// disputed are all terminal; earnings are never re-derived here.
pub fn close_settlement(
    state: &AppState,
    settlement_id: Uuid,
    status: SettlementStatus,
) -> Result<Settlement, AppError> {
    if status == SettlementStatus::Pending {
        return Err(AppError::Validation(
            "a settlement cannot be closed back to pending".to_string(),
        ));
    }

    let mut settlement = state.settlements.get_mut(&settlement_id).ok_or_else(|| {
        AppError::NotFound(format!("settlement {settlement_id} not found"))
    })?;

    if settlement.status != SettlementStatus::Pending {
        return Err(AppError::InvalidStateTransition(format!(
            "settlement {settlement_id} already closed as {:?}",
            settlement.status
        )));
    }

    settlement.status = status;
    info!(settlement_id = %settlement_id, status = ?status, "settlement closed");
    Ok(settlement.clone())
}

pub fn get_settlement(state: &AppState, settlement_id: Uuid) -> Result<Settlement, AppError> {
    state
        .settlements
        .get(&settlement_id)
        .map(|entry| entry.clone())
        .ok_or_else(|| AppError::NotFound(format!("settlement {settlement_id} not found")))
}
