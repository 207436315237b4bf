use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum EarningStatus {
    Pending,
    Processed,
}

/// Per-assignment commission record, created 1:1 with the assignment and
/// moved to `Processed` exactly once, by delivery completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Earning {
    pub assignment_id: Uuid,
    pub partner_id: Uuid,
    pub base_amount: Decimal,
    pub total_amount: Decimal,
    pub status: EarningStatus,
    pub earned_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub settlement_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SettlementStatus {
    Pending,
    Completed,
    Cancelled,
    Disputed,
}

/// Periodic aggregate payout of one partner's processed earnings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settlement {
    pub id: Uuid,
    pub partner_id: Uuid,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub cash_collected: Decimal,
    pub commission_earned: Decimal,
    pub net_amount: Decimal,
    pub status: SettlementStatus,
    pub earning_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}
