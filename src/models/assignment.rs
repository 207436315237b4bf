use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::partner::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AssignmentStatus {
    Assigned,
    Accepted,
    PickedUp,
    InTransit,
    Delivered,
    Completed,
    Rejected,
    Cancelled,
    Failed,
}

impl AssignmentStatus {
    /// Terminal states admit no further transitions and free the order for
    /// a fresh assignment.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Delivered | Self::Completed | Self::Rejected | Self::Cancelled | Self::Failed
        )
    }

    /// States in which location ingestion is accepted.
    pub fn is_trackable(&self) -> bool {
        matches!(self, Self::Accepted | Self::PickedUp | Self::InTransit)
    }

    /// The closed legal-transition table. Every lifecycle operation goes
    /// through here; anything not listed is an illegal transition.
    pub fn apply(&self, action: AssignmentAction) -> Option<AssignmentStatus> {
        use AssignmentAction::*;
        use AssignmentStatus::*;

        match (self, action) {
            (Assigned, Accept) => Some(Accepted),
            (Assigned, Reject) => Some(Rejected),
            (Assigned, Expire) => Some(Cancelled),
            (Accepted, PickUp) => Some(PickedUp),
            (PickedUp, StartDelivery) => Some(InTransit),
            (InTransit, CompleteDelivery) => Some(Delivered),
            (Delivered, Confirm) => Some(Completed),
            (Assigned | Accepted | PickedUp | InTransit, Fail) => Some(Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AssignmentAction {
    Accept,
    Reject,
    PickUp,
    StartDelivery,
    CompleteDelivery,
    Confirm,
    Fail,
    Expire,
}

impl std::fmt::Display for AssignmentAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Accept => "accept",
            Self::Reject => "reject",
            Self::PickUp => "pickup",
            Self::StartDelivery => "start_delivery",
            Self::CompleteDelivery => "complete_delivery",
            Self::Confirm => "confirm",
            Self::Fail => "fail",
            Self::Expire => "expire",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum AssignmentType {
    Auto,
    Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub partner_id: Uuid,
    pub assigned_by: Option<Uuid>,
    pub status: AssignmentStatus,
    pub assignment_type: AssignmentType,
    pub assigned_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub pickup_time: Option<DateTime<Utc>>,
    pub delivery_completed_at: Option<DateTime<Utc>>,
    pub delivery_fee: Decimal,
    pub partner_commission: Decimal,
    pub pickup_location: Option<GeoPoint>,
    pub delivery_location: Option<GeoPoint>,
    pub rejection_reason: Option<String>,
    pub delivery_notes: Option<String>,
    pub customer_rating: Option<u8>,
    pub customer_feedback: Option<String>,
    pub settlement_id: Option<Uuid>,
    pub is_settled: bool,
}

#[cfg(test)]
mod tests {
    use super::AssignmentAction::*;
    use super::AssignmentStatus::{self, *};

    const ALL_STATES: [AssignmentStatus; 9] = [
        Assigned, Accepted, PickedUp, InTransit, Delivered, Completed, Rejected, Cancelled, Failed,
    ];

    #[test]
    fn happy_path_walks_the_full_lifecycle() {
        let mut status = Assigned;
        for action in [Accept, PickUp, StartDelivery, CompleteDelivery, Confirm] {
            status = status.apply(action).expect("legal transition");
        }
        assert_eq!(status, Completed);
    }

    #[test]
    fn reject_and_expire_only_leave_assigned() {
        assert_eq!(Assigned.apply(Reject), Some(Rejected));
        assert_eq!(Assigned.apply(Expire), Some(Cancelled));

        for state in ALL_STATES.iter().filter(|s| **s != Assigned) {
            assert_eq!(state.apply(Reject), None);
            assert_eq!(state.apply(Expire), None);
        }
    }

    #[test]
    fn fail_is_legal_from_every_active_state_only() {
        for state in ALL_STATES {
            let expected = if state.is_terminal() { None } else { Some(Failed) };
            assert_eq!(state.apply(Fail), expected);
        }
    }

    #[test]
    fn terminal_states_admit_only_delivery_confirmation() {
        for state in ALL_STATES.iter().filter(|s| s.is_terminal()) {
            for action in [
                Accept, Reject, PickUp, StartDelivery, CompleteDelivery, Confirm, Fail, Expire,
            ] {
                let expected = if (*state, action) == (Delivered, Confirm) {
                    Some(Completed)
                } else {
                    None
                };
                assert_eq!(state.apply(action), expected);
            }
        }
    }

    #[test]
    fn trackable_states_are_exactly_the_active_delivery_window() {
        for state in ALL_STATES {
            let expected = matches!(state, Accepted | PickedUp | InTransit);
            assert_eq!(state.is_trackable(), expected);
        }
    }

    #[test]
    fn skipping_a_lifecycle_step_is_illegal() {
        assert_eq!(Assigned.apply(PickUp), None);
        assert_eq!(Assigned.apply(CompleteDelivery), None);
        assert_eq!(Accepted.apply(StartDelivery), None);
        assert_eq!(PickedUp.apply(CompleteDelivery), None);
    }
}
