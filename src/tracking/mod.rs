use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::partner::GeoPoint;
use crate::models::tracking::LocationPoint;
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct LocationUpdateRequest {
    pub assignment_id: Uuid,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy_m: Option<f64>,
    pub altitude_m: Option<f64>,
    pub speed_kmh: Option<f64>,
    pub heading_deg: Option<f64>,
    pub tracked_at: Option<DateTime<Utc>>,
    pub battery_level: Option<u8>,
    pub is_moving: Option<bool>,
    pub estimated_arrival_time: Option<DateTime<Utc>>,
    pub distance_to_destination_km: Option<f64>,
}

/// Appends a GPS ping for an assignment in a trackable state and refreshes
/// the partner's denormalized current location.
pub fn update_location(
    state: &AppState,
    request: LocationUpdateRequest,
) -> Result<LocationPoint, AppError> {
    let point = GeoPoint {
        lat: request.latitude,
        lng: request.longitude,
    };
    if !point.is_valid() {
        return Err(AppError::Validation(format!(
            "coordinates out of range: {}, {}",
            request.latitude, request.longitude
        )));
    }

    let assignment = state
        .assignments
        .get(&request.assignment_id)
        .map(|entry| (entry.status, entry.partner_id))
        .ok_or_else(|| {
            AppError::NotFound(format!("assignment {} not found", request.assignment_id))
        })?;

    let (status, partner_id) = assignment;
    if !status.is_trackable() {
        return Err(AppError::InvalidStateTransition(format!(
            "assignment {} is not in a trackable state: {:?}",
            request.assignment_id, status
        )));
    }

    let now = Utc::now();
    let location_point = LocationPoint {
        id: Uuid::new_v4(),
        assignment_id: request.assignment_id,
        latitude: request.latitude,
        longitude: request.longitude,
        accuracy_m: request.accuracy_m,
        altitude_m: request.altitude_m,
        speed_kmh: request.speed_kmh,
        heading_deg: request.heading_deg,
        tracked_at: request.tracked_at.unwrap_or(now),
        battery_level: request.battery_level,
        is_moving: request.is_moving,
        estimated_arrival_time: request.estimated_arrival_time,
        distance_to_destination_km: request.distance_to_destination_km,
    };

    state
        .tracking
        .entry(request.assignment_id)
        .or_default()
        .push(location_point.clone());
    state.metrics.location_points_total.inc();

    if let Some(mut partner) = state.partners.get_mut(&partner_id) {
        partner.current_location = Some(point);
        partner.last_location_update = Some(now);
    }

    debug!(assignment_id = %request.assignment_id, "location updated");
    Ok(location_point)
}

/// Most recent ping for the assignment, if any exist.
pub fn latest(state: &AppState, assignment_id: Uuid) -> Result<Option<LocationPoint>, AppError> {
    ensure_assignment_exists(state, assignment_id)?;
    Ok(latest_point(state, assignment_id))
}

/// Full ping history, newest first.
pub fn history(state: &AppState, assignment_id: Uuid) -> Result<Vec<LocationPoint>, AppError> {
    ensure_assignment_exists(state, assignment_id)?;

    let mut points = state
        .tracking
        .get(&assignment_id)
        .map(|entry| entry.clone())
        .unwrap_or_default();
    points.sort_by(|a, b| b.tracked_at.cmp(&a.tracked_at));
    Ok(points)
}

/// Pings inside the closed window `[from, to]`, oldest first.
pub fn history_in_range(
    state: &AppState,
    assignment_id: Uuid,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<LocationPoint>, AppError> {
    ensure_assignment_exists(state, assignment_id)?;

    let mut points: Vec<LocationPoint> = state
        .tracking
        .get(&assignment_id)
        .map(|entry| {
            entry
                .iter()
                .filter(|point| point.tracked_at >= from && point.tracked_at <= to)
                .cloned()
                .collect()
        })
        .unwrap_or_default();
    points.sort_by_key(|point| point.tracked_at);
    Ok(points)
}

/// Widest recency window callers may ask for, one week in minutes.
const MAX_WINDOW_MINUTES: i64 = 7 * 24 * 60;

/// Caller-supplied minutes become a bounded `Duration`; out-of-range values
/// would otherwise panic inside chrono.
fn recency_window(minutes: i64) -> Result<Duration, AppError> {
    if !(1..=MAX_WINDOW_MINUTES).contains(&minutes) {
        return Err(AppError::Validation(format!(
            "window must be between 1 and {MAX_WINDOW_MINUTES} minutes, got {minutes}"
        )));
    }
    Ok(Duration::minutes(minutes))
}

/// Pings across all of a partner's assignments within the last `minutes`,
/// newest first. Used as a liveness signal for the partner's device.
pub fn recent_by_partner(
    state: &AppState,
    partner_id: Uuid,
    minutes: i64,
) -> Result<Vec<LocationPoint>, AppError> {
    let since = Utc::now() - recency_window(minutes)?;

    let assignment_ids: Vec<Uuid> = state
        .assignments
        .iter()
        .filter(|entry| entry.partner_id == partner_id)
        .map(|entry| entry.id)
        .collect();

    let mut points: Vec<LocationPoint> = assignment_ids
        .iter()
        .filter_map(|id| state.tracking.get(id))
        .flat_map(|entry| {
            entry
                .iter()
                .filter(|point| point.tracked_at >= since)
                .cloned()
                .collect::<Vec<_>>()
        })
        .collect();
    points.sort_by(|a, b| b.tracked_at.cmp(&a.tracked_at));
    Ok(points)
}

/// Latest ping per still-trackable assignment whose battery reading is below
/// the configured threshold.
pub fn low_battery_alerts(state: &AppState) -> Vec<LocationPoint> {
    let threshold = state.config.low_battery_threshold;

    state
        .assignments
        .iter()
        .filter(|entry| entry.status.is_trackable())
        .filter_map(|entry| latest_point(state, entry.id))
        .filter(|point| point.battery_level.is_some_and(|level| level < threshold))
        .collect()
}

pub fn is_tracking_recent(
    state: &AppState,
    assignment_id: Uuid,
    minutes: i64,
) -> Result<bool, AppError> {
    let cutoff = Utc::now() - recency_window(minutes)?;
    Ok(latest_point(state, assignment_id).is_some_and(|point| point.tracked_at > cutoff))
}

pub fn is_partner_moving(state: &AppState, assignment_id: Uuid) -> bool {
    latest_point(state, assignment_id)
        .and_then(|point| point.is_moving)
        .unwrap_or(false)
}

pub fn point_count(state: &AppState, assignment_id: Uuid) -> usize {
    state
        .tracking
        .get(&assignment_id)
        .map(|entry| entry.len())
        .unwrap_or(0)
}

/// Drops pings older than the retention window for assignments delivered
/// before the cutoff. Active assignments keep their full history. Returns
/// the number of removed points; one assignment's trouble never aborts the
/// rest of the batch.
pub fn cleanup_old_tracking(state: &AppState) -> usize {
    let cutoff = Utc::now() - Duration::days(state.config.tracking_retention_days);

    let expired_assignments: Vec<Uuid> = state
        .assignments
        .iter()
        .filter(|entry| {
            entry
                .delivery_completed_at
                .is_some_and(|completed_at| completed_at < cutoff)
        })
        .map(|entry| entry.id)
        .collect();

    let mut removed = 0;
    for assignment_id in expired_assignments {
        let Some(mut points) = state.tracking.get_mut(&assignment_id) else {
            continue;
        };

        let before = points.len();
        points.retain(|point| point.tracked_at >= cutoff);
        let dropped = before - points.len();
        if dropped > 0 {
            removed += dropped;
            debug!(assignment_id = %assignment_id, dropped, "pruned tracking history");
        }
    }

    if removed > 0 {
        info!(removed, "tracking retention cleanup finished");
    }
    removed
}

fn ensure_assignment_exists(state: &AppState, assignment_id: Uuid) -> Result<(), AppError> {
    if state.assignments.contains_key(&assignment_id) {
        Ok(())
    } else {
        Err(AppError::NotFound(format!(
            "assignment {assignment_id} not found"
        )))
    }
}

fn latest_point(state: &AppState, assignment_id: Uuid) -> Option<LocationPoint> {
    state
        .tracking
        .get(&assignment_id)
        .and_then(|entry| entry.iter().max_by_key(|point| point.tracked_at).cloned())
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    use super::*;
    use crate::config::Config;
    use crate::engine::orchestrator::{
        accept_assignment, assign_order, complete_delivery, mark_picked_up, start_delivery,
        AssignOrderRequest,
    };
    use crate::models::assignment::AssignmentType;
    use crate::models::order::{Order, OrderStatus};
    use crate::models::partner::{Partner, VehicleType, VerificationStatus};

    fn seed_assignment(state: &AppState) -> (Uuid, Uuid) {
        let partner = Partner {
            id: Uuid::new_v4(),
            full_name: "track-partner".to_string(),
            phone_number: "+910000000002".to_string(),
            vehicle_type: VehicleType::Bike,
            vehicle_number: "KA00ZZ0000".to_string(),
            verification_status: VerificationStatus::Verified,
            is_online: true,
            is_available: true,
            rating: 4.2,
            total_deliveries: 0,
            successful_deliveries: 0,
            total_earnings: dec!(0),
            max_radius_km: 10.0,
            current_location: None,
            last_location_update: None,
            registered_at: Utc::now(),
        };
        let order = Order {
            id: Uuid::new_v4(),
            order_number: "ORD-TRACK".to_string(),
            status: OrderStatus::Confirmed,
            shop_location: None,
            created_at: Utc::now(),
        };
        let partner_id = partner.id;
        let order_id = order.id;
        state.partners.insert(partner_id, partner);
        state.orders.insert(order_id, order);

        let assignment = assign_order(
            state,
            AssignOrderRequest {
                order_id,
                partner_id: Some(partner_id),
                assigned_by: None,
                assignment_type: AssignmentType::Manual,
                delivery_fee: dec!(60),
                partner_commission: None,
                pickup_location: None,
                delivery_location: None,
            },
        )
        .unwrap();

        (assignment.id, partner_id)
    }

    fn ping(assignment_id: Uuid) -> LocationUpdateRequest {
        LocationUpdateRequest {
            assignment_id,
            latitude: 12.9716,
            longitude: 77.5946,
            accuracy_m: Some(5.0),
            altitude_m: None,
            speed_kmh: Some(18.0),
            heading_deg: Some(90.0),
            tracked_at: None,
            battery_level: Some(80),
            is_moving: Some(true),
            estimated_arrival_time: None,
            distance_to_destination_km: Some(2.4),
        }
    }

    #[test]
    fn ingestion_requires_a_trackable_state() {
        let state = AppState::new(Config::default());
        let (assignment_id, partner_id) = seed_assignment(&state);

        // Still Assigned: not trackable yet.
        let err = update_location(&state, ping(assignment_id));
        assert!(matches!(err, Err(AppError::InvalidStateTransition(_))));

        accept_assignment(&state, assignment_id, partner_id).unwrap();
        update_location(&state, ping(assignment_id)).unwrap();

        mark_picked_up(&state, assignment_id, partner_id).unwrap();
        update_location(&state, ping(assignment_id)).unwrap();

        start_delivery(&state, assignment_id, partner_id).unwrap();
        update_location(&state, ping(assignment_id)).unwrap();

        complete_delivery(&state, assignment_id, partner_id, None).unwrap();
        let err = update_location(&state, ping(assignment_id));
        assert!(matches!(err, Err(AppError::InvalidStateTransition(_))));

        assert_eq!(point_count(&state, assignment_id), 3);
    }

    #[test]
    fn ingestion_refreshes_partner_current_location() {
        let state = AppState::new(Config::default());
        let (assignment_id, partner_id) = seed_assignment(&state);
        accept_assignment(&state, assignment_id, partner_id).unwrap();

        update_location(&state, ping(assignment_id)).unwrap();

        let partner = state.partners.get(&partner_id).unwrap();
        let location = partner.current_location.expect("location denormalized");
        assert!((location.lat - 12.9716).abs() < 1e-9);
        assert!(partner.last_location_update.is_some());
    }

    #[test]
    fn ingestion_rejects_out_of_range_coordinates() {
        let state = AppState::new(Config::default());
        let (assignment_id, partner_id) = seed_assignment(&state);
        accept_assignment(&state, assignment_id, partner_id).unwrap();

        let mut bad = ping(assignment_id);
        bad.latitude = 95.0;
        let err = update_location(&state, bad);
        assert!(matches!(err, Err(AppError::Validation(_))));
    }

    #[test]
    fn history_is_newest_first_and_range_is_oldest_first() {
        let state = AppState::new(Config::default());
        let (assignment_id, partner_id) = seed_assignment(&state);
        accept_assignment(&state, assignment_id, partner_id).unwrap();

        let base = Utc::now();
        for offset in [3, 1, 2] {
            let mut request = ping(assignment_id);
            request.tracked_at = Some(base - Duration::minutes(offset));
            update_location(&state, request).unwrap();
        }

        let newest_first = history(&state, assignment_id).unwrap();
        let stamps: Vec<_> = newest_first.iter().map(|p| p.tracked_at).collect();
        assert!(stamps.windows(2).all(|pair| pair[0] >= pair[1]));

        let ranged = history_in_range(
            &state,
            assignment_id,
            base - Duration::minutes(2),
            base,
        )
        .unwrap();
        assert_eq!(ranged.len(), 2);
        assert!(ranged[0].tracked_at <= ranged[1].tracked_at);
    }

    #[test]
    fn recency_check_uses_latest_point() {
        let state = AppState::new(Config::default());
        let (assignment_id, partner_id) = seed_assignment(&state);
        accept_assignment(&state, assignment_id, partner_id).unwrap();

        assert!(!is_tracking_recent(&state, assignment_id, 5).unwrap());

        let mut old = ping(assignment_id);
        old.tracked_at = Some(Utc::now() - Duration::minutes(30));
        update_location(&state, old).unwrap();
        assert!(!is_tracking_recent(&state, assignment_id, 5).unwrap());

        update_location(&state, ping(assignment_id)).unwrap();
        assert!(is_tracking_recent(&state, assignment_id, 5).unwrap());
        assert!(is_partner_moving(&state, assignment_id));
    }

    #[test]
    fn low_battery_scan_skips_healthy_and_terminal_assignments() {
        let state = AppState::new(Config::default());
        let (low_id, low_partner) = seed_assignment(&state);
        accept_assignment(&state, low_id, low_partner).unwrap();
        let mut request = ping(low_id);
        request.battery_level = Some(10);
        update_location(&state, request).unwrap();

        let (healthy_id, healthy_partner) = seed_assignment(&state);
        accept_assignment(&state, healthy_id, healthy_partner).unwrap();
        update_location(&state, ping(healthy_id)).unwrap();

        let alerts = low_battery_alerts(&state);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].assignment_id, low_id);

        // Once the delivery finishes, the stale low reading stops alerting.
        mark_picked_up(&state, low_id, low_partner).unwrap();
        start_delivery(&state, low_id, low_partner).unwrap();
        complete_delivery(&state, low_id, low_partner, None).unwrap();
        assert!(low_battery_alerts(&state).is_empty());
    }

    #[test]
    fn retention_prunes_only_old_points_of_delivered_assignments() {
        let state = AppState::new(Config::default());
        let (done_id, done_partner) = seed_assignment(&state);
        accept_assignment(&state, done_id, done_partner).unwrap();

        let mut old = ping(done_id);
        old.tracked_at = Some(Utc::now() - Duration::days(45));
        update_location(&state, old).unwrap();
        update_location(&state, ping(done_id)).unwrap();

        mark_picked_up(&state, done_id, done_partner).unwrap();
        start_delivery(&state, done_id, done_partner).unwrap();
        complete_delivery(&state, done_id, done_partner, None).unwrap();
        // Delivered long enough ago to fall past the retention cutoff.
        state
            .assignments
            .get_mut(&done_id)
            .unwrap()
            .delivery_completed_at = Some(Utc::now() - Duration::days(40));

        let (active_id, active_partner) = seed_assignment(&state);
        accept_assignment(&state, active_id, active_partner).unwrap();
        let mut active_old = ping(active_id);
        active_old.tracked_at = Some(Utc::now() - Duration::days(45));
        update_location(&state, active_old).unwrap();

        assert_eq!(cleanup_old_tracking(&state), 1);
        assert_eq!(point_count(&state, done_id), 1);
        // Active assignment keeps its history regardless of age.
        assert_eq!(point_count(&state, active_id), 1);
        // Re-running removes nothing further.
        assert_eq!(cleanup_old_tracking(&state), 0);
    }

    #[test]
    fn recent_by_partner_spans_assignments_within_window() {
        let state = AppState::new(Config::default());
        let (assignment_id, partner_id) = seed_assignment(&state);
        accept_assignment(&state, assignment_id, partner_id).unwrap();

        let mut stale = ping(assignment_id);
        stale.tracked_at = Some(Utc::now() - Duration::minutes(90));
        update_location(&state, stale).unwrap();
        update_location(&state, ping(assignment_id)).unwrap();

        let recent = recent_by_partner(&state, partner_id, 30).unwrap();
        assert_eq!(recent.len(), 1);
    }

    #[test]
    fn recency_window_rejects_out_of_range_minutes() {
        let state = AppState::new(Config::default());
        let (assignment_id, partner_id) = seed_assignment(&state);
        accept_assignment(&state, assignment_id, partner_id).unwrap();
        update_location(&state, ping(assignment_id)).unwrap();

        for minutes in [0, -5, i64::MAX] {
            let err = recent_by_partner(&state, partner_id, minutes);
            assert!(matches!(err, Err(AppError::Validation(_))));
            let err = is_tracking_recent(&state, assignment_id, minutes);
            assert!(matches!(err, Err(AppError::Validation(_))));
        }

        assert!(is_tracking_recent(&state, assignment_id, MAX_WINDOW_MINUTES).unwrap());
    }
}
