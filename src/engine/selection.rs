use std::collections::HashSet;

use uuid::Uuid;

use crate::geo::haversine_km;
use crate::models::partner::{GeoPoint, Partner};
use crate::state::AppState;

/// Partners eligible for a new assignment, best candidate first.
///
/// With pickup coordinates the pool is narrowed to verified, online and
/// available partners within radius of the pickup that hold no active
/// assignment, ranked by rating and then success rate. Without coordinates
/// the same liveness filters apply but the pool is left unranked.
pub fn find_candidates(state: &AppState, pickup: Option<GeoPoint>) -> Vec<Partner> {
    let busy = busy_partner_ids(state);

    let mut candidates: Vec<Partner> = state
        .partners
        .iter()
        .filter_map(|entry| {
            let partner = entry.value();
            if !partner.can_take_orders() || busy.contains(&partner.id) {
                return None;
            }

            if let Some(pickup) = pickup {
                // Partners without a known location cannot satisfy the
                // radius predicate.
                let location = partner.current_location?;
                let radius = partner.max_radius_km.min(state.config.service_radius_km);
                if haversine_km(&location, &pickup) > radius {
                    return None;
                }
            }

            Some(partner.clone())
        })
        .collect();

    if pickup.is_some() {
        candidates.sort_by(|a, b| {
            b.rating
                .total_cmp(&a.rating)
                .then(b.success_rate().total_cmp(&a.success_rate()))
        });
    }

    candidates
}

fn busy_partner_ids(state: &AppState) -> HashSet<Uuid> {
    state
        .active_by_order
        .iter()
        .filter_map(|entry| {
            state
                .assignments
                .get(entry.value())
                .map(|assignment| assignment.partner_id)
        })
        .collect()
}
