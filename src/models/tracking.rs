use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One GPS ping for an assignment. Rows are immutable once appended; the
/// retention job is the only thing that ever removes them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationPoint {
    pub id: Uuid,
    pub assignment_id: Uuid,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy_m: Option<f64>,
    pub altitude_m: Option<f64>,
    pub speed_kmh: Option<f64>,
    pub heading_deg: Option<f64>,
    pub tracked_at: DateTime<Utc>,
    pub battery_level: Option<u8>,
    pub is_moving: Option<bool>,
    pub estimated_arrival_time: Option<DateTime<Utc>>,
    pub distance_to_destination_km: Option<f64>,
}
