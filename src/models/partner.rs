use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lng)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum VehicleType {
    Bike,
    Scooter,
    Bicycle,
    Car,
    Auto,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum VerificationStatus {
    Pending,
    Verified,
    Rejected,
}

/// A registered delivery partner. Never hard-deleted; liveness is tracked
/// through the `is_online`/`is_available` pair (available implies online).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Partner {
    pub id: Uuid,
    pub full_name: String,
    pub phone_number: String,
    pub vehicle_type: VehicleType,
    pub vehicle_number: String,
    pub verification_status: VerificationStatus,
    pub is_online: bool,
    pub is_available: bool,
    pub rating: f64,
    pub total_deliveries: u32,
    pub successful_deliveries: u32,
    pub total_earnings: Decimal,
    pub max_radius_km: f64,
    pub current_location: Option<GeoPoint>,
    pub last_location_update: Option<DateTime<Utc>>,
    pub registered_at: DateTime<Utc>,
}

impl Partner {
    pub fn can_take_orders(&self) -> bool {
        self.verification_status == VerificationStatus::Verified
            && self.is_online
            && self.is_available
    }

    /// Fraction of deliveries that completed successfully, 0.0 for a
    /// partner with no delivery history.
    pub fn success_rate(&self) -> f64 {
        if self.total_deliveries == 0 {
            return 0.0;
        }
        self.successful_deliveries as f64 / self.total_deliveries as f64
    }
}
