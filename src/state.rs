use dashmap::DashMap;
use uuid::Uuid;

use crate::config::Config;
use crate::models::assignment::Assignment;
use crate::models::earning::{Earning, Settlement};
use crate::models::order::Order;
use crate::models::partner::Partner;
use crate::models::tracking::LocationPoint;
use crate::observability::metrics::Metrics;

/// Shared in-memory stores. Per-entry locks on the maps serialize state
/// transitions; `active_by_order` is the uniqueness constraint that keeps
/// at most one non-terminal assignment per order.
pub struct AppState {
    pub config: Config,
    pub partners: DashMap<Uuid, Partner>,
    pub orders: DashMap<Uuid, Order>,
    pub assignments: DashMap<Uuid, Assignment>,
    pub active_by_order: DashMap<Uuid, Uuid>,
    pub earnings: DashMap<Uuid, Earning>,
    pub settlements: DashMap<Uuid, Settlement>,
    pub tracking: DashMap<Uuid, Vec<LocationPoint>>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            partners: DashMap::new(),
            orders: DashMap::new(),
            assignments: DashMap::new(),
            active_by_order: DashMap::new(),
            earnings: DashMap::new(),
            settlements: DashMap::new(),
            tracking: DashMap::new(),
            metrics: Metrics::new(),
        }
    }
}
