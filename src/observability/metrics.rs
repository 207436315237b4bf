use prometheus::{
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub transitions_total: IntCounterVec,
    pub active_assignments: IntGauge,
    pub location_points_total: IntCounter,
    pub expired_assignments_total: IntCounter,
    pub assignment_latency_seconds: HistogramVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let transitions_total = IntCounterVec::new(
            Opts::new(
                "assignment_transitions_total",
                "Assignment lifecycle transitions by action and outcome",
            ),
            &["action", "outcome"],
        )
        .expect("valid transitions_total metric");

        let active_assignments = IntGauge::new(
            "active_assignments",
            "Assignments currently in a non-terminal status",
        )
        .expect("valid active_assignments metric");

        let location_points_total = IntCounter::new(
            "location_points_total",
            "GPS points ingested across all assignments",
        )
        .expect("valid location_points_total metric");

        let expired_assignments_total = IntCounter::new(
            "expired_assignments_total",
            "Assignments cancelled by the expiry sweep",
        )
        .expect("valid expired_assignments_total metric");

        let assignment_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "assignment_latency_seconds",
                "Latency of order assignment in seconds",
            ),
            &["outcome"],
        )
        .expect("valid assignment_latency_seconds metric");

        registry
            .register(Box::new(transitions_total.clone()))
            .expect("register transitions_total");
        registry
            .register(Box::new(active_assignments.clone()))
            .expect("register active_assignments");
        registry
            .register(Box::new(location_points_total.clone()))
            .expect("register location_points_total");
        registry
            .register(Box::new(expired_assignments_total.clone()))
            .expect("register expired_assignments_total");
        registry
            .register(Box::new(assignment_latency_seconds.clone()))
            .expect("register assignment_latency_seconds");

        Self {
            registry,
            transitions_total,
            active_assignments,
            location_points_total,
            expired_assignments_total,
            assignment_latency_seconds,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
