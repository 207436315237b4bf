use std::env;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    /// Minutes an assignment may sit unaccepted before the sweeper cancels it.
    pub assignment_timeout_minutes: i64,
    pub sweep_interval_secs: u64,
    /// Default service radius for the nearby-partner query, in kilometers.
    pub service_radius_km: f64,
    /// Days of GPS history kept for delivered assignments.
    pub tracking_retention_days: i64,
    /// Battery percentage below which a ping counts as a low-battery alert.
    pub low_battery_threshold: u8,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            assignment_timeout_minutes: parse_or_default("ASSIGNMENT_TIMEOUT_MINUTES", 15)?,
            sweep_interval_secs: parse_or_default("SWEEP_INTERVAL_SECS", 60)?,
            service_radius_km: parse_or_default("SERVICE_RADIUS_KM", 10.0)?,
            tracking_retention_days: parse_or_default("TRACKING_RETENTION_DAYS", 30)?,
            low_battery_threshold: parse_or_default("LOW_BATTERY_THRESHOLD", 20)?,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            assignment_timeout_minutes: 15,
            sweep_interval_secs: 60,
            service_radius_km: 10.0,
            tracking_retention_days: 30,
            low_battery_threshold: 20,
        }
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
