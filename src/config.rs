use std::env;
use std::time::Duration;

use crate::services::lifecycle::LifecycleSettings;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub host: String,
    pub port: u16,
    pub app_base_url: String,
    pub qr_service_url: String,
    pub qr_timeout_secs: u64,
    pub fcm_api_key: Option<String>,
    // Reconciliation loops (local hour of day)
    pub price_recompute_hour: u32,
    pub reminder_hour: u32,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let config = Self {
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".into())
                .parse()?,
            app_base_url: env::var("APP_BASE_URL")
                .unwrap_or_else(|_| "http://localhost".into()),
            qr_service_url: env::var("QR_SERVICE_URL")
                .unwrap_or_else(|_| "https://api.qrserver.com/v1/create-qr-code/".into()),
            qr_timeout_secs: env::var("QR_TIMEOUT_SECS")
                .unwrap_or_else(|_| "10".into())
                .parse()?,
            fcm_api_key: env::var("FCM_API_KEY").ok().filter(|s| !s.is_empty()),
            price_recompute_hour: env::var("PRICE_RECOMPUTE_HOUR")
                .unwrap_or_else(|_| "2".into())
                .parse()?,
            reminder_hour: env::var("REMINDER_HOUR")
                .unwrap_or_else(|_| "9".into())
                .parse()?,
        };

        anyhow::ensure!(config.price_recompute_hour < 24, "PRICE_RECOMPUTE_HOUR must be 0-23");
        anyhow::ensure!(config.reminder_hour < 24, "REMINDER_HOUR must be 0-23");
        Ok(config)
    }

    /// The slice of configuration the lifecycle orchestrator needs.
    pub fn lifecycle_settings(&self) -> LifecycleSettings {
        LifecycleSettings {
            app_base_url: self.app_base_url.trim_end_matches('/').to_string(),
            qr_timeout: Duration::from_secs(self.qr_timeout_secs),
        }
    }
}

fn required(key: &str) -> anyhow::Result<String> {
    env::var(key).map_err(|_| anyhow::anyhow!("Missing required env var: {}", key))
}
