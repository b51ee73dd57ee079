//! Application configuration loaded from environment variables.

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `DATABASE_URL` — PostgreSQL connection string; the in-memory store is
///   used when absent
/// - `WEBHOOK_SIGNING_SECRET` — shared secret for webhook signatures;
///   webhook deliveries are rejected outright when unset
/// - `WEBHOOK_TOLERANCE_SECS` — replay window for signed deliveries
///   (default: `300`)
/// - `LOW_STOCK_THRESHOLD` — remaining units below which a low-stock alert
///   is raised (default: `5`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub webhook_signing_secret: Option<String>,
    pub webhook_tolerance_secs: i64,
    pub low_stock_threshold: i64,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            database_url: std::env::var("DATABASE_URL").ok(),
            webhook_signing_secret: std::env::var("WEBHOOK_SIGNING_SECRET").ok(),
            webhook_tolerance_secs: std::env::var("WEBHOOK_TOLERANCE_SECS")
                .ok()
                .and_then(|t| t.parse().ok())
                .unwrap_or(300),
            low_stock_threshold: std::env::var("LOW_STOCK_THRESHOLD")
                .ok()
                .and_then(|t| t.parse().ok())
                .unwrap_or(5),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            webhook_signing_secret: None,
            webhook_tolerance_secs: 300,
            low_stock_threshold: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert!(config.database_url.is_none());
        assert!(config.webhook_signing_secret.is_none());
        assert_eq!(config.webhook_tolerance_secs, 300);
        assert_eq!(config.low_stock_threshold, 5);
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_addr_default() {
        let config = Config::default();
        assert_eq!(config.addr(), "0.0.0.0:3000");
    }
}
