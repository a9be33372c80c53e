//! Configuration module for environment variable parsing.
//!
//! Reads all configuration from environment variables with sensible defaults
//! so the server can start without any setup in development.

use std::env;
use tracing::warn;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port for the web server to listen on
    pub port: u16,

    /// Public base URL embedded into invitation verification QR codes
    pub app_url: String,

    /// Root directory for campaign uploads (templates + rendered flyers)
    pub data_dir: String,

    /// Path of the JSON file holding transport session credentials
    pub credentials_path: String,

    /// Country code prefixed to bare 9-digit phone numbers
    pub default_country_code: String,

    /// Humanization delay range in milliseconds before each send (min, max)
    pub compose_delay_ms: (u64, u64),

    /// Hard timeout in milliseconds applied to every transport send
    pub send_timeout_ms: u64,

    /// Optional extra directory scanned for overlay fonts
    pub font_dir: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Config {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),

            app_url: env::var("APP_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),

            data_dir: env::var("DATA_DIR").unwrap_or_else(|_| "uploads".to_string()),

            credentials_path: env::var("CREDENTIALS_PATH")
                .unwrap_or_else(|_| "auth_state.json".to_string()),

            default_country_code: env::var("DEFAULT_COUNTRY_CODE")
                .unwrap_or_else(|_| "237".to_string()),

            compose_delay_ms: parse_range("COMPOSE_DELAY_RANGE_MS", (2000, 5000)),

            send_timeout_ms: env::var("SEND_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60_000),

            font_dir: env::var("FONT_DIR").ok(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 8080,
            app_url: "http://localhost:8080".to_string(),
            data_dir: "uploads".to_string(),
            credentials_path: "auth_state.json".to_string(),
            default_country_code: "237".to_string(),
            compose_delay_ms: (2000, 5000),
            send_timeout_ms: 60_000,
            font_dir: None,
        }
    }
}

/// Parse a comma-separated range like "2000,5000" into a tuple.
fn parse_range(name: &str, default: (u64, u64)) -> (u64, u64) {
    let raw = match env::var(name) {
        Ok(v) => v,
        Err(_) => return default,
    };

    let parts: Vec<&str> = raw.split(',').collect();
    if parts.len() != 2 {
        warn!(env_var = name, value = %raw, "Invalid range format, using default");
        return default;
    }

    let min = parts[0].trim().parse::<u64>();
    let max = parts[1].trim().parse::<u64>();

    match (min, max) {
        (Ok(min), Ok(max)) if min <= max => (min, max),
        _ => {
            warn!(env_var = name, value = %raw, "Invalid range values, using default");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_range_valid() {
        env::set_var("TEST_COMPOSE_RANGE", "1000,3000");
        let result = parse_range("TEST_COMPOSE_RANGE", (0, 0));
        assert_eq!(result, (1000, 3000));
        env::remove_var("TEST_COMPOSE_RANGE");
    }

    #[test]
    fn test_parse_range_default() {
        let result = parse_range("NONEXISTENT_VAR", (2000, 5000));
        assert_eq!(result, (2000, 5000));
    }

    #[test]
    fn test_parse_range_rejects_inverted() {
        env::set_var("TEST_INVERTED_RANGE", "5000,2000");
        let result = parse_range("TEST_INVERTED_RANGE", (10, 20));
        assert_eq!(result, (10, 20));
        env::remove_var("TEST_INVERTED_RANGE");
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.compose_delay_ms, (2000, 5000));
        assert_eq!(config.default_country_code, "237");
    }
}
