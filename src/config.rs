//! Environment-driven configuration

use crate::error::OrchestrationError;
use crate::forecast::ArimaOrder;
use crate::Result;
use std::env;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://finance.db?mode=rwc";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 6;
pub const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Empty when unset; checked per question, not at startup
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub database_url: String,
    pub port: u16,
    pub max_tool_rounds: usize,
    pub arima_order: ArimaOrder,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            gemini_api_key: String::new(),
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            gemini_base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            database_url: DEFAULT_DATABASE_URL.to_string(),
            port: DEFAULT_PORT,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            arima_order: ArimaOrder::default(),
        }
    }
}

impl AppConfig {
    /// Load from the process environment (call `dotenv::dotenv()` first)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let port = match lookup("PORT").or_else(|| lookup("API_PORT")) {
            Some(raw) => raw.trim().parse::<u16>().map_err(|e| {
                OrchestrationError::ConfigError(format!("PORT '{}' is invalid: {}", raw, e))
            })?,
            None => defaults.port,
        };

        let max_tool_rounds = match lookup("MAX_TOOL_ROUNDS") {
            Some(raw) => {
                let rounds = raw.trim().parse::<usize>().map_err(|e| {
                    OrchestrationError::ConfigError(format!(
                        "MAX_TOOL_ROUNDS '{}' is invalid: {}",
                        raw, e
                    ))
                })?;
                if rounds == 0 {
                    return Err(OrchestrationError::ConfigError(
                        "MAX_TOOL_ROUNDS must be at least 1".to_string(),
                    ));
                }
                rounds
            }
            None => defaults.max_tool_rounds,
        };

        let arima_order = match lookup("ARIMA_ORDER") {
            Some(raw) => raw.parse::<ArimaOrder>()?,
            None => defaults.arima_order,
        };

        Ok(Self {
            gemini_api_key: lookup("GEMINI_API_KEY").unwrap_or_default(),
            gemini_model: lookup("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            gemini_base_url: lookup("GEMINI_BASE_URL").unwrap_or(defaults.gemini_base_url),
            database_url: lookup("DATABASE_URL").unwrap_or(defaults.database_url),
            port,
            max_tool_rounds,
            arima_order,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = AppConfig::from_lookup(lookup_from(&[])).unwrap();
        assert!(config.gemini_api_key.is_empty());
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.max_tool_rounds, DEFAULT_MAX_TOOL_ROUNDS);
        assert_eq!(config.arima_order, ArimaOrder::new(1, 1, 1));
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
    }

    #[test]
    fn test_overrides() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("GEMINI_API_KEY", "secret"),
            ("API_PORT", "9000"),
            ("MAX_TOOL_ROUNDS", "3"),
            ("ARIMA_ORDER", "2,1,0"),
        ]))
        .unwrap();
        assert_eq!(config.gemini_api_key, "secret");
        assert_eq!(config.port, 9000);
        assert_eq!(config.max_tool_rounds, 3);
        assert_eq!(config.arima_order, ArimaOrder::new(2, 1, 0));
    }

    #[test]
    fn test_invalid_values() {
        assert!(AppConfig::from_lookup(lookup_from(&[("PORT", "abc")])).is_err());
        assert!(AppConfig::from_lookup(lookup_from(&[("MAX_TOOL_ROUNDS", "0")])).is_err());
        assert!(AppConfig::from_lookup(lookup_from(&[("ARIMA_ORDER", "1,1")])).is_err());
    }
}
