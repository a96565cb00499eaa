//! Logging options

/// How a process writes its logs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    pub service_name: String,
    /// Filter directive used when `RUST_LOG` is unset or invalid
    pub log_level: String,
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self::new("lvs-control")
    }
}

impl TelemetryConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            log_level: "info".to_string(),
            json_logs: false,
        }
    }

    /// `LVS_SERVICE_NAME`, `LVS_LOG_LEVEL` and `LVS_JSON_LOGS`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self::from_vars(|key| std::env::var(key).ok(), defaults)
    }

    fn from_vars(lookup: impl Fn(&str) -> Option<String>, defaults: Self) -> Self {
        Self {
            service_name: lookup("LVS_SERVICE_NAME").unwrap_or(defaults.service_name),
            log_level: lookup("LVS_LOG_LEVEL").unwrap_or(defaults.log_level),
            json_logs: lookup("LVS_JSON_LOGS")
                .map(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on"))
                .unwrap_or(defaults.json_logs),
        }
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn with_json_logs(mut self, json_logs: bool) -> Self {
        self.json_logs = json_logs;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_from_vars() {
        let vars: HashMap<&str, &str> = [("LVS_LOG_LEVEL", "lvs_pool=debug"), ("LVS_JSON_LOGS", "Yes")]
            .into_iter()
            .collect();
        let config = TelemetryConfig::from_vars(
            |key| vars.get(key).map(|v| v.to_string()),
            TelemetryConfig::new("lvs-test"),
        );

        assert_eq!(config.service_name, "lvs-test");
        assert_eq!(config.log_level, "lvs_pool=debug");
        assert!(config.json_logs);
    }

    #[test]
    fn test_defaults() {
        let config = TelemetryConfig::default();
        assert_eq!(config.log_level, "info");
        assert!(!config.json_logs);
    }
}
