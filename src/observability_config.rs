//! Environment-driven settings for tracing, metrics and trace export.

use std::env;

/// Knobs for the observability stack, read once at startup
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// Deployment environment (development, staging, production)
    pub environment: String,
    /// OTLP collector endpoint; traces stay local when unset
    pub otlp_endpoint: Option<String>,
    /// Port the Prometheus/health server listens on
    pub metrics_port: u16,
    /// Log level applied to this crate's tracing directives
    pub log_level: String,
    /// Sample a ratio of traces instead of all of them
    pub enable_trace_sampling: bool,
    /// Ratio of traces kept when sampling (0.0-1.0)
    pub trace_sampling_ratio: f64,
    /// Whether the Prometheus recorder is installed at all
    pub enable_metrics_export: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            otlp_endpoint: None,
            metrics_port: 9090,
            log_level: "info".to_string(),
            enable_trace_sampling: false,
            trace_sampling_ratio: 1.0,
            enable_metrics_export: true,
        }
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

impl ObservabilityConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            environment: env::var("ENVIRONMENT").unwrap_or(defaults.environment),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok(),
            metrics_port: env_or("METRICS_PORT", defaults.metrics_port),
            log_level: env::var("OBSERVABILITY_LOG_LEVEL").unwrap_or(defaults.log_level),
            enable_trace_sampling: env_or(
                "ENABLE_TRACE_SAMPLING",
                defaults.enable_trace_sampling,
            ),
            trace_sampling_ratio: env_or("TRACE_SAMPLING_RATIO", defaults.trace_sampling_ratio),
            enable_metrics_export: env_or(
                "ENABLE_METRICS_EXPORT",
                defaults.enable_metrics_export,
            ),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    pub fn validate(&self) -> Result<(), String> {
        if let Some(endpoint) = &self.otlp_endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(format!("Invalid OTLP endpoint format: {endpoint}"));
            }
        }

        if !(0.0..=1.0).contains(&self.trace_sampling_ratio) {
            return Err(format!(
                "Invalid trace sampling ratio: {}",
                self.trace_sampling_ratio
            ));
        }

        if self.metrics_port == 0 {
            return Err(format!("Invalid metrics port: {}", self.metrics_port));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ObservabilityConfig::default();
        assert_eq!(config.environment, "development");
        assert_eq!(config.metrics_port, 9090);
        assert_eq!(config.log_level, "info");
        assert!(!config.enable_trace_sampling);
        assert!(config.enable_metrics_export);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let bad_endpoint = ObservabilityConfig {
            otlp_endpoint: Some("collector:4317".to_string()),
            ..Default::default()
        };
        assert!(bad_endpoint.validate().is_err());

        let bad_ratio = ObservabilityConfig {
            trace_sampling_ratio: 1.5,
            ..Default::default()
        };
        assert!(bad_ratio.validate().is_err());

        let bad_port = ObservabilityConfig {
            metrics_port: 0,
            ..Default::default()
        };
        assert!(bad_port.validate().is_err());
    }

    #[test]
    fn test_environment_detection() {
        let config = ObservabilityConfig {
            environment: "production".to_string(),
            ..Default::default()
        };
        assert!(config.is_production());
        assert!(!config.is_development());
    }
}
