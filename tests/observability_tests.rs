//! Tests for the observability surface: metrics recording, span creation
//! and configuration validation. None of these need a running collector.

use nutrilog::{observability, observability_config::ObservabilityConfig};
use std::time::Duration;

/// The public observability functions exist with their expected signatures
#[test]
fn test_observability_functions_exist() {
    let _init = observability::init_observability_with_health_checks;
    let _init_with_config = observability::init_observability_with_health_checks_and_config;
    let _system_metrics = observability::start_system_metrics_recorder;

    let _analysis_span = observability::analysis_span;
    let _db_span = observability::db_span;
    let _telegram_span = observability::telegram_span;

    let _record_analysis = observability::record_analysis_metrics;
    let _record_db = observability::record_db_metrics;
    let _record_request = observability::record_request_metrics;
    let _record_telegram = observability::record_telegram_message;
    let _record_payment = observability::record_payment_event;
    let _update_circuit_breaker = observability::update_circuit_breaker_state;
}

/// Metrics recording is safe to call without an initialized exporter
#[test]
fn test_metrics_recording() {
    observability::record_telegram_message("text");
    observability::record_analysis_metrics("photo", true, Duration::from_secs(1));
    observability::record_db_metrics("insert_meal", Duration::from_millis(50));
    observability::record_request_metrics("telegram_message", 200, Duration::from_millis(25));
    observability::record_payment_event("succeeded");
    observability::update_circuit_breaker_state(false);
}

#[test]
fn test_span_creation() {
    let _analysis_span = observability::analysis_span("analyze_photo");
    let _db_span = observability::db_span("select", "meals");
    let _telegram_span = observability::telegram_span("message_handler", Some(12345));
    let _anonymous_span = observability::telegram_span("callback_handler", None);
}

#[test]
fn test_default_config_is_valid() {
    let config = ObservabilityConfig::default();
    assert!(config.validate().is_ok());
    assert!(config.is_development());
    assert!(!config.is_production());
}

#[test]
fn test_config_rejects_bad_sampling_ratio() {
    let config = ObservabilityConfig {
        trace_sampling_ratio: 1.5,
        ..ObservabilityConfig::default()
    };
    assert!(config.validate().is_err());
}

#[test]
fn test_config_rejects_bare_otlp_endpoint() {
    let config = ObservabilityConfig {
        otlp_endpoint: Some("localhost:4317".to_string()),
        ..ObservabilityConfig::default()
    };
    assert!(config.validate().is_err());
}

#[test]
fn test_config_rejects_zero_metrics_port() {
    let config = ObservabilityConfig {
        metrics_port: 0,
        ..ObservabilityConfig::default()
    };
    assert!(config.validate().is_err());
}
