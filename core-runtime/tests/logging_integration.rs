//! Integration tests for logging system

use bridge_traits::time::LogLevel;
use core_runtime::logging::{init_logging, redact_if_sensitive, strip_path, LogFormat, LoggingConfig};

#[test]
fn test_logging_initializes_once() {
    // A subscriber can only be installed once per process
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Debug);

    init_logging(config.clone()).unwrap();
    tracing::info!(target: "core_cache", entries = 3, "Logging initialized");

    assert!(init_logging(config).is_err());
}

#[test]
fn test_invalid_filter_is_rejected_before_install() {
    let config = LoggingConfig::default().with_filter("core_cache=notalevel");
    let err = init_logging(config).unwrap_err();
    assert!(err.to_string().contains("Invalid log filter"));
}

#[test]
fn test_header_redaction() {
    let headers = [
        ("Authorization", "Bearer abc.def"),
        ("X-Refresh-Token", "r-123"),
        ("Accept", "application/json"),
    ];

    let redacted: Vec<String> = headers
        .iter()
        .map(|(name, value)| redact_if_sensitive(name, value))
        .collect();

    assert_eq!(redacted[0], "[REDACTED]");
    assert_eq!(redacted[1], "[REDACTED]");
    assert_eq!(redacted[2], "application/json");
}

#[test]
fn test_path_stripping() {
    assert_eq!(strip_path("/var/cache/offline-core/images/ff00.png"), "ff00.png");
    assert_eq!(strip_path("D:\\cache\\images\\ff00.gif"), "ff00.gif");
    assert_eq!(strip_path(""), "");
}

#[test]
fn test_format_selection() {
    #[cfg(debug_assertions)]
    assert_eq!(LoggingConfig::default().format, LogFormat::Pretty);

    #[cfg(not(debug_assertions))]
    assert_eq!(LoggingConfig::default().format, LogFormat::Json);
}
