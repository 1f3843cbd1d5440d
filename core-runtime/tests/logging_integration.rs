//! Integration tests for logging initialisation.
//!
//! A global subscriber can only be installed once per process, so everything
//! that touches it lives in a single test.

use core_runtime::logging::{init_logging, LogFormat, LogLevel, LoggingConfig};
use core_runtime::Error;

#[test]
fn test_second_init_is_reported_not_panicking() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Debug)
        .ignore_env();

    init_logging(config.clone()).unwrap();
    tracing::info!(root = "/srv/music", "Logging initialised");

    let second = init_logging(config);
    assert!(matches!(second, Err(Error::Config(_))));
}

#[test]
fn test_bad_filter_is_rejected_before_install() {
    let config = LoggingConfig::default()
        .ignore_env()
        .with_filter("core_playlist=loud");

    assert!(matches!(init_logging(config), Err(Error::Config(_))));
}

#[test]
fn test_format_selection() {
    #[cfg(debug_assertions)]
    assert_eq!(LoggingConfig::default().format, LogFormat::Pretty);

    #[cfg(not(debug_assertions))]
    assert_eq!(LoggingConfig::default().format, LogFormat::Json);
}
