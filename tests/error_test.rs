//! Tests for error types

use trueno_lineage::{Error, TrackedError};

#[test]
fn test_configuration_error() {
    let error = Error::Configuration("split fractions must sum to 1.0".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("Configuration error"));
    assert!(error_str.contains("sum to 1.0"));
}

#[test]
fn test_sync_error_mentions_retry() {
    let error = Error::Sync {
        attempts: 5,
        message: "server error 503: unavailable".to_string(),
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("after 5 attempt(s)"));
    assert!(error_str.contains("503"));
    assert!(error_str.contains("call sync() again"));
}

#[test]
fn test_lineage_cycle_error() {
    let error = Error::LineageCycle {
        from: "dataset:ab12".to_string(),
        to: "transformer:cd34".to_string(),
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("dataset:ab12 -> transformer:cd34"));
}

#[test]
fn test_io_error_conversion() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "cache.parquet");
    let error: Error = io.into();
    assert!(matches!(error, Error::Io(_)));
    assert!(format!("{error}").contains("IO error"));
}

#[test]
fn test_json_error_conversion() {
    let json = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    let error: Error = json.into();
    assert!(matches!(error, Error::Json(_)));
}

#[test]
fn test_infallible_tracked_error_collapses() {
    let tracked: TrackedError<std::convert::Infallible> =
        Error::InvalidState("run r1 is closed".to_string()).into();
    let error: Error = tracked.into();
    assert!(matches!(error, Error::InvalidState(_)));
    assert_eq!(format!("{error}"), "Invalid state: run r1 is closed");
}
