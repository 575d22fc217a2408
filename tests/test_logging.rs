//! Tests for logging configuration and format parsing
//!
//! Exercises the public logging surface the binary relies on: format and
//! level parsing from environment strings, and the exported span macros.

use hydroagent::observability::logging::{parse_level, LogFormat};
use tracing::Level;

#[test]
fn test_log_format_parse_known_formats() {
    assert!(matches!(LogFormat::parse("json"), LogFormat::Json));
    assert!(matches!(LogFormat::parse("PRETTY"), LogFormat::Pretty));
    assert!(matches!(LogFormat::parse("Compact"), LogFormat::Compact));
}

#[test]
fn test_log_format_parse_invalid_defaults_to_json() {
    // Anything unrecognized falls back to machine-readable output
    for input in ["invalid", "", "xml", "  json  ", "json\n"] {
        assert!(
            matches!(LogFormat::parse(input), LogFormat::Json),
            "Failed for input: {input:?}"
        );
    }
}

#[test]
fn test_log_level_parsing() {
    let test_cases = [
        ("ERROR", Level::ERROR),
        ("WARN", Level::WARN),
        ("info", Level::INFO),
        ("debug", Level::DEBUG),
        ("Trace", Level::TRACE),
        ("verbose", Level::INFO),
        ("", Level::INFO),
    ];

    for (input, expected) in test_cases {
        assert_eq!(parse_level(input), expected, "Failed for input: {input:?}");
    }
}

#[test]
fn test_exported_span_macros() {
    let iteration = hydroagent::iteration_span!(iteration = 7u64);
    let _entered = iteration.enter();

    let _mqtt = hydroagent::mqtt_span!(operation = "publish", topic = "sensors/water/tank1");
    let _notify = hydroagent::notify_span!(kind = "boot");
    let _lifecycle = hydroagent::lifecycle_span!(event = "shutdown", device = "tank1");
}
