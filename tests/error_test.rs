use std::time::Duration;

use huginn::{HuginnError, Result};

#[test]
fn test_error_display() {
    let err = HuginnError::FunctionNotFound("student-analysis".to_string());
    assert!(err.to_string().contains("student-analysis"));

    let err = HuginnError::Timeout(Duration::from_secs(30));
    assert!(err.to_string().contains("30s"));
}

#[test]
fn test_result_alias() {
    fn returns_error() -> Result<()> {
        Err(HuginnError::NoEndpoint)
    }
    assert!(returns_error().is_err());
}

#[test]
fn json_errors_convert() {
    let err: HuginnError = serde_json::from_str::<serde_json::Value>("{")
        .unwrap_err()
        .into();
    assert!(matches!(err, HuginnError::Json(_)));
    assert!(!err.is_transient());
}

// ============================================================================
// Transient error classification
// ============================================================================

#[test]
fn transient_errors() {
    assert!(HuginnError::RateLimited { retry_after: None }.is_transient());
    assert!(HuginnError::Http("connection reset".into()).is_transient());
    assert!(HuginnError::Timeout(Duration::from_secs(30)).is_transient());
    for status in [408, 429, 500, 502, 503, 504] {
        assert!(
            HuginnError::Api {
                status,
                message: "try again".into()
            }
            .is_transient(),
            "status {status} should be transient"
        );
    }
}

#[test]
fn permanent_errors() {
    assert!(!HuginnError::AuthenticationFailed.is_transient());
    assert!(!HuginnError::FunctionNotFound("x".into()).is_transient());
    assert!(!HuginnError::InvalidInput("x".into()).is_transient());
    assert!(!HuginnError::EmptyResponse.is_transient());
    assert!(!HuginnError::NoEndpoint.is_transient());
    assert!(!HuginnError::Configuration("x".into()).is_transient());
    assert!(!HuginnError::QueueClosed.is_transient());
    for status in [400, 404, 409, 422] {
        assert!(
            !HuginnError::Api {
                status,
                message: "nope".into()
            }
            .is_transient(),
            "status {status} should be permanent"
        );
    }
}

#[test]
fn retry_after_only_from_rate_limits() {
    let limited = HuginnError::RateLimited {
        retry_after: Some(Duration::from_secs(3)),
    };
    assert_eq!(limited.retry_after(), Some(Duration::from_secs(3)));
    assert_eq!(HuginnError::Http("x".into()).retry_after(), None);
}
