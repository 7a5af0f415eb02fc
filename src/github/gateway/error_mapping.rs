//! Error mapping helpers for the GraphQL gateway implementation.

use reqwest::StatusCode;

use crate::github::error::WatchError;

/// Checks if a GitHub error status indicates an authentication failure.
pub(super) const fn is_auth_failure(status: StatusCode) -> bool {
    matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
}

/// Checks if a status belongs to the gateway/timeout class that GitHub
/// returns when a query is too expensive to finish in time.
pub(super) const fn is_transient_status(status: StatusCode) -> bool {
    matches!(status, StatusCode::BAD_GATEWAY | StatusCode::GATEWAY_TIMEOUT)
}

pub(super) fn map_transport_error(operation: &str, error: &reqwest::Error) -> WatchError {
    if error.is_timeout() {
        return WatchError::Transient {
            status: 0,
            message: format!("{operation} timed out: {error}"),
        };
    }

    if let Some(status) = error.status() {
        return map_http_error(operation, status, None);
    }

    WatchError::Network {
        message: format!("{operation} failed: {error}"),
    }
}

pub(super) fn map_http_error(
    operation: &str,
    status: StatusCode,
    maybe_message: Option<String>,
) -> WatchError {
    let message = maybe_message.unwrap_or_else(|| "unknown error".to_owned());
    if is_transient_status(status) {
        WatchError::Transient {
            status: status.as_u16(),
            message: format!("{operation} failed with status {status}: {message}"),
        }
    } else if is_auth_failure(status) {
        WatchError::Authentication {
            message: format!("{operation} failed: GitHub returned {status} {message}"),
        }
    } else {
        WatchError::Api {
            message: format!("{operation} failed with status {status}: {message}"),
        }
    }
}

pub(super) fn extract_github_message(body: &str) -> Option<String> {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return None;
    };
    value
        .get("message")
        .and_then(serde_json::Value::as_str)
        .map(ToOwned::to_owned)
}
