//! HTTP client construction helpers for gateway implementations.

use std::time::Duration;

use reqwest::Client;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};

use crate::github::error::WatchError;
use crate::github::locator::PersonalAccessToken;

/// User agent sent with every request.
pub(super) const USER_AGENT: &str = concat!("label-watcher/", env!("CARGO_PKG_VERSION"));

/// Builds a `reqwest` client that authenticates every request with `token`.
///
/// # Errors
///
/// Returns `WatchError::Configuration` when the token is not a valid header
/// value or the client cannot be constructed.
pub(super) fn build_http_client(
    token: &PersonalAccessToken,
    timeout: Duration,
) -> Result<Client, WatchError> {
    let mut authorization = HeaderValue::from_str(&format!("bearer {}", token.value()))
        .map_err(|error| WatchError::Configuration {
            message: format!("token is not a valid header value: {error}"),
        })?;
    authorization.set_sensitive(true);

    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, authorization);
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

    Client::builder()
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .timeout(timeout)
        .build()
        .map_err(|error| WatchError::Configuration {
            message: format!("failed to configure GitHub HTTP client: {error}"),
        })
}
