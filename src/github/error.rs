//! Error types exposed by the GitHub watch layer.

use thiserror::Error;

/// Errors surfaced while configuring the watcher or talking to GitHub.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WatchError {
    /// The authentication token was missing.
    #[error("personal access token is required")]
    MissingToken,

    /// A URL could not be parsed.
    #[error("URL is invalid: {0}")]
    InvalidUrl(String),

    /// Configuration could not be loaded or is inconsistent.
    #[error("configuration error: {message}")]
    Configuration {
        /// Details about the configuration failure.
        message: String,
    },

    /// The authentication token was rejected by GitHub.
    #[error("GitHub rejected the token: {message}")]
    Authentication {
        /// GitHub error message returned with the 401/403 response.
        message: String,
    },

    /// GitHub answered with a gateway or timeout class failure that is
    /// worth retrying with a smaller request.
    #[error("GitHub request timed out ({status}): {message}")]
    Transient {
        /// HTTP status code, or `0` when the client itself timed out.
        status: u16,
        /// Failure detail.
        message: String,
    },

    /// GitHub returned a non-success status that is not retried.
    #[error("GitHub API error: {message}")]
    Api {
        /// Response body from GitHub describing the failure.
        message: String,
    },

    /// Networking failed while calling GitHub.
    #[error("network error talking to GitHub: {message}")]
    Network {
        /// Transport-level error detail.
        message: String,
    },

    /// A response body did not have the expected shape.
    #[error("unexpected GitHub response: {message}")]
    Decode {
        /// What could not be decoded.
        message: String,
    },

    /// The GraphQL endpoint reported errors for the query.
    #[error("GitHub reported {count} query error(s): {joined}", count = .messages.len(), joined = .messages.join("; "))]
    Query {
        /// Messages of every reported error.
        messages: Vec<String>,
    },

    /// Pagination stopped making progress while streams still claimed more
    /// pages.
    #[error("pagination stalled after {iterations} request(s) with {open_streams} open stream(s)")]
    Stalled {
        /// Number of data requests completed before the stall.
        iterations: u32,
        /// Streams still reporting further pages.
        open_streams: usize,
    },

    /// Local I/O operation failed.
    #[error("I/O error: {message}")]
    Io {
        /// Error detail from the underlying I/O operation.
        message: String,
    },
}

impl WatchError {
    /// Returns true for the gateway/timeout class of failures that the
    /// pagination engine recovers from by shrinking the page size.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}
