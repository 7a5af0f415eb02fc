//! Request and response envelopes for the GitHub GraphQL endpoint.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::WatchError;
use super::rate_limit::RateLimitBudget;

/// One POST body: the query document and its variables.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphQlRequest {
    /// Rendered query document.
    pub query: String,
    /// Variable values keyed by name, without the `$` sigil.
    pub variables: Map<String, Value>,
}

impl GraphQlRequest {
    /// Creates a request from a rendered query and its variables.
    #[must_use]
    pub const fn new(query: String, variables: Map<String, Value>) -> Self {
        Self { query, variables }
    }

    /// Returns true when the request only asks GitHub for its cost.
    #[must_use]
    pub fn is_dry_run(&self) -> bool {
        self.variables.get("dryRun").and_then(Value::as_bool) == Some(true)
    }
}

/// GraphQL response envelope.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GraphQlResponse {
    /// Response data keyed by the aliases chosen in the query.
    #[serde(default)]
    pub data: Option<Value>,
    /// Errors reported for the query.
    #[serde(default)]
    pub errors: Vec<GraphQlError>,
}

impl GraphQlResponse {
    /// Builds a successful response around `data`.
    #[must_use]
    pub const fn with_data(data: Value) -> Self {
        Self {
            data: Some(data),
            errors: Vec::new(),
        }
    }

    /// Returns the response data or the reported errors.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Query`] when GitHub reported errors and
    /// [`WatchError::Decode`] when the response carries no data.
    pub fn into_data(self) -> Result<Value, WatchError> {
        if !self.errors.is_empty() {
            return Err(WatchError::Query {
                messages: self.errors.iter().map(GraphQlError::summary).collect(),
            });
        }
        self.data.ok_or_else(|| WatchError::Decode {
            message: "response has neither data nor errors".to_owned(),
        })
    }
}

/// Reads the `rateLimit` field from response data.
///
/// # Errors
///
/// Returns [`WatchError::Decode`] when the field is missing or malformed.
pub fn rate_limit_of(data: &Value) -> Result<RateLimitBudget, WatchError> {
    let field = data.get("rateLimit").ok_or_else(|| WatchError::Decode {
        message: "response is missing the rateLimit field".to_owned(),
    })?;
    RateLimitBudget::deserialize(field).map_err(|error| WatchError::Decode {
        message: format!("rateLimit field is malformed: {error}"),
    })
}

/// A single error reported by the GraphQL endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphQlError {
    /// Human readable message.
    pub message: String,
    /// Error classification such as `NOT_FOUND`.
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    /// Response path the error belongs to.
    #[serde(default)]
    pub path: Vec<Value>,
    /// Query locations the error refers to.
    #[serde(default)]
    pub locations: Vec<Value>,
}

impl GraphQlError {
    /// One-line rendering including the classification and path.
    #[must_use]
    pub fn summary(&self) -> String {
        let path = self
            .path
            .iter()
            .map(|segment| {
                segment
                    .as_str()
                    .map_or_else(|| segment.to_string(), ToOwned::to_owned)
            })
            .collect::<Vec<_>>()
            .join(".");
        match (&self.kind, path.is_empty()) {
            (Some(kind), false) => format!("{kind} at {path}: {}", self.message),
            (Some(kind), true) => format!("{kind}: {}", self.message),
            (None, false) => format!("at {path}: {}", self.message),
            (None, true) => self.message.clone(),
        }
    }
}
