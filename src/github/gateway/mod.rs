//! Gateways for sending GraphQL queries to GitHub.
//!
//! The trait-based design lets the pagination engine be driven by mocks in
//! tests while the `reqwest` implementation handles real HTTP requests.

mod client;
mod error_mapping;
mod graphql;

pub use graphql::{DEFAULT_REQUEST_TIMEOUT, ReqwestGraphQlGateway};

use async_trait::async_trait;

use crate::github::error::WatchError;
use crate::github::graphql::{GraphQlRequest, GraphQlResponse};

/// Gateway that can execute one GraphQL request.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GraphQlGateway: Send + Sync {
    /// Send the request and return the decoded response envelope.
    ///
    /// Query-level errors are returned inside the envelope; only transport
    /// and HTTP failures surface as `Err`.
    async fn execute(&self, request: &GraphQlRequest) -> Result<GraphQlResponse, WatchError>;
}
