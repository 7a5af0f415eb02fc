//! GitHub GraphQL plumbing for the label watcher.
//!
//! This module holds the request and response envelopes, the cost budget
//! reported by GitHub, connection pagination primitives, and the gateway that
//! posts queries over HTTPS. Transport failures are mapped into [`WatchError`]
//! variants so that the pagination engine can tell a retryable gateway
//! timeout from a rejected token.

pub mod error;
pub mod gateway;
pub mod graphql;
pub mod locator;
pub mod pagination;
pub mod rate_limit;

pub use error::WatchError;
pub use gateway::{DEFAULT_REQUEST_TIMEOUT, GraphQlGateway, ReqwestGraphQlGateway};
pub use graphql::{GraphQlError, GraphQlRequest, GraphQlResponse};
pub use locator::{PersonalAccessToken, RepositoryLocator, RepositoryName, RepositoryOwner};
pub use pagination::{PageInfo, PageSize};
pub use rate_limit::RateLimitBudget;

#[cfg(test)]
pub use gateway::MockGraphQlGateway;
