//! `reqwest` implementation of the GraphQL gateway.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use url::Url;

use crate::github::error::WatchError;
use crate::github::graphql::{GraphQlRequest, GraphQlResponse};
use crate::github::locator::{PersonalAccessToken, graphql_endpoint};

use super::GraphQlGateway;
use super::client::build_http_client;
use super::error_mapping::{extract_github_message, map_http_error, map_transport_error};

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Gateway posting GraphQL documents to GitHub over HTTPS.
#[derive(Debug, Clone)]
pub struct ReqwestGraphQlGateway {
    client: Client,
    endpoint: Url,
}

impl ReqwestGraphQlGateway {
    /// Creates a gateway from an HTTP client and an explicit endpoint.
    #[must_use]
    pub const fn new(client: Client, endpoint: Url) -> Self {
        Self { client, endpoint }
    }

    /// Builds a gateway for the given token and REST API base URL.
    ///
    /// # Errors
    ///
    /// Returns `WatchError::InvalidUrl` when the API URL cannot be parsed or
    /// `WatchError::Configuration` when the HTTP client cannot be built.
    pub fn for_token(
        token: &PersonalAccessToken,
        api_url: &str,
        timeout: Duration,
    ) -> Result<Self, WatchError> {
        let endpoint = graphql_endpoint(api_url)?;
        let client = build_http_client(token, timeout)?;
        Ok(Self::new(client, endpoint))
    }

    /// The GraphQL endpoint requests are posted to.
    #[must_use]
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl GraphQlGateway for ReqwestGraphQlGateway {
    async fn execute(&self, request: &GraphQlRequest) -> Result<GraphQlResponse, WatchError> {
        let operation = if request.is_dry_run() {
            "cost probe"
        } else {
            "GraphQL query"
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(request)
            .send()
            .await
            .map_err(|error| map_transport_error(operation, &error))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_http_error(
                operation,
                status,
                extract_github_message(&body),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|error| map_transport_error(operation, &error))?;

        serde_json::from_str(&body).map_err(|error| WatchError::Decode {
            message: format!("{operation} response deserialisation failed: {error}"),
        })
    }
}
