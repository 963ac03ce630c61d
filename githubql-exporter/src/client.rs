//! GitHub GraphQL client.

use std::time::{Duration, Instant};

use serde_json::json;
use tracing::{debug, trace};

use crate::config::GithubConfig;
use crate::query::{
    GraphQlResponse, OrganizationQuery, QueryError, QueryExecutor, organization_query,
};

/// Query executor backed by the GitHub GraphQL API over HTTPS.
pub struct GithubClient {
    http: reqwest::Client,
    endpoint: String,
    token: String,
    timeout: Duration,
    query: String,
}

impl GithubClient {
    /// Create a new client from configuration.
    pub fn new(config: &GithubConfig) -> Result<Self, QueryError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("githubql-exporter/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            token: config.token.clone(),
            timeout: config.timeout(),
            query: organization_query(),
        })
    }

    async fn execute(&self, login: &str) -> Result<OrganizationQuery, QueryError> {
        let body = json!({
            "query": self.query,
            "variables": { "organization": login },
        });

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(QueryError::Status { status, body: text });
        }

        trace!(organization = %login, bytes = text.len(), "Received GraphQL response");

        let envelope: GraphQlResponse = serde_json::from_str(&text)?;
        envelope.into_result(login)
    }
}

impl QueryExecutor for GithubClient {
    async fn query_organization(&self, login: &str) -> Result<OrganizationQuery, QueryError> {
        let started = Instant::now();

        let result = tokio::time::timeout(self.timeout, self.execute(login))
            .await
            .map_err(|_| QueryError::Timeout(self.timeout))??;

        debug!(
            organization = %login,
            repositories = result.organization.repositories.nodes.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Organization query completed"
        );

        Ok(result)
    }
}
