//! GraphQL query shape and typed result tree for one organization.
//!
//! State-filtered counts (open/closed issues, open/closed/merged pull
//! requests) are requested under explicit field aliases. The alias for each
//! (metric, state) pair is owned by [`IssueState`] and [`PullRequestState`];
//! both the query text and the decoded [`Repository`] accessors go through
//! that table.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

/// Number of repositories requested per organization (single page).
pub const REPOSITORY_PAGE_SIZE: u32 = 100;

/// Errors from executing an organization query.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected HTTP status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Query timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("GraphQL error: {0}")]
    GraphQl(String),

    #[error("Response contained no data")]
    MissingData,

    #[error("Organization not found: {0}")]
    OrganizationNotFound(String),
}

/// Executes the organization query against a GraphQL backend.
pub trait QueryExecutor: Send + Sync {
    /// Run the query for a single organization login.
    ///
    /// Each call is bounded by its own deadline and is never retried.
    fn query_organization(
        &self,
        login: &str,
    ) -> impl Future<Output = Result<OrganizationQuery, QueryError>> + Send;
}

/// Issue states exported as the `state` label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueState {
    Open,
    Closed,
}

impl IssueState {
    /// All states, in emission order.
    pub const ALL: [IssueState; 2] = [IssueState::Open, IssueState::Closed];

    /// Value of the `state` label.
    pub fn label(self) -> &'static str {
        match self {
            IssueState::Open => "open",
            IssueState::Closed => "closed",
        }
    }

    /// Response field alias carrying this state's count.
    pub fn alias(self) -> &'static str {
        match self {
            IssueState::Open => "issuesOpen",
            IssueState::Closed => "issuesClosed",
        }
    }

    fn graphql_enum(self) -> &'static str {
        match self {
            IssueState::Open => "OPEN",
            IssueState::Closed => "CLOSED",
        }
    }
}

/// Pull request states exported as the `state` label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullRequestState {
    Open,
    Closed,
    Merged,
}

impl PullRequestState {
    /// All states, in emission order.
    pub const ALL: [PullRequestState; 3] = [
        PullRequestState::Open,
        PullRequestState::Closed,
        PullRequestState::Merged,
    ];

    /// Value of the `state` label.
    pub fn label(self) -> &'static str {
        match self {
            PullRequestState::Open => "open",
            PullRequestState::Closed => "closed",
            PullRequestState::Merged => "merged",
        }
    }

    /// Response field alias carrying this state's count.
    pub fn alias(self) -> &'static str {
        match self {
            PullRequestState::Open => "pullRequestsOpen",
            PullRequestState::Closed => "pullRequestsClosed",
            PullRequestState::Merged => "pullRequestsMerged",
        }
    }

    fn graphql_enum(self) -> &'static str {
        match self {
            PullRequestState::Open => "OPEN",
            PullRequestState::Closed => "CLOSED",
            PullRequestState::Merged => "MERGED",
        }
    }
}

/// Build the GraphQL document for the organization query.
///
/// Takes a single `$organization: String!` variable.
pub fn organization_query() -> String {
    let mut counts = String::new();
    for state in IssueState::ALL {
        counts.push_str(&format!(
            "        {}: issues(states: {}) {{ totalCount }}\n",
            state.alias(),
            state.graphql_enum()
        ));
    }
    for state in PullRequestState::ALL {
        counts.push_str(&format!(
            "        {}: pullRequests(states: {}) {{ totalCount }}\n",
            state.alias(),
            state.graphql_enum()
        ));
    }

    format!(
        r#"query($organization: String!) {{
  organization(login: $organization) {{
    login
    repositories(first: {page_size}) {{
      nodes {{
        name
        diskUsage
        createdAt
        pushedAt
        stargazers {{ totalCount }}
        watchers {{ totalCount }}
        forks {{ totalCount }}
{counts}      }}
    }}
  }}
  rateLimit {{
    limit
    remaining
    resetAt
  }}
}}
"#,
        page_size = REPOSITORY_PAGE_SIZE,
        counts = counts,
    )
}

/// Result of one organization query.
#[derive(Debug, Clone, PartialEq)]
pub struct OrganizationQuery {
    pub organization: Organization,
    pub rate_limit: RateLimit,
}

/// An organization and its first page of repositories.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Organization {
    pub login: String,
    pub repositories: RepositoryConnection,
}

/// Repository page as returned by the API.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RepositoryConnection {
    #[serde(default)]
    pub nodes: Vec<Repository>,
}

/// `{ totalCount }` selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalCount {
    pub total_count: i64,
}

/// A single repository node.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    pub name: String,
    /// Disk usage in kilobytes.
    pub disk_usage: Option<i64>,
    pub created_at: DateTime<Utc>,
    /// `None` for repositories that were never pushed to.
    pub pushed_at: Option<DateTime<Utc>>,
    pub stargazers: TotalCount,
    pub watchers: TotalCount,
    pub forks: TotalCount,
    #[serde(rename = "issuesOpen")]
    issues_open: TotalCount,
    #[serde(rename = "issuesClosed")]
    issues_closed: TotalCount,
    #[serde(rename = "pullRequestsOpen")]
    pull_requests_open: TotalCount,
    #[serde(rename = "pullRequestsClosed")]
    pull_requests_closed: TotalCount,
    #[serde(rename = "pullRequestsMerged")]
    pull_requests_merged: TotalCount,
}

impl Repository {
    /// Create a repository node with zeroed counters.
    pub fn new(name: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            disk_usage: None,
            created_at,
            pushed_at: None,
            stargazers: TotalCount::default(),
            watchers: TotalCount::default(),
            forks: TotalCount::default(),
            issues_open: TotalCount::default(),
            issues_closed: TotalCount::default(),
            pull_requests_open: TotalCount::default(),
            pull_requests_closed: TotalCount::default(),
            pull_requests_merged: TotalCount::default(),
        }
    }

    /// Number of issues in the given state.
    pub fn issues(&self, state: IssueState) -> i64 {
        match state {
            IssueState::Open => self.issues_open.total_count,
            IssueState::Closed => self.issues_closed.total_count,
        }
    }

    /// Set the number of issues in the given state.
    pub fn set_issues(&mut self, state: IssueState, count: i64) {
        let slot = match state {
            IssueState::Open => &mut self.issues_open,
            IssueState::Closed => &mut self.issues_closed,
        };
        slot.total_count = count;
    }

    /// Number of pull requests in the given state.
    pub fn pull_requests(&self, state: PullRequestState) -> i64 {
        match state {
            PullRequestState::Open => self.pull_requests_open.total_count,
            PullRequestState::Closed => self.pull_requests_closed.total_count,
            PullRequestState::Merged => self.pull_requests_merged.total_count,
        }
    }

    /// Set the number of pull requests in the given state.
    pub fn set_pull_requests(&mut self, state: PullRequestState, count: i64) {
        let slot = match state {
            PullRequestState::Open => &mut self.pull_requests_open,
            PullRequestState::Closed => &mut self.pull_requests_closed,
            PullRequestState::Merged => &mut self.pull_requests_merged,
        };
        slot.total_count = count;
    }
}

/// Rate limit status of the calling token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimit {
    pub limit: i64,
    pub remaining: i64,
    pub reset_at: DateTime<Utc>,
}

/// GraphQL response envelope.
#[derive(Debug, Deserialize)]
pub(crate) struct GraphQlResponse {
    data: Option<QueryData>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryData {
    organization: Option<Organization>,
    rate_limit: Option<RateLimit>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

impl GraphQlResponse {
    /// Turn the envelope into a query result.
    ///
    /// Any reported error fails the whole query, even when partial data is
    /// present.
    pub(crate) fn into_result(self, login: &str) -> Result<OrganizationQuery, QueryError> {
        if !self.errors.is_empty() {
            let messages: Vec<&str> = self.errors.iter().map(|e| e.message.as_str()).collect();
            return Err(QueryError::GraphQl(messages.join("; ")));
        }

        let data = self.data.ok_or(QueryError::MissingData)?;
        let organization = data
            .organization
            .ok_or_else(|| QueryError::OrganizationNotFound(login.to_string()))?;
        let rate_limit = data.rate_limit.ok_or(QueryError::MissingData)?;

        Ok(OrganizationQuery {
            organization,
            rate_limit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SAMPLE_RESPONSE: &str = r#"{
        "data": {
            "organization": {
                "login": "acme",
                "repositories": {
                    "nodes": [{
                        "name": "widget",
                        "diskUsage": 42,
                        "createdAt": "2017-03-01T12:00:00Z",
                        "pushedAt": "2018-06-15T08:30:00Z",
                        "stargazers": { "totalCount": 11 },
                        "watchers": { "totalCount": 2 },
                        "forks": { "totalCount": 3 },
                        "issuesOpen": { "totalCount": 5 },
                        "issuesClosed": { "totalCount": 7 },
                        "pullRequestsOpen": { "totalCount": 1 },
                        "pullRequestsClosed": { "totalCount": 4 },
                        "pullRequestsMerged": { "totalCount": 9 }
                    }]
                }
            },
            "rateLimit": {
                "limit": 5000,
                "remaining": 4990,
                "resetAt": "2018-06-15T09:00:00Z"
            }
        }
    }"#;

    #[test]
    fn test_query_requests_every_alias() {
        let query = organization_query();

        for state in IssueState::ALL {
            assert!(query.contains(&format!("{}: issues(states: ", state.alias())));
        }
        for state in PullRequestState::ALL {
            assert!(query.contains(&format!("{}: pullRequests(states: ", state.alias())));
        }
        assert!(query.contains("pullRequestsMerged: pullRequests(states: MERGED)"));
        assert!(query.contains("repositories(first: 100)"));
        assert!(query.contains("organization(login: $organization)"));
        assert!(query.contains("rateLimit"));
    }

    #[test]
    fn test_query_braces_balanced() {
        let query = organization_query();
        let open = query.matches('{').count();
        let close = query.matches('}').count();
        assert_eq!(open, close);
    }

    #[test]
    fn test_decode_response() {
        let response: GraphQlResponse = serde_json::from_str(SAMPLE_RESPONSE).unwrap();
        let result = response.into_result("acme").unwrap();

        assert_eq!(result.organization.login, "acme");
        let repo = &result.organization.repositories.nodes[0];
        assert_eq!(repo.name, "widget");
        assert_eq!(repo.disk_usage, Some(42));
        assert_eq!(
            repo.created_at,
            Utc.with_ymd_and_hms(2017, 3, 1, 12, 0, 0).unwrap()
        );
        assert_eq!(repo.forks.total_count, 3);
        assert_eq!(repo.issues(IssueState::Open), 5);
        assert_eq!(repo.issues(IssueState::Closed), 7);
        assert_eq!(repo.pull_requests(PullRequestState::Open), 1);
        assert_eq!(repo.pull_requests(PullRequestState::Closed), 4);
        assert_eq!(repo.pull_requests(PullRequestState::Merged), 9);
        assert_eq!(result.rate_limit.limit, 5000);
        assert_eq!(result.rate_limit.remaining, 4990);
    }

    #[test]
    fn test_decode_null_pushed_at_and_disk_usage() {
        let json = r#"{
            "name": "empty",
            "diskUsage": null,
            "createdAt": "2020-01-01T00:00:00Z",
            "pushedAt": null,
            "stargazers": { "totalCount": 0 },
            "watchers": { "totalCount": 0 },
            "forks": { "totalCount": 0 },
            "issuesOpen": { "totalCount": 0 },
            "issuesClosed": { "totalCount": 0 },
            "pullRequestsOpen": { "totalCount": 0 },
            "pullRequestsClosed": { "totalCount": 0 },
            "pullRequestsMerged": { "totalCount": 0 }
        }"#;

        let repo: Repository = serde_json::from_str(json).unwrap();
        assert_eq!(repo.disk_usage, None);
        assert_eq!(repo.pushed_at, None);
    }

    #[test]
    fn test_graphql_errors_fail_query() {
        let json = r#"{
            "data": null,
            "errors": [
                { "message": "Bad credentials" },
                { "message": "Something else" }
            ]
        }"#;

        let response: GraphQlResponse = serde_json::from_str(json).unwrap();
        let err = response.into_result("acme").unwrap_err();
        assert!(matches!(err, QueryError::GraphQl(ref m) if m == "Bad credentials; Something else"));
    }

    #[test]
    fn test_missing_data_fails_query() {
        let response: GraphQlResponse = serde_json::from_str("{}").unwrap();
        assert!(matches!(
            response.into_result("acme"),
            Err(QueryError::MissingData)
        ));
    }

    #[test]
    fn test_null_organization_fails_query() {
        let json = r#"{
            "data": {
                "organization": null,
                "rateLimit": { "limit": 1, "remaining": 1, "resetAt": "2020-01-01T00:00:00Z" }
            }
        }"#;

        let response: GraphQlResponse = serde_json::from_str(json).unwrap();
        assert!(matches!(
            response.into_result("ghost"),
            Err(QueryError::OrganizationNotFound(ref login)) if login == "ghost"
        ));
    }

    #[test]
    fn test_state_labels() {
        let issue_labels: Vec<_> = IssueState::ALL.iter().map(|s| s.label()).collect();
        assert_eq!(issue_labels, vec!["open", "closed"]);

        let pr_labels: Vec<_> = PullRequestState::ALL.iter().map(|s| s.label()).collect();
        assert_eq!(pr_labels, vec!["open", "closed", "merged"]);
    }
}
