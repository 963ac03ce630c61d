//! Organization collector that turns GraphQL query results into samples.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::warn;

use crate::metric::{MetricDesc, Sample, build_fq_name, unix_seconds};
use crate::query::{IssueState, Organization, PullRequestState, QueryExecutor, RateLimit};

const REPO_LABELS: &[&str] = &["owner", "name"];
const REPO_STATE_LABELS: &[&str] = &["owner", "name", "state"];

/// Collector statistics.
#[derive(Debug, Clone, Default)]
pub struct CollectorStats {
    /// Total collection cycles started.
    pub scrapes: u64,
    /// Cycles aborted by a failed organization query.
    pub failed_scrapes: u64,
    /// Total samples produced across all cycles.
    pub samples_emitted: u64,
    /// Duration of the most recent cycle.
    pub last_scrape_duration: Duration,
}

/// Collects repository metrics for a fixed list of organizations.
///
/// Every call to [`collect`](Self::collect) queries each organization in
/// order. The first failed query ends the cycle: samples for earlier
/// organizations are kept, later organizations and the rate limit gauges are
/// skipped.
pub struct OrganizationCollector<C> {
    client: C,
    organizations: Vec<String>,

    created: MetricDesc,
    disk_usage: MetricDesc,
    forks: MetricDesc,
    issues: MetricDesc,
    pull_requests: MetricDesc,
    pushed: MetricDesc,
    stargazers: MetricDesc,
    watchers: MetricDesc,

    rate_limit: MetricDesc,
    rate_limit_remaining: MetricDesc,
    rate_limit_reset: MetricDesc,

    stats: RwLock<CollectorStats>,
}

impl<C: QueryExecutor> OrganizationCollector<C> {
    /// Create a new collector.
    pub fn new(client: C, namespace: &str, organizations: Vec<String>) -> Self {
        let repo = |name: &str| build_fq_name(namespace, "repo", name);
        let rate = |name: &str| build_fq_name(namespace, "rate_limit", name);

        Self {
            client,
            organizations,

            created: MetricDesc::new(
                repo("created"),
                "Unix timestamp of when the repo was created",
                REPO_LABELS,
            ),
            disk_usage: MetricDesc::new(
                repo("disk_usage_bytes"),
                "Bytes of the repository used on disk",
                REPO_LABELS,
            ),
            forks: MetricDesc::new(
                repo("forks"),
                "Number of forks of that repo",
                REPO_LABELS,
            ),
            issues: MetricDesc::new(
                repo("issues"),
                "Number of issues with a state of open or closed",
                REPO_STATE_LABELS,
            ),
            pull_requests: MetricDesc::new(
                repo("pull_requests"),
                "Number of pull requests with a state of open, closed or merged",
                REPO_STATE_LABELS,
            ),
            pushed: MetricDesc::new(
                repo("pushed"),
                "Unix timestamp of when the repo was last pushed to",
                REPO_LABELS,
            ),
            stargazers: MetricDesc::new(
                repo("stargazers"),
                "Number of users that star the repo",
                REPO_LABELS,
            ),
            watchers: MetricDesc::new(
                repo("watchers"),
                "Number of users that watch the repo",
                REPO_LABELS,
            ),

            rate_limit: MetricDesc::new(rate("limit"), "The rate limit", &[]),
            rate_limit_remaining: MetricDesc::new(
                rate("remaining"),
                "The remaining requests left until hitting the rate limit",
                &[],
            ),
            rate_limit_reset: MetricDesc::new(
                rate("reset_seconds"),
                "Unix timestamp when the rate limit will be reset",
                &[],
            ),

            stats: RwLock::new(CollectorStats::default()),
        }
    }

    /// All descriptors this collector can emit. Makes no network calls.
    pub fn describe(&self) -> Vec<&MetricDesc> {
        vec![
            &self.created,
            &self.disk_usage,
            &self.forks,
            &self.issues,
            &self.pull_requests,
            &self.pushed,
            &self.stargazers,
            &self.watchers,
            &self.rate_limit,
            &self.rate_limit_remaining,
            &self.rate_limit_reset,
        ]
    }

    /// Run one collection cycle.
    pub async fn collect(&self) -> Vec<Sample<'_>> {
        let started = Instant::now();
        let mut samples = Vec::new();
        let mut rate_limit = None;
        let mut failed = false;

        for organization in &self.organizations {
            match self.client.query_organization(organization).await {
                Ok(result) => {
                    rate_limit = Some(result.rate_limit);
                    self.push_organization(&result.organization, &mut samples);
                }
                Err(e) => {
                    warn!(
                        organization = %organization,
                        error = %e,
                        "Failed to execute organization query"
                    );
                    failed = true;
                    break;
                }
            }
        }

        if !failed && let Some(rate_limit) = rate_limit {
            self.push_rate_limit(&rate_limit, &mut samples);
        }

        let mut stats = self.stats.write();
        stats.scrapes += 1;
        if failed {
            stats.failed_scrapes += 1;
        }
        stats.samples_emitted += samples.len() as u64;
        stats.last_scrape_duration = started.elapsed();
        drop(stats);

        samples
    }

    /// Get collector statistics.
    pub fn stats(&self) -> CollectorStats {
        self.stats.read().clone()
    }

    fn push_organization<'a>(&'a self, organization: &Organization, out: &mut Vec<Sample<'a>>) {
        let owner = organization.login.as_str();

        for repo in &organization.repositories.nodes {
            let labels = || vec![owner.to_string(), repo.name.clone()];
            let with_state = |state: &str| {
                vec![owner.to_string(), repo.name.clone(), state.to_string()]
            };

            out.push(Sample::new(
                &self.created,
                unix_seconds(&repo.created_at),
                labels(),
            ));
            out.push(Sample::new(
                &self.disk_usage,
                repo.disk_usage.unwrap_or_default() as f64,
                labels(),
            ));
            out.push(Sample::new(
                &self.forks,
                repo.forks.total_count as f64,
                labels(),
            ));
            for state in IssueState::ALL {
                out.push(Sample::new(
                    &self.issues,
                    repo.issues(state) as f64,
                    with_state(state.label()),
                ));
            }
            for state in PullRequestState::ALL {
                out.push(Sample::new(
                    &self.pull_requests,
                    repo.pull_requests(state) as f64,
                    with_state(state.label()),
                ));
            }
            if let Some(pushed_at) = &repo.pushed_at {
                out.push(Sample::new(&self.pushed, unix_seconds(pushed_at), labels()));
            }
            out.push(Sample::new(
                &self.stargazers,
                repo.stargazers.total_count as f64,
                labels(),
            ));
            out.push(Sample::new(
                &self.watchers,
                repo.watchers.total_count as f64,
                labels(),
            ));
        }
    }

    fn push_rate_limit<'a>(&'a self, rate_limit: &RateLimit, out: &mut Vec<Sample<'a>>) {
        out.push(Sample::new(
            &self.rate_limit,
            rate_limit.limit as f64,
            Vec::new(),
        ));
        out.push(Sample::new(
            &self.rate_limit_remaining,
            rate_limit.remaining as f64,
            Vec::new(),
        ));
        out.push(Sample::new(
            &self.rate_limit_reset,
            unix_seconds(&rate_limit.reset_at),
            Vec::new(),
        ));
    }
}

/// Shareable collector handle.
pub type SharedCollector<C> = Arc<OrganizationCollector<C>>;
