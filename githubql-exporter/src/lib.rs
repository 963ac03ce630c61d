//! Prometheus exporter for GitHub organization repository statistics.
//!
//! On every scrape the exporter runs one GraphQL query per configured
//! organization against the GitHub API and translates the result into
//! gauges labeled by repository owner and name.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │  GitHub GraphQL │<────│    Collector    │<────│   HTTP Server   │
//! │  (per org)      │     │  (per scrape)   │     │   (/metrics)    │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//! ```
//!
//! # Usage
//!
//! ```bash
//! GITHUB_TOKEN=... githubql-exporter --orgs acme,globex
//! ```
//!
//! # Configuration
//!
//! See [`config::ExporterConfig`] for configuration options.

pub mod client;
pub mod collector;
pub mod config;
pub mod exposition;
pub mod http;
pub mod metric;
pub mod query;

pub use client::GithubClient;
pub use collector::{CollectorStats, OrganizationCollector, SharedCollector};
pub use config::ExporterConfig;
pub use http::HttpServer;
pub use metric::{MetricDesc, Sample};
pub use query::{OrganizationQuery, QueryError, QueryExecutor};
