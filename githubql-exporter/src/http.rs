//! HTTP server for the Prometheus scrape endpoint.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing::{debug, info};

use crate::collector::SharedCollector;
use crate::exposition::{CONTENT_TYPE, render};
use crate::query::QueryExecutor;

/// Application state shared across handlers.
struct AppState<C> {
    collector: SharedCollector<C>,
    metrics_path: Arc<str>,
}

impl<C> Clone for AppState<C> {
    fn clone(&self) -> Self {
        Self {
            collector: self.collector.clone(),
            metrics_path: self.metrics_path.clone(),
        }
    }
}

/// Create the HTTP router.
fn create_router<C>(collector: SharedCollector<C>, metrics_path: &str) -> Router
where
    C: QueryExecutor + 'static,
{
    let state = AppState {
        collector,
        metrics_path: Arc::from(metrics_path),
    };

    Router::new()
        .route(metrics_path, get(metrics_handler::<C>))
        .route("/health", get(health_handler))
        .route("/", get(index_handler::<C>))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Handler for the metrics endpoint. Runs one collection cycle per request.
async fn metrics_handler<C>(State(state): State<AppState<C>>) -> Response
where
    C: QueryExecutor + 'static,
{
    let samples = state.collector.collect().await;
    let body = render(&state.collector.describe(), &samples);
    debug!(samples = samples.len(), "Served scrape");

    (StatusCode::OK, [("content-type", CONTENT_TYPE)], body).into_response()
}

/// Handler for the /health endpoint.
async fn health_handler() -> Response {
    (StatusCode::OK, "healthy\n").into_response()
}

/// Landing page linking to the metrics endpoint.
async fn index_handler<C>(State(state): State<AppState<C>>) -> Html<String>
where
    C: QueryExecutor + 'static,
{
    Html(format!(
        "<html>\n\
         <head><title>GitHubQL Exporter</title></head>\n\
         <body>\n\
         <h1>GitHubQL Exporter</h1>\n\
         <p><a href=\"{path}\">Metrics</a></p>\n\
         </body>\n\
         </html>\n",
        path = state.metrics_path
    ))
}

/// HTTP server configuration.
pub struct HttpServer<C> {
    collector: SharedCollector<C>,
    listen_addr: SocketAddr,
    metrics_path: String,
}

impl<C> HttpServer<C>
where
    C: QueryExecutor + 'static,
{
    /// Create a new HTTP server.
    pub fn new(collector: SharedCollector<C>, listen_addr: SocketAddr, metrics_path: String) -> Self {
        Self {
            collector,
            listen_addr,
            metrics_path,
        }
    }

    /// Run the HTTP server until the shutdown signal is received.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        info!(
            addr = %self.listen_addr,
            path = %self.metrics_path,
            "Starting HTTP server"
        );

        let listener = tokio::net::TcpListener::bind(self.listen_addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", self.listen_addr, e))?;

        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until the shutdown signal is received.
    pub async fn serve(
        self,
        listener: tokio::net::TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        let router = create_router(self.collector, &self.metrics_path);

        info!(
            addr = %listener.local_addr()?,
            path = %self.metrics_path,
            "HTTP server listening"
        );

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                loop {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                    if *shutdown.borrow() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
            .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

        info!("HTTP server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::OrganizationCollector;
    use crate::query::{
        Organization, OrganizationQuery, QueryError, RateLimit, Repository, RepositoryConnection,
    };
    use axum::body::Body;
    use axum::http::Request;
    use chrono::{TimeZone, Utc};
    use tower::ServiceExt;

    /// Serves one fixed repository for "acme" and fails everything else.
    struct FixedExecutor;

    impl QueryExecutor for FixedExecutor {
        async fn query_organization(&self, login: &str) -> Result<OrganizationQuery, QueryError> {
            if login != "acme" {
                return Err(QueryError::OrganizationNotFound(login.to_string()));
            }
            let created = Utc.with_ymd_and_hms(2017, 3, 1, 12, 0, 0).unwrap();
            let mut repo = Repository::new("widget", created);
            repo.forks.total_count = 3;

            Ok(OrganizationQuery {
                organization: Organization {
                    login: "acme".to_string(),
                    repositories: RepositoryConnection { nodes: vec![repo] },
                },
                rate_limit: RateLimit {
                    limit: 5000,
                    remaining: 4999,
                    reset_at: created,
                },
            })
        }
    }

    fn make_collector(orgs: &[&str]) -> SharedCollector<FixedExecutor> {
        Arc::new(OrganizationCollector::new(
            FixedExecutor,
            "github",
            orgs.iter().map(|s| s.to_string()).collect(),
        ))
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let router = create_router(make_collector(&["acme"]), "/metrics");

        let response = router
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let content_type = response.headers().get("content-type").unwrap();
        assert!(content_type.to_str().unwrap().contains("text/plain"));

        let body = body_string(response).await;
        assert!(body.contains("# TYPE github_repo_forks gauge"));
        assert!(body.contains("github_repo_forks{owner=\"acme\",name=\"widget\"} 3"));
        assert!(body.contains("github_rate_limit_remaining 4999"));
    }

    #[tokio::test]
    async fn test_metrics_endpoint_failed_scrape_is_ok() {
        let router = create_router(make_collector(&["ghost"]), "/metrics");

        let response = router
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_string(response).await.is_empty());
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let router = create_router(make_collector(&["acme"]), "/metrics");

        let response = router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_index_links_metrics_path() {
        let router = create_router(make_collector(&["acme"]), "/prometheus/metrics");

        let response = router
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(
            body_string(response)
                .await
                .contains("<a href=\"/prometheus/metrics\">Metrics</a>")
        );
    }

    #[tokio::test]
    async fn test_custom_metrics_path() {
        let router = create_router(make_collector(&["acme"]), "/prometheus/metrics");

        let response = router
            .clone()
            .oneshot(
                Request::get("/prometheus/metrics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
