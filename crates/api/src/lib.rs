//! HTTP API for the Crowdspace directory.

use std::net::SocketAddr;
use std::time::Instant;

use anyhow::Context;
use axum::{
    extract::{rejection::JsonRejection, Request},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use crowdspace_core::Crowdspace;
use log::{info, warn};
use serde::Deserialize;
use store::{Platform, ProjectFilter, Status};

pub mod error;
mod handlers;

pub use error::ApiError;

pub type AppState = Crowdspace;

/// Build the `/api` router over shared application state.
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/projects", get(handlers::projects::list).post(handlers::projects::create))
        .route(
            "/projects/{id}",
            get(handlers::projects::detail)
                .put(handlers::projects::update)
                .delete(handlers::projects::remove),
        )
        .route("/projects/{id}/pledges", post(handlers::projects::pledge))
        .route("/creators", get(handlers::creators::list).post(handlers::creators::create))
        .route(
            "/creators/{id}",
            get(handlers::creators::detail).delete(handlers::creators::remove),
        )
        .route("/backers", get(handlers::backers::list).post(handlers::backers::create))
        .route(
            "/backers/{id}",
            get(handlers::backers::detail)
                .put(handlers::backers::update)
                .delete(handlers::backers::remove),
        )
        .route("/search", get(handlers::search::search));

    Router::new()
        .nest("/api", api_routes)
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

/// Bind `addr` and serve until Ctrl-C.
pub async fn serve(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Crowdspace server listening on http://{}", listener.local_addr()?);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

async fn log_requests(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(req).await;
    info!(
        "{} {} -> {} ({} ms)",
        method,
        path,
        response.status().as_u16(),
        started.elapsed().as_millis()
    );
    response
}

/// Unwrap a JSON body, turning axum's rejection into our error shape.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

/// Parse a numeric path id.
pub(crate) fn parse_id(raw: &str, what: &str) -> Result<i64, ApiError> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| ApiError::BadRequest(format!("{what} id must be a positive integer")))
}

/// Query-string filters shared by project listing and search.
#[derive(Debug, Default, Deserialize)]
pub struct FilterParams {
    pub status: Option<String>,
    pub platform: Option<String>,
    pub category: Option<String>,
}

impl FilterParams {
    /// Blank values mean "any"; unknown enum values are rejected.
    pub fn to_filter(&self) -> Result<ProjectFilter, ApiError> {
        let present = |v: &Option<String>| v.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);
        let bad_request = |e: store::ParseEnumError| ApiError::BadRequest(e.to_string());

        Ok(ProjectFilter {
            status: present(&self.status).map(|s| s.parse::<Status>()).transpose().map_err(bad_request)?,
            platform: present(&self.platform)
                .map(|p| p.parse::<Platform>())
                .transpose()
                .map_err(bad_request)?,
            category: present(&self.category),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_params_parse_and_ignore_blanks() {
        let params = FilterParams {
            status: Some("completed".into()),
            platform: Some("  ".into()),
            category: Some("Games".into()),
        };
        let filter = params.to_filter().unwrap();
        assert_eq!(filter.status, Some(Status::Completed));
        assert_eq!(filter.platform, None);
        assert_eq!(filter.category.as_deref(), Some("Games"));
    }

    #[test]
    fn filter_params_reject_unknown_values() {
        let params = FilterParams { platform: Some("patreon".into()), ..Default::default() };
        let err = params.to_filter().unwrap_err();
        assert_eq!(err.to_string(), "unknown platform 'patreon'");
    }

    #[test]
    fn ids_must_be_positive_integers() {
        assert_eq!(parse_id("12", "Project").unwrap(), 12);
        assert!(parse_id("abc", "Project").is_err());
        assert!(parse_id("0", "Project").is_err());
    }
}
