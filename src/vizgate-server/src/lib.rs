//! Vizgate Server - authentication gateway and embed portal for Tableau.
//!
//! This crate provides:
//! - Username/password login issuing signed session tokens
//! - Embed token minting for Tableau Connected Apps
//! - A cached workbook directory with a static fallback list
//! - The portal UI, embedded in the binary

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod api;
pub mod auth;
pub mod config;
pub mod credentials;
pub mod directory;
pub mod embed;
pub mod error;
pub mod middleware;
pub mod state;
pub mod ui;
pub mod vendor;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{Router, http::HeaderValue};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub use config::ServerConfig;
pub use error::{AppError, AppResult};
pub use state::AppState;

/// Run the server with the given configuration.
pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    run_with_shutdown(config, std::future::pending()).await
}

/// Run the server with graceful shutdown support.
///
/// Once `shutdown` resolves, open connections get `shutdown_timeout`
/// seconds to finish before the server stops anyway.
pub async fn run_with_shutdown<F>(config: ServerConfig, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    config.validate().context("invalid configuration")?;

    if config.auth.uses_demo_account() {
        warn!("The demo account admin/password is enabled.");
        warn!("Configure auth.users before exposing this server.");
    }

    let addr = config.socket_addr()?;
    let drain_timeout = Duration::from_secs(config.shutdown_timeout);
    let state = Arc::new(AppState::new(config)?);
    let app = create_router_with_state(state);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("Vizgate listening on {}", addr);

    let (signalled_tx, signalled_rx) = oneshot::channel();
    let shutdown = async move {
        shutdown.await;
        let _ = signalled_tx.send(());
    };
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .into_future();

    serve_until_drained(server, signalled_rx, drain_timeout).await?;

    info!("Server shut down");
    Ok(())
}

/// Drive `server` to completion, allowing it at most `timeout` once
/// `signalled` fires.
async fn serve_until_drained<S>(
    server: S,
    signalled: oneshot::Receiver<()>,
    timeout: Duration,
) -> std::io::Result<()>
where
    S: Future<Output = std::io::Result<()>>,
{
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => return result,
        Ok(()) = signalled => {}
    }

    match tokio::time::timeout(timeout, server).await {
        Ok(result) => result,
        Err(_) => {
            warn!(
                "Connections still open after {}s, shutting down anyway",
                timeout.as_secs()
            );
            Ok(())
        }
    }
}

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    create_router_with_state(Arc::new(state))
}

/// Create the application router with an Arc-wrapped state.
pub fn create_router_with_state(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.cors_origins);

    Router::new()
        .nest("/api", api::routes(&state))
        .merge(ui::routes(state.config.static_files.as_ref()))
        .layer(axum::middleware::from_fn(middleware::timing_middleware))
        .layer(axum::middleware::from_fn(middleware::request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_drain_stops_at_timeout() {
        let (tx, rx) = oneshot::channel();
        tx.send(()).unwrap();
        let started = tokio::time::Instant::now();

        let result = serve_until_drained(
            std::future::pending::<std::io::Result<()>>(),
            rx,
            Duration::from_secs(30),
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(started.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_finishes_early() {
        let (tx, rx) = oneshot::channel();
        let started = tokio::time::Instant::now();
        let server = async {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Ok(())
        };
        let signal = async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            tx.send(()).unwrap();
        };

        let (result, ()) = tokio::join!(
            serve_until_drained(server, rx, Duration::from_secs(30)),
            signal
        );

        assert!(result.is_ok());
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_serve_error_is_returned() {
        let (_tx, rx) = oneshot::channel::<()>();
        let server = async { Err(std::io::Error::other("accept failed")) };

        let err = serve_until_drained(server, rx, Duration::from_secs(30))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "accept failed");
    }
}
