//! HTTP collector
//!
//! ```text
//! request ──→ log_requests ──→ rate_limit ──┬──→ GET /health
//!                                           │
//!                                           └──→ require_version_header
//!                                                  ├──→ POST   /events
//!                                                  ├──→ POST   /registrations
//!                                                  ├──→ PATCH  /registrations
//!                                                  ├──→ GET    /registrations
//!                                                  └──→ DELETE /registrations/:client_id
//! ```

pub mod api;
pub mod error;
pub mod middleware;
pub mod rate_limit;
mod state;

pub use state::AppState;

use std::future::Future;
use std::net::SocketAddr;

use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{delete, get, post};
use axum::Router;
use tokio::net::TcpListener;

pub fn build_router(state: AppState) -> Router {
    let versioned = Router::new()
        .route("/events", post(api::create_event))
        .route(
            "/registrations",
            post(api::create_registration)
                .patch(api::update_registration)
                .get(api::list_registrations),
        )
        .route("/registrations/:client_id", delete(api::delete_registration))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::require_version_header,
        ));

    Router::new()
        .route("/health", get(api::health))
        .merge(versioned)
        .layer(from_fn_with_state(state.clone(), middleware::rate_limit))
        .layer(from_fn(middleware::log_requests))
        .with_state(state)
}

/// Serve until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(
            addr = %addr,
            events = state.storage().events_backend(),
            "Collector listening"
        );
    }

    let app = build_router(state);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;

    tracing::info!("Collector shut down gracefully");
    Ok(())
}
