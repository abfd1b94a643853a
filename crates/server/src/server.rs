use axum::{
    Router,
    routing::{get, patch, post},
};
use engine::Engine;
use realtime::{RealtimeConfig, Registry};
use tokio_util::sync::CancellationToken;

use std::sync::Arc;

use crate::{expenses, groups, settlements, stream, users};

/// Shared handler state.
///
/// `shutdown` ends every open realtime stream when cancelled.
#[derive(Clone)]
pub struct ServerState {
    pub engine: Arc<Engine>,
    pub registry: Arc<Registry>,
    pub realtime: RealtimeConfig,
    pub shutdown: CancellationToken,
}

impl ServerState {
    pub fn new(
        engine: Engine,
        registry: Arc<Registry>,
        realtime: RealtimeConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            engine: Arc::new(engine),
            registry,
            realtime,
            shutdown,
        }
    }
}

pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/api/groups", get(groups::list).post(groups::create))
        .route("/api/groups/join", post(groups::join))
        .route(
            "/api/groups/{group_id}",
            get(groups::get).patch(groups::update),
        )
        .route(
            "/api/groups/{group_id}/members",
            get(groups::members).post(groups::add_member),
        )
        .route("/api/users", get(users::list).post(users::create))
        .route("/api/expenses", get(expenses::list).post(expenses::create))
        .route(
            "/api/expenses/{expense_id}",
            patch(expenses::update).delete(expenses::remove),
        )
        .route(
            "/api/settlements",
            get(settlements::dues).post(settlements::settle),
        )
        .route("/api/realtime/{group_id}", get(stream::subscribe))
        .with_state(state)
}

/// Serve until `state.shutdown` is cancelled.
pub async fn run_with_listener(
    state: ServerState,
    listener: tokio::net::TcpListener,
) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    tracing::info!("Server listening on {}", addr);

    let shutdown = state.shutdown.clone();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
}

pub fn spawn_with_listener(
    state: ServerState,
    listener: tokio::net::TcpListener,
) -> Result<std::net::SocketAddr, std::io::Error> {
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        if let Err(err) = run_with_listener(state, listener).await {
            tracing::error!("server failed: {err}");
        }
    });

    Ok(addr)
}
