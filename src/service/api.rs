use crate::{
    application::Tracker,
    domain::{
        address::{is_valid, INVALID_ADDRESS},
        models::{AccountSnapshot, ConnectionStatus},
    },
};
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;

pub fn router<A>(app: Arc<A>) -> Router
where
    A: Tracker + Send + Sync + 'static,
{
    Router::new()
        .route("/snapshot", get(get_snapshot::<A>))
        .route("/status", get(get_status::<A>))
        .route("/track", post(track::<A>).delete(stop::<A>))
        .route("/refresh", post(refresh::<A>))
        .with_state(app)
        .layer(CorsLayer::permissive())
}

pub async fn start_server<A>(
    shutdown: broadcast::Sender<()>,
    app: Arc<A>,
    port: u16,
) -> anyhow::Result<()>
where
    A: Tracker + Send + Sync + 'static,
{
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;

    let server = axum::serve(listener, router(app));

    tracing::info!("API server started on port {}", port);

    let mut shutdown_rx = shutdown.subscribe();

    tokio::select! {
        _ = shutdown_rx.recv() => {
            tracing::warn!("API server received shutdown signal");
        }
        _ = server => {
            tracing::warn!("API server stopped unexpectedly");
        }
    }

    Ok(())
}

#[derive(Deserialize)]
struct TrackRequest {
    address: String,
}

async fn get_snapshot<A>(State(app): State<Arc<A>>) -> Json<AccountSnapshot>
where
    A: Tracker + Send + Sync + 'static,
{
    Json(app.snapshot())
}

async fn get_status<A>(State(app): State<Arc<A>>) -> Json<ConnectionStatus>
where
    A: Tracker + Send + Sync + 'static,
{
    Json(app.status())
}

async fn track<A>(
    State(app): State<Arc<A>>,
    Json(request): Json<TrackRequest>,
) -> Result<Json<AccountSnapshot>, (StatusCode, String)>
where
    A: Tracker + Send + Sync + 'static,
{
    if !is_valid(&request.address) {
        return Err((StatusCode::BAD_REQUEST, INVALID_ADDRESS.to_string()));
    }
    app.track(&request.address).await;
    Ok(Json(app.snapshot()))
}

async fn refresh<A>(State(app): State<Arc<A>>) -> Json<AccountSnapshot>
where
    A: Tracker + Send + Sync + 'static,
{
    app.refresh().await;
    Json(app.snapshot())
}

async fn stop<A>(State(app): State<Arc<A>>) -> StatusCode
where
    A: Tracker + Send + Sync + 'static,
{
    app.stop();
    StatusCode::NO_CONTENT
}
