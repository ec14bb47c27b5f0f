//! HTTP router and WebSocket alert stream.
//!
//! Each WebSocket client is one broadcaster subscriber. Alerts are forwarded as
//! their JSON wire form until the client closes or its queue is dropped.

use crate::routes;
use crate::state::SharedState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::HeaderValue,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use futures_util::{SinkExt, StreamExt};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{debug, info, warn};

/// Build the CORS layer. An unset or unparseable origin allows any.
fn cors_layer(allowed_origin: Option<&str>) -> CorsLayer {
    let origin = match allowed_origin.map(HeaderValue::from_str) {
        Some(Ok(value)) => AllowOrigin::exact(value),
        Some(Err(e)) => {
            warn!(error = %e, "Invalid allowed origin, allowing any");
            AllowOrigin::from(Any)
        }
        None => AllowOrigin::from(Any),
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Create the application router.
pub fn create_router(state: SharedState, allowed_origin: Option<&str>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/check-price", post(routes::check_price))
        .route("/api/track-price", post(routes::track_price))
        .route("/api/untrack-price", post(routes::untrack_price))
        .route("/api/tracked-items", get(routes::tracked_items))
        .route("/api/health", get(routes::health))
        .layer(cors_layer(allowed_origin))
        .with_state(state)
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SharedState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle individual WebSocket connection.
async fn handle_socket(socket: WebSocket, state: SharedState) {
    let (mut sender, mut receiver) = socket.split();
    let mut subscriber = state.broadcaster.subscribe();
    let subscriber_id = subscriber.id();

    debug!(subscriber = subscriber_id, "WebSocket client connected");

    // Forward alerts until the queue closes or the socket fails.
    let mut send_task = tokio::spawn(async move {
        while let Some(alert) = subscriber.recv().await {
            match serde_json::to_string(&alert.to_payload()) {
                Ok(json) => {
                    if sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "Failed to encode alert"),
            }
        }
        let _ = sender.send(Message::Close(None)).await;
    });

    // Inbound frames are ignored; only close and errors matter.
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) => break,
                Err(e) => {
                    warn!(subscriber = subscriber_id, error = %e, "WebSocket error");
                    break;
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.broadcaster.unsubscribe(subscriber_id);
    info!(subscriber = subscriber_id, "WebSocket client disconnected");
}

/// Bind the listener and serve until the task is aborted.
pub async fn start_server(
    state: SharedState,
    port: u16,
    allowed_origin: Option<&str>,
) -> Result<tokio::task::JoinHandle<()>, Box<dyn std::error::Error + Send + Sync>> {
    let app = create_router(state, allowed_origin);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(port, "HTTP server listening");

    Ok(tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "HTTP server error");
        }
    }))
}
