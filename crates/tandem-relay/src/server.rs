//! Websocket transport in front of the relay service

use anyhow::Context;
use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use tandem_core::{ClientId, ClientMessage, ServerMessage};
use tandem_services::{Relay, RelayHandle};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::RelayConfig;

#[derive(Clone)]
pub struct AppState {
    pub relay: RelayHandle,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_check))
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let cid = ClientId::new(Uuid::new_v4().to_string());
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerMessage>();
    let link = match state.relay.attach(cid.clone(), out_tx) {
        Ok(link) => link,
        Err(e) => {
            error!("Failed to register client: {}", e);
            return;
        }
    };
    info!(cid = %cid, "WebSocket connected");

    let (mut sender, mut receiver) = socket.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            let json = match msg.to_json() {
                Ok(j) => j,
                Err(e) => {
                    error!("Failed to serialize message: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    // Owns the link: when this task ends or is aborted the relay sees a disconnect
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match ClientMessage::from_json(&text) {
                    Ok(message) => {
                        if let Err(e) = link.send(message) {
                            error!("Failed to reach relay: {}", e);
                            break;
                        }
                    }
                    Err(e) => warn!("Dropping malformed message: {}", e),
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }
    info!(cid = %cid, "WebSocket closed");
}

pub async fn run_server(config: RelayConfig) -> anyhow::Result<()> {
    let (relay, handle) = Relay::new();
    let _relay_thread = relay.spawn();

    let app = create_router(AppState { relay: handle });
    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!(%addr, "Relay listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Relay shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for ctrl-c: {}", e);
    }
}
