// heartlink rendezvous server
// Endpoint registry, game-code lookup and opaque signal relay over WebSocket
//
// Usage: cargo run --bin signaling-server
// Listens on 0.0.0.0:$PORT (default 8080); clients connect to ws://<host>:<port>/ws

use std::net::SocketAddr;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use heartlink::network::rendezvous::Rendezvous;
use heartlink::network::signaling::{ErrorCode, SignalingMessage};

const DEFAULT_PORT: u16 = 8080;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .with_state(Rendezvous::new());

    let listener = TcpListener::bind(addr).await?;
    info!("Rendezvous server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

async fn health(State(rendezvous): State<Rendezvous>) -> impl IntoResponse {
    format!("ok {} endpoints\n", rendezvous.endpoint_count().await)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(rendezvous): State<Rendezvous>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, addr, rendezvous))
}

async fn handle_socket(socket: WebSocket, addr: SocketAddr, rendezvous: Rendezvous) {
    info!("New connection from {}", addr);

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<SignalingMessage>();
    let conn = rendezvous.open_connection(tx.clone()).await;

    // Outbox: everything the registry addresses to this connection
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let text = match msg.to_text() {
                Ok(text) => text,
                Err(e) => {
                    error!("Failed to encode message: {}", e);
                    continue;
                }
            };
            if ws_sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = ws_receiver.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(e) => {
                warn!("Error receiving from {}: {}", addr, e);
                break;
            }
        };

        match msg {
            Message::Text(text) => match SignalingMessage::from_text(&text) {
                Ok(signal_msg) => rendezvous.handle(conn, signal_msg).await,
                Err(e) => {
                    warn!("Unparseable message from {}: {}", addr, e);
                    let _ = tx.send(SignalingMessage::error(
                        ErrorCode::InvalidMessage,
                        format!("invalid message format: {}", e),
                    ));
                }
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    // Implicit unregister; linked peers hear peer_left
    rendezvous.close_connection(conn).await;
    info!("Connection from {} closed", addr);

    send_task.abort();
}
