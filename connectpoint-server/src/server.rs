//! WebSocket transport: application state, the `/ws` route and the
//! per-connection reader/writer tasks.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use connectpoint_proto::codec;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::bridge::{ChangeBridge, SNAPSHOT_BUFFER};
use crate::config::StoreConfig;
use crate::registry::ConnectionRegistry;
use crate::router::{BroadcastRouter, UNKNOWN_EVENT};
use crate::seed;
use crate::store::{Store, StoreError};

/// Shared server state: the store, live sockets, the router and the
/// background tasks that keep clients in sync.
pub struct AppState {
    /// Persisted collections.
    pub store: Arc<Store>,
    /// Live sockets.
    pub registry: Arc<ConnectionRegistry>,
    /// Event dispatch and snapshot fan-out.
    pub router: Arc<BroadcastRouter>,
    bridge: ChangeBridge,
    router_task: JoinHandle<()>,
}

impl AppState {
    /// Wires registry, router and change bridge around an opened store and
    /// spawns the router task. Must be called inside a tokio runtime.
    #[must_use]
    pub fn bootstrap(store: Arc<Store>) -> Arc<Self> {
        let registry = Arc::new(ConnectionRegistry::new());
        let router = Arc::new(BroadcastRouter::new(
            Arc::clone(&store),
            Arc::clone(&registry),
        ));

        let (tx, rx) = mpsc::channel(SNAPSHOT_BUFFER);
        let bridge = ChangeBridge::start(&store, &tx);
        let router_task = tokio::spawn(Arc::clone(&router).run(rx));

        Arc::new(Self {
            store,
            registry,
            router,
            bridge,
            router_task,
        })
    }

    /// Opens the configured store, seeds empty collections and bootstraps.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store cannot be opened or seeded.
    pub async fn connect(config: &StoreConfig) -> Result<Arc<Self>, StoreError> {
        let store = Arc::new(Store::connect(config).await?);
        seed::seed_if_empty(&store).await?;
        Ok(Self::bootstrap(store))
    }

    /// Number of collections pushing live updates.
    #[must_use]
    pub fn live_feeds(&self) -> usize {
        self.bridge.live_feeds()
    }

    /// Closes every socket and stops the background tasks.
    pub async fn shutdown(&self) {
        self.registry.close_all().await;
        self.bridge.shutdown();
        self.router_task.abort();
    }
}

/// Handles an upgraded WebSocket connection for one client.
///
/// The connection lifecycle:
/// 1. Queue the initial sync and register the socket for broadcasts.
/// 2. Spawn a writer draining the session channel into the socket.
/// 3. Decode text frames and hand them to the router, in arrival order.
/// 4. When the reader ends, abort the writer. When the writer ends, stop
///    the reader after the frame it is handling. Then unregister.
pub async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let (mut conn, mut rx) = state.registry.open();
    let session = conn.id();
    tracing::info!(session = %session, "client connected");

    if let Err(e) = conn.activate(state.router.initial_sync()).await {
        tracing::error!(session = %session, error = %e, "initial sync failed");
        return;
    }

    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if ws_sender.send(msg).await.is_err() {
                tracing::warn!(session = %session, "WebSocket write failed");
                break;
            }
            if closing {
                break;
            }
        }
    });

    // Stops the reader between frames. The reader is never aborted, so a
    // store write it already started always completes.
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

    let router = Arc::clone(&state.router);
    let mut read_task = tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                frame = ws_receiver.next() => frame,
                _ = &mut stop_rx => break,
            };
            let Some(Ok(msg)) = frame else {
                break;
            };
            match msg {
                Message::Text(text) => match codec::decode_client(text.as_str()) {
                    Ok(event) => router.handle(&conn, event).await,
                    Err(e) => {
                        tracing::warn!(session = %session, error = %e, "undecodable frame");
                        BroadcastRouter::report_failure(&conn, UNKNOWN_EVENT, &e.to_string());
                    }
                },
                Message::Binary(data) => {
                    tracing::warn!(session = %session, len = data.len(), "ignoring binary frame");
                }
                Message::Close(_) => {
                    tracing::info!(session = %session, "received close frame");
                    break;
                }
                _ => {
                    // Ping/pong are answered by axum.
                }
            }
        }
        conn
    });

    let finished = tokio::select! {
        res = &mut read_task => {
            write_task.abort();
            res.ok()
        }
        _ = &mut write_task => {
            let _ = stop_tx.send(());
            read_task.await.ok()
        }
    };

    match finished {
        Some(mut conn) => {
            if let Err(e) = conn.disconnect().await {
                tracing::debug!(session = %session, error = %e, "disconnect");
            }
        }
        None => {
            state.registry.unregister(session).await;
        }
    }
    tracing::info!(session = %session, "client disconnected");
}

/// Binds the server and returns the bound address and a join handle.
///
/// Binding to port 0 picks a free port, which is how tests run the server
/// in-process.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
    state: Arc<AppState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "server error");
        }
    });

    Ok((bound_addr, handle))
}

/// axum handler that upgrades an HTTP request to a WebSocket connection.
async fn ws_handler(
    ws: axum::extract::ws::WebSocketUpgrade,
    axum::extract::State(state): axum::extract::State<Arc<AppState>>,
) -> impl axum::response::IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}
