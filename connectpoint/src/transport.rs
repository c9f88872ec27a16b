//! WebSocket connection to a `ConnectPoint` server.
//!
//! [`SyncClient::connect`] opens the socket and spawns a background reader.
//! The reader decodes every text frame, reconciles it into the shared
//! [`ClientState`] and then forwards it to [`SyncClient::next_event`].
//! There is no resume: a new connection is a new session and starts with a
//! fresh initial sync.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use connectpoint_proto::codec::{self, CodecError};
use connectpoint_proto::event::{ClientEvent, ServerEvent};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::state::ClientState;

/// Type alias for the write half of a WebSocket connection.
type WsSender = futures_util::stream::SplitSink<
    WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;

/// Type alias for the read half of a WebSocket connection.
type WsReader =
    futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>;

/// Default timeout for connecting to the server.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default capacity of the reconciled-event channel.
pub const EVENT_BUFFER: usize = 256;

/// Errors from the client connection.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The URL is not a `ws://` or `wss://` URL.
    #[error("invalid server URL {url:?}: {reason}")]
    InvalidUrl {
        /// URL as given.
        url: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Connecting took longer than the timeout.
    #[error("timed out connecting to server")]
    Timeout,

    /// The server could not be reached.
    #[error("server unreachable: {0}")]
    Unreachable(String),

    /// The connection is closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// An outbound event could not be encoded.
    #[error("failed to encode event: {0}")]
    Encode(#[from] CodecError),
}

/// A live connection to the server plus the state it reconciles.
pub struct SyncClient {
    /// Server URL.
    url: String,
    /// Write half of the WebSocket connection.
    ws_sender: Mutex<WsSender>,
    /// Reconciled workspace state, updated by the reader task.
    state: Arc<parking_lot::Mutex<ClientState>>,
    /// Events the reader already applied to `state`.
    events: Mutex<mpsc::Receiver<ServerEvent>>,
    /// Whether the socket is still open.
    connected: Arc<AtomicBool>,
    /// Handle to the background reader task.
    reader_handle: tokio::task::JoinHandle<()>,
}

impl SyncClient {
    /// Connects with the default timeout, viewing `active_channel`.
    ///
    /// # Errors
    ///
    /// See [`SyncClient::connect_with_timeout`].
    pub async fn connect(url: &str, active_channel: &str) -> Result<Self, TransportError> {
        Self::connect_with_timeout(url, active_channel, CONNECT_TIMEOUT).await
    }

    /// Connects to the server at `url`.
    ///
    /// # Errors
    ///
    /// - [`TransportError::InvalidUrl`] if `url` is not a WebSocket URL.
    /// - [`TransportError::Timeout`] if the handshake does not finish in time.
    /// - [`TransportError::Unreachable`] if the server cannot be reached.
    pub async fn connect_with_timeout(
        url: &str,
        active_channel: &str,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        check_url(url)?;

        let (ws_stream, _response) = tokio::time::timeout(timeout, connect_async(url))
            .await
            .map_err(|_| {
                tracing::warn!(url, "WebSocket connect timed out");
                TransportError::Timeout
            })?
            .map_err(|e| {
                tracing::warn!(url, err = %e, "WebSocket connect failed");
                TransportError::Unreachable(e.to_string())
            })?;
        tracing::info!(url, "connected to server");

        let (ws_sender, ws_reader) = ws_stream.split();

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let state = Arc::new(parking_lot::Mutex::new(ClientState::new(active_channel)));
        let connected = Arc::new(AtomicBool::new(true));

        let reader_handle = tokio::spawn(reader_loop(
            ws_reader,
            Arc::clone(&state),
            tx,
            Arc::clone(&connected),
        ));

        Ok(Self {
            url: url.to_string(),
            ws_sender: Mutex::new(ws_sender),
            state,
            events: Mutex::new(rx),
            connected,
            reader_handle,
        })
    }

    /// The server URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether the socket is still open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Locks the reconciled state. Do not hold the guard across an await.
    pub fn state(&self) -> parking_lot::MutexGuard<'_, ClientState> {
        self.state.lock()
    }

    /// Sends one event as a text frame.
    ///
    /// # Errors
    ///
    /// - [`TransportError::ConnectionClosed`] if the socket is gone.
    /// - [`TransportError::Encode`] if the event cannot be encoded.
    pub async fn send(&self, event: &ClientEvent) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::ConnectionClosed);
        }
        let frame = codec::encode_client(event)?;

        let mut sender = self.ws_sender.lock().await;
        sender.send(Message::Text(frame.into())).await.map_err(|e| {
            tracing::warn!(err = %e, "send failed");
            self.connected.store(false, Ordering::Relaxed);
            TransportError::ConnectionClosed
        })?;
        tracing::debug!(event = event.name(), "event sent");
        Ok(())
    }

    /// Waits for the next event. It has already been applied to
    /// [`SyncClient::state`] when this returns.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ConnectionClosed`] once the reader exits.
    pub async fn next_event(&self) -> Result<ServerEvent, TransportError> {
        let mut rx = self.events.lock().await;
        rx.recv().await.ok_or(TransportError::ConnectionClosed)
    }

    /// Sends a close frame and stops reading.
    pub async fn close(&self) {
        let mut sender = self.ws_sender.lock().await;
        let _ = sender.send(Message::Close(None)).await;
        self.connected.store(false, Ordering::Relaxed);
        self.reader_handle.abort();
    }
}

impl Drop for SyncClient {
    fn drop(&mut self) {
        self.reader_handle.abort();
    }
}

fn check_url(raw: &str) -> Result<(), TransportError> {
    let invalid = |reason: String| TransportError::InvalidUrl {
        url: raw.to_string(),
        reason,
    };
    let parsed = url::Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    match parsed.scheme() {
        "ws" | "wss" => Ok(()),
        other => Err(invalid(format!("unsupported scheme {other:?}"))),
    }
}

/// Background task that reads frames, reconciles them and forwards them.
///
/// Malformed frames are logged and skipped; the task does not disconnect on
/// bad data. Sets `connected` to `false` when the socket closes or errors.
async fn reader_loop(
    mut ws_reader: WsReader,
    state: Arc<parking_lot::Mutex<ClientState>>,
    tx: mpsc::Sender<ServerEvent>,
    connected: Arc<AtomicBool>,
) {
    while let Some(msg_result) = ws_reader.next().await {
        match msg_result {
            Ok(Message::Text(text)) => match codec::decode_server(text.as_str()) {
                Ok(event) => {
                    tracing::debug!(event = event.name(), "event received");
                    state.lock().apply(event.clone());
                    match tx.try_send(event) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(event)) => {
                            tracing::debug!(
                                event = event.name(),
                                "event buffer full, notification dropped"
                            );
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => break,
                    }
                }
                Err(e) => {
                    tracing::warn!(err = %e, "malformed frame, skipping");
                }
            },
            Ok(Message::Close(_)) => {
                tracing::info!("WebSocket closed by server");
                break;
            }
            Ok(Message::Binary(_)) => {
                tracing::warn!("unexpected binary frame, skipping");
            }
            Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
            Err(e) => {
                tracing::warn!(err = %e, "WebSocket read error");
                break;
            }
        }
    }
    connected.store(false, Ordering::Relaxed);
    tracing::info!("reader task exiting");
}
