//! Live connection registry and per-session send handles.
//!
//! Every socket gets a [`SessionId`] and an unbounded channel feeding its
//! writer task. A session only becomes visible to broadcasts once it is
//! activated, and activation queues the initial-sync frames on the socket's
//! own channel while the registry's write lock is held. Anything broadcast
//! afterwards is therefore queued behind the initial sync.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::Message;
use connectpoint_proto::codec::{self, CodecError};
use connectpoint_proto::event::ServerEvent;
use tokio::sync::{RwLock, mpsc};

/// Transport-assigned identity of one socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Lifecycle of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Accepted, initial sync not delivered yet.
    Connecting,
    /// Initial sync queued; receives broadcasts.
    Active,
    /// Closed. Terminal.
    Disconnected,
}

impl ConnectionState {
    /// Checks and performs a lifecycle transition.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::IllegalTransition`] for anything other than
    /// `Connecting → Active`, `Connecting → Disconnected` or
    /// `Active → Disconnected`.
    pub fn transition(self, to: Self) -> Result<Self, RegistryError> {
        match (self, to) {
            (Self::Connecting, Self::Active | Self::Disconnected)
            | (Self::Active, Self::Disconnected) => Ok(to),
            (from, to) => Err(RegistryError::IllegalTransition { from, to }),
        }
    }
}

/// Errors from registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// A lifecycle transition that is not allowed.
    #[error("illegal connection transition {from:?} -> {to:?}")]
    IllegalTransition {
        /// Current state.
        from: ConnectionState,
        /// Requested state.
        to: ConnectionState,
    },

    /// The event could not be encoded.
    #[error("failed to encode event: {0}")]
    Encode(#[from] CodecError),

    /// The socket's writer is gone.
    #[error("session {0} is closed")]
    Closed(SessionId),
}

/// Tracks every active socket by [`SessionId`].
pub struct ConnectionRegistry {
    next_id: AtomicU64,
    connections: RwLock<HashMap<SessionId, mpsc::UnboundedSender<Message>>>,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Accepts a new socket. The returned handle is `Connecting` and not
    /// yet visible to broadcasts; the receiver feeds the socket's writer.
    #[must_use]
    pub fn open(self: &Arc<Self>) -> (ConnectionHandle, mpsc::UnboundedReceiver<Message>) {
        let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = ConnectionHandle {
            id,
            state: ConnectionState::Connecting,
            tx,
            registry: Arc::clone(self),
        };
        (handle, rx)
    }

    /// Number of active sessions.
    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Whether no session is active.
    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }

    /// Sends an event to every active session, returning how many accepted it.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Encode`] if the event cannot be encoded.
    pub async fn broadcast(&self, event: &ServerEvent) -> Result<usize, RegistryError> {
        self.fan_out(event, None).await
    }

    /// Sends an event to every active session except `except`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Encode`] if the event cannot be encoded.
    pub async fn broadcast_except(
        &self,
        except: SessionId,
        event: &ServerEvent,
    ) -> Result<usize, RegistryError> {
        self.fan_out(event, Some(except)).await
    }

    /// Removes a session, returning whether it was registered.
    pub async fn unregister(&self, id: SessionId) -> bool {
        self.connections.write().await.remove(&id).is_some()
    }

    /// Send a WebSocket Close frame to every active session.
    ///
    /// Each writer task forwards the frame and the client sees the socket
    /// close. Used for graceful shutdown and in tests.
    pub async fn close_all(&self) {
        let conns = self.connections.read().await;
        for (id, sender) in conns.iter() {
            tracing::info!(session = %id, "sending close frame");
            let _ = sender.send(Message::Close(None));
        }
    }

    async fn fan_out(
        &self,
        event: &ServerEvent,
        except: Option<SessionId>,
    ) -> Result<usize, RegistryError> {
        let frame = Message::Text(codec::encode_server(event)?.into());

        let mut dead = Vec::new();
        let mut delivered = 0;
        {
            let conns = self.connections.read().await;
            for (id, sender) in conns.iter() {
                if Some(*id) == except {
                    continue;
                }
                if sender.send(frame.clone()).is_ok() {
                    delivered += 1;
                } else {
                    dead.push(*id);
                }
            }
        }

        if !dead.is_empty() {
            let mut conns = self.connections.write().await;
            for id in &dead {
                conns.remove(id);
                tracing::debug!(session = %id, "dropped closed session");
            }
        }

        tracing::trace!(event = event.name(), delivered, "broadcast");
        Ok(delivered)
    }
}

/// Send handle for one session.
pub struct ConnectionHandle {
    id: SessionId,
    state: ConnectionState,
    tx: mpsc::UnboundedSender<Message>,
    registry: Arc<ConnectionRegistry>,
}

impl ConnectionHandle {
    /// This session's id.
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Queues the initial-sync frames and makes the session visible to
    /// broadcasts, atomically with respect to every other broadcast.
    ///
    /// `initial_sync` is awaited while the registry's write lock is held, so
    /// it must not broadcast itself.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is not `Connecting`, a frame cannot be
    /// encoded, or the socket already closed.
    pub async fn activate<F>(&mut self, initial_sync: F) -> Result<(), RegistryError>
    where
        F: Future<Output = Vec<ServerEvent>>,
    {
        let next = self.state.transition(ConnectionState::Active)?;

        let mut conns = self.registry.connections.write().await;
        for event in initial_sync.await {
            self.send_frame(&event)?;
        }
        conns.insert(self.id, self.tx.clone());
        drop(conns);

        self.state = next;
        tracing::debug!(session = %self.id, "session active");
        Ok(())
    }

    /// Sends an event to this session only.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Closed`] if the socket is gone, or
    /// [`RegistryError::Encode`] if the event cannot be encoded.
    pub fn emit(&self, event: &ServerEvent) -> Result<(), RegistryError> {
        if self.state == ConnectionState::Disconnected {
            return Err(RegistryError::Closed(self.id));
        }
        self.send_frame(event)
    }

    /// Sends an event to every active session, this one included.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Encode`] if the event cannot be encoded.
    pub async fn broadcast(&self, event: &ServerEvent) -> Result<usize, RegistryError> {
        self.registry.broadcast(event).await
    }

    /// Sends an event to every active session except this one.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Encode`] if the event cannot be encoded.
    pub async fn broadcast_except_self(&self, event: &ServerEvent) -> Result<usize, RegistryError> {
        self.registry.broadcast_except(self.id, event).await
    }

    /// Marks the session closed and removes it from the registry.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::IllegalTransition`] if it was already closed.
    pub async fn disconnect(&mut self) -> Result<(), RegistryError> {
        self.state = self.state.transition(ConnectionState::Disconnected)?;
        self.registry.unregister(self.id).await;
        Ok(())
    }

    fn send_frame(&self, event: &ServerEvent) -> Result<(), RegistryError> {
        let frame = Message::Text(codec::encode_server(event)?.into());
        self.tx
            .send(frame)
            .map_err(|_| RegistryError::Closed(self.id))
    }
}
