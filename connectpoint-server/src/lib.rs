//! `ConnectPoint` synchronization server library.
//!
//! Exposes the server for use in tests and embedding. Clients connect over a
//! WebSocket, receive the full message and task state, and from then on get
//! a fresh snapshot of a collection whenever anyone changes it.

pub mod bridge;
pub mod config;
pub mod registry;
pub mod router;
pub mod seed;
pub mod server;
pub mod store;
