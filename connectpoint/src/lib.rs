//! `ConnectPoint` headless client library for the team workspace.

pub mod actions;
pub mod auth;
pub mod config;
pub mod state;
pub mod transport;
