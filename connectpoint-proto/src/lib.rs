//! Shared protocol definitions for `ConnectPoint` synchronization.

pub mod board;
pub mod codec;
pub mod event;
pub mod message;
pub mod task;
pub mod validate;
