//! Streams camera frames to a remote hand-pose service over a WebSocket and draws the
//! skeletons and labels it sends back.

pub mod config;
pub mod controller;
pub mod error;
pub mod pipeline;
pub mod protocol;
pub mod session;
pub mod types;

#[cfg(test)]
mod testing;

pub use config::AppConfig;
pub use controller::{SessionHandle, SessionUpdate};
pub use session::{SessionState, SessionStatus, StreamSession};
