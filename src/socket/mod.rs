//! Byte transports.
//!
//! The pipeline talks to the network through the [`Transport`](transport::Transport) seam:
//! - [`transport`]: The non-blocking transport trait and connect outcomes
//! - [`tcp`]: TCP over tokio, driven by the async client
//! - `mock`: Scripted in-memory transport for tests (`test-util` feature)

#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod tcp;
pub mod transport;
