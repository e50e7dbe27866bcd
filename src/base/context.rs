//! Ergonomic error context helpers.
//!
//! Provides extension traits for adding context to `Result` types,
//! converting IO errors from the transport into `NetError` variants.
//! `WouldBlock` is not an error for the engine and must be tested for
//! before these helpers are applied.

use crate::base::neterror::NetError;
use std::io::{self, ErrorKind};

/// Map an IO error kind onto the closest transport error.
pub fn map_io_error(error: &io::Error) -> NetError {
    match error.kind() {
        ErrorKind::ConnectionReset => NetError::ConnectionReset,
        ErrorKind::ConnectionAborted => NetError::ConnectionAborted,
        ErrorKind::ConnectionRefused => NetError::ConnectionRefused,
        ErrorKind::BrokenPipe | ErrorKind::UnexpectedEof => NetError::ConnectionClosed,
        ErrorKind::NotConnected => NetError::SocketNotConnected,
        ErrorKind::TimedOut => NetError::ConnectionTimedOut,
        _ => NetError::ConnectionFailed,
    }
}

/// Extension trait for adding context to IO Results.
pub trait IoResultExt<T> {
    /// Add connection context to an IO error.
    ///
    /// # Example
    /// ```ignore
    /// use pipenet::base::context::IoResultExt;
    ///
    /// let stream = TcpStream::connect(addr).await
    ///     .connection_context("example.com", 80)?;
    /// ```
    fn connection_context(self, host: &str, port: u16) -> Result<T, NetError>;

    /// Add context to a failed socket read.
    fn read_context(self) -> Result<T, NetError>;

    /// Add context to a failed socket write.
    fn write_context(self) -> Result<T, NetError>;
}

impl<T> IoResultExt<T> for Result<T, io::Error> {
    fn connection_context(self, host: &str, port: u16) -> Result<T, NetError> {
        self.map_err(|e| {
            tracing::debug!(host = %host, port, error = %e, "connection attempt failed");
            match e.kind() {
                ErrorKind::NotFound => NetError::NameNotResolved,
                _ => map_io_error(&e),
            }
        })
    }

    fn read_context(self) -> Result<T, NetError> {
        self.map_err(|e| {
            tracing::error!(error = %e, "Could not read from socket");
            map_io_error(&e)
        })
    }

    fn write_context(self) -> Result<T, NetError> {
        self.map_err(|e| {
            tracing::error!(error = %e, "Could not write to socket");
            map_io_error(&e)
        })
    }
}
