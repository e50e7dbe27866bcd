//! TCP transport backed by a tokio stream.
//!
//! The socket is driven without awaiting: reads and writes use
//! `try_read`/`try_write` and the async driver waits for readiness between
//! calls. Connecting is asynchronous, so `connect` only records the target
//! and the driver completes it via [`TcpTransport::take_pending_connect`].

use crate::base::context::IoResultExt;
use crate::base::neterror::NetError;
use crate::socket::transport::{reuse_decision, ConnectStatus, ConnectTarget, Transport};
use std::io;
use std::time::Duration;
use tokio::net::TcpStream;

#[derive(Debug, Default)]
pub struct TcpTransport {
    stream: Option<TcpStream>,
    target: Option<ConnectTarget>,
    pending: Option<ConnectTarget>,
    nodelay: bool,
}

impl TcpTransport {
    pub fn new() -> Self {
        Self {
            nodelay: true,
            ..Self::default()
        }
    }

    /// Target the engine asked to connect to and that is not yet attached.
    pub fn take_pending_connect(&mut self) -> Option<ConnectTarget> {
        self.pending.take()
    }

    pub fn has_pending_connect(&self) -> bool {
        self.pending.is_some()
    }

    /// Install a connected stream for `target`.
    pub fn attach(&mut self, stream: TcpStream, target: ConnectTarget) {
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(error = %e, "could not enable TCP_NODELAY");
        }
        self.nodelay = true;
        self.stream = Some(stream);
        self.target = Some(target);
        self.pending = None;
    }

    pub fn stream(&self) -> Option<&TcpStream> {
        self.stream.as_ref()
    }
}

/// Resolve and connect to `target` within `timeout`.
pub async fn open(target: &ConnectTarget, timeout: Duration) -> Result<TcpStream, NetError> {
    let addr = (target.host.as_str(), target.port);
    match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(result) => result.connection_context(&target.host, target.port),
        Err(_) => {
            tracing::warn!(target = %target, "connection attempt timed out");
            Err(NetError::ConnectionTimedOut)
        }
    }
}

fn not_connected() -> io::Error {
    io::Error::from(io::ErrorKind::NotConnected)
}

impl Transport for TcpTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.as_ref().ok_or_else(not_connected)?.try_read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.as_ref().ok_or_else(not_connected)?.try_write(buf)
    }

    fn connect(
        &mut self,
        host: &str,
        port: u16,
        use_tls: bool,
        first_on_connection: bool,
    ) -> Result<ConnectStatus, NetError> {
        if use_tls {
            tracing::error!(host = %host, "TLS is not supported by the TCP transport");
            return Err(NetError::DisallowedUrlScheme);
        }

        let wanted = ConnectTarget {
            host: host.to_string(),
            port,
            use_tls,
        };
        let current = self.stream.as_ref().and(self.target.as_ref());
        if let Some(status) = reuse_decision(current, &wanted, first_on_connection) {
            if status == ConnectStatus::Connected {
                tracing::debug!(target = %wanted, "Reusing an existing connection");
            }
            return Ok(status);
        }

        self.reset();
        tracing::debug!(target = %wanted, "connecting");
        self.pending = Some(wanted);
        Ok(ConnectStatus::Pending)
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn set_nodelay(&mut self, enabled: bool) {
        if self.nodelay == enabled {
            return;
        }
        if let Some(stream) = self.stream.as_ref() {
            if let Err(e) = stream.set_nodelay(enabled) {
                tracing::debug!(error = %e, "could not toggle TCP_NODELAY");
                return;
            }
        }
        self.nodelay = enabled;
    }

    fn reset(&mut self) {
        if self.stream.take().is_some() {
            tracing::debug!("closing connection");
        }
        self.target = None;
    }
}
