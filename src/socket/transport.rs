use crate::base::neterror::NetError;
use std::fmt;
use std::io;

/// Outcome of a connect request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectStatus {
    /// The transport is connected to the requested target.
    Connected,
    /// Connecting has not finished. Drive again once it has.
    Pending,
}

/// Readiness the engine is waiting for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Interest {
    pub readable: bool,
    pub writable: bool,
}

impl Interest {
    pub fn is_empty(&self) -> bool {
        !self.readable && !self.writable
    }
}

/// Where a transport is, or should be, connected.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectTarget {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
}

impl fmt::Display for ConnectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = if self.use_tls { "https" } else { "http" };
        write!(f, "{}://{}:{}", scheme, self.host, self.port)
    }
}

/// Non-blocking byte transport driven by the pipeline.
/// Mimics net::StreamSocket, minus the async plumbing.
///
/// `read` and `write` never block: when no progress is possible they fail
/// with [`io::ErrorKind::WouldBlock`]. `read` returning `Ok(0)` is EOF.
pub trait Transport: Send {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Ensure a connection to `host:port`. Reuses the current connection
    /// when it already points at the same target. `first_on_connection` is
    /// false while earlier responses may still be in flight, in which case
    /// switching targets must wait.
    fn connect(
        &mut self,
        host: &str,
        port: u16,
        use_tls: bool,
        first_on_connection: bool,
    ) -> Result<ConnectStatus, NetError>;

    fn is_connected(&self) -> bool;

    /// Toggle TCP_NODELAY. Transports without the notion ignore it.
    fn set_nodelay(&mut self, enabled: bool);

    /// Drop the connection. The next `connect` starts a fresh one.
    fn reset(&mut self);
}

/// Connection reuse decision shared by transports that track their target.
pub fn reuse_decision(
    current: Option<&ConnectTarget>,
    wanted: &ConnectTarget,
    first_on_connection: bool,
) -> Option<ConnectStatus> {
    match current {
        Some(target) if target == wanted => Some(ConnectStatus::Connected),
        Some(target) if !first_on_connection => {
            tracing::debug!(current = %target, wanted = %wanted, "waiting for in-flight responses before switching target");
            Some(ConnectStatus::Pending)
        }
        _ => None,
    }
}
