/// The current state of a pipelined exchange.
/// This roughly matches net/base/load_states.h
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadState {
    /// Nothing queued.
    #[default]
    Idle,

    /// Suspended until a server-advised backoff expires.
    WaitingForBackoff,

    /// Held behind the pipelining barrier until the previous response
    /// has been fully read.
    WaitingForAvailableSocket,

    /// Waiting for the transport to connect.
    Connecting,

    /// Sending the HTTP request.
    SendingRequest,

    /// Waiting for the server response (TTFB).
    WaitingForResponse,

    /// Reading the response body.
    ReadingResponse,
}

impl LoadState {
    /// Whether the exchange is making progress on the wire.
    pub fn is_active(&self) -> bool {
        !matches!(
            self,
            LoadState::Idle | LoadState::WaitingForBackoff | LoadState::WaitingForAvailableSocket
        )
    }
}
