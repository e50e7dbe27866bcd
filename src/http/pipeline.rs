//! HTTP/1.1 pipelining over a single transport.
//!
//! The pipeline owns a FIFO of request/response pairs. Requests are written
//! in order, possibly before earlier responses have arrived, and responses
//! are retired strictly from the front. Nothing here blocks: [`Pipeline::drive`]
//! does as much work as the transport allows and reports whether it should
//! be called again right away, after the next transport event, or not at all.

use crate::base::context::IoResultExt;
use crate::base::loadstate::LoadState;
use crate::base::neterror::NetError;
use crate::http::config::PipelineConfig;
use crate::http::exchange::{lock, RequestResponse, SharedExchange};
use crate::http::parser::{ParseStatus, ResponseParser};
use crate::http::throttle::RequestThrottler;
use crate::socket::transport::{Interest, Transport};
use bytes::BytesMut;
use std::collections::VecDeque;
use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Instant;

/// Outcome of one [`Pipeline::drive`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveStatus {
    /// More local work remains. Drive again immediately.
    Continue,
    /// Waiting on the transport or a backoff timer.
    WouldBlock,
    /// Every queued exchange has completed.
    Done,
}

/// Send-side state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SendState {
    #[default]
    Idle,
    Init,
    /// Held until the responses in flight have been read.
    WaitBeforeSend,
    WaitConnect,
    SendingHeader,
    SendingBody,
}

/// A queue entry. A pair whose sink stopped caring stays queued as
/// `Draining` so its response is still read off the connection.
#[derive(Debug)]
pub(super) enum Slot {
    Active(SharedExchange),
    Draining,
}

pub struct Pipeline<T: Transport> {
    pub(super) transport: T,
    pub(super) throttler: Arc<RequestThrottler>,
    pub(super) config: PipelineConfig,
    pub(super) queue: VecDeque<Slot>,
    /// Index of the next pair to transmit. Never beyond `queue.len()`.
    pub(super) send_pos: usize,
    pub(super) send_state: SendState,
    pub(super) send_buf: BytesMut,
    pub(super) body_remaining: u64,
    pub(super) body_chunk: Vec<u8>,
    pub(super) wake_at: Option<Instant>,
    recv_buf: BytesMut,
    read_buf: Vec<u8>,
    parser: ResponseParser,
    nudged: bool,
}

impl<T: Transport> Pipeline<T> {
    pub fn new(transport: T, throttler: Arc<RequestThrottler>) -> Self {
        Self::with_config(transport, throttler, PipelineConfig::default())
    }

    pub fn with_config(
        transport: T,
        throttler: Arc<RequestThrottler>,
        config: PipelineConfig,
    ) -> Self {
        let parser = ResponseParser::new(config.max_line_length);
        let read_buf = vec![0u8; config.recv_chunk_size.max(1)];
        Self {
            transport,
            throttler,
            config,
            queue: VecDeque::new(),
            send_pos: 0,
            send_state: SendState::Idle,
            send_buf: BytesMut::new(),
            body_remaining: 0,
            body_chunk: Vec::new(),
            wake_at: None,
            recv_buf: BytesMut::new(),
            read_buf,
            parser,
            nudged: false,
        }
    }

    /// Queue a pair for transmission.
    ///
    /// When the previous tail will not leave the connection usable, the new
    /// pair is held back until that response has been read. Otherwise it
    /// may be sent right away.
    pub fn enqueue(&mut self, exchange: SharedExchange) {
        {
            let mut rr = lock(&exchange);
            rr.request.flags = Default::default();
            rr.response.flags = Default::default();
        }

        if self.send_state == SendState::Idle {
            let wait = match self.queue.back() {
                None => false,
                Some(Slot::Draining) => !self.parser.keep_alive(),
                Some(Slot::Active(tail)) => !negotiated_keep_alive(&lock(tail)),
            };
            if wait {
                tracing::debug!("previous response closes the connection, holding request");
                self.send_state = SendState::WaitBeforeSend;
            } else {
                self.send_state = SendState::Init;
                self.nudged = true;
            }
        }
        self.queue.push_back(Slot::Active(exchange));
    }

    /// Make as much progress as the transport allows. On error the
    /// connection is torn down and the queue is cleared.
    pub fn drive(&mut self) -> Result<DriveStatus, NetError> {
        self.nudged = false;
        match self.drive_inner() {
            Ok(status) => Ok(status),
            Err(e) => {
                self.abort(e);
                Err(e)
            }
        }
    }

    fn drive_inner(&mut self) -> Result<DriveStatus, NetError> {
        if self.queue.is_empty() {
            self.check_idle_connection();
            return Ok(DriveStatus::Done);
        }

        let sending = self.send_state != SendState::Idle || !self.send_buf.is_empty();
        if sending && self.send_step()? == DriveStatus::Continue {
            return Ok(DriveStatus::Continue);
        }

        if !self.transport.is_connected() {
            return Ok(DriveStatus::WouldBlock);
        }
        self.receive_step()
    }

    fn receive_step(&mut self) -> Result<DriveStatus, NetError> {
        // Bytes left over from a previous pass belong to the next response.
        if !self.recv_buf.is_empty() {
            if let Some(status) = self.process_received(false)? {
                return Ok(status);
            }
        }

        loop {
            let n = match self.transport.read(&mut self.read_buf) {
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(DriveStatus::WouldBlock),
                Err(e) => return Err(e).read_context(),
            };
            self.recv_buf.extend_from_slice(&self.read_buf[..n]);
            let eof = n == 0;

            if let Some(status) = self.process_received(eof)? {
                return Ok(status);
            }
            if eof {
                return Err(NetError::Unexpected);
            }
        }
    }

    /// Parse buffered bytes against the front of the queue, retiring every
    /// response that completes.
    fn process_received(&mut self, eof: bool) -> Result<Option<DriveStatus>, NetError> {
        loop {
            let front = match self.queue.front() {
                Some(Slot::Active(exchange)) => Some(Arc::clone(exchange)),
                Some(Slot::Draining) => None,
                None => break,
            };

            let status = match front {
                Some(exchange) => {
                    let mut rr = lock(&exchange);
                    self.parser
                        .parse(&mut self.recv_buf, Some(&mut *rr), &self.throttler, eof)?
                }
                None => self
                    .parser
                    .parse(&mut self.recv_buf, None, &self.throttler, eof)?,
            };

            match status {
                ParseStatus::NeedMore => break,
                ParseStatus::Detach => {
                    tracing::debug!("response no longer needed, draining");
                    if let Some(slot) = self.queue.front_mut() {
                        *slot = Slot::Draining;
                    }
                }
                ParseStatus::Complete => {
                    if let Some(status) = self.retire(eof)? {
                        return Ok(Some(status));
                    }
                    // A retired response may unblock the send side.
                    if self.send_state != SendState::Idle {
                        return Ok(Some(DriveStatus::Continue));
                    }
                }
            }
        }

        if self.queue.is_empty() && !self.recv_buf.is_empty() {
            tracing::error!(len = self.recv_buf.len(), "Malformed response: Server sent too much data");
            return Err(NetError::ExcessResponseData);
        }
        Ok(None)
    }

    /// Pop the completed front response and decide the fate of the
    /// connection.
    fn retire(&mut self, eof: bool) -> Result<Option<DriveStatus>, NetError> {
        tracing::debug!("Finished a response");
        self.queue.pop_front();
        self.send_pos = self.send_pos.checked_sub(1).ok_or_else(|| {
            tracing::warn!("response completed for a request that was never sent");
            NetError::Unexpected
        })?;

        let keep_alive = self.parser.keep_alive() && !eof;
        if !keep_alive {
            if !self.recv_buf.is_empty() {
                tracing::error!(len = self.recv_buf.len(), "Malformed response: Server sent too much data");
                return Err(NetError::ExcessResponseData);
            }
            self.transport.reset();
        }
        self.parser.reset();

        if self.queue.is_empty() {
            tracing::debug!("Done reading last response");
            if !self.recv_buf.is_empty() {
                tracing::error!(len = self.recv_buf.len(), "Malformed response: Server sent too much data");
                return Err(NetError::ExcessResponseData);
            }
            self.send_state = SendState::Idle;
            return Ok(Some(DriveStatus::Done));
        }

        if !keep_alive {
            tracing::debug!(remaining = self.queue.len(), "connection closed, resending remaining requests");
            self.send_pos = 0;
            self.send_state = SendState::Init;
            self.send_buf.clear();
            self.body_remaining = 0;
            return Ok(Some(DriveStatus::Continue));
        }
        Ok(None)
    }

    /// With nothing queued, any readability means the server closed the
    /// connection or sent something it should not have. Either way the
    /// connection is no longer reusable.
    fn check_idle_connection(&mut self) {
        if !self.transport.is_connected() {
            return;
        }
        let mut byte = [0u8; 1];
        match self.transport.read(&mut byte) {
            Ok(0) => {
                tracing::debug!("Idle socket got closed");
                self.transport.reset();
            }
            Ok(_) => {
                tracing::warn!(error = %NetError::DataReceivedUnexpectedly, "Received data on idle connection");
                self.transport.reset();
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {}
            Err(e) => {
                tracing::debug!(error = %e, "Idle socket failed");
                self.transport.reset();
            }
        }
    }

    /// Drop the connection and everything in flight. Handles held by the
    /// caller keep whatever flags were reached.
    pub fn abort(&mut self, reason: NetError) {
        tracing::debug!(error = %reason, pending = self.queue.len(), "aborting pipeline");
        self.transport.reset();
        self.queue.clear();
        self.send_pos = 0;
        self.send_state = SendState::Idle;
        self.send_buf.clear();
        self.body_remaining = 0;
        self.recv_buf.clear();
        self.parser.reset();
        self.wake_at = None;
        self.nudged = false;
    }

    /// Whether every queued exchange has been retired.
    pub fn is_complete(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn send_state(&self) -> SendState {
        self.send_state
    }

    /// When suspended on a backoff, the instant to drive again at.
    pub fn next_wakeup(&self) -> Option<Instant> {
        self.wake_at
    }

    /// Transport readiness that would let the pipeline progress.
    pub fn interest(&self) -> Interest {
        let connected = self.transport.is_connected();
        Interest {
            readable: connected,
            writable: self.nudged
                || (connected
                    && (!self.send_buf.is_empty()
                        || matches!(
                            self.send_state,
                            SendState::SendingHeader | SendState::SendingBody
                        ))),
        }
    }

    pub fn load_state(&self) -> LoadState {
        if self.queue.is_empty() {
            return LoadState::Idle;
        }
        if self.wake_at.is_some() {
            return LoadState::WaitingForBackoff;
        }
        match self.send_state {
            SendState::WaitBeforeSend => LoadState::WaitingForAvailableSocket,
            SendState::WaitConnect => LoadState::Connecting,
            SendState::Init if self.send_pos == 0 => LoadState::Connecting,
            SendState::SendingHeader | SendState::SendingBody => LoadState::SendingRequest,
            _ => match self.queue.front() {
                Some(Slot::Active(exchange)) if !lock(exchange).response.flags.got_header => {
                    LoadState::WaitingForResponse
                }
                _ => LoadState::ReadingResponse,
            },
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn throttler(&self) -> &Arc<RequestThrottler> {
        &self.throttler
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}

/// Whether a pair leaves the connection open for the next request. Before
/// the response headers arrive only the request's intent is known.
fn negotiated_keep_alive(rr: &RequestResponse) -> bool {
    if rr.response.flags.got_header {
        rr.request.keep_alive() && rr.response.keep_alive()
    } else {
        rr.request.keep_alive()
    }
}
