//! Send side of the pipeline: request serialization and body streaming.

use crate::base::context::IoResultExt;
use crate::base::neterror::NetError;
use crate::http::exchange::{lock, SharedExchange};
use crate::http::pipeline::{DriveStatus, Pipeline, SendState, Slot};
use crate::socket::transport::{ConnectStatus, Transport};
use bytes::{Buf, BufMut};
use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Instant;

impl<T: Transport> Pipeline<T> {
    pub(super) fn send_step(&mut self) -> Result<DriveStatus, NetError> {
        if !self.flush()? {
            return Ok(DriveStatus::WouldBlock);
        }

        match self.send_state {
            SendState::Idle => Ok(DriveStatus::WouldBlock),
            SendState::Init => self.send_init(),
            SendState::WaitBeforeSend => {
                if self.send_pos > 0 {
                    return Ok(DriveStatus::WouldBlock);
                }
                self.send_state = SendState::Init;
                Ok(DriveStatus::Continue)
            }
            SendState::WaitConnect => self.send_connect(),
            SendState::SendingHeader => self.send_header(),
            SendState::SendingBody => self.send_body(),
        }
    }

    fn current(&self) -> Result<SharedExchange, NetError> {
        match self.queue.get(self.send_pos) {
            Some(Slot::Active(exchange)) => Ok(Arc::clone(exchange)),
            Some(Slot::Draining) | None => {
                tracing::warn!(
                    send_pos = self.send_pos,
                    len = self.queue.len(),
                    state = ?self.send_state,
                    "Bad state: no request at send position"
                );
                Err(NetError::Unexpected)
            }
        }
    }

    fn send_init(&mut self) -> Result<DriveStatus, NetError> {
        if self.send_pos >= self.queue.len() {
            self.send_state = SendState::Idle;
            return Ok(DriveStatus::Continue);
        }

        let exchange = self.current()?;
        let mut rr = lock(&exchange);

        let backoff = self.throttler.get_throttle(rr.request.host());
        if !backoff.is_zero() {
            if backoff >= self.config.backoff_notice_threshold() {
                tracing::info!(
                    host = %rr.request.host(),
                    secs = backoff.as_secs(),
                    "Server instructed us to wait before sending next request"
                );
            } else {
                tracing::debug!(host = %rr.request.host(), ms = backoff.as_millis() as u64, "backing off");
            }
            self.wake_at = Some(Instant::now() + backoff);
            return Ok(DriveStatus::WouldBlock);
        }
        self.wake_at = None;

        rr.request.reset()?;
        rr.response.reset();

        if rr.request.verb().is_empty() {
            tracing::warn!("No request verb");
            return Err(NetError::Unexpected);
        }

        let host = rr.request.host_header();
        let headers = rr.request.headers_mut();
        if !headers.contains("Host") {
            headers.set_unchecked("Host", &host);
        }
        if !headers.contains("Connection") {
            headers.set_unchecked("Connection", "close");
        }
        if !headers.contains("User-Agent") {
            headers.set_unchecked("User-Agent", &self.config.user_agent);
        }

        self.send_state = SendState::WaitConnect;
        Ok(DriveStatus::Continue)
    }

    fn send_connect(&mut self) -> Result<DriveStatus, NetError> {
        let exchange = self.current()?;
        let (host, port, use_tls) = {
            let rr = lock(&exchange);
            (
                rr.request.host().to_string(),
                rr.request.port(),
                rr.request.use_tls(),
            )
        };

        match self
            .transport
            .connect(&host, port, use_tls, self.send_pos == 0)?
        {
            ConnectStatus::Connected => {
                self.send_state = SendState::SendingHeader;
                Ok(DriveStatus::Continue)
            }
            ConnectStatus::Pending => Ok(DriveStatus::WouldBlock),
        }
    }

    fn send_header(&mut self) -> Result<DriveStatus, NetError> {
        let exchange = self.current()?;
        let mut rr = lock(&exchange);
        let request = &mut rr.request;

        match request.body_size() {
            Some(size) => request
                .headers_mut()
                .set_unchecked("Content-Length", &size.to_string()),
            None if matches!(request.verb(), "GET" | "HEAD" | "OPTIONS") => {
                request.headers_mut().remove("Content-Length")
            }
            None => request.headers_mut().set_unchecked("Content-Length", "0"),
        }

        self.body_remaining = match request.header("Content-Length") {
            Some(value) => value.trim().parse::<u64>().map_err(|_| {
                tracing::error!(value = %value, "Malformed request header: Invalid Content-Length");
                NetError::InvalidContentLength
            })?,
            None => 0,
        };

        let line = format!("{} {} HTTP/1.1", request.verb(), request.target());
        tracing::debug!("{}", line);
        self.send_buf.put_slice(line.as_bytes());
        self.send_buf.put_slice(b"\r\n");

        for (name, value) in request.headers().iter() {
            if name.eq_ignore_ascii_case("Authorization") {
                tracing::debug!("{}: {}", name, "*".repeat(value.len()));
            } else {
                tracing::debug!("{}: {}", name, value);
            }
            self.send_buf.put_slice(name.as_bytes());
            self.send_buf.put_slice(b": ");
            self.send_buf.put_slice(value.as_bytes());
            self.send_buf.put_slice(b"\r\n");
        }
        self.send_buf.put_slice(b"\r\n");
        request.flags.header_sent = true;

        match request.body_size() {
            Some(size) => {
                tracing::debug!("Finished sending request header.");
                // Small-packet coalescing only hurts a large upload.
                if size > self.config.nodelay_threshold {
                    self.transport.set_nodelay(false);
                }
                self.send_state = SendState::SendingBody;
            }
            None => {
                tracing::debug!("Finished sending request header. Request has no body");
                let keep_alive = request.keep_alive();
                drop(rr);
                self.advance(keep_alive);
            }
        }

        self.flush()?;
        Ok(DriveStatus::Continue)
    }

    fn send_body(&mut self) -> Result<DriveStatus, NetError> {
        let exchange = self.current()?;

        loop {
            if !self.flush()? {
                return Ok(DriveStatus::WouldBlock);
            }
            if self.body_remaining == 0 {
                break;
            }

            let len = (self.config.send_chunk_size as u64).min(self.body_remaining) as usize;
            self.body_chunk.resize(len, 0);
            let filled = lock(&exchange)
                .request
                .fill_body(&mut self.body_chunk[..len])?;

            if filled > len {
                tracing::warn!(filled, requested = len, "request body returned too much data");
                return Err(NetError::UploadBodyOverrun);
            }
            if filled == 0 {
                tracing::error!(
                    remaining = self.body_remaining,
                    "request body ended before its declared size"
                );
                return Err(NetError::UploadFileChanged);
            }

            self.send_buf.put_slice(&self.body_chunk[..filled]);
            self.body_remaining -= filled as u64;
        }

        tracing::debug!("Finished sending request body");
        self.transport.set_nodelay(true);

        let keep_alive = {
            let mut rr = lock(&exchange);
            rr.request.flags.body_sent = true;
            rr.request.keep_alive()
        };
        self.advance(keep_alive);
        Ok(DriveStatus::Continue)
    }

    /// Move the send cursor past a fully serialized request.
    fn advance(&mut self, keep_alive: bool) {
        self.send_pos += 1;
        self.send_state = if self.send_pos >= self.queue.len() {
            SendState::Idle
        } else if !keep_alive {
            tracing::debug!(
                "Request did not ask for keep-alive. Waiting for response to finish before sending next request a new connection."
            );
            SendState::WaitBeforeSend
        } else {
            SendState::Init
        };
    }

    /// Write buffered bytes. Returns whether the buffer was fully drained.
    pub(super) fn flush(&mut self) -> Result<bool, NetError> {
        while !self.send_buf.is_empty() {
            match self.transport.write(&self.send_buf) {
                Ok(0) => {
                    tracing::error!("Could not write to socket: connection closed");
                    return Err(NetError::ConnectionClosed);
                }
                Ok(n) => self.send_buf.advance(n),
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(false),
                Err(e) => return Err(e).write_context(),
            }
        }
        Ok(true)
    }
}
