//! Incremental HTTP/1.x response parser.
//!
//! Bytes are fed from arbitrary-sized socket reads. The parser consumes what
//! it can from the front of the receive buffer and leaves partial lines in
//! place for the next call. Body bytes are handed to the response's sink as
//! soon as they are framed.

use crate::base::neterror::NetError;
use crate::http::exchange::RequestResponse;
use crate::http::response::HttpResponse;
use crate::http::retry::backoff_for_response;
use crate::http::sink::{DataAction, HeaderAction};
use crate::http::throttle::RequestThrottler;
use bytes::{Buf, BytesMut};
use std::time::Instant;
use time::OffsetDateTime;

/// Where the chunked decoder is within the current chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkPhase {
    /// Expecting a `hex-size[;ext]` line.
    Size,
    /// Inside chunk data.
    Data { remaining: u64 },
    /// Chunk data done, expecting exactly CRLF.
    Terminator,
    /// After the zero-size chunk, discarding trailer lines until a blank one.
    Trailers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer {
    Identity,
    Chunked(ChunkPhase),
}

/// Framing state of the response currently being read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadState {
    pub transfer: Transfer,
    /// Declared body length. `None` reads until EOF.
    pub content_length: Option<u64>,
    pub received: u64,
    /// Both sides agreed to keep the connection open.
    pub keep_alive: bool,
}

impl Default for ReadState {
    fn default() -> Self {
        Self {
            transfer: Transfer::Identity,
            content_length: None,
            received: 0,
            keep_alive: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStatus {
    /// Out of buffered bytes.
    NeedMore,
    /// The sink stopped caring. Keep parsing with no pair attached to drain
    /// the rest of the response.
    Detach,
    /// The response is complete. Unconsumed bytes belong to the next one.
    Complete,
}

enum HeaderStep {
    NeedMore,
    Body,
    Detach,
    Complete,
}

#[derive(Debug)]
pub struct ResponseParser {
    state: ReadState,
    max_line_length: usize,
}

impl ResponseParser {
    pub fn new(max_line_length: usize) -> Self {
        Self {
            state: ReadState::default(),
            max_line_length,
        }
    }

    pub fn read_state(&self) -> &ReadState {
        &self.state
    }

    pub fn keep_alive(&self) -> bool {
        self.state.keep_alive
    }

    /// Discard framing state before the next response.
    pub fn reset(&mut self) {
        self.state = ReadState::default();
    }

    /// Consume as much of `buf` as possible for the response at the front of
    /// the queue. `exchange` is `None` while draining a detached response.
    /// `eof` reports that the peer closed its side and no more bytes follow.
    pub fn parse(
        &mut self,
        buf: &mut BytesMut,
        mut exchange: Option<&mut RequestResponse>,
        throttler: &RequestThrottler,
        eof: bool,
    ) -> Result<ParseStatus, NetError> {
        if let Some(rr) = exchange.as_deref_mut() {
            if !rr.request.flags.header_sent {
                if !buf.is_empty() {
                    tracing::error!("Server sent data even before request headers were sent");
                    return Err(NetError::DataReceivedUnexpectedly);
                }
                if eof {
                    tracing::error!("Connection closed by server before request got sent");
                    return Err(NetError::SocketRemoteClosed);
                }
                return Ok(ParseStatus::NeedMore);
            }

            if !rr.response.flags.got_header {
                match self.parse_header(buf, rr, throttler)? {
                    HeaderStep::Body => {}
                    HeaderStep::Detach => return Ok(ParseStatus::Detach),
                    HeaderStep::Complete => return Ok(ParseStatus::Complete),
                    HeaderStep::NeedMore if eof => {
                        tracing::error!("Connection closed by server before headers got received");
                        return Err(if rr.response.flags.got_code {
                            NetError::ConnectionClosed
                        } else {
                            NetError::EmptyResponse
                        });
                    }
                    HeaderStep::NeedMore => return Ok(ParseStatus::NeedMore),
                }
            }
        }

        self.parse_body(buf, exchange, eof)
    }

    fn parse_header(
        &mut self,
        buf: &mut BytesMut,
        rr: &mut RequestResponse,
        throttler: &RequestThrottler,
    ) -> Result<HeaderStep, NetError> {
        loop {
            let line_len = match find_line(buf, NetError::InvalidResponse)? {
                Some(n) => n,
                None => {
                    if buf.len() >= self.max_line_length {
                        tracing::error!(len = buf.len(), "Too long header line");
                        return Err(NetError::ResponseHeadersTooBig);
                    }
                    return Ok(HeaderStep::NeedMore);
                }
            };

            if !rr.response.flags.got_code {
                parse_status_line(&buf[..line_len], &mut rr.response)?;
            } else if line_len == 0 {
                buf.advance(2);
                if rr.response.code() == 100 {
                    tracing::debug!("skipping 100 Continue");
                    rr.response.reset();
                    continue;
                }
                return self.complete_header(rr, throttler);
            } else {
                parse_header_line(&buf[..line_len], &mut rr.response)?;
            }
            buf.advance(line_len + 2);
        }
    }

    fn complete_header(
        &mut self,
        rr: &mut RequestResponse,
        throttler: &RequestThrottler,
    ) -> Result<HeaderStep, NetError> {
        let RequestResponse { request, response } = rr;

        response.flags.got_header = true;
        if request.verb() == "HEAD" || response.code_prohibits_body() {
            response.flags.no_body = true;
        }

        let te = response
            .header("Transfer-Encoding")
            .map(|v| v.trim().to_ascii_lowercase())
            .unwrap_or_default();
        self.state.transfer = match te.as_str() {
            "chunked" => Transfer::Chunked(ChunkPhase::Size),
            "" | "identity" => Transfer::Identity,
            other => {
                tracing::error!(transfer_encoding = %other, "Unknown transfer encoding");
                return Err(NetError::UnsupportedTransferEncoding);
            }
        };

        if let Some(backoff) = backoff_for_response(
            response.code(),
            response.header("Retry-After"),
            OffsetDateTime::now_utc(),
        ) {
            tracing::debug!(host = %request.host(), secs = backoff.as_secs(), "Got Retry-After");
            match Instant::now().checked_add(backoff) {
                Some(until) => throttler.throttle(request.host(), until),
                None => tracing::warn!(
                    host = %request.host(),
                    secs = backoff.as_secs(),
                    "Retry-After beyond clock range, ignoring"
                ),
            }
        }

        let length = match response.header("Content-Length") {
            Some(value) => Some(parse_content_length(value)?),
            None => None,
        };
        self.state.content_length = if response.flags.no_body {
            Some(0)
        } else {
            length
        };
        self.state.keep_alive = response.keep_alive() && request.keep_alive();

        let action = match response.take_sink() {
            Some(mut sink) => {
                let action = sink.on_header(request, response);
                response.restore_sink(Some(sink));
                action
            }
            None => HeaderAction::Continue,
        };
        match action {
            HeaderAction::Continue => {}
            HeaderAction::Stop => return Ok(HeaderStep::Detach),
            HeaderAction::Reject => {
                response.flags.ignore_body = true;
                tracing::debug!(code = response.code(), "response rejected by header callback");
                return Err(NetError::ResponseRejected);
            }
        }

        if self.state.content_length == Some(0) {
            response.flags.got_body = true;
            return Ok(HeaderStep::Complete);
        }
        Ok(HeaderStep::Body)
    }

    fn parse_body(
        &mut self,
        buf: &mut BytesMut,
        mut exchange: Option<&mut RequestResponse>,
        eof: bool,
    ) -> Result<ParseStatus, NetError> {
        if self.state.content_length == Some(self.state.received) {
            mark_body_received(exchange);
            return Ok(ParseStatus::Complete);
        }

        match self.state.transfer {
            Transfer::Chunked(_) => {
                let status = self.parse_chunked(buf, exchange)?;
                if status == ParseStatus::NeedMore && eof {
                    tracing::error!("Connection closed by server, chunk incomplete");
                    return Err(NetError::IncompleteChunkedEncoding);
                }
                Ok(status)
            }
            Transfer::Identity => {
                if !buf.is_empty() {
                    let mut size = buf.len();
                    if let Some(length) = self.state.content_length {
                        size = (size as u64).min(length - self.state.received) as usize;
                    }
                    let data = buf.split_to(size);
                    if self.process_data(&data, exchange.as_deref_mut())? {
                        return Ok(ParseStatus::Complete);
                    }
                }

                if eof {
                    if let Some(length) = self.state.content_length {
                        tracing::error!(
                            expected = length,
                            received = self.state.received,
                            "Connection closed by server, content length not reached"
                        );
                        return Err(NetError::ContentLengthMismatch);
                    }
                    mark_body_received(exchange);
                    return Ok(ParseStatus::Complete);
                }
                Ok(ParseStatus::NeedMore)
            }
        }
    }

    fn parse_chunked(
        &mut self,
        buf: &mut BytesMut,
        mut exchange: Option<&mut RequestResponse>,
    ) -> Result<ParseStatus, NetError> {
        loop {
            if buf.is_empty() {
                return Ok(ParseStatus::NeedMore);
            }

            let phase = match self.state.transfer {
                Transfer::Chunked(phase) => phase,
                Transfer::Identity => return Err(NetError::Unexpected),
            };

            if let ChunkPhase::Data { remaining } = phase {
                let n = (buf.len() as u64).min(remaining) as usize;
                let data = buf.split_to(n);
                let remaining = remaining - n as u64;
                self.state.transfer = Transfer::Chunked(if remaining == 0 {
                    ChunkPhase::Terminator
                } else {
                    ChunkPhase::Data { remaining }
                });
                if self.process_data(&data, exchange.as_deref_mut())? {
                    return Ok(ParseStatus::Complete);
                }
                continue;
            }

            if phase == ChunkPhase::Terminator && buf[0] != b'\r' {
                tracing::error!("Malformed chunk data: Chunk data improperly terminated");
                return Err(NetError::InvalidChunkedEncoding);
            }

            let line_len = match find_line(buf, NetError::InvalidChunkedEncoding)? {
                Some(n) => n,
                None => {
                    if buf.len() >= self.max_line_length {
                        tracing::error!("Malformed chunk data: Line length exceeded");
                        return Err(NetError::InvalidChunkedEncoding);
                    }
                    return Ok(ParseStatus::NeedMore);
                }
            };

            let next = match phase {
                ChunkPhase::Terminator => {
                    if line_len != 0 {
                        tracing::error!(
                            extra = line_len,
                            "Malformed chunk data: Chunk data improperly terminated"
                        );
                        return Err(NetError::InvalidChunkedEncoding);
                    }
                    ChunkPhase::Size
                }
                ChunkPhase::Trailers => {
                    if line_len == 0 {
                        buf.advance(2);
                        mark_body_received(exchange);
                        return Ok(ParseStatus::Complete);
                    }
                    ChunkPhase::Trailers
                }
                ChunkPhase::Size => match parse_chunk_size(&buf[..line_len])? {
                    0 => ChunkPhase::Trailers,
                    size => ChunkPhase::Data { remaining: size },
                },
                ChunkPhase::Data { .. } => return Err(NetError::Unexpected),
            };
            self.state.transfer = Transfer::Chunked(next);
            buf.advance(line_len + 2);
        }
    }

    /// Account for and deliver one framed range of body bytes. Returns
    /// whether the declared content length has been reached.
    fn process_data(
        &mut self,
        data: &[u8],
        exchange: Option<&mut RequestResponse>,
    ) -> Result<bool, NetError> {
        self.state.received += data.len() as u64;
        let complete = self.state.content_length == Some(self.state.received);

        if let Some(rr) = exchange {
            let response = &mut rr.response;
            if !response.flags.ignore_body {
                let success = response.success();
                if let Some(sink) = response.sink_mut() {
                    let action = if !success && sink.wants_error_body() {
                        sink.on_error_data(data)
                    } else {
                        sink.on_data(data)
                    };
                    if action == DataAction::Abort {
                        tracing::debug!("body delivery aborted by sink");
                        return Err(NetError::Aborted);
                    }
                }
            }
            if complete {
                response.flags.got_body = true;
            }
        }
        Ok(complete)
    }
}

fn mark_body_received(exchange: Option<&mut RequestResponse>) {
    if let Some(rr) = exchange {
        rr.response.flags.got_body = true;
    }
}

/// Length of the next CRLF-terminated line, excluding the terminator.
/// A bare CR, a bare LF or a NUL byte is fatal.
fn find_line(buf: &[u8], error: NetError) -> Result<Option<usize>, NetError> {
    let mut i = 0;
    while i + 1 < buf.len() {
        match buf[i] {
            b'\r' if buf[i + 1] == b'\n' => return Ok(Some(i)),
            b'\r' | b'\n' => {
                tracing::error!("Malformed response: Server not sending proper line endings");
                return Err(error);
            }
            0 => {
                tracing::error!("Malformed response: Null character in line");
                return Err(error);
            }
            _ => i += 1,
        }
    }
    Ok(None)
}

/// `HTTP/1.<digit> <3-digit code>[ reason]`, parsed positionally.
fn parse_status_line(line: &[u8], response: &mut HttpResponse) -> Result<(), NetError> {
    tracing::debug!(line = %String::from_utf8_lossy(line), "response status");

    if line.len() < 12
        || !line.starts_with(b"HTTP/1.")
        || !line[7].is_ascii_digit()
        || line[8] != b' '
        || (line.len() > 12 && line[12] != b' ')
    {
        tracing::error!("Invalid HTTP Response");
        return Err(NetError::InvalidHttpResponse);
    }

    let digits = &line[9..12];
    if !(b'1'..=b'5').contains(&digits[0])
        || !digits[1].is_ascii_digit()
        || !digits[2].is_ascii_digit()
    {
        tracing::error!("Invalid response code");
        return Err(NetError::InvalidHttpResponse);
    }
    let code = digits
        .iter()
        .fold(0u16, |acc, d| acc * 10 + u16::from(d - b'0'));

    let reason = String::from_utf8_lossy(&line[12..]);
    response.set_status(line[7] - b'0', code, reason.trim());
    Ok(())
}

fn parse_header_line(line: &[u8], response: &mut HttpResponse) -> Result<(), NetError> {
    let line = String::from_utf8_lossy(line);
    tracing::debug!(line = %line, "response header");

    let colon = match line.find(':') {
        Some(pos) if pos > 0 => pos,
        _ => {
            tracing::error!("Malformed response header: Invalid line");
            return Err(NetError::InvalidResponse);
        }
    };
    let value = line[colon + 1..].trim_matches(|c| c == ' ' || c == '\t');
    response.headers_mut().merge(&line[..colon], value);
    Ok(())
}

fn parse_content_length(value: &str) -> Result<u64, NetError> {
    let value = value.trim();
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        tracing::error!(value = %value, "Malformed response header: Invalid Content-Length");
        return Err(NetError::InvalidContentLength);
    }
    value.parse().map_err(|_| {
        tracing::error!(value = %value, "Malformed response header: Invalid Content-Length");
        NetError::InvalidContentLength
    })
}

/// Hex size, optional whitespace, then an optional `;extension`. Anything
/// else after the digits is malformed.
fn parse_chunk_size(line: &[u8]) -> Result<u64, NetError> {
    let size_part = match line.iter().position(|&b| b == b';') {
        Some(pos) => &line[..pos],
        None => line,
    };
    let end = size_part
        .iter()
        .rposition(|&b| !matches!(b, b' ' | b'\t'))
        .map_or(0, |pos| pos + 1);
    let digits = &size_part[..end];
    if digits.is_empty() {
        tracing::error!("Malformed chunk data: Invalid chunk size");
        return Err(NetError::InvalidChunkedEncoding);
    }

    let mut size: u64 = 0;
    for &b in digits {
        let nibble = match b {
            b'0'..=b'9' => b - b'0',
            b'a'..=b'f' => b - b'a' + 10,
            b'A'..=b'F' => b - b'A' + 10,
            _ => {
                tracing::error!("Malformed chunk data: Invalid chunk size");
                return Err(NetError::InvalidChunkedEncoding);
            }
        };
        size = size
            .checked_mul(16)
            .and_then(|s| s.checked_add(u64::from(nibble)))
            .ok_or_else(|| {
                tracing::error!("Malformed chunk data: Chunk size overflow");
                NetError::InvalidChunkedEncoding
            })?;
    }
    Ok(size)
}
