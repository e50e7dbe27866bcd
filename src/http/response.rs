//! Incoming HTTP/1.x response, filled in by the parser.

use crate::http::orderedheaders::OrderedHeaderMap;
use crate::http::sink::ResponseSink;
use http::{StatusCode, Version};
use std::fmt;

/// Parse progress of a response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResponseFlags {
    pub got_code: bool,
    pub got_header: bool,
    pub got_body: bool,
    /// Framing is forced to zero length (HEAD, 1xx, 204, 304).
    pub no_body: bool,
    /// Body bytes are read but not delivered.
    pub ignore_body: bool,
}

#[derive(Default)]
pub struct HttpResponse {
    code: u16,
    reason: String,
    minor_version: u8,
    headers: OrderedHeaderMap,
    pub(crate) flags: ResponseFlags,
    sink: Option<Box<dyn ResponseSink>>,
}

impl HttpResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(sink: impl ResponseSink + 'static) -> Self {
        Self {
            sink: Some(Box::new(sink)),
            ..Self::default()
        }
    }

    pub fn set_sink(&mut self, sink: impl ResponseSink + 'static) {
        self.sink = Some(Box::new(sink));
    }

    /// Status code, or 0 before the status line was received.
    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn status(&self) -> Option<StatusCode> {
        StatusCode::from_u16(self.code).ok()
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn version(&self) -> Version {
        if self.minor_version == 0 {
            Version::HTTP_10
        } else {
            Version::HTTP_11
        }
    }

    pub fn headers(&self) -> &OrderedHeaderMap {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn flags(&self) -> ResponseFlags {
        self.flags
    }

    pub fn success(&self) -> bool {
        (200..300).contains(&self.code)
    }

    pub fn code_prohibits_body(&self) -> bool {
        (100..200).contains(&self.code) || self.code == 204 || self.code == 304
    }

    /// Whether the server is willing to keep the connection open.
    /// HTTP/1.0 requires an explicit `Connection: keep-alive`; HTTP/1.1
    /// keeps it unless told `Connection: close`.
    pub fn keep_alive(&self) -> bool {
        if !self.flags.got_header {
            return false;
        }
        if self.headers.has_token("Connection", "close") {
            return false;
        }
        if self.minor_version == 0 {
            return self.headers.has_token("Connection", "keep-alive");
        }
        true
    }

    pub(crate) fn set_status(&mut self, minor_version: u8, code: u16, reason: &str) {
        self.minor_version = minor_version;
        self.code = code;
        self.reason = reason.to_string();
        self.flags.got_code = true;
    }

    pub(crate) fn headers_mut(&mut self) -> &mut OrderedHeaderMap {
        &mut self.headers
    }

    pub(crate) fn sink_mut(&mut self) -> Option<&mut (dyn ResponseSink + 'static)> {
        self.sink.as_deref_mut()
    }

    pub(crate) fn take_sink(&mut self) -> Option<Box<dyn ResponseSink>> {
        self.sink.take()
    }

    pub(crate) fn restore_sink(&mut self, sink: Option<Box<dyn ResponseSink>>) {
        self.sink = sink;
    }

    /// Forget everything received so far. The sink is kept.
    pub(crate) fn reset(&mut self) {
        self.flags = ResponseFlags::default();
        self.code = 0;
        self.minor_version = 0;
        self.reason.clear();
        self.headers.clear();
    }
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("code", &self.code)
            .field("reason", &self.reason)
            .field("version", &self.version())
            .field("headers", &self.headers)
            .field("flags", &self.flags)
            .field("sink", &self.sink.is_some())
            .finish()
    }
}
