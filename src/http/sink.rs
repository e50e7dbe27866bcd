//! Response delivery callbacks.

use crate::http::request::HttpRequest;
use crate::http::response::HttpResponse;
use bytes::{Bytes, BytesMut};
use std::sync::{Arc, Mutex};

/// What to do once a response's headers are complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderAction {
    /// Deliver the body normally.
    Continue,
    /// The caller has what it needs. The body is still read off the
    /// connection but no longer delivered.
    Stop,
    /// Fail the exchange without reading the body.
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataAction {
    Continue,
    /// Fail the exchange with [`NetError::Aborted`](crate::base::neterror::NetError::Aborted).
    Abort,
}

/// Receives a response as it is parsed off the wire.
pub trait ResponseSink: Send {
    fn on_header(&mut self, _request: &HttpRequest, _response: &HttpResponse) -> HeaderAction {
        HeaderAction::Continue
    }

    /// Body bytes of a successful response, or of any response when
    /// [`wants_error_body`](Self::wants_error_body) is false.
    fn on_data(&mut self, data: &[u8]) -> DataAction;

    /// Route non-2xx bodies to [`on_error_data`](Self::on_error_data).
    fn wants_error_body(&self) -> bool {
        false
    }

    fn on_error_data(&mut self, _data: &[u8]) -> DataAction {
        DataAction::Continue
    }
}

#[derive(Debug, Default)]
struct Collected {
    body: BytesMut,
    error_body: bool,
}

/// Accumulates the response body into memory.
///
/// Clones share the same buffer: hand one to the response and keep one to
/// read the result.
#[derive(Debug, Clone, Default)]
pub struct CollectSink {
    inner: Arc<Mutex<Collected>>,
    collect_error_body: bool,
}

impl CollectSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also collect bodies of non-2xx responses, flagged as error bodies.
    pub fn with_error_body() -> Self {
        Self {
            inner: Arc::default(),
            collect_error_body: true,
        }
    }

    pub fn body(&self) -> Bytes {
        Bytes::copy_from_slice(&self.lock().body)
    }

    pub fn len(&self) -> usize {
        self.lock().body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the collected bytes came from a non-2xx response.
    pub fn is_error_body(&self) -> bool {
        self.lock().error_body
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Collected> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ResponseSink for CollectSink {
    fn on_data(&mut self, data: &[u8]) -> DataAction {
        self.lock().body.extend_from_slice(data);
        DataAction::Continue
    }

    fn wants_error_body(&self) -> bool {
        self.collect_error_body
    }

    fn on_error_data(&mut self, data: &[u8]) -> DataAction {
        let mut collected = self.lock();
        collected.error_body = true;
        collected.body.extend_from_slice(data);
        DataAction::Continue
    }
}
