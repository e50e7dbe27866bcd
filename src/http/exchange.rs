//! Request/response pairs shared between the caller and the pipeline.

use crate::http::request::HttpRequest;
use crate::http::response::HttpResponse;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug)]
pub struct RequestResponse {
    pub request: HttpRequest,
    pub response: HttpResponse,
}

/// Handle to a pair. The caller keeps a clone to inspect the result.
pub type SharedExchange = Arc<Mutex<RequestResponse>>;

impl RequestResponse {
    pub fn new(request: HttpRequest, response: HttpResponse) -> Self {
        Self { request, response }
    }

    pub fn shared(self) -> SharedExchange {
        Arc::new(Mutex::new(self))
    }

    /// The full response, body included, has been received.
    pub fn is_complete(&self) -> bool {
        self.response.flags.got_body
    }
}

/// Lock a shared pair, recovering from a poisoned mutex. A sink that
/// panicked leaves the pair readable.
pub fn lock(exchange: &SharedExchange) -> MutexGuard<'_, RequestResponse> {
    exchange.lock().unwrap_or_else(|e| e.into_inner())
}
