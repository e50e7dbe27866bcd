//! Outgoing HTTP/1.1 request.

use crate::base::neterror::NetError;
use crate::http::orderedheaders::OrderedHeaderMap;
use crate::http::requestbody::BodySource;
use std::fmt;
use url::{Position, Url};

/// Transmission progress of a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestFlags {
    pub header_sent: bool,
    pub body_sent: bool,
}

pub struct HttpRequest {
    verb: String,
    url: Url,
    headers: OrderedHeaderMap,
    body: Option<Box<dyn BodySource>>,
    body_dirty: bool,
    pub(crate) flags: RequestFlags,
}

impl HttpRequest {
    /// Create a request for `url`. Only `http` and `https` URLs with a host
    /// are accepted.
    pub fn new(verb: &str, url: &str) -> Result<Self, NetError> {
        let url = Url::parse(url).map_err(|e| {
            tracing::warn!(url = %url, error = %e, "invalid request URL");
            NetError::InvalidUrl
        })?;
        Self::from_url(verb, url)
    }

    pub fn from_url(verb: &str, url: Url) -> Result<Self, NetError> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(NetError::DisallowedUrlScheme);
        }
        if url.host_str().map_or(true, str::is_empty) {
            return Err(NetError::InvalidUrl);
        }

        let mut request = Self {
            verb: String::new(),
            url,
            headers: OrderedHeaderMap::new(),
            body: None,
            body_dirty: false,
            flags: RequestFlags::default(),
        };
        request.set_verb(verb)?;
        Ok(request)
    }

    pub fn get(url: &str) -> Result<Self, NetError> {
        Self::new("GET", url)
    }

    /// Set the request method. An empty verb is accepted here but the
    /// request cannot be transmitted until one is set.
    pub fn set_verb(&mut self, verb: &str) -> Result<(), NetError> {
        if !verb.is_empty() && http::Method::from_bytes(verb.as_bytes()).is_err() {
            tracing::warn!(verb = %verb, "invalid request method");
            return Err(NetError::InvalidArgument);
        }
        self.verb = verb.to_string();
        Ok(())
    }

    /// Set a request header, replacing any previous value.
    ///
    /// `Content-Length` is derived from the body and cannot be set once a
    /// body is attached.
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<(), NetError> {
        if self.body.is_some() && name.eq_ignore_ascii_case("Content-Length") {
            tracing::warn!("Content-Length is derived from the attached body");
            return Err(NetError::InvalidArgument);
        }
        self.headers.insert(name, value)
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, NetError> {
        self.set_header(name, value)?;
        Ok(self)
    }

    pub fn remove_header(&mut self, name: &str) {
        self.headers.remove(name);
    }

    /// Attach a body. Any caller-set `Content-Length` is discarded.
    pub fn set_body(&mut self, body: impl BodySource + 'static) {
        self.headers.remove("Content-Length");
        self.body = Some(Box::new(body));
        self.body_dirty = false;
    }

    pub fn with_body(mut self, body: impl BodySource + 'static) -> Self {
        self.set_body(body);
        self
    }

    pub fn verb(&self) -> &str {
        &self.verb
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &OrderedHeaderMap {
        &self.headers
    }

    pub(crate) fn headers_mut(&mut self) -> &mut OrderedHeaderMap {
        &mut self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn flags(&self) -> RequestFlags {
        self.flags
    }

    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    pub fn body_size(&self) -> Option<u64> {
        self.body.as_ref().map(|b| b.size())
    }

    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    /// Port to connect to, defaulting by scheme.
    pub fn port(&self) -> u16 {
        self.url.port_or_known_default().unwrap_or(80)
    }

    pub fn use_tls(&self) -> bool {
        self.url.scheme() == "https"
    }

    /// Request target in origin-form: path plus query.
    pub fn target(&self) -> &str {
        &self.url[Position::BeforePath..Position::AfterQuery]
    }

    /// `Host` header value. The port is included only when the URL names a
    /// non-default one.
    pub fn host_header(&self) -> String {
        match self.url.port() {
            Some(port) => format!("{}:{}", self.host(), port),
            None => self.host().to_string(),
        }
    }

    /// Keep-alive is opt-in: the request must carry `Connection: keep-alive`.
    pub fn keep_alive(&self) -> bool {
        self.headers.has_token("Connection", "keep-alive")
    }

    pub(crate) fn fill_body(&mut self, buf: &mut [u8]) -> Result<usize, NetError> {
        let body = self.body.as_mut().ok_or(NetError::Unexpected)?;
        self.body_dirty = true;
        body.fill(buf)
    }

    /// Clear transmission flags and rewind the body so the request can be
    /// (re)sent from the first byte.
    pub(crate) fn reset(&mut self) -> Result<(), NetError> {
        self.flags = RequestFlags::default();
        if self.body_dirty {
            if let Some(body) = self.body.as_mut() {
                body.rewind()?;
            }
            self.body_dirty = false;
        }
        Ok(())
    }
}

impl fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpRequest")
            .field("verb", &self.verb)
            .field("url", &self.url.as_str())
            .field("headers", &self.headers)
            .field("body_size", &self.body_size())
            .field("flags", &self.flags)
            .finish()
    }
}
