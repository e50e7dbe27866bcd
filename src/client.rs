//! Async driver for a pipeline over TCP.
//!
//! The pipeline itself never waits. This driver runs it on tokio: it
//! completes connects the pipeline asked for, then sleeps until the socket
//! is ready or a backoff expires, and drives again.
//!
//! # Example
//!
//! ```rust,ignore
//! use pipenet::client::PipelineClient;
//! use pipenet::http::{CollectSink, HttpRequest, HttpResponse, RequestResponse};
//!
//! let mut client = PipelineClient::new();
//! let sink = CollectSink::new();
//! let exchange = RequestResponse::new(
//!     HttpRequest::get("http://example.com/")?,
//!     HttpResponse::with_sink(sink.clone()),
//! )
//! .shared();
//! client.enqueue(exchange.clone());
//! client.run().await?;
//! println!("{} bytes", sink.len());
//! ```

use crate::base::context::map_io_error;
use crate::base::neterror::NetError;
use crate::http::config::PipelineConfig;
use crate::http::exchange::SharedExchange;
use crate::http::pipeline::{DriveStatus, Pipeline};
use crate::http::throttle::RequestThrottler;
use crate::socket::tcp::{self, TcpTransport};
use crate::socket::transport::Interest;
use std::sync::Arc;
use tokio::time::Instant;

pub struct PipelineClient {
    pipeline: Pipeline<TcpTransport>,
}

impl Default for PipelineClient {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineClient {
    /// Client with its own throttler and default settings.
    pub fn new() -> Self {
        Self::with_config(Arc::new(RequestThrottler::new()), PipelineConfig::default())
    }

    /// Client sharing `throttler` with other pipelines.
    pub fn with_config(throttler: Arc<RequestThrottler>, config: PipelineConfig) -> Self {
        Self {
            pipeline: Pipeline::with_config(TcpTransport::new(), throttler, config),
        }
    }

    pub fn enqueue(&mut self, exchange: SharedExchange) {
        self.pipeline.enqueue(exchange);
    }

    pub fn pipeline(&self) -> &Pipeline<TcpTransport> {
        &self.pipeline
    }

    pub fn pipeline_mut(&mut self) -> &mut Pipeline<TcpTransport> {
        &mut self.pipeline
    }

    /// Drive until every queued exchange has completed.
    ///
    /// On error the queue has already been cleared. Exchanges held by the
    /// caller keep whatever progress flags they reached.
    pub async fn run(&mut self) -> Result<(), NetError> {
        loop {
            match self.pipeline.drive()? {
                DriveStatus::Continue => continue,
                DriveStatus::Done => return Ok(()),
                DriveStatus::WouldBlock => {
                    if let Err(e) = self.wait().await {
                        self.pipeline.abort(e);
                        return Err(e);
                    }
                }
            }
        }
    }

    async fn wait(&mut self) -> Result<(), NetError> {
        if let Some(target) = self.pipeline.transport_mut().take_pending_connect() {
            let timeout = self.pipeline.config().connect_timeout();
            let stream = tcp::open(&target, timeout).await?;
            tracing::debug!(target = %target, "connected");
            self.pipeline.transport_mut().attach(stream, target);
            return Ok(());
        }

        let wake = self.pipeline.next_wakeup().map(Instant::from_std);
        let interest = tokio_interest(self.pipeline.interest());
        let stream = self.pipeline.transport().stream();

        match (stream.zip(interest), wake) {
            (Some((stream, interest)), Some(at)) => {
                tokio::select! {
                    ready = stream.ready(interest) => {
                        ready.map_err(|e| map_io_error(&e))?;
                    }
                    _ = tokio::time::sleep_until(at) => {}
                }
            }
            (Some((stream, interest)), None) => {
                stream.ready(interest).await.map_err(|e| map_io_error(&e))?;
            }
            (None, Some(at)) => tokio::time::sleep_until(at).await,
            (None, None) => {
                tracing::warn!(
                    state = ?self.pipeline.send_state(),
                    pending = self.pipeline.len(),
                    "pipeline blocked with nothing to wait on"
                );
                return Err(NetError::Unexpected);
            }
        }
        Ok(())
    }
}

fn tokio_interest(interest: Interest) -> Option<tokio::io::Interest> {
    match (interest.readable, interest.writable) {
        (true, true) => Some(tokio::io::Interest::READABLE | tokio::io::Interest::WRITABLE),
        (true, false) => Some(tokio::io::Interest::READABLE),
        (false, true) => Some(tokio::io::Interest::WRITABLE),
        (false, false) => None,
    }
}
