//! # pipenet
//!
//! A non-blocking HTTP/1.1 request pipelining engine.
//!
//! `pipenet` writes queued requests back to back over one connection and
//! reads the responses in order, decoding fixed-length, chunked and
//! read-until-close bodies incrementally as bytes arrive.
//!
//! ## Features
//!
//! - **Pipelining**: Requests are sent ahead of earlier responses when the
//!   connection will stay open, and re-sent on a fresh connection when it
//!   does not
//! - **Incremental parsing**: Works with reads of any size, down to a byte
//! - **Streaming**: Request bodies are pulled from a source in chunks and
//!   response bodies pushed to a sink
//! - **Backoff**: `Retry-After` on error responses suspends later requests to
//!   the same host through a shared throttler
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pipenet::client::PipelineClient;
//! use pipenet::http::{CollectSink, HttpRequest, HttpResponse, RequestResponse};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut client = PipelineClient::new();
//!     let sink = CollectSink::new();
//!     let exchange = RequestResponse::new(
//!         HttpRequest::get("http://example.com/").unwrap(),
//!         HttpResponse::with_sink(sink.clone()),
//!     )
//!     .shared();
//!     client.enqueue(exchange.clone());
//!     client.run().await.unwrap();
//!     println!("Status: {}", exchange.lock().unwrap().response.code());
//! }
//! ```
//!
//! ## Modules
//!
//! - [`base`] - Error codes, IO error mapping and load states
//! - [`http`] - Requests, responses, the parser and the pipeline itself
//! - [`socket`] - The transport seam, TCP and scripted transports
//! - [`client`] - Tokio driver for a pipeline over TCP

pub mod base;
pub mod client;
pub mod http;
pub mod socket;
