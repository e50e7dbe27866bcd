pub mod config;
pub mod exchange;
pub mod orderedheaders;
pub mod parser;
pub mod pipeline;
pub mod request;
pub mod requestbody;
pub mod response;
pub mod retry;
mod sender;
pub mod sink;
pub mod throttle;

// Re-exports for convenience
pub use config::PipelineConfig;
pub use exchange::{RequestResponse, SharedExchange};
pub use orderedheaders::OrderedHeaderMap;
pub use pipeline::{DriveStatus, Pipeline, SendState};
pub use request::HttpRequest;
pub use requestbody::{BodySource, BytesBody, FileBody};
pub use response::HttpResponse;
pub use sink::{CollectSink, DataAction, HeaderAction, ResponseSink};
pub use throttle::RequestThrottler;
