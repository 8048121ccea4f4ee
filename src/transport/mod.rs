//! HTTP transport boundary.
//!
//! The pipeline consumes the transport through a single capability:
//! `execute(request) -> Result<Response, TransportError>`. A response with a
//! non-2xx status is a *successful* transport call; classification of
//! error-range statuses belongs to the pipeline.

mod http_transport;

pub use http_transport::{ReqwestTransport, Transport};
