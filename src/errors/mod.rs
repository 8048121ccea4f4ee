//! Error taxonomy for the resilience pipeline.
//!
//! Every outward-facing operation returns an [`Outcome`](crate::types::Outcome)
//! value; no panic or raw transport error crosses the client facade boundary
//! for expected failure modes.

mod error;

pub use error::{PipelineError, PipelineResult, TransportError};
