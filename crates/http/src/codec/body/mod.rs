//! HTTP body framing for requests and responses.
//!
//! # Components
//!
//! ## Decoders
//! - [`PayloadDecoder`]: dispatches to the framing mode of the request:
//!   content-length, chunked (with trailers), upgrade tunnel or no body
//! - [`Framing`]: selects that mode from the request head
//!
//! ## Encoders
//! - [`PayloadEncoder`]: frames response bodies as raw bytes of a known
//!   length, chunks, or an unframed tunnel

mod chunked_decoder;
mod chunked_encoder;
mod length_decoder;
mod length_encoder;
mod payload_decoder;
mod payload_encoder;
mod upgrade_decoder;

pub use payload_decoder::{Framing, PayloadDecoder};
pub use payload_encoder::PayloadEncoder;

use crate::config::ServerLimits;

/// Limits applied while decoding one request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyLimits {
    /// Bytes consumed by the body, chunk framing included. `None` is unlimited.
    pub max_body_size: Option<u64>,
    /// Header bytes left over by the request head, available to chunked trailers.
    pub trailer_budget: usize,
    /// Header lines left over by the request head, available to chunked trailers.
    pub max_trailer_count: usize,
    pub show_details: bool,
}

impl BodyLimits {
    pub fn from_limits(limits: &ServerLimits, show_details: bool) -> Self {
        Self {
            max_body_size: limits.max_request_body_size,
            trailer_budget: limits.max_request_headers_total_size,
            max_trailer_count: limits.max_request_header_count,
            show_details,
        }
    }
}

impl Default for BodyLimits {
    fn default() -> Self {
        Self::from_limits(&ServerLimits::default(), false)
    }
}
