//! HTTP/1.x codec: request decoding and response encoding.
//!
//! The codec is a set of `tokio_util` [`Decoder`](tokio_util::codec::Decoder)
//! and [`Encoder`](tokio_util::codec::Encoder) implementations driven by the
//! connection, so partial reads simply surface as `Ok(None)` until more bytes
//! arrive.
//!
//! - Request side:
//!   - [`RequestDecoder`]: the per-request parse state machine
//!     (request pending, request line, headers, body)
//!   - [`parser`]: the request-line and header-line grammar
//!   - body decoders selected by [`Framing`]
//!
//! - Response side:
//!   - [`ResponseEncoder`]: head via [`HeadEncoder`], then the body framed as
//!     fixed length, chunked, raw tunnel or nothing
//!
//! # Example
//!
//! ```
//! use bytes::BytesMut;
//! use micro_h1::codec::RequestDecoder;
//! use micro_h1::protocol::Message;
//! use tokio_util::codec::Decoder;
//!
//! let mut decoder = RequestDecoder::new();
//! let mut buffer = BytesMut::from(&b"GET /index.html HTTP/1.1\r\nHost: example.com\r\n\r\n"[..]);
//! match decoder.decode(&mut buffer) {
//!     Ok(Some(Message::Header((head, _payload_size)))) => assert_eq!(head.uri().path(), "/index.html"),
//!     _ => unreachable!(),
//! }
//! ```

mod body;
mod header;
pub mod parser;
mod request_decoder;
mod response_encoder;

pub use body::{BodyLimits, Framing, PayloadDecoder, PayloadEncoder};
pub use header::HeadEncoder;
pub(crate) use header::FastWrite;
pub(crate) use parser::chars::is_token_char;
pub use parser::{HeadersHandler, Status};
pub use request_decoder::{ProcessingState, RequestDecoder};
pub use response_encoder::ResponseEncoder;
