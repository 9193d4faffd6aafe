//! Hand-rolled HTTP/1.x request-line and header parser.
//!
//! The parser walks borrowed byte slices and never keeps references past the
//! call, so the caller is free to split consumed bytes off its buffer between
//! calls. Every entry point reports exactly one of: progress with a complete
//! value, [`Status::Partial`] when more bytes are needed, or a typed
//! [`ParseError`](crate::protocol::ParseError).

pub(crate) mod chars;
mod header_lines;
mod request_line;
mod target;

pub use header_lines::{HeaderLines, HeadersHandler};
pub use request_line::{RequestLine, parse_request_line};
pub use target::{RequestTarget, TargetForm, normalize_path, remove_dot_segments};
pub(crate) use target::validate_host;

/// Outcome of feeding bytes to the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status<T> {
    /// The element is complete; `consumed` bytes belong to it.
    Complete { value: T, consumed: usize },
    /// More input is needed. The first `consumed` bytes may be discarded,
    /// the first `examined` bytes have been inspected.
    Partial { consumed: usize, examined: usize },
}
