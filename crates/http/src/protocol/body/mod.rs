//! Request and response body streaming.
//!
//! - [`ReqBody`]: the request body handed to the application, an
//!   `http_body::Body` reading from a bounded pipe
//! - [`BodySender`]: the pump feeding that pipe from the connection, created
//!   together with the body by [`body_channel`]
//! - [`ResponseStream`] / [`ResponseWriter`]: a channel-backed response body
//!   for applications that produce output incrementally
//!
//! The pump and the application run concurrently on the connection task:
//! the pump consumes the transport in step with the body framing, pausing on
//! a full pipe, and drains whatever the application leaves unread before the
//! connection is reused.

mod body_sender;
mod req_body;
mod response_stream;

pub use body_sender::{BodySender, body_channel};
pub use req_body::ReqBody;
pub use response_stream::{ResponseStream, ResponseWriter};
