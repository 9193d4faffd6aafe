//! Connection handling.
//!
//! - [`HttpConnection`]: the per-connection loop, parsing requests, running
//!   the application and finalizing responses, with keep-alive reuse
//! - [`MessageReader`]: decoded request messages bounded by the connection's
//!   deadlines and cancellation signals
//! - [`OutputProducer`]: buffered, flush-coalescing writes to the transport
//! - [`TimeoutControl`] / [`TimeoutController`]: keep-alive, header, body read
//!   and write deadlines
//!
//! One task drives a connection. After a request head is parsed two flows
//! share that task: the application, and the body pump feeding the request
//! body from the transport. Neither runs on its own task, the connection
//! polls both until the response is written.

mod http_connection;
mod message_reader;
mod output;
mod timeout;

pub use http_connection::HttpConnection;
pub use message_reader::MessageReader;
pub use output::OutputProducer;
pub use timeout::{TimeoutAction, TimeoutControl, TimeoutController, TimeoutKind};

#[cfg(test)]
pub(crate) use timeout::MockTimeoutControl;
