//! The HTTP/1.x connection core of an asynchronous server.
//!
//! `micro_h1` takes a byte stream (anything `AsyncRead` + `AsyncWrite`) and
//! turns it into a sequence of request/response exchanges with an
//! application: it parses request heads with strict validation, frames
//! request bodies (content-length, chunked with trailers, upgrade tunnels),
//! streams them to the application with backpressure, frames the response
//! and decides whether the connection can be reused.
//!
//! # Example
//!
//! ```no_run
//! use std::error::Error;
//! use std::sync::Arc;
//!
//! use http::{Request, Response};
//! use http_body_util::BodyExt;
//! use micro_h1::connection::HttpConnection;
//! use micro_h1::handler::make_handler;
//! use micro_h1::protocol::body::ReqBody;
//! use tokio::net::TcpListener;
//! use tracing::{info, warn};
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let listener = TcpListener::bind("127.0.0.1:8080").await?;
//!     let handler = Arc::new(make_handler(echo));
//!
//!     loop {
//!         let (stream, _remote_addr) = listener.accept().await?;
//!         let handler = Arc::clone(&handler);
//!         tokio::spawn(async move {
//!             let (reader, writer) = stream.into_split();
//!             match HttpConnection::new(reader, writer).process(handler).await {
//!                 Ok(()) => info!("connection closed"),
//!                 Err(e) => warn!(cause = %e, "connection closed with error"),
//!             }
//!         });
//!     }
//! }
//!
//! async fn echo(request: Request<ReqBody>) -> Result<Response<String>, Box<dyn Error + Send + Sync>> {
//!     let body = request.into_body().collect().await?.to_bytes();
//!     Ok(Response::new(String::from_utf8_lossy(&body).into_owned()))
//! }
//! ```
//!
//! # Architecture
//!
//! - [`headers`]: request and response header collections with fast slots
//!   for well-known names and a fixed serialization order
//! - [`codec`]: the request-line and header parser, the request decoder
//!   state machine, body framing, and the response encoder
//! - [`protocol`]: messages, request/response heads, body types and errors
//! - [`connection`]: the connection loop, the output producer and the
//!   timeout controller
//! - [`handler`]: the [`Application`](handler::Application) contract
//! - [`config`]: limits and options, deserializable with `serde`
//! - [`date`]: the cached `Date` header
//!
//! # Errors
//!
//! Malformed requests are reported as [`ParseError`](protocol::ParseError)
//! values. Before a response has started the client receives a matching
//! status (400, 408, 411, 413, 414, 431 or 505) with `Connection: close`;
//! afterwards the connection is closed without one.

pub mod codec;
pub mod config;
pub mod connection;
pub mod date;
pub mod handler;
pub mod headers;
pub mod protocol;

mod trace;
mod utils;
pub(crate) use utils::ensure;
