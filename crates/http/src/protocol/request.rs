//! The parsed request head.
//!
//! [`RequestHead`] wraps an `http::Request<()>` built from the parsed request
//! line and headers, together with the connection facts the framing decision
//! produced. The protocol view of the request-target travels as a
//! [`RequestTarget`] extension so it reaches the application unchanged.

use http::{HeaderMap, Method, Request, Uri, Version};

use crate::codec::Framing;
use crate::codec::parser::RequestTarget;
use crate::protocol::PayloadSize;

/// Identifies one request on one connection, `"{connection id}:{request counter:08X}"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TraceIdentifier(pub String);

impl TraceIdentifier {
    pub fn new(connection_id: u64, request_count: u64) -> Self {
        Self(format!("{connection_id}:{request_count:08X}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Head of a request, before its body is attached.
#[derive(Debug)]
pub struct RequestHead {
    inner: Request<()>,
    framing: Framing,
    expect_continue: bool,
}

impl AsRef<Request<()>> for RequestHead {
    fn as_ref(&self) -> &Request<()> {
        &self.inner
    }
}

impl AsMut<Request<()>> for RequestHead {
    fn as_mut(&mut self) -> &mut Request<()> {
        &mut self.inner
    }
}

impl RequestHead {
    pub(crate) fn new(inner: Request<()>, framing: Framing, expect_continue: bool) -> Self {
        Self { inner, framing, expect_continue }
    }

    /// Consumes the head and returns the inner `Request<()>`.
    pub fn into_inner(self) -> Request<()> {
        self.inner
    }

    /// Attaches a body, converting the head into a full `Request<T>`.
    pub fn body<T>(self, body: T) -> Request<T> {
        self.inner.map(|()| body)
    }

    pub fn method(&self) -> &Method {
        self.inner.method()
    }

    pub fn uri(&self) -> &Uri {
        self.inner.uri()
    }

    pub fn version(&self) -> Version {
        self.inner.version()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    pub fn target(&self) -> Option<&RequestTarget> {
        self.inner.extensions().get::<RequestTarget>()
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    pub fn payload_size(&self) -> PayloadSize {
        self.framing.payload
    }

    pub fn keep_alive(&self) -> bool {
        self.framing.keep_alive
    }

    pub fn is_upgrade(&self) -> bool {
        self.framing.upgrade
    }

    /// True if the client sent `Expect: 100-continue` on an HTTP/1.1 request.
    pub fn expect_continue(&self) -> bool {
        self.expect_continue
    }
}
