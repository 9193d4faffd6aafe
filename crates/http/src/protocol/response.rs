//! The response head handed to the encoder.

use http::StatusCode;

use crate::headers::ResponseHeaders;

/// Status line and headers of a response, borrowed from the connection's
/// reusable [`ResponseHeaders`].
#[derive(Debug, Clone, Copy)]
pub struct ResponseHead<'a> {
    pub status: StatusCode,
    /// Overrides the canonical reason phrase.
    pub reason: Option<&'a str>,
    pub headers: &'a ResponseHeaders,
}

impl<'a> ResponseHead<'a> {
    pub fn new(status: StatusCode, headers: &'a ResponseHeaders) -> Self {
        Self { status, reason: None, headers }
    }

    #[must_use]
    pub fn with_reason(mut self, reason: &'a str) -> Self {
        self.reason = Some(reason);
        self
    }
}
