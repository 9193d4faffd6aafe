//! The per-request parse state machine.
//!
//! [`RequestDecoder`] walks one request at a time through
//! [`ProcessingState::RequestPending`], [`ProcessingState::ParsingRequestLine`],
//! [`ProcessingState::ParsingHeaders`] and [`ProcessingState::AppStarted`],
//! emitting the head once the header block is complete and body items after
//! that, until the body's `Eof` returns it to `RequestPending`.
//!
//! Input may arrive in arbitrary fragments: every state consumes what it can
//! and reports `Ok(None)` until more bytes arrive, bounded by the request line
//! and header block budgets of [`ServerLimits`].

use bytes::{Buf, BytesMut};
use http::{Request, Version};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::codec::body::{BodyLimits, Framing, PayloadDecoder};
use crate::codec::parser::{HeaderLines, RequestLine, Status, parse_request_line, validate_host};
use crate::config::{ServerLimits, ServerOptions};
use crate::headers::{RequestHeaders, comma_tokens};
use crate::protocol::{Message, ParseError, PayloadItem, PayloadSize, RequestHead};

/// Where the decoder is within the current request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingState {
    /// Waiting for the first byte of the next request.
    RequestPending,
    ParsingRequestLine,
    ParsingHeaders,
    /// The head was emitted, body items follow.
    AppStarted,
}

/// A decoder for HTTP/1.x requests, yielding the head and then body items.
#[derive(Debug)]
pub struct RequestDecoder {
    state: ProcessingState,
    limits: ServerLimits,
    show_details: bool,
    request_count: u64,
    headers: RequestHeaders,
    header_lines: HeaderLines,
    header_budget: usize,
    request_line: Option<RequestLine>,
    payload_decoder: Option<PayloadDecoder>,
}

impl Default for RequestDecoder {
    fn default() -> Self {
        Self::with_options(&ServerOptions::default())
    }
}

impl RequestDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: &ServerOptions) -> Self {
        let limits = options.limits.clone();
        Self {
            state: ProcessingState::RequestPending,
            header_lines: HeaderLines::new(limits.max_request_header_count, options.show_error_details),
            header_budget: limits.max_request_headers_total_size,
            limits,
            show_details: options.show_error_details,
            request_count: 0,
            headers: RequestHeaders::new(),
            request_line: None,
            payload_decoder: None,
        }
    }

    pub fn state(&self) -> ProcessingState {
        self.state
    }

    /// Number of requests started on this decoder, the current one included.
    pub fn request_count(&self) -> u64 {
        self.request_count
    }

    /// Headers of the current request, valid until the next request starts.
    pub fn headers(&self) -> &RequestHeaders {
        &self.headers
    }

    fn start_request(&mut self) {
        self.request_count += 1;
        self.headers.reset();
        self.header_lines.reset();
        self.header_budget = self.limits.max_request_headers_total_size;
        self.request_line = None;
        self.state = ProcessingState::ParsingRequestLine;
    }

    fn parse_request_line(&mut self, src: &mut BytesMut) -> Result<bool, ParseError> {
        let max = self.limits.max_request_line_size;
        let window = &src[..src.len().min(max)];

        match parse_request_line(window, self.show_details)? {
            Status::Complete { value, consumed } => {
                src.advance(consumed);
                self.request_line = Some(value);
                self.state = ProcessingState::ParsingHeaders;
                Ok(true)
            }
            Status::Partial { .. } if src.len() >= max => Err(ParseError::RequestLineTooLong),
            Status::Partial { .. } => Ok(false),
        }
    }

    fn parse_headers(&mut self, src: &mut BytesMut) -> Result<bool, ParseError> {
        let budget = self.header_budget;
        let clipped = src.len() >= budget;
        let window = &src[..src.len().min(budget)];

        match self.header_lines.parse(window, &mut self.headers)? {
            Status::Complete { consumed, .. } => {
                src.advance(consumed);
                self.header_budget -= consumed;
                Ok(true)
            }
            Status::Partial { .. } if clipped => Err(ParseError::HeadersExceedMaxTotalSize),
            Status::Partial { consumed, .. } => {
                src.advance(consumed);
                self.header_budget -= consumed;
                Ok(false)
            }
        }
    }

    /// Validates the complete head, selects the body framing and builds the request.
    fn finish_head(&mut self) -> Result<(RequestHead, PayloadSize), ParseError> {
        let show = self.show_details;
        let Some(line) = self.request_line.take() else {
            return Err(ParseError::invalid_request_line(show, b""));
        };

        validate_host(line.version, &line.target, &line.uri, self.headers.host(), show)?;

        let framing =
            Framing::for_request(&line.method, line.version, &self.headers, self.limits.max_request_body_size, show)?;

        let expect_continue = line.version == Version::HTTP_11
            && comma_tokens(self.headers.expect()).any(|token| token.eq_ignore_ascii_case(b"100-continue"));

        let body_limits = BodyLimits {
            max_body_size: self.limits.max_request_body_size,
            trailer_budget: self.header_budget,
            max_trailer_count: self.limits.max_request_header_count.saturating_sub(self.header_lines.parsed()),
            show_details: show,
        };
        self.payload_decoder = Some(PayloadDecoder::new(framing.payload, body_limits));
        self.state = ProcessingState::AppStarted;

        let mut request = Request::new(());
        *request.method_mut() = line.method;
        *request.uri_mut() = line.uri;
        *request.version_mut() = line.version;
        *request.headers_mut() = self.headers.to_header_map();
        request.extensions_mut().insert(line.target);

        trace!(request_count = self.request_count, payload = ?framing.payload, "request head parsed");
        Ok((RequestHead::new(request, framing, expect_continue), framing.payload))
    }

    fn decode_payload(&mut self, item: Option<PayloadItem>) -> Option<Message<(RequestHead, PayloadSize)>> {
        let item = item?;
        if item.is_eof() {
            self.payload_decoder = None;
            self.state = ProcessingState::RequestPending;
        }
        Some(Message::Payload(item))
    }
}

impl Decoder for RequestDecoder {
    type Item = Message<(RequestHead, PayloadSize)>;
    type Error = ParseError;

    /// Decodes as much of the current request as `src` allows.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(Message::Header(_)))`: the head is complete
    /// - `Ok(Some(Message::Payload(_)))`: a body chunk, the trailers, or the end of the body
    /// - `Ok(None)`: more bytes are needed
    /// - `Err(_)`: the request is rejected
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.state {
                ProcessingState::RequestPending => {
                    if src.is_empty() {
                        return Ok(None);
                    }
                    self.start_request();
                }
                ProcessingState::ParsingRequestLine => {
                    if !self.parse_request_line(src)? {
                        return Ok(None);
                    }
                }
                ProcessingState::ParsingHeaders => {
                    if !self.parse_headers(src)? {
                        return Ok(None);
                    }
                    return self.finish_head().map(|head| Some(Message::Header(head)));
                }
                ProcessingState::AppStarted => {
                    let Some(payload_decoder) = &mut self.payload_decoder else {
                        self.state = ProcessingState::RequestPending;
                        continue;
                    };
                    let item = payload_decoder.decode(src)?;
                    return Ok(self.decode_payload(item));
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(message) = self.decode(src)? {
            return Ok(Some(message));
        }

        match self.state {
            ProcessingState::RequestPending => Ok(None),
            ProcessingState::ParsingRequestLine => {
                Err(ParseError::invalid_request_line(self.show_details, &src[..src.len().min(self.limits.max_request_line_size)]))
            }
            ProcessingState::ParsingHeaders => Err(ParseError::invalid_request_header(self.show_details, src)),
            ProcessingState::AppStarted => {
                let Some(payload_decoder) = &mut self.payload_decoder else {
                    return Ok(None);
                };
                let item = payload_decoder.decode_eof(src)?;
                Ok(self.decode_payload(item))
            }
        }
    }
}
