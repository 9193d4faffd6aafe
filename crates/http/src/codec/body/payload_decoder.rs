//! Decoder implementation for HTTP message payloads.
//!
//! This module provides a unified decoder for the framing modes a request
//! body can use, and the selection of that mode from the request head:
//! - Content-Length based payloads
//! - Chunked transfer encoding
//! - Upgrade tunnels
//! - Messages with no body

use bytes::BytesMut;
use http::{Method, Version};
use tokio_util::codec::Decoder;

use crate::codec::body::BodyLimits;
use crate::codec::body::chunked_decoder::ChunkedDecoder;
use crate::codec::body::length_decoder::LengthDecoder;
use crate::codec::body::upgrade_decoder::UpgradeDecoder;
use crate::headers::{HeaderCollection, RequestHeaders, comma_tokens};
use crate::protocol::{ParseError, PayloadItem, PayloadSize};

/// A unified decoder for handling HTTP message payloads.
#[derive(Debug, Clone)]
pub struct PayloadDecoder {
    /// The specific decoding strategy to use
    kind: Kind,
}

#[derive(Debug, Clone)]
enum Kind {
    /// Decode payload with a fixed content length
    Length(LengthDecoder),

    /// Decode payload using chunked transfer encoding
    Chunked(Box<ChunkedDecoder>),

    /// Pass the raw tunnel through
    Upgrade(UpgradeDecoder),

    /// Handle messages with no body
    NoBody,
}

impl PayloadDecoder {
    /// Creates a `PayloadDecoder` for messages with no body.
    pub fn empty() -> Self {
        Self { kind: Kind::NoBody }
    }

    /// Creates a `PayloadDecoder` for chunked transfer encoding.
    pub fn chunked(limits: BodyLimits) -> Self {
        Self { kind: Kind::Chunked(Box::new(ChunkedDecoder::new(limits))) }
    }

    /// Creates a `PayloadDecoder` for a fixed-length payload.
    pub fn fix_length(size: u64) -> Self {
        Self { kind: Kind::Length(LengthDecoder::new(size)) }
    }

    pub fn upgrade() -> Self {
        Self { kind: Kind::Upgrade(UpgradeDecoder) }
    }

    pub fn new(size: PayloadSize, limits: BodyLimits) -> Self {
        match size {
            PayloadSize::Length(length) => Self::fix_length(length),
            PayloadSize::Chunked => Self::chunked(limits),
            PayloadSize::Upgrade => Self::upgrade(),
            PayloadSize::Empty => Self::empty(),
        }
    }

    pub fn is_chunked(&self) -> bool {
        matches!(self.kind, Kind::Chunked(_))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.kind, Kind::NoBody)
    }

    pub fn is_fix_length(&self) -> bool {
        matches!(self.kind, Kind::Length(_))
    }
}

impl Decoder for PayloadDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match &mut self.kind {
            Kind::Length(length_decoder) => length_decoder.decode(src),
            Kind::Chunked(chunked_decoder) => chunked_decoder.decode(src),
            Kind::Upgrade(upgrade_decoder) => upgrade_decoder.decode(src),
            Kind::NoBody => Ok(Some(PayloadItem::Eof)),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match &mut self.kind {
            Kind::Length(length_decoder) => length_decoder.decode_eof(src),
            Kind::Chunked(chunked_decoder) => chunked_decoder.decode_eof(src),
            Kind::Upgrade(upgrade_decoder) => upgrade_decoder.decode_eof(src),
            Kind::NoBody => Ok(Some(PayloadItem::Eof)),
        }
    }
}

/// Connection and body framing decided from a request head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Framing {
    pub payload: PayloadSize,
    pub keep_alive: bool,
    pub upgrade: bool,
}

impl Framing {
    /// Selects the body framing for a request, applied once the headers are complete.
    ///
    /// Keep-alive defaults to on for HTTP/1.1. A `Connection` header replaces
    /// the default: the connection is kept only if it lists `keep-alive` and
    /// not `close`, so `Connection: upgrade` alone closes after the response.
    /// `Transfer-Encoding` wins over `Content-Length`, and POST or PUT without
    /// either is rejected as length-required.
    ///
    /// An upgrade request with `Content-Length: 0` is framed as an empty body,
    /// not as a tunnel: the zero length is taken at its word, and the tunnel
    /// only exists once the application answers `101`.
    pub fn for_request(
        method: &Method,
        version: Version,
        headers: &RequestHeaders,
        max_body_size: Option<u64>,
        show: bool,
    ) -> Result<Self, ParseError> {
        let mut keep_alive = version != Version::HTTP_10;
        let mut upgrade = false;

        if !headers.connection().is_empty() {
            let mut listed = false;
            let mut close = false;
            for token in comma_tokens(headers.connection()) {
                if token.eq_ignore_ascii_case(b"keep-alive") {
                    listed = true;
                } else if token.eq_ignore_ascii_case(b"close") {
                    close = true;
                } else if token.eq_ignore_ascii_case(b"upgrade") {
                    upgrade = true;
                }
            }
            keep_alive = listed && !close;
        }

        let framing = |payload| Ok(Self { payload, keep_alive, upgrade });

        let transfer_encoding = headers.transfer_encoding();
        if !transfer_encoding.is_empty() {
            let chunked = comma_tokens(transfer_encoding).last().is_some_and(|t| t.eq_ignore_ascii_case(b"chunked"));
            if !chunked {
                let raw = transfer_encoding.last().map_or(&b""[..], |value| value.as_bytes());
                return Err(ParseError::final_transfer_coding_not_chunked(show, raw));
            }
            if upgrade {
                return Err(ParseError::UpgradeRequestCannotHavePayload);
            }
            return framing(PayloadSize::Chunked);
        }

        if let Some(length) = headers.content_length() {
            if length == 0 {
                return framing(PayloadSize::Empty);
            }
            if upgrade {
                return Err(ParseError::UpgradeRequestCannotHavePayload);
            }
            if max_body_size.is_some_and(|max| length > max) {
                return Err(ParseError::RequestBodyTooLarge);
            }
            return framing(PayloadSize::Length(length));
        }

        if method == Method::POST || method == Method::PUT {
            let method = method.to_string();
            return Err(if version == Version::HTTP_10 {
                ParseError::LengthRequiredHttp10 { method }
            } else {
                ParseError::LengthRequired { method }
            });
        }

        if upgrade {
            return framing(PayloadSize::Upgrade);
        }

        framing(PayloadSize::Empty)
    }
}
