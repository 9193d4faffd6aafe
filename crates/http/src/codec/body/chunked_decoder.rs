//! Decoder implementation for HTTP chunked transfer encoding.
//!
//! Decodes bodies framed as described in
//! [RFC 7230 Section 4.1](https://tools.ietf.org/html/rfc7230#section-4.1):
//! a hex size line (extensions are skipped), the chunk data and its CRLF,
//! repeated until a zero-size chunk, followed by an optional trailer block.
//!
//! The decoder is resumable at every byte boundary. Every byte it consumes,
//! framing included, is charged against the body size limit; trailer header
//! lines are charged against the remaining header budget instead.

use std::task::Poll;

use ChunkedState::*;
use bytes::{Buf, Bytes, BytesMut};
use http::header::HeaderName;
use http::{HeaderMap, HeaderValue};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::codec::body::BodyLimits;
use crate::codec::parser::{HeaderLines, HeadersHandler, Status};
use crate::protocol::{HeaderError, ParseError, PayloadItem};

/// Eight hex digits plus CRLF keep a size line within 10 bytes.
const MAX_HEX_DIGITS: usize = 8;
const MAX_CHUNK_SIZE: u64 = i32::MAX as u64;

#[derive(Debug, Clone)]
pub struct ChunkedDecoder {
    state: ChunkedState,
    chunk_size: u64,
    prefix_len: usize,
    consumed: u64,
    limits: BodyLimits,
    trailer_lines: HeaderLines,
    trailers: TrailerMap,
    trailers_emitted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkedState {
    /// Hex chunk size
    Prefix,
    /// LF closing the size line
    PrefixLf,
    /// Chunk extensions, skipped up to CR
    Extension,
    /// Chunk data
    Data,
    /// CR after chunk data
    Suffix,
    /// LF after chunk data
    SuffixLf,
    /// After the last chunk: either CRLF or trailer headers
    Trailer,
    /// Trailer header lines up to the blank line
    TrailerHeaders,
    /// Final CRLF consumed
    Complete,
}

impl ChunkedDecoder {
    pub fn new(limits: BodyLimits) -> Self {
        let trailer_lines = HeaderLines::new(limits.max_trailer_count, limits.show_details);
        Self {
            state: Prefix,
            chunk_size: 0,
            prefix_len: 0,
            consumed: 0,
            limits,
            trailer_lines,
            trailers: TrailerMap::default(),
            trailers_emitted: false,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.state == Complete
    }

    fn add_consumed(&mut self, count: usize) -> Result<(), ParseError> {
        self.consumed += count as u64;
        match self.limits.max_body_size {
            Some(max) if self.consumed > max => Err(ParseError::RequestBodyTooLarge),
            _ => Ok(()),
        }
    }

    fn finish(&mut self) -> PayloadItem {
        if !self.trailers_emitted && !self.trailers.0.is_empty() {
            self.trailers_emitted = true;
            return PayloadItem::Trailers(std::mem::take(&mut self.trailers.0));
        }
        PayloadItem::Eof
    }
}

impl Decoder for ChunkedDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if self.state == Complete {
                trace!("finished reading chunked data");
                return Ok(Some(self.finish()));
            }

            if src.is_empty() {
                return Ok(None);
            }

            let mut buf = None;
            let before = src.len();
            let step = self.step(src, &mut buf);

            if self.state != TrailerHeaders {
                self.add_consumed(before - src.len())?;
            }

            self.state = match step {
                Poll::Pending => return Ok(None),
                Poll::Ready(Ok(new_state)) => new_state,
                Poll::Ready(Err(e)) => return Err(e),
            };

            if let Some(bytes) = buf {
                trace!(len = bytes.len(), "read chunked bytes");
                return Ok(Some(PayloadItem::Chunk(bytes)));
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(item) => Ok(Some(item)),
            None => Err(ParseError::ChunkedRequestIncomplete),
        }
    }
}

macro_rules! try_next_byte {
    ($src:ident) => {{
        if $src.is_empty() {
            return Poll::Pending;
        }
        $src.get_u8()
    }};
}

impl ChunkedDecoder {
    fn step(&mut self, src: &mut BytesMut, buf: &mut Option<Bytes>) -> Poll<Result<ChunkedState, ParseError>> {
        match self.state {
            Prefix => self.read_prefix(src),
            PrefixLf => self.read_prefix_lf(src),
            Extension => Self::read_extension(src),
            Data => self.read_data(src, buf),
            Suffix => Self::read_suffix(src),
            SuffixLf => Self::read_suffix_lf(src),
            Trailer => Self::read_trailer(src),
            TrailerHeaders => self.read_trailer_headers(src),
            Complete => Poll::Ready(Ok(Complete)),
        }
    }

    /// Reads one byte of the hex size.
    ///
    /// A digit stays in `Prefix`, `;` starts the extensions and CR ends the
    /// size line. Anything else, a missing size, more than eight digits or a
    /// size above `i32::MAX` is `BadChunkSizeData`.
    fn read_prefix(&mut self, src: &mut BytesMut) -> Poll<Result<ChunkedState, ParseError>> {
        let b = try_next_byte!(src);
        self.prefix_len += 1;

        let digit = match b {
            b'0'..=b'9' => b - b'0',
            b'a'..=b'f' => b - b'a' + 10,
            b'A'..=b'F' => b - b'A' + 10,
            b';' if self.prefix_len > 1 => return Poll::Ready(Ok(Extension)),
            b'\r' if self.prefix_len > 1 => return Poll::Ready(Ok(PrefixLf)),
            _ => return Poll::Ready(Err(ParseError::BadChunkSizeData)),
        };

        if self.prefix_len > MAX_HEX_DIGITS {
            return Poll::Ready(Err(ParseError::BadChunkSizeData));
        }

        self.chunk_size = (self.chunk_size << 4) | u64::from(digit);
        if self.chunk_size > MAX_CHUNK_SIZE {
            return Poll::Ready(Err(ParseError::BadChunkSizeData));
        }
        Poll::Ready(Ok(Prefix))
    }

    fn read_prefix_lf(&mut self, src: &mut BytesMut) -> Poll<Result<ChunkedState, ParseError>> {
        if try_next_byte!(src) != b'\n' {
            return Poll::Ready(Err(ParseError::BadChunkSizeData));
        }
        self.prefix_len = 0;

        if self.chunk_size == 0 { Poll::Ready(Ok(Trailer)) } else { Poll::Ready(Ok(Data)) }
    }

    /// Skips extension bytes until CR. A bare LF is rejected.
    fn read_extension(src: &mut BytesMut) -> Poll<Result<ChunkedState, ParseError>> {
        match src.iter().position(|&b| b == b'\r' || b == b'\n') {
            Some(index) if src[index] == b'\r' => {
                src.advance(index + 1);
                Poll::Ready(Ok(PrefixLf))
            }
            Some(_) => Poll::Ready(Err(ParseError::BadChunkSizeData)),
            None => {
                src.clear();
                Poll::Ready(Ok(Extension))
            }
        }
    }

    fn read_data(&mut self, src: &mut BytesMut, buf: &mut Option<Bytes>) -> Poll<Result<ChunkedState, ParseError>> {
        let read_size = usize::try_from(self.chunk_size).unwrap_or(usize::MAX).min(src.len());
        self.chunk_size -= read_size as u64;
        *buf = Some(src.split_to(read_size).freeze());

        if self.chunk_size > 0 { Poll::Ready(Ok(Data)) } else { Poll::Ready(Ok(Suffix)) }
    }

    fn read_suffix(src: &mut BytesMut) -> Poll<Result<ChunkedState, ParseError>> {
        match try_next_byte!(src) {
            b'\r' => Poll::Ready(Ok(SuffixLf)),
            _ => Poll::Ready(Err(ParseError::BadChunkSuffix)),
        }
    }

    fn read_suffix_lf(src: &mut BytesMut) -> Poll<Result<ChunkedState, ParseError>> {
        match try_next_byte!(src) {
            b'\n' => Poll::Ready(Ok(Prefix)),
            _ => Poll::Ready(Err(ParseError::BadChunkSuffix)),
        }
    }

    /// Looks for the CRLF ending a body without trailers; anything else starts the trailer block.
    fn read_trailer(src: &mut BytesMut) -> Poll<Result<ChunkedState, ParseError>> {
        match &src[..] {
            [b'\r'] => Poll::Pending,
            [b'\r', b'\n', ..] => {
                src.advance(2);
                Poll::Ready(Ok(Complete))
            }
            [b'\r', ..] => Poll::Ready(Err(ParseError::InvalidRequestHeadersNoCrlf)),
            _ => Poll::Ready(Ok(TrailerHeaders)),
        }
    }

    fn read_trailer_headers(&mut self, src: &mut BytesMut) -> Poll<Result<ChunkedState, ParseError>> {
        let budget = self.limits.trailer_budget;
        let limited = src.len() >= budget;
        let input = &src[..src.len().min(budget)];

        match self.trailer_lines.parse(input, &mut self.trailers) {
            Err(e) => Poll::Ready(Err(e)),
            Ok(Status::Complete { consumed, .. }) => {
                src.advance(consumed);
                self.limits.trailer_budget -= consumed;
                Poll::Ready(Ok(Complete))
            }
            Ok(Status::Partial { consumed, .. }) => {
                src.advance(consumed);
                self.limits.trailer_budget -= consumed;
                if limited {
                    return Poll::Ready(Err(ParseError::HeadersExceedMaxTotalSize));
                }
                Poll::Pending
            }
        }
    }
}

/// Collects trailer fields into an [`http::HeaderMap`].
#[derive(Debug, Clone, Default)]
struct TrailerMap(HeaderMap);

impl HeadersHandler for TrailerMap {
    fn on_header(&mut self, name: &[u8], value: &[u8]) -> Result<(), HeaderError> {
        let name = HeaderName::from_bytes(name).map_err(|_e| HeaderError::InvalidHeaderName)?;
        let value = HeaderValue::from_bytes(value).map_err(|_e| HeaderError::InvalidHeaderCharacters)?;
        self.0.append(name, value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoder() -> ChunkedDecoder {
        ChunkedDecoder::new(BodyLimits::default())
    }

    /// Feeds `input` in fragments of `step` bytes and collects everything the decoder yields.
    fn decode_fragmented(mut decoder: ChunkedDecoder, input: &[u8], step: usize) -> (Vec<u8>, Option<HeaderMap>, usize) {
        let mut buffer = BytesMut::new();
        let mut body = Vec::new();
        let mut trailers = None;
        let mut eof_count = 0;

        for fragment in input.chunks(step) {
            buffer.extend_from_slice(fragment);
            while let Some(item) = decoder.decode(&mut buffer).unwrap() {
                match item {
                    PayloadItem::Chunk(bytes) => body.extend_from_slice(&bytes),
                    PayloadItem::Trailers(map) => trailers = Some(map),
                    PayloadItem::Eof => {
                        eof_count += 1;
                        break;
                    }
                }
            }
            if eof_count > 0 {
                break;
            }
        }
        (body, trailers, eof_count)
    }

    #[test]
    fn basic() {
        let mut buffer = BytesMut::from(&b"10\r\n1234567890abcdef\r\n0\r\n\r\n"[..]);
        let mut decoder = decoder();

        let item = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(item.as_bytes().unwrap(), &Bytes::from_static(b"1234567890abcdef"));

        let item = decoder.decode(&mut buffer).unwrap().unwrap();
        assert!(item.is_eof());
        assert!(buffer.is_empty());
    }

    #[test]
    fn wiki_body() {
        let (body, trailers, eofs) = decode_fragmented(decoder(), b"4\r\nWiki\r\n0\r\n\r\n", 64);
        assert_eq!(body, b"Wiki");
        assert!(trailers.is_none());
        assert_eq!(eofs, 1);
    }

    #[test]
    fn any_fragmentation_yields_the_same_body() {
        let input = b"5\r\nhello\r\n7;name=value\r\n, world\r\nA\r\n0123456789\r\n0\r\nExpires: never\r\nX-Sum: 1\r\n\r\n";
        for step in 1..input.len() {
            let (body, trailers, eofs) = decode_fragmented(decoder(), input, step);
            assert_eq!(body, b"hello, world0123456789", "step {step}");
            let trailers = trailers.unwrap();
            assert_eq!(trailers.get("expires").unwrap(), "never");
            assert_eq!(trailers.get("x-sum").unwrap(), "1");
            assert_eq!(eofs, 1);
        }
    }

    #[test]
    fn leaves_following_request_untouched() {
        let mut buffer = BytesMut::from(&b"3\r\nabc\r\n0\r\n\r\nGET / HTTP/1.1\r\n"[..]);
        let mut decoder = decoder();
        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_chunk());
        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
        assert_eq!(&buffer[..], b"GET / HTTP/1.1\r\n");
    }

    #[test]
    fn bad_size_data() {
        for input in [&b"xyz\r\n"[..], b"\r\n", b";ext\r\n", b"5 \r\n", b"123456789\r\n", b"80000000\r\n", b"5\rX"] {
            let mut buffer = BytesMut::from(input);
            assert!(
                matches!(decoder().decode(&mut buffer), Err(ParseError::BadChunkSizeData)),
                "{input:?}"
            );
        }
    }

    #[test]
    fn max_chunk_size_is_accepted() {
        let mut buffer = BytesMut::from(&b"7FFFFFFF\r\nab"[..]);
        let mut decoder = ChunkedDecoder::new(BodyLimits { max_body_size: None, ..BodyLimits::default() });
        assert_eq!(decoder.decode(&mut buffer).unwrap().unwrap().as_bytes().unwrap(), &Bytes::from_static(b"ab"));
    }

    #[test]
    fn bare_lf_in_extension() {
        let mut buffer = BytesMut::from(&b"5;a=b\nhello"[..]);
        assert!(matches!(decoder().decode(&mut buffer), Err(ParseError::BadChunkSizeData)));
    }

    #[test]
    fn bad_suffix() {
        let mut buffer = BytesMut::from(&b"5\r\nhelloBad"[..]);
        let mut decoder = decoder();
        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_chunk());
        assert!(matches!(decoder.decode(&mut buffer), Err(ParseError::BadChunkSuffix)));
    }

    #[test]
    fn framing_counts_against_body_limit() {
        let limits = BodyLimits { max_body_size: Some(8), ..BodyLimits::default() };
        let mut buffer = BytesMut::from(&b"4\r\nWiki\r\n0\r\n\r\n"[..]);
        let mut decoder = ChunkedDecoder::new(limits);
        let mut result = Ok(None);
        for _ in 0..4 {
            result = decoder.decode(&mut buffer);
            if result.is_err() {
                break;
            }
        }
        assert!(matches!(result, Err(ParseError::RequestBodyTooLarge)));
    }

    #[test]
    fn trailers_use_the_header_budget() {
        let limits = BodyLimits { trailer_budget: 12, ..BodyLimits::default() };
        let mut buffer = BytesMut::from(&b"0\r\nX-Long-Trailer: value\r\n\r\n"[..]);
        assert!(matches!(ChunkedDecoder::new(limits).decode(&mut buffer), Err(ParseError::HeadersExceedMaxTotalSize)));
    }

    #[test]
    fn trailers_count_against_header_count() {
        let limits = BodyLimits { max_trailer_count: 1, ..BodyLimits::default() };
        let mut buffer = BytesMut::from(&b"0\r\nA: 1\r\nB: 2\r\n\r\n"[..]);
        assert!(matches!(ChunkedDecoder::new(limits).decode(&mut buffer), Err(ParseError::TooManyHeaders)));
    }

    #[test]
    fn eof_before_last_chunk() {
        let mut buffer = BytesMut::from(&b"5\r\nhel"[..]);
        let mut decoder = decoder();
        assert!(decoder.decode_eof(&mut buffer).unwrap().unwrap().is_chunk());
        assert!(matches!(decoder.decode_eof(&mut buffer), Err(ParseError::ChunkedRequestIncomplete)));
    }
}
