use super::Status;
use super::chars::{is_token, is_whitespace, trim_ows};
use super::request_line::memchr;
use crate::ensure;
use crate::protocol::{HeaderError, ParseError};

/// Receiver of parsed `name: value` pairs.
pub trait HeadersHandler {
    fn on_header(&mut self, name: &[u8], value: &[u8]) -> Result<(), HeaderError>;
}

/// Resumable parser for a header block, also used for chunked trailers.
///
/// Complete lines are handed to the [`HeadersHandler`] as soon as they are
/// seen and reported as consumed, so the caller can drop them from its
/// buffer even while the block is still incomplete.
#[derive(Debug, Clone)]
pub struct HeaderLines {
    parsed: usize,
    max_count: usize,
    show_details: bool,
}

impl HeaderLines {
    pub fn new(max_count: usize, show_details: bool) -> Self {
        Self { parsed: 0, max_count, show_details }
    }

    /// Number of header lines accepted so far.
    pub fn parsed(&self) -> usize {
        self.parsed
    }

    pub fn reset(&mut self) {
        self.parsed = 0;
    }

    /// Parses lines from `input` until the blank line ending the block.
    pub fn parse<H: HeadersHandler>(&mut self, input: &[u8], handler: &mut H) -> Result<Status<()>, ParseError> {
        let show = self.show_details;
        let mut consumed = 0;

        loop {
            let rest = &input[consumed..];
            match rest {
                [] | [b'\r'] => return Ok(Status::Partial { consumed, examined: input.len() }),
                [b'\r', b'\n', ..] => return Ok(Status::Complete { value: (), consumed: consumed + 2 }),
                [b'\r', ..] => return Err(ParseError::InvalidRequestHeadersNoCrlf),
                _ => {}
            }

            let Some(lf) = memchr(b'\n', rest) else {
                return Ok(Status::Partial { consumed, examined: input.len() });
            };
            let raw_line = &rest[..=lf];
            let Some(line) = rest[..lf].strip_suffix(b"\r") else {
                return Err(ParseError::invalid_request_header(show, raw_line));
            };

            self.parse_line(line, raw_line, handler)?;
            consumed += lf + 1;
        }
    }

    fn parse_line<H: HeadersHandler>(&mut self, line: &[u8], raw_line: &[u8], handler: &mut H) -> Result<(), ParseError> {
        let show = self.show_details;

        // obs-fold and leading whitespace are rejected
        ensure!(!is_whitespace(line[0]), ParseError::invalid_request_header(show, raw_line));

        let colon = memchr(b':', line).ok_or_else(|| ParseError::invalid_request_header(show, raw_line))?;
        let name = &line[..colon];
        ensure!(!name.is_empty(), ParseError::invalid_request_header(show, raw_line));
        ensure!(!name.iter().any(|&b| is_whitespace(b)), ParseError::invalid_request_header(show, raw_line));
        ensure!(is_token(name), ParseError::InvalidCharactersInHeaderName);

        let value = trim_ows(&line[colon + 1..]);
        ensure!(!value.iter().any(|&b| matches!(b, b'\r' | b'\0')), ParseError::invalid_request_header(show, raw_line));

        self.parsed += 1;
        ensure!(self.parsed <= self.max_count, ParseError::TooManyHeaders);

        handler.on_header(name, value).map_err(|e| match e {
            HeaderError::InvalidContentLength => ParseError::invalid_content_length(show, value),
            HeaderError::MultipleContentLengths => ParseError::MultipleContentLengths,
            HeaderError::InvalidHeaderName => ParseError::InvalidCharactersInHeaderName,
            HeaderError::InvalidHeaderCharacters | HeaderError::ReadOnly => {
                ParseError::invalid_request_header(show, raw_line)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    #[derive(Default)]
    struct Collect(Vec<(String, String)>);

    impl HeadersHandler for Collect {
        fn on_header(&mut self, name: &[u8], value: &[u8]) -> Result<(), HeaderError> {
            self.0.push((String::from_utf8_lossy(name).into_owned(), String::from_utf8_lossy(value).into_owned()));
            Ok(())
        }
    }

    fn crlf(s: &str) -> Vec<u8> {
        s.replace('\n', "\r\n").into_bytes()
    }

    #[test]
    fn parses_a_block() {
        let input = crlf(indoc! {"
            Host: example.com
            User-Agent:curl/8.0\t
            X-Empty:
            Accept:   */*

            body"});
        let mut collect = Collect::default();
        let status = HeaderLines::new(100, false).parse(&input, &mut collect).unwrap();

        let body_offset = input.len() - 4;
        assert!(matches!(status, Status::Complete { consumed, .. } if consumed == body_offset));
        assert_eq!(
            collect.0,
            [
                ("Host".to_string(), "example.com".to_string()),
                ("User-Agent".to_string(), "curl/8.0".to_string()),
                ("X-Empty".to_string(), String::new()),
                ("Accept".to_string(), "*/*".to_string()),
            ]
        );
    }

    #[test]
    fn partial_reports_consumed_lines() {
        let input = b"Host: a\r\nX-Partial: va";
        let mut collect = Collect::default();
        let status = HeaderLines::new(100, false).parse(input, &mut collect).unwrap();
        assert!(matches!(status, Status::Partial { consumed: 9, examined } if examined == input.len()));
        assert_eq!(collect.0.len(), 1);
    }

    #[test]
    fn resumes_across_fragments() {
        let input = b"A: 1\r\nB: 2\r\n\r\n";
        let mut lines = HeaderLines::new(100, false);
        let mut collect = Collect::default();
        let mut buffer = Vec::new();

        let mut complete = 0;
        for &b in input {
            buffer.push(b);
            match lines.parse(&buffer, &mut collect).unwrap() {
                Status::Complete { .. } => complete += 1,
                Status::Partial { consumed, .. } => {
                    buffer.drain(..consumed);
                }
            }
        }
        assert_eq!(complete, 1);
        assert_eq!(collect.0.len(), 2);
    }

    #[test]
    fn rejects_malformed_lines() {
        for input in [
            &b"NoColon\r\n\r\n"[..],
            b"Bad Name: x\r\n\r\n",
            b"Name : x\r\n\r\n",
            b": x\r\n\r\n",
            b" folded: x\r\n\r\n",
            b"A: 1\r\n\tcontinued\r\n\r\n",
            b"A: 1\n\r\n",
            b"A: a\rb\r\n\r\n",
            b"A: a\0b\r\n\r\n",
            b"A: a\r\r\n\r\n",
        ] {
            let result = HeaderLines::new(100, false).parse(input, &mut Collect::default());
            assert!(matches!(result, Err(ParseError::InvalidRequestHeader { .. })), "{input:?}");
        }
    }

    #[test]
    fn only_space_and_tab_are_trimmed() {
        let mut collect = Collect::default();
        HeaderLines::new(100, false).parse(b"A: \t\x0bvalue\x0c \r\n\r\n", &mut collect).unwrap();
        assert_eq!(collect.0, [("A".to_string(), "\x0bvalue\x0c".to_string())]);
    }

    #[test]
    fn rejects_non_token_names() {
        let result = HeaderLines::new(100, false).parse(b"A(b: x\r\n\r\n", &mut Collect::default());
        assert!(matches!(result, Err(ParseError::InvalidCharactersInHeaderName)));
    }

    #[test]
    fn bare_cr_terminator() {
        let result = HeaderLines::new(100, false).parse(b"A: 1\r\n\rX", &mut Collect::default());
        assert!(matches!(result, Err(ParseError::InvalidRequestHeadersNoCrlf)));
    }

    #[test]
    fn header_count_limit() {
        let result = HeaderLines::new(2, false).parse(b"A: 1\r\nB: 2\r\nC: 3\r\n\r\n", &mut Collect::default());
        assert!(matches!(result, Err(ParseError::TooManyHeaders)));
    }
}
