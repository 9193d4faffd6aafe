use http::{Method, Uri, Version};

use super::Status;
use super::chars::{is_target_char, is_token};
use super::target::{RequestTarget, parse_target};
use crate::ensure;
use crate::protocol::ParseError;

/// A parsed `method SP request-target SP HTTP-version CRLF` line.
#[derive(Debug, Clone)]
pub struct RequestLine {
    pub method: Method,
    pub version: Version,
    pub target: RequestTarget,
    pub uri: Uri,
}

/// Parses the request line at the start of `input`.
///
/// Returns [`Status::Partial`] while no LF has been seen; the caller decides
/// whether the line budget allows waiting for more bytes.
pub fn parse_request_line(input: &[u8], show: bool) -> Result<Status<RequestLine>, ParseError> {
    let Some(lf) = memchr(b'\n', input) else {
        return Ok(Status::Partial { consumed: 0, examined: input.len() });
    };

    let consumed = lf + 1;
    let line = &input[..lf];
    let Some(line) = line.strip_suffix(b"\r") else {
        return Err(ParseError::invalid_request_line(show, &input[..consumed]));
    };

    let invalid = || ParseError::invalid_request_line(show, &input[..consumed]);

    let method_end = line.iter().position(|&b| b == b' ').ok_or_else(invalid)?;
    let method = parse_method(&line[..method_end]).ok_or_else(invalid)?;

    let rest = &line[method_end + 1..];
    let target_end = rest.iter().position(|&b| b == b' ').ok_or_else(invalid)?;
    let raw_target = &rest[..target_end];
    ensure!(!raw_target.is_empty(), invalid());
    ensure!(raw_target.iter().all(|&b| is_target_char(b)), ParseError::invalid_request_target(show, raw_target));

    let raw_version = &rest[target_end + 1..];
    let version = parse_version(raw_version, show, &input[..consumed])?;

    let (target, uri) = parse_target(&method, raw_target, show)?;

    Ok(Status::Complete { value: RequestLine { method, version, target, uri }, consumed })
}

fn parse_method(bytes: &[u8]) -> Option<Method> {
    let method = match bytes {
        b"GET" => Method::GET,
        b"PUT" => Method::PUT,
        b"POST" => Method::POST,
        b"HEAD" => Method::HEAD,
        b"TRACE" => Method::TRACE,
        b"PATCH" => Method::PATCH,
        b"DELETE" => Method::DELETE,
        b"CONNECT" => Method::CONNECT,
        b"OPTIONS" => Method::OPTIONS,
        custom if is_token(custom) => Method::from_bytes(custom).ok()?,
        _ => return None,
    };
    Some(method)
}

fn parse_version(bytes: &[u8], show: bool, line: &[u8]) -> Result<Version, ParseError> {
    match bytes {
        b"HTTP/1.1" => Ok(Version::HTTP_11),
        b"HTTP/1.0" => Ok(Version::HTTP_10),
        [] => Err(ParseError::invalid_request_line(show, line)),
        other if other.contains(&b' ') => Err(ParseError::invalid_request_line(show, line)),
        other => Err(ParseError::unrecognized_http_version(show, other)),
    }
}

#[inline]
pub(crate) fn memchr(needle: u8, haystack: &[u8]) -> Option<usize> {
    haystack.iter().position(|&b| b == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::parser::TargetForm;

    fn complete(input: &[u8]) -> (RequestLine, usize) {
        match parse_request_line(input, false).unwrap() {
            Status::Complete { value, consumed } => (value, consumed),
            Status::Partial { .. } => panic!("expected a complete request line"),
        }
    }

    #[test]
    fn parses_simple_get() {
        let (line, consumed) = complete(b"GET /foo?x=1 HTTP/1.1\r\nHost: example.com\r\n\r\n");
        assert_eq!(line.method, Method::GET);
        assert_eq!(line.version, Version::HTTP_11);
        assert_eq!(line.target.path(), "/foo");
        assert_eq!(line.target.query(), Some("x=1"));
        assert_eq!(consumed, "GET /foo?x=1 HTTP/1.1\r\n".len());
    }

    #[test]
    fn custom_method_token() {
        let (line, _) = complete(b"PURGE /cache HTTP/1.0\r\n");
        assert_eq!(line.method.as_str(), "PURGE");
        assert_eq!(line.version, Version::HTTP_10);
        assert_eq!(line.target.form(), TargetForm::Origin);
    }

    #[test]
    fn incomplete_until_lf() {
        for len in 0..b"GET / HTTP/1.1\r".len() {
            let input = &b"GET / HTTP/1.1\r"[..len];
            assert!(matches!(
                parse_request_line(input, false).unwrap(),
                Status::Partial { consumed: 0, examined } if examined == len
            ));
        }
    }

    #[test]
    fn malformed_lines() {
        for input in [
            &b"GET / HTTP/1.1\n"[..],
            b"G(T / HTTP/1.1\r\n",
            b"GET  / HTTP/1.1\r\n",
            b"GET /\r\n",
            b"GET / \r\n",
            b" / HTTP/1.1\r\n",
            b"GET /a\x01b HTTP/1.1\r\n",
        ] {
            let error = parse_request_line(input, false).unwrap_err();
            assert!(
                matches!(error, ParseError::InvalidRequestLine { .. } | ParseError::InvalidRequestTarget { .. }),
                "{input:?} -> {error}"
            );
        }
    }

    #[test]
    fn unknown_versions() {
        for input in [&b"GET / HTTP/2.0\r\n"[..], b"GET / HTTP/1.2\r\n", b"GET / http/1.1\r\n"] {
            assert!(matches!(
                parse_request_line(input, false),
                Err(ParseError::UnrecognizedHttpVersion { .. })
            ));
        }
    }

    #[test]
    fn target_method_pairing() {
        assert!(matches!(parse_request_line(b"GET * HTTP/1.1\r\n", false), Err(ParseError::OptionsMethodRequired)));
        assert!(matches!(
            parse_request_line(b"GET example.com:80 HTTP/1.1\r\n", false),
            Err(ParseError::ConnectMethodRequired)
        ));
        let (line, _) = complete(b"CONNECT example.com:80 HTTP/1.1\r\n");
        assert_eq!(line.target.form(), TargetForm::Authority);
    }

    #[test]
    fn detail_is_echoed_when_enabled() {
        let error = parse_request_line(b"GET / HTTP/1.1\n", true).unwrap_err();
        assert_eq!(error.to_string(), "invalid request line: 'GET / HTTP/1.1\\x0A'");
    }
}
