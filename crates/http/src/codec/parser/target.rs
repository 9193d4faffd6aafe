//! Request-target forms (RFC 7230 §5.3) and `Host` validation.

use http::{HeaderValue, Method, Uri, Version};

use super::chars::{is_authority_char, is_host_char};
use crate::ensure;
use crate::protocol::ParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetForm {
    /// `/path?query`
    Origin,
    /// `http://host/path?query`
    Absolute,
    /// `host:port`, CONNECT only
    Authority,
    /// `*`, OPTIONS only
    Asterisk,
}

/// Protocol view of a request-target, attached to every request as an extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTarget {
    form: TargetForm,
    raw: String,
    path: String,
    query_start: Option<usize>,
    path_is_percent_encoded: bool,
}

impl RequestTarget {
    pub fn form(&self) -> TargetForm {
        self.form
    }

    /// The target exactly as sent on the request line.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Percent-decoded path with dot segments removed. Empty for authority and asterisk forms.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Raw, undecoded query without the leading `?`.
    pub fn query(&self) -> Option<&str> {
        self.query_start.map(|start| &self.raw[start + 1..])
    }

    pub fn path_is_percent_encoded(&self) -> bool {
        self.path_is_percent_encoded
    }

    fn new(form: TargetForm, raw: &str, path: String, path_is_percent_encoded: bool) -> Self {
        let query_start = match form {
            TargetForm::Origin | TargetForm::Absolute => raw.find('?'),
            TargetForm::Authority | TargetForm::Asterisk => None,
        };
        Self { form, raw: raw.to_owned(), path, query_start, path_is_percent_encoded }
    }
}

/// Selects the target form from the first bytes and validates it against the method.
pub fn parse_target(method: &Method, raw: &[u8], show: bool) -> Result<(RequestTarget, Uri), ParseError> {
    ensure!(!raw.is_empty() && raw.is_ascii(), ParseError::invalid_request_target(show, raw));
    // ascii checked above
    let raw_str = std::str::from_utf8(raw).map_err(|_e| ParseError::invalid_request_target(show, raw))?;

    if raw[0] == b'/' {
        let uri = parse_uri(raw_str, show)?;
        let path_end = raw_str.find('?').unwrap_or(raw_str.len());
        let (path, encoded) = normalize_path(&raw_str[..path_end]);
        return Ok((RequestTarget::new(TargetForm::Origin, raw_str, path, encoded), uri));
    }

    if raw == b"*" {
        ensure!(method == Method::OPTIONS, ParseError::OptionsMethodRequired);
        let uri = parse_uri(raw_str, show)?;
        return Ok((RequestTarget::new(TargetForm::Asterisk, raw_str, String::new(), false), uri));
    }

    if known_scheme(raw).is_some() {
        let uri = parse_uri(raw_str, show)?;
        ensure!(uri.authority().is_some(), ParseError::invalid_request_target(show, raw));
        let (path, encoded) = normalize_path(uri.path());
        return Ok((RequestTarget::new(TargetForm::Absolute, raw_str, path, encoded), uri));
    }

    // only a quick character scan, the full authority grammar is not enforced
    ensure!(raw.iter().all(|&b| is_authority_char(b)), ParseError::invalid_request_target(show, raw));
    ensure!(method == Method::CONNECT, ParseError::ConnectMethodRequired);
    let uri = parse_uri(raw_str, show)?;
    Ok((RequestTarget::new(TargetForm::Authority, raw_str, String::new(), false), uri))
}

fn parse_uri(raw: &str, show: bool) -> Result<Uri, ParseError> {
    raw.parse::<Uri>().map_err(|_e| ParseError::invalid_request_target(show, raw.as_bytes()))
}

/// Returns the default port of a recognized `http://` or `https://` prefix.
fn known_scheme(raw: &[u8]) -> Option<u16> {
    let starts_with = |prefix: &[u8]| raw.len() >= prefix.len() && raw[..prefix.len()].eq_ignore_ascii_case(prefix);
    if starts_with(b"http://") {
        Some(80)
    } else if starts_with(b"https://") {
        Some(443)
    } else {
        None
    }
}

/// Percent-decodes a path (leaving `%2F` encoded) and removes dot segments.
///
/// Returns the normalized path and whether the raw path contained a percent escape.
pub fn normalize_path(raw: &str) -> (String, bool) {
    let encoded = raw.contains('%');
    let decoded = if encoded {
        String::from_utf8(percent_decode(raw.as_bytes())).unwrap_or_else(|_| raw.to_owned())
    } else {
        raw.to_owned()
    };
    (remove_dot_segments(&decoded), encoded)
}

fn percent_decode(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        if input[i] == b'%'
            && let (Some(hi), Some(lo)) = (input.get(i + 1).and_then(hex_value), input.get(i + 2).and_then(hex_value))
        {
            let decoded = (hi << 4) | lo;
            if decoded == b'/' {
                out.extend_from_slice(&input[i..i + 3]);
            } else {
                out.push(decoded);
            }
            i += 3;
            continue;
        }
        out.push(input[i]);
        i += 1;
    }
    out
}

fn hex_value(b: &u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// RFC 3986 §5.2.4, applied to an absolute path.
pub fn remove_dot_segments(path: &str) -> String {
    if !path.split('/').any(|segment| segment == "." || segment == "..") {
        return path.to_owned();
    }

    let mut output: Vec<&str> = Vec::new();
    let segments: Vec<&str> = path.split('/').skip(1).collect();
    let last = segments.len().saturating_sub(1);
    let mut trailing_slash = false;

    for (index, segment) in segments.iter().enumerate() {
        match *segment {
            "." => trailing_slash = index == last,
            ".." => {
                output.pop();
                trailing_slash = index == last;
            }
            segment => {
                output.push(segment);
                trailing_slash = false;
            }
        }
    }

    let mut normalized = String::with_capacity(path.len());
    for segment in &output {
        normalized.push('/');
        normalized.push_str(segment);
    }
    if trailing_slash || normalized.is_empty() {
        normalized.push('/');
    }
    normalized
}

/// Checks the `Host` header of an HTTP/1.1 request against the request-target.
pub fn validate_host(
    version: Version,
    target: &RequestTarget,
    uri: &Uri,
    host: &[HeaderValue],
    show: bool,
) -> Result<(), ParseError> {
    if version == Version::HTTP_10 {
        return Ok(());
    }

    let value = match host {
        [] => return Err(ParseError::MissingHostHeader),
        [value] => value.as_bytes(),
        _ => return Err(ParseError::MultipleHostHeaders),
    };

    ensure!(value.iter().all(|&b| is_host_char(b)), ParseError::invalid_host_header(show, value));

    match target.form() {
        TargetForm::Authority => {
            ensure!(value.eq_ignore_ascii_case(target.raw().as_bytes()), ParseError::invalid_host_header(show, value));
        }
        TargetForm::Absolute => {
            let default_port = known_scheme(target.raw().as_bytes()).unwrap_or(80);
            let Some(authority) = uri.authority() else {
                return Err(ParseError::invalid_host_header(show, value));
            };
            let port = authority.port_u16().unwrap_or(default_port);
            let with_port = format!("{}:{port}", authority.host());
            let matches_default = port == default_port && value.eq_ignore_ascii_case(authority.host().as_bytes());
            ensure!(
                matches_default || value.eq_ignore_ascii_case(with_port.as_bytes()),
                ParseError::invalid_host_header(show, value)
            );
        }
        TargetForm::Origin | TargetForm::Asterisk => {}
    }
    Ok(())
}
