use std::fmt;
use std::io;
use std::sync::Arc;

use http::StatusCode;
use thiserror::Error;

use crate::utils::escape_detail;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request error: {source}")]
    RequestError {
        #[from]
        source: ParseError,
    },

    #[error("response error: {source}")]
    ResponseError {
        #[from]
        source: SendError,
    },
}

/// Optional, already sanitized client input attached to a rejection.
///
/// Detail is only captured when the server runs with `show_error_details`,
/// so raw client bytes never reach logs or responses by default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Detail(Option<String>);

impl Detail {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn capture(show: bool, raw: &[u8]) -> Self {
        if show { Self(Some(escape_detail(raw))) } else { Self(None) }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl fmt::Display for Detail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(detail) => write!(f, ": '{detail}'"),
            None => Ok(()),
        }
    }
}

/// A typed rejection of the request, or an I/O failure while reading it.
///
/// Cloneable so the body pump can hand the same failure to the application
/// and to the connection.
#[derive(Error, Debug, Clone)]
pub enum ParseError {
    #[error("invalid request line{detail}")]
    InvalidRequestLine { detail: Detail },

    #[error("invalid request target{detail}")]
    InvalidRequestTarget { detail: Detail },

    #[error("invalid request header{detail}")]
    InvalidRequestHeader { detail: Detail },

    #[error("request headers are missing the terminating CRLF")]
    InvalidRequestHeadersNoCrlf,

    #[error("invalid characters in header name")]
    InvalidCharactersInHeaderName,

    #[error("invalid content-length{detail}")]
    InvalidContentLength { detail: Detail },

    #[error("multiple content-length headers")]
    MultipleContentLengths,

    #[error("unexpected end of request content")]
    UnexpectedEndOfRequestContent,

    #[error("bad chunk suffix")]
    BadChunkSuffix,

    #[error("bad chunk size data")]
    BadChunkSizeData,

    #[error("chunked request incomplete")]
    ChunkedRequestIncomplete,

    #[error("request line too long")]
    RequestLineTooLong,

    #[error("request headers exceed the maximum total size")]
    HeadersExceedMaxTotalSize,

    #[error("request contains too many headers")]
    TooManyHeaders,

    #[error("request body too large")]
    RequestBodyTooLarge,

    #[error("request headers timed out")]
    RequestHeadersTimeout,

    #[error("reading the request body timed out")]
    RequestBodyTimeout,

    #[error("final transfer coding is not chunked{detail}")]
    FinalTransferCodingNotChunked { detail: Detail },

    #[error("{method} request requires a content-length or chunked transfer-encoding")]
    LengthRequired { method: String },

    #[error("{method} request requires a content-length for HTTP/1.0")]
    LengthRequiredHttp10 { method: String },

    #[error("method must be OPTIONS for an asterisk-form request target")]
    OptionsMethodRequired,

    #[error("method must be CONNECT for an authority-form request target")]
    ConnectMethodRequired,

    #[error("request is missing the host header")]
    MissingHostHeader,

    #[error("request contains multiple host headers")]
    MultipleHostHeaders,

    #[error("invalid host header{detail}")]
    InvalidHostHeader { detail: Detail },

    #[error("upgrade request cannot have a payload")]
    UpgradeRequestCannotHavePayload,

    #[error("unrecognized HTTP version{detail}")]
    UnrecognizedHttpVersion { detail: Detail },

    #[error("io error: {source}")]
    Io { source: Arc<io::Error> },
}

impl From<io::Error> for ParseError {
    fn from(e: io::Error) -> Self {
        Self::Io { source: Arc::new(e) }
    }
}

impl ParseError {
    pub fn invalid_request_line(show: bool, raw: &[u8]) -> Self {
        Self::InvalidRequestLine { detail: Detail::capture(show, raw) }
    }

    pub fn invalid_request_target(show: bool, raw: &[u8]) -> Self {
        Self::InvalidRequestTarget { detail: Detail::capture(show, raw) }
    }

    pub fn invalid_request_header(show: bool, raw: &[u8]) -> Self {
        Self::InvalidRequestHeader { detail: Detail::capture(show, raw) }
    }

    pub fn invalid_content_length(show: bool, raw: &[u8]) -> Self {
        Self::InvalidContentLength { detail: Detail::capture(show, raw) }
    }

    pub fn invalid_host_header(show: bool, raw: &[u8]) -> Self {
        Self::InvalidHostHeader { detail: Detail::capture(show, raw) }
    }

    pub fn final_transfer_coding_not_chunked(show: bool, raw: &[u8]) -> Self {
        Self::FinalTransferCodingNotChunked { detail: Detail::capture(show, raw) }
    }

    pub fn unrecognized_http_version(show: bool, raw: &[u8]) -> Self {
        Self::UnrecognizedHttpVersion { detail: Detail::capture(show, raw) }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: Arc::new(e.into()) }
    }

    /// The status code of the error response for this rejection.
    ///
    /// Returns `None` for transport failures, where no response can be written.
    pub fn status_code(&self) -> Option<StatusCode> {
        let status = match self {
            Self::Io { .. } => return None,
            Self::RequestHeadersTimeout | Self::RequestBodyTimeout => StatusCode::REQUEST_TIMEOUT,
            Self::LengthRequired { .. } | Self::LengthRequiredHttp10 { .. } => StatusCode::LENGTH_REQUIRED,
            Self::RequestBodyTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::RequestLineTooLong => StatusCode::URI_TOO_LONG,
            Self::HeadersExceedMaxTotalSize | Self::TooManyHeaders => StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE,
            Self::UnrecognizedHttpVersion { .. } => StatusCode::HTTP_VERSION_NOT_SUPPORTED,
            _ => StatusCode::BAD_REQUEST,
        };
        Some(status)
    }

    /// Returns true if the error comes from the transport rather than the client's bytes.
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. })
    }
}

impl From<HeaderError> for ParseError {
    fn from(e: HeaderError) -> Self {
        match e {
            HeaderError::MultipleContentLengths => Self::MultipleContentLengths,
            HeaderError::InvalidContentLength => Self::InvalidContentLength { detail: Detail::none() },
            HeaderError::InvalidHeaderName => Self::InvalidCharactersInHeaderName,
            HeaderError::InvalidHeaderCharacters | HeaderError::ReadOnly => {
                Self::InvalidRequestHeader { detail: Detail::none() }
            }
        }
    }
}

/// Errors raised by the header collection API.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderError {
    #[error("content-length must be a non-negative base-10 integer")]
    InvalidContentLength,

    #[error("content-length may only be specified once")]
    MultipleContentLengths,

    #[error("header value contains forbidden control characters")]
    InvalidHeaderCharacters,

    #[error("header name is not a valid token")]
    InvalidHeaderName,

    #[error("headers are read-only once the response has started")]
    ReadOnly,
}

#[derive(Error, Debug)]
pub enum SendError {
    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("invalid response header: {source}")]
    InvalidHeader {
        #[from]
        source: HeaderError,
    },

    #[error("a {status} response cannot carry transfer-encoding")]
    TransferEncodingWithoutBody { status: StatusCode },

    #[error("the response has been closed")]
    Closed,

    #[error("the write was canceled")]
    Canceled,

    #[error("writing the response timed out")]
    Timeout,

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl SendError {
    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}
