//! Header collections for requests and responses.
//!
//! Both collections compose a [`HeaderStore`] keyed by their own table of
//! well-known names and expose the common map operations through
//! [`HeaderCollection`]. The request side is filled by the parser through
//! the raw-byte fast path, the response side is filled by the application
//! and serialized straight into the output buffer.

mod known;
mod request_headers;
mod response_headers;
mod store;

use http::HeaderValue;

pub use known::{CONTENT_LENGTH, KnownHeader, KnownRequestHeader, KnownResponseHeader};
pub use request_headers::RequestHeaders;
pub use response_headers::ResponseHeaders;
pub use store::{HeaderStore, Iter, parse_content_length};

use crate::codec::parser::chars::trim_ows;
use crate::protocol::HeaderError;

/// Map-like operations shared by request and response headers.
///
/// Names are compared case-insensitively. Every getter returns an empty
/// slice for an absent header.
pub trait HeaderCollection {
    type Known: KnownHeader;

    fn store(&self) -> &HeaderStore<Self::Known>;

    /// Mutable access to the storage, refused once the collection is read-only.
    fn store_mut(&mut self) -> Result<&mut HeaderStore<Self::Known>, HeaderError>;

    fn get(&self, name: &str) -> &[HeaderValue] {
        self.store().get(name)
    }

    fn contains(&self, name: &str) -> bool {
        !self.get(name).is_empty()
    }

    fn set(&mut self, name: &str, values: Vec<HeaderValue>) -> Result<(), HeaderError> {
        self.store_mut()?.set(name, values)
    }

    /// Sets a single textual value, rejecting embedded CR, LF and NUL.
    fn set_str(&mut self, name: &str, value: &str) -> Result<(), HeaderError> {
        let value = header_value(value)?;
        self.set(name, vec![value])
    }

    fn append(&mut self, name: &str, value: HeaderValue) -> Result<(), HeaderError> {
        self.store_mut()?.append(name, value)
    }

    fn remove(&mut self, name: &str) -> Result<bool, HeaderError> {
        Ok(self.store_mut()?.remove(name))
    }

    fn clear(&mut self) -> Result<(), HeaderError> {
        self.store_mut()?.clear();
        Ok(())
    }

    fn count(&self) -> usize {
        self.store().count()
    }

    fn iter(&self) -> Iter<'_, Self::Known> {
        self.store().iter()
    }

    fn content_length(&self) -> Option<u64> {
        self.store().content_length()
    }
}

/// Builds a header value, rejecting the control characters that would break the one-line wire format.
pub fn header_value(value: &str) -> Result<HeaderValue, HeaderError> {
    if value.bytes().any(|b| matches!(b, b'\r' | b'\n' | b'\0')) {
        return Err(HeaderError::InvalidHeaderCharacters);
    }
    HeaderValue::from_str(value).map_err(|_invalid| HeaderError::InvalidHeaderCharacters)
}

/// Splits a comma-separated header into trimmed, non-empty tokens.
pub(crate) fn comma_tokens(values: &[HeaderValue]) -> impl Iterator<Item = &[u8]> {
    values
        .iter()
        .flat_map(|value| value.as_bytes().split(|&b| b == b','))
        .map(trim_ows)
        .filter(|token| !token.is_empty())
}
