use bytes::{Bytes, BytesMut};
use http::{HeaderMap, HeaderValue};

use crate::headers::known::KnownResponseHeader;
use crate::headers::{HeaderCollection, HeaderStore, comma_tokens};
use crate::protocol::HeaderError;

static CONNECTION_CLOSE: &[u8] = b"\r\nConnection: close";
static CONNECTION_KEEP_ALIVE: &[u8] = b"\r\nConnection: keep-alive";
static TRANSFER_ENCODING_CHUNKED: &[u8] = b"\r\nTransfer-Encoding: chunked";

/// Headers of the response being produced on a connection.
///
/// The collection becomes read-only once the response head has been
/// written; later mutations fail with [`HeaderError::ReadOnly`].
#[derive(Debug, Clone, Default)]
pub struct ResponseHeaders {
    store: HeaderStore<KnownResponseHeader>,
    read_only: bool,
}

impl ResponseHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears every header and makes the collection writable again.
    pub fn reset(&mut self) {
        self.store.clear();
        self.read_only = false;
    }

    pub fn set_read_only(&mut self) {
        self.read_only = true;
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    #[inline]
    pub fn connection(&self) -> &[HeaderValue] {
        self.store.get_known(KnownResponseHeader::Connection)
    }

    #[inline]
    pub fn transfer_encoding(&self) -> &[HeaderValue] {
        self.store.get_known(KnownResponseHeader::TransferEncoding)
    }

    #[inline]
    pub fn has_connection(&self) -> bool {
        self.store.has_known(KnownResponseHeader::Connection)
    }

    #[inline]
    pub fn has_transfer_encoding(&self) -> bool {
        self.store.has_known(KnownResponseHeader::TransferEncoding)
    }

    /// True if a `Connection` header carries the given token.
    pub fn connection_has_token(&self, token: &str) -> bool {
        comma_tokens(self.connection()).any(|t| t.eq_ignore_ascii_case(token.as_bytes()))
    }

    /// True if the final transfer coding is `chunked`.
    pub fn is_chunked(&self) -> bool {
        comma_tokens(self.transfer_encoding()).last().is_some_and(|t| t.eq_ignore_ascii_case(b"chunked"))
    }

    pub fn set_content_length(&mut self, length: Option<u64>) -> Result<(), HeaderError> {
        self.store_mut()?.set_content_length(length);
        Ok(())
    }

    pub fn set_raw_connection(&mut self, keep_alive: bool) -> Result<(), HeaderError> {
        let (value, raw) = if keep_alive {
            ("keep-alive", CONNECTION_KEEP_ALIVE)
        } else {
            ("close", CONNECTION_CLOSE)
        };
        self.store_mut()?.set_raw(
            KnownResponseHeader::Connection,
            HeaderValue::from_static(value),
            Bytes::from_static(raw),
        );
        Ok(())
    }

    pub fn set_raw_transfer_encoding_chunked(&mut self) -> Result<(), HeaderError> {
        self.store_mut()?.set_raw(
            KnownResponseHeader::TransferEncoding,
            HeaderValue::from_static("chunked"),
            Bytes::from_static(TRANSFER_ENCODING_CHUNKED),
        );
        Ok(())
    }

    /// Sets `Date` from a value and its pre-encoded `\r\nDate: ...` form.
    pub fn set_raw_date(&mut self, value: HeaderValue, raw: Bytes) -> Result<(), HeaderError> {
        self.store_mut()?.set_raw(KnownResponseHeader::Date, value, raw);
        Ok(())
    }

    /// Sets `Server` from a value and its pre-encoded `\r\nServer: ...` form.
    pub fn set_raw_server(&mut self, value: HeaderValue, raw: Bytes) -> Result<(), HeaderError> {
        self.store_mut()?.set_raw(KnownResponseHeader::Server, value, raw);
        Ok(())
    }

    /// Copies every entry of an application-built [`HeaderMap`].
    pub fn extend_from_header_map(&mut self, map: &HeaderMap) -> Result<(), HeaderError> {
        let store = self.store_mut()?;
        for (name, value) in map {
            store.append(name.as_str(), value.clone())?;
        }
        Ok(())
    }

    pub fn serialize_to(&self, dst: &mut BytesMut) {
        self.store.serialize_to(dst);
    }
}

impl HeaderCollection for ResponseHeaders {
    type Known = KnownResponseHeader;

    fn store(&self) -> &HeaderStore<Self::Known> {
        &self.store
    }

    fn store_mut(&mut self) -> Result<&mut HeaderStore<Self::Known>, HeaderError> {
        if self.read_only {
            return Err(HeaderError::ReadOnly);
        }
        Ok(&mut self.store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn serialized(headers: &ResponseHeaders) -> String {
        let mut dst = BytesMut::new();
        headers.serialize_to(&mut dst);
        String::from_utf8(dst.to_vec()).unwrap()
    }

    #[test]
    fn serializes_in_declaration_order() {
        let mut headers = ResponseHeaders::new();
        headers.set_str("X-Powered-By", "tests").unwrap();
        headers.set_str("Server", "micro-h1").unwrap();
        headers.set_content_length(Some(5)).unwrap();
        headers.set_raw_connection(false).unwrap();
        headers.set_str("Content-Type", "text/plain").unwrap();

        assert_eq!(
            serialized(&headers),
            "\r\nConnection: close\r\nContent-Type: text/plain\r\nServer: micro-h1\r\nContent-Length: 5\r\nX-Powered-By: tests"
        );
    }

    #[test]
    fn set_cookie_keeps_every_value() {
        let mut headers = ResponseHeaders::new();
        headers.append("Set-Cookie", HeaderValue::from_static("a=1")).unwrap();
        headers.append("set-cookie", HeaderValue::from_static("b=2")).unwrap();
        assert_eq!(serialized(&headers), "\r\nSet-Cookie: a=1\r\nSet-Cookie: b=2");
    }

    #[test]
    fn values_with_line_breaks_are_rejected() {
        let mut headers = ResponseHeaders::new();
        assert_eq!(headers.set_str("Location", "/a\r\nX-Evil: 1"), Err(HeaderError::InvalidHeaderCharacters));
        assert_eq!(headers.count(), 0);
    }

    #[test]
    fn read_only_after_head_is_written() {
        let mut headers = ResponseHeaders::new();
        headers.set_str("Content-Type", "text/plain").unwrap();
        headers.set_read_only();

        assert_eq!(headers.set_str("Content-Type", "text/html"), Err(HeaderError::ReadOnly));
        assert_eq!(headers.remove("Content-Type"), Err(HeaderError::ReadOnly));
        assert_eq!(headers.set_content_length(Some(1)), Err(HeaderError::ReadOnly));

        headers.reset();
        assert!(!headers.is_read_only());
        assert_eq!(headers.count(), 0);
    }

    #[test]
    fn connection_and_transfer_encoding_tokens() {
        let mut headers = ResponseHeaders::new();
        headers.set_str("Connection", "Upgrade, Keep-Alive").unwrap();
        headers.set_str("Transfer-Encoding", "gzip, chunked").unwrap();
        assert!(headers.connection_has_token("keep-alive"));
        assert!(!headers.connection_has_token("close"));
        assert!(headers.is_chunked());

        headers.set_str("Transfer-Encoding", "chunked, gzip").unwrap();
        assert!(!headers.is_chunked());
    }

    #[test]
    fn extend_from_header_map_validates_content_length() {
        let mut map = HeaderMap::new();
        map.insert(http::header::CONTENT_LENGTH, HeaderValue::from_static("abc"));
        let mut headers = ResponseHeaders::new();
        assert_eq!(headers.extend_from_header_map(&map), Err(HeaderError::InvalidContentLength));

        map.insert(http::header::CONTENT_LENGTH, HeaderValue::from_static("12"));
        map.insert(http::header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        let mut headers = ResponseHeaders::new();
        headers.extend_from_header_map(&map).unwrap();
        assert_eq!(headers.content_length(), Some(12));
        assert_eq!(headers.get("content-type"), &[HeaderValue::from_static("text/plain")]);
    }
}
