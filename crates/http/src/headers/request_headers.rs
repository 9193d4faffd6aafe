use http::header::HeaderName;
use http::{HeaderMap, HeaderValue};

use crate::codec::HeadersHandler;
use crate::headers::known::KnownRequestHeader;
use crate::headers::{HeaderCollection, HeaderStore};
use crate::protocol::HeaderError;

/// Headers of one parsed request, reused across requests on a connection.
#[derive(Debug, Clone, Default)]
pub struct RequestHeaders {
    store: HeaderStore<KnownRequestHeader>,
}

impl RequestHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parser fast path, see [`HeaderStore::append_raw`].
    #[inline]
    pub fn append_raw(&mut self, name: &[u8], value: HeaderValue) -> Result<(), HeaderError> {
        self.store.append_raw(name, value)
    }

    pub fn reset(&mut self) {
        self.store.clear();
    }

    #[inline]
    pub fn host(&self) -> &[HeaderValue] {
        self.store.get_known(KnownRequestHeader::Host)
    }

    #[inline]
    pub fn connection(&self) -> &[HeaderValue] {
        self.store.get_known(KnownRequestHeader::Connection)
    }

    #[inline]
    pub fn transfer_encoding(&self) -> &[HeaderValue] {
        self.store.get_known(KnownRequestHeader::TransferEncoding)
    }

    #[inline]
    pub fn expect(&self) -> &[HeaderValue] {
        self.store.get_known(KnownRequestHeader::Expect)
    }

    #[inline]
    pub fn upgrade(&self) -> &[HeaderValue] {
        self.store.get_known(KnownRequestHeader::Upgrade)
    }

    #[inline]
    pub fn content_type(&self) -> &[HeaderValue] {
        self.store.get_known(KnownRequestHeader::ContentType)
    }

    pub fn set_host(&mut self, value: HeaderValue) {
        self.store.set_known(KnownRequestHeader::Host, [value]);
    }

    /// Copies the headers into an [`http::HeaderMap`] in enumeration order.
    pub fn to_header_map(&self) -> HeaderMap {
        let mut map = HeaderMap::with_capacity(self.store.count());
        for (name, values) in self.store.iter() {
            // every stored name has been validated as a token
            let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
                continue;
            };
            for value in values {
                map.append(name.clone(), value.clone());
            }
        }
        map
    }
}

impl HeaderCollection for RequestHeaders {
    type Known = KnownRequestHeader;

    fn store(&self) -> &HeaderStore<Self::Known> {
        &self.store
    }

    fn store_mut(&mut self) -> Result<&mut HeaderStore<Self::Known>, HeaderError> {
        Ok(&mut self.store)
    }
}

impl HeadersHandler for RequestHeaders {
    fn on_header(&mut self, name: &[u8], value: &[u8]) -> Result<(), HeaderError> {
        let value = HeaderValue::from_bytes(value).map_err(|_e| HeaderError::InvalidHeaderCharacters)?;
        self.store.append_raw(name, value)
    }
}
