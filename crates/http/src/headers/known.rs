//! Well-known header name tables.
//!
//! Each table is declared once with [`known_headers!`], which generates the
//! slot enum, its canonical names and a length-bucketed lookup used by the
//! parser fast path. The declaration order is the serialization order.

use once_cell::sync::Lazy;

/// A header name with a dedicated, bit-indexed slot in a [`HeaderStore`](super::HeaderStore).
pub trait KnownHeader: Copy + Eq + std::fmt::Debug + Send + Sync + 'static {
    /// Every known header, in declaration order.
    const ALL: &'static [Self];

    /// The canonical wire name.
    fn name(self) -> &'static str;

    /// The slot index, equal to the position in [`KnownHeader::ALL`].
    fn slot(self) -> usize;

    /// Case-insensitive lookup of a raw header name.
    fn lookup(name: &[u8]) -> Option<Self>;
}

/// Length-bucketed lookup table: `buckets[len]` holds the headers whose name has `len` bytes.
pub(crate) struct LengthBuckets<K: 'static> {
    buckets: Vec<Vec<K>>,
}

impl<K: KnownHeader> LengthBuckets<K> {
    fn build() -> Self {
        let max_len = K::ALL.iter().map(|k| k.name().len()).max().unwrap_or(0);
        let mut buckets = vec![Vec::new(); max_len + 1];
        for &known in K::ALL {
            buckets[known.name().len()].push(known);
        }
        Self { buckets }
    }

    #[inline]
    pub(crate) fn find(&self, name: &[u8]) -> Option<K> {
        self.buckets
            .get(name.len())?
            .iter()
            .copied()
            .find(|known| known.name().as_bytes().eq_ignore_ascii_case(name))
    }
}

macro_rules! known_headers {
    (
        $(#[$meta:meta])*
        $vis:vis enum $ty:ident, $buckets:ident {
            $($variant:ident => $name:literal,)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        $vis enum $ty {
            $($variant,)*
        }

        static $buckets: Lazy<LengthBuckets<$ty>> = Lazy::new(LengthBuckets::build);

        impl KnownHeader for $ty {
            const ALL: &'static [Self] = &[$($ty::$variant,)*];

            #[inline]
            fn name(self) -> &'static str {
                match self {
                    $($ty::$variant => $name,)*
                }
            }

            #[inline]
            fn slot(self) -> usize {
                self as usize
            }

            #[inline]
            fn lookup(name: &[u8]) -> Option<Self> {
                $buckets.find(name)
            }
        }
    };
}

known_headers! {
    /// Request headers with dedicated slots.
    pub enum KnownRequestHeader, REQUEST_BUCKETS {
        CacheControl => "Cache-Control",
        Connection => "Connection",
        Date => "Date",
        KeepAlive => "Keep-Alive",
        Pragma => "Pragma",
        Trailer => "Trailer",
        TransferEncoding => "Transfer-Encoding",
        Upgrade => "Upgrade",
        Via => "Via",
        Warning => "Warning",
        Allow => "Allow",
        ContentType => "Content-Type",
        ContentEncoding => "Content-Encoding",
        ContentLanguage => "Content-Language",
        ContentLocation => "Content-Location",
        ContentMd5 => "Content-MD5",
        ContentRange => "Content-Range",
        Expires => "Expires",
        LastModified => "Last-Modified",
        Accept => "Accept",
        AcceptCharset => "Accept-Charset",
        AcceptEncoding => "Accept-Encoding",
        AcceptLanguage => "Accept-Language",
        Authorization => "Authorization",
        Cookie => "Cookie",
        Expect => "Expect",
        From => "From",
        Host => "Host",
        IfMatch => "If-Match",
        IfModifiedSince => "If-Modified-Since",
        IfNoneMatch => "If-None-Match",
        IfRange => "If-Range",
        IfUnmodifiedSince => "If-Unmodified-Since",
        MaxForwards => "Max-Forwards",
        ProxyAuthorization => "Proxy-Authorization",
        Referer => "Referer",
        Range => "Range",
        Te => "TE",
        Translate => "Translate",
        UserAgent => "User-Agent",
        Dnt => "DNT",
        UpgradeInsecureRequests => "Upgrade-Insecure-Requests",
        RequestId => "Request-Id",
        CorrelationContext => "Correlation-Context",
        TraceParent => "TraceParent",
        TraceState => "TraceState",
        Origin => "Origin",
        AccessControlRequestMethod => "Access-Control-Request-Method",
        AccessControlRequestHeaders => "Access-Control-Request-Headers",
    }
}

known_headers! {
    /// Response headers with dedicated slots.
    pub enum KnownResponseHeader, RESPONSE_BUCKETS {
        CacheControl => "Cache-Control",
        Connection => "Connection",
        Date => "Date",
        KeepAlive => "Keep-Alive",
        Pragma => "Pragma",
        Trailer => "Trailer",
        TransferEncoding => "Transfer-Encoding",
        Upgrade => "Upgrade",
        Via => "Via",
        Warning => "Warning",
        Allow => "Allow",
        ContentType => "Content-Type",
        ContentEncoding => "Content-Encoding",
        ContentLanguage => "Content-Language",
        ContentLocation => "Content-Location",
        ContentMd5 => "Content-MD5",
        ContentRange => "Content-Range",
        Expires => "Expires",
        LastModified => "Last-Modified",
        AcceptRanges => "Accept-Ranges",
        Age => "Age",
        AltSvc => "Alt-Svc",
        ETag => "ETag",
        Location => "Location",
        ProxyAuthenticate => "Proxy-Authenticate",
        RetryAfter => "Retry-After",
        Server => "Server",
        SetCookie => "Set-Cookie",
        Vary => "Vary",
        WwwAuthenticate => "WWW-Authenticate",
        AccessControlAllowCredentials => "Access-Control-Allow-Credentials",
        AccessControlAllowHeaders => "Access-Control-Allow-Headers",
        AccessControlAllowMethods => "Access-Control-Allow-Methods",
        AccessControlAllowOrigin => "Access-Control-Allow-Origin",
        AccessControlExposeHeaders => "Access-Control-Expose-Headers",
        AccessControlMaxAge => "Access-Control-Max-Age",
    }
}

/// Canonical name of the specially stored `Content-Length` header.
pub const CONTENT_LENGTH: &str = "Content-Length";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_follow_declaration_order() {
        for (index, known) in KnownRequestHeader::ALL.iter().enumerate() {
            assert_eq!(known.slot(), index);
        }
        for (index, known) in KnownResponseHeader::ALL.iter().enumerate() {
            assert_eq!(known.slot(), index);
        }
    }

    #[test]
    fn tables_fit_in_a_bit_mask() {
        assert!(KnownRequestHeader::ALL.len() <= 64);
        assert!(KnownResponseHeader::ALL.len() <= 64);
    }

    #[test]
    fn lookup_is_case_insensitive() {
        assert_eq!(KnownRequestHeader::lookup(b"host"), Some(KnownRequestHeader::Host));
        assert_eq!(KnownRequestHeader::lookup(b"HOST"), Some(KnownRequestHeader::Host));
        assert_eq!(KnownRequestHeader::lookup(b"transfer-ENCODING"), Some(KnownRequestHeader::TransferEncoding));
        assert_eq!(KnownResponseHeader::lookup(b"www-authenticate"), Some(KnownResponseHeader::WwwAuthenticate));
    }

    #[test]
    fn lookup_misses_fall_through() {
        assert_eq!(KnownRequestHeader::lookup(b"X-Custom"), None);
        assert_eq!(KnownRequestHeader::lookup(b"Hos"), None);
        assert_eq!(KnownRequestHeader::lookup(b""), None);
        assert_eq!(KnownRequestHeader::lookup(b"Content-Length"), None);
        assert_eq!(KnownResponseHeader::lookup(b"Host"), None);
    }

    #[test]
    fn every_name_round_trips() {
        for &known in KnownRequestHeader::ALL {
            assert_eq!(KnownRequestHeader::lookup(known.name().as_bytes()), Some(known));
            assert_eq!(KnownRequestHeader::lookup(known.name().to_ascii_lowercase().as_bytes()), Some(known));
        }
        for &known in KnownResponseHeader::ALL {
            assert_eq!(KnownResponseHeader::lookup(known.name().as_bytes()), Some(known));
        }
    }
}
