//! Cached `Date` header.
//!
//! Formatting an HTTP date on every response is wasted work when thousands of
//! responses share the same second. [`DateCache`] keeps the current value,
//! both as a [`HeaderValue`] and pre-encoded as `\r\nDate: <value>`, and
//! refreshes it on demand once the wall clock moves to the next second.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use arc_swap::ArcSwap;
use bytes::{BufMut, Bytes, BytesMut};
use http::HeaderValue;
use once_cell::sync::Lazy;
use tracing::trace;

const DATE_PREFIX: &[u8] = b"\r\nDate: ";

static DATE_CACHE: Lazy<DateCache> = Lazy::new(DateCache::new);

#[derive(Debug)]
struct Entry {
    second: u64,
    value: HeaderValue,
    raw: Bytes,
}

/// Process-wide cache of the `Date` header value.
#[derive(Debug)]
pub struct DateCache {
    current: ArcSwap<Entry>,
}

impl DateCache {
    fn new() -> Self {
        Self { current: ArcSwap::from_pointee(render(now_second())) }
    }

    /// Returns the shared instance.
    pub fn global() -> &'static DateCache {
        &DATE_CACHE
    }

    /// The current date as a header value and as its pre-encoded `\r\nDate: ...` line.
    pub fn current(&self) -> (HeaderValue, Bytes) {
        let second = now_second();
        let entry = self.current.load();
        if entry.second == second {
            return (entry.value.clone(), entry.raw.clone());
        }

        let fresh = Arc::new(render(second));
        let result = (fresh.value.clone(), fresh.raw.clone());
        self.current.store(fresh);
        trace!(second, "date header refreshed");
        result
    }
}

fn now_second() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or_default()
}

fn render(second: u64) -> Entry {
    let mut buf = faf_http_date::get_date_buff_no_key();
    faf_http_date::get_date_no_key(&mut buf);

    let mut raw = BytesMut::with_capacity(DATE_PREFIX.len() + buf.len());
    raw.put_slice(DATE_PREFIX);
    raw.put_slice(&buf);
    let raw = raw.freeze();

    // the formatted date is plain ascii, a failed conversion only leaves the value empty
    let value = HeaderValue::from_maybe_shared(raw.slice(DATE_PREFIX.len()..))
        .unwrap_or_else(|_invalid| HeaderValue::from_static(""));
    Entry { second, value, raw }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_line_matches_the_value() {
        let (value, raw) = DateCache::global().current();
        assert!(raw.starts_with(b"\r\nDate: "));
        assert_eq!(&raw[DATE_PREFIX.len()..], value.as_bytes());
        assert!(value.to_str().unwrap().ends_with(" GMT"));
        assert_eq!(value.len(), 29);
    }

    #[test]
    fn repeated_reads_share_the_entry() {
        let cache = DateCache::new();
        let (first, _) = cache.current();
        let (second, _) = cache.current();
        // the second may tick over between the reads, the format never changes
        assert_eq!(first.len(), second.len());
    }
}
