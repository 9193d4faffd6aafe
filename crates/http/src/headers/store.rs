//! Bit-indexed header storage shared by request and response headers.

use std::fmt::Write;
use std::marker::PhantomData;

use bytes::{BufMut, Bytes, BytesMut};
use http::HeaderValue;

use crate::headers::known::{CONTENT_LENGTH, KnownHeader};
use crate::protocol::HeaderError;

/// Storage for a header collection.
///
/// Well-known names live in fixed slots tracked by a presence bit mask,
/// `Content-Length` is kept parsed, and every other name goes to an
/// insertion-ordered overflow list. Clearing keeps all allocations so a
/// store can be reused across requests on the same connection.
#[derive(Debug, Clone)]
pub struct HeaderStore<K> {
    bits: u64,
    known: Vec<Vec<HeaderValue>>,
    raw: Vec<Option<Bytes>>,
    content_length: Option<(u64, HeaderValue)>,
    unknown: Vec<(Box<str>, Vec<HeaderValue>)>,
    unknown_len: usize,
    _known: PhantomData<K>,
}

impl<K: KnownHeader> Default for HeaderStore<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: KnownHeader> HeaderStore<K> {
    pub fn new() -> Self {
        Self {
            bits: 0,
            known: vec![Vec::new(); K::ALL.len()],
            raw: vec![None; K::ALL.len()],
            content_length: None,
            unknown: Vec::new(),
            unknown_len: 0,
            _known: PhantomData,
        }
    }

    #[inline]
    fn bit(known: K) -> u64 {
        1u64 << known.slot()
    }

    #[inline]
    pub fn has_known(&self, known: K) -> bool {
        self.bits & Self::bit(known) != 0
    }

    #[inline]
    pub fn get_known(&self, known: K) -> &[HeaderValue] {
        if self.has_known(known) { &self.known[known.slot()] } else { &[] }
    }

    pub fn append_known(&mut self, known: K, value: HeaderValue) {
        let slot = known.slot();
        if !self.has_known(known) {
            self.known[slot].clear();
            self.bits |= Self::bit(known);
        }
        self.raw[slot] = None;
        self.known[slot].push(value);
    }

    pub fn set_known(&mut self, known: K, values: impl IntoIterator<Item = HeaderValue>) {
        let slot = known.slot();
        self.known[slot].clear();
        self.known[slot].extend(values);
        self.raw[slot] = None;
        if self.known[slot].is_empty() {
            self.bits &= !Self::bit(known);
        } else {
            self.bits |= Self::bit(known);
        }
    }

    /// Sets a single value together with its pre-encoded `\r\nName: value` wire form.
    pub fn set_raw(&mut self, known: K, value: HeaderValue, raw: Bytes) {
        let slot = known.slot();
        self.known[slot].clear();
        self.known[slot].push(value);
        self.raw[slot] = Some(raw);
        self.bits |= Self::bit(known);
    }

    pub fn remove_known(&mut self, known: K) -> bool {
        let present = self.has_known(known);
        self.bits &= !Self::bit(known);
        self.raw[known.slot()] = None;
        present
    }

    #[inline]
    pub fn content_length(&self) -> Option<u64> {
        self.content_length.as_ref().map(|(length, _)| *length)
    }

    pub fn set_content_length(&mut self, length: Option<u64>) {
        self.content_length = length.map(|length| (length, HeaderValue::from(length)));
    }

    fn set_content_length_value(&mut self, value: &HeaderValue) -> Result<(), HeaderError> {
        let length = parse_content_length(value.as_bytes()).ok_or(HeaderError::InvalidContentLength)?;
        self.content_length = Some((length, value.clone()));
        Ok(())
    }

    /// Parser fast path: adds one value for a raw header name.
    ///
    /// A repeated well-known or unknown name gains another value; a repeated
    /// `Content-Length` fails with [`HeaderError::MultipleContentLengths`].
    pub fn append_raw(&mut self, name: &[u8], value: HeaderValue) -> Result<(), HeaderError> {
        if let Some(known) = K::lookup(name) {
            self.append_known(known, value);
            return Ok(());
        }

        if name.eq_ignore_ascii_case(CONTENT_LENGTH.as_bytes()) {
            if self.content_length.is_some() {
                return Err(HeaderError::MultipleContentLengths);
            }
            return self.set_content_length_value(&value);
        }

        match self.unknown_position(name) {
            Some(index) => self.unknown[index].1.push(value),
            None => {
                let name = std::str::from_utf8(name).map_err(|_e| HeaderError::InvalidHeaderName)?;
                self.push_unknown(name, vec![value]);
            }
        }
        Ok(())
    }

    fn unknown_position(&self, name: &[u8]) -> Option<usize> {
        self.unknown[..self.unknown_len]
            .iter()
            .position(|(existing, _)| existing.as_bytes().eq_ignore_ascii_case(name))
    }

    fn push_unknown(&mut self, name: &str, values: Vec<HeaderValue>) {
        // reuse a slot left behind by a previous clear when the name matches exactly
        if self.unknown_len < self.unknown.len() {
            let entry = &mut self.unknown[self.unknown_len];
            if &*entry.0 != name {
                entry.0 = Box::from(name);
            }
            entry.1.clear();
            entry.1.extend(values);
        } else {
            self.unknown.push((Box::from(name), values));
        }
        self.unknown_len += 1;
    }

    pub fn get(&self, name: &str) -> &[HeaderValue] {
        if let Some(known) = K::lookup(name.as_bytes()) {
            return self.get_known(known);
        }

        if name.eq_ignore_ascii_case(CONTENT_LENGTH) {
            return match &self.content_length {
                Some((_, value)) => std::slice::from_ref(value),
                None => &[],
            };
        }

        match self.unknown_position(name.as_bytes()) {
            Some(index) => &self.unknown[index].1,
            None => &[],
        }
    }

    pub fn set(&mut self, name: &str, values: Vec<HeaderValue>) -> Result<(), HeaderError> {
        if let Some(known) = K::lookup(name.as_bytes()) {
            self.set_known(known, values);
            return Ok(());
        }

        if name.eq_ignore_ascii_case(CONTENT_LENGTH) {
            return match values.as_slice() {
                [] => {
                    self.content_length = None;
                    Ok(())
                }
                [value] => self.set_content_length_value(value),
                _ => Err(HeaderError::MultipleContentLengths),
            };
        }

        ensure_token(name)?;
        match self.unknown_position(name.as_bytes()) {
            Some(index) if values.is_empty() => {
                self.remove_unknown(index);
            }
            Some(index) => self.unknown[index].1 = values,
            None if values.is_empty() => {}
            None => self.push_unknown(name, values),
        }
        Ok(())
    }

    pub fn append(&mut self, name: &str, value: HeaderValue) -> Result<(), HeaderError> {
        if K::lookup(name.as_bytes()).is_none() && !name.eq_ignore_ascii_case(CONTENT_LENGTH) {
            ensure_token(name)?;
        }
        self.append_raw(name.as_bytes(), value)
    }

    fn remove_unknown(&mut self, index: usize) {
        let entry = self.unknown.remove(index);
        self.unknown_len -= 1;
        // keep the allocation around for reuse
        self.unknown.push(entry);
    }

    pub fn remove(&mut self, name: &str) -> bool {
        if let Some(known) = K::lookup(name.as_bytes()) {
            return self.remove_known(known);
        }

        if name.eq_ignore_ascii_case(CONTENT_LENGTH) {
            return self.content_length.take().is_some();
        }

        match self.unknown_position(name.as_bytes()) {
            Some(index) => {
                self.remove_unknown(index);
                true
            }
            None => false,
        }
    }

    /// Removes every header, keeping the allocated slots for reuse.
    pub fn clear(&mut self) {
        self.bits = 0;
        for raw in &mut self.raw {
            *raw = None;
        }
        self.content_length = None;
        self.unknown_len = 0;
    }

    /// Number of distinct header names present.
    pub fn count(&self) -> usize {
        self.bits.count_ones() as usize + usize::from(self.content_length.is_some()) + self.unknown_len
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Iterates known headers in declaration order, then `Content-Length`, then unknown headers in insertion order.
    pub fn iter(&self) -> Iter<'_, K> {
        Iter { store: self, stage: Stage::Known(0) }
    }

    /// Writes `\r\nName: value` for every value of every header, in enumeration order.
    pub fn serialize_to(&self, dst: &mut BytesMut) {
        for &known in K::ALL {
            if !self.has_known(known) {
                continue;
            }

            let slot = known.slot();
            if let Some(raw) = &self.raw[slot] {
                dst.put_slice(raw);
                continue;
            }

            for value in &self.known[slot] {
                put_header(dst, known.name(), value.as_bytes());
            }
        }

        if let Some((length, _)) = &self.content_length {
            dst.put_slice(b"\r\nContent-Length: ");
            // writing into BytesMut can't fail
            let _ = write!(dst, "{length}");
        }

        for (name, values) in &self.unknown[..self.unknown_len] {
            for value in values {
                put_header(dst, name, value.as_bytes());
            }
        }
    }
}

#[inline]
fn put_header(dst: &mut BytesMut, name: &str, value: &[u8]) {
    dst.reserve(name.len() + value.len() + 4);
    dst.put_slice(b"\r\n");
    dst.put_slice(name.as_bytes());
    dst.put_slice(b": ");
    dst.put_slice(value);
}

/// Parses a `Content-Length` value: base-10 digits only, no sign, no whitespace.
pub fn parse_content_length(value: &[u8]) -> Option<u64> {
    if value.is_empty() {
        return None;
    }

    let mut length: u64 = 0;
    for &b in value {
        if !b.is_ascii_digit() {
            return None;
        }
        length = length.checked_mul(10)?.checked_add(u64::from(b - b'0'))?;
    }
    Some(length)
}

fn ensure_token(name: &str) -> Result<(), HeaderError> {
    if !name.is_empty() && name.bytes().all(crate::codec::is_token_char) {
        Ok(())
    } else {
        Err(HeaderError::InvalidHeaderName)
    }
}

enum Stage {
    Known(usize),
    ContentLength,
    Unknown(usize),
    Done,
}

/// Iterator over `(name, values)` pairs of a [`HeaderStore`].
pub struct Iter<'a, K> {
    store: &'a HeaderStore<K>,
    stage: Stage,
}

impl<K> std::fmt::Debug for Iter<'_, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Iter").finish_non_exhaustive()
    }
}

impl<'a, K: KnownHeader> Iterator for Iter<'a, K> {
    type Item = (&'a str, &'a [HeaderValue]);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.stage {
                Stage::Known(index) => {
                    let Some(&known) = K::ALL.get(index) else {
                        self.stage = Stage::ContentLength;
                        continue;
                    };
                    self.stage = Stage::Known(index + 1);
                    if self.store.has_known(known) {
                        return Some((known.name(), &self.store.known[known.slot()]));
                    }
                }
                Stage::ContentLength => {
                    self.stage = Stage::Unknown(0);
                    if let Some((_, value)) = &self.store.content_length {
                        return Some((CONTENT_LENGTH, std::slice::from_ref(value)));
                    }
                }
                Stage::Unknown(index) => {
                    if index >= self.store.unknown_len {
                        self.stage = Stage::Done;
                        continue;
                    }
                    self.stage = Stage::Unknown(index + 1);
                    let (name, values) = &self.store.unknown[index];
                    return Some((name, values));
                }
                Stage::Done => return None,
            }
        }
    }
}
