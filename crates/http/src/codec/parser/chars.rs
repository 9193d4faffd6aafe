//! Byte classes from RFC 7230 and RFC 3986.

/// `tchar` from RFC 7230 §3.2.6.
#[inline]
pub fn is_token_char(b: u8) -> bool {
    b.is_ascii_alphanumeric()
        || matches!(b, b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' | b'^' | b'_' | b'`' | b'|' | b'~')
}

#[inline]
pub fn is_token(bytes: &[u8]) -> bool {
    !bytes.is_empty() && bytes.iter().all(|&b| is_token_char(b))
}

/// Characters allowed in an authority: unreserved, sub-delims, `:`, `@`, `[`, `]` and `%`.
#[inline]
pub fn is_authority_char(b: u8) -> bool {
    b.is_ascii_alphanumeric()
        || matches!(
            b,
            b'-' | b'.'
                | b'_'
                | b'~'
                | b'!'
                | b'$'
                | b'&'
                | b'\''
                | b'('
                | b')'
                | b'*'
                | b'+'
                | b','
                | b';'
                | b'='
                | b':'
                | b'@'
                | b'['
                | b']'
                | b'%'
        )
}

/// Characters allowed in a `Host` header value.
#[inline]
pub fn is_host_char(b: u8) -> bool {
    is_authority_char(b) && b != b'@'
}

/// Request-target bytes: anything visible, including obs-text.
#[inline]
pub fn is_target_char(b: u8) -> bool {
    b > b' ' && b != 0x7F
}

#[inline]
pub fn is_whitespace(b: u8) -> bool {
    b == b' ' || b == b'\t'
}

/// Strips optional whitespace (SP and HTAB only) from both ends.
pub fn trim_ows(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|&b| !is_whitespace(b)).unwrap_or(bytes.len());
    let end = bytes.iter().rposition(|&b| !is_whitespace(b)).map_or(start, |last| last + 1);
    &bytes[start..end]
}
