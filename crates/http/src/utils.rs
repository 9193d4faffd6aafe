//! Utility macros and functions for the HTTP crate.
//!
//! This module provides helper macros and functions that are used internally
//! by the HTTP crate implementation.

/// Maximum number of bytes of client input echoed into an error detail.
pub(crate) const MAX_DETAIL_SIZE: usize = 128;

/// A macro for early returns with an error if a condition is not met.
///
/// This is similar to the `assert!` macro, but returns an error instead of panicking.
/// It's useful for validation checks where you want to return early with an error
/// if some condition is not satisfied.
///
/// # Example
///
/// ```ignore
/// ensure!(header_count <= max_count, ParseError::TooManyHeaders);
/// ```
macro_rules! ensure {
    ($predicate:expr, $error:expr) => {
        if !$predicate {
            return Err($error);
        }
    };
}

pub(crate) use ensure;

/// Renders raw client bytes as a printable ASCII string for error details.
///
/// Non printable bytes are written as `\xNN`, and the output is truncated to
/// [`MAX_DETAIL_SIZE`] input bytes with a trailing `...`.
pub(crate) fn escape_detail(bytes: &[u8]) -> String {
    let truncated = bytes.len() > MAX_DETAIL_SIZE;
    let bytes = &bytes[..bytes.len().min(MAX_DETAIL_SIZE)];

    let mut detail = String::with_capacity(bytes.len() + 3);
    for &b in bytes {
        if b.is_ascii_graphic() || b == b' ' {
            detail.push(b as char);
        } else {
            detail.push_str(&format!("\\x{b:02X}"));
        }
    }

    if truncated {
        detail.push_str("...");
    }
    detail
}
