//! Serialization of the response status line and header block.

use std::io;
use std::io::Write;

use bytes::{BufMut, BytesMut};
use tokio_util::codec::Encoder;

use crate::protocol::{ResponseHead, SendError};

/// Initial buffer size reserved for a response head
const INIT_HEADER_SIZE: usize = 4 * 1024;

/// Encoder for the response head: `HTTP/1.1 <code> <reason>`, every header
/// as `\r\n<Name>: <value>`, then the blank line.
///
/// Framing headers are not touched here, they are settled by the connection
/// before the head is encoded.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadEncoder;

impl Encoder<ResponseHead<'_>> for HeadEncoder {
    type Error = SendError;

    fn encode(&mut self, head: ResponseHead<'_>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(INIT_HEADER_SIZE);

        let reason = head.reason.or_else(|| head.status.canonical_reason()).unwrap_or("Unknown");
        write!(FastWrite(dst), "HTTP/1.1 {} {reason}", head.status.as_str())?;

        head.headers.serialize_to(dst);
        dst.put_slice(b"\r\n\r\n");
        Ok(())
    }
}

/// `io::Write` over a `BytesMut` that was reserved up front.
pub(crate) struct FastWrite<'a>(pub(crate) &'a mut BytesMut);

impl Write for FastWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
