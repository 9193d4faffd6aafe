use bytes::{Buf, BytesMut};
use tokio_util::codec::Encoder;
use tracing::error;

use crate::codec::body::PayloadEncoder;
use crate::codec::header::HeadEncoder;
use crate::protocol::{Message, PayloadSize, ResponseHead, SendError};

/// Encodes a response: the head once, then payload items framed according to
/// the [`PayloadSize`] announced with the head.
#[derive(Debug, Default)]
pub struct ResponseEncoder {
    head_encoder: HeadEncoder,
    payload_encoder: Option<PayloadEncoder>,
}

impl ResponseEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once a head has been encoded and its body is not finished.
    pub fn in_body(&self) -> bool {
        self.payload_encoder.is_some()
    }
}

impl<D: Buf> Encoder<Message<(ResponseHead<'_>, PayloadSize), D>> for ResponseEncoder {
    type Error = SendError;

    fn encode(&mut self, item: Message<(ResponseHead<'_>, PayloadSize), D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Message::Header((head, payload_size)) => {
                if self.payload_encoder.is_some() {
                    error!("expect payload item but receive response head");
                    return Err(SendError::invalid_body("response head written twice"));
                }

                self.head_encoder.encode(head, dst)?;
                self.payload_encoder = Some(PayloadEncoder::new(payload_size));
                Ok(())
            }

            Message::Payload(payload_item) => {
                let Some(payload_encoder) = &mut self.payload_encoder else {
                    error!("expect response head but receive payload item");
                    return Err(SendError::invalid_body("response body written before its head"));
                };

                let result = payload_encoder.encode(payload_item, dst);
                if payload_encoder.is_finish() {
                    self.payload_encoder.take();
                }
                result
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http::StatusCode;

    use super::*;
    use crate::headers::ResponseHeaders;
    use crate::protocol::PayloadItem;

    fn encode_all(payload_size: PayloadSize, chunks: &[&'static [u8]]) -> BytesMut {
        let headers = ResponseHeaders::new();
        let mut encoder = ResponseEncoder::new();
        let mut dst = BytesMut::new();

        let head = Message::<_, Bytes>::Header((ResponseHead::new(StatusCode::OK, &headers), payload_size));
        encoder.encode(head, &mut dst).unwrap();
        for chunk in chunks {
            let item = Message::<(ResponseHead<'_>, PayloadSize), _>::Payload(PayloadItem::Chunk(Bytes::from_static(chunk)));
            encoder.encode(item, &mut dst).unwrap();
        }
        let eof = Message::<(ResponseHead<'_>, PayloadSize), Bytes>::Payload(PayloadItem::Eof);
        encoder.encode(eof, &mut dst).unwrap();
        assert!(!encoder.in_body());
        dst
    }

    #[test]
    fn chunked_body() {
        let dst = encode_all(PayloadSize::Chunked, &[b"hello", b" world"]);
        assert_eq!(&dst[..], b"HTTP/1.1 200 OK\r\n\r\n5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n");
    }

    #[test]
    fn no_body_drops_bytes() {
        let dst = encode_all(PayloadSize::Empty, &[b"ignored"]);
        assert_eq!(&dst[..], b"HTTP/1.1 200 OK\r\n\r\n");
    }

    #[test]
    fn payload_before_head_is_rejected() {
        let mut encoder = ResponseEncoder::new();
        let item = Message::<(ResponseHead<'_>, PayloadSize), Bytes>::Payload(PayloadItem::Eof);
        assert!(encoder.encode(item, &mut BytesMut::new()).is_err());
    }
}
