//! Decoder for the raw tunnel that follows an upgrade.

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::protocol::{ParseError, PayloadItem};

/// Passes every byte through unframed until the transport closes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpgradeDecoder;

impl Decoder for UpgradeDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        Ok(Some(PayloadItem::Chunk(src.split().freeze())))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Ok(Some(self.decode(src)?.unwrap_or(PayloadItem::Eof)))
    }
}
