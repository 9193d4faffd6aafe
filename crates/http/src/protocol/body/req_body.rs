use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::StreamExt;
use futures::channel::{mpsc, oneshot};
use http_body::{Body, Frame, SizeHint};

use crate::protocol::{ParseError, PayloadSize};

pub(crate) type BodyFrame = Result<Frame<Bytes>, ParseError>;

/// The request body as seen by the application.
///
/// Frames are produced by the connection's body pump into a bounded pipe;
/// the pump keeps consuming the transport in step with the body framing
/// whether or not the application is reading, until the pipe is full.
///
/// Trailers of a chunked body arrive as a trailers frame after the last data
/// frame.
#[derive(Debug)]
pub struct ReqBody {
    receiver: Option<mpsc::Receiver<BodyFrame>>,
    /// Tells the pump the application started reading, used for `100 Continue`.
    first_read: Option<oneshot::Sender<()>>,
    size_hint: SizeHint,
}

impl ReqBody {
    /// A body with no bytes, used when the request has no payload.
    pub fn empty() -> Self {
        Self { receiver: None, first_read: None, size_hint: SizeHint::with_exact(0) }
    }

    pub(crate) fn new(
        receiver: mpsc::Receiver<BodyFrame>,
        first_read: Option<oneshot::Sender<()>>,
        payload_size: PayloadSize,
    ) -> Self {
        let size_hint = payload_size.exact().map_or_else(SizeHint::new, SizeHint::with_exact);
        Self { receiver: Some(receiver), first_read, size_hint }
    }
}

impl Body for ReqBody {
    type Data = Bytes;
    type Error = ParseError;

    fn poll_frame(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        if let Some(first_read) = self.first_read.take() {
            // the pump may already be gone when the request was rejected
            let _ = first_read.send(());
        }

        let Some(receiver) = &mut self.receiver else {
            return Poll::Ready(None);
        };

        match receiver.poll_next_unpin(cx) {
            Poll::Ready(None) => {
                self.receiver = None;
                Poll::Ready(None)
            }
            other => other,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.receiver.is_none()
    }

    fn size_hint(&self) -> SizeHint {
        self.size_hint.clone()
    }
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;

    use super::*;

    #[tokio::test]
    async fn empty_body_ends_immediately() {
        let body = ReqBody::empty();
        assert!(body.is_end_stream());
        assert_eq!(body.size_hint().exact(), Some(0));
        assert!(body.collect().await.unwrap().to_bytes().is_empty());
    }

    #[tokio::test]
    async fn first_read_is_signaled() {
        let (mut sender, receiver) = mpsc::channel(4);
        let (first_read, mut first_read_rx) = oneshot::channel();
        let mut body = ReqBody::new(receiver, Some(first_read), PayloadSize::Length(2));
        assert_eq!(body.size_hint().exact(), Some(2));
        assert!(first_read_rx.try_recv().unwrap().is_none());

        sender.try_send(Ok(Frame::data(Bytes::from_static(b"hi")))).unwrap();
        drop(sender);

        let frame = body.frame().await.unwrap().unwrap();
        assert_eq!(frame.into_data().unwrap(), "hi");
        assert_eq!(first_read_rx.try_recv().unwrap(), Some(()));
        assert!(body.frame().await.is_none());
        assert!(body.is_end_stream());
    }
}
