use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::channel::mpsc;
use futures::{SinkExt, StreamExt};
use http::HeaderMap;
use http_body::{Body, Frame};

use crate::protocol::SendError;

/// A streamed response body fed by a [`ResponseWriter`].
///
/// Return it as the body of the response; the connection writes every frame
/// as it arrives, chunked unless the application set a `Content-Length`.
#[derive(Debug)]
pub struct ResponseStream {
    receiver: mpsc::Receiver<Frame<Bytes>>,
}

/// The application's end of a [`ResponseStream`].
///
/// Writes fail with [`SendError::Closed`] once the connection finished or
/// aborted the response.
#[derive(Debug, Clone)]
pub struct ResponseWriter {
    sender: mpsc::Sender<Frame<Bytes>>,
}

impl ResponseStream {
    pub fn channel(capacity: usize) -> (ResponseWriter, ResponseStream) {
        let (sender, receiver) = mpsc::channel(capacity);
        (ResponseWriter { sender }, ResponseStream { receiver })
    }
}

impl ResponseWriter {
    pub async fn write<B: Into<Bytes>>(&mut self, data: B) -> Result<(), SendError> {
        self.sender.send(Frame::data(data.into())).await.map_err(|_closed| SendError::Closed)
    }

    /// Ends the body with trailer fields.
    pub async fn send_trailers(mut self, trailers: HeaderMap) -> Result<(), SendError> {
        self.sender.send(Frame::trailers(trailers)).await.map_err(|_closed| SendError::Closed)
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl Body for ResponseStream {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        self.receiver.poll_next_unpin(cx).map(|frame| frame.map(Ok))
    }
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;

    use super::*;

    #[tokio::test]
    async fn frames_flow_to_the_body() {
        let (mut writer, body) = ResponseStream::channel(4);
        writer.write("hello ").await.unwrap();
        writer.write(Bytes::from_static(b"world")).await.unwrap();
        drop(writer);

        assert_eq!(body.collect().await.unwrap().to_bytes(), "hello world");
    }

    #[tokio::test]
    async fn writes_fail_once_the_stream_is_gone() {
        let (mut writer, body) = ResponseStream::channel(4);
        drop(body);
        assert!(writer.is_closed());
        assert!(matches!(writer.write("late").await, Err(SendError::Closed)));
    }
}
