//! The write side of a connection.
//!
//! [`OutputProducer`] encodes the response into a shared buffer under a short
//! lock, so concurrent writers commit their bytes in call order, and hands the
//! buffer to the transport in [`OutputProducer::flush`]. Flushes coalesce:
//! callers queue on the transport lock and a caller whose bytes were already
//! written by an earlier flush returns without touching the transport.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::{Buf, Bytes, BytesMut};
use http::HeaderMap;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::codec::Encoder;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::codec::ResponseEncoder;
use crate::connection::timeout::TimeoutControl;
use crate::protocol::{Message, PayloadItem, PayloadSize, ResponseHead, SendError};

const CONTINUE: &[u8] = b"HTTP/1.1 100 Continue\r\n\r\n";

type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;
type Item<'a, D> = Message<(ResponseHead<'a>, PayloadSize), D>;

/// Serializes responses onto the transport of one connection.
///
/// Every mutating call is a no-op once the producer is closed by
/// [`dispose`](OutputProducer::dispose) or [`abort`](OutputProducer::abort).
pub struct OutputProducer {
    state: Mutex<OutputState>,
    writer: tokio::sync::Mutex<BoxWriter>,
    timeout: Arc<dyn TimeoutControl>,
    input_cancel: CancellationToken,
}

#[derive(Debug, Default)]
struct OutputState {
    buffer: BytesMut,
    encoder: ResponseEncoder,
    /// Bytes committed to `buffer` since the connection started.
    committed: u64,
    /// Bytes handed to the transport since the connection started.
    flushed: u64,
    head_written: bool,
    continue_sent: bool,
    closed: bool,
    aborted: bool,
}

impl OutputState {
    fn encode<D: Buf>(&mut self, item: Item<'_, D>) -> Result<(), SendError> {
        if self.closed {
            return Ok(());
        }
        let before = self.buffer.len();
        let result = self.encoder.encode(item, &mut self.buffer);
        self.committed += (self.buffer.len() - before) as u64;
        result
    }
}

impl OutputProducer {
    pub fn new<W>(writer: W, timeout: Arc<dyn TimeoutControl>, input_cancel: CancellationToken) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            state: Mutex::new(OutputState::default()),
            writer: tokio::sync::Mutex::new(Box::new(writer)),
            timeout,
            input_cancel,
        }
    }

    fn state(&self) -> MutexGuard<'_, OutputState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    pub fn is_aborted(&self) -> bool {
        self.state().aborted
    }

    /// True once the head of the current response has been committed.
    pub fn has_started(&self) -> bool {
        self.state().head_written
    }

    /// Prepares for the next response on the connection.
    pub fn reset(&self) {
        let mut state = self.state();
        state.head_written = false;
        state.continue_sent = false;
    }

    /// Buffers the status line and headers; the body that follows is framed
    /// according to `payload`.
    pub fn write_response_headers(&self, head: ResponseHead<'_>, payload: PayloadSize) -> Result<(), SendError> {
        let mut state = self.state();
        if state.closed {
            return Ok(());
        }
        state.encode(Item::<Bytes>::Header((head, payload)))?;
        state.head_written = true;
        trace!(status = head.status.as_u16(), ?payload, "response head buffered");
        Ok(())
    }

    pub fn write_data<D: Buf>(&self, data: D) -> Result<(), SendError> {
        self.state().encode(Item::Payload(PayloadItem::Chunk(data)))
    }

    /// Ends a chunked body with trailer fields.
    pub fn write_trailers(&self, trailers: HeaderMap) -> Result<(), SendError> {
        self.state().encode(Item::<Bytes>::Payload(PayloadItem::Trailers(trailers)))
    }

    /// Ends the body, writing the terminating chunk when the body is chunked.
    pub fn write_stream_suffix(&self) -> Result<(), SendError> {
        self.state().encode(Item::<Bytes>::Payload(PayloadItem::Eof))
    }

    /// Waits until every byte committed before the call reached the transport.
    pub async fn flush(&self) -> Result<(), SendError> {
        let target = self.state().committed;
        let mut writer = self.writer.lock().await;

        let (bytes, end) = {
            let mut state = self.state();
            if state.aborted || state.flushed >= target {
                return Ok(());
            }
            (state.buffer.split().freeze(), state.committed)
        };

        self.write_to(&mut writer, &bytes).await?;
        self.state().flushed = end;
        Ok(())
    }

    /// Writes the interim `100 Continue` response, at most once per request
    /// and never after the real response has started.
    pub async fn write_100_continue(&self) -> Result<(), SendError> {
        {
            let mut state = self.state();
            if state.closed || state.head_written || state.continue_sent {
                return Ok(());
            }
            state.continue_sent = true;
        }

        let mut writer = self.writer.lock().await;
        self.write_to(&mut writer, CONTINUE).await?;
        debug!("sent 100 continue response");
        Ok(())
    }

    async fn write_to(&self, writer: &mut BoxWriter, bytes: &[u8]) -> Result<(), SendError> {
        self.timeout.start_timing_write(bytes.len());
        let result = {
            let write = async {
                writer.write_all(bytes).await?;
                writer.flush().await
            };
            let expired = std::future::poll_fn(|cx| self.timeout.poll_write_expired(cx.waker()));
            tokio::select! {
                result = write => result.map_err(SendError::from),
                () = expired => Err(SendError::Timeout),
            }
        };
        self.timeout.stop_timing_write();

        if let Err(e) = &result {
            self.abort(e);
        }
        result
    }

    /// Closes the producer for good, drops unflushed bytes and cancels the
    /// pending read of the connection. Idempotent.
    pub fn abort(&self, reason: &dyn fmt::Display) {
        {
            let mut state = self.state();
            if state.aborted {
                return;
            }
            state.aborted = true;
            state.closed = true;
            state.buffer.clear();
        }
        debug!(%reason, "output aborted");
        self.input_cancel.cancel();
    }

    /// Closes the producer after a graceful end; buffered bytes are kept for
    /// [`complete`](OutputProducer::complete). Idempotent.
    pub fn dispose(&self) {
        self.state().closed = true;
    }

    /// Flushes what is left and shuts the transport down.
    pub async fn complete(&self) -> Result<(), SendError> {
        self.dispose();
        self.flush().await?;
        if self.is_aborted() {
            return Ok(());
        }
        let mut writer = self.writer.lock().await;
        writer.shutdown().await.map_err(SendError::from)
    }
}

impl fmt::Debug for OutputProducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputProducer").field("state", &*self.state()).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use http::StatusCode;
    use tokio::io::{AsyncReadExt, DuplexStream, duplex};

    use super::*;
    use crate::config::ServerLimits;
    use crate::connection::timeout::TimeoutController;
    use crate::headers::ResponseHeaders;

    fn producer() -> (OutputProducer, DuplexStream, CancellationToken) {
        let (client, server) = duplex(64 * 1024);
        let cancel = CancellationToken::new();
        let timeout = Arc::new(TimeoutController::new(&ServerLimits::default()));
        (OutputProducer::new(server, timeout, cancel.clone()), client, cancel)
    }

    async fn read_available(client: &mut DuplexStream, len: usize) -> Vec<u8> {
        let mut buf = vec![0; len];
        client.read_exact(&mut buf).await.unwrap();
        buf
    }

    #[tokio::test]
    async fn head_and_chunked_body() {
        let (output, mut client, _) = producer();
        let mut headers = ResponseHeaders::new();
        headers.set_raw_transfer_encoding_chunked().unwrap();

        output.write_response_headers(ResponseHead::new(StatusCode::OK, &headers), PayloadSize::Chunked).unwrap();
        output.write_data(Bytes::from_static(b"Wiki")).unwrap();
        output.write_stream_suffix().unwrap();
        output.flush().await.unwrap();

        let expected = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWiki\r\n0\r\n\r\n";
        assert_eq!(read_available(&mut client, expected.len()).await, expected);
        assert!(output.has_started());
    }

    #[tokio::test]
    async fn concurrent_flushes_keep_call_order() {
        let (output, mut client, _) = producer();
        let headers = ResponseHeaders::new();

        output.write_response_headers(ResponseHead::new(StatusCode::OK, &headers), PayloadSize::Upgrade).unwrap();
        output.write_data(Bytes::from_static(b"one,")).unwrap();
        let first = output.flush();
        output.write_data(Bytes::from_static(b"two")).unwrap();
        let second = output.flush();
        let (first, second) = tokio::join!(first, second);
        first.unwrap();
        second.unwrap();

        let expected = b"HTTP/1.1 200 OK\r\n\r\none,two";
        assert_eq!(read_available(&mut client, expected.len()).await, expected);
    }

    #[tokio::test]
    async fn continue_is_written_once_and_never_after_the_head() {
        let (output, mut client, _) = producer();
        output.write_100_continue().await.unwrap();
        output.write_100_continue().await.unwrap();
        assert_eq!(read_available(&mut client, CONTINUE.len()).await, CONTINUE);

        output.reset();
        let headers = ResponseHeaders::new();
        output.write_response_headers(ResponseHead::new(StatusCode::OK, &headers), PayloadSize::Empty).unwrap();
        output.write_100_continue().await.unwrap();
        output.write_stream_suffix().unwrap();
        output.flush().await.unwrap();

        let expected = b"HTTP/1.1 200 OK\r\n\r\n";
        assert_eq!(read_available(&mut client, expected.len()).await, expected);
    }

    #[tokio::test]
    async fn abort_is_idempotent_and_cancels_input() {
        let (output, mut client, cancel) = producer();
        output.write_data(Bytes::from_static(b"lost")).unwrap_err();

        output.abort(&"client went away");
        output.abort(&"again");
        assert!(cancel.is_cancelled());
        assert!(output.is_closed());

        // writes after close are ignored
        let headers = ResponseHeaders::new();
        output.write_response_headers(ResponseHead::new(StatusCode::OK, &headers), PayloadSize::Empty).unwrap();
        output.flush().await.unwrap();
        output.complete().await.unwrap();
        drop(output);

        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn dispose_keeps_buffered_bytes_for_complete() {
        let (output, mut client, cancel) = producer();
        let headers = ResponseHeaders::new();
        output.write_response_headers(ResponseHead::new(StatusCode::NO_CONTENT, &headers), PayloadSize::Empty).unwrap();
        output.write_stream_suffix().unwrap();
        output.dispose();
        output.write_data(Bytes::from_static(b"ignored")).unwrap();
        output.complete().await.unwrap();
        assert!(!cancel.is_cancelled());

        let mut all = Vec::new();
        client.read_to_end(&mut all).await.unwrap();
        assert_eq!(all, b"HTTP/1.1 204 No Content\r\n\r\n");
    }
}
