//! The read side of a connection.
//!
//! [`MessageReader`] is a `Stream` of decoded request messages that also
//! watches the connection deadlines and two cancellation signals. An expired
//! deadline or a canceled input surfaces as a stream item, so every reader of
//! the connection (the request loop and the body pump alike) observes it
//! through the same error path as malformed input.

use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::{FutureExt, Stream, StreamExt};
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tracing::debug;

use crate::codec::{ProcessingState, RequestDecoder};
use crate::config::ServerOptions;
use crate::connection::timeout::{TimeoutAction, TimeoutControl, TimeoutKind};
use crate::protocol::{Message, ParseError, PayloadItem, PayloadSize, RequestHead};

pub(crate) type RequestMessage = Message<(RequestHead, PayloadSize)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Armed {
    None,
    KeepAlive,
    Headers,
}

/// Decoded request messages of one connection, bounded by its deadlines.
pub struct MessageReader<R> {
    framed: FramedRead<R, RequestDecoder>,
    timeout: Arc<dyn TimeoutControl>,
    options: Arc<ServerOptions>,
    armed: Armed,
    /// Graceful shutdown, honored only between requests.
    shutdown: Pin<Box<WaitForCancellationFutureOwned>>,
    shutdown_requested: bool,
    /// Canceled by the output side when the connection is aborted.
    input_cancel: Pin<Box<WaitForCancellationFutureOwned>>,
    input_canceled: bool,
}

impl<R> MessageReader<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(
        reader: R,
        options: Arc<ServerOptions>,
        timeout: Arc<dyn TimeoutControl>,
        shutdown: CancellationToken,
        input_cancel: CancellationToken,
    ) -> Self {
        let decoder = RequestDecoder::with_options(&options);
        Self {
            framed: FramedRead::with_capacity(reader, decoder, options.read_buffer_size),
            timeout,
            options,
            armed: Armed::None,
            shutdown: Box::pin(shutdown.cancelled_owned()),
            shutdown_requested: false,
            input_cancel: Box::pin(input_cancel.cancelled_owned()),
            input_canceled: false,
        }
    }

    pub fn decoder(&self) -> &RequestDecoder {
        self.framed.decoder()
    }

    /// True while no byte of a next request has been received.
    pub fn is_idle(&self) -> bool {
        self.framed.decoder().state() == ProcessingState::RequestPending && self.framed.read_buffer().is_empty()
    }

    /// Arms the keep-alive timeout while idle and the header timeout once a
    /// request has started.
    fn arm_timeouts(&mut self) {
        let limits = &self.options.limits;
        match self.framed.decoder().state() {
            ProcessingState::RequestPending if self.armed != Armed::KeepAlive => {
                self.timeout.reset_timeout(limits.keep_alive_timeout, TimeoutAction::StopProcessingNextRequest);
                self.armed = Armed::KeepAlive;
            }
            ProcessingState::ParsingRequestLine | ProcessingState::ParsingHeaders if self.armed != Armed::Headers => {
                self.timeout.reset_timeout(limits.request_headers_timeout, TimeoutAction::SendTimeoutResponse);
                self.armed = Armed::Headers;
            }
            _ => {}
        }
    }

    fn on_item(&mut self, item: &Result<RequestMessage, ParseError>) {
        match item {
            Ok(Message::Header((head, _))) => {
                self.timeout.cancel_timeout();
                self.armed = Armed::None;
                debug!(method = %head.method(), uri = %head.uri(), version = ?head.version(), "request head received");
            }
            Ok(Message::Payload(PayloadItem::Chunk(bytes))) => self.timeout.bytes_read(bytes.len()),
            Ok(Message::Payload(PayloadItem::Eof)) => self.armed = Armed::None,
            Ok(Message::Payload(PayloadItem::Trailers(_))) => {}
            Err(_) => {
                self.timeout.cancel_timeout();
                self.armed = Armed::None;
            }
        }
    }

    fn expired_item(&self, action: TimeoutAction, kind: TimeoutKind) -> Option<Result<RequestMessage, ParseError>> {
        debug!(?action, ?kind, state = ?self.framed.decoder().state(), "read timeout expired");
        match (action, kind) {
            (_, TimeoutKind::Read) => Some(Err(ParseError::RequestBodyTimeout)),
            (TimeoutAction::StopProcessingNextRequest, _) if self.is_idle() => None,
            (TimeoutAction::StopProcessingNextRequest | TimeoutAction::SendTimeoutResponse, _) => {
                Some(Err(ParseError::RequestHeadersTimeout))
            }
            (TimeoutAction::AbortConnection, _) => Some(Err(ParseError::io(io::ErrorKind::TimedOut))),
        }
    }
}

impl<R> Stream for MessageReader<R>
where
    R: AsyncRead + Unpin,
{
    type Item = Result<RequestMessage, ParseError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if !this.input_canceled && this.input_cancel.poll_unpin(cx).is_ready() {
            this.input_canceled = true;
        }
        if this.input_canceled {
            return Poll::Ready(Some(Err(ParseError::io(io::ErrorKind::ConnectionAborted))));
        }

        if this.is_idle() {
            if !this.shutdown_requested && this.shutdown.poll_unpin(cx).is_ready() {
                this.shutdown_requested = true;
            }
            if this.shutdown_requested {
                debug!("shutdown requested, stop reading requests");
                return Poll::Ready(None);
            }
        }

        if let Poll::Ready(item) = this.framed.poll_next_unpin(cx) {
            if let Some(item) = &item {
                this.on_item(item);
            }
            return Poll::Ready(item);
        }

        this.arm_timeouts();
        match this.timeout.poll_expired(cx.waker()) {
            Poll::Ready((action, kind)) => {
                this.armed = Armed::None;
                Poll::Ready(this.expired_item(action, kind))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<R> fmt::Debug for MessageReader<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageReader")
            .field("decoder", self.framed.decoder())
            .field("armed", &self.armed)
            .field("shutdown_requested", &self.shutdown_requested)
            .field("input_canceled", &self.input_canceled)
            .finish_non_exhaustive()
    }
}
