use std::future::poll_fn;
use std::sync::Arc;
use std::task::Poll;

use futures::channel::{mpsc, oneshot};
use futures::{Stream, StreamExt};
use http_body::Frame;
use tracing::{debug, info, trace};

use crate::connection::{OutputProducer, TimeoutControl};
use crate::protocol::body::req_body::BodyFrame;
use crate::protocol::body::ReqBody;
use crate::protocol::{HttpError, Message, ParseError, PayloadItem, PayloadSize, RequestHead};

/// The body pump: moves decoded body items from the connection into the
/// [`ReqBody`] pipe.
///
/// [`send_body`](BodySender::send_body) is cancel safe, so the connection
/// can race it against the application and resume it later. Once the
/// application drops its body, or [`skip_body`](BodySender::skip_body) is
/// called, remaining items are read and discarded so the connection stays
/// in step with the request framing.
pub struct BodySender<'conn, S> {
    payload_stream: &'conn mut S,
    sender: Option<mpsc::Sender<BodyFrame>>,
    pending: Option<BodyFrame>,
    first_read: Option<oneshot::Receiver<()>>,
    continue_pending: bool,
    output: Option<Arc<OutputProducer>>,
    timeout: Arc<dyn TimeoutControl>,
    timing_reads: bool,
    paused: bool,
    tunnel: bool,
    eof: bool,
    skipped: usize,
}

/// Creates the body pipe for a request: the application's [`ReqBody`] and
/// the pump feeding it from `payload_stream`.
///
/// With `Expect: 100-continue`, the pump waits for the first read of the
/// body and writes the interim response through `output` before reading.
pub fn body_channel<'conn, S>(
    payload_stream: &'conn mut S,
    head: &RequestHead,
    capacity: usize,
    output: Option<Arc<OutputProducer>>,
    timeout: Arc<dyn TimeoutControl>,
) -> (ReqBody, BodySender<'conn, S>) {
    let payload_size = head.payload_size();
    let (tx, rx) = mpsc::channel(capacity);

    let (first_read_tx, first_read) = if head.expect_continue() && !payload_size.is_empty() {
        let (tx, rx) = oneshot::channel();
        (Some(tx), Some(rx))
    } else {
        (None, None)
    };

    let body = if payload_size.is_empty() { ReqBody::empty() } else { ReqBody::new(rx, first_read_tx, payload_size) };

    let sender = BodySender {
        payload_stream,
        sender: Some(tx),
        pending: None,
        first_read,
        continue_pending: false,
        output,
        timeout,
        timing_reads: false,
        paused: false,
        tunnel: payload_size.is_upgrade(),
        eof: false,
        skipped: 0,
    };
    (body, sender)
}

impl<S> BodySender<'_, S>
where
    S: Stream<Item = Result<Message<(RequestHead, PayloadSize)>, ParseError>> + Unpin,
{
    /// True once the body was read up to its end.
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// True if the client is still waiting for `100 Continue` that was never sent.
    pub fn is_awaiting_continue(&self) -> bool {
        self.first_read.is_some()
    }

    /// Pumps the body into the pipe until its end.
    ///
    /// A protocol error is also delivered to the application as the last item
    /// of its body.
    pub async fn send_body(&mut self) -> Result<(), HttpError> {
        if let Some(first_read) = &mut self.first_read {
            if first_read.await.is_err() {
                // the body was dropped unread, the client never gets to send it
                self.sender = None;
                return Ok(());
            }
            self.first_read = None;
            self.continue_pending = true;
        }

        if self.continue_pending {
            if let Some(output) = &self.output {
                output.write_100_continue().await?;
            }
            self.continue_pending = false;
        }

        // an idle tunnel is not a slow body, upgraded reads are never timed
        if !self.eof && !self.timing_reads && !self.tunnel {
            self.timeout.start_timing_reads();
            self.timing_reads = true;
        }

        loop {
            if self.pending.is_some() {
                self.deliver_pending().await;
                continue;
            }

            if self.eof {
                self.stop_timing();
                self.sender = None;
                return Ok(());
            }

            let item = match self.payload_stream.next().await {
                Some(Ok(Message::Payload(item))) => item,
                Some(Ok(Message::Header(_))) => {
                    return self.fail(ParseError::invalid_request_line(false, b""));
                }
                Some(Err(e)) => return self.fail(e),
                None => return self.fail(ParseError::UnexpectedEndOfRequestContent),
            };

            match item {
                PayloadItem::Chunk(bytes) => {
                    if self.sender.is_some() {
                        self.pending = Some(Ok(Frame::data(bytes)));
                    } else {
                        self.skipped += bytes.len();
                    }
                }
                PayloadItem::Trailers(trailers) => {
                    if self.sender.is_some() {
                        self.pending = Some(Ok(Frame::trailers(trailers)));
                    }
                }
                PayloadItem::Eof => {
                    self.eof = true;
                    if self.skipped > 0 {
                        info!(size = self.skipped, "skip request body");
                    }
                }
            }
        }
    }

    /// Discards the rest of the body, closing the pipe to the application first.
    pub async fn skip_body(&mut self) -> Result<(), HttpError> {
        self.sender = None;
        self.pending = None;
        if self.first_read.is_some() {
            return Ok(());
        }
        self.send_body().await
    }

    /// Waits for room in the pipe, pausing the read clock while the
    /// application is not keeping up, then hands over the pending frame.
    async fn deliver_pending(&mut self) {
        let Some(sender) = &mut self.sender else {
            self.pending = None;
            return;
        };

        let timeout = &self.timeout;
        let timed = self.timing_reads;
        let paused = &mut self.paused;
        let ready = poll_fn(|cx| match sender.poll_ready(cx) {
            Poll::Pending => {
                if timed && !*paused {
                    timeout.pause_timing_reads();
                    *paused = true;
                }
                Poll::Pending
            }
            Poll::Ready(result) => {
                if *paused {
                    timeout.resume_timing_reads();
                    *paused = false;
                }
                Poll::Ready(result)
            }
        })
        .await;

        let delivered = match (ready, self.pending.take()) {
            (Ok(()), Some(frame)) => sender.start_send(frame).is_ok(),
            (_, _) => false,
        };
        if !delivered {
            trace!("request body dropped by the application, discarding the rest");
            self.sender = None;
        }
    }

    fn fail(&mut self, error: ParseError) -> Result<(), HttpError> {
        debug!(cause = %error, "request body failed");
        self.stop_timing();
        if let Some(mut sender) = self.sender.take() {
            // a full pipe or a dropped body leaves the application without the error, the connection still has it
            let _ = sender.try_send(Err(error.clone()));
        }
        Err(error.into())
    }

    fn stop_timing(&mut self) {
        if self.timing_reads {
            self.timeout.stop_timing_reads();
            self.timing_reads = false;
            self.paused = false;
        }
    }
}

impl<S> std::fmt::Debug for BodySender<'_, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BodySender")
            .field("eof", &self.eof)
            .field("pending", &self.pending.is_some())
            .field("skipped", &self.skipped)
            .finish_non_exhaustive()
    }
}
