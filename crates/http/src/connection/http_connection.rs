use std::error::Error;
use std::fmt::{self, Display};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::{BufMut, Bytes, BytesMut};
use futures::{Stream, StreamExt};
use http::{HeaderValue, Method, Response, StatusCode, Version};
use http_body::{Body, SizeHint};
use http_body_util::BodyExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info_span};

use crate::config::ServerOptions;
use crate::connection::message_reader::{MessageReader, RequestMessage};
use crate::connection::output::OutputProducer;
use crate::connection::timeout::{TimeoutControl, TimeoutController};
use crate::date::DateCache;
use crate::handler::Application;
use crate::headers::{HeaderCollection, ResponseHeaders};
use crate::protocol::body::{BodySender, body_channel};
use crate::protocol::{
    HeaderError, HttpError, Message, ParseError, PayloadSize, RequestHead, ResponseHead, SendError, TraceIdentifier,
};
use crate::trace;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

type PumpResult = Option<Result<(), HttpError>>;

/// An HTTP/1.x connection: reads requests, runs them through an
/// [`Application`] and writes the responses, until either side ends it.
///
/// Requests on one connection are handled one at a time. While the
/// application runs, the request body is pumped from the transport
/// concurrently, so the application can stream it; whatever it leaves unread
/// is drained before the next request is parsed.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
///
/// use http::{Request, Response};
/// use micro_h1::connection::HttpConnection;
/// use micro_h1::handler::make_handler;
/// use micro_h1::protocol::body::ReqBody;
///
/// async fn hello(_request: Request<ReqBody>) -> Result<Response<String>, std::convert::Infallible> {
///     Ok(Response::new("hello".to_string()))
/// }
///
/// # async fn serve(stream: tokio::net::TcpStream) {
/// let (reader, writer) = stream.into_split();
/// let connection = HttpConnection::new(reader, writer);
/// let _ = connection.process(Arc::new(make_handler(hello))).await;
/// # }
/// ```
pub struct HttpConnection<R> {
    reader: MessageReader<R>,
    responder: Responder,
    timeout: Arc<dyn TimeoutControl>,
    options: Arc<ServerOptions>,
    connection_id: u64,
}

impl<R> HttpConnection<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new<W>(reader: R, writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self::with_options(reader, writer, Arc::new(ServerOptions::default()))
    }

    pub fn with_options<W>(reader: R, writer: W, options: Arc<ServerOptions>) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self::with_shutdown(reader, writer, options, CancellationToken::new())
    }

    /// Canceling `shutdown` ends the connection once the current request is done.
    pub fn with_shutdown<W>(reader: R, writer: W, options: Arc<ServerOptions>, shutdown: CancellationToken) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let timeout: Arc<dyn TimeoutControl> = Arc::new(TimeoutController::new(&options.limits));
        let input_cancel = CancellationToken::new();
        let output = Arc::new(OutputProducer::new(writer, Arc::clone(&timeout), input_cancel.clone()));
        let reader = MessageReader::new(reader, Arc::clone(&options), Arc::clone(&timeout), shutdown, input_cancel);

        let server = if options.add_server_header { server_header(&options.server_name) } else { None };

        Self {
            reader,
            responder: Responder { output, headers: ResponseHeaders::new(), server },
            timeout,
            options,
            connection_id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn connection_id(&self) -> u64 {
        self.connection_id
    }

    /// Serves requests until the client closes, keep-alive ends or a fatal
    /// error occurs, then closes the transport.
    ///
    /// Rejected requests and transport failures are returned as errors after
    /// the best-effort error response has been written.
    pub async fn process<A>(mut self, app: Arc<A>) -> Result<(), HttpError>
    where
        A: Application,
        A::RespBody: Unpin,
        <A::RespBody as Body>::Error: Display,
    {
        let connection_id = self.connection_id;
        async move {
            trace::connection_start(connection_id);
            let result = self.serve(app.as_ref()).await;

            if let Err(e) = self.responder.output.complete().await {
                debug!(cause = %e, "closing the transport failed");
            }
            trace::connection_stop(connection_id, self.reader.decoder().request_count());
            result
        }
        .instrument(info_span!("connection", id = connection_id))
        .await
    }

    async fn serve<A>(&mut self, app: &A) -> Result<(), HttpError>
    where
        A: Application,
        A::RespBody: Unpin,
        <A::RespBody as Body>::Error: Display,
    {
        loop {
            let head = match self.reader.next().await {
                Some(Ok(Message::Header((head, _)))) => head,
                Some(Ok(Message::Payload(_))) => {
                    error!("received request body while expecting a request head");
                    return Ok(());
                }
                Some(Err(e)) => return self.reject(e).await,
                None => return Ok(()),
            };

            if !self.handle_request(app, head).await? {
                return Ok(());
            }
            self.responder.output.reset();
        }
    }

    /// Handles a request that failed before the application was invoked.
    async fn reject(&mut self, error: ParseError) -> Result<(), HttpError> {
        if error.is_io() {
            if self.reader.is_idle() {
                trace::connection_reset(self.connection_id);
                return Ok(());
            }
            self.responder.output.abort(&error);
            return Err(error.into());
        }

        trace::connection_bad_request(self.connection_id, &error);
        if let Some(status) = error.status_code() {
            self.responder.send_error_response(status).await;
        }
        Err(error.into())
    }

    /// Runs one request through the application. Returns whether the
    /// connection may be reused.
    async fn handle_request<A>(&mut self, app: &A, head: RequestHead) -> Result<bool, HttpError>
    where
        A: Application,
        A::RespBody: Unpin,
        <A::RespBody as Body>::Error: Display,
    {
        let mut facts = RequestFacts {
            trace_id: TraceIdentifier::new(self.connection_id, self.reader.decoder().request_count()),
            method: head.method().clone(),
            version: head.version(),
            keep_alive: head.keep_alive(),
        };
        trace::request_start(&facts.trace_id, &facts.method, head.uri().path(), facts.version);

        let has_body = !head.payload_size().is_empty();
        let tunnel = head.payload_size().is_upgrade();
        let output = Some(Arc::clone(&self.responder.output));
        let (body, mut pump) =
            body_channel(&mut self.reader, &head, self.options.body_pipe_capacity, output, Arc::clone(&self.timeout));
        if has_body {
            trace::request_body_start(&facts.trace_id);
        }

        let mut request = head.body(body);
        request.extensions_mut().insert(facts.trace_id.clone());

        let mut pump_result: PumpResult = None;
        let mut context = app.create_context(request);
        let processed = drive(app.process(&mut context), &mut pump, &mut pump_result).await;

        let mut outcome: Result<(), HttpError> = Ok(());
        let mut app_error: Option<Box<dyn Error + Send + Sync>> = None;
        let mut status = None;

        match processed {
            Ok(response) => {
                if let Some(failed) = pump_failure(&pump_result)
                    && !self.responder.output.has_started()
                {
                    // the request broke while the application ran, its response is replaced
                    drop(response);
                    facts.keep_alive = false;
                    status = failed;
                    if let Some(failed) = failed {
                        self.responder.send_error_response(failed).await;
                    }
                } else {
                    status = Some(response.status());
                    if let Err(e) =
                        self.responder.send_response(response, &mut facts, &mut pump, &mut pump_result).await
                    {
                        debug!(cause = %e, "sending the response failed");
                        facts.keep_alive = false;
                        if self.responder.output.has_started() {
                            self.responder.output.abort(&e);
                            outcome = Err(e);
                        } else {
                            // nothing reached the client yet, the bad response is the application's fault
                            trace::application_error(Some(&facts.trace_id), &e);
                            status = Some(StatusCode::INTERNAL_SERVER_ERROR);
                            self.responder.send_error_response(StatusCode::INTERNAL_SERVER_ERROR).await;
                            app_error = Some(e.into());
                        }
                    }
                }
            }
            Err(e) => {
                let e: Box<dyn Error + Send + Sync> = e.into();
                trace::application_error(Some(&facts.trace_id), e.as_ref());
                facts.keep_alive = false;
                if self.responder.output.has_started() {
                    self.responder.output.abort(&e);
                } else {
                    status = Some(StatusCode::INTERNAL_SERVER_ERROR);
                    self.responder.send_error_response(StatusCode::INTERNAL_SERVER_ERROR).await;
                }
                app_error = Some(e);
            }
        }

        {
            let error: Option<&(dyn Error + Send + Sync + 'static)> = match (&app_error, &outcome) {
                (Some(e), _) => Some(e.as_ref()),
                (None, Err(e)) => Some(e),
                (None, Ok(())) => None,
            };
            app.dispose_context(context, error);
        }

        if facts.keep_alive && !matches!(pump_result, Some(Err(_))) && !pump.is_eof() {
            if pump.is_awaiting_continue() {
                // the client still waits for 100 Continue, its body never comes
                facts.keep_alive = false;
            } else if tunnel {
                // tunnel bytes only end with the transport, nothing after them is a request
                facts.keep_alive = false;
            } else {
                let drain = self.options.limits.request_body_drain_timeout;
                if let Ok(result) = tokio::time::timeout(drain, pump.skip_body()).await {
                    pump_result = Some(result);
                } else {
                    trace::request_body_drain_timed_out(&facts.trace_id);
                    facts.keep_alive = false;
                }
            }
        }

        match pump_result {
            Some(Ok(())) if has_body => trace::request_body_done(&facts.trace_id),
            Some(Err(e)) => {
                facts.keep_alive = false;
                if matches!(&e, HttpError::RequestError { source } if source.is_io()) {
                    self.responder.output.abort(&e);
                }
                if outcome.is_ok() {
                    outcome = Err(e);
                }
            }
            _ => {}
        }
        drop(pump);

        let keep_alive = facts.keep_alive && !self.responder.output.is_closed();
        trace::request_stop(&facts.trace_id, status, keep_alive);
        outcome.map(|()| keep_alive)
    }
}

impl<R> fmt::Debug for HttpConnection<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpConnection")
            .field("connection_id", &self.connection_id)
            .field("reader", &self.reader)
            .field("output", &self.responder.output)
            .finish_non_exhaustive()
    }
}

/// What the response side needs to know about the request it answers.
struct RequestFacts {
    trace_id: TraceIdentifier,
    method: Method,
    version: Version,
    keep_alive: bool,
}

/// The write side of the connection: the reusable response headers and the
/// output producer.
struct Responder {
    output: Arc<OutputProducer>,
    headers: ResponseHeaders,
    server: Option<(HeaderValue, Bytes)>,
}

impl Responder {
    async fn send_response<B, S>(
        &mut self,
        response: Response<B>,
        facts: &mut RequestFacts,
        pump: &mut BodySender<'_, S>,
        pump_result: &mut PumpResult,
    ) -> Result<(), HttpError>
    where
        B: Body + Unpin,
        B::Error: Display,
        S: Stream<Item = Result<RequestMessage, ParseError>> + Unpin,
    {
        let (parts, mut body) = response.into_parts();

        self.headers.reset();
        self.headers.extend_from_header_map(&parts.headers).map_err(SendError::from)?;
        let payload = self.finalize_headers(parts.status, &body.size_hint(), facts)?;

        self.output.write_response_headers(ResponseHead::new(parts.status, &self.headers), payload)?;
        self.headers.set_read_only();
        trace::response_head_written(&facts.trace_id, parts.status);

        if payload.is_empty() {
            self.output.write_stream_suffix()?;
            drive(self.output.flush(), pump, pump_result).await?;
            return Ok(());
        }

        let mut ended = false;
        while let Some(frame) = drive(body.frame(), pump, pump_result).await {
            if self.output.is_closed() {
                return Err(SendError::Closed.into());
            }

            let frame = frame.map_err(|e| SendError::invalid_body(format!("response body failed: {e}")))?;
            match frame.into_data() {
                Ok(data) => {
                    self.output.write_data(data)?;
                    drive(self.output.flush(), pump, pump_result).await?;
                }
                Err(frame) => {
                    if let Ok(trailers) = frame.into_trailers()
                        && payload.is_chunked()
                    {
                        self.output.write_trailers(trailers)?;
                        ended = true;
                    }
                }
            }
        }

        if !ended {
            self.output.write_stream_suffix()?;
        }
        drive(self.output.flush(), pump, pump_result).await?;
        Ok(())
    }

    /// Settles framing and connection headers, returning how the body is framed.
    fn finalize_headers(
        &mut self,
        status: StatusCode,
        hint: &SizeHint,
        facts: &mut RequestFacts,
    ) -> Result<PayloadSize, SendError> {
        let headers = &mut self.headers;

        if headers.has_transfer_encoding()
            && matches!(status, StatusCode::NO_CONTENT | StatusCode::RESET_CONTENT | StatusCode::NOT_MODIFIED)
        {
            return Err(SendError::TransferEncodingWithoutBody { status });
        }

        if headers.has_connection() && !headers.connection_has_token("keep-alive") {
            facts.keep_alive = false;
        }
        if headers.has_transfer_encoding() && !headers.is_chunked() {
            facts.keep_alive = false;
        }

        let payload = if status == StatusCode::SWITCHING_PROTOCOLS {
            facts.keep_alive = false;
            PayloadSize::Upgrade
        } else if facts.method == Method::HEAD
            || matches!(status, StatusCode::NO_CONTENT | StatusCode::RESET_CONTENT | StatusCode::NOT_MODIFIED)
        {
            PayloadSize::Empty
        } else if headers.has_transfer_encoding() {
            // any other final coding is delimited by closing the connection
            if headers.is_chunked() { PayloadSize::Chunked } else { PayloadSize::Upgrade }
        } else if let Some(length) = headers.content_length() {
            PayloadSize::Length(length)
        } else if let Some(length) = hint.exact() {
            headers.set_content_length(Some(length))?;
            PayloadSize::Length(length)
        } else if facts.version == Version::HTTP_11 {
            headers.set_raw_transfer_encoding_chunked()?;
            PayloadSize::Chunked
        } else {
            facts.keep_alive = false;
            PayloadSize::Upgrade
        };

        if !headers.has_connection() && status != StatusCode::SWITCHING_PROTOCOLS {
            if !facts.keep_alive {
                headers.set_raw_connection(false)?;
            } else if facts.version == Version::HTTP_10 {
                headers.set_raw_connection(true)?;
            }
        }

        self.set_date_and_server()?;
        Ok(payload)
    }

    fn set_date_and_server(&mut self) -> Result<(), HeaderError> {
        let (date, raw) = DateCache::global().current();
        self.headers.set_raw_date(date, raw)?;

        if let Some((value, raw)) = &self.server
            && !self.headers.contains("Server")
        {
            self.headers.set_raw_server(value.clone(), raw.clone())?;
        }
        Ok(())
    }

    /// Writes a body-less response that closes the connection. Failures are
    /// only logged, the connection is going away anyway.
    async fn send_error_response(&mut self, status: StatusCode) {
        if self.output.has_started() || self.output.is_closed() {
            return;
        }

        if let Err(e) = self.write_error_response(status) {
            debug!(cause = %e, status = status.as_u16(), "error response not written");
            return;
        }
        if let Err(e) = self.output.flush().await {
            debug!(cause = %e, status = status.as_u16(), "error response not delivered");
        }
    }

    fn write_error_response(&mut self, status: StatusCode) -> Result<(), SendError> {
        self.headers.reset();
        self.headers.set_content_length(Some(0))?;
        self.headers.set_raw_connection(false)?;
        self.set_date_and_server()?;

        self.output.write_response_headers(ResponseHead::new(status, &self.headers), PayloadSize::Length(0))?;
        self.headers.set_read_only();
        self.output.write_stream_suffix()
    }
}

/// Polls `future` to completion while keeping the body pump running, so an
/// application reading its body and a response waiting on the transport
/// never wait on each other.
async fn drive<F, S>(future: F, pump: &mut BodySender<'_, S>, pump_result: &mut PumpResult) -> F::Output
where
    F: Future,
    S: Stream<Item = Result<RequestMessage, ParseError>> + Unpin,
{
    tokio::pin!(future);
    loop {
        if pump_result.is_some() {
            return future.await;
        }
        tokio::select! {
            biased;
            output = &mut future => return output,
            result = pump.send_body() => *pump_result = Some(result),
        }
    }
}

/// The failure of the body pump, with the status to answer it with when the
/// client can still be told.
fn pump_failure(pump_result: &PumpResult) -> Option<Option<StatusCode>> {
    match pump_result {
        Some(Err(HttpError::RequestError { source })) => Some(source.status_code()),
        Some(Err(HttpError::ResponseError { .. })) => Some(None),
        _ => None,
    }
}

fn server_header(name: &str) -> Option<(HeaderValue, Bytes)> {
    let value = HeaderValue::from_str(name).ok()?;
    let mut raw = BytesMut::with_capacity(name.len() + 10);
    raw.put_slice(b"\r\nServer: ");
    raw.put_slice(value.as_bytes());
    Some((value, raw.freeze()))
}
