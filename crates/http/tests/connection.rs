use std::convert::Infallible;
use std::error::Error;
use std::fmt::Display;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response, StatusCode};
use http_body::Body;
use http_body_util::{BodyExt, Empty};
use indoc::indoc;
use micro_h1::config::{ServerLimits, ServerOptions};
use micro_h1::connection::HttpConnection;
use micro_h1::handler::{Application, make_handler};
use micro_h1::protocol::body::{ReqBody, ResponseStream};
use micro_h1::protocol::{HttpError, ParseError, TraceIdentifier};
use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex, split};

type BoxError = Box<dyn Error + Send + Sync>;

fn crlf(s: &str) -> Vec<u8> {
    s.replace('\n', "\r\n").into_bytes()
}

/// Sends `input` then closes the client's write side, and returns what the
/// server wrote until it closed the connection.
async fn exchange<A>(app: Arc<A>, options: ServerOptions, input: &[u8]) -> (String, Result<(), HttpError>)
where
    A: Application,
    A::RespBody: Unpin,
    <A::RespBody as Body>::Error: Display,
{
    let (client, server) = duplex(64 * 1024);
    let (reader, writer) = split(server);
    let connection = HttpConnection::with_options(reader, writer, Arc::new(options));

    let (mut client_read, mut client_write) = split(client);
    client_write.write_all(input).await.unwrap();
    client_write.shutdown().await.unwrap();

    let (result, output) = tokio::join!(connection.process(app), async move {
        let mut output = Vec::new();
        client_read.read_to_end(&mut output).await.unwrap();
        output
    });
    (String::from_utf8(output).unwrap(), result)
}

/// Answers with the method and target, counting invocations.
#[derive(Debug, Default)]
struct Describe {
    calls: AtomicUsize,
}

#[async_trait]
impl Application for Describe {
    type Context = Request<ReqBody>;
    type RespBody = String;
    type Error = Infallible;

    fn create_context(&self, request: Request<ReqBody>) -> Self::Context {
        self.calls.fetch_add(1, Ordering::SeqCst);
        request
    }

    async fn process(&self, request: &mut Self::Context) -> Result<Response<String>, Infallible> {
        Ok(Response::new(format!("{} {}", request.method(), request.uri())))
    }
}

async fn echo(request: Request<ReqBody>) -> Result<Response<String>, BoxError> {
    let body = request.into_body().collect().await?.to_bytes();
    Ok(Response::new(String::from_utf8(body.to_vec())?))
}

async fn ignore_body(_request: Request<ReqBody>) -> Result<Response<String>, BoxError> {
    Ok(Response::new("ignored".to_string()))
}

async fn trace_id(request: Request<ReqBody>) -> Result<Response<String>, BoxError> {
    let id = request.extensions().get::<TraceIdentifier>().ok_or("missing trace id")?;
    Ok(Response::new(id.as_str().to_string()))
}

async fn fail(_request: Request<ReqBody>) -> Result<Response<String>, BoxError> {
    Err("application failure".into())
}

async fn no_content(_request: Request<ReqBody>) -> Result<Response<Empty<Bytes>>, BoxError> {
    Ok(Response::builder().status(StatusCode::NO_CONTENT).body(Empty::new())?)
}

async fn no_content_with_transfer_encoding(_request: Request<ReqBody>) -> Result<Response<Empty<Bytes>>, BoxError> {
    Ok(Response::builder().status(StatusCode::NO_CONTENT).header("Transfer-Encoding", "chunked").body(Empty::new())?)
}

async fn streamed(_request: Request<ReqBody>) -> Result<Response<ResponseStream>, BoxError> {
    let (mut writer, body) = ResponseStream::channel(4);
    tokio::spawn(async move {
        writer.write("hel").await?;
        writer.write("lo").await
    });
    Ok(Response::new(body))
}

#[tokio::test]
async fn get_with_keep_alive() {
    let app = Arc::new(Describe::default());
    let input = crlf(indoc! {"
        GET /foo?x=1 HTTP/1.1
        Host: example.com

        GET /bar HTTP/1.1
        Host: example.com

    "});

    let (output, result) = exchange(Arc::clone(&app), ServerOptions::default(), &input).await;
    result.unwrap();

    assert_eq!(app.calls.load(Ordering::SeqCst), 2);
    assert_eq!(output.matches("HTTP/1.1 200 OK\r\n").count(), 2);
    assert!(output.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(output.contains("\r\nContent-Length: 12\r\n"));
    assert!(output.contains("\r\n\r\nGET /foo?x=1"));
    assert!(output.ends_with("\r\n\r\nGET /bar"));
    assert!(output.contains("\r\nDate: "));
    assert!(output.contains("\r\nServer: micro-h1"));
    assert!(!output.contains("Connection: close"));
}

#[tokio::test]
async fn chunked_request_body() {
    let input = crlf(indoc! {"
        POST /upload HTTP/1.1
        Host: example.com
        Transfer-Encoding: chunked

        4
        Wiki
        0

    "});

    let (output, result) = exchange(Arc::new(make_handler(echo)), ServerOptions::default(), &input).await;
    result.unwrap();

    assert!(output.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(output.contains("\r\nContent-Length: 4\r\n"));
    assert!(output.ends_with("\r\n\r\nWiki"));
}

#[tokio::test]
async fn post_without_length_is_rejected() {
    let app = Arc::new(Describe::default());
    let input = b"POST /x HTTP/1.1\r\nHost: h\r\n\r\n";

    let (output, result) = exchange(Arc::clone(&app), ServerOptions::default(), input).await;

    assert!(matches!(result, Err(HttpError::RequestError { source: ParseError::LengthRequired { .. } })));
    assert_eq!(app.calls.load(Ordering::SeqCst), 0);
    assert!(output.starts_with("HTTP/1.1 411 Length Required\r\n"));
    assert!(output.contains("\r\nConnection: close\r\n"));
    assert!(output.contains("\r\nContent-Length: 0\r\n"));
}

#[tokio::test]
async fn overlong_request_line_is_rejected() {
    let app = Arc::new(Describe::default());
    let options = ServerOptions::default().with_limits(ServerLimits::default().with_max_request_line_size(64));
    let mut input = b"GET /".to_vec();
    input.extend(std::iter::repeat_n(b'a', 200));

    let (output, result) = exchange(Arc::clone(&app), options, &input).await;

    assert!(matches!(result, Err(HttpError::RequestError { source: ParseError::RequestLineTooLong })));
    assert_eq!(app.calls.load(Ordering::SeqCst), 0);
    assert!(output.starts_with("HTTP/1.1 414 URI Too Long\r\n"));
    assert!(output.contains("\r\nConnection: close\r\n"));
}

#[tokio::test]
async fn host_is_required_for_http11_only() {
    let app = Arc::new(Describe::default());
    let (output, result) = exchange(Arc::clone(&app), ServerOptions::default(), b"GET / HTTP/1.1\r\n\r\n").await;
    assert!(matches!(result, Err(HttpError::RequestError { source: ParseError::MissingHostHeader })));
    assert!(output.starts_with("HTTP/1.1 400 Bad Request\r\n"));

    let (output, result) = exchange(Arc::clone(&app), ServerOptions::default(), b"GET / HTTP/1.0\r\n\r\n").await;
    result.unwrap();
    assert!(output.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(output.contains("\r\nConnection: close\r\n"));
}

#[tokio::test]
async fn http10_keep_alive_is_announced() {
    let input = crlf(indoc! {"
        GET /a HTTP/1.0
        Connection: keep-alive

        GET /b HTTP/1.0

    "});

    let (output, result) = exchange(Arc::new(Describe::default()), ServerOptions::default(), &input).await;
    result.unwrap();

    assert_eq!(output.matches("HTTP/1.1 200 OK\r\n").count(), 2);
    assert!(output.contains("\r\nConnection: keep-alive\r\n"));
    assert!(output.contains("\r\nConnection: close\r\n"));
}

#[tokio::test]
async fn unread_body_is_drained_before_the_next_request() {
    let input = crlf(indoc! {"
        POST /first HTTP/1.1
        Host: h
        Content-Length: 5

        helloGET /second HTTP/1.1
        Host: h

    "});

    let (output, result) = exchange(Arc::new(make_handler(ignore_body)), ServerOptions::default(), &input).await;
    result.unwrap();

    assert_eq!(output.matches("HTTP/1.1 200 OK\r\n").count(), 2);
}

#[tokio::test]
async fn expect_continue_is_answered_on_first_read() {
    let input = crlf(indoc! {"
        PUT /data HTTP/1.1
        Host: h
        Expect: 100-continue
        Content-Length: 5

        hello"});

    let (output, result) = exchange(Arc::new(make_handler(echo)), ServerOptions::default(), &input).await;
    result.unwrap();

    assert!(output.starts_with("HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 200 OK\r\n"));
    assert_eq!(output.matches("100 Continue").count(), 1);
    assert!(output.ends_with("\r\n\r\nhello"));
}

#[tokio::test]
async fn expect_continue_without_read_closes() {
    let input = crlf(indoc! {"
        PUT /data HTTP/1.1
        Host: h
        Expect: 100-continue
        Content-Length: 5

    "});

    let (output, result) = exchange(Arc::new(make_handler(ignore_body)), ServerOptions::default(), &input).await;
    result.unwrap();

    assert!(output.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(!output.contains("100 Continue"));
}

#[tokio::test]
async fn body_too_large_fails_before_reading() {
    let options =
        ServerOptions::default().with_limits(ServerLimits::default().with_max_request_body_size(Some(4)));
    let input = b"POST /x HTTP/1.1\r\nHost: h\r\nContent-Length: 10\r\n\r\n0123456789";

    let (output, result) = exchange(Arc::new(make_handler(echo)), options, input).await;

    assert!(matches!(result, Err(HttpError::RequestError { source: ParseError::RequestBodyTooLarge })));
    assert!(output.starts_with("HTTP/1.1 413 Payload Too Large\r\n"));
}

#[tokio::test]
async fn application_errors_become_500() {
    let input = b"GET / HTTP/1.1\r\nHost: h\r\n\r\n";

    let (output, result) = exchange(Arc::new(make_handler(fail)), ServerOptions::default(), input).await;
    result.unwrap();

    assert!(output.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
    assert!(output.contains("\r\nConnection: close\r\n"));
}

#[tokio::test]
async fn head_and_no_content_have_no_framing() {
    let input = b"HEAD / HTTP/1.1\r\nHost: h\r\n\r\n";
    let (output, result) = exchange(Arc::new(Describe::default()), ServerOptions::default(), input).await;
    result.unwrap();
    assert!(output.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(!output.contains("Content-Length"));
    assert!(!output.contains("Transfer-Encoding"));
    assert!(output.ends_with("\r\n\r\n"));

    let input = b"DELETE /item HTTP/1.1\r\nHost: h\r\n\r\n";
    let (output, result) = exchange(Arc::new(make_handler(no_content)), ServerOptions::default(), input).await;
    result.unwrap();
    assert!(output.starts_with("HTTP/1.1 204 No Content\r\n"));
    assert!(!output.contains("Content-Length"));
}

#[tokio::test]
async fn bodiless_status_rejects_transfer_encoding() {
    let input = b"DELETE /item HTTP/1.1\r\nHost: h\r\n\r\n";
    let (output, result) =
        exchange(Arc::new(make_handler(no_content_with_transfer_encoding)), ServerOptions::default(), input).await;
    result.unwrap();

    assert!(output.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
    assert!(!output.contains("204"));
    assert!(!output.contains("Transfer-Encoding"));
    assert!(output.contains("\r\nConnection: close\r\n"));
}

#[tokio::test]
async fn upgrade_answered_without_101_closes() {
    let app = Arc::new(Describe::default());
    let input = crlf(indoc! {"
        GET /ws HTTP/1.1
        Host: h
        Connection: upgrade
        Upgrade: websocket

        GET /next HTTP/1.1
        Host: h

    "});

    let (output, result) = exchange(Arc::clone(&app), ServerOptions::default(), &input).await;
    result.unwrap();

    assert_eq!(app.calls.load(Ordering::SeqCst), 1);
    assert_eq!(output.matches("HTTP/1.1 200 OK\r\n").count(), 1);
    assert!(output.contains("\r\nConnection: close\r\n"));
}

#[tokio::test]
async fn unanswered_upgrade_is_not_drained() {
    let limits = ServerLimits::default().with_request_body_drain_timeout(Duration::from_secs(60));
    let options = Arc::new(ServerOptions::default().with_limits(limits));

    let (client, server) = duplex(64 * 1024);
    let (reader, writer) = split(server);
    let connection = HttpConnection::with_options(reader, writer, options);

    // the client keeps its side open, as a tunnel peer would
    let (mut client_read, mut client_write) = split(client);
    let input = b"GET /ws HTTP/1.1\r\nHost: h\r\nConnection: upgrade, keep-alive\r\nUpgrade: websocket\r\n\r\n";
    client_write.write_all(input).await.unwrap();

    let exchange = async {
        let (result, output) = tokio::join!(connection.process(Arc::new(Describe::default())), async move {
            let mut output = Vec::new();
            client_read.read_to_end(&mut output).await.unwrap();
            output
        });
        (result, String::from_utf8(output).unwrap())
    };
    let (result, output) = tokio::time::timeout(Duration::from_secs(5), exchange).await.unwrap();
    result.unwrap();

    assert_eq!(output.matches("HTTP/1.1 200 OK\r\n").count(), 1);
    drop(client_write);
}

#[tokio::test]
async fn streamed_response_is_chunked() {
    let input = b"GET /stream HTTP/1.1\r\nHost: h\r\n\r\n";

    let (output, result) = exchange(Arc::new(make_handler(streamed)), ServerOptions::default(), input).await;
    result.unwrap();

    assert!(output.contains("\r\nTransfer-Encoding: chunked\r\n"));
    assert!(output.ends_with("\r\n\r\n3\r\nhel\r\n2\r\nlo\r\n0\r\n\r\n"));
}

#[tokio::test]
async fn requests_carry_trace_identifiers() {
    let input = crlf(indoc! {"
        GET /1 HTTP/1.1
        Host: h

        GET /2 HTTP/1.1
        Host: h

    "});

    let (output, result) = exchange(Arc::new(make_handler(trace_id)), ServerOptions::default(), &input).await;
    result.unwrap();

    assert!(output.contains(":00000001HTTP/1.1 200 OK"));
    assert!(output.ends_with(":00000002"));
}

#[tokio::test]
async fn server_header_can_be_disabled() {
    let options = ServerOptions::default().with_server_header(false);
    let (output, result) =
        exchange(Arc::new(Describe::default()), options, b"GET / HTTP/1.1\r\nHost: h\r\n\r\n").await;
    result.unwrap();
    assert!(!output.contains("Server:"));
}
