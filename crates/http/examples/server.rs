use std::error::Error;
use std::sync::Arc;

use http::{Method, Request, Response, StatusCode};
use http_body_util::BodyExt;
use micro_h1::config::ServerOptions;
use micro_h1::connection::HttpConnection;
use micro_h1::handler::make_handler;
use micro_h1::protocol::body::{ReqBody, ResponseStream};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

type BoxError = Box<dyn Error + Send + Sync>;

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    info!(port = 8080, "start listening");
    let tcp_listener = match TcpListener::bind("127.0.0.1:8080").await {
        Ok(tcp_listener) => tcp_listener,
        Err(e) => {
            error!(cause = %e, "bind server error");
            return;
        }
    };

    let options = Arc::new(ServerOptions::default().with_show_error_details(true));
    let handler = Arc::new(make_handler(route));
    let shutdown = CancellationToken::new();

    loop {
        let (tcp_stream, remote_addr) = tokio::select! {
            accepted = tcp_listener.accept() => match accepted {
                Ok(stream_and_addr) => stream_and_addr,
                Err(e) => {
                    warn!(cause = %e, "failed to accept");
                    continue;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down, idle connections close now");
                shutdown.cancel();
                return;
            }
        };

        let handler = Arc::clone(&handler);
        let options = Arc::clone(&options);
        let shutdown = shutdown.clone();

        tokio::spawn(async move {
            let (reader, writer) = tcp_stream.into_split();
            let connection = HttpConnection::with_shutdown(reader, writer, options, shutdown);
            match connection.process(handler).await {
                Ok(()) => info!(%remote_addr, "connection closed"),
                Err(e) => warn!(%remote_addr, cause = %e, "connection closed with error"),
            }
        });
    }
}

/// `GET /` greets, `POST /echo` echoes the body, `GET /count` streams a
/// chunked response.
async fn route(request: Request<ReqBody>) -> Result<Response<ResponseStream>, BoxError> {
    let (mut writer, body) = ResponseStream::channel(8);
    let mut response = Response::new(body);

    let method = request.method().clone();
    let path = request.uri().path().to_owned();

    if method == Method::GET && path == "/" {
        writer.write("Hello World!\r\n").await?;
    } else if method == Method::POST && path == "/echo" {
        tokio::spawn(async move {
            let mut body = request.into_body();
            while let Some(frame) = body.frame().await {
                let Ok(data) = frame?.into_data() else { continue };
                writer.write(data).await?;
            }
            Ok::<_, BoxError>(())
        });
    } else if method == Method::GET && path == "/count" {
        tokio::spawn(async move {
            for i in 0..5 {
                writer.write(format!("{i}\r\n")).await?;
                tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            }
            Ok::<_, BoxError>(())
        });
    } else {
        *response.status_mut() = StatusCode::NOT_FOUND;
    }

    Ok(response)
}
