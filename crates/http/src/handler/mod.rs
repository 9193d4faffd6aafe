//! The application contract.
//!
//! The connection hands every request to an [`Application`] in three steps:
//! [`create_context`](Application::create_context) once the head is parsed,
//! [`process`](Application::process) to produce the response, and
//! [`dispose_context`](Application::dispose_context) once the response has
//! been written (or abandoned). Plain `async fn` handlers are adapted with
//! [`make_handler`].

use std::error::Error;
use std::future::Future;

use async_trait::async_trait;
use http::{Request, Response};
use http_body::Body;

use crate::protocol::body::ReqBody;

#[async_trait]
pub trait Application: Send + Sync {
    /// Per-request state, owned by the connection between the three calls.
    type Context: Send;
    type RespBody: Body;
    type Error: Into<Box<dyn Error + Send + Sync>>;

    fn create_context(&self, request: Request<ReqBody>) -> Self::Context;

    async fn process(&self, context: &mut Self::Context) -> Result<Response<Self::RespBody>, Self::Error>;

    /// Called once per request, with the failure that ended it if any.
    fn dispose_context(&self, context: Self::Context, error: Option<&(dyn Error + Send + Sync + 'static)>) {
        let _ = (context, error);
    }
}

/// An [`Application`] built from an async function of the request.
#[derive(Debug)]
pub struct HandlerFn<F> {
    f: F,
}

#[async_trait]
impl<RespBody, Err, F, Fut> Application for HandlerFn<F>
where
    RespBody: Body,
    F: Fn(Request<ReqBody>) -> Fut + Send + Sync,
    Err: Into<Box<dyn Error + Send + Sync>>,
    Fut: Future<Output = Result<Response<RespBody>, Err>> + Send,
{
    type Context = Option<Request<ReqBody>>;
    type RespBody = RespBody;
    type Error = Box<dyn Error + Send + Sync>;

    fn create_context(&self, request: Request<ReqBody>) -> Self::Context {
        Some(request)
    }

    async fn process(&self, context: &mut Self::Context) -> Result<Response<Self::RespBody>, Self::Error> {
        let request = context.take().ok_or("request already processed")?;
        (self.f)(request).await.map_err(Into::into)
    }
}

pub fn make_handler<F, RespBody, Err, Ret>(f: F) -> HandlerFn<F>
where
    RespBody: Body,
    Err: Into<Box<dyn Error + Send + Sync>>,
    Ret: Future<Output = Result<Response<RespBody>, Err>>,
    F: Fn(Request<ReqBody>) -> Ret,
{
    HandlerFn { f }
}

#[cfg(test)]
mod tests {
    use http::StatusCode;
    use http_body_util::BodyExt;

    use super::*;

    async fn echo_path(request: Request<ReqBody>) -> Result<Response<String>, std::io::Error> {
        Ok(Response::new(request.uri().path().to_string()))
    }

    #[tokio::test]
    async fn handler_fn_runs_once_per_context() {
        let handler = make_handler(echo_path);
        let request = Request::builder().uri("/hello").body(ReqBody::empty()).unwrap();

        let mut context = handler.create_context(request);
        let response = handler.process(&mut context).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.into_body().collect().await.unwrap().to_bytes(), "/hello");

        assert!(handler.process(&mut context).await.is_err());
        handler.dispose_context(context, None);
    }
}
