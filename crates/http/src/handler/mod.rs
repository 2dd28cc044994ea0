//! The application seam between a connection and user code.
//!
//! An [`Application`] turns a request (head plus fully read body) into a response whose
//! body is a lazy [`ResponseBody`]. Plain async functions become applications through
//! [`make_application`].

use std::error::Error;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response};

use crate::protocol::ResponseBody;

pub type BoxError = Box<dyn Error + Send + Sync>;

#[async_trait]
pub trait Application: Send + Sync {
    async fn call(&self, req: Request<Bytes>) -> Result<Response<ResponseBody>, BoxError>;
}

#[async_trait]
impl<A: Application + ?Sized> Application for Arc<A> {
    async fn call(&self, req: Request<Bytes>) -> Result<Response<ResponseBody>, BoxError> {
        (**self).call(req).await
    }
}

#[async_trait]
impl<A: Application + ?Sized> Application for Box<A> {
    async fn call(&self, req: Request<Bytes>) -> Result<Response<ResponseBody>, BoxError> {
        (**self).call(req).await
    }
}

#[derive(Debug)]
pub struct ApplicationFn<F> {
    f: F,
}

#[async_trait]
impl<F, Fut, Err> Application for ApplicationFn<F>
where
    F: Fn(Request<Bytes>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response<ResponseBody>, Err>> + Send,
    Err: Into<BoxError>,
{
    async fn call(&self, req: Request<Bytes>) -> Result<Response<ResponseBody>, BoxError> {
        (self.f)(req).await.map_err(Into::into)
    }
}

pub fn make_application<F, Fut, Err>(f: F) -> ApplicationFn<F>
where
    F: Fn(Request<Bytes>) -> Fut,
    Fut: Future<Output = Result<Response<ResponseBody>, Err>>,
    Err: Into<BoxError>,
{
    ApplicationFn { f }
}
