use crate::chunked::ChunkedBody;
use crate::handler::{Application, BoxError};
use crate::protocol::{ResponseBody, status_has_no_body};
use async_trait::async_trait;
use bytes::Bytes;
use http::header::{CONTENT_LENGTH, TRANSFER_ENCODING};
use http::{HeaderValue, Request, Response, Version};
use tracing::trace;

/// Switches a response to chunked transfer coding when it is eligible.
///
/// A response is left untouched when its status never carries a body (1xx, 204,
/// 304), when it already declares a `content-length` or any `transfer-encoding`, or
/// when the request was made with a protocol version older than HTTP/1.1. Otherwise
/// `content-length` is removed, `transfer-encoding: chunked` is set and the body is
/// rewrapped in a [`ChunkedBody`].
///
/// Returns whether the response was switched.
pub fn chunk_response(version: Version, resp: &mut Response<ResponseBody>) -> bool {
    let status = resp.status();
    if status_has_no_body(status) {
        trace!(%status, "status carries no body, skip chunking");
        return false;
    }

    let headers = resp.headers();
    if headers.contains_key(CONTENT_LENGTH) || headers.contains_key(TRANSFER_ENCODING) {
        return false;
    }

    if version < Version::HTTP_11 {
        trace!(?version, "request predates chunked coding, skip chunking");
        return false;
    }

    let headers = resp.headers_mut();
    headers.remove(CONTENT_LENGTH);
    headers.insert(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));

    let body = resp.body_mut();
    let chunked = ChunkedBody::new(body.take());
    body.replace(ResponseBody::stream(chunked));
    true
}

/// Wraps an application so that each of its responses goes through [`chunk_response`].
#[derive(Debug, Clone)]
pub struct Chunked<A> {
    inner: A,
}

impl<A> Chunked<A> {
    pub fn new(inner: A) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> A {
        self.inner
    }
}

#[async_trait]
impl<A: Application> Application for Chunked<A> {
    async fn call(&self, req: Request<Bytes>) -> Result<Response<ResponseBody>, BoxError> {
        let version = req.version();
        let mut resp = self.inner.call(req).await?;
        chunk_response(version, &mut resp);
        Ok(resp)
    }
}
