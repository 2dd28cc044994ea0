//! HTTP request header handling.
//!
//! Wraps the standard `http::Request<()>` with the few request-level decisions the
//! connection driver and the chunking gate need: body presence and connection reuse.

use http::header::CONNECTION;
use http::request::Parts;
use http::{HeaderMap, Method, Request, Uri, Version};

/// Represents an HTTP request header.
#[derive(Debug)]
pub struct RequestHeader {
    inner: Request<()>,
}

impl AsRef<Request<()>> for RequestHeader {
    fn as_ref(&self) -> &Request<()> {
        &self.inner
    }
}

impl AsMut<Request<()>> for RequestHeader {
    fn as_mut(&mut self) -> &mut Request<()> {
        &mut self.inner
    }
}

impl RequestHeader {
    /// Consumes the header and returns the inner `Request<()>`.
    pub fn into_inner(self) -> Request<()> {
        self.inner
    }

    /// Attaches a body to this header, converting it into a full `Request<T>`.
    pub fn body<T>(self, body: T) -> Request<T> {
        self.inner.map(|()| body)
    }

    pub fn method(&self) -> &Method {
        self.inner.method()
    }

    pub fn uri(&self) -> &Uri {
        self.inner.uri()
    }

    pub fn version(&self) -> Version {
        self.inner.version()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// Determines if this request may carry a body based on its HTTP method.
    ///
    /// GET, HEAD, DELETE, OPTIONS and CONNECT requests are treated as bodiless.
    pub fn need_body(&self) -> bool {
        !matches!(self.method(), &Method::GET | &Method::HEAD | &Method::DELETE | &Method::OPTIONS | &Method::CONNECT)
    }

    /// Returns true if the connection may be reused after answering this request.
    ///
    /// HTTP/1.1 connections are persistent unless the client sends `connection: close`;
    /// HTTP/1.0 connections close unless the client asks for `connection: keep-alive`.
    pub fn keep_alive(&self) -> bool {
        let connection = self.headers().get(CONNECTION).and_then(|value| value.to_str().ok());
        let has_token = |token: &str| connection.is_some_and(|value| value.split(',').any(|t| t.trim().eq_ignore_ascii_case(token)));

        match self.version() {
            Version::HTTP_11 => !has_token("close"),
            Version::HTTP_10 => has_token("keep-alive"),
            _ => false,
        }
    }
}

impl From<Parts> for RequestHeader {
    #[inline]
    fn from(parts: Parts) -> Self {
        Self { inner: Request::from_parts(parts, ()) }
    }
}

impl From<Request<()>> for RequestHeader {
    #[inline]
    fn from(inner: Request<()>) -> Self {
        Self { inner }
    }
}
