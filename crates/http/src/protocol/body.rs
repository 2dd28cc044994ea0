//! The response body handed from applications to the connection driver.
//!
//! A [`ResponseBody`] is either a single buffered fragment or a boxed stream of
//! fragments. It may carry a close hook: the hook runs exactly once, when the body
//! value that owns it is dropped, which is how applications release whatever the
//! body was reading from (files, database cursors, upstream connections).

use bytes::Bytes;
use http_body::{Body, Frame, SizeHint};
use http_body_util::combinators::UnsyncBoxBody;
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::protocol::HttpError;

type CloseHook = Box<dyn FnOnce() + Send>;

pub struct ResponseBody {
    inner: Kind,
    on_close: Option<CloseHook>,
}

enum Kind {
    Once(Option<Bytes>),
    Stream(UnsyncBoxBody<Bytes, HttpError>),
}

impl ResponseBody {
    pub fn empty() -> Self {
        Self { inner: Kind::Once(None), on_close: None }
    }

    pub fn once(bytes: Bytes) -> Self {
        Self { inner: Kind::Once(Some(bytes)), on_close: None }
    }

    pub fn stream<B>(body: B) -> Self
    where
        B: Body<Data = Bytes, Error = HttpError> + Send + 'static,
    {
        Self { inner: Kind::Stream(UnsyncBoxBody::new(body)), on_close: None }
    }

    /// Registers a hook that runs once when this body is released.
    ///
    /// A previously registered hook still runs; the new one runs after it.
    #[must_use]
    pub fn on_close<F>(mut self, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_close = Some(match self.on_close.take() {
            Some(previous) => Box::new(move || {
                previous();
                f();
            }),
            None => Box::new(f),
        });
        self
    }

    /// Moves the body out, leaving an empty body in its place.
    ///
    /// The close hook travels with the returned body.
    pub fn take(&mut self) -> ResponseBody {
        std::mem::replace(self, ResponseBody::empty())
    }

    /// Replaces the body, releasing the previous one.
    pub fn replace(&mut self, body: ResponseBody) {
        *self = body;
    }

    /// Returns true if the body is known to produce no data.
    pub fn is_empty(&self) -> bool {
        matches!(self.inner, Kind::Once(None))
    }
}

impl Drop for ResponseBody {
    fn drop(&mut self) {
        if let Some(hook) = self.on_close.take() {
            hook();
        }
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.inner {
            Kind::Once(None) => "empty",
            Kind::Once(Some(_)) => "once",
            Kind::Stream(_) => "stream",
        };
        f.debug_struct("ResponseBody").field("kind", &kind).field("on_close", &self.on_close.is_some()).finish()
    }
}

impl From<Bytes> for ResponseBody {
    fn from(bytes: Bytes) -> Self {
        if bytes.is_empty() { Self::empty() } else { Self::once(bytes) }
    }
}

impl From<String> for ResponseBody {
    fn from(value: String) -> Self {
        Bytes::from(value).into()
    }
}

impl From<Vec<u8>> for ResponseBody {
    fn from(value: Vec<u8>) -> Self {
        Bytes::from(value).into()
    }
}

impl From<&'static str> for ResponseBody {
    fn from(value: &'static str) -> Self {
        Bytes::from_static(value.as_bytes()).into()
    }
}

impl From<()> for ResponseBody {
    fn from((): ()) -> Self {
        Self::empty()
    }
}

impl Body for ResponseBody {
    type Data = Bytes;
    type Error = HttpError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match &mut self.get_mut().inner {
            Kind::Once(option_bytes) => Poll::Ready(option_bytes.take().map(|bytes| Ok(Frame::data(bytes)))),
            Kind::Stream(box_body) => Pin::new(box_body).poll_frame(cx),
        }
    }

    fn is_end_stream(&self) -> bool {
        match &self.inner {
            Kind::Once(option_bytes) => option_bytes.is_none(),
            Kind::Stream(box_body) => box_body.is_end_stream(),
        }
    }

    fn size_hint(&self) -> SizeHint {
        match &self.inner {
            Kind::Once(None) => SizeHint::with_exact(0),
            Kind::Once(Some(bytes)) => SizeHint::with_exact(bytes.len() as u64),
            Kind::Stream(box_body) => box_body.size_hint(),
        }
    }
}
