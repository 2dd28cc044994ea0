use crate::codec::ChunkedEncoder;
use crate::protocol::{HttpError, PayloadItem};
use bytes::{Buf, Bytes, BytesMut};
use http::HeaderMap;
use http_body::{Body, Frame, SizeHint};
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use tokio_util::codec::Encoder;
use tracing::{error, trace};

/// Bytes reserved per chunk for the hex size line and the closing CRLF.
const CHUNK_OVERHEAD: usize = 20;

/// A body that yields the chunked framing of another body.
///
/// Each non-empty data frame of the inner body comes out as one framed chunk; empty
/// frames are skipped. When the inner body ends, one last frame carries the zero-size
/// chunk and any trailer fields the inner body produced. Nothing is buffered beyond
/// the fragment being framed.
///
/// The inner body is released exactly once: right after the terminal chunk is
/// produced, when the inner body fails, or when this body is dropped early.
pub struct ChunkedBody<B> {
    inner: Option<B>,
    encoder: ChunkedEncoder,
    trailers: Option<HeaderMap>,
}

impl<B> ChunkedBody<B> {
    pub fn new(body: B) -> Self {
        Self { inner: Some(body), encoder: ChunkedEncoder::new(), trailers: None }
    }

    /// Drops the inner body now. Calling it again does nothing.
    pub fn release(&mut self) {
        if self.inner.take().is_some() {
            trace!(sent = self.encoder.send_size(), "release chunked body source");
        }
    }

    /// Returns true once the inner body has been released.
    pub fn is_released(&self) -> bool {
        self.inner.is_none()
    }

    fn encode_item<D: Buf>(&mut self, item: PayloadItem<D>, capacity: usize) -> Result<Bytes, HttpError> {
        let mut dst = BytesMut::with_capacity(capacity);
        self.encoder.encode(item, &mut dst)?;
        Ok(dst.freeze())
    }
}

impl<B> Body for ChunkedBody<B>
where
    B: Body + Unpin,
    B::Error: Into<HttpError>,
{
    type Data = Bytes;
    type Error = HttpError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();

        loop {
            let Some(inner) = this.inner.as_mut() else {
                return Poll::Ready(None);
            };

            match ready!(Pin::new(inner).poll_frame(cx)) {
                Some(Ok(frame)) => {
                    let frame = match frame.into_data() {
                        Ok(data) if !data.has_remaining() => continue,
                        Ok(data) => {
                            let capacity = data.remaining() + CHUNK_OVERHEAD;
                            let result = this.encode_item(PayloadItem::Chunk(data), capacity);
                            if result.is_err() {
                                this.release();
                            }
                            return Poll::Ready(Some(result.map(Frame::data)));
                        }
                        Err(frame) => frame,
                    };

                    match frame.into_trailers() {
                        Ok(trailers) => match &mut this.trailers {
                            Some(existing) => existing.extend(trailers),
                            None => this.trailers = Some(trailers),
                        },
                        Err(_) => trace!("skip unknown body frame"),
                    }
                }

                Some(Err(e)) => {
                    let e = e.into();
                    error!(cause = %e, "chunked body source failed");
                    this.release();
                    return Poll::Ready(Some(Err(e)));
                }

                None => {
                    let item = match this.trailers.take() {
                        Some(trailers) if !trailers.is_empty() => PayloadItem::Trailers(trailers),
                        _ => PayloadItem::Eof,
                    };
                    let result = this.encode_item::<Bytes>(item, 64);
                    this.release();
                    return Poll::Ready(Some(result.map(Frame::data)));
                }
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_none()
    }

    fn size_hint(&self) -> SizeHint {
        SizeHint::default()
    }
}

impl<B> fmt::Debug for ChunkedBody<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkedBody")
            .field("released", &self.inner.is_none())
            .field("sent", &self.encoder.send_size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ResponseBody, SendError};
    use http::HeaderValue;
    use http_body_util::{BodyExt, StreamBody};
    use std::convert::Infallible;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn stream_of<I>(frames: I) -> ResponseBody
    where
        I: IntoIterator<Item = Result<Frame<Bytes>, HttpError>>,
        I::IntoIter: Send + 'static,
    {
        ResponseBody::stream(StreamBody::new(futures::stream::iter(frames)))
    }

    fn data(s: &'static str) -> Result<Frame<Bytes>, HttpError> {
        Ok(Frame::data(Bytes::from_static(s.as_bytes())))
    }

    async fn framed(body: ResponseBody) -> Bytes {
        ChunkedBody::new(body).collect().await.unwrap().to_bytes()
    }

    fn counted(body: ResponseBody) -> (ResponseBody, Arc<AtomicUsize>) {
        let closed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&closed);
        let body = body.on_close(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (body, closed)
    }

    #[tokio::test]
    async fn frames_each_fragment() {
        let body = stream_of(vec![data("Hello"), data(" "), data("World")]);
        assert_eq!(framed(body).await, "5\r\nHello\r\n1\r\n \r\n5\r\nWorld\r\n0\r\n\r\n");
    }

    #[tokio::test]
    async fn empty_fragments_are_skipped() {
        let body = stream_of(vec![data(""), data("ab"), data("")]);
        assert_eq!(framed(body).await, "2\r\nab\r\n0\r\n\r\n");
    }

    #[tokio::test]
    async fn empty_body_is_only_terminator() {
        assert_eq!(framed(ResponseBody::empty()).await, "0\r\n\r\n");
    }

    #[tokio::test]
    async fn size_is_byte_length_in_hex() {
        let text: Vec<u8> = "abc".encode_utf16().flat_map(u16::to_le_bytes).collect();
        let out = framed(ResponseBody::from(text)).await;
        assert!(out.starts_with(b"6\r\n"));

        let out = framed(ResponseBody::from(vec![b'x'; 255])).await;
        assert!(out.starts_with(b"ff\r\n"));
        assert!(out.ends_with(b"\r\n0\r\n\r\n"));
    }

    #[tokio::test]
    async fn trailers_follow_terminator() {
        let mut trailers = HeaderMap::new();
        trailers.insert("x-checksum", HeaderValue::from_static("abc"));
        trailers.insert("x-count", HeaderValue::from_static("2"));

        let body = stream_of(vec![data("hi"), Ok(Frame::trailers(trailers))]);
        assert_eq!(framed(body).await, "2\r\nhi\r\n0\r\nx-checksum: abc\r\nx-count: 2\r\n\r\n");
    }

    #[tokio::test]
    async fn released_once_after_terminal_chunk() {
        let (body, closed) = counted(stream_of(vec![data("a"), data("b")]));
        let mut chunked = ChunkedBody::new(body);

        chunked.frame().await.unwrap().unwrap();
        chunked.frame().await.unwrap().unwrap();
        assert_eq!(closed.load(Ordering::SeqCst), 0);

        let last = chunked.frame().await.unwrap().unwrap().into_data().unwrap();
        assert_eq!(last, "0\r\n\r\n");
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert!(chunked.is_end_stream());

        assert!(chunked.frame().await.is_none());
        chunked.release();
        drop(chunked);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn released_once_on_source_error() {
        let failing = vec![data("a"), Err(SendError::invalid_body("boom").into()), data("b")];
        let (body, closed) = counted(stream_of(failing));
        let mut chunked = ChunkedBody::new(body);

        assert_eq!(chunked.frame().await.unwrap().unwrap().into_data().unwrap(), "1\r\na\r\n");
        assert!(chunked.frame().await.unwrap().is_err());
        assert_eq!(closed.load(Ordering::SeqCst), 1);

        assert!(chunked.frame().await.is_none());
        drop(chunked);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn released_once_when_dropped_early() {
        let (body, closed) = counted(stream_of(vec![data("a"), data("b")]));
        let mut chunked = ChunkedBody::new(body);
        chunked.frame().await.unwrap().unwrap();

        chunked.release();
        assert!(chunked.is_released());
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        drop(chunked);
        assert_eq!(closed.load(Ordering::SeqCst), 1);

        let (body, closed) = counted(ResponseBody::from("never read"));
        drop(ChunkedBody::new(body));
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn wraps_any_body() {
        let body = http_body_util::Full::new(Bytes::from_static(b"full"))
            .map_err(|e: Infallible| -> HttpError { match e {} });
        let bytes = ChunkedBody::new(body).collect().await.unwrap().to_bytes();
        assert_eq!(bytes, "4\r\nfull\r\n0\r\n\r\n");
    }
}
