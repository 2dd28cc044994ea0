use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use http::header::{CONNECTION, CONTENT_LENGTH, EXPECT, TRANSFER_ENCODING};
use http::response::Parts;
use http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode, Version};
use http_body::Body;
use http_body_util::BodyExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::select;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::codec::{RequestDecoder, ResponseEncoder, is_chunked};
use crate::ensure;
use crate::handler::Application;
use crate::protocol::{
    HttpError, Message, ParseError, PayloadItem, PayloadSize, RequestHeader, ResponseBody, ResponseHead, SendError,
    status_has_no_body,
};

/// Largest request body the connection reads into memory.
pub const MAX_BODY_SIZE: usize = 8 * 1024 * 1024;

/// An HTTP/1.x connection serving requests one after another.
///
/// Each request body is read completely (up to [`MAX_BODY_SIZE`]) before the
/// application is called. The response body is pulled frame by frame and written as
/// it comes; a response with neither a known length nor a transfer coding is
/// delimited by closing the connection.
///
/// # Type Parameters
///
/// * `R`: The async readable stream type
/// * `W`: The async writable stream type
pub struct HttpConnection<R, W> {
    framed_read: FramedRead<R, RequestDecoder>,
    framed_write: FramedWrite<W, ResponseEncoder>,
}

impl<R, W> HttpConnection<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            framed_read: FramedRead::with_capacity(reader, RequestDecoder::new(), 8 * 1024),
            framed_write: FramedWrite::new(writer, ResponseEncoder::new()),
        }
    }

    /// Serves requests until the peer goes away, a response ends the connection, or
    /// `shutdown` fires while the connection waits for its next request.
    pub async fn process<A>(mut self, app: Arc<A>, shutdown: CancellationToken) -> Result<(), HttpError>
    where
        A: Application + ?Sized,
    {
        loop {
            let next = select! {
                biased;
                _ = shutdown.cancelled() => {
                    debug!("shutdown while waiting for a request, close connection");
                    return self.close().await;
                }
                next = self.framed_read.next() => next,
            };

            match next {
                Some(Ok(Message::Header((header, payload_size)))) => {
                    let keep_alive = self.do_process(header, payload_size, app.as_ref()).await?;
                    if !keep_alive {
                        trace!("response ends the connection");
                        return self.close().await;
                    }
                }

                Some(Ok(Message::Payload(_))) => {
                    error!("receive payload while waiting for a request head");
                    self.send_error(StatusCode::BAD_REQUEST).await?;
                    return Err(ParseError::invalid_body("need header while receive body").into());
                }

                Some(Err(e)) => {
                    error!(cause = %e, "can't receive next request");
                    self.send_error(StatusCode::BAD_REQUEST).await?;
                    return Err(e.into());
                }

                None => {
                    info!("cant read more request, break this connection down");
                    return Ok(());
                }
            }
        }
    }

    /// Answers one request, returning whether the connection stays open.
    async fn do_process<A>(&mut self, header: RequestHeader, payload_size: PayloadSize, app: &A) -> Result<bool, HttpError>
    where
        A: Application + ?Sized,
    {
        if !payload_size.is_empty() && expects_continue(header.headers()) {
            let writer = self.framed_write.get_mut();
            writer.write_all(b"HTTP/1.1 100 Continue\r\n\r\n").await.map_err(SendError::io)?;
            writer.flush().await.map_err(SendError::io)?;
            info!("receive expect request header, sent continue response");
        }

        let method = header.method().clone();
        let version = header.version();
        let keep_alive = header.keep_alive();

        let body = match self.read_body(payload_size).await {
            Ok(body) => body,
            Err(e) => {
                warn!(cause = %e, "can't read request body");
                let status = match e {
                    ParseError::TooLargeBody { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                    _ => StatusCode::BAD_REQUEST,
                };
                self.send_error(status).await?;
                return Err(e.into());
            }
        };

        let request: Request<Bytes> = header.body(body);
        let response = match app.call(request).await {
            Ok(response) => response,
            Err(e) => {
                error!(cause = %e, "handle response error");
                build_error_response(StatusCode::INTERNAL_SERVER_ERROR)
            }
        };

        self.send_response(&method, version, keep_alive, response).await
    }

    async fn read_body(&mut self, payload_size: PayloadSize) -> Result<Bytes, ParseError> {
        if let PayloadSize::Length(length) = payload_size {
            let length = usize::try_from(length).unwrap_or(usize::MAX);
            ensure!(length <= MAX_BODY_SIZE, ParseError::too_large_body(length, MAX_BODY_SIZE));
        }

        let mut body = BytesMut::new();
        loop {
            match self.framed_read.next().await {
                Some(Ok(Message::Payload(PayloadItem::Chunk(bytes)))) => {
                    let size = body.len() + bytes.len();
                    ensure!(size <= MAX_BODY_SIZE, ParseError::too_large_body(size, MAX_BODY_SIZE));
                    body.extend_from_slice(&bytes);
                }
                Some(Ok(Message::Payload(PayloadItem::Trailers(trailers)))) => {
                    debug!(trailers = trailers.len(), "discard request trailers");
                    return Ok(body.freeze());
                }
                Some(Ok(Message::Payload(PayloadItem::Eof))) => return Ok(body.freeze()),
                Some(Ok(Message::Header(_))) => return Err(ParseError::invalid_body("receive request head while reading body")),
                Some(Err(e)) => return Err(e),
                None => return Err(ParseError::invalid_body("connection closed while reading body")),
            }
        }
    }

    async fn send_response(
        &mut self,
        method: &Method,
        version: Version,
        mut keep_alive: bool,
        response: Response<ResponseBody>,
    ) -> Result<bool, HttpError> {
        let (mut parts, mut body) = response.into_parts();
        parts.version = Version::HTTP_11;

        let payload_size = payload_size(method, &parts, &body);
        // without chunked as the final coding, only closing the connection ends the body
        if payload_size.is_streamed() && !is_chunked(parts.headers.get(TRANSFER_ENCODING)) {
            debug!("response length unknown, delimit it by closing the connection");
            keep_alive = false;
        }

        if !keep_alive {
            parts.headers.insert(CONNECTION, HeaderValue::from_static("close"));
        } else if version == Version::HTTP_10 {
            parts.headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        }

        let header = Message::<_, Bytes>::Header((ResponseHead::from_parts(parts, ()), payload_size));
        self.framed_write.feed(header).await?;

        if payload_size.is_empty() {
            drop(body);
            self.framed_write.send(Message::Payload(PayloadItem::<Bytes>::Eof)).await?;
            return Ok(keep_alive);
        }

        loop {
            match body.frame().await {
                Some(Ok(frame)) => match frame.into_data() {
                    Ok(data) => self.framed_write.send(Message::Payload(PayloadItem::Chunk(data))).await?,
                    Err(_) => trace!("response is not chunked, skip its trailers"),
                },
                Some(Err(e)) => {
                    error!(cause = %e, "response body failed, abort the connection");
                    return Err(e);
                }
                None => {
                    self.framed_write.send(Message::Payload(PayloadItem::<Bytes>::Eof)).await?;
                    return Ok(keep_alive);
                }
            }
        }
    }

    async fn send_error(&mut self, status: StatusCode) -> Result<(), HttpError> {
        let mut response = build_error_response(status);
        response.headers_mut().insert(CONNECTION, HeaderValue::from_static("close"));
        self.send_response(&Method::GET, Version::HTTP_11, false, response).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), HttpError> {
        self.framed_write.get_mut().shutdown().await.map_err(SendError::io)?;
        Ok(())
    }
}

fn expects_continue(headers: &HeaderMap) -> bool {
    headers.get(EXPECT).is_some_and(|value| value.as_bytes().eq_ignore_ascii_case(b"100-continue"))
}

/// Decides how the response payload is delimited on the wire.
fn payload_size(method: &Method, parts: &Parts, body: &ResponseBody) -> PayloadSize {
    if method == Method::HEAD || status_has_no_body(parts.status) {
        return PayloadSize::Empty;
    }

    if parts.headers.contains_key(TRANSFER_ENCODING) {
        return PayloadSize::Streamed;
    }

    let declared = parts.headers.get(CONTENT_LENGTH).and_then(|value| value.to_str().ok()).and_then(|s| s.trim().parse::<u64>().ok());
    match declared.or_else(|| body.size_hint().exact()) {
        Some(length) => PayloadSize::Length(length),
        None => PayloadSize::Streamed,
    }
}

fn build_error_response(status: StatusCode) -> Response<ResponseBody> {
    let mut response = Response::new(ResponseBody::empty());
    *response.status_mut() = status;
    response
}
