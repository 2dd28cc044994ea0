use bytes::Bytes;
use http::header::TRANSFER_ENCODING;
use http::{Method, Request, Response, StatusCode};
use http_body::Frame;
use http_body_util::StreamBody;
use indoc::indoc;
use spindle_http::chunked::Chunked;
use spindle_http::connection::HttpConnection;
use spindle_http::handler::{Application, BoxError, make_application};
use spindle_http::protocol::{HttpError, ResponseBody};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex};
use tokio_util::sync::CancellationToken;

static CLOSED: AtomicUsize = AtomicUsize::new(0);

async fn app(req: Request<Bytes>) -> Result<Response<ResponseBody>, BoxError> {
    match (req.method(), req.uri().path()) {
        (&Method::POST, "/echo") => Ok(Response::new(ResponseBody::from(req.into_body()))),
        (_, "/fail") => Err("application failed".into()),
        (_, "/tracked") => Ok(Response::new(ResponseBody::from("tracked").on_close(|| {
            CLOSED.fetch_add(1, Ordering::SeqCst);
        }))),
        (_, "/gzip") => {
            let frames: Vec<Result<Frame<Bytes>, HttpError>> = vec![Ok(Frame::data(Bytes::from_static(b"compressed-bytes")))];
            let body = ResponseBody::stream(StreamBody::new(futures::stream::iter(frames)));
            Ok(Response::builder().header(TRANSFER_ENCODING, "gzip").body(body)?)
        }
        (_, "/empty") => Ok(Response::builder().status(StatusCode::NO_CONTENT).body(ResponseBody::empty())?),
        _ => {
            let frames: Vec<Result<Frame<Bytes>, HttpError>> =
                vec![Ok(Frame::data(Bytes::from_static(b"hello"))), Ok(Frame::data(Bytes::from_static(b" world")))];
            Ok(Response::new(ResponseBody::stream(StreamBody::new(futures::stream::iter(frames)))))
        }
    }
}

fn chunked_app() -> Arc<dyn Application> {
    Arc::new(Chunked::new(make_application(app)))
}

/// Writes `input`, half-closes, and returns everything the server wrote back.
async fn exchange(input: &str) -> String {
    let (mut client, server) = duplex(64 * 1024);
    let task = tokio::spawn(async move {
        let (reader, writer) = tokio::io::split(server);
        HttpConnection::new(reader, writer).process(chunked_app(), CancellationToken::new()).await
    });

    client.write_all(input.as_bytes()).await.unwrap();
    client.shutdown().await.unwrap();

    let mut output = String::new();
    client.read_to_string(&mut output).await.unwrap();
    let _ = task.await.unwrap();
    output
}

#[tokio::test]
async fn streams_chunked_response_on_keep_alive() {
    let request = indoc! {"
        GET /stream HTTP/1.1\r
        Host: localhost\r
        \r
        GET /stream HTTP/1.1\r
        Host: localhost\r
        \r
    "};

    let response = indoc! {"
        HTTP/1.1 200 OK\r
        transfer-encoding: chunked\r
        \r
        5\r
        hello\r
        6\r
         world\r
        0\r
        \r
    "};

    assert_eq!(exchange(request).await, response.repeat(2));
}

#[tokio::test]
async fn http10_response_is_close_delimited() {
    let output = exchange("GET /stream HTTP/1.0\r\n\r\nGET /stream HTTP/1.0\r\n\r\n").await;

    assert_eq!(output, "HTTP/1.1 200 OK\r\nconnection: close\r\n\r\nhello world");
}

#[tokio::test]
async fn request_bodies_reach_the_application() {
    let output = exchange("POST /echo HTTP/1.1\r\nContent-Length: 4\r\n\r\nping").await;
    assert!(output.ends_with("\r\n\r\n4\r\nping\r\n0\r\n\r\n"), "{output}");

    let output = exchange("POST /echo HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n2\r\npi\r\n2\r\nng\r\n0\r\n\r\n").await;
    assert!(output.ends_with("\r\n\r\n4\r\nping\r\n0\r\n\r\n"), "{output}");
}

#[tokio::test]
async fn head_response_has_headers_only() {
    let before = CLOSED.load(Ordering::SeqCst);
    let output = exchange("HEAD /tracked HTTP/1.1\r\n\r\n").await;

    assert_eq!(output, "HTTP/1.1 200 OK\r\ntransfer-encoding: chunked\r\n\r\n");
    assert!(CLOSED.load(Ordering::SeqCst) > before);
}

#[tokio::test]
async fn no_content_is_not_chunked() {
    let output = exchange("GET /empty HTTP/1.1\r\n\r\n").await;
    assert_eq!(output, "HTTP/1.1 204 No Content\r\n\r\n");
}

#[tokio::test]
async fn client_close_is_respected() {
    let output = exchange("GET /stream HTTP/1.1\r\nConnection: close\r\n\r\nGET /stream HTTP/1.1\r\n\r\n").await;

    assert!(output.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(output.contains("connection: close\r\n"));
    assert_eq!(output.matches("HTTP/1.1 200 OK").count(), 1);
}

#[tokio::test]
async fn application_error_is_internal_server_error() {
    let output = exchange("GET /fail HTTP/1.1\r\n\r\nGET /stream HTTP/1.1\r\n\r\n").await;

    assert!(output.starts_with("HTTP/1.1 500 Internal Server Error\r\n"), "{output}");
    assert!(output.contains("5\r\nhello\r\n"));
}

#[tokio::test]
async fn malformed_request_is_bad_request() {
    let output = exchange("GET /stream HTTP/1.1\r\nContent-Length: 1\r\nTransfer-Encoding: chunked\r\n\r\n").await;

    assert!(output.starts_with("HTTP/1.1 400 Bad Request\r\n"), "{output}");
    assert!(output.contains("connection: close\r\n"));
}

#[tokio::test]
async fn shutdown_closes_idle_connection() {
    let (mut client, server) = duplex(1024);
    let shutdown = CancellationToken::new();

    let token = shutdown.clone();
    let task = tokio::spawn(async move {
        let (reader, writer) = tokio::io::split(server);
        HttpConnection::new(reader, writer).process(chunked_app(), token).await
    });

    client.write_all(b"GET /stream HTTP/1.1\r\n\r\n").await.unwrap();
    let mut buf = vec![0; 512];
    let n = client.read(&mut buf).await.unwrap();
    assert!(buf[..n].starts_with(b"HTTP/1.1 200 OK"));

    shutdown.cancel();
    let result = tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn unchunked_transfer_coding_closes_the_connection() {
    let (mut client, server) = duplex(64 * 1024);
    let task = tokio::spawn(async move {
        let (reader, writer) = tokio::io::split(server);
        HttpConnection::new(reader, writer).process(chunked_app(), CancellationToken::new()).await
    });

    // the client keeps its side open: only the server closing ends the body
    client.write_all(b"GET /gzip HTTP/1.1\r\nHost: localhost\r\n\r\n").await.unwrap();

    let mut output = String::new();
    tokio::time::timeout(Duration::from_secs(5), client.read_to_string(&mut output)).await.unwrap().unwrap();
    assert!(output.starts_with("HTTP/1.1 200 OK\r\n"), "{output}");
    assert!(output.contains("transfer-encoding: gzip\r\n"), "{output}");
    assert!(output.contains("connection: close\r\n"), "{output}");
    assert!(output.ends_with("\r\n\r\ncompressed-bytes"), "{output}");

    let result = tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    assert!(result.is_ok());
}
