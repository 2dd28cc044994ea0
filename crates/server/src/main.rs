use bytes::Bytes;
use clap::Parser;
use http::{HeaderMap, HeaderValue, Request, Response, StatusCode};
use http_body::Frame;
use http_body_util::StreamBody;
use spindle_http::handler::{BoxError, make_application};
use spindle_http::protocol::{HttpError, ResponseBody};
use spindle_server::{ServerConfig, Supervisor};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

#[cfg(feature = "dhat-heap")]
#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

/// Serve the demo application under the spindle supervisor.
#[derive(Debug, Parser)]
#[command(name = "spindle", version)]
struct Args {
    /// Path to the JSON configuration file
    config: PathBuf,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let config = match ServerConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let level = if config.is_development() { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting default subscriber failed: {e}");
    }

    let supervisor = Supervisor::new(config);
    match supervisor.start(make_application(hello_world), |listening| info!(%listening, "accepting connections")) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(cause = %e, "server aborted");
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

/// Streams a greeting in pieces, with a trailer after the last one.
async fn hello_world(request: Request<Bytes>) -> Result<Response<ResponseBody>, BoxError> {
    info!(path = request.uri().path(), body_size = request.body().len(), "receive request");

    let mut trailers = HeaderMap::new();
    trailers.insert("expires", HeaderValue::from_static("tomorrow"));

    let frames: Vec<Result<Frame<Bytes>, HttpError>> = vec![
        Ok(Frame::data(Bytes::from_static(b"Hello"))),
        Ok(Frame::data(Bytes::from_static(b" "))),
        Ok(Frame::data(Bytes::from_static(b"World!\r\n"))),
        Ok(Frame::trailers(trailers)),
    ];
    let body = ResponseBody::stream(StreamBody::new(futures::stream::iter(frames)));

    Ok(Response::builder().status(StatusCode::OK).header(http::header::CONTENT_TYPE, "text/plain").body(body)?)
}
