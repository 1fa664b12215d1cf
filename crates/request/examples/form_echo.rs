//! Drives a few requests through the facade the way a container would.
//!
//! run with `cargo run -p micro-request --example form_echo`

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::stream;
use http::Request;
use http::header::{ACCEPT_LANGUAGE, CONTENT_TYPE};
use http_body::Frame;
use http_body_util::StreamBody;
use micro_request::{
    AsyncEvent, AsyncListener, ConnectionInfo, EndpointConfig, FacadeConfig, RequestError, RequestFacade,
    RequestFactory, Resumption,
};
use serde::Deserialize;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Deserialize, Debug)]
struct User {
    name: String,
    zip: String,
}

struct LogListener;

impl AsyncListener for LogListener {
    fn on_complete(&self, _event: &AsyncEvent) {
        info!("async cycle completed");
    }

    fn on_timeout(&self, _event: &AsyncEvent) {
        info!("async cycle timed out");
    }
}

// the body arrives in several chunks, like a chunked upload would
type Chunks = stream::Iter<std::vec::IntoIter<Result<Frame<Bytes>, std::io::Error>>>;

fn chunked(chunks: &'static [&'static str]) -> StreamBody<Chunks> {
    let frames: Vec<_> = chunks.iter().map(|chunk| Ok(Frame::data(Bytes::from_static(chunk.as_bytes())))).collect();
    StreamBody::new(stream::iter(frames))
}

async fn echo_form(request: &mut RequestFacade) -> Result<String, RequestError> {
    let user: User = request.parameters_as().await?;
    let tags = request.parameter_values("tag").await?.map(<[String]>::to_vec).unwrap_or_default();
    Ok(format!("user {user:?}, tags {tags:?}, locale {}", request.locale()))
}

async fn echo_text(request: &mut RequestFacade) -> Result<String, RequestError> {
    let reader = request.reader()?;
    let mut lines = Vec::new();
    while let Some(line) = reader.read_line().await? {
        lines.push(line);
    }
    Ok(format!("{} lines decoded as {}", lines.len(), reader.charset()))
}

/// Suspends the request and completes it from a background task.
async fn slow_report(request: &mut RequestFacade) -> Result<Resumption, RequestError> {
    let context = request.start_async()?;
    context.add_listener(Arc::new(LogListener))?;

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        if let Err(e) = context.complete() {
            error!(cause = %e, "failed to complete");
        }
    });

    Ok(request.take_async_span()?.resume().await)
}

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::DEBUG).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let factory = RequestFactory::new(FacadeConfig::builder().container_encoding("UTF-8").build());
    let connection = ConnectionInfo::builder().remote_addr("127.0.0.1:50000".parse().expect("valid address")).build();

    let form = Request::post("/users?tag=new")
        .header(CONTENT_TYPE, mime::APPLICATION_WWW_FORM_URLENCODED.as_ref())
        .header(ACCEPT_LANGUAGE, "de-CH, de;q=0.9, en;q=0.5")
        .body(chunked(&["name=O%27Bri", "en&zip=80", "31&tag=vip"]))
        .expect("valid request");
    let mut request = factory.create(form, connection.clone(), EndpointConfig::new());
    match echo_form(&mut request).await {
        Ok(echo) => info!(request_id = request.request_id(), %echo, "form echoed"),
        Err(e) => error!(cause = %e, "form echo failed"),
    }

    let text = Request::post("/notes")
        .header(CONTENT_TYPE, "text/plain; charset=ISO-8859-1")
        .body(chunked(&["first line\r\n", "second line"]))
        .expect("valid request");
    let mut request = factory.create(text, connection.clone(), EndpointConfig::new());
    match echo_text(&mut request).await {
        Ok(echo) => info!(request_id = request.request_id(), %echo, "text echoed"),
        Err(e) => error!(cause = %e, "text echo failed"),
    }

    let report = Request::get("/report").body(chunked(&[])).expect("valid request");
    let mut request = factory.create(report, connection, EndpointConfig::new().async_supported(true));
    match slow_report(&mut request).await {
        Ok(resumption) => {
            info!(request_id = request.request_id(), ?resumption, state = ?request.async_state(), "report resumed");
        }
        Err(e) => error!(cause = %e, "report failed"),
    }
}
