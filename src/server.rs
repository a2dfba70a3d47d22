//! HTTP Streaming Server
//!
//! `GET /tags` runs the catalog tool for the request and streams the result
//! as a JSON array. Each request gets its own tool process, pipe and record
//! counter; the only shared pieces are the read-only configuration and the
//! tracker used to wait for streams at shutdown.
//!
//! Shutdown stops accepting connections immediately, then waits up to the
//! configured grace period for in-flight streams before cancelling them.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderValue, StatusCode, Version, header};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use tokio::net::TcpListener;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::emitter::{JsonArrayEmitter, body_channel};
use crate::error::{Result, ServerError};
use crate::transcoder::transcode;

/// Body of the `412` answer for transports that cannot stream
pub const STREAMING_DISABLED: &str = "Streaming disabled - Please try again at a later time";

/// How long aborted streams get to release their tools
const ABORT_DRAIN: Duration = Duration::from_secs(2);

/// Router state shared by all requests
#[derive(Clone)]
pub struct AppState {
    config: Arc<ServerConfig>,
    streams: TaskTracker,
    abort: CancellationToken,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config: Arc::new(config),
            streams: TaskTracker::new(),
            abort: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Number of transcodes still running
    pub fn active_streams(&self) -> usize {
        self.streams.len()
    }

    /// Cancel every in-flight stream, killing its tool
    pub fn abort_streams(&self) {
        self.abort.cancel();
    }

    /// Wait until every stream spawned so far has reached Closing
    pub async fn wait_for_streams(&self) {
        self.streams.close();
        self.streams.wait().await;
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/tags", get(stream_tags))
        .route("/", get(redirect_to_tags))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn redirect_to_tags() -> Redirect {
    Redirect::to("/tags")
}

async fn stream_tags(State(state): State<AppState>, version: Version) -> Response {
    // HTTP/1.0 has no chunked transfer encoding to stream with
    if version < Version::HTTP_11 {
        tracing::warn!(?version, "refusing to stream tag catalog");
        return (StatusCode::PRECONDITION_FAILED, STREAMING_DISABLED).into_response();
    }

    let (sender, receiver) = body_channel();
    let emitter = JsonArrayEmitter::new(sender);
    let tool = state.config.exiftool.clone();
    let cancel = state.abort.child_token();
    state.streams.spawn(async move {
        transcode(&tool, emitter, cancel).await.report();
    });

    let mut response = Response::new(Body::from_stream(ReceiverStream::new(receiver)));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    if version == Version::HTTP_11 {
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
    }
    response
}

/// Bind the configured address and serve until a termination signal
pub async fn serve(config: ServerConfig) -> Result<()> {
    let listener = TcpListener::bind(config.bind_address)
        .await
        .map_err(|source| ServerError::Bind {
            address: config.bind_address.to_string(),
            source,
        })?;

    let shutdown = CancellationToken::new();
    tokio::spawn(watch_signals(shutdown.clone()));

    serve_with_shutdown(listener, config, shutdown).await
}

/// Serve on `listener` until `shutdown` is cancelled, then drain streams for
/// at most the configured grace period.
pub async fn serve_with_shutdown(
    listener: TcpListener,
    config: ServerConfig,
    shutdown: CancellationToken,
) -> Result<()> {
    let grace = config.shutdown_grace;
    let state = AppState::new(config);
    let app = router(state.clone());

    tracing::info!(address = %listener.local_addr()?, "accepting requests");

    let signal = shutdown.clone().cancelled_owned();
    let mut server =
        tokio::spawn(async move { axum::serve(listener, app).with_graceful_shutdown(signal).await });

    tokio::select! {
        joined = &mut server => return Ok(joined??),
        _ = shutdown.cancelled() => {}
    }

    tracing::warn!(grace_secs = grace.as_secs(), "shutting web server down");
    let drain = async {
        let served = (&mut server).await;
        state.wait_for_streams().await;
        served
    };

    let drained = tokio::time::timeout(grace, drain).await;
    match drained {
        Ok(joined) => Ok(joined??),
        Err(_) => {
            tracing::warn!(
                streams = state.active_streams(),
                "grace period elapsed, aborting in-flight streams"
            );
            state.abort_streams();
            server.abort();
            let _ = tokio::time::timeout(ABORT_DRAIN, state.wait_for_streams()).await;
            Ok(())
        }
    }
}

/// Cancel `shutdown` on the first termination signal
pub async fn watch_signals(shutdown: CancellationToken) {
    match wait_for_signal().await {
        Ok(()) => shutdown.cancel(),
        Err(err) => tracing::error!(error = %err, "signal handling unavailable"),
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;
    let mut quit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = interrupt.recv() => {}
        _ = terminate.recv() => {}
        _ = hangup.recv() => {}
        _ = quit.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
