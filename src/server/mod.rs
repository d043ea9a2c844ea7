//! server
//!
//! HTTP front end implementing the module proxy protocol.
//!
//! # Architecture
//!
//! One tokio task per connection, each serving HTTP/1.1 through hyper. A
//! request path is matched to a [`routes::Route`]. Modules matching a
//! configured pattern are validated, decoded and answered by the
//! [`ModuleProxy`]; everything else is streamed through
//! [`upstream::Upstream`] as received.
//!
//! # Status codes
//!
//! | error kind | list | info / latest | mod / zip |
//! |---|---|---|---|
//! | not found | 404 | 400 | 404 |
//! | resolution | 404 | 400 | 404 |
//! | unsupported version | 400 | 400 | 400 |
//! | fetch | 502 | 502 | 502 |
//! | archive / internal | 500 | 500 | 500 |
//!
//! Error bodies carry only the status text; the detail goes to the log.
//!
//! # Shutdown
//!
//! [`ProxyServer::stop`] stops the accept loop and asks every open connection
//! to finish its in-flight request. Connections still open after the drain
//! timeout are aborted.
//!
//! # Example
//!
//! ```ignore
//! use modgate::server::ProxyServer;
//! use std::sync::Arc;
//!
//! let server = Arc::new(ProxyServer::new(proxy, config.upstream().clone())?);
//! let stopper = Arc::clone(&server);
//! tokio::spawn(async move {
//!     tokio::signal::ctrl_c().await.ok();
//!     stopper.stop();
//! });
//! server.start("0.0.0.0:7589".parse()?).await?;
//! ```

pub mod routes;
pub mod upstream;

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http_body_util::combinators::UnsyncBoxBody;
use hyper::body::Incoming;
use hyper::header::{HeaderValue, ALLOW, CONTENT_TYPE, HOST, USER_AGENT};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::proxy::{ErrorKind, ModuleProxy, ProxyError};
use routes::{Endpoint, Route};
use upstream::{full, Upstream, UpstreamError};

/// Error type of response bodies.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Response body: fixed bytes or a stream relayed from upstream.
pub type BoxBody = UnsyncBoxBody<Bytes, BoxError>;

/// Default time allowed for connections to drain on shutdown.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Default listen address.
pub const DEFAULT_ADDR: &str = "0.0.0.0:7589";

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
const APPLICATION_JSON: &str = "application/json";
const APPLICATION_ZIP: &str = "application/zip";

/// Pause after a failed accept before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

struct Handler {
    proxy: ModuleProxy,
    upstream: Upstream,
}

/// The protocol server.
pub struct ProxyServer {
    handler: Arc<Handler>,
    shutdown: watch::Sender<bool>,
    drain_timeout: Duration,
}

impl std::fmt::Debug for ProxyServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyServer")
            .field("proxy", &self.handler.proxy)
            .field("upstream", self.handler.upstream.base())
            .field("drain_timeout", &self.drain_timeout)
            .finish()
    }
}

impl ProxyServer {
    /// Serve `proxy`, forwarding everything else to `upstream`.
    ///
    /// # Errors
    ///
    /// Fails when the upstream HTTP client cannot be built.
    pub fn new(proxy: ModuleProxy, upstream: reqwest::Url) -> Result<Self, UpstreamError> {
        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            handler: Arc::new(Handler {
                proxy,
                upstream: Upstream::new(upstream)?,
            }),
            shutdown,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        })
    }

    /// Set how long [`ProxyServer::stop`] waits for connections to drain.
    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    /// Bind `addr` and serve until stopped.
    pub async fn start(&self, addr: SocketAddr) -> std::io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Serve connections from `listener` until stopped.
    ///
    /// Accept errors are logged and serving continues.
    pub async fn serve(&self, listener: TcpListener) -> std::io::Result<()> {
        let local = listener.local_addr()?;
        tracing::info!(addr = %local, "listening");

        let mut stopped = self.shutdown.subscribe();
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                _ = stop_requested(&mut stopped) => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, remote)) => {
                        let handler = Arc::clone(&self.handler);
                        let stop = self.shutdown.subscribe();
                        connections.spawn(serve_connection(handler, stream, remote, stop));
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        drop(listener);
        tracing::info!(open = connections.len(), "draining connections");

        let drained = tokio::time::timeout(self.drain_timeout, async {
            while connections.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            tracing::warn!(open = connections.len(), "drain timeout elapsed, aborting connections");
            connections.abort_all();
            while connections.join_next().await.is_some() {}
        }

        tracing::info!("server stopped");
        Ok(())
    }

    /// Stop accepting and drain open connections.
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
    }
}

/// Resolves once `stop` reads `true`, or its sender is gone.
///
/// The borrowed value is dropped before this returns.
async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|stop| *stop).await;
}

async fn serve_connection(
    handler: Arc<Handler>,
    stream: tokio::net::TcpStream,
    remote: SocketAddr,
    mut stop: watch::Receiver<bool>,
) {
    let io = TokioIo::new(stream);
    let service = service_fn(move |req| {
        let handler = Arc::clone(&handler);
        async move { Ok::<_, Infallible>(handler.handle(req, remote).await) }
    });

    let conn = http1::Builder::new().serve_connection(io, service);
    tokio::pin!(conn);

    tokio::select! {
        result = conn.as_mut() => {
            if let Err(e) = result {
                tracing::debug!(remote = %remote, error = %e, "connection error");
            }
        }
        _ = stop_requested(&mut stop) => {
            conn.as_mut().graceful_shutdown();
            if let Err(e) = conn.await {
                tracing::debug!(remote = %remote, error = %e, "connection error during shutdown");
            }
        }
    }
}

impl Handler {
    /// Handle one request and write its access log line.
    async fn handle(&self, req: Request<Incoming>, remote: SocketAddr) -> Response<BoxBody> {
        let started = Instant::now();
        let request_id = Uuid::new_v4();
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let host = header_str(&req, HOST);
        let user_agent = header_str(&req, USER_AGENT);

        let response = self.route(req, request_id).await;

        tracing::info!(
            request_id = %request_id,
            method = %method,
            path = %path,
            host = %host,
            remote = %remote,
            user_agent = %user_agent,
            status = response.status().as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "request"
        );

        response
    }

    async fn route(&self, req: Request<Incoming>, request_id: Uuid) -> Response<BoxBody> {
        let route = match routes::parse(req.uri().path()) {
            Ok(route) => route,
            Err(e) => return status_response(e.status()),
        };

        if !self.proxy.is_proxy(&route.match_path()) {
            return match self.upstream.forward(req).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!(request_id = %request_id, module = %route.module, error = %e, "upstream failed");
                    status_response(StatusCode::BAD_GATEWAY)
                }
            };
        }

        if req.method() != Method::GET {
            let mut response = status_response(StatusCode::METHOD_NOT_ALLOWED);
            response
                .headers_mut()
                .insert(ALLOW, HeaderValue::from_static("GET"));
            return response;
        }

        match route.decode() {
            Ok(route) => self.dispatch(route, request_id).await,
            Err(e) => {
                tracing::warn!(request_id = %request_id, error = %e, "invalid request path");
                status_response(e.status())
            }
        }
    }

    async fn dispatch(&self, route: Route, request_id: Uuid) -> Response<BoxBody> {
        let Route { module, endpoint } = route;

        let result = match &endpoint {
            Endpoint::List => self
                .proxy
                .versions(&module)
                .await
                .map(|versions| body_response(TEXT_PLAIN, list_body(&versions))),
            Endpoint::Info(version) => self
                .proxy
                .get_info(&module, version)
                .await
                .and_then(json_response),
            Endpoint::Latest => self
                .proxy
                .get_latest_version(&module)
                .await
                .and_then(json_response),
            Endpoint::Mod(version) => self
                .proxy
                .get_descriptor(&module, version)
                .await
                .map(|bytes| body_response(TEXT_PLAIN, bytes)),
            Endpoint::Zip(version) => self
                .proxy
                .get_archive(&module, version)
                .await
                .map(|bytes| body_response(APPLICATION_ZIP, bytes)),
        };

        match result {
            Ok(response) => response,
            Err(e) => {
                let status = error_status(e.kind(), &endpoint);
                if status.is_server_error() {
                    tracing::error!(request_id = %request_id, endpoint = endpoint.name(), error = %e, "request failed");
                } else {
                    tracing::warn!(request_id = %request_id, endpoint = endpoint.name(), error = %e, "request rejected");
                }
                status_response(status)
            }
        }
    }
}

/// Status code for a failed operation on an endpoint.
pub fn error_status(kind: ErrorKind, endpoint: &Endpoint) -> StatusCode {
    let metadata = matches!(endpoint, Endpoint::Info(_) | Endpoint::Latest);
    match kind {
        ErrorKind::NotFound | ErrorKind::Resolution if metadata => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound | ErrorKind::Resolution => StatusCode::NOT_FOUND,
        ErrorKind::UnsupportedVersion => StatusCode::BAD_REQUEST,
        ErrorKind::Fetch => StatusCode::BAD_GATEWAY,
        ErrorKind::Archive | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn list_body(versions: &[String]) -> String {
    versions.iter().map(|v| format!("{}\n", v)).collect()
}

fn json_response<T: serde::Serialize>(value: T) -> Result<Response<BoxBody>, ProxyError> {
    let body = serde_json::to_vec(&value).map_err(|e| ProxyError::internal("encode", "", e))?;
    Ok(body_response(APPLICATION_JSON, body))
}

fn body_response(content_type: &'static str, body: impl Into<Bytes>) -> Response<BoxBody> {
    let mut response = Response::new(full(body));
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn status_response(status: StatusCode) -> Response<BoxBody> {
    let text = format!("{}\n", status.canonical_reason().unwrap_or("error"));
    let mut response = body_response(TEXT_PLAIN, text);
    *response.status_mut() = status;
    response
}

fn header_str<B>(req: &Request<B>, name: hyper::header::HeaderName) -> String {
    req.headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("-")
        .to_string()
}
