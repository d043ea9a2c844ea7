//! server::upstream
//!
//! Passthrough of requests for modules not served from source.
//!
//! The request is replayed against the upstream base URL with its method,
//! path, query, headers and body, and the upstream response is streamed back
//! unchanged. Hop-by-hop headers (and `Host`) are dropped in both directions
//! and redirects are returned to the client rather than followed.

use bytes::Bytes;
use futures::TryStreamExt;
use http_body_util::{BodyExt, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::header::{HeaderMap, HeaderName, CONNECTION, HOST};
use hyper::{Request, Response};
use thiserror::Error;

use super::{BoxBody, BoxError};

/// Headers meaningful only for a single transport-level connection.
const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Errors from forwarding.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("failed to read request body: {0}")]
    Body(#[from] hyper::Error),

    #[error("upstream request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("invalid upstream url: {0}")]
    Url(String),

    #[error("invalid upstream response: {0}")]
    Response(#[from] hyper::http::Error),
}

/// Client for the upstream module proxy.
#[derive(Debug, Clone)]
pub struct Upstream {
    client: reqwest::Client,
    base: reqwest::Url,
}

impl Upstream {
    /// Forward to `base`, which may carry a path prefix.
    pub fn new(base: reqwest::Url) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { client, base })
    }

    /// Upstream base URL.
    pub fn base(&self) -> &reqwest::Url {
        &self.base
    }

    /// Target URL for a request path and query.
    pub fn target(&self, path: &str, query: Option<&str>) -> Result<reqwest::Url, UpstreamError> {
        let mut url = self.base.clone();
        let joined = format!("{}{}", self.base.path().trim_end_matches('/'), path);
        url.set_path(&joined);
        url.set_query(query);
        if url.cannot_be_a_base() {
            return Err(UpstreamError::Url(url.to_string()));
        }
        Ok(url)
    }

    /// Replay `req` upstream and stream the response back.
    pub async fn forward(&self, req: Request<Incoming>) -> Result<Response<BoxBody>, UpstreamError> {
        let (parts, body) = req.into_parts();
        let url = self.target(parts.uri.path(), parts.uri.query())?;
        let body = body.collect().await?.to_bytes();

        tracing::debug!(%url, method = %parts.method, "forwarding upstream");

        let upstream = self
            .client
            .request(parts.method, url)
            .headers(strip_hop_by_hop(&parts.headers, true))
            .body(body)
            .send()
            .await?;

        let mut response = Response::builder().status(upstream.status());
        if let Some(headers) = response.headers_mut() {
            *headers = strip_hop_by_hop(upstream.headers(), false);
        }

        let stream = upstream
            .bytes_stream()
            .map_ok(Frame::data)
            .map_err(|e| -> BoxError { Box::new(e) });

        Ok(response.body(StreamBody::new(stream).boxed_unsync())?)
    }
}

/// Copy `headers` without hop-by-hop headers, including any named by
/// `Connection`. `Host` is dropped too when `drop_host` is set.
pub fn strip_hop_by_hop(headers: &HeaderMap, drop_host: bool) -> HeaderMap {
    let named: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    let mut stripped = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if HOP_BY_HOP.contains(&name.as_str()) || named.contains(name) {
            continue;
        }
        if drop_host && *name == HOST {
            continue;
        }
        stripped.append(name.clone(), value.clone());
    }
    stripped
}

/// Wrap fixed bytes as a response body.
pub fn full(bytes: impl Into<Bytes>) -> BoxBody {
    http_body_util::Full::new(bytes.into())
        .map_err(|never| -> BoxError { match never {} })
        .boxed_unsync()
}
