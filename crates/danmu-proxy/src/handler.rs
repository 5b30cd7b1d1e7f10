//! hudsucker handlers feeding intercepted traffic into the adapter.
//!
//! hudsucker clones the handler for every request, so the request URL stored
//! in [`HttpHandler::handle_request`] is the one the matching
//! [`HttpHandler::handle_response`] sees.

use std::sync::Arc;

use danmu_core::{
    FrameDirection, HttpResponseFlow, InterceptionAdapter, ResponsePolicy, WebSocketFlow,
};
use http_body_util::{BodyExt, BodyStream, Full, StreamBody};
use hudsucker::futures::{stream, StreamExt};
use hudsucker::hyper::header::{CONTENT_ENCODING, CONTENT_LENGTH};
use hudsucker::hyper::{HeaderMap, Request, Response};
use hudsucker::tokio_tungstenite::tungstenite::Message;
use hudsucker::{
    Body, HttpContext, HttpHandler, RequestOrResponse, WebSocketContext, WebSocketHandler,
};
use hyper::body::{Bytes, Frame};

use crate::domains::HostAllowList;

fn bytes_to_body(bytes: Bytes) -> Body {
    Body::from(Full::new(bytes))
}

/// A response body read up to a size limit.
enum CappedBody {
    Complete(Bytes),
    /// The limit was crossed. Holds the chunks read so far followed by the
    /// unread remainder, so the client still receives every byte.
    Oversized(Body),
}

/// Reads data frames from `body` until it ends or more than `limit` bytes
/// have arrived.
async fn collect_capped(mut body: Body, limit: u64) -> Result<CappedBody, hudsucker::Error> {
    let mut chunks: Vec<Bytes> = Vec::new();
    let mut total: u64 = 0;

    while let Some(frame) = body.frame().await {
        let Ok(data) = frame?.into_data() else {
            continue;
        };
        total += data.len() as u64;
        chunks.push(data);

        if total > limit {
            let read = stream::iter(
                chunks
                    .into_iter()
                    .map(|chunk| Ok::<_, hudsucker::Error>(Frame::data(chunk))),
            );
            let rest = Body::from(StreamBody::new(read.chain(BodyStream::new(body))));
            return Ok(CappedBody::Oversized(rest));
        }
    }

    let bytes = match chunks.len() {
        0 => Bytes::new(),
        1 => chunks.swap_remove(0),
        _ => Bytes::from(chunks.concat()),
    };
    Ok(CappedBody::Complete(bytes))
}

/// Handler shared by the HTTP and WebSocket sides of the proxy.
#[derive(Debug, Clone)]
pub struct WebcastHandler {
    adapter: Arc<InterceptionAdapter>,
    hosts: Arc<HostAllowList>,
    stream_large_bodies: u64,
    request_url: Option<String>,
}

impl WebcastHandler {
    pub fn new(
        adapter: Arc<InterceptionAdapter>,
        hosts: HostAllowList,
        stream_large_bodies: u64,
    ) -> Self {
        Self {
            adapter,
            hosts: Arc::new(hosts),
            stream_large_bodies,
            request_url: None,
        }
    }

    pub fn adapter(&self) -> &InterceptionAdapter {
        &self.adapter
    }

    /// Whether a response for `url` with these headers is collected in full.
    fn should_buffer(&self, url: &str, headers: &HeaderMap) -> bool {
        if self.adapter.response_policy(url) != ResponsePolicy::Buffer {
            return false;
        }

        match declared_length(headers) {
            Some(len) if len > self.stream_large_bodies => {
                tracing::debug!(
                    "Streaming {} byte response from {} (limit {})",
                    len,
                    url,
                    self.stream_large_bodies
                );
                false
            }
            _ => true,
        }
    }

    /// Collects the body, hands it to the adapter, and rebuilds the response
    /// with the original bytes.
    ///
    /// Bodies larger than `stream_large_bodies` are passed through without
    /// being inspected.
    async fn inspect_response(&self, url: &str, res: Response<Body>) -> Response<Body> {
        let (parts, body) = res.into_parts();
        let body_bytes = match collect_capped(body, self.stream_large_bodies).await {
            Ok(CappedBody::Complete(bytes)) => bytes,
            Ok(CappedBody::Oversized(body)) => {
                tracing::debug!(
                    "Response from {} exceeds {} bytes, streaming",
                    url,
                    self.stream_large_bodies
                );
                return Response::from_parts(parts, body);
            }
            Err(e) => {
                tracing::warn!("Failed to read response body from {}: {}", url, e);
                return Response::from_parts(parts, Body::empty());
            }
        };

        let content_encoding = parts
            .headers
            .get(CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok());

        self.adapter.on_http_response(&HttpResponseFlow {
            url,
            content_encoding,
            body: &body_bytes,
        });

        Response::from_parts(parts, bytes_to_body(body_bytes))
    }

    fn inspect_frame(&self, url: &str, direction: FrameDirection, message: &Message) {
        // Client frames are never decoded.
        if direction == FrameDirection::ClientToServer {
            return;
        }

        if let Message::Binary(data) = message {
            self.adapter.on_websocket_message(&WebSocketFlow {
                url,
                direction,
                data: &data[..],
            });
        }
    }
}

fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

impl HttpHandler for WebcastHandler {
    async fn handle_request(
        &mut self,
        _ctx: &HttpContext,
        req: Request<Body>,
    ) -> RequestOrResponse {
        self.request_url = Some(req.uri().to_string());
        RequestOrResponse::Request(req)
    }

    async fn handle_response(&mut self, _ctx: &HttpContext, res: Response<Body>) -> Response<Body> {
        let Some(url) = self.request_url.take() else {
            return res;
        };

        if !self.should_buffer(&url, res.headers()) {
            return res;
        }

        self.inspect_response(&url, res).await
    }

    async fn should_intercept(&mut self, _ctx: &HttpContext, req: &Request<Body>) -> bool {
        let Some(host) = req.uri().host() else {
            return false;
        };

        let intercept = self.hosts.is_allowed(host);
        if !intercept {
            tracing::trace!("Tunnelling {}", host);
        }
        intercept
    }
}

impl WebSocketHandler for WebcastHandler {
    async fn handle_message(
        &mut self,
        ctx: &WebSocketContext,
        message: Message,
    ) -> Option<Message> {
        let (url, direction) = match ctx {
            WebSocketContext::ClientToServer { dst, .. } => (dst, FrameDirection::ClientToServer),
            WebSocketContext::ServerToClient { src, .. } => (src, FrameDirection::ServerToClient),
        };

        self.inspect_frame(&url.to_string(), direction, &message);
        Some(message)
    }
}
