//! HTTP/1.1 request/response framing on top of the event loop.
//!
//! [`HttpProtocolHandler`] accumulates bytes until the header terminator (CRLFCRLF)
//! arrives, parses the request head, routes the path against a fixed table and
//! returns one complete response. Request bodies are not supported: anything after
//! the terminator is discarded together with the consumed head.
//!
//! ```text
//!        ┌─────────────┐
//!        │   Reading   │ ← NeedMoreData until CRLFCRLF
//!        └──────┬──────┘
//!               │ head complete: parse + route
//!               ▼
//!        ┌──────────────────┐
//!        │    Writing       │ ← response drained by the loop
//!        └──────┬───────────┘
//!               ├─ Connection: keep-alive → Reading
//!               └─ anything else          → Closed
//! ```
//!
//! Keep-alive is granted only for an explicit `Connection: keep-alive` request
//! header; a request without the header is answered and then closed.

pub mod request;
pub mod response;
pub mod routes;

use tracing::{debug, warn};

use crate::{
    connection::Connection,
    handler::{Continuation, Outcome, ProtocolHandler, ServerContext},
};
use request::{find_header_end, HttpRequest};
use routes::Requester;

/// Largest header block accepted before the request is rejected.
pub const DEFAULT_MAX_HEADER_BYTES: usize = 8192;

/// What the handler remembers between a complete request and the end of its response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpState {
    /// A well-formed request was answered.
    Answered(HttpRequest),
    /// The request was rejected; the connection closes after the error response.
    Rejected,
}

#[derive(Debug, Clone)]
pub struct HttpProtocolHandler {
    max_header_bytes: usize,
}

impl Default for HttpProtocolHandler {
    fn default() -> Self {
        Self {
            max_header_bytes: DEFAULT_MAX_HEADER_BYTES,
        }
    }
}

impl HttpProtocolHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_header_bytes(max_header_bytes: usize) -> Self {
        Self { max_header_bytes }
    }
}

impl ProtocolHandler for HttpProtocolHandler {
    type State = HttpState;

    fn on_data(
        &self,
        ctx: &ServerContext,
        conn: &mut Connection<HttpState>,
        _data: &[u8],
    ) -> Outcome {
        let Some(end) = find_header_end(&conn.inbound) else {
            if conn.inbound.len() > self.max_header_bytes {
                warn!(
                    conn_id = %conn.id(),
                    bytes = conn.inbound.len(),
                    "request head too large"
                );
                conn.inbound.clear();
                conn.protocol_state = Some(HttpState::Rejected);
                return Outcome::ResponseReady(
                    routes::headers_too_large(self.max_header_bytes).to_bytes(),
                );
            }
            return Outcome::NeedMoreData;
        };

        let head = String::from_utf8_lossy(&conn.inbound[..end]).into_owned();
        conn.inbound.clear();

        match HttpRequest::parse(&head) {
            Ok(request) => {
                debug!(
                    conn_id = %conn.id(),
                    method = %request.method,
                    path = %request.path,
                    "request"
                );
                let requester = Requester {
                    conn_id: conn.id(),
                    uptime: conn.uptime(),
                };
                let response = routes::route(&request.path, requester, ctx);
                conn.protocol_state = Some(HttpState::Answered(request));
                Outcome::ResponseReady(response.to_bytes())
            }
            Err(e) => {
                warn!(conn_id = %conn.id(), error = %e, "malformed request");
                conn.protocol_state = Some(HttpState::Rejected);
                Outcome::ResponseReady(routes::bad_request(&e.to_string()).to_bytes())
            }
        }
    }

    fn on_response_sent(
        &self,
        _ctx: &ServerContext,
        conn: &mut Connection<HttpState>,
    ) -> Continuation {
        match &conn.protocol_state {
            Some(HttpState::Answered(request)) if request.wants_keep_alive() => {
                Continuation::KeepAlive
            }
            _ => Continuation::Close,
        }
    }
}
