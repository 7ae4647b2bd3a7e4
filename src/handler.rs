use std::sync::Arc;

use crate::{connection::Connection, registry::ConnectionStats};

/// Result of feeding newly read bytes to a protocol handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The inbound buffer does not hold a complete request yet.
    NeedMoreData,
    /// A complete request was consumed; these bytes are the full response.
    ResponseReady(Vec<u8>),
}

/// What the loop does with a connection once its response has fully drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuation {
    KeepAlive,
    Close,
}

/// Read-only view of loop-wide state handed to protocol handlers.
#[derive(Clone)]
pub struct ServerContext {
    stats: Arc<ConnectionStats>,
}

impl ServerContext {
    pub fn new(stats: Arc<ConnectionStats>) -> Self {
        Self { stats }
    }

    pub fn active_connections(&self) -> usize {
        self.stats.active()
    }

    pub fn total_connections(&self) -> u64 {
        self.stats.total()
    }
}

/// Decision logic for one wire protocol.
///
/// A handler owns no I/O. The event loop appends every chunk it reads to
/// [`Connection::inbound`] and then calls [`on_data`](Self::on_data); the handler
/// decides whether the buffer holds a complete request, consumes it, and returns the
/// response bytes. After those bytes have been fully written the loop asks
/// [`on_response_sent`](Self::on_response_sent) whether to keep reading or close.
///
/// Handlers are invoked only from the loop thread, one connection at a time, so they
/// take `&self` and keep per-connection data in [`Connection::protocol_state`].
pub trait ProtocolHandler: 'static {
    /// Per-connection state kept between "request complete" and "response sent".
    type State;

    /// Called once after a connection is registered. Returning bytes sends them before
    /// any request is read.
    fn on_connect(
        &self,
        ctx: &ServerContext,
        conn: &mut Connection<Self::State>,
    ) -> Option<Vec<u8>> {
        let _ = (ctx, conn);
        None
    }

    /// Called after `data` has been appended to `conn.inbound`.
    fn on_data(
        &self,
        ctx: &ServerContext,
        conn: &mut Connection<Self::State>,
        data: &[u8],
    ) -> Outcome;

    /// Called once the outbound buffer has fully drained.
    fn on_response_sent(
        &self,
        ctx: &ServerContext,
        conn: &mut Connection<Self::State>,
    ) -> Continuation;

    /// Called after the connection left the registry, whatever the reason.
    fn on_disconnect(&self, ctx: &ServerContext, conn: &Connection<Self::State>) {
        let _ = (ctx, conn);
    }
}
