//! A newline-framed command protocol.
//!
//! The server greets every connection and asks for a client name. The first line a
//! client sends registers that name; after that the server answers one command per
//! line:
//!
//! | Command   | Reply                                   |
//! |-----------|-----------------------------------------|
//! | `time`    | current time in milliseconds since epoch |
//! | `uptime`  | this connection's age in milliseconds    |
//! | `clients` | active connection count                  |
//! | `help`    | the command list                         |
//! | `quit`    | `Goodbye!`, then the connection closes   |
//! | other     | `Echo: <line>`                           |
//!
//! Commands are trimmed and matched case-insensitively. A trailing `\r` is accepted.
//! A line longer than the configured limit is answered with an error and the
//! connection is closed.

use std::{cell::RefCell, collections::HashMap};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::{
    connection::{Connection, ConnectionId},
    handler::{Continuation, Outcome, ProtocolHandler, ServerContext},
};

pub const GREETING: &str = "Welcome! Please send your client name first.\n";
const HELP: &str = "Available commands: time, uptime, clients, help, quit\n";
const NAME_REQUIRED: &str = "Please send your client name first.\n";

/// Longest accepted line, excluding its terminator.
pub const DEFAULT_MAX_LINE_BYTES: usize = 8192;

/// Set once a reply that ends the session has been produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quit;

/// Command protocol handler.
///
/// Registered client names live in the handler, keyed by connection id, because the
/// per-request protocol state is reset after every reply. They are dropped in
/// [`on_disconnect`](ProtocolHandler::on_disconnect).
#[derive(Debug, Clone)]
pub struct LineProtocolHandler {
    max_line_bytes: usize,
    names: RefCell<HashMap<ConnectionId, String>>,
}

impl Default for LineProtocolHandler {
    fn default() -> Self {
        Self::with_max_line_bytes(DEFAULT_MAX_LINE_BYTES)
    }
}

impl LineProtocolHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_line_bytes(max_line_bytes: usize) -> Self {
        Self {
            max_line_bytes,
            names: RefCell::new(HashMap::new()),
        }
    }

    /// The name a connection registered with, if it has sent one yet.
    pub fn client_name(&self, id: ConnectionId) -> Option<String> {
        self.names.borrow().get(&id).cloned()
    }

    fn register(&self, conn: &Connection<Quit>, name: &str) -> String {
        if name.is_empty() {
            return NAME_REQUIRED.to_string();
        }
        info!(conn_id = %conn.id(), name, "client registered");
        self.names.borrow_mut().insert(conn.id(), name.to_string());
        format!("Hello {name}! You are now registered. {HELP}")
    }

    fn reply(&self, ctx: &ServerContext, conn: &Connection<Quit>, command: &str) -> String {
        match command.to_ascii_lowercase().as_str() {
            "time" => format!("Current time: {}\n", Utc::now().timestamp_millis()),
            "uptime" => format!(
                "Your connection uptime: {} ms\n",
                conn.uptime().as_millis()
            ),
            "clients" => format!(
                "Total connected clients: {}\n",
                ctx.active_connections()
            ),
            "help" => HELP.to_string(),
            "quit" => "Goodbye!\n".to_string(),
            _ => format!("Echo: {command}\n"),
        }
    }
}

impl ProtocolHandler for LineProtocolHandler {
    type State = Quit;

    fn on_connect(&self, _ctx: &ServerContext, conn: &mut Connection<Quit>) -> Option<Vec<u8>> {
        debug!(conn_id = %conn.id(), "sending greeting");
        Some(GREETING.as_bytes().to_vec())
    }

    fn on_data(&self, ctx: &ServerContext, conn: &mut Connection<Quit>, _data: &[u8]) -> Outcome {
        let newline = conn.inbound.iter().position(|b| *b == b'\n');
        let line_len = newline.unwrap_or(conn.inbound.len());
        if line_len > self.max_line_bytes {
            warn!(conn_id = %conn.id(), limit = self.max_line_bytes, "line too long");
            conn.inbound.clear();
            conn.protocol_state = Some(Quit);
            let reply = format!("Error: line exceeds {} bytes\n", self.max_line_bytes);
            return Outcome::ResponseReady(reply.into_bytes());
        }
        let Some(newline) = newline else {
            return Outcome::NeedMoreData;
        };

        let line: Vec<u8> = conn.inbound.drain(..=newline).collect();
        let text = String::from_utf8_lossy(&line);
        let command = text.trim();

        let Some(name) = self.client_name(conn.id()) else {
            return Outcome::ResponseReady(self.register(conn, command).into_bytes());
        };

        debug!(conn_id = %conn.id(), name = %name, command, "command");
        let reply = self.reply(ctx, conn, command);
        if command.eq_ignore_ascii_case("quit") {
            conn.protocol_state = Some(Quit);
        }
        Outcome::ResponseReady(reply.into_bytes())
    }

    fn on_response_sent(&self, _ctx: &ServerContext, conn: &mut Connection<Quit>) -> Continuation {
        match conn.protocol_state {
            Some(Quit) => Continuation::Close,
            None => Continuation::KeepAlive,
        }
    }

    fn on_disconnect(&self, _ctx: &ServerContext, conn: &Connection<Quit>) {
        if let Some(name) = self.names.borrow_mut().remove(&conn.id()) {
            debug!(conn_id = %conn.id(), name = %name, "client disconnected");
        }
    }
}
