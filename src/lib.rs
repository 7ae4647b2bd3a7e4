//! # mill-mux
//! A single-threaded, readiness-driven connection multiplexer built on [`mio`].
//!
//! One thread monitors every open connection and performs accept, read and write work
//! only when the operating system reports a socket ready. Partial reads accumulate in a
//! per-connection buffer until the protocol layer recognises a complete request;
//! partial writes resume from where the socket stopped accepting bytes.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────┐    ┌──────────────┐    ┌─────────────┐
//! │ EventLoop   │───▶│   Reactor    │───▶│ PollHandle  │
//! └─────────────┘    └──────┬───────┘    └─────────────┘
//!                           │
//!             ┌─────────────┴─────────────┐
//!             ▼                           ▼
//!   ┌────────────────────┐      ┌──────────────────┐
//!   │ ConnectionRegistry │      │ ProtocolHandler  │
//!   │  Token → Connection│      │  (HTTP, line)    │
//!   └────────────────────┘      └──────────────────┘
//! ```
//!
//! - [`EventLoop`]: binds the listener and runs the loop, in place or on its own thread
//! - [`ProtocolHandler`]: framing and response logic for one wire protocol
//! - [`reactor`]: the scheduler and per-connection interest state machine
//! - [`registry`]: the token → connection map and the shared counters
//! - [`net`]: the HTTP/1.1 and line-command protocol handlers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mill_mux::{net::http::HttpProtocolHandler, EventLoop, ServerConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::with_port(8080);
//!     let event_loop = EventLoop::new(config, HttpProtocolHandler::new())?;
//!
//!     let server = event_loop.start()?;
//!     println!("listening on http://{}", server.local_addr());
//!
//!     // ... later, from any thread
//!     server.stop();
//!     server.join()?;
//!     Ok(())
//! }
//! ```

use std::{
    net::SocketAddr,
    sync::{mpsc, Arc},
    thread::{Builder, JoinHandle},
};

pub mod config;
pub mod connection;
pub mod error;
pub mod event;
pub mod handler;
pub mod net;
pub mod poll;
pub mod reactor;
pub mod registry;

pub use config::ServerConfig;
pub use connection::{Connection, ConnectionId};
pub use error::{NetworkError, Result};
pub use handler::{Continuation, Outcome, ProtocolHandler, ServerContext};
pub use poll::ShutdownHandle;
pub use registry::ConnectionStats;

use reactor::Reactor;

/// A convenient prelude module that re-exports commonly used types and traits.
///
/// ```rust
/// use mill_mux::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::ServerConfig;
    pub use crate::connection::{Connection, ConnectionId};
    pub use crate::handler::{Continuation, Outcome, ProtocolHandler, ServerContext};
    pub use crate::net::{http::HttpProtocolHandler, line::LineProtocolHandler};
    pub use crate::{EventLoop, ServerHandle};
}

/// The public boundary of the multiplexer.
///
/// Construction binds the listening socket, so a port conflict surfaces here rather
/// than inside the loop. The loop can then run on the calling thread with
/// [`run`](Self::run), or on a dedicated thread with [`start`](Self::start).
pub struct EventLoop<P: ProtocolHandler> {
    reactor: Reactor<P>,
}

impl<P: ProtocolHandler> EventLoop<P> {
    pub fn new(config: ServerConfig, handler: P) -> Result<Self> {
        Ok(Self {
            reactor: Reactor::new(config, handler)?,
        })
    }

    /// Creates a loop whose connection ids and counts come from `stats`, which can be
    /// shared with other loops.
    pub fn with_stats(config: ServerConfig, handler: P, stats: Arc<ConnectionStats>) -> Result<Self> {
        Ok(Self {
            reactor: Reactor::with_stats(config, handler, stats)?,
        })
    }

    /// The bound address; useful when the configured port was 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.reactor.local_addr()
    }

    pub fn active_connection_count(&self) -> usize {
        self.reactor.active_connection_count()
    }

    pub fn total_connection_count(&self) -> u64 {
        self.reactor.total_connection_count()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.reactor.shutdown_handle()
    }

    /// Runs the loop on the current thread until [`ShutdownHandle::shutdown`] is called.
    ///
    /// ## Errors
    ///
    /// Returns an error only if the readiness primitive itself fails. Failures on
    /// individual connections are logged and close that connection.
    pub fn run(&mut self) -> Result<()> {
        self.reactor.run()
    }

    /// Moves the loop onto a dedicated thread and returns once it is about to poll.
    pub fn start(self) -> Result<ServerHandle>
    where
        P: Send,
        P::State: Send,
    {
        let mut reactor = self.reactor;
        let local_addr = reactor.local_addr();
        let stats = reactor.stats();
        let shutdown = reactor.shutdown_handle();
        let (ready_tx, ready_rx) = mpsc::channel();

        let thread = Builder::new()
            .name(format!("mill-mux-{}", local_addr.port()))
            .spawn(move || {
                let _ = ready_tx.send(());
                reactor.run()
            })?;

        ready_rx
            .recv()
            .map_err(|e| NetworkError::StartupFailed(e.to_string()))?;

        Ok(ServerHandle {
            local_addr,
            stats,
            shutdown,
            thread: Some(thread),
        })
    }
}

/// Handle to a loop running on its own thread.
///
/// Dropping the handle stops the loop and waits for the thread to finish.
pub struct ServerHandle {
    local_addr: SocketAddr,
    stats: Arc<ConnectionStats>,
    shutdown: ShutdownHandle,
    thread: Option<JoinHandle<Result<()>>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn active_connection_count(&self) -> usize {
        self.stats.active()
    }

    pub fn total_connection_count(&self) -> u64 {
        self.stats.total()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Requests termination after the current iteration. Non-blocking.
    pub fn stop(&self) {
        self.shutdown.shutdown();
    }

    /// Waits for the loop thread to exit and returns its result.
    pub fn join(mut self) -> Result<()> {
        self.join_thread()
    }

    fn join_thread(&mut self) -> Result<()> {
        match self.thread.take() {
            Some(thread) => thread.join().map_err(|_| NetworkError::EventLoopGone)?,
            None => Ok(()),
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.stop();
            let _ = self.join_thread();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{http::HttpProtocolHandler, line::LineProtocolHandler};
    use std::{
        io::{Read, Write},
        net::TcpStream,
        thread,
        time::{Duration, Instant},
    };

    fn test_config() -> ServerConfig {
        ServerConfig::builder()
            .address("127.0.0.1:0".parse().unwrap())
            .poll_timeout(Duration::from_millis(10))
            .build()
    }

    fn start_http() -> ServerHandle {
        EventLoop::new(test_config(), HttpProtocolHandler::new())
            .unwrap()
            .start()
            .unwrap()
    }

    fn connect(addr: SocketAddr) -> TcpStream {
        let stream = TcpStream::connect(addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        stream
    }

    /// Reads one response framed by its Content-Length; returns (head, body).
    fn read_response(stream: &mut TcpStream) -> (String, String) {
        let mut raw = Vec::new();
        let mut byte = [0u8; 1];
        while !raw.ends_with(b"\r\n\r\n") {
            assert_eq!(stream.read(&mut byte).unwrap(), 1, "connection closed early");
            raw.push(byte[0]);
        }
        let head = String::from_utf8(raw).unwrap();
        let length: usize = head
            .lines()
            .find_map(|l| l.strip_prefix("Content-Length: "))
            .unwrap()
            .parse()
            .unwrap();

        let mut body = vec![0; length];
        stream.read_exact(&mut body).unwrap();
        (head, String::from_utf8(body).unwrap())
    }

    fn wait_until<F: Fn() -> bool>(cond: F) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            thread::sleep(Duration::from_millis(10));
        }
        panic!("condition not reached");
    }

    #[test]
    fn test_start_and_stop() {
        let server = start_http();
        assert_ne!(server.local_addr().port(), 0);
        assert_eq!(server.active_connection_count(), 0);
        server.stop();
        server.join().unwrap();
    }

    #[test]
    fn test_stop_right_after_start() {
        let event_loop = EventLoop::new(test_config(), HttpProtocolHandler::new()).unwrap();
        let shutdown = event_loop.shutdown_handle();
        let server = event_loop.start().unwrap();
        shutdown.shutdown();
        server.join().unwrap();
    }

    #[test]
    fn test_stop_before_run_is_not_lost() {
        let mut event_loop = EventLoop::new(test_config(), HttpProtocolHandler::new()).unwrap();
        event_loop.shutdown_handle().shutdown();

        let started = Instant::now();
        event_loop.run().unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_request_without_keep_alive_closes() {
        let server = start_http();
        let mut stream = connect(server.local_addr());

        stream
            .write_all(b"GET /time HTTP/1.1\r\nHost: x\r\n\r\n")
            .unwrap();
        let (head, body) = read_response(&mut stream);
        assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(body.contains("Current Server Time"));

        let mut rest = Vec::new();
        stream.read_to_end(&mut rest).unwrap();
        assert!(rest.is_empty());
        wait_until(|| server.active_connection_count() == 0);
        assert_eq!(server.total_connection_count(), 1);
    }

    #[test]
    fn test_keep_alive_reuses_connection() {
        let server = start_http();
        let mut stream = connect(server.local_addr());

        stream
            .write_all(b"GET / HTTP/1.1\r\nConnection: keep-alive\r\n\r\n")
            .unwrap();
        let (_, body) = read_response(&mut stream);
        assert!(body.contains("You are client ID: 1"));

        stream
            .write_all(b"GET /clients HTTP/1.1\r\nConnection: keep-alive\r\n\r\n")
            .unwrap();
        let (_, body) = read_response(&mut stream);
        assert!(body.contains("Active connections: 1"));
        assert_eq!(server.active_connection_count(), 1);

        stream
            .write_all(b"GET /uptime HTTP/1.1\r\nConnection: close\r\n\r\n")
            .unwrap();
        let (head, body) = read_response(&mut stream);
        assert!(head.starts_with("HTTP/1.1 200 OK"));
        assert!(body.contains("Your Connection Uptime"));

        wait_until(|| server.active_connection_count() == 0);
        assert_eq!(server.total_connection_count(), 1);
    }

    #[test]
    fn test_concurrent_connections_do_not_cross_talk() {
        let server = start_http();
        let mut streams: Vec<TcpStream> = (0..3).map(|_| connect(server.local_addr())).collect();
        wait_until(|| server.active_connection_count() == 3);

        let requests: Vec<String> = (0..3)
            .map(|i| format!("GET /peer-{i} HTTP/1.1\r\nHost: x\r\n\r\n"))
            .collect();

        // interleave the halves so every inbound buffer is mid-request at once
        for (stream, request) in streams.iter_mut().zip(&requests) {
            stream.write_all(&request.as_bytes()[..10]).unwrap();
        }
        thread::sleep(Duration::from_millis(30));
        for (stream, request) in streams.iter_mut().zip(&requests).rev() {
            stream.write_all(&request.as_bytes()[10..]).unwrap();
        }

        for (i, stream) in streams.iter_mut().enumerate() {
            let (head, body) = read_response(stream);
            assert!(head.starts_with("HTTP/1.1 404 Not Found"));
            assert!(body.contains(&format!("/peer-{i}")));
            for other in (0..3).filter(|j| *j != i) {
                assert!(!body.contains(&format!("/peer-{other}")));
            }
        }

        wait_until(|| server.active_connection_count() == 0);
        assert_eq!(server.total_connection_count(), 3);
    }

    #[test]
    fn test_malformed_request_gets_400_and_loop_survives() {
        let server = start_http();

        let mut bad = connect(server.local_addr());
        bad.write_all(b"NONSENSE\r\n\r\n").unwrap();
        let (head, _) = read_response(&mut bad);
        assert!(head.starts_with("HTTP/1.1 400 Bad Request"));

        let mut good = connect(server.local_addr());
        good.write_all(b"GET /health HTTP/1.1\r\n\r\n").unwrap();
        let (head, body) = read_response(&mut good);
        assert!(head.starts_with("HTTP/1.1 200 OK"));
        assert!(body.contains("Healthy"));
    }

    #[test]
    fn test_line_protocol_session() {
        let server = EventLoop::new(test_config(), LineProtocolHandler::new())
            .unwrap()
            .start()
            .unwrap();
        let mut stream = connect(server.local_addr());

        let mut greeting = vec![0; net::line::GREETING.len()];
        stream.read_exact(&mut greeting).unwrap();
        assert_eq!(greeting, net::line::GREETING.as_bytes());

        stream.write_all(b"alice\n").unwrap();
        let welcome = "Hello alice! You are now registered. Available commands: time, uptime, clients, help, quit\n";
        let mut reply = vec![0; welcome.len()];
        stream.read_exact(&mut reply).unwrap();
        assert_eq!(reply, welcome.as_bytes());

        stream.write_all(b"ping\n").unwrap();
        let mut reply = vec![0; "Echo: ping\n".len()];
        stream.read_exact(&mut reply).unwrap();
        assert_eq!(reply, b"Echo: ping\n");

        stream.write_all(b"quit\n").unwrap();
        let mut rest = Vec::new();
        stream.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"Goodbye!\n");
    }

    #[test]
    fn test_shared_stats_across_loops() {
        let stats = Arc::new(ConnectionStats::new());
        let a = EventLoop::with_stats(test_config(), HttpProtocolHandler::new(), stats.clone())
            .unwrap()
            .start()
            .unwrap();
        let b = EventLoop::with_stats(test_config(), HttpProtocolHandler::new(), stats.clone())
            .unwrap()
            .start()
            .unwrap();

        let _first = connect(a.local_addr());
        let _second = connect(b.local_addr());
        wait_until(|| stats.active() == 2);
        assert_eq!(stats.total(), 2);
    }
}
