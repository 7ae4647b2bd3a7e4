//! The readiness-driven scheduler.
//!
//! A [`Reactor`] owns the poller, the listening socket, the connection registry and
//! the protocol handler. Everything runs on the thread that calls [`Reactor::run`]:
//!
//! ```text
//! listener readable ──> accept ──> register (READ)
//! conn readable     ──> read until WouldBlock ──> inbound ──> on_data
//!                         NeedMoreData ──> stay READ
//!                         ResponseReady ──> outbound, reregister WRITE
//! conn writable     ──> write until drained or WouldBlock
//!                         partial ──> stay WRITE
//!                         drained ──> on_response_sent
//!                                       KeepAlive ──> reset, reregister READ
//!                                       Close     ──> unregister + close
//! every tick        ──> maintenance (stale sweep, idle sweep, status)
//! ```
//!
//! Any failure while serving one connection is resolved by closing that connection;
//! only a failing poll ends [`Reactor::run`] with an error.

use std::{
    io::{self, Read},
    net::{Shutdown, SocketAddr},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Instant,
};

use mio::{
    net::{TcpListener, TcpStream},
    Events, Interest, Token,
};
use tracing::{debug, error, info, trace, warn};

use crate::{
    config::ServerConfig,
    connection::{ConnState, Connection},
    error::{NetworkError, Result},
    event::Readiness,
    handler::{Continuation, Outcome, ProtocolHandler, ServerContext},
    poll::{PollHandle, ShutdownHandle, WAKER_TOKEN},
    registry::{ConnectionRegistry, ConnectionStats, Entry},
};

/// Token of the listening socket. Connection tokens are their ids, which start at 1.
pub const LISTENER_TOKEN: Token = Token(usize::MAX - 1);

/// Why a connection is being torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseReason {
    PeerClosed,
    ReadError,
    WriteError,
    Completed,
    Stale,
    Idle,
    Shutdown,
}

pub struct Reactor<P: ProtocolHandler> {
    poll_handle: PollHandle,
    events: Events,
    listener: TcpListener,
    local_addr: SocketAddr,
    registry: ConnectionRegistry<TcpStream, P::State>,
    handler: P,
    context: ServerContext,
    config: ServerConfig,
    read_buf: Vec<u8>,
    running: Arc<AtomicBool>,
    last_maintenance: Instant,
}

impl<P: ProtocolHandler> Reactor<P> {
    /// Binds the listener and registers it for accept readiness.
    pub fn new(config: ServerConfig, handler: P) -> Result<Self> {
        Self::with_stats(config, handler, Arc::new(ConnectionStats::new()))
    }

    /// Like [`new`](Self::new), counting connections in a caller-provided `stats`,
    /// which may be shared between several loops.
    pub fn with_stats(config: ServerConfig, handler: P, stats: Arc<ConnectionStats>) -> Result<Self> {
        config.validate()?;

        let poll_handle = PollHandle::new()?;
        let mut listener = TcpListener::bind(config.address)?;
        let local_addr = listener.local_addr()?;
        poll_handle.register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;

        Ok(Self {
            poll_handle,
            events: Events::with_capacity(config.events_capacity),
            listener,
            local_addr,
            registry: ConnectionRegistry::new(stats.clone()),
            handler,
            context: ServerContext::new(stats),
            read_buf: vec![0; config.read_buffer_size],
            config,
            running: Arc::new(AtomicBool::new(true)),
            last_maintenance: Instant::now(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stats(&self) -> Arc<ConnectionStats> {
        self.registry.stats().clone()
    }

    pub fn active_connection_count(&self) -> usize {
        self.registry.active_count()
    }

    pub fn total_connection_count(&self) -> u64 {
        self.registry.total_created_count()
    }

    /// Handle that stops this reactor from any thread.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.poll_handle.shutdown_handle(self.running.clone())
    }

    /// Runs the loop on the current thread until a shutdown is requested.
    ///
    /// The running flag is set at construction and only ever cleared, so a shutdown
    /// requested before this call makes it return after draining the registry.
    pub fn run(&mut self) -> Result<()> {
        info!(addr = %self.local_addr, "event loop running");

        let result = self.run_inner();

        for (token, entry) in self.registry.drain() {
            self.close_entry(token, entry, CloseReason::Shutdown);
        }
        info!(addr = %self.local_addr, "event loop stopped");
        result
    }

    fn run_inner(&mut self) -> Result<()> {
        while self.running.load(Ordering::SeqCst) {
            self.poll_once()?;
        }
        Ok(())
    }

    /// One iteration: wait for readiness, dispatch every reported token, then run
    /// maintenance if its interval elapsed.
    fn poll_once(&mut self) -> Result<()> {
        self.poll_handle
            .poll(&mut self.events, Some(self.config.poll_timeout))?;

        let ready: Vec<Readiness> = self.events.iter().map(Readiness::from).collect();
        for readiness in ready {
            self.dispatch(readiness);
        }

        if self.last_maintenance.elapsed() >= self.config.maintenance_interval {
            self.maintenance();
            self.last_maintenance = Instant::now();
        }
        Ok(())
    }

    fn dispatch(&mut self, readiness: Readiness) {
        match readiness.token() {
            WAKER_TOKEN => trace!("poller woken"),
            LISTENER_TOKEN => self.accept_pending(),
            token => self.handle_connection_event(token, readiness),
        }
    }

    fn accept_pending(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer_addr)) => self.accept_one(stream, peer_addr),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(error = %NetworkError::Accept(e), "accept failed");
                    break;
                }
            }
        }
    }

    fn accept_one(&mut self, mut stream: TcpStream, peer_addr: SocketAddr) {
        if let Some(max) = self.config.max_connections {
            if self.registry.active_count() >= max {
                warn!(error = %NetworkError::MaxConnectionsReached(peer_addr), "connection rejected");
                return;
            }
        }

        if let Err(e) = stream.set_nodelay(self.config.no_delay) {
            warn!(peer = %peer_addr, error = %e, "failed to set TCP_NODELAY");
        }

        let conn_id = self.registry.stats().next_id();
        let token = Token(conn_id.as_u64() as usize);

        if self.registry.contains(token) {
            error!(
                error = %NetworkError::DuplicateRegistration(token),
                conn_id = %conn_id,
                "discarding connection"
            );
            return;
        }

        if let Err(e) = self
            .poll_handle
            .register(&mut stream, token, Interest::READABLE)
        {
            warn!(conn_id = %conn_id, peer = %peer_addr, error = %e, "failed to register connection");
            return;
        }

        let connection = Connection::new(conn_id, peer_addr);
        if let Err(e) = self.registry.register(token, stream, connection) {
            error!(conn_id = %conn_id, error = %e, "discarding connection");
            return;
        }

        debug!(
            conn_id = %conn_id,
            peer = %peer_addr,
            active = self.registry.active_count(),
            "new connection"
        );

        let Some(entry) = self.registry.get_mut(token) else {
            return;
        };
        if let Some(greeting) = self.handler.on_connect(&self.context, &mut entry.connection) {
            entry.connection.begin_response(greeting);
            if let Err(e) = self
                .poll_handle
                .reregister(&mut entry.socket, token, Interest::WRITABLE)
            {
                warn!(conn_id = %conn_id, error = %e, "failed to switch to write interest");
                self.close(token, CloseReason::WriteError);
            }
        }
    }

    fn handle_connection_event(&mut self, token: Token, readiness: Readiness) {
        let state = match self.registry.get_mut(token) {
            Some(entry) => entry.connection.state(),
            // closed earlier in this tick
            None => return,
        };

        match state {
            ConnState::Read if readiness.is_readable() || readiness.is_read_closed() => {
                self.handle_read(token)
            }
            ConnState::Write if readiness.is_writable() => self.handle_write(token),
            ConnState::Write if readiness.is_error() => self.close(token, CloseReason::WriteError),
            _ => trace!(?token, ?readiness, "ignoring readiness for current interest"),
        }
    }

    fn handle_read(&mut self, token: Token) {
        let Some(entry) = self.registry.get_mut(token) else {
            return;
        };

        let mut outcome = Outcome::NeedMoreData;
        let mut close = None;
        let mut bytes_read = 0;

        loop {
            match entry.socket.read(&mut self.read_buf) {
                Ok(0) => {
                    close = Some(CloseReason::PeerClosed);
                    break;
                }
                Ok(n) => {
                    bytes_read += n;
                    let chunk = &self.read_buf[..n];
                    entry.connection.inbound.extend_from_slice(chunk);
                    entry.connection.touch();

                    outcome = self
                        .handler
                        .on_data(&self.context, &mut entry.connection, chunk);
                    if matches!(outcome, Outcome::ResponseReady(_)) {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!(conn_id = %entry.connection.id(), error = %e, "read failed");
                    close = Some(CloseReason::ReadError);
                    break;
                }
            }
        }

        trace!(conn_id = %entry.connection.id(), bytes = bytes_read, "read");

        if let Outcome::ResponseReady(bytes) = outcome {
            entry.connection.begin_response(bytes);
            if let Err(e) = self
                .poll_handle
                .reregister(&mut entry.socket, token, Interest::WRITABLE)
            {
                warn!(conn_id = %entry.connection.id(), error = %e, "failed to switch to write interest");
                self.close(token, CloseReason::WriteError);
            }
            return;
        }

        if let Some(reason) = close {
            self.close(token, reason);
        }
    }

    fn handle_write(&mut self, token: Token) {
        let Some(entry) = self.registry.get_mut(token) else {
            return;
        };
        let conn_id = entry.connection.id();

        let Some(outbound) = entry.connection.outbound.as_mut() else {
            warn!(conn_id = %conn_id, "write interest without pending response");
            self.close(token, CloseReason::WriteError);
            return;
        };

        let written = match outbound.write_to(&mut entry.socket) {
            Ok(n) => n,
            Err(e) => {
                debug!(conn_id = %conn_id, error = %e, "write failed");
                self.close(token, CloseReason::WriteError);
                return;
            }
        };
        let drained = outbound.is_drained();

        trace!(conn_id = %conn_id, bytes = written, "wrote");
        if written > 0 {
            entry.connection.touch();
        }
        if !drained {
            return;
        }

        match self
            .handler
            .on_response_sent(&self.context, &mut entry.connection)
        {
            Continuation::KeepAlive => {
                entry.connection.reset_for_next_request();
                if let Err(e) = self
                    .poll_handle
                    .reregister(&mut entry.socket, token, Interest::READABLE)
                {
                    warn!(conn_id = %conn_id, error = %e, "failed to switch to read interest");
                    self.close(token, CloseReason::ReadError);
                }
            }
            Continuation::Close => self.close(token, CloseReason::Completed),
        }
    }

    /// Unregisters and closes `token`. Closing an absent token is a no-op.
    fn close(&mut self, token: Token, reason: CloseReason) {
        if let Some(entry) = self.registry.unregister(token) {
            self.close_entry(token, entry, reason);
        }
    }

    fn close_entry(&self, token: Token, mut entry: Entry<TcpStream, P::State>, reason: CloseReason) {
        if let Err(e) = self.poll_handle.deregister(&mut entry.socket) {
            trace!(?token, error = %e, "deregister failed");
        }
        if reason == CloseReason::Completed {
            let _ = entry.socket.shutdown(Shutdown::Write);
        }
        entry.connection.mark_closed();
        self.handler.on_disconnect(&self.context, &entry.connection);

        debug!(
            conn_id = %entry.connection.id(),
            peer = %entry.connection.remote_addr(),
            ?reason,
            active = self.registry.active_count(),
            "connection closed"
        );
    }

    /// Housekeeping: drops entries whose socket is no longer usable or has been idle
    /// past the configured timeout, then reports the active count.
    fn maintenance(&mut self) {
        let idle_timeout = self.config.idle_timeout;

        let stale = self.registry.sweep(|entry| socket_is_stale(&entry.socket));
        for (token, entry) in stale {
            self.close_entry(token, entry, CloseReason::Stale);
        }

        if let Some(timeout) = idle_timeout {
            let idle = self
                .registry
                .sweep(|entry| entry.connection.idle_for() >= timeout);
            for (token, entry) in idle {
                self.close_entry(token, entry, CloseReason::Idle);
            }
        }

        let active = self.registry.active_count();
        if active > 0 {
            info!(
                active,
                total = self.registry.total_created_count(),
                "status"
            );
        }
    }
}

/// A socket is stale once it carries a pending error or is no longer connected.
fn socket_is_stale(socket: &TcpStream) -> bool {
    match socket.take_error() {
        Ok(Some(_)) | Err(_) => return true,
        Ok(None) => {}
    }
    socket.peer_addr().is_err()
}
