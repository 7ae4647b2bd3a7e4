//! Per-connection state owned by the registry.
//!
//! A [`Connection`] is a plain data holder: identity, timestamps, the inbound
//! accumulation buffer, the pending outbound buffer and whatever state the protocol
//! handler keeps between "request complete" and "response sent". It has no I/O
//! behavior of its own except [`OutboundBuffer::write_to`], which advances a write
//! cursor so that partial writes resume exactly where they stopped.

use std::{
    fmt,
    io::{self, Write},
    net::SocketAddr,
    time::{Duration, Instant},
};

/// Unique identifier for connections.
///
/// Assigned at accept time from a monotonically increasing counter and never reused.
/// Used to correlate log lines and to address the peer in protocol responses.
/// Outside this crate ids are obtained from [`ConnectionStats::next_id`](crate::ConnectionStats::next_id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub(crate) fn new(id: u64) -> Self {
        ConnectionId(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which readiness the loop currently asks the OS about for this connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Read,
    Write,
    Closed,
}

/// Bytes waiting to be written, with a cursor past the bytes already accepted by the
/// socket.
#[derive(Debug)]
pub struct OutboundBuffer {
    bytes: Vec<u8>,
    written: usize,
}

impl OutboundBuffer {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes, written: 0 }
    }

    pub fn remaining(&self) -> &[u8] {
        &self.bytes[self.written..]
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn is_drained(&self) -> bool {
        self.written >= self.bytes.len()
    }

    /// Writes from the cursor until the buffer drains or the writer would block.
    ///
    /// Returns the number of bytes accepted during this call. `WouldBlock` ends the call
    /// successfully; the caller waits for the next write-readiness event. A writer that
    /// accepts zero bytes for a non-empty slice is reported as `WriteZero`.
    pub fn write_to<W: Write + ?Sized>(&mut self, writer: &mut W) -> io::Result<usize> {
        let mut total = 0;
        while !self.is_drained() {
            match writer.write(self.remaining()) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "peer accepted zero bytes",
                    ))
                }
                Ok(n) => {
                    self.written += n;
                    total += n;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(total)
    }
}

pub struct Connection<S> {
    id: ConnectionId,
    remote_addr: SocketAddr,
    connected_at: Instant,
    last_activity: Instant,
    pub inbound: Vec<u8>,
    pub outbound: Option<OutboundBuffer>,
    pub protocol_state: Option<S>,
    state: ConnState,
}

impl<S> fmt::Debug for Connection<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("remote_addr", &self.remote_addr)
            .field("inbound_len", &self.inbound.len())
            .field("outbound", &self.outbound.as_ref().map(|o| o.remaining().len()))
            .field("has_protocol_state", &self.protocol_state.is_some())
            .field("state", &self.state)
            .finish()
    }
}

impl<S> Connection<S> {
    pub fn new(id: ConnectionId, remote_addr: SocketAddr) -> Self {
        let now = Instant::now();
        Self {
            id,
            remote_addr,
            connected_at: now,
            last_activity: now,
            inbound: Vec::new(),
            outbound: None,
            protocol_state: None,
            state: ConnState::Read,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn connected_at(&self) -> Instant {
        self.connected_at
    }

    pub fn uptime(&self) -> Duration {
        self.connected_at.elapsed()
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    /// Installs a response and moves the connection to [`ConnState::Write`].
    pub(crate) fn begin_response(&mut self, bytes: Vec<u8>) {
        self.outbound = Some(OutboundBuffer::new(bytes));
        self.state = ConnState::Write;
    }

    /// Drops the drained outbound buffer, the consumed request and the protocol state,
    /// and moves back to [`ConnState::Read`].
    pub(crate) fn reset_for_next_request(&mut self) {
        self.outbound = None;
        self.inbound.clear();
        self.protocol_state = None;
        self.state = ConnState::Read;
    }

    pub(crate) fn mark_closed(&mut self) {
        self.outbound = None;
        self.state = ConnState::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Accepts at most `limit` bytes per call and refuses everything after `budget`.
    struct ThrottledWriter {
        data: Vec<u8>,
        limit: usize,
        budget: usize,
    }

    impl Write for ThrottledWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::ErrorKind::WouldBlock.into());
            }
            let n = buf.len().min(self.limit).min(self.budget);
            self.data.extend_from_slice(&buf[..n]);
            self.budget -= n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn addr() -> SocketAddr {
        "127.0.0.1:4000".parse().unwrap()
    }

    #[test]
    fn test_partial_write_resumes_from_cursor() {
        let payload: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let mut outbound = OutboundBuffer::new(payload.clone());
        let mut writer = ThrottledWriter {
            data: Vec::new(),
            limit: 64,
            budget: 300,
        };

        let first = outbound.write_to(&mut writer).unwrap();
        assert_eq!(first, 300);
        assert_eq!(outbound.written(), 300);
        assert!(!outbound.is_drained());

        writer.budget = 1000;
        let second = outbound.write_to(&mut writer).unwrap();
        assert_eq!(second, 700);
        assert!(outbound.is_drained());
        assert_eq!(writer.data, payload);
    }

    #[test]
    fn test_write_would_block_immediately() {
        let mut outbound = OutboundBuffer::new(b"hello".to_vec());
        let mut writer = ThrottledWriter {
            data: Vec::new(),
            limit: 16,
            budget: 0,
        };
        assert_eq!(outbound.write_to(&mut writer).unwrap(), 0);
        assert_eq!(outbound.remaining(), b"hello");
    }

    #[test]
    fn test_write_zero_is_an_error() {
        struct Closed;
        impl Write for Closed {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Ok(0)
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let mut outbound = OutboundBuffer::new(b"x".to_vec());
        let err = outbound.write_to(&mut Closed).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WriteZero);
    }

    #[test]
    fn test_response_lifecycle() {
        let mut conn: Connection<u32> = Connection::new(ConnectionId::new(7), addr());
        assert_eq!(conn.state(), ConnState::Read);
        assert!(conn.outbound.is_none());

        conn.inbound.extend_from_slice(b"GET / HTTP/1.1\r\n\r\n");
        conn.protocol_state = Some(1);
        conn.begin_response(b"reply".to_vec());
        assert_eq!(conn.state(), ConnState::Write);
        assert!(conn.outbound.is_some());

        conn.reset_for_next_request();
        assert_eq!(conn.state(), ConnState::Read);
        assert!(conn.outbound.is_none());
        assert!(conn.inbound.is_empty());
        assert!(conn.protocol_state.is_none());
    }

    #[test]
    fn test_identity_is_immutable() {
        let conn: Connection<()> = Connection::new(ConnectionId::new(3), addr());
        assert_eq!(conn.id().as_u64(), 3);
        assert_eq!(conn.remote_addr().to_string(), "127.0.0.1:4000");
        assert!(conn.uptime() <= conn.connected_at().elapsed());
    }

    #[test]
    fn test_ids_come_from_stats() {
        let stats = crate::ConnectionStats::new();
        let first = stats.next_id();
        let second = stats.next_id();
        assert_eq!(first.as_u64(), 1);
        assert!(second > first);
        assert_eq!(second.to_string(), "2");
    }
}
