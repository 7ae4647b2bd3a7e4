//! Protocol implementations for the mill-mux event loop.
//!
//! Each protocol is a [`ProtocolHandler`](crate::handler::ProtocolHandler): pure
//! framing and response logic with no I/O of its own. The event loop owns the sockets
//! and calls the handler at well-defined points.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ProtocolHandler                        │
//! │  ┌──────────────────────┐      ┌─────────────────────────┐  │
//! │  │ HttpProtocolHandler  │      │  LineProtocolHandler    │  │
//! │  └──────────────────────┘      └─────────────────────────┘  │
//! └────────────▲──────────────────────┬─────────────────────────┘
//!              │ on_data /            │ Outcome /
//!              │ on_response_sent     │ Continuation
//! ┌────────────┴──────────────────────▼─────────────────────────┐
//! │                  Reactor (single thread)                    │
//! │  ┌──────────┐       ┌──────────────┐                        │
//! │  │ Poll     │─────▶│ Registry     │                        │
//! │  └──────────┘       └──────────────┘                        │
//! └────────────┬────────────────────────────────────────────────┘
//!              │ OS readiness
//!              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │              Operating System (epoll/kqueue/IOCP)           │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod http;
pub mod line;
