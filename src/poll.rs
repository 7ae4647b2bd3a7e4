use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use mio::{event::Source, Events, Interest, Poll, Token};

use crate::error::Result;

/// Token reserved for the poller's waker.
pub const WAKER_TOKEN: Token = Token(usize::MAX);

/// Owns the OS readiness primitive and the waker used to interrupt a blocked poll.
pub struct PollHandle {
    poller: Poll,
    waker: Arc<mio::Waker>,
}

impl PollHandle {
    pub fn new() -> Result<Self> {
        let poller = Poll::new()?;
        let waker = mio::Waker::new(poller.registry(), WAKER_TOKEN)?;
        Ok(PollHandle {
            poller,
            waker: Arc::new(waker),
        })
    }

    pub fn register<S>(&self, src: &mut S, token: Token, interest: Interest) -> Result<()>
    where
        S: Source + ?Sized,
    {
        src.register(self.poller.registry(), token, interest)?;
        Ok(())
    }

    /// Replaces the interest set of an already registered source.
    pub fn reregister<S>(&self, src: &mut S, token: Token, interest: Interest) -> Result<()>
    where
        S: Source + ?Sized,
    {
        src.reregister(self.poller.registry(), token, interest)?;
        Ok(())
    }

    pub fn deregister<S>(&self, src: &mut S) -> Result<()>
    where
        S: Source + ?Sized,
    {
        src.deregister(self.poller.registry())?;
        Ok(())
    }

    /// Waits for readiness, bounded by `timeout`. An interrupted wait is reported as
    /// zero events rather than an error.
    pub fn poll(&mut self, events: &mut Events, timeout: Option<Duration>) -> Result<usize> {
        match self.poller.poll(events, timeout) {
            Ok(()) => Ok(events.iter().count()),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    pub fn wake(&self) -> Result<()> {
        Ok(self.waker.wake()?)
    }

    pub fn shutdown_handle(&self, running: Arc<AtomicBool>) -> ShutdownHandle {
        ShutdownHandle {
            running,
            waker: self.waker.clone(),
        }
    }
}

/// Cloneable, thread-safe handle that asks a running loop to stop.
///
/// The request is advisory: the loop finishes the events of its current iteration and
/// exits at the top of the next one.
#[derive(Clone)]
pub struct ShutdownHandle {
    running: Arc<AtomicBool>,
    waker: Arc<mio::Waker>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Err(e) = self.waker.wake() {
            tracing::warn!(error = %e, "failed to wake poller for shutdown");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
