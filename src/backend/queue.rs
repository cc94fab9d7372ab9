// src/backend/queue.rs

//! Kernel-resident event queues.
//!
//! `EdgeQueue` registers every read end once, level-triggered, and never
//! touches the registrations again. `PlatformEventQueue` registers one-shot
//! sources: the queue drops a source once it has delivered an event, so the
//! source is re-associated with its original read interest right after the
//! drain. Native event ports behave this way by construction; on epoll and
//! kqueue the same contract is obtained with `EPOLLONESHOT` / `EV_ONESHOT`.

use super::{drain, BackendKind, ReadinessBackend, WaitOutcome};
use crate::error::{BenchError, Result};
use crate::os::event::EventQueue;
use crate::os::{Arming, ReadyEvent};
use log::{debug, error};
use std::io;
use std::os::unix::io::RawFd;

/// Event ports have no level-triggered mode, so there is no edge queue there.
#[cfg(any(target_os = "illumos", target_os = "solaris"))]
pub(crate) const EDGE_QUEUE_AVAILABLE: bool = false;
#[cfg(not(any(target_os = "illumos", target_os = "solaris")))]
pub(crate) const EDGE_QUEUE_AVAILABLE: bool = true;

#[cfg(any(target_os = "illumos", target_os = "solaris"))]
pub(crate) const EDGE_QUEUE_NAME: &str = "epoll";
#[cfg(not(any(target_os = "illumos", target_os = "solaris")))]
pub(crate) const EDGE_QUEUE_NAME: &str = EventQueue::NAME;

#[derive(Debug)]
pub struct QueueBackend {
    kind: BackendKind,
    arming: Arming,
    queue: Option<EventQueue>,
}

impl QueueBackend {
    pub fn edge() -> Self {
        Self {
            kind: BackendKind::EdgeQueue,
            arming: Arming::Level,
            queue: None,
        }
    }

    pub fn platform() -> Self {
        Self {
            kind: BackendKind::PlatformEventQueue,
            arming: Arming::OneShot,
            queue: None,
        }
    }

    fn queue(&mut self) -> Result<&mut EventQueue> {
        let name = self.kind.name();
        self.queue.as_mut().ok_or_else(|| {
            BenchError::wait(
                name,
                io::Error::new(io::ErrorKind::NotConnected, "backend was never prepared"),
            )
        })
    }

    /// Re-associates a delivered one-shot source. A no-op for level-triggered
    /// registrations.
    pub fn rearm(&mut self, fd: RawFd) -> Result<()> {
        if self.arming == Arming::Level {
            return Ok(());
        }
        let (name, arming) = (self.kind.name(), self.arming);
        self.queue()?.rearm(fd, arming).map_err(|e| {
            error!("Failed to re-associate fd {}: {}", fd, e);
            BenchError::wait(name, e)
        })
    }

    fn next_event(&mut self) -> Result<ReadyEvent> {
        let name = self.kind.name();
        let queue = self.queue()?;
        loop {
            match queue.next_ready() {
                Ok(Some(event)) => return Ok(event),
                Ok(None) => continue,
                Err(e) => return Err(BenchError::wait(name, e)),
            }
        }
    }
}

impl ReadinessBackend for QueueBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn prepare(&mut self, read_ends: &[RawFd]) -> Result<()> {
        let queue = EventQueue::new().map_err(|e| BenchError::setup("event queue create", e))?;
        for &fd in read_ends {
            queue
                .add(fd, self.arming)
                .map_err(|e| BenchError::setup("event queue register", e))?;
        }
        debug!(
            "{}: registered {} fds ({:?})",
            self.kind.name(),
            read_ends.len(),
            self.arming
        );
        self.queue = Some(queue);
        Ok(())
    }

    fn wait_for_ready(&mut self, expected: u32) -> Result<WaitOutcome> {
        let event = self.next_event()?;
        match event.pending {
            Some(bytes) => debug!("fd {} is ready for reading ({} bytes)", event.fd, bytes),
            None => debug!("fd {} is ready for reading", event.fd),
        }

        let mut outcome = WaitOutcome::default();
        outcome.record(drain(event.fd, expected));
        self.rearm(event.fd)?;
        outcome.log_anomalies();
        Ok(outcome)
    }
}
