// src/backend/mod.rs

//! Readiness notification backends.
//!
//! Every backend registers the harness's read ends once in [`prepare`] and
//! then services one round per [`wait_for_ready`] call: block until a
//! registered descriptor is readable, drain the single token from every
//! descriptor that reported ready, and compare it against the index the
//! harness requested. The four variants differ only in how the kernel is
//! asked and in what has to be redone between rounds:
//!
//! | kind                 | call             | per-round work                      |
//! |----------------------|------------------|-------------------------------------|
//! | `ReadinessBitmask`   | select(2)        | rebuild the bitmask, scan N bits    |
//! | `DescriptorPoll`     | poll(2)          | scan N `revents`                    |
//! | `EdgeQueue`          | epoll / kqueue   | none (level-triggered)              |
//! | `PlatformEventQueue` | port / one-shot  | re-associate the delivered source   |
//!
//! The read ends are borrowed by raw descriptor; the caller keeps them open
//! for as long as the backend is in use.
//!
//! [`prepare`]: ReadinessBackend::prepare
//! [`wait_for_ready`]: ReadinessBackend::wait_for_ready

pub mod bitmask;
pub mod descriptor_poll;
pub mod queue;

use crate::channel::{read_token, TokenRead, TOKEN_LEN};
use crate::error::{BenchError, Result};
use log::warn;
use std::fmt;
use std::os::unix::io::{BorrowedFd, RawFd};
use std::str::FromStr;

pub use bitmask::ReadinessBitmask;
pub use descriptor_poll::DescriptorPoll;
pub use queue::QueueBackend;

/// The closed set of notification mechanisms under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    ReadinessBitmask,
    DescriptorPoll,
    EdgeQueue,
    PlatformEventQueue,
}

impl BackendKind {
    pub const ALL: [BackendKind; 4] = [
        BackendKind::ReadinessBitmask,
        BackendKind::DescriptorPoll,
        BackendKind::EdgeQueue,
        BackendKind::PlatformEventQueue,
    ];

    /// The command-line identifier, also used to tag reports.
    pub fn name(self) -> &'static str {
        match self {
            BackendKind::ReadinessBitmask => "select",
            BackendKind::DescriptorPoll => "poll",
            BackendKind::EdgeQueue => queue::EDGE_QUEUE_NAME,
            BackendKind::PlatformEventQueue => "port",
        }
    }

    pub fn is_available(self) -> bool {
        match self {
            BackendKind::EdgeQueue => queue::EDGE_QUEUE_AVAILABLE,
            _ => true,
        }
    }

    /// Kinds usable on the running platform.
    pub fn available() -> impl Iterator<Item = BackendKind> {
        Self::ALL.into_iter().filter(|k| k.is_available())
    }

    pub fn create(self) -> Result<Box<dyn ReadinessBackend>> {
        if !self.is_available() {
            return Err(BenchError::Unsupported(self.name().to_string()));
        }
        Ok(match self {
            BackendKind::ReadinessBitmask => Box::new(ReadinessBitmask::new()),
            BackendKind::DescriptorPoll => Box::new(DescriptorPoll::new()),
            BackendKind::EdgeQueue => Box::new(QueueBackend::edge()),
            BackendKind::PlatformEventQueue => Box::new(QueueBackend::platform()),
        })
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackendKind {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "select" => Ok(BackendKind::ReadinessBitmask),
            "poll" => Ok(BackendKind::DescriptorPoll),
            "port" => Ok(BackendKind::PlatformEventQueue),
            "epoll" | "kqueue" if queue::EDGE_QUEUE_AVAILABLE && s == queue::EDGE_QUEUE_NAME => {
                Ok(BackendKind::EdgeQueue)
            }
            "epoll" | "kqueue" => Err(BenchError::Unsupported(s.to_string())),
            other => Err(BenchError::UnknownBackend(other.to_string())),
        }
    }
}

/// What one notification cycle observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WaitOutcome {
    /// Descriptors reported ready. Anything but 1 is a backend anomaly.
    pub ready: usize,
    /// Drained tokens that were missing or differed from the expected index.
    pub mismatches: usize,
}

impl WaitOutcome {
    pub(crate) fn record(&mut self, matched: bool) {
        self.ready += 1;
        if !matched {
            self.mismatches += 1;
        }
    }

    pub(crate) fn log_anomalies(&self) {
        if self.ready != 1 {
            warn!("{} fds ready!", self.ready);
        }
    }
}

/// The capability every notification mechanism provides to the harness.
pub trait ReadinessBackend {
    fn kind(&self) -> BackendKind;

    fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// Registers every read end for readable notification. Never blocks.
    fn prepare(&mut self, read_ends: &[RawFd]) -> Result<()>;

    /// Blocks until a registered descriptor is readable, then drains and
    /// verifies the token on each ready descriptor.
    fn wait_for_ready(&mut self, expected: u32) -> Result<WaitOutcome>;
}

/// Reads the single token waiting on `fd` and checks it against `expected`.
/// Returns whether it matched; a mismatch logs exactly one warning.
pub(crate) fn drain(fd: RawFd, expected: u32) -> bool {
    // SAFETY: registered descriptors stay open for the backend's lifetime.
    let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
    match mismatch(fd, expected, read_token(borrowed)) {
        None => true,
        Some(message) => {
            warn!("{}", message);
            false
        }
    }
}

/// The diagnostic for a drain that did not yield `expected`, if any.
fn mismatch(fd: RawFd, expected: u32, read: std::io::Result<TokenRead>) -> Option<String> {
    match read {
        Ok(TokenRead::Value(value)) if value == expected => None,
        Ok(TokenRead::Value(value)) => Some(format!(
            "Unexpected data {} at fd {} (expected {})",
            value, fd, expected
        )),
        Ok(TokenRead::Eof) => Some(format!("Reached EOF at fd {} (expected {})", fd, expected)),
        Ok(TokenRead::Short(n)) => Some(format!(
            "Could not drain pipe [{}]: read {}, expected {}",
            fd, n, TOKEN_LEN
        )),
        Err(e) => Some(format!("Could not drain pipe [{}]: {}", fd, e)),
    }
}

#[cfg(test)]
mod tests;
