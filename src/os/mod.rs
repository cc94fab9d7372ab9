// src/os/mod.rs
//
// Kernel event queues: epoll on Linux, kqueue on the BSDs and macOS, event
// ports on illumos/Solaris. Each exposes the same `EventQueue` surface.

use std::os::unix::io::RawFd;

#[cfg(target_os = "linux")]
pub mod epoll;

#[cfg(any(
    target_os = "macos",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "dragonfly"
))]
pub mod kqueue;

#[cfg(any(target_os = "illumos", target_os = "solaris"))]
pub mod port;

/// How a descriptor stays registered after it has been reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arming {
    /// Reported on every wait while readable.
    Level,
    /// Reported once, then dormant until re-armed.
    OneShot,
}

/// A single readiness notification pulled off a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadyEvent {
    pub fd: RawFd,
    /// Bytes pending on the descriptor, when the queue reports it.
    pub pending: Option<i64>,
}

// Platform-agnostic re-exports
#[cfg(target_os = "linux")]
pub mod event {
    pub use super::epoll::EventQueue;
}

#[cfg(any(
    target_os = "macos",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "dragonfly"
))]
pub mod event {
    pub use super::kqueue::EventQueue;
}

#[cfg(any(target_os = "illumos", target_os = "solaris"))]
pub mod event {
    pub use super::port::EventQueue;
}
