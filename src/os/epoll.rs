// src/os/epoll.rs

//! This module provides a wrapper around `epoll` functionality using raw `libc`
//! FFI calls for registering pipe read ends and pulling readiness events off
//! the kernel queue one at a time.

use super::{Arming, ReadyEvent};
use bitflags::bitflags;
use log::{debug, trace, warn};
use std::io;
use std::os::unix::io::RawFd;

const EPOLL_CREATE_CLOEXEC: libc::c_int = libc::O_CLOEXEC;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum EpollCtlOp {
    Add = libc::EPOLL_CTL_ADD,
    Mod = libc::EPOLL_CTL_MOD,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EpollFlags: u32 {
        const EPOLLIN = libc::EPOLLIN as u32;
        const EPOLLERR = libc::EPOLLERR as u32;
        const EPOLLHUP = libc::EPOLLHUP as u32;
        const EPOLLONESHOT = libc::EPOLLONESHOT as u32;
    }
}

impl From<Arming> for EpollFlags {
    fn from(arming: Arming) -> Self {
        match arming {
            Arming::Level => EpollFlags::EPOLLIN,
            Arming::OneShot => EpollFlags::EPOLLIN | EpollFlags::EPOLLONESHOT,
        }
    }
}

fn new_libc_epoll_event(flags: EpollFlags, fd: RawFd) -> libc::epoll_event {
    libc::epoll_event {
        events: flags.bits(),
        u64: fd as u64,
    }
}

#[derive(Debug)]
pub struct EventQueue {
    epoll_fd: RawFd,
}

impl EventQueue {
    pub const NAME: &'static str = "epoll";

    pub fn new() -> io::Result<Self> {
        let epoll_fd = unsafe { libc::epoll_create1(EPOLL_CREATE_CLOEXEC) };
        if epoll_fd == -1 {
            return Err(io::Error::last_os_error());
        }
        debug!("EventQueue created with epoll_fd: {}", epoll_fd);
        Ok(Self { epoll_fd })
    }

    fn ctl(&self, op: EpollCtlOp, fd: RawFd, flags: EpollFlags) -> io::Result<()> {
        let mut event = new_libc_epoll_event(flags, fd);
        if unsafe { libc::epoll_ctl(self.epoll_fd, op as libc::c_int, fd, &mut event) } == -1 {
            return Err(io::Error::last_os_error());
        }
        trace!(
            "epoll_ctl {:?} fd {} on epoll_fd {} with flags {:?}",
            op,
            fd,
            self.epoll_fd,
            flags
        );
        Ok(())
    }

    pub fn add(&self, fd: RawFd, arming: Arming) -> io::Result<()> {
        self.ctl(EpollCtlOp::Add, fd, arming.into())
    }

    /// Re-enables a one-shot registration that has already fired.
    pub fn rearm(&self, fd: RawFd, arming: Arming) -> io::Result<()> {
        self.ctl(EpollCtlOp::Mod, fd, arming.into())
    }

    /// Blocks until one descriptor is ready. `Ok(None)` means the wait was
    /// interrupted by a signal and should be retried.
    pub fn next_ready(&mut self) -> io::Result<Option<ReadyEvent>> {
        let mut event: libc::epoll_event = unsafe { std::mem::zeroed() };
        let num_events = unsafe { libc::epoll_wait(self.epoll_fd, &mut event, 1, -1) };

        if num_events == -1 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                trace!("EventQueue: epoll_wait interrupted (EINTR)");
                return Ok(None);
            }
            return Err(err);
        }
        if num_events == 0 {
            // Infinite timeout, so zero events is a kernel contract violation.
            return Err(io::Error::other("epoll_wait returned no events"));
        }

        let flags = EpollFlags::from_bits_truncate(event.events);
        let fd = event.u64 as RawFd;
        trace!("EventQueue: fd {} ready with {:?}", fd, flags);
        Ok(Some(ReadyEvent { fd, pending: None }))
    }
}

impl Drop for EventQueue {
    fn drop(&mut self) {
        if unsafe { libc::close(self.epoll_fd) } == -1 {
            warn!(
                "Failed to close epoll_fd {} in EventQueue::drop: {}",
                self.epoll_fd,
                io::Error::last_os_error()
            );
        } else {
            debug!("Closed epoll_fd {} in EventQueue::drop", self.epoll_fd);
        }
    }
}
