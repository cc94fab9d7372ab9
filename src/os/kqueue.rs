// src/os/kqueue.rs

//! This module provides a wrapper around `kqueue` for macOS and the BSDs,
//! offering the same surface as the epoll module on Linux.

use super::{Arming, ReadyEvent};
use log::{debug, trace};
use std::io;
use std::os::unix::io::RawFd;

fn read_filter(fd: RawFd, arming: Arming) -> libc::kevent {
    let mut kev: libc::kevent = unsafe { std::mem::zeroed() };
    kev.ident = fd as usize;
    kev.filter = libc::EVFILT_READ;
    kev.flags = match arming {
        Arming::Level => libc::EV_ADD | libc::EV_ENABLE,
        Arming::OneShot => libc::EV_ADD | libc::EV_ENABLE | libc::EV_ONESHOT,
    };
    kev
}

/// EventQueue for macOS and the BSDs using kqueue
#[derive(Debug)]
pub struct EventQueue {
    kqueue_fd: RawFd,
}

impl EventQueue {
    pub const NAME: &'static str = "kqueue";

    pub fn new() -> io::Result<Self> {
        let kqueue_fd = unsafe { libc::kqueue() };
        if kqueue_fd == -1 {
            return Err(io::Error::last_os_error());
        }
        debug!("EventQueue created with kqueue_fd: {}", kqueue_fd);
        Ok(Self { kqueue_fd })
    }

    fn submit(&self, changes: &[libc::kevent]) -> io::Result<()> {
        let ret = unsafe {
            libc::kevent(
                self.kqueue_fd,
                changes.as_ptr(),
                changes.len() as i32,
                std::ptr::null_mut(),
                0,
                std::ptr::null(),
            )
        };
        if ret == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    pub fn add(&self, fd: RawFd, arming: Arming) -> io::Result<()> {
        self.submit(&[read_filter(fd, arming)])?;
        trace!(
            "Added fd {} to kqueue_fd {} ({:?})",
            fd,
            self.kqueue_fd,
            arming
        );
        Ok(())
    }

    /// EV_ONESHOT filters are deleted once they fire; adding again restores them.
    pub fn rearm(&self, fd: RawFd, arming: Arming) -> io::Result<()> {
        self.add(fd, arming)
    }

    /// Blocks until one descriptor is ready. `Ok(None)` means the wait was
    /// interrupted by a signal and should be retried.
    pub fn next_ready(&mut self) -> io::Result<Option<ReadyEvent>> {
        let mut kev: libc::kevent = unsafe { std::mem::zeroed() };
        let nev = unsafe {
            libc::kevent(
                self.kqueue_fd,
                std::ptr::null(),
                0,
                &mut kev,
                1,
                std::ptr::null(),
            )
        };

        if nev == -1 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                trace!("EventQueue: kevent interrupted (EINTR)");
                return Ok(None);
            }
            return Err(err);
        }
        if nev == 0 {
            return Err(io::Error::other("kevent returned no events"));
        }
        if kev.flags & libc::EV_ERROR != 0 {
            return Err(io::Error::from_raw_os_error(kev.data as i32));
        }

        Ok(Some(ReadyEvent {
            fd: kev.ident as RawFd,
            pending: Some(kev.data as i64),
        }))
    }
}

impl Drop for EventQueue {
    fn drop(&mut self) {
        trace!("Closing kqueue_fd {}", self.kqueue_fd);
        unsafe {
            libc::close(self.kqueue_fd);
        }
    }
}
