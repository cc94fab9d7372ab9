// src/os/port.rs

//! Solaris/illumos event ports. A `PORT_SOURCE_FD` association is dissolved
//! by the kernel as soon as it delivers an event, so every registration is
//! one-shot and must be re-associated after each delivery.

use super::{Arming, ReadyEvent};
use log::{debug, trace, warn};
use std::io;
use std::os::unix::io::RawFd;

#[derive(Debug)]
pub struct EventQueue {
    port_fd: RawFd,
}

impl EventQueue {
    pub const NAME: &'static str = "port";

    pub fn new() -> io::Result<Self> {
        let port_fd = unsafe { libc::port_create() };
        if port_fd == -1 {
            return Err(io::Error::last_os_error());
        }
        debug!("EventQueue created with port_fd: {}", port_fd);
        Ok(Self { port_fd })
    }

    pub fn add(&self, fd: RawFd, arming: Arming) -> io::Result<()> {
        if arming == Arming::Level {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "event ports only deliver one-shot notifications",
            ));
        }
        let ret = unsafe {
            libc::port_associate(
                self.port_fd,
                libc::PORT_SOURCE_FD,
                fd as libc::uintptr_t,
                libc::POLLIN as libc::c_int,
                std::ptr::null_mut(),
            )
        };
        if ret == -1 {
            return Err(io::Error::last_os_error());
        }
        trace!("Associated fd {} with port_fd {}", fd, self.port_fd);
        Ok(())
    }

    pub fn rearm(&self, fd: RawFd, arming: Arming) -> io::Result<()> {
        self.add(fd, arming)
    }

    /// Blocks until one descriptor is ready. `Ok(None)` means the wait was
    /// interrupted by a signal and should be retried.
    pub fn next_ready(&mut self) -> io::Result<Option<ReadyEvent>> {
        let mut pe: libc::port_event = unsafe { std::mem::zeroed() };
        if unsafe { libc::port_get(self.port_fd, &mut pe, std::ptr::null_mut()) } == -1 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                trace!("EventQueue: port_get interrupted (EINTR)");
                return Ok(None);
            }
            return Err(err);
        }
        Ok(Some(ReadyEvent {
            fd: pe.portev_object as RawFd,
            pending: None,
        }))
    }
}

impl Drop for EventQueue {
    fn drop(&mut self) {
        if unsafe { libc::close(self.port_fd) } == -1 {
            warn!(
                "Failed to close port_fd {}: {}",
                self.port_fd,
                io::Error::last_os_error()
            );
        }
    }
}
