// src/backend/bitmask.rs

//! select(2). Keeps no kernel state: the descriptor bitmask is rebuilt from
//! scratch on every wait and every bit is scanned afterwards.

use super::{drain, BackendKind, ReadinessBackend, WaitOutcome};
use crate::error::{BenchError, Result};
use log::{debug, info};
use std::io;
use std::os::unix::io::RawFd;

#[derive(Debug, Default)]
pub struct ReadinessBitmask {
    read_ends: Vec<RawFd>,
    nfds: libc::c_int,
}

impl ReadinessBitmask {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReadinessBackend for ReadinessBitmask {
    fn kind(&self) -> BackendKind {
        BackendKind::ReadinessBitmask
    }

    fn prepare(&mut self, read_ends: &[RawFd]) -> Result<()> {
        info!("FD_SETSIZE: {}", libc::FD_SETSIZE);
        let max_fd = read_ends.iter().copied().max().unwrap_or(-1);
        if max_fd >= libc::FD_SETSIZE as RawFd {
            return Err(BenchError::setup(
                "select",
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!(
                        "fd {} does not fit below FD_SETSIZE {}",
                        max_fd,
                        libc::FD_SETSIZE
                    ),
                ),
            ));
        }
        self.read_ends = read_ends.to_vec();
        self.nfds = max_fd + 1;
        Ok(())
    }

    fn wait_for_ready(&mut self, expected: u32) -> Result<WaitOutcome> {
        let mut set: libc::fd_set = unsafe { std::mem::zeroed() };
        loop {
            unsafe { libc::FD_ZERO(&mut set) };
            for &fd in &self.read_ends {
                unsafe { libc::FD_SET(fd, &mut set) };
            }
            let nr = unsafe {
                libc::select(
                    self.nfds,
                    &mut set,
                    std::ptr::null_mut(),
                    std::ptr::null_mut(),
                    std::ptr::null_mut(),
                )
            };
            if nr >= 0 {
                break;
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(BenchError::wait(self.name(), err));
            }
        }

        let mut outcome = WaitOutcome::default();
        for &fd in &self.read_ends {
            if unsafe { libc::FD_ISSET(fd, &set) } {
                debug!("fd {} is ready for reading", fd);
                outcome.record(drain(fd, expected));
            }
        }
        outcome.log_anomalies();
        Ok(outcome)
    }
}
