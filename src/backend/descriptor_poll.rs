// src/backend/descriptor_poll.rs

//! poll(2) over a persistent `pollfd` table. Nothing is re-registered between
//! rounds, but the whole table is scanned after every wait.

use super::{drain, BackendKind, ReadinessBackend, WaitOutcome};
use crate::error::{BenchError, Result};
use bitflags::bitflags;
use log::{debug, warn};
use std::io;
use std::os::unix::io::RawFd;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PollEvents: libc::c_short {
        const POLLIN = libc::POLLIN;
        const POLLERR = libc::POLLERR;
        const POLLHUP = libc::POLLHUP;
        const POLLNVAL = libc::POLLNVAL;
    }
}

#[derive(Debug, Default)]
pub struct DescriptorPoll {
    table: Vec<libc::pollfd>,
}

impl DescriptorPoll {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReadinessBackend for DescriptorPoll {
    fn kind(&self) -> BackendKind {
        BackendKind::DescriptorPoll
    }

    fn prepare(&mut self, read_ends: &[RawFd]) -> Result<()> {
        self.table = read_ends
            .iter()
            .map(|&fd| libc::pollfd {
                fd,
                events: PollEvents::POLLIN.bits(),
                revents: 0,
            })
            .collect();
        Ok(())
    }

    fn wait_for_ready(&mut self, expected: u32) -> Result<WaitOutcome> {
        loop {
            let nr = unsafe {
                libc::poll(
                    self.table.as_mut_ptr(),
                    self.table.len() as libc::nfds_t,
                    -1,
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
        for entry in &self.table {
            let revents = PollEvents::from_bits_truncate(entry.revents);
            if revents.contains(PollEvents::POLLIN) {
                debug!("fd {} is ready for reading", entry.fd);
                outcome.record(drain(entry.fd, expected));
            } else if revents.contains(PollEvents::POLLHUP) {
                debug!("fd {} has been hung up on.", entry.fd);
            } else if revents.intersects(PollEvents::POLLERR | PollEvents::POLLNVAL) {
                warn!("fd {} reported {:?}", entry.fd, revents);
            }
        }
        outcome.log_anomalies();
        Ok(outcome)
    }
}
