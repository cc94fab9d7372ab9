// src/producer.rs

//! The workload generator.
//!
//! The producer sits on the control pipe, and for every index it receives it
//! writes that same index to the matching data channel. It never writes
//! without being asked, so at most one channel is readable at any time.

use crate::channel::{write_token, ControlReader, TokenRead, WriteEnds, TOKEN_LEN};
use log::{debug, error, info};
use std::fmt;
use std::io;
use std::os::unix::io::AsRawFd;

/// Why the producer stopped. Everything except [`ProducerExit::Shutdown`] is a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerExit {
    /// The harness closed the control pipe.
    Shutdown,
    ShortControlRead(usize),
    ControlReadFailed(io::ErrorKind),
    IndexOutOfRange(u32),
    WriteFailed { index: u32, kind: io::ErrorKind },
}

impl ProducerExit {
    /// Process exit status for the producer image.
    pub fn status(&self) -> i32 {
        match self {
            ProducerExit::Shutdown => 0,
            _ => 1,
        }
    }
}

impl fmt::Display for ProducerExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProducerExit::Shutdown => write!(f, "control channel closed"),
            ProducerExit::ShortControlRead(n) => {
                write!(f, "short control read ({} of {} bytes)", n, TOKEN_LEN)
            }
            ProducerExit::ControlReadFailed(kind) => write!(f, "control read failed: {}", kind),
            ProducerExit::IndexOutOfRange(index) => write!(f, "no channel for index {}", index),
            ProducerExit::WriteFailed { index, kind } => {
                write!(f, "write to channel {} failed: {}", index, kind)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerState {
    Listening,
    Terminated(ProducerExit),
}

#[derive(Debug)]
pub struct Producer {
    control: ControlReader,
    write_ends: WriteEnds,
    state: ProducerState,
    forwarded: u64,
}

impl Producer {
    pub fn new(control: ControlReader, write_ends: WriteEnds) -> Self {
        Self {
            control,
            write_ends,
            state: ProducerState::Listening,
            forwarded: 0,
        }
    }

    pub fn state(&self) -> ProducerState {
        self.state
    }

    /// Tokens written to data channels so far.
    pub fn forwarded(&self) -> u64 {
        self.forwarded
    }

    /// Serves one control message. Once terminated, stays terminated.
    pub fn step(&mut self) -> ProducerState {
        if let ProducerState::Terminated(_) = self.state {
            return self.state;
        }

        self.state = match self.control.recv() {
            Ok(TokenRead::Value(index)) => self.forward(index),
            Ok(TokenRead::Eof) => ProducerState::Terminated(ProducerExit::Shutdown),
            Ok(TokenRead::Short(n)) => {
                error!("[producer] short read on control channel: {} bytes", n);
                ProducerState::Terminated(ProducerExit::ShortControlRead(n))
            }
            Err(e) => {
                error!("[producer] control read failed: {}", e);
                ProducerState::Terminated(ProducerExit::ControlReadFailed(e.kind()))
            }
        };
        self.state
    }

    fn forward(&mut self, index: u32) -> ProducerState {
        let Some(fd) = self.write_ends.get(index as usize) else {
            error!(
                "[producer] index {} out of range for {} channels",
                index,
                self.write_ends.len()
            );
            return ProducerState::Terminated(ProducerExit::IndexOutOfRange(index));
        };

        match write_token(fd, index) {
            Ok(()) => {
                debug!("[producer] write {} to fd {}", index, fd.as_raw_fd());
                self.forwarded += 1;
                ProducerState::Listening
            }
            Err(e) => {
                error!("[producer] write to fd {} failed: {}", fd.as_raw_fd(), e);
                ProducerState::Terminated(ProducerExit::WriteFailed {
                    index,
                    kind: e.kind(),
                })
            }
        }
    }

    /// Serves requests until the control channel closes or a fault occurs.
    pub fn run(mut self) -> ProducerExit {
        loop {
            if let ProducerState::Terminated(exit) = self.step() {
                info!("[producer] done after {} writes: {}", self.forwarded, exit);
                return exit;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{read_token, ChannelSet, ControlChannel};
    use std::thread;

    #[test_log::test]
    fn test_producer_echoes_requested_index() {
        let (reads, writes) = ChannelSet::open(3).unwrap().split();
        let (control_rx, control_tx) = ControlChannel::open().unwrap().split();
        let handle = thread::spawn(move || Producer::new(control_rx, writes).run());

        for index in [2u32, 1, 0] {
            control_tx.send(index).unwrap();
            assert_eq!(
                read_token(reads.get(index as usize).unwrap()).unwrap(),
                TokenRead::Value(index)
            );
        }
        drop(control_tx);

        let exit = handle.join().unwrap();
        assert_eq!(exit, ProducerExit::Shutdown);
        assert_eq!(exit.status(), 0);
    }

    #[test_log::test]
    fn test_closed_control_before_any_request_is_clean() {
        let (_reads, writes) = ChannelSet::open(0).unwrap().split();
        let (control_rx, control_tx) = ControlChannel::open().unwrap().split();
        drop(control_tx);
        let mut producer = Producer::new(control_rx, writes);
        assert_eq!(
            producer.step(),
            ProducerState::Terminated(ProducerExit::Shutdown)
        );
        assert_eq!(producer.forwarded(), 0);
    }

    #[test_log::test]
    fn test_short_control_read_is_a_fault() {
        let (_reads, writes) = ChannelSet::open(1).unwrap().split();
        let (control_rx, control_tx) = ControlChannel::open().unwrap().split();
        nix::unistd::write(&control_tx, &[1u8, 2, 3]).unwrap();
        drop(control_tx);

        let exit = Producer::new(control_rx, writes).run();
        assert_eq!(exit, ProducerExit::ShortControlRead(3));
        assert_eq!(exit.status(), 1);
    }

    #[test_log::test]
    fn test_unknown_index_is_a_fault() {
        let (_reads, writes) = ChannelSet::open(2).unwrap().split();
        let (control_rx, control_tx) = ControlChannel::open().unwrap().split();
        control_tx.send(2).unwrap();

        let mut producer = Producer::new(control_rx, writes);
        assert_eq!(
            producer.step(),
            ProducerState::Terminated(ProducerExit::IndexOutOfRange(2))
        );
        // Terminated is absorbing.
        control_tx.send(0).unwrap();
        assert_eq!(
            producer.step(),
            ProducerState::Terminated(ProducerExit::IndexOutOfRange(2))
        );
    }

    #[test_log::test]
    fn test_write_to_closed_channel_is_a_fault() {
        let (reads, writes) = ChannelSet::open(1).unwrap().split();
        drop(reads);
        let (control_rx, control_tx) = ControlChannel::open().unwrap().split();
        control_tx.send(0).unwrap();

        let mut producer = Producer::new(control_rx, writes);
        assert_eq!(
            producer.step(),
            ProducerState::Terminated(ProducerExit::WriteFailed {
                index: 0,
                kind: io::ErrorKind::BrokenPipe
            })
        );
    }
}
