// src/channel.rs

//! Pipe plumbing shared by the harness and the producer.
//!
//! Every message on every pipe is a single native-endian `u32` token. The
//! control pipe carries requested indices from the harness to the producer;
//! each data channel carries the echoed index back, one token per round.

use crate::error::{BenchError, Result};
use log::{debug, trace};
use nix::errno::Errno;
use std::io;
use std::os::unix::io::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};

/// Size of one token on the wire.
pub const TOKEN_LEN: usize = std::mem::size_of::<u32>();

/// Result of a single token read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenRead {
    Value(u32),
    /// Zero-length read: every write end is closed.
    Eof,
    /// Fewer than [`TOKEN_LEN`] bytes arrived.
    Short(usize),
}

/// Reads one token with a single `read(2)`, retrying only on EINTR.
pub fn read_token<Fd: AsFd>(fd: Fd) -> io::Result<TokenRead> {
    let mut buf = [0u8; TOKEN_LEN];
    loop {
        match nix::unistd::read(fd.as_fd(), &mut buf) {
            Ok(0) => return Ok(TokenRead::Eof),
            Ok(TOKEN_LEN) => return Ok(TokenRead::Value(u32::from_ne_bytes(buf))),
            Ok(n) => return Ok(TokenRead::Short(n)),
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

/// Writes one token with a single `write(2)`. Pipes guarantee atomicity for
/// writes below PIPE_BUF, so a short write is reported as an error.
pub fn write_token<Fd: AsFd>(fd: Fd, value: u32) -> io::Result<()> {
    let buf = value.to_ne_bytes();
    loop {
        match nix::unistd::write(fd.as_fd(), &buf) {
            Ok(TOKEN_LEN) => return Ok(()),
            Ok(n) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    format!("short write: {} of {} bytes", n, TOKEN_LEN),
                ))
            }
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

/// One unidirectional data pipe.
#[derive(Debug)]
pub struct Channel {
    read_end: OwnedFd,
    write_end: OwnedFd,
}

/// N data pipes, allocated before the fork.
#[derive(Debug)]
pub struct ChannelSet {
    channels: Vec<Channel>,
    max_fd: RawFd,
}

impl ChannelSet {
    pub fn open(count: usize) -> Result<Self> {
        let mut channels = Vec::with_capacity(count);
        let mut max_fd: RawFd = -1;

        for i in 0..count {
            let (read_end, write_end) = nix::unistd::pipe().map_err(|e| {
                log::error!("pipe(2) failed at iteration {}", i);
                BenchError::setup("pipe", e)
            })?;
            max_fd = max_fd.max(read_end.as_raw_fd()).max(write_end.as_raw_fd());
            trace!(
                "Channel {}: read fd {}, write fd {}",
                i,
                read_end.as_raw_fd(),
                write_end.as_raw_fd()
            );
            channels.push(Channel {
                read_end,
                write_end,
            });
        }

        debug!("Opened {} channels, highest fd {}", count, max_fd);
        Ok(Self { channels, max_fd })
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Highest descriptor number across both ends of every pair, or -1 when empty.
    pub fn max_fd(&self) -> RawFd {
        self.max_fd
    }

    /// Separates the harness-owned read ends from the producer-owned write ends.
    pub fn split(self) -> (ReadEnds, WriteEnds) {
        let max_fd = self.max_fd;
        let (reads, writes): (Vec<OwnedFd>, Vec<OwnedFd>) = self
            .channels
            .into_iter()
            .map(|c| (c.read_end, c.write_end))
            .unzip();
        (ReadEnds { fds: reads, max_fd }, WriteEnds { fds: writes })
    }
}

/// Harness side of the channel set.
#[derive(Debug)]
pub struct ReadEnds {
    fds: Vec<OwnedFd>,
    max_fd: RawFd,
}

impl ReadEnds {
    pub fn len(&self) -> usize {
        self.fds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fds.is_empty()
    }

    pub fn max_fd(&self) -> RawFd {
        self.max_fd
    }

    /// Raw descriptors in channel order, for backend registration.
    pub fn raw_fds(&self) -> Vec<RawFd> {
        self.fds.iter().map(AsRawFd::as_raw_fd).collect()
    }

    pub fn get(&self, index: usize) -> Option<BorrowedFd<'_>> {
        self.fds.get(index).map(AsFd::as_fd)
    }
}

/// Producer side of the channel set.
#[derive(Debug)]
pub struct WriteEnds {
    fds: Vec<OwnedFd>,
}

impl WriteEnds {
    pub fn len(&self) -> usize {
        self.fds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fds.is_empty()
    }

    pub fn raw_fds(&self) -> Vec<RawFd> {
        self.fds.iter().map(AsRawFd::as_raw_fd).collect()
    }

    pub fn get(&self, index: usize) -> Option<BorrowedFd<'_>> {
        self.fds.get(index).map(AsFd::as_fd)
    }
}

/// The request pipe from harness to producer. Not part of the polled set.
#[derive(Debug)]
pub struct ControlChannel {
    reader: OwnedFd,
    writer: OwnedFd,
}

impl ControlChannel {
    pub fn open() -> Result<Self> {
        let (reader, writer) =
            nix::unistd::pipe().map_err(|e| BenchError::setup("control pipe", e))?;
        debug!(
            "Control channel: read fd {}, write fd {}",
            reader.as_raw_fd(),
            writer.as_raw_fd()
        );
        Ok(Self { reader, writer })
    }

    pub fn split(self) -> (ControlReader, ControlWriter) {
        (
            ControlReader { fd: self.reader },
            ControlWriter { fd: self.writer },
        )
    }
}

#[derive(Debug)]
pub struct ControlReader {
    fd: OwnedFd,
}

impl ControlReader {
    pub fn recv(&self) -> io::Result<TokenRead> {
        read_token(&self.fd)
    }
}

#[derive(Debug)]
pub struct ControlWriter {
    fd: OwnedFd,
}

impl ControlWriter {
    pub fn send(&self, index: u32) -> Result<()> {
        write_token(&self.fd, index).map_err(|source| BenchError::ControlWrite { index, source })
    }
}

impl AsFd for ControlWriter {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}
