// src/limits.rs

//! Process-wide descriptor budget.

use crate::error::{BenchError, Result};
use log::info;
use nix::sys::resource::{setrlimit, Resource};

/// stdin, stdout and stderr.
const STANDARD_STREAMS: usize = 3;
/// Both ends of the control pipe.
const CONTROL_PIPE: usize = 2;

/// Descriptors the benchmark needs open at its peak, before the fork.
pub fn required_descriptors(channels: usize) -> usize {
    STANDARD_STREAMS + CONTROL_PIPE + 2 * channels
}

/// Pins RLIMIT_NOFILE (soft and hard) to exactly [`required_descriptors`].
///
/// Lowering the hard limit cannot be undone by an unprivileged process, so
/// this runs once at startup and never again.
pub fn raise_descriptor_limit(channels: usize) -> Result<usize> {
    let needed = required_descriptors(channels);
    info!("Need to open {} fds", needed);
    let limit = needed as libc::rlim_t;
    setrlimit(Resource::RLIMIT_NOFILE, limit, limit)
        .map_err(|e| BenchError::setup("setrlimit", e))?;
    Ok(needed)
}
