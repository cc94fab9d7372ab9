// src/lib.rs

//! `pollbench` measures how long each OS readiness notification mechanism
//! takes to report a readable pipe, under an identical, strictly serialized
//! workload: a forked producer writes one token per round to one of N pipes,
//! and the harness times the backend's wait until that pipe is drained.

#[cfg(not(any(
    target_os = "linux",
    target_os = "macos",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "dragonfly",
    target_os = "illumos",
    target_os = "solaris"
)))]
compile_error!("pollbench needs epoll(7), kqueue(2) or event ports.");

pub mod backend;
pub mod channel;
pub mod config;
pub mod error;
pub mod harness;
pub mod limits;
pub mod os;
pub mod producer;
pub mod supervisor;

pub use backend::{BackendKind, ReadinessBackend, WaitOutcome};
pub use config::{BenchConfig, Cli, RoundOrder};
pub use error::{BenchError, Result};
pub use harness::{Harness, RunReport};
pub use supervisor::SupervisedRun;

/// Pins the descriptor limit, then runs the supervised benchmark.
pub fn run(config: &BenchConfig) -> Result<SupervisedRun> {
    limits::raise_descriptor_limit(config.channels)?;
    supervisor::launch(config)
}
