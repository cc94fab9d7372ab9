// src/error.rs

//! Error types shared by the harness, the backends and the supervisor.
//!
//! Only fatal conditions live here. A drained token that does not match the
//! requested index is not an error: backends count it in their
//! [`WaitOutcome`](crate::backend::WaitOutcome) and keep going.

use std::io;
use thiserror::Error;

pub type Result<T, E = BenchError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum BenchError {
    /// Resource limit, pipe, signal handler or backend registration failure.
    #[error("setup failed in {op}: {source}")]
    Setup {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    /// The blocking wait primitive itself failed (EINTR is retried, never reported).
    #[error("wait failed for {backend}: {source}")]
    Wait {
        backend: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("backend '{0}' is not supported on this platform")]
    Unsupported(String),

    #[error("unknown backend '{0}'")]
    UnknownBackend(String),

    #[error("failed to send index {index} over the control channel: {source}")]
    ControlWrite {
        index: u32,
        #[source]
        source: io::Error,
    },

    #[error("fork failed: {0}")]
    Fork(#[source] io::Error),

    #[error("failed to reap producer: {0}")]
    Reap(#[source] io::Error),

    /// The run completed but the producer exited non-zero or was killed.
    #[error("producer ended abnormally: {0}")]
    ProducerFault(String),
}

impl BenchError {
    pub fn setup(op: &'static str, source: impl Into<io::Error>) -> Self {
        BenchError::Setup {
            op,
            source: source.into(),
        }
    }

    pub fn wait(backend: &'static str, source: impl Into<io::Error>) -> Self {
        BenchError::Wait {
            backend,
            source: source.into(),
        }
    }

    /// Setup failures abort before the first round is measured.
    pub fn is_setup(&self) -> bool {
        matches!(
            self,
            BenchError::Setup { .. }
                | BenchError::Unsupported(_)
                | BenchError::UnknownBackend(_)
                | BenchError::Fork(_)
        )
    }
}
