// src/supervisor.rs

//! Process supervision: forks the producer, hands each image the descriptors
//! it owns, and collects the producer's exit status.
//!
//! Child termination is observed without doing any work in signal context.
//! The SIGCHLD handler only raises an atomic flag; the harness checks the flag
//! after every round and, when set, collects the status with a non-blocking
//! `waitpid`. A final blocking reap runs once the harness has closed the
//! control pipe.

use crate::backend::ReadinessBackend;
use crate::channel::{ChannelSet, ControlChannel, ControlReader, WriteEnds};
use crate::config::BenchConfig;
use crate::error::{BenchError, Result};
use crate::harness::{Harness, RunReport};
use crate::producer::{Producer, ProducerExit};
use log::{debug, error, info, warn};
use nix::errno::Errno;
use nix::sys::signal::{kill, sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

static CHILD_STATE_CHANGED: AtomicBool = AtomicBool::new(false);

extern "C" fn note_child_state_change(_signal: libc::c_int) {
    CHILD_STATE_CHANGED.store(true, Ordering::SeqCst);
}

/// Installed SIGCHLD handler; restores the previous disposition on drop.
pub struct ChildWatch {
    previous: SigAction,
}

impl ChildWatch {
    pub fn install() -> Result<Self> {
        CHILD_STATE_CHANGED.store(false, Ordering::SeqCst);
        // No SA_RESTART: a pending wait returns EINTR and the backend retries it.
        let action = SigAction::new(
            SigHandler::Handler(note_child_state_change),
            SaFlags::empty(),
            SigSet::empty(),
        );
        let previous = unsafe { sigaction(Signal::SIGCHLD, &action) }
            .map_err(|e| BenchError::setup("sigaction", e))?;
        debug!("SIGCHLD watch installed");
        Ok(Self { previous })
    }

    /// Returns whether a child changed state since the last call.
    pub fn take_notification(&self) -> bool {
        CHILD_STATE_CHANGED.swap(false, Ordering::SeqCst)
    }
}

impl Drop for ChildWatch {
    fn drop(&mut self) {
        if let Err(e) = unsafe { sigaction(Signal::SIGCHLD, &self.previous) } {
            warn!("Failed to restore SIGCHLD disposition: {}", e);
        }
    }
}

/// How the producer ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildStatus {
    Exited(i32),
    Signaled(Signal),
}

impl ChildStatus {
    fn from_wait_status(status: WaitStatus) -> Option<Self> {
        match status {
            WaitStatus::Exited(_, code) => Some(ChildStatus::Exited(code)),
            WaitStatus::Signaled(_, signal, _) => Some(ChildStatus::Signaled(signal)),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        *self == ChildStatus::Exited(0)
    }
}

/// Handle on the forked producer process.
#[derive(Debug)]
pub struct ProducerProcess {
    pid: Pid,
    status: Option<ChildStatus>,
    stopped: Option<Signal>,
}

/// Log line for a reaped child.
struct ChildReport(Pid, ChildStatus);

impl fmt::Display for ChildReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.1 {
            ChildStatus::Exited(code) => {
                write!(f, "Child [{}] has died with exit status {}", self.0, code)
            }
            ChildStatus::Signaled(signal) => write!(
                f,
                "Child [{}] was killed by signal {}",
                self.0, signal as libc::c_int
            ),
        }
    }
}

impl ProducerProcess {
    pub fn new(pid: Pid) -> Self {
        Self {
            pid,
            status: None,
            stopped: None,
        }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// The signal that most recently stopped the producer, if any.
    pub fn stopped_by(&self) -> Option<Signal> {
        self.stopped
    }

    /// Non-blocking status check; returns the cached status once reaped.
    pub fn poll(&mut self) -> Result<Option<ChildStatus>> {
        if self.status.is_some() {
            return Ok(self.status);
        }
        match waitpid(self.pid, Some(WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED)) {
            Ok(status) => Ok(self.record(status)),
            Err(Errno::EINTR) => Ok(None),
            Err(e) => Err(BenchError::Reap(e.into())),
        }
    }

    /// Blocks until the producer terminates.
    pub fn reap(&mut self) -> Result<ChildStatus> {
        loop {
            if let Some(status) = self.status {
                return Ok(status);
            }
            match waitpid(self.pid, None) {
                Ok(status) => {
                    self.record(status);
                }
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(BenchError::Reap(e.into())),
            }
        }
    }

    pub fn kill(&self) -> Result<()> {
        info!("Killing producer {}", self.pid);
        kill(self.pid, Some(Signal::SIGKILL)).map_err(|e| BenchError::Reap(e.into()))
    }

    fn record(&mut self, status: WaitStatus) -> Option<ChildStatus> {
        if let WaitStatus::Stopped(pid, signal) = status {
            info!("Child [{}] was stopped by signal {}", pid, signal as libc::c_int);
            self.stopped = Some(signal);
        }
        if let Some(child_status) = ChildStatus::from_wait_status(status) {
            info!("{}", ChildReport(self.pid, child_status));
            self.status = Some(child_status);
        }
        self.status
    }
}

/// Result of a supervised benchmark run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisedRun {
    pub report: RunReport,
    pub producer: ChildStatus,
}

impl SupervisedRun {
    /// Turns a producer that did not exit 0 into an error.
    pub fn ensure_producer_succeeded(&self) -> Result<()> {
        if self.producer.is_success() {
            return Ok(());
        }
        Err(BenchError::ProducerFault(format!("{:?}", self.producer)))
    }
}

/// Allocates the pipes, forks the producer and drives the harness.
///
/// Does not touch resource limits; see [`crate::limits`].
pub fn launch(config: &BenchConfig) -> Result<SupervisedRun> {
    launch_with(config, |control, write_ends| Producer::new(control, write_ends).run())
}

/// Like [`launch`], but the forked image runs `producer` instead of the
/// standard [`Producer`]. Its [`ProducerExit::status`] becomes the exit status.
pub fn launch_with<F>(config: &BenchConfig, produce: F) -> Result<SupervisedRun>
where
    F: FnOnce(ControlReader, WriteEnds) -> ProducerExit,
{
    let mut backend = config.backend.create()?;
    let watch = ChildWatch::install()?;
    let (control_rx, control_tx) = ControlChannel::open()?.split();
    let (read_ends, write_ends) = ChannelSet::open(config.channels)?.split();

    match unsafe { fork() }.map_err(|e| BenchError::Fork(e.into()))? {
        ForkResult::Child => {
            // Producer image: keep only the control reader and the write ends.
            drop(control_tx);
            drop(read_ends);
            drop(backend);
            drop(watch);
            let exit = produce(control_rx, write_ends);
            std::process::exit(exit.status());
        }
        ForkResult::Parent { child } => {
            drop(control_rx);
            drop(write_ends);
            debug!("Forked producer {}", child);

            let mut producer = ProducerProcess::new(child);
            let harness = Harness::new(control_tx, read_ends, config.order);
            let result = supervise(harness, backend.as_mut(), &mut producer, &watch);
            let status = producer.reap()?;
            Ok(SupervisedRun {
                report: result?,
                producer: status,
            })
        }
    }
}

fn supervise(
    mut harness: Harness,
    backend: &mut dyn ReadinessBackend,
    producer: &mut ProducerProcess,
    watch: &ChildWatch,
) -> Result<RunReport> {
    if let Err(e) = harness.prepare(backend) {
        error!("{} setup failed: {}", backend.name(), e);
        producer.kill()?;
        return Err(e);
    }

    let result = harness.run_with(backend, |round| {
        if watch.take_notification() {
            match producer.poll() {
                Ok(Some(status)) if !status.is_success() => {
                    error!("Producer terminated during round {}", round.index)
                }
                Ok(_) => {}
                Err(e) => warn!("Producer status check failed: {}", e),
            }
        }
    });

    // Closing the control pipe is the producer's shutdown signal.
    let _read_ends = harness.finish();
    result
}
