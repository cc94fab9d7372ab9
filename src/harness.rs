// src/harness.rs

//! The measurement loop.
//!
//! Each round sends one index to the producer, then times the backend's
//! blocking wait until the matching channel has been drained. Only the wait
//! is timed; the control write happens before the clock starts.

use crate::backend::{ReadinessBackend, WaitOutcome};
use crate::channel::{ControlWriter, ReadEnds};
use crate::config::RoundOrder;
use crate::error::Result;
use log::{debug, error, info, warn};
use serde::Serialize;
use std::time::{Duration, Instant};

/// One request/notify/drain cycle.
#[derive(Debug, Clone, Copy)]
pub struct Round {
    pub index: u32,
    pub start: Instant,
    pub end: Instant,
    pub outcome: WaitOutcome,
}

impl Round {
    pub fn elapsed(&self) -> Duration {
        self.end.duration_since(self.start)
    }
}

/// Aggregate result for one backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub backend: &'static str,
    pub order: RoundOrder,
    pub channels: usize,
    pub rounds: usize,
    pub total_us: u64,
    /// `total_us / rounds`, or 0 when no round ran.
    pub mean_us: u64,
    /// Rounds whose drained token was missing or wrong, summed over descriptors.
    pub mismatches: usize,
    /// Rounds in which the backend reported anything other than one ready fd.
    pub multi_ready_rounds: usize,
}

impl RunReport {
    fn from_totals(
        backend: &'static str,
        order: RoundOrder,
        channels: usize,
        rounds: usize,
        total: Duration,
        mismatches: usize,
        multi_ready_rounds: usize,
    ) -> Self {
        let total_us = total.as_micros() as u64;
        let mean_us = if rounds == 0 {
            0
        } else {
            total_us / rounds as u64
        };
        Self {
            backend,
            order,
            channels,
            rounds,
            total_us,
            mean_us,
            mismatches,
            multi_ready_rounds,
        }
    }

    pub fn summary_line(&self) -> String {
        format!(
            "Average service time for {} was {}us",
            self.backend, self.mean_us
        )
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Harness side of the benchmark: owns the control writer and every read end.
#[derive(Debug)]
pub struct Harness {
    control: ControlWriter,
    read_ends: ReadEnds,
    order: RoundOrder,
}

impl Harness {
    pub fn new(control: ControlWriter, read_ends: ReadEnds, order: RoundOrder) -> Self {
        Self {
            control,
            read_ends,
            order,
        }
    }

    pub fn channels(&self) -> usize {
        self.read_ends.len()
    }

    /// Registers the read ends with `backend`.
    pub fn prepare(&self, backend: &mut dyn ReadinessBackend) -> Result<()> {
        backend.prepare(&self.read_ends.raw_fds())
    }

    pub fn run(&mut self, backend: &mut dyn ReadinessBackend) -> Result<RunReport> {
        self.run_with(backend, |_| {})
    }

    /// Runs one round per channel; `after_round` sees every completed round.
    pub fn run_with(
        &mut self,
        backend: &mut dyn ReadinessBackend,
        mut after_round: impl FnMut(&Round),
    ) -> Result<RunReport> {
        let channels = self.channels();
        let mut total = Duration::ZERO;
        let mut rounds = 0;
        let mut mismatches = 0;
        let mut multi_ready_rounds = 0;

        info!(
            "Running {} rounds with {} ({:?} order)",
            channels,
            backend.name(),
            self.order
        );

        for index in self.order.indices(channels) {
            self.control.send(index).map_err(|e| {
                error!("Measurement aborted before round {}: {}", index, e);
                e
            })?;

            let start = Instant::now();
            let outcome = backend.wait_for_ready(index).map_err(|e| {
                error!("Measurement aborted in round {}: {}", index, e);
                e
            })?;
            let end = Instant::now();

            let round = Round {
                index,
                start,
                end,
                outcome,
            };
            total += round.elapsed();
            rounds += 1;
            mismatches += outcome.mismatches;
            if outcome.ready != 1 {
                multi_ready_rounds += 1;
            }
            debug!("Round {} took {:?}", index, round.elapsed());
            after_round(&round);
        }

        let report = RunReport::from_totals(
            backend.name(),
            self.order,
            channels,
            rounds,
            total,
            mismatches,
            multi_ready_rounds,
        );
        if report.mismatches > 0 || report.multi_ready_rounds > 0 {
            warn!(
                "{}: {} mismatched tokens, {} rounds without exactly one ready fd",
                report.backend, report.mismatches, report.multi_ready_rounds
            );
        }
        Ok(report)
    }

    /// Closes the control writer, which tells the producer to shut down.
    /// The read ends stay open until the returned value is dropped.
    pub fn finish(self) -> ReadEnds {
        drop(self.control);
        self.read_ends
    }
}
