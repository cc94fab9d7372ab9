// src/config.rs

//! Run configuration and the command line that produces it.
//!
//! `BenchConfig` is the single context value handed to the supervisor, the
//! harness and the backend factory; nothing reads process-wide state.

use crate::backend::BackendKind;
use clap::{Parser, ValueEnum};
use serde::Serialize;

/// Order in which channel indices are requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RoundOrder {
    /// N-1 down to 0.
    #[default]
    Descending,
    /// 0 up to N-1.
    Ascending,
}

impl RoundOrder {
    /// The request sequence for `channels` rounds.
    pub fn indices(self, channels: usize) -> Box<dyn Iterator<Item = u32>> {
        let n = channels as u32;
        match self {
            RoundOrder::Descending => Box::new((0..n).rev()),
            RoundOrder::Ascending => Box::new(0..n),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchConfig {
    /// Number of data channels, which is also the number of rounds.
    pub channels: usize,
    pub backend: BackendKind,
    pub order: RoundOrder,
    pub verbose: bool,
    /// Print the report as JSON instead of the summary line.
    pub json: bool,
}

impl BenchConfig {
    pub fn new(channels: usize, backend: BackendKind) -> Self {
        Self {
            channels,
            backend,
            order: RoundOrder::default(),
            verbose: false,
            json: false,
        }
    }
}

fn parse_backend(name: &str) -> Result<BackendKind, String> {
    name.parse::<BackendKind>().map_err(|e| {
        let names: Vec<&str> = BackendKind::available().map(BackendKind::name).collect();
        format!("{} (available: {})", e, names.join(", "))
    })
}

/// Measure readiness notification latency of select, poll, epoll/kqueue and event ports
#[derive(Parser, Debug)]
#[command(name = "pollbench", version, about)]
pub struct Cli {
    /// Number of pipes to multiplex (one round per pipe)
    #[arg(short = 'f', long = "fds", value_parser = clap::value_parser!(u32).range(1..))]
    pub fds: u32,

    /// Notification mechanism: select, poll, epoll (Linux), kqueue (BSD/macOS) or port
    #[arg(short = 'm', long = "method", value_parser = parse_backend)]
    pub method: BackendKind,

    /// Enable verbose mode (per-round readiness notices)
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Order in which pipes are exercised
    #[arg(long, value_enum, default_value_t = RoundOrder::Descending)]
    pub order: RoundOrder,

    /// Print the report as a JSON object
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    pub fn into_config(self) -> BenchConfig {
        BenchConfig {
            channels: self.fds as usize,
            backend: self.method,
            order: self.order,
            verbose: self.verbose,
            json: self.json,
        }
    }
}
