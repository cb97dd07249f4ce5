//! # per stage instrumentation
//! - the driver receives the instrumentation as an injected collaborator,
//!   there is no process wide timer registry.

use std::time::{Duration, Instant};

/// the timed stages of a run, matching the report layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ReadFile,
    Init,
    Allocate,
    FirstCopy,
    Process,
    UpdateClusters,
    Clustering,
}

pub const ALL_STAGES: [Stage; 7] = [
    Stage::ReadFile,
    Stage::Init,
    Stage::Allocate,
    Stage::FirstCopy,
    Stage::Process,
    Stage::UpdateClusters,
    Stage::Clustering,
];

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::ReadFile => "read input file",
            Stage::Init => "device initialization",
            Stage::Allocate => "buffer allocation",
            Stage::FirstCopy => "first full copy",
            Stage::Process => "iteration",
            Stage::UpdateClusters => "update clusters",
            Stage::Clustering => "clusterization",
        }
    }
}

/// the instrumentation capability handed to the driver.
pub trait Instrument {
    fn start(&mut self, stage: Stage);
    fn stop(&mut self, stage: Stage);
    /// total accumulated milliseconds of a stage.
    fn report_ms(&self, stage: Stage) -> f64;
}

/// wall clock instrumentation, accumulating across starts and stops.
#[derive(Debug, Default)]
pub struct Timers {
    started: [Option<Instant>; ALL_STAGES.len()],
    elapsed: [Duration; ALL_STAGES.len()],
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Instrument for Timers {
    fn start(&mut self, stage: Stage) {
        self.started[stage as usize] = Some(Instant::now());
    }

    fn stop(&mut self, stage: Stage) {
        if let Some(started) = self.started[stage as usize].take() {
            self.elapsed[stage as usize] += started.elapsed();
        }
    }

    fn report_ms(&self, stage: Stage) -> f64 {
        self.elapsed[stage as usize].as_secs_f64() * 1000.0
    }
}

/// instrumentation that records nothing, for callers that do not report.
#[derive(Debug, Default)]
pub struct NullInstrument;

impl Instrument for NullInstrument {
    fn start(&mut self, _stage: Stage) {}
    fn stop(&mut self, _stage: Stage) {}
    fn report_ms(&self, _stage: Stage) -> f64 {
        0.0
    }
}
