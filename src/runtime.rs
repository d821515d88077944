//! # Task Runtime
//!
//! Runs a task's workload under the scheduler's control and performs the
//! completion handshake with the supervisor.
//!
//! The runtime never touches scheduler state. It is fed clock samples,
//! either by a free-running loop on real hardware ([`TaskRuntime::run`]) or
//! by the simulated host one step at a time ([`TaskRuntime::poll`]). When its
//! workload reports `Done` it sends exactly one [`TaskCompleted`] addressed by
//! its task id.
//!
//! The reference workload, [`PreemptionProbe`], is itself a measurement: it
//! free-runs, sums small sample-to-sample differences and closes an epoch
//! each time a gap shows that the task lost the CPU.

use log::{error, info};

use crate::accountant::{GapDetector, GapEvent, SampleWindow};
use crate::clock::{self, CycleClock};
use crate::config::{RuntimeConfig, SAMPLE_WINDOW_CAPACITY};
use crate::error::{Error, Result};
use crate::sync::CompletionQueue;
use crate::task::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadStatus {
    Continue,
    Done,
}

/// Work executed by a task, one clock sample at a time.
pub trait Workload {
    /// Process one sample of the cycle clock.
    fn sample(&mut self, now: u64) -> WorkloadStatus;

    /// Epochs to report on completion. Workloads that do not measure
    /// anything report an empty window.
    fn epochs(&self) -> SampleWindow {
        SampleWindow::new()
    }
}

impl<F> Workload for F
where
    F: FnMut(u64) -> WorkloadStatus,
{
    fn sample(&mut self, now: u64) -> WorkloadStatus {
        self(now)
    }
}

// ---------------------------------------------------------------------------
// Reference workload
// ---------------------------------------------------------------------------

/// Records preemption epochs until a fixed number has been collected.
#[derive(Debug, Clone, Copy)]
pub struct PreemptionProbe {
    gaps: GapDetector,
    window: SampleWindow,
    target: usize,
}

impl PreemptionProbe {
    /// `config` is expected to be validated; the target is capped at the
    /// window capacity either way.
    pub fn new(config: &RuntimeConfig) -> Self {
        Self {
            gaps: GapDetector::new(config.slack_cycles),
            window: SampleWindow::new(),
            target: config.epochs.min(SAMPLE_WINDOW_CAPACITY),
        }
    }

    pub fn window(&self) -> &SampleWindow {
        &self.window
    }

    pub fn is_done(&self) -> bool {
        self.window.len() >= self.target
    }
}

impl Workload for PreemptionProbe {
    fn sample(&mut self, now: u64) -> WorkloadStatus {
        if self.is_done() {
            return WorkloadStatus::Done;
        }
        if let GapEvent::EpochClosed(epoch) = self.gaps.sample(now) {
            self.window.push(epoch);
        }
        if self.is_done() {
            WorkloadStatus::Done
        } else {
            WorkloadStatus::Continue
        }
    }

    fn epochs(&self) -> SampleWindow {
        self.window
    }
}

// ---------------------------------------------------------------------------
// Completion handshake
// ---------------------------------------------------------------------------

/// Message a finished task sends to the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskCompleted {
    pub task: TaskId,
    pub epochs: SampleWindow,
    /// Timestamp of the sample that completed the workload.
    pub finished_at: u64,
}

impl TaskCompleted {
    /// Share of the measured span spent executing, as the probe itself sees
    /// it: Σ epoch cycles · 100 / (finish − first epoch start).
    pub fn measured_utilization_percent(&self) -> Option<u64> {
        self.epochs.utilization_percent(self.finished_at)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Running,
    Completed,
}

/// Hosts one task's workload and its end of the completion channel.
pub struct TaskRuntime<'q, W> {
    id: TaskId,
    workload: W,
    completions: &'q CompletionQueue,
    samples: u64,
    finished_at: Option<u64>,
}

impl<'q, W: Workload> TaskRuntime<'q, W> {
    pub fn new(id: TaskId, workload: W, completions: &'q CompletionQueue) -> Self {
        Self { id, workload, completions, samples: 0, finished_at: None }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn workload(&self) -> &W {
        &self.workload
    }

    /// Clock samples processed so far.
    pub fn samples(&self) -> u64 {
        self.samples
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }

    pub fn finished_at(&self) -> Option<u64> {
        self.finished_at
    }

    /// Feed one clock sample. Once completed, further polls are no-ops.
    pub fn poll(&mut self, now: u64) -> Result<Progress> {
        if self.is_finished() {
            return Ok(Progress::Completed);
        }
        self.samples += 1;
        match self.workload.sample(now) {
            WorkloadStatus::Continue => Ok(Progress::Running),
            WorkloadStatus::Done => {
                self.finish(now)?;
                Ok(Progress::Completed)
            }
        }
    }

    /// Free-running loop: sample `clock` until the workload completes.
    pub fn run<C: CycleClock + ?Sized>(&mut self, clock: &C) -> Result<()> {
        loop {
            let now = clock::sample(clock);
            if self.poll(now)? == Progress::Completed {
                return Ok(());
            }
        }
    }

    fn finish(&mut self, now: u64) -> Result<()> {
        self.finished_at = Some(now);
        let msg = TaskCompleted { task: self.id, epochs: self.workload.epochs(), finished_at: now };
        if self.completions.send(msg).is_err() {
            error!("task {}: completion channel full, message dropped", self.id);
            return Err(Error::ChannelFull(self.id));
        }
        info!(
            "task {} completed at {} after {} samples, {} epochs",
            self.id,
            now,
            self.samples,
            msg.epochs.len()
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
