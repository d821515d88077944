//! # Simulated Host
//!
//! Deterministic stand-in for the hardware timer and context switcher. It
//! drives a [`Supervisor`]'s scheduler from a [`SimClock`] and executes the
//! dispatched task's runtime for one slice at a time:
//!
//! ```text
//! loop
//!   poll completions ──► finished? stop
//!   tick(now) ──► None:     jump to the next period boundary (idle)
//!             └─► Some(id): slice = min(quantum, budget left, next boundary)
//!                           run id's runtime in sample_cost steps
//!                           observe(id, cycles used)
//!                           workload done? complete(id)
//! ```
//!
//! The clock only moves while a runtime samples it or while the processor
//! idles, so a task sees a gap in its samples exactly when something else
//! held the CPU.

use log::{debug, info, warn};

use crate::clock::{CycleClock, SimClock};
use crate::config::{DEFAULT_QUANTUM, DEFAULT_SAMPLE_COST};
use crate::error::{Error, Result};
use crate::runtime::{Progress, TaskRuntime, Workload};
use crate::supervisor::{Supervisor, TaskHost};

/// Default simulated run length: 50M cycles.
pub const DEFAULT_HORIZON: u64 = 50_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimConfig {
    /// Longest slice between two ticks.
    pub quantum: u64,
    /// Cycles one workload sample costs.
    pub sample_cost: u64,
    /// Give up after this many cycles.
    pub horizon: u64,
}

impl SimConfig {
    pub const fn new() -> Self {
        Self {
            quantum: DEFAULT_QUANTUM,
            sample_cost: DEFAULT_SAMPLE_COST,
            horizon: DEFAULT_HORIZON,
        }
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Summary of one simulated run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SimOutcome {
    /// Every started task completed and was acknowledged.
    pub finished: bool,
    pub finished_at: u64,
    pub ticks: u64,
    pub preemptions: u64,
    pub busy_cycles: u64,
    pub idle_cycles: u64,
    /// Most tasks ever observed in the `Running` state at once.
    pub max_running: usize,
}

pub struct Simulation {
    clock: SimClock,
    config: SimConfig,
}

impl Simulation {
    /// Zero quantum or sample cost are raised to one cycle.
    pub fn new(config: SimConfig) -> Self {
        let config = SimConfig {
            quantum: config.quantum.max(1),
            sample_cost: config.sample_cost.max(1),
            ..config
        };
        Self { clock: SimClock::new(0), config }
    }

    pub fn clock(&self) -> &SimClock {
        &self.clock
    }

    /// Run until every started task has completed or the horizon passes.
    ///
    /// `runtimes` are looked up by task id; a dispatched task without a
    /// runtime is an error.
    pub fn run<H, W>(
        &mut self,
        supervisor: &mut Supervisor<'_, H>,
        runtimes: &mut [TaskRuntime<'_, W>],
    ) -> Result<SimOutcome>
    where
        H: TaskHost,
        W: Workload,
    {
        let deadline = self.clock.now().saturating_add(self.config.horizon);
        let mut outcome = SimOutcome::default();

        loop {
            let now = self.clock.now();
            supervisor.poll_completions(now);
            if supervisor.is_finished() {
                outcome.finished = true;
                break;
            }
            if now >= deadline {
                warn!("simulation horizon reached at {} with tasks still running", now);
                break;
            }

            let sched = supervisor.scheduler_mut();
            let running = sched.tick(now);
            outcome.max_running = outcome.max_running.max(sched.running_count());

            let Some(id) = running else {
                let Some(next) = sched.next_release() else {
                    warn!("no live tasks left at {}, stopping", now);
                    break;
                };
                let target = next.min(deadline);
                outcome.idle_cycles += target - now;
                self.clock.advance_to(target);
                continue;
            };

            let task = sched.task(id).copied().ok_or(Error::UnknownTask(id))?;
            let mut slice = self.config.quantum.min(deadline - now);
            if task.config.is_budget_limited() {
                slice = slice.min(task.remaining_budget);
            }
            if let Some(next) = sched.next_release() {
                slice = slice.min(next - now);
            }

            let runtime = runtimes
                .iter_mut()
                .find(|rt| rt.id() == id)
                .ok_or(Error::UnknownTask(id))?;
            let (used, done) = self.execute(runtime, slice.max(1))?;

            let sched = supervisor.scheduler_mut();
            sched.observe(id, used);
            outcome.busy_cycles += used;
            if done {
                sched.complete(id, self.clock.now())?;
            }
        }

        let sched = supervisor.scheduler();
        outcome.finished_at = self.clock.now();
        outcome.ticks = sched.tick_count();
        outcome.preemptions = sched.preemptions();
        info!(
            "simulation stopped at {}: {} ticks, {} preemptions, {} busy / {} idle cycles",
            outcome.finished_at,
            outcome.ticks,
            outcome.preemptions,
            outcome.busy_cycles,
            outcome.idle_cycles
        );
        Ok(outcome)
    }

    /// Run `runtime` for up to `slice` cycles. Returns the cycles used and
    /// whether the workload completed.
    fn execute<W: Workload>(&self, runtime: &mut TaskRuntime<'_, W>, slice: u64) -> Result<(u64, bool)> {
        if runtime.is_finished() {
            return Ok((0, true));
        }
        let mut used = 0;
        while used < slice {
            let step = self.config.sample_cost.min(slice - used);
            let now = self.clock.advance(step);
            used += step;
            if runtime.poll(now)? == Progress::Completed {
                debug!("task {} finished its workload at {}", runtime.id(), now);
                return Ok((used, true));
            }
        }
        Ok((used, false))
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::runtime::{PreemptionProbe, WorkloadStatus};
    use crate::supervisor::InProcessHost;
    use crate::sync::CompletionQueue;
    use crate::task::TaskState;

    #[test]
    fn test_single_task_runs_to_completion() {
        let queue = CompletionQueue::new();
        let mut sup = Supervisor::new(InProcessHost, &queue);
        let handle = sup.create_task_set(&[5], &[1_000], &[10_000]).unwrap();
        sup.start(handle, 0).unwrap();

        let config = RuntimeConfig { slack_cycles: 700, epochs: 3 };
        let mut runtimes = [TaskRuntime::new(0, PreemptionProbe::new(&config), &queue)];
        let mut sim = Simulation::new(SimConfig::default());
        let outcome = sim.run(&mut sup, &mut runtimes).unwrap();

        assert!(outcome.finished);
        assert_eq!(outcome.max_running, 1);
        // Three gaps need the start of the fourth period.
        assert_eq!(outcome.finished_at, 30_100);
        assert_eq!(outcome.busy_cycles, 3_100);

        let report = sup.utilization_report(handle).unwrap();
        let t0 = report.get(0).unwrap();
        assert_eq!(t0.state, TaskState::Terminated);
        assert_eq!(t0.epochs.len(), 3);
        assert_eq!(t0.budget_exhaustions, 3);
        assert_eq!(t0.starved_periods, 0);
    }

    #[test]
    fn test_horizon_stops_endless_workload() {
        let queue = CompletionQueue::new();
        let mut sup = Supervisor::new(InProcessHost, &queue);
        let handle = sup.create_task_set(&[5], &[500], &[1_000]).unwrap();
        sup.start(handle, 0).unwrap();

        let mut runtimes = [TaskRuntime::new(0, |_: u64| WorkloadStatus::Continue, &queue)];
        let mut sim = Simulation::new(SimConfig { horizon: 10_000, ..SimConfig::new() });
        let outcome = sim.run(&mut sup, &mut runtimes).unwrap();

        assert!(!outcome.finished);
        assert_eq!(outcome.finished_at, 10_000);
        assert_eq!(outcome.busy_cycles, 5_000);
        assert_eq!(outcome.idle_cycles, 5_000);
    }

    #[test]
    fn test_missing_runtime_is_an_error() {
        let queue = CompletionQueue::new();
        let mut sup = Supervisor::new(InProcessHost, &queue);
        let handle = sup.create_task_set(&[5, 6], &[10, 10], &[100, 100]).unwrap();
        sup.start(handle, 0).unwrap();

        let mut runtimes = [TaskRuntime::new(0, |_: u64| WorkloadStatus::Continue, &queue)];
        let mut sim = Simulation::new(SimConfig::default());
        assert_eq!(sim.run(&mut sup, &mut runtimes), Err(Error::UnknownTask(1)));
    }
}
