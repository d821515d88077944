//! # Supervisor
//!
//! Top-level boundary of the scheduling core: builds the task set, starts
//! it, collects completion handshakes and produces the end-of-run report.
//!
//! Resource setup the core cannot do itself (memory and capabilities,
//! address-space mappings, thread-local storage) is delegated to a
//! [`TaskHost`].
//!
//! ## Run Sequence
//!
//! ```text
//! Supervisor::new(host, &COMPLETIONS)
//!   ├─► create_task_set()   ← validate, register, feasibility verdict
//!   ├─► start()             ← TaskHost::prepare + release per task
//!   ├─► … scheduler ticks, runtimes execute …
//!   ├─► poll_completions()  ← one TaskCompleted per task, ack by suspend
//!   └─► utilization_report()
//! ```

use log::{info, warn};

use crate::accountant::{SampleWindow, TaskUsage};
use crate::config::MAX_TASKS;
use crate::error::{ConfigError, Error, ResourceKind, Result};
use crate::feasibility::FeasibilityReport;
use crate::runtime::TaskCompleted;
use crate::scheduler::Scheduler;
use crate::sync::CompletionQueue;
use crate::task::{TaskConfig, TaskId, TaskState};

// ---------------------------------------------------------------------------
// Host environment
// ---------------------------------------------------------------------------

/// Resource setup for tasks, supplied by the execution environment.
pub trait TaskHost {
    /// Provide everything task `id` needs before its first release.
    fn prepare(&mut self, id: TaskId, config: &TaskConfig) -> core::result::Result<(), ResourceKind>;

    /// Release whatever `prepare` set up. Called once the task is retired.
    fn teardown(&mut self, _id: TaskId) {}
}

/// Host with nothing to set up: tasks run in-process.
#[derive(Debug, Default, Clone, Copy)]
pub struct InProcessHost;

impl TaskHost for InProcessHost {
    fn prepare(&mut self, _id: TaskId, _config: &TaskConfig) -> core::result::Result<(), ResourceKind> {
        Ok(())
    }
}

/// Opaque reference to the registered task set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskSetHandle(u32);

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// End-of-run figures for one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskReport {
    pub task: TaskId,
    pub config: TaskConfig,
    pub state: TaskState,
    /// Epochs the task reported in its completion message.
    pub epochs: SampleWindow,
    /// Utilisation as the task measured it from its own epochs.
    pub measured_percent: Option<u64>,
    /// Utilisation as the budget accountant charged it.
    pub usage: TaskUsage,
    pub preemptions: u32,
    pub budget_exhaustions: u32,
    pub periods: u64,
    pub starved_periods: u64,
}

impl TaskReport {
    pub fn utilization_percent(&self) -> u64 {
        self.usage.utilization_percent()
    }

    /// The share the task was configured for.
    pub fn configured_ppm(&self) -> u64 {
        self.config.utilization_ppm()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UtilizationReport {
    /// Scheduler time the report was taken at.
    pub now: u64,
    pub feasibility: FeasibilityReport,
    entries: [Option<TaskReport>; MAX_TASKS],
    len: usize,
}

impl UtilizationReport {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, id: TaskId) -> Option<&TaskReport> {
        self.entries.get(id)?.as_ref()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskReport> {
        self.entries[..self.len].iter().flatten()
    }
}

// ---------------------------------------------------------------------------
// Supervisor
// ---------------------------------------------------------------------------

pub struct Supervisor<'q, H> {
    scheduler: Scheduler,
    host: H,
    completions: &'q CompletionQueue,
    handle: Option<TaskSetHandle>,
    next_handle: u32,
    started: [bool; MAX_TASKS],
    acknowledged: [bool; MAX_TASKS],
    /// `teardown` already ran for the task.
    released: [bool; MAX_TASKS],
    completed: [Option<TaskCompleted>; MAX_TASKS],
}

impl<'q, H: TaskHost> Supervisor<'q, H> {
    pub fn new(host: H, completions: &'q CompletionQueue) -> Self {
        Self {
            scheduler: Scheduler::new(),
            host,
            completions,
            handle: None,
            next_handle: 1,
            started: [false; MAX_TASKS],
            acknowledged: [false; MAX_TASKS],
            released: [false; MAX_TASKS],
            completed: [None; MAX_TASKS],
        }
    }

    /// Build and register a task set from parallel parameter lists.
    /// Task `i` gets `priorities[i]`, `budgets[i]` and `periods[i]`.
    pub fn create_task_set(
        &mut self,
        priorities: &[u32],
        budgets: &[u64],
        periods: &[u64],
    ) -> Result<TaskSetHandle> {
        let count = priorities.len();
        if budgets.len() != count || periods.len() != count {
            return Err(ConfigError::LengthMismatch {
                priorities: count,
                budgets: budgets.len(),
                periods: periods.len(),
            }
            .into());
        }
        if count > MAX_TASKS {
            return Err(ConfigError::TooManyTasks { count, max: MAX_TASKS }.into());
        }

        let mut set = [TaskConfig::new(0, 0, 0); MAX_TASKS];
        for (i, slot) in set[..count].iter_mut().enumerate() {
            *slot = TaskConfig::new(priorities[i], budgets[i], periods[i]);
        }
        self.scheduler.register(&set[..count])?;

        let handle = TaskSetHandle(self.next_handle);
        self.next_handle += 1;
        self.handle = Some(handle);
        Ok(handle)
    }

    /// Prepare and release every task of the set at `now`.
    ///
    /// A task whose resources cannot be set up is suspended before it ever
    /// runs; the others are released regardless. The first failure is
    /// returned so the caller can decide whether to [`abort`](Self::abort).
    pub fn start(&mut self, handle: TaskSetHandle, now: u64) -> Result<()> {
        self.check(handle)?;

        let mut first_failure = None;
        let count = self.scheduler.tasks().len();
        for id in 0..count {
            let task = self.scheduler.tasks()[id];
            if task.state != TaskState::Created {
                info!("task {} is {:?}, not starting it", id, task.state);
                continue;
            }
            let config = task.config;
            match self.host.prepare(id, &config) {
                Ok(()) => {
                    self.scheduler.activate(id, now)?;
                    self.started[id] = true;
                }
                Err(kind) => {
                    warn!("task {}: failed to set up {}, not starting it", id, kind);
                    self.scheduler.suspend(id, now)?;
                    first_failure.get_or_insert(Error::Resource { task: id, kind });
                }
            }
        }

        let started = self.started.iter().filter(|s| **s).count();
        info!("started {} of {} tasks at {}", started, count, now);
        match first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Drain the completion channel, acknowledging each finished task by
    /// suspending it. Returns the number of tasks acknowledged.
    pub fn poll_completions(&mut self, now: u64) -> usize {
        let mut acknowledged = 0;
        while let Some(msg) = self.completions.try_recv() {
            let id = msg.task;
            if !self.started.get(id).copied().unwrap_or(false) {
                warn!("completion from unknown task {} ignored", id);
                continue;
            }
            if self.acknowledged[id] {
                warn!("duplicate completion from task {} ignored", id);
                continue;
            }

            if self.scheduler.task(id).is_some_and(|t| t.is_live()) {
                // The runtime finished but the host did not retire it yet.
                if let Err(err) = self.scheduler.complete(id, now) {
                    warn!("task {}: could not retire on completion: {}", id, err);
                }
            }
            if let Err(err) = self.scheduler.suspend(id, now) {
                warn!("task {}: could not acknowledge completion: {}", id, err);
                continue;
            }
            self.release(id);
            self.acknowledged[id] = true;
            self.completed[id] = Some(msg);
            acknowledged += 1;
            info!("task {} acknowledged with {} epochs", id, msg.epochs.len());
        }
        acknowledged
    }

    /// Every started task has completed and been acknowledged.
    pub fn is_finished(&self) -> bool {
        self.started.iter().any(|s| *s)
            && self
                .started
                .iter()
                .zip(self.acknowledged.iter())
                .all(|(started, acked)| !started || *acked)
    }

    /// Force task `id` out of scheduling immediately. A task that was
    /// started is torn down once, however often it is suspended.
    pub fn suspend(&mut self, id: TaskId, now: u64) -> Result<()> {
        self.scheduler.suspend(id, now)?;
        self.release(id);
        Ok(())
    }

    /// Tear down what `start` prepared for `id`, at most once.
    fn release(&mut self, id: TaskId) {
        if self.started[id] && !self.released[id] {
            self.host.teardown(id);
            self.released[id] = true;
        }
    }

    /// Suspend every task that is still live.
    pub fn abort(&mut self, now: u64) {
        let count = self.scheduler.tasks().len();
        for id in 0..count {
            if self.scheduler.tasks()[id].is_live() {
                let _ = self.suspend(id, now);
            }
        }
        warn!("run aborted at {}", now);
    }

    /// Per-task epochs and utilisation. Read-only: two calls without a tick
    /// in between return identical reports.
    pub fn utilization_report(&self, handle: TaskSetHandle) -> Result<UtilizationReport> {
        self.check(handle)?;
        let snapshot = self.scheduler.snapshot();
        let feasibility = self.scheduler.feasibility().ok_or(Error::NotRegistered)?;

        let mut entries = [None; MAX_TASKS];
        for task in snapshot.tasks() {
            let completed = self.completed[task.id];
            entries[task.id] = Some(TaskReport {
                task: task.id,
                config: task.config,
                state: task.state,
                epochs: completed.map(|c| c.epochs).unwrap_or_default(),
                measured_percent: completed.and_then(|c| c.measured_utilization_percent()),
                usage: snapshot.usage(task.id).unwrap_or_default(),
                preemptions: task.preemptions,
                budget_exhaustions: task.budget_exhaustions,
                periods: task.periods,
                starved_periods: task.starved_periods,
            });
        }

        Ok(UtilizationReport {
            now: snapshot.now,
            feasibility,
            entries,
            len: snapshot.tasks().len(),
        })
    }

    fn check(&self, handle: TaskSetHandle) -> Result<()> {
        match self.handle {
            Some(h) if h == handle => Ok(()),
            _ => Err(Error::UnknownTaskSet),
        }
    }

    pub fn handle(&self) -> Option<TaskSetHandle> {
        self.handle
    }

    pub fn feasibility(&self) -> Option<FeasibilityReport> {
        self.scheduler.feasibility()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn completions(&self) -> &'q CompletionQueue {
        self.completions
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accountant::Epoch;

    const PRIORITIES: [u32; 3] = [42, 41, 40];
    const BUDGETS: [u64; 3] = [90_000, 60_000, 10_000];
    const PERIODS: [u64; 3] = [200_000, 250_000, 300_000];

    /// Host that fails to map one task and records teardowns.
    #[derive(Default)]
    struct FlakyHost {
        fail: Option<TaskId>,
        torn_down: [bool; MAX_TASKS],
    }

    impl TaskHost for FlakyHost {
        fn prepare(&mut self, id: TaskId, _config: &TaskConfig) -> core::result::Result<(), ResourceKind> {
            if self.fail == Some(id) {
                Err(ResourceKind::Mapping)
            } else {
                Ok(())
            }
        }

        fn teardown(&mut self, id: TaskId) {
            self.torn_down[id] = true;
        }
    }

    /// Host that counts every prepare and teardown per task.
    #[derive(Default)]
    struct CountingHost {
        prepared: [u32; MAX_TASKS],
        torn_down: [u32; MAX_TASKS],
    }

    impl TaskHost for CountingHost {
        fn prepare(&mut self, id: TaskId, _config: &TaskConfig) -> core::result::Result<(), ResourceKind> {
            self.prepared[id] += 1;
            Ok(())
        }

        fn teardown(&mut self, id: TaskId) {
            self.torn_down[id] += 1;
        }
    }

    fn completed(task: TaskId, finished_at: u64) -> TaskCompleted {
        let mut epochs = SampleWindow::new();
        epochs.push(Epoch { start: 0, consumed: finished_at / 2 });
        TaskCompleted { task, epochs, finished_at }
    }

    #[test]
    fn test_create_and_start() {
        let queue = CompletionQueue::new();
        let mut sup = Supervisor::new(InProcessHost, &queue);
        let handle = sup.create_task_set(&PRIORITIES, &BUDGETS, &PERIODS).unwrap();
        assert!(sup.feasibility().unwrap().is_schedulable());

        sup.start(handle, 0).unwrap();
        assert!(sup.scheduler().tasks().iter().all(|t| t.state == TaskState::Runnable));
        assert!(!sup.is_finished());
    }

    #[test]
    fn test_create_rejects_bad_input() {
        let queue = CompletionQueue::new();
        let mut sup = Supervisor::new(InProcessHost, &queue);
        assert!(matches!(
            sup.create_task_set(&PRIORITIES, &BUDGETS[..2], &PERIODS),
            Err(Error::Configuration(ConfigError::LengthMismatch { .. }))
        ));
        assert_eq!(
            sup.create_task_set(&[], &[], &[]),
            Err(Error::Configuration(ConfigError::EmptyTaskSet))
        );
        assert!(matches!(
            sup.create_task_set(&[1; 9], &[1; 9], &[2; 9]),
            Err(Error::Configuration(ConfigError::TooManyTasks { count: 9, .. }))
        ));

        let handle = sup.create_task_set(&PRIORITIES, &BUDGETS, &PERIODS).unwrap();
        assert_eq!(
            sup.create_task_set(&PRIORITIES, &BUDGETS, &PERIODS),
            Err(Error::AlreadyRegistered)
        );
        assert_eq!(sup.handle(), Some(handle));
    }

    #[test]
    fn test_unknown_handle() {
        let queue = CompletionQueue::new();
        let mut sup = Supervisor::new(InProcessHost, &queue);
        assert_eq!(sup.start(TaskSetHandle(7), 0), Err(Error::UnknownTaskSet));
        assert!(sup.utilization_report(TaskSetHandle(7)).is_err());
    }

    #[test]
    fn test_resource_failure_only_stops_that_task() {
        let queue = CompletionQueue::new();
        let host = FlakyHost { fail: Some(1), ..FlakyHost::default() };
        let mut sup = Supervisor::new(host, &queue);
        let handle = sup.create_task_set(&PRIORITIES, &BUDGETS, &PERIODS).unwrap();

        assert_eq!(
            sup.start(handle, 0),
            Err(Error::Resource { task: 1, kind: ResourceKind::Mapping })
        );
        let tasks = sup.scheduler().tasks();
        assert_eq!(tasks[0].state, TaskState::Runnable);
        assert_eq!(tasks[1].state, TaskState::Suspended);
        assert_eq!(tasks[2].state, TaskState::Runnable);

        // Finishing needs only the tasks that actually started.
        queue.send(completed(0, 100)).unwrap();
        queue.send(completed(2, 100)).unwrap();
        assert_eq!(sup.poll_completions(100), 2);
        assert!(sup.is_finished());
    }

    #[test]
    fn test_completion_handshake() {
        let queue = CompletionQueue::new();
        let mut sup = Supervisor::new(FlakyHost::default(), &queue);
        let handle = sup.create_task_set(&PRIORITIES, &BUDGETS, &PERIODS).unwrap();
        sup.start(handle, 0).unwrap();

        queue.send(completed(2, 1_000)).unwrap();
        queue.send(completed(2, 1_000)).unwrap(); // duplicate
        queue.send(completed(6, 1_000)).unwrap(); // unknown
        assert_eq!(sup.poll_completions(1_000), 1);
        assert_eq!(sup.scheduler().tasks()[2].state, TaskState::Terminated);
        assert!(sup.host().torn_down[2]);
        assert!(!sup.is_finished());

        queue.send(completed(0, 2_000)).unwrap();
        queue.send(completed(1, 3_000)).unwrap();
        assert_eq!(sup.poll_completions(3_000), 2);
        assert!(sup.is_finished());

        let report = sup.utilization_report(handle).unwrap();
        assert_eq!(report.len(), 3);
        let t1 = report.get(1).unwrap();
        assert_eq!(t1.epochs.len(), 1);
        assert_eq!(t1.measured_percent, Some(50));
    }

    #[test]
    fn test_report_is_idempotent() {
        let queue = CompletionQueue::new();
        let mut sup = Supervisor::new(InProcessHost, &queue);
        let handle = sup.create_task_set(&PRIORITIES, &BUDGETS, &PERIODS).unwrap();
        sup.start(handle, 0).unwrap();
        let running = sup.scheduler_mut().tick(0).unwrap();
        sup.scheduler_mut().observe(running, 5_000);
        sup.scheduler_mut().tick(10_000);

        let a = sup.utilization_report(handle).unwrap();
        let b = sup.utilization_report(handle).unwrap();
        assert_eq!(a, b);
        let t0 = a.get(0).unwrap();
        assert_eq!(t0.usage.consumed, 5_000);
        assert_eq!(t0.usage.wall, 10_000);
        assert_eq!(t0.utilization_percent(), 50);
        assert_eq!(t0.configured_ppm(), 450_000);
        assert!(t0.epochs.is_empty());
    }

    #[test]
    fn test_abort_suspends_everything() {
        let queue = CompletionQueue::new();
        let mut sup = Supervisor::new(InProcessHost, &queue);
        let handle = sup.create_task_set(&PRIORITIES, &BUDGETS, &PERIODS).unwrap();
        sup.start(handle, 0).unwrap();
        sup.scheduler_mut().tick(0);
        sup.abort(50);
        assert!(!sup.scheduler().has_live_tasks());
        assert_eq!(sup.scheduler_mut().tick(100), None);
    }

    #[test]
    fn test_task_suspended_before_start_is_skipped() {
        let queue = CompletionQueue::new();
        let mut sup = Supervisor::new(CountingHost::default(), &queue);
        let handle = sup.create_task_set(&PRIORITIES, &BUDGETS, &PERIODS).unwrap();

        sup.suspend(0, 0).unwrap();
        sup.start(handle, 0).unwrap();

        let states: Vec<_> = sup.scheduler().tasks().iter().map(|t| t.state).collect();
        assert_eq!(states, [TaskState::Suspended, TaskState::Runnable, TaskState::Runnable]);
        assert_eq!(sup.host().prepared[..3], [0, 1, 1]);
        assert_eq!(sup.host().torn_down[0], 0);

        queue.send(completed(1, 100)).unwrap();
        queue.send(completed(2, 100)).unwrap();
        assert_eq!(sup.poll_completions(100), 2);
        assert!(sup.is_finished());
    }

    #[test]
    fn test_teardown_runs_once_per_started_task() {
        let queue = CompletionQueue::new();
        let mut sup = Supervisor::new(CountingHost::default(), &queue);
        let handle = sup.create_task_set(&PRIORITIES, &BUDGETS, &PERIODS).unwrap();

        // Never prepared, so nothing to tear down.
        sup.suspend(1, 0).unwrap();
        assert_eq!(sup.host().torn_down[1], 0);
        sup.start(handle, 0).unwrap();
        assert_eq!(sup.host().prepared[..3], [1, 0, 1]);

        // Acknowledged first, suspended afterwards.
        queue.send(completed(0, 1_000)).unwrap();
        assert_eq!(sup.poll_completions(1_000), 1);
        sup.suspend(0, 1_100).unwrap();
        assert_eq!(sup.host().torn_down[0], 1);

        // Suspended while live, completion arrives afterwards.
        sup.suspend(2, 1_200).unwrap();
        queue.send(completed(2, 1_300)).unwrap();
        assert_eq!(sup.poll_completions(1_300), 1);
        sup.suspend(2, 1_400).unwrap();

        assert_eq!(sup.host().torn_down[..3], [1, 0, 1]);
        assert!(sup.is_finished());
    }
}
