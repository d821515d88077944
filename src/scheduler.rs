//! # Scheduler
//!
//! Fixed-priority, budget-enforced preemptive scheduler for periodic tasks
//! sharing one processor.
//!
//! ## Scheduling Algorithm
//!
//! On every `tick(now)`:
//! 1. **Replenish**: every live task whose period boundary has passed gets its
//!    full budget back and its next boundary moved one period out
//! 2. **Select**: the highest-priority live task that still has budget
//!    (ties, impossible in a validated set, go to the lowest id)
//! 3. **Switch**: if the selection differs from the running task, the running
//!    task moves to `Preempted` and the selection to `Running`
//!
//! Between ticks, execution is charged through [`Scheduler::observe`]. When
//! a budget-limited task runs dry it is preempted immediately and stays
//! ineligible until its next boundary, even if nothing else is ready. That
//! bounds the interference any single task can cause.
//!
//! ## Ownership
//!
//! The scheduler exclusively owns the TCB arena. `tick`, `observe`,
//! `register`, `activate`, `complete` and `suspend` take `&mut self`, so
//! mutation is single-writer by construction; readers get a `Copy`
//! [`SchedulerSnapshot`].

use log::{debug, info, trace, warn};

use crate::accountant::{self, BudgetAccountant, Charge, TaskUsage};
use crate::config::MAX_TASKS;
use crate::error::{ConfigError, Error, Result};
use crate::feasibility::{self, Feasibility, FeasibilityReport};
use crate::task::{TaskConfig, TaskControlBlock, TaskId, TaskState};

// ---------------------------------------------------------------------------
// Scheduler struct
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Scheduler {
    /// TCB arena, indexed by task id. Only the first `task_count` are used.
    tasks: [TaskControlBlock; MAX_TASKS],
    task_count: usize,

    /// Task currently in the `Running` state.
    current: Option<TaskId>,

    /// Verdict computed at registration; `None` until registered.
    feasibility: Option<FeasibilityReport>,

    /// Latest clock value seen. Ticks never move it backwards.
    now: u64,
    tick_count: u64,
    preemptions: u64,
}

impl Scheduler {
    pub const fn new() -> Self {
        Self {
            tasks: [TaskControlBlock::EMPTY; MAX_TASKS],
            task_count: 0,
            current: None,
            feasibility: None,
            now: 0,
            tick_count: 0,
            preemptions: 0,
        }
    }

    /// Register the task set.
    ///
    /// Validates every task, rejects duplicate priorities, and returns the
    /// rate-monotonic verdict. The verdict is advisory: a `PossiblyInfeasible`
    /// set is still registered.
    pub fn register(&mut self, set: &[TaskConfig]) -> Result<FeasibilityReport> {
        if self.feasibility.is_some() {
            return Err(Error::AlreadyRegistered);
        }
        validate_set(set)?;

        for (id, config) in set.iter().enumerate() {
            self.tasks[id] = TaskControlBlock::new(id, *config);
        }
        self.task_count = set.len();

        let report = feasibility::analyze(set);
        self.feasibility = Some(report);

        match report.verdict {
            Feasibility::Schedulable => info!(
                "registered {} tasks, utilization {} ppm within rate-monotonic bound {} ppm",
                set.len(),
                report.utilization_ppm,
                report.bound_ppm
            ),
            Feasibility::PossiblyInfeasible => warn!(
                "registered {} tasks, utilization {} ppm above rate-monotonic bound {} ppm; \
                 lower-priority progress is not guaranteed",
                set.len(),
                report.utilization_ppm,
                report.bound_ppm
            ),
        }
        Ok(report)
    }

    /// Release task `id` at `now`: `Created` → `Runnable`.
    pub fn activate(&mut self, id: TaskId, now: u64) -> Result<()> {
        let task = self.task_mut(id)?;
        if task.state != TaskState::Created {
            return Err(Error::InvalidTransition { task: id, from: task.state, to: TaskState::Runnable });
        }
        task.release(now);
        self.now = self.now.max(now);
        debug!("task {} released at {}", id, now);
        Ok(())
    }

    /// Advance the scheduler to `now` and return the task that should run.
    ///
    /// Total over every reachable state: never fails, never panics on
    /// well-formed input. A `now` older than a previous tick is treated as the
    /// previous tick.
    pub fn tick(&mut self, now: u64) -> Option<TaskId> {
        let now = now.max(self.now);
        self.now = now;
        self.tick_count += 1;

        for task in self.tasks[..self.task_count].iter_mut() {
            let crossed = task.replenish(now);
            if crossed > 0 {
                trace!(
                    "task {} replenished to {} at {} ({} boundary(s))",
                    task.id,
                    task.remaining_budget,
                    now,
                    crossed
                );
            }
        }

        let next = self.select();
        if next != self.current {
            self.switch_to(next);
        }
        next
    }

    /// Charge `delta` cycles of execution to `id`.
    ///
    /// A budget-limited task that runs dry is preempted on the spot.
    pub fn observe(&mut self, id: TaskId, delta: u64) -> Charge {
        let count = self.task_count;
        let charge = BudgetAccountant::new(&mut self.tasks[..count]).observe(id, delta);

        if let Charge::BudgetExhausted { overrun, .. } = charge {
            debug!(
                "task {} exhausted its budget at {} ({} cycles over), throttled until {}",
                id, self.now, overrun, self.tasks[id].next_release
            );
            if self.current == Some(id) {
                self.preempt_current();
            }
        }
        charge
    }

    /// Task `id` finished its workload: any live state → `Terminated`.
    pub fn complete(&mut self, id: TaskId, now: u64) -> Result<()> {
        let task = self.task_mut(id)?;
        if !task.is_live() {
            return Err(Error::InvalidTransition { task: id, from: task.state, to: TaskState::Terminated });
        }
        task.retire(TaskState::Terminated, now);
        if self.current == Some(id) {
            self.current = None;
        }
        info!("task {} terminated at {}", id, now);
        Ok(())
    }

    /// Control-plane stop: a live or not-yet-released task is suspended
    /// immediately. Already retired tasks are left untouched.
    pub fn suspend(&mut self, id: TaskId, now: u64) -> Result<()> {
        let task = self.task_mut(id)?;
        match task.state {
            TaskState::Terminated | TaskState::Suspended => return Ok(()),
            _ => task.retire(TaskState::Suspended, now),
        }
        if self.current == Some(id) {
            self.current = None;
        }
        debug!("task {} suspended at {}", id, now);
        Ok(())
    }

    /// Pick the highest-priority eligible task; lowest id breaks ties.
    fn select(&self) -> Option<TaskId> {
        self.tasks[..self.task_count]
            .iter()
            .filter(|t| t.is_eligible())
            .max_by(|a, b| {
                a.config
                    .priority
                    .cmp(&b.config.priority)
                    .then_with(|| b.id.cmp(&a.id))
            })
            .map(|t| t.id)
    }

    fn switch_to(&mut self, next: Option<TaskId>) {
        if self.current.is_some() {
            self.preempt_current();
        }
        if let Some(id) = next {
            let task = &mut self.tasks[id];
            task.state = TaskState::Running;
            task.dispatches += 1;
            trace!("task {} dispatched at {}", id, self.now);
        }
        self.current = next;
    }

    /// Move the running task to `Preempted`.
    fn preempt_current(&mut self) {
        let Some(id) = self.current.take() else {
            return;
        };
        let task = &mut self.tasks[id];
        if task.state == TaskState::Running {
            task.state = TaskState::Preempted;
            task.preemptions += 1;
            self.preemptions += 1;
            debug!("task {} preempted at {}", id, self.now);
        }
    }

    fn task_mut(&mut self, id: TaskId) -> Result<&mut TaskControlBlock> {
        if id >= self.task_count {
            return Err(Error::UnknownTask(id));
        }
        Ok(&mut self.tasks[id])
    }

    // -----------------------------------------------------------------------
    // Read-only accessors
    // -----------------------------------------------------------------------

    pub fn is_registered(&self) -> bool {
        self.feasibility.is_some()
    }

    pub fn feasibility(&self) -> Option<FeasibilityReport> {
        self.feasibility
    }

    pub fn current(&self) -> Option<TaskId> {
        self.current
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Preemptions across all tasks since registration.
    pub fn preemptions(&self) -> u64 {
        self.preemptions
    }

    pub fn tasks(&self) -> &[TaskControlBlock] {
        &self.tasks[..self.task_count]
    }

    pub fn task(&self, id: TaskId) -> Option<&TaskControlBlock> {
        self.tasks().get(id)
    }

    /// Tasks currently in the `Running` state. Never more than one.
    pub fn running_count(&self) -> usize {
        self.tasks().iter().filter(|t| t.state == TaskState::Running).count()
    }

    /// Whether any task is still schedulable.
    pub fn has_live_tasks(&self) -> bool {
        self.tasks().iter().any(TaskControlBlock::is_live)
    }

    /// Earliest period boundary of any live task.
    pub fn next_release(&self) -> Option<u64> {
        self.tasks()
            .iter()
            .filter(|t| t.is_live())
            .map(|t| t.next_release)
            .min()
    }

    /// Accountant usage of `id` as of the latest tick.
    pub fn usage(&self, id: TaskId) -> Option<TaskUsage> {
        self.task(id).map(|t| accountant::usage(t, self.now))
    }

    /// Consistent copy of the scheduler state for reporting.
    pub fn snapshot(&self) -> SchedulerSnapshot {
        SchedulerSnapshot {
            tasks: self.tasks,
            task_count: self.task_count,
            current: self.current,
            now: self.now,
            tick_count: self.tick_count,
            preemptions: self.preemptions,
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSnapshot {
    tasks: [TaskControlBlock; MAX_TASKS],
    task_count: usize,
    pub current: Option<TaskId>,
    pub now: u64,
    pub tick_count: u64,
    pub preemptions: u64,
}

impl SchedulerSnapshot {
    pub fn tasks(&self) -> &[TaskControlBlock] {
        &self.tasks[..self.task_count]
    }

    pub fn usage(&self, id: TaskId) -> Option<TaskUsage> {
        self.tasks().get(id).map(|t| accountant::usage(t, self.now))
    }
}

/// Check a task set before any of it is installed.
fn validate_set(set: &[TaskConfig]) -> core::result::Result<(), ConfigError> {
    if set.is_empty() {
        return Err(ConfigError::EmptyTaskSet);
    }
    if set.len() > MAX_TASKS {
        return Err(ConfigError::TooManyTasks { count: set.len(), max: MAX_TASKS });
    }
    for (id, config) in set.iter().enumerate() {
        config.validate(id)?;
        if let Some(first) = set[..id].iter().position(|c| c.priority == config.priority) {
            return Err(ConfigError::DuplicatePriority {
                first,
                second: id,
                priority: config.priority,
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
