//! # Budget Accountant
//!
//! Charges observed execution cycles against each task's budget for the
//! current period and reports when a budget runs dry. The accountant holds
//! no task state of its own: it borrows the scheduler's TCBs for the duration
//! of one observation.
//!
//! The module also carries the measurement side of accounting: the
//! [`GapDetector`] that infers preemptions from gaps between consecutive clock
//! samples, and the fixed-capacity [`SampleWindow`] the epochs land in. That
//! measurement is for external verification only and never feeds back into
//! scheduling decisions.

use crate::config::SAMPLE_WINDOW_CAPACITY;
use crate::task::{TaskControlBlock, TaskId, TaskState};

// ---------------------------------------------------------------------------
// Budget charging
// ---------------------------------------------------------------------------

/// Outcome of charging one observation to a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charge {
    /// Cycles were charged and budget remains.
    Consumed { charged: u64, remaining: u64 },
    /// The task's budget for this period is spent. `overrun` is the part of
    /// the observation that did not fit and was not charged.
    BudgetExhausted { charged: u64, overrun: u64 },
    /// The task is unknown or not live; nothing was charged.
    Ignored,
}

/// Borrowed view over the scheduler's TCBs that charges consumption.
pub struct BudgetAccountant<'a> {
    tasks: &'a mut [TaskControlBlock],
}

impl<'a> BudgetAccountant<'a> {
    pub fn new(tasks: &'a mut [TaskControlBlock]) -> Self {
        Self { tasks }
    }

    /// Charge `delta` cycles to `id` within its current period.
    ///
    /// Never charges beyond the remaining budget. A budget-limited task that
    /// reaches zero yields [`Charge::BudgetExhausted`]; a task whose budget
    /// equals its period is clamped the same way but never reported as
    /// exhausted.
    pub fn observe(&mut self, id: TaskId, delta: u64) -> Charge {
        let Some(task) = self.tasks.get_mut(id) else {
            return Charge::Ignored;
        };
        if !task.is_live() {
            return Charge::Ignored;
        }

        let charged = delta.min(task.remaining_budget);
        task.remaining_budget -= charged;
        task.consumed_in_period += charged;
        task.consumed_total += charged;
        assert!(
            task.consumed_in_period <= task.config.budget,
            "task {} consumed {} cycles against a budget of {}",
            id,
            task.consumed_in_period,
            task.config.budget
        );

        if task.config.is_budget_limited() && task.remaining_budget == 0 {
            task.budget_exhaustions += 1;
            Charge::BudgetExhausted { charged, overrun: delta - charged }
        } else {
            Charge::Consumed { charged, remaining: task.remaining_budget }
        }
    }

    /// Usage of `id` as of `now`.
    pub fn usage(&self, id: TaskId, now: u64) -> Option<TaskUsage> {
        self.tasks.get(id).map(|task| usage(task, now))
    }
}

/// Cycles a task consumed against the wall-clock cycles it was schedulable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TaskUsage {
    pub consumed: u64,
    /// Cycles from first release to retirement (or `now` if still live).
    pub wall: u64,
    pub utilization_ppm: u64,
}

impl TaskUsage {
    pub fn utilization_percent(&self) -> u64 {
        self.utilization_ppm / 10_000
    }
}

/// Compute the usage of a single task as of `now`.
pub fn usage(task: &TaskControlBlock, now: u64) -> TaskUsage {
    let Some(released) = task.released_at else {
        return TaskUsage::default();
    };
    let end = match task.state {
        TaskState::Terminated | TaskState::Suspended => task.retired_at.unwrap_or(now),
        _ => now,
    };
    let wall = end.saturating_sub(released);
    let utilization_ppm = if wall == 0 {
        0
    } else {
        (task.consumed_total as u128 * 1_000_000 / wall as u128) as u64
    };
    TaskUsage { consumed: task.consumed_total, wall, utilization_ppm }
}

// ---------------------------------------------------------------------------
// Sample window
// ---------------------------------------------------------------------------

/// One measured interval of uninterrupted execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Epoch {
    /// Timestamp of the epoch's first sample.
    pub start: u64,
    /// Cycles accumulated between samples closer together than the slack.
    pub consumed: u64,
}

/// Fixed-capacity, ordered record of epochs owned by one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleWindow {
    epochs: [Epoch; SAMPLE_WINDOW_CAPACITY],
    len: usize,
}

impl SampleWindow {
    pub const fn new() -> Self {
        Self {
            epochs: [Epoch { start: 0, consumed: 0 }; SAMPLE_WINDOW_CAPACITY],
            len: 0,
        }
    }

    /// Append `epoch`. Returns `false` and drops it if the window is full.
    pub fn push(&mut self, epoch: Epoch) -> bool {
        if self.is_full() {
            return false;
        }
        self.epochs[self.len] = epoch;
        self.len += 1;
        true
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == SAMPLE_WINDOW_CAPACITY
    }

    pub fn as_slice(&self) -> &[Epoch] {
        &self.epochs[..self.len]
    }

    pub fn iter(&self) -> core::slice::Iter<'_, Epoch> {
        self.as_slice().iter()
    }

    pub fn total_consumed(&self) -> u64 {
        self.iter().map(|e| e.consumed).sum()
    }

    /// Share of `[first epoch start, end)` spent executing, in percent
    /// (rounded down). `None` when the window is empty or the span is zero.
    pub fn utilization_percent(&self, end: u64) -> Option<u64> {
        let first = self.as_slice().first()?;
        let span = end.checked_sub(first.start).filter(|span| *span > 0)?;
        Some(self.total_consumed() * 100 / span)
    }
}

impl Default for SampleWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> IntoIterator for &'a SampleWindow {
    type Item = &'a Epoch;
    type IntoIter = core::slice::Iter<'a, Epoch>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// ---------------------------------------------------------------------------
// Gap detection
// ---------------------------------------------------------------------------

/// What one clock sample did to the current epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapEvent {
    /// First sample; the first epoch opens here.
    Started,
    /// The gap was below the slack and was added to the epoch.
    Accumulated,
    /// The gap exceeded the slack: the returned epoch is closed and a new one
    /// opens at this sample.
    EpochClosed(Epoch),
}

/// Infers preemption boundaries from consecutive clock samples.
///
/// A task that samples the clock in a tight loop sees small, regular
/// differences while it holds the CPU. A difference of at least `slack`
/// cycles means the task was descheduled in between.
#[derive(Debug, Clone, Copy)]
pub struct GapDetector {
    slack: u64,
    prev: Option<u64>,
    epoch_start: u64,
    consumed: u64,
}

impl GapDetector {
    pub const fn new(slack: u64) -> Self {
        Self { slack, prev: None, epoch_start: 0, consumed: 0 }
    }

    pub fn sample(&mut self, now: u64) -> GapEvent {
        let Some(prev) = self.prev.replace(now) else {
            self.epoch_start = now;
            return GapEvent::Started;
        };

        let diff = now.saturating_sub(prev);
        if diff < self.slack {
            self.consumed += diff;
            return GapEvent::Accumulated;
        }

        let closed = Epoch { start: self.epoch_start, consumed: self.consumed };
        self.epoch_start = now;
        self.consumed = 0;
        GapEvent::EpochClosed(closed)
    }

    /// The open epoch so far.
    pub fn current(&self) -> Option<Epoch> {
        self.prev.map(|_| Epoch { start: self.epoch_start, consumed: self.consumed })
    }

    pub fn last_sample(&self) -> Option<u64> {
        self.prev
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
