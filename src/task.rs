//! # Task Control Block
//!
//! Defines the periodic task model. Each task is bound to a fixed priority,
//! a recurring execution budget and the period over which that budget
//! refills. The scheduler owns every TCB; the budget accountant borrows the
//! per-period budget fields to charge consumption against them.
//!
//! ## Periodic Budget Model
//!
//! ```text
//!   release          budget spent       next release
//!      │◄──── budget ────►│                   │
//!      ├──────────────────┼───────────────────┤
//!      │     runnable     │     throttled     │  (budget-limited task)
//!      └──────────────── period ──────────────┘
//! ```
//!
//! A task whose budget equals its period is never throttled; it can only be
//! displaced by a higher-priority task.

use crate::error::ConfigError;

/// Stable ordinal identifier: the task's index in registration order.
pub type TaskId = usize;

// ---------------------------------------------------------------------------
// Task state machine
// ---------------------------------------------------------------------------

/// Execution state of a task.
///
/// ```text
///   ┌─────────┐ activate ┌──────────┐ tick ┌─────────┐
///   │ Created │ ───────► │ Runnable │ ───► │ Running │ ◄─┐
///   └─────────┘          └──────────┘      └─────────┘   │ tick
///                                     preempt │   │      │
///                                             ▼   │ ┌───────────┐
///                                   ┌───────────┐ └►│ Preempted │
///                                   │Terminated │   └───────────┘
///                                   └───────────┘
///        suspend (control plane, from any live state) → Suspended
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Registered but not yet released by the supervisor.
    Created,
    /// Released and waiting for its first dispatch.
    Runnable,
    /// Currently executing. At most one task is in this state.
    Running,
    /// Displaced by a higher-priority task or by budget exhaustion.
    Preempted,
    /// Stopped by the supervisor; never scheduled again.
    Suspended,
    /// Finished its workload; never scheduled again.
    Terminated,
}

// ---------------------------------------------------------------------------
// Task configuration (immutable after registration)
// ---------------------------------------------------------------------------

/// Static scheduling parameters of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskConfig {
    /// Fixed priority. Higher value = more urgent.
    pub priority: u32,
    /// Cycles the task may consume per period.
    pub budget: u64,
    /// Cycles between budget replenishments.
    pub period: u64,
}

impl TaskConfig {
    pub const fn new(priority: u32, budget: u64, period: u64) -> Self {
        Self { priority, budget, period }
    }

    /// Whether the budget actually constrains the task within its period.
    #[inline]
    pub const fn is_budget_limited(&self) -> bool {
        self.budget < self.period
    }

    /// Share of the processor this task may claim, in parts per million,
    /// rounded up.
    pub fn utilization_ppm(&self) -> u64 {
        if self.period == 0 {
            return 0;
        }
        let scaled = self.budget as u128 * 1_000_000;
        let period = self.period as u128;
        ((scaled + period - 1) / period) as u64
    }

    /// Check the per-task invariants (`0 < budget ≤ period`).
    pub fn validate(&self, id: TaskId) -> Result<(), ConfigError> {
        if self.period == 0 {
            return Err(ConfigError::ZeroPeriod { task: id });
        }
        if self.budget == 0 {
            return Err(ConfigError::ZeroBudget { task: id });
        }
        if self.budget > self.period {
            return Err(ConfigError::BudgetExceedsPeriod {
                task: id,
                budget: self.budget,
                period: self.period,
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Task Control Block
// ---------------------------------------------------------------------------

/// Scheduler-side record of one task: its configuration, lifecycle state,
/// budget for the current period and the counters the reports are built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskControlBlock {
    pub id: TaskId,
    pub state: TaskState,
    pub config: TaskConfig,

    /// Cycles left in the current period.
    pub remaining_budget: u64,
    /// Timestamp of the next period boundary.
    pub next_release: u64,
    /// Timestamp of the first release, if the task was ever activated.
    pub released_at: Option<u64>,
    /// Timestamp the task stopped being schedulable (terminated or suspended).
    pub retired_at: Option<u64>,

    /// Cycles consumed over the task's whole life.
    pub consumed_total: u64,
    /// Cycles consumed since the last replenishment.
    pub consumed_in_period: u64,
    /// Completed periods.
    pub periods: u64,
    /// Completed periods in which the task received no execution at all.
    pub starved_periods: u64,

    /// Times the task was displaced while Running.
    pub preemptions: u32,
    /// Times the task ran its budget dry. Only counts as a preemption too
    /// when the task was Running at the time.
    pub budget_exhaustions: u32,
    /// Times the task was switched onto the CPU.
    pub dispatches: u32,
}

impl TaskControlBlock {
    pub const EMPTY: Self = Self {
        id: 0,
        state: TaskState::Created,
        config: TaskConfig::new(0, 0, 0),
        remaining_budget: 0,
        next_release: 0,
        released_at: None,
        retired_at: None,
        consumed_total: 0,
        consumed_in_period: 0,
        periods: 0,
        starved_periods: 0,
        preemptions: 0,
        budget_exhaustions: 0,
        dispatches: 0,
    };

    pub const fn new(id: TaskId, config: TaskConfig) -> Self {
        Self {
            id,
            config,
            remaining_budget: config.budget,
            ..Self::EMPTY
        }
    }

    /// Release the task at `now`: full budget, first boundary one period out.
    pub fn release(&mut self, now: u64) {
        self.state = TaskState::Runnable;
        self.remaining_budget = self.config.budget;
        self.consumed_in_period = 0;
        self.next_release = now.saturating_add(self.config.period);
        self.released_at = Some(now);
    }

    /// Take the task out of scheduling for good.
    pub fn retire(&mut self, state: TaskState, now: u64) {
        self.state = state;
        self.retired_at = Some(now);
    }

    /// Released and not yet terminated or suspended.
    #[inline]
    pub fn is_live(&self) -> bool {
        matches!(
            self.state,
            TaskState::Runnable | TaskState::Running | TaskState::Preempted
        )
    }

    #[inline]
    pub fn has_budget(&self) -> bool {
        !self.config.is_budget_limited() || self.remaining_budget > 0
    }

    /// Live and allowed to consume cycles in the current period.
    #[inline]
    pub fn is_eligible(&self) -> bool {
        self.is_live() && self.has_budget()
    }

    /// Refill the budget for every period boundary at or before `now`.
    ///
    /// Returns the number of boundaries crossed. Boundaries skipped over in a
    /// single call count as starved periods.
    pub fn replenish(&mut self, now: u64) -> u64 {
        if !self.is_live() || now < self.next_release {
            return 0;
        }
        let crossed = (now - self.next_release) / self.config.period + 1;
        self.periods += crossed;
        self.starved_periods += crossed - 1;
        if self.consumed_in_period == 0 {
            self.starved_periods += 1;
        }
        self.consumed_in_period = 0;
        self.remaining_budget = self.config.budget;
        self.next_release = self
            .next_release
            .saturating_add(crossed.saturating_mul(self.config.period));
        crossed
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
