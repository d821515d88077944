//! # Errors
//!
//! Typed failures surfaced to the Supervisor boundary. Scheduling events
//! (budget exhaustion) are not errors and live in [`crate::accountant::Charge`];
//! broken internal invariants are assertions, not variants here.

use core::fmt;

use crate::task::{TaskId, TaskState};

/// A malformed task set or runtime configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// The task set contains no tasks.
    EmptyTaskSet,
    /// More tasks than [`crate::config::MAX_TASKS`].
    TooManyTasks { count: usize, max: usize },
    /// Priority, budget and period lists differ in length.
    LengthMismatch { priorities: usize, budgets: usize, periods: usize },
    ZeroPeriod { task: TaskId },
    ZeroBudget { task: TaskId },
    /// A task asks for more time per period than the period provides.
    BudgetExceedsPeriod { task: TaskId, budget: u64, period: u64 },
    /// Two tasks share a priority level.
    DuplicatePriority { first: TaskId, second: TaskId, priority: u32 },
    /// Epoch target is zero or larger than the sample window.
    EpochsOutOfRange { requested: usize, capacity: usize },
    /// Preemption-detection threshold of zero cycles.
    ZeroSlack,
}

/// The external resource a [`crate::supervisor::TaskHost`] failed to provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Memory,
    Capability,
    Mapping,
    ThreadLocalStorage,
    Clock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    Configuration(ConfigError),
    /// `register` was called on a scheduler that already holds a task set.
    AlreadyRegistered,
    /// An operation needs a registered task set and there is none.
    NotRegistered,
    /// Task startup failed in the host environment.
    Resource { task: TaskId, kind: ResourceKind },
    UnknownTask(TaskId),
    UnknownTaskSet,
    /// The requested lifecycle transition is not allowed from `from`.
    InvalidTransition { task: TaskId, from: TaskState, to: TaskState },
    /// The completion channel had no room for this task's message.
    ChannelFull(TaskId),
}

pub type Result<T> = core::result::Result<T, Error>;

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Configuration(err)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::EmptyTaskSet => write!(f, "task set is empty"),
            ConfigError::TooManyTasks { count, max } => {
                write!(f, "task set has {} tasks, at most {} supported", count, max)
            }
            ConfigError::LengthMismatch { priorities, budgets, periods } => write!(
                f,
                "parameter lists differ in length: {} priorities, {} budgets, {} periods",
                priorities, budgets, periods
            ),
            ConfigError::ZeroPeriod { task } => write!(f, "task {} has a zero period", task),
            ConfigError::ZeroBudget { task } => write!(f, "task {} has a zero budget", task),
            ConfigError::BudgetExceedsPeriod { task, budget, period } => write!(
                f,
                "task {} budget {} exceeds its period {}",
                task, budget, period
            ),
            ConfigError::DuplicatePriority { first, second, priority } => write!(
                f,
                "tasks {} and {} share priority {}",
                first, second, priority
            ),
            ConfigError::EpochsOutOfRange { requested, capacity } => write!(
                f,
                "{} epochs requested, sample window holds 1..={}",
                requested, capacity
            ),
            ConfigError::ZeroSlack => write!(f, "preemption slack threshold must be non-zero"),
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Memory => "memory",
            ResourceKind::Capability => "capability",
            ResourceKind::Mapping => "address-space mapping",
            ResourceKind::ThreadLocalStorage => "thread-local storage",
            ResourceKind::Clock => "cycle clock",
        };
        f.write_str(name)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Configuration(err) => write!(f, "configuration error: {}", err),
            Error::AlreadyRegistered => write!(f, "a task set is already registered"),
            Error::NotRegistered => write!(f, "no task set registered"),
            Error::Resource { task, kind } => {
                write!(f, "task {}: failed to set up {}", task, kind)
            }
            Error::UnknownTask(id) => write!(f, "unknown task {}", id),
            Error::UnknownTaskSet => write!(f, "unknown task set handle"),
            Error::InvalidTransition { task, from, to } => {
                write!(f, "task {} cannot move from {:?} to {:?}", task, from, to)
            }
            Error::ChannelFull(id) => write!(f, "completion channel full, task {} dropped", id),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ConfigError {}

#[cfg(feature = "std")]
impl std::error::Error for Error {}
