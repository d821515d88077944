//! # MCSched Configuration
//!
//! Compile-time limits for the scheduling core plus the small runtime
//! configuration of the measurement workload. Everything that bounds memory
//! is fixed at compile time; nothing is allocated dynamically.

use crate::error::ConfigError;

/// Maximum number of tasks a single task set may contain.
/// This bounds the TCB array inside the scheduler and the report tables.
pub const MAX_TASKS: usize = 8;

/// Number of epochs a task's sample window can hold.
pub const SAMPLE_WINDOW_CAPACITY: usize = 30;

/// Default preemption-detection threshold in cycles. Two consecutive clock
/// samples further apart than this mean the task lost the CPU in between.
/// Platform and timer-resolution dependent; override via [`RuntimeConfig`].
pub const DEFAULT_SLACK_CYCLES: u64 = 700;

/// Cycles one iteration of the measurement loop costs in the simulated host.
pub const DEFAULT_SAMPLE_COST: u64 = 100;

/// Longest slice, in cycles, the simulated host runs before the next tick.
pub const DEFAULT_QUANTUM: u64 = 1_000;

/// Runtime parameters of the preemption-measurement workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Gap (in cycles) above which consecutive samples close an epoch.
    pub slack_cycles: u64,
    /// Epochs each task records before it reports completion.
    pub epochs: usize,
}

impl RuntimeConfig {
    pub const fn new() -> Self {
        Self {
            slack_cycles: DEFAULT_SLACK_CYCLES,
            epochs: SAMPLE_WINDOW_CAPACITY,
        }
    }

    /// Reject thresholds of zero and epoch targets the window cannot hold.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.slack_cycles == 0 {
            return Err(ConfigError::ZeroSlack);
        }
        if self.epochs == 0 || self.epochs > SAMPLE_WINDOW_CAPACITY {
            return Err(ConfigError::EpochsOutOfRange {
                requested: self.epochs,
                capacity: SAMPLE_WINDOW_CAPACITY,
            });
        }
        Ok(())
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::new()
    }
}
