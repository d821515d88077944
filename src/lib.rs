//! # MCSched: Budget-Enforced Rate-Monotonic Scheduling
//!
//! A fixed-priority preemptive scheduling core for periodic real-time tasks
//! on a single processor, with per-task execution budgets enforced every
//! period.
//!
//! ## Overview
//!
//! Each task declares a priority, a budget and a period. Budgets are
//! replenished at every period boundary; a task that has used its budget is
//! preempted and stays off the CPU until its next boundary, so a misbehaving
//! task can never steal time reserved for others. Among the tasks that still
//! have budget, the highest priority always runs.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │              Supervisor (supervisor.rs)                 │
//! │  create_task_set() · start() · poll_completions()      │
//! │  utilization_report() · abort()                        │
//! ├──────────────┬────────────────────┬───────────────────┤
//! │  Scheduler   │  Budget Accountant │  Task Runtime     │
//! │  scheduler.rs│  accountant.rs     │  runtime.rs       │
//! │  ─ tick()    │  ─ observe()       │  ─ poll() / run() │
//! │  ─ observe() │  ─ GapDetector     │  ─ PreemptionProbe│
//! │  ─ complete()│  ─ SampleWindow    │  ─ TaskCompleted ─┼──► sync.rs
//! ├──────────────┴────────────────────┴───────────────────┤
//! │      Task Model (task.rs) · Feasibility (feasibility.rs)│
//! │    TCB · TaskState · TaskConfig · Liu & Layland bound   │
//! ├────────────────────────────────────────────────────────┤
//! │  Cycle Clock (clock.rs)                                 │
//! │    SimClock (sim.rs) · MonotonicClock · DwtClock (arch) │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Scheduling Rules
//!
//! 1. Eligible = live (`Runnable`, `Running` or `Preempted`) with budget left
//! 2. The eligible task with the highest priority number runs
//! 3. At most one task is `Running` at any instant
//! 4. Consumption within a period never exceeds the budget
//! 5. A task with `budget == period` is not budget-limited and can only be
//!    preempted by a higher priority
//!
//! Registration checks the task set against the Liu & Layland bound
//! `n·(2^(1/n) − 1)`. The verdict is advisory: a set above the bound is
//! still accepted, with a warning.
//!
//! ## Memory Model
//!
//! - **No heap**: all state lives in fixed arrays of `MAX_TASKS` entries
//! - **`no_std`** when built without the default `std` feature
//! - **Critical sections**: `critical_section::with()` guards the completion
//!   channel; single-core `cortex-m` on ARM, `std` on hosted targets

#![cfg_attr(not(feature = "std"), no_std)]

pub mod accountant;
pub mod arch;
pub mod clock;
pub mod config;
pub mod error;
pub mod feasibility;
pub mod runtime;
pub mod scheduler;
pub mod sim;
pub mod supervisor;
pub mod sync;
pub mod task;

pub use error::{ConfigError, Error, Result};
pub use scheduler::Scheduler;
pub use supervisor::{Supervisor, TaskSetHandle};
pub use task::{TaskConfig, TaskId, TaskState};
