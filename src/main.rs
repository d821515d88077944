//! # mcsched - Reference Workload Runner
//!
//! Host demo of the scheduling core. Builds a task set, runs every task's
//! preemption probe on the simulated host and prints the epochs each task
//! recorded together with the accountant's view of its utilisation.
//!
//! The default set is the three-task reference workload:
//!
//! | Task | Priority | Budget | Period  | Share |
//! |------|----------|--------|---------|-------|
//! | 0    | 42       | 90 000 | 200 000 | 45 %  |
//! | 1    | 41       | 60 000 | 250 000 | 24 %  |
//! | 2    | 40       | 10 000 | 300 000 | 3.3 % |

use std::str::FromStr;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;

use mcsched::accountant::Epoch;
use mcsched::clock::{CycleClock, MonotonicClock};
use mcsched::config::{
    RuntimeConfig, DEFAULT_QUANTUM, DEFAULT_SAMPLE_COST, DEFAULT_SLACK_CYCLES, SAMPLE_WINDOW_CAPACITY,
};
use mcsched::runtime::{PreemptionProbe, TaskRuntime};
use mcsched::sim::{SimConfig, Simulation, DEFAULT_HORIZON};
use mcsched::supervisor::{InProcessHost, Supervisor, UtilizationReport};
use mcsched::sync::CompletionQueue;
use mcsched::TaskId;

/// One `PRIO:BUDGET:PERIOD` triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TaskArg {
    priority: u32,
    budget: u64,
    period: u64,
}

impl FromStr for TaskArg {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut parts = s.split(':');
        let (Some(p), Some(b), Some(t), None) = (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(format!("expected PRIO:BUDGET:PERIOD, got `{}`", s));
        };
        Ok(Self {
            priority: p.trim().parse().map_err(|e| format!("priority `{}`: {}", p, e))?,
            budget: b.trim().parse().map_err(|e| format!("budget `{}`: {}", b, e))?,
            period: t.trim().parse().map_err(|e| format!("period `{}`: {}", t, e))?,
        })
    }
}

const REFERENCE_SET: [TaskArg; 3] = [
    TaskArg { priority: 42, budget: 90_000, period: 200_000 },
    TaskArg { priority: 41, budget: 60_000, period: 250_000 },
    TaskArg { priority: 40, budget: 10_000, period: 300_000 },
];

#[derive(Parser)]
#[command(name = "mcsched")]
#[command(about = "Run periodic tasks under budget-enforced rate-monotonic scheduling")]
#[command(version)]
struct Cli {
    /// Task as PRIO:BUDGET:PERIOD (repeatable); defaults to the reference set
    #[arg(long = "task", value_name = "PRIO:BUDGET:PERIOD")]
    tasks: Vec<TaskArg>,

    /// Sample-to-sample gap, in cycles, that counts as a preemption
    #[arg(long, default_value_t = DEFAULT_SLACK_CYCLES)]
    slack_cycles: u64,

    /// Epochs each task records before it completes
    #[arg(long, default_value_t = SAMPLE_WINDOW_CAPACITY)]
    epochs: usize,

    /// Longest slice between scheduler ticks, in cycles
    #[arg(long, default_value_t = DEFAULT_QUANTUM)]
    quantum: u64,

    /// Cycles one workload sample costs
    #[arg(long, default_value_t = DEFAULT_SAMPLE_COST)]
    sample_cost: u64,

    /// Give up after this many simulated cycles
    #[arg(long, default_value_t = DEFAULT_HORIZON)]
    horizon: u64,

    /// Use verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    let runtime_config = RuntimeConfig { slack_cycles: cli.slack_cycles, epochs: cli.epochs };
    runtime_config.validate().context("invalid runtime configuration")?;

    let tasks: &[TaskArg] = if cli.tasks.is_empty() { &REFERENCE_SET } else { &cli.tasks };
    let priorities: Vec<u32> = tasks.iter().map(|t| t.priority).collect();
    let budgets: Vec<u64> = tasks.iter().map(|t| t.budget).collect();
    let periods: Vec<u64> = tasks.iter().map(|t| t.period).collect();

    let completions = CompletionQueue::new();
    let mut supervisor = Supervisor::new(InProcessHost, &completions);
    let handle = supervisor
        .create_task_set(&priorities, &budgets, &periods)
        .context("task set rejected")?;

    let feasibility = supervisor.feasibility().context("no feasibility verdict")?;
    println!(
        "utilisation {}.{:02}% against bound {}.{:02}%: {:?}",
        feasibility.utilization_ppm / 10_000,
        feasibility.utilization_ppm / 100 % 100,
        feasibility.bound_ppm / 10_000,
        feasibility.bound_ppm / 100 % 100,
        feasibility.verdict
    );

    supervisor.start(handle, 0).context("task startup failed")?;

    let mut runtimes: Vec<_> = (0..tasks.len())
        .map(|id| TaskRuntime::new(id, PreemptionProbe::new(&runtime_config), &completions))
        .collect();

    let mut sim = Simulation::new(SimConfig {
        quantum: cli.quantum,
        sample_cost: cli.sample_cost,
        horizon: cli.horizon,
    });
    let wall = MonotonicClock::new();
    let outcome = sim.run(&mut supervisor, &mut runtimes)?;
    info!("simulated {} cycles in {} µs", outcome.finished_at, wall.now() / 1_000);

    let report = supervisor.utilization_report(handle)?;
    print_report(&report);

    if !outcome.finished {
        supervisor.abort(outcome.finished_at);
        bail!("horizon of {} cycles reached before every task completed", cli.horizon);
    }
    Ok(())
}

/// Epochs are numbered from 1 in the output.
fn epoch_line(task: TaskId, index: usize, epoch: &Epoch) -> String {
    format!("[thread {}] #{}: started {}, consumed {}", task, index + 1, epoch.start, epoch.consumed)
}

fn print_report(report: &UtilizationReport) {
    for task in report.iter() {
        for (i, epoch) in task.epochs.iter().enumerate() {
            println!("{}", epoch_line(task.task, i, epoch));
        }
        match task.measured_percent {
            Some(percent) => println!("[thread {}] CPU utilization: {}%", task.task, percent),
            None => println!("[thread {}] CPU utilization: n/a", task.task),
        }
    }

    println!();
    println!("task  prio   budget   period  configured  charged  periods  starved  preempted  exhausted  state");
    for task in report.iter() {
        println!(
            "{:>4}  {:>4}  {:>7}  {:>7}  {:>9}%  {:>6}%  {:>7}  {:>7}  {:>9}  {:>9}  {:?}",
            task.task,
            task.config.priority,
            task.config.budget,
            task.config.period,
            task.configured_ppm() / 10_000,
            task.utilization_percent(),
            task.periods,
            task.starved_periods,
            task.preemptions,
            task.budget_exhaustions,
            task.state
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_task_arg() {
        assert_eq!(
            "42:90000:200000".parse::<TaskArg>(),
            Ok(TaskArg { priority: 42, budget: 90_000, period: 200_000 })
        );
        assert!("42:90000".parse::<TaskArg>().is_err());
        assert!("42:90000:200000:1".parse::<TaskArg>().is_err());
        assert!("x:1:2".parse::<TaskArg>().is_err());
    }

    #[test]
    fn test_epoch_lines_count_from_one() {
        let epoch = Epoch { start: 1_200, consumed: 89_900 };
        assert_eq!(epoch_line(2, 0, &epoch), "[thread 2] #1: started 1200, consumed 89900");
        assert_eq!(epoch_line(0, 29, &epoch), "[thread 0] #30: started 1200, consumed 89900");
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["mcsched"]);
        assert!(cli.tasks.is_empty());
        assert_eq!(cli.slack_cycles, DEFAULT_SLACK_CYCLES);
        assert_eq!(cli.epochs, SAMPLE_WINDOW_CAPACITY);

        let cli = Cli::parse_from(["mcsched", "--task", "5:10:100", "--task", "4:10:200", "-v"]);
        assert_eq!(cli.tasks.len(), 2);
        assert!(cli.verbose);
    }
}
