//! End-to-end runs of the scheduling core on the simulated host.

use mcsched::accountant::Epoch;
use mcsched::config::{RuntimeConfig, SAMPLE_WINDOW_CAPACITY};
use mcsched::feasibility::Feasibility;
use mcsched::runtime::{PreemptionProbe, TaskRuntime, Workload, WorkloadStatus};
use mcsched::sim::{SimConfig, Simulation};
use mcsched::supervisor::{InProcessHost, Supervisor};
use mcsched::sync::CompletionQueue;
use mcsched::TaskState;

const PRIORITIES: [u32; 3] = [42, 41, 40];
const BUDGETS: [u64; 3] = [90_000, 60_000, 10_000];
const PERIODS: [u64; 3] = [200_000, 250_000, 300_000];

#[test]
fn test_reference_workload() {
    let queue = CompletionQueue::new();
    let mut sup = Supervisor::new(InProcessHost, &queue);
    let handle = sup.create_task_set(&PRIORITIES, &BUDGETS, &PERIODS).unwrap();

    let verdict = sup.feasibility().unwrap();
    assert_eq!(verdict.verdict, Feasibility::Schedulable);
    assert_eq!(verdict.utilization_ppm, 723_334);

    sup.start(handle, 0).unwrap();
    let config = RuntimeConfig::new();
    let mut runtimes: Vec<_> = (0..3)
        .map(|id| TaskRuntime::new(id, PreemptionProbe::new(&config), &queue))
        .collect();

    let mut sim = Simulation::new(SimConfig::default());
    let outcome = sim.run(&mut sup, &mut runtimes).unwrap();
    assert!(outcome.finished);
    assert_eq!(outcome.max_running, 1);
    assert!(runtimes.iter().all(|rt| rt.is_finished()));

    let report = sup.utilization_report(handle).unwrap();
    assert_eq!(report.len(), 3);
    for task in report.iter() {
        assert_eq!(task.state, TaskState::Terminated, "task {}", task.task);
        assert_eq!(task.epochs.len(), SAMPLE_WINDOW_CAPACITY, "task {}", task.task);
        assert_eq!(task.starved_periods, 0, "task {}", task.task);
        assert!(task.periods > 0);

        // Every epoch is one period's worth of budget at most.
        for epoch in task.epochs.iter() {
            assert!(epoch.consumed <= task.config.budget, "task {}: {:?}", task.task, epoch);
        }

        let charged = task.usage.utilization_ppm;
        let configured = task.configured_ppm();
        assert!(
            charged.abs_diff(configured) <= 30_000,
            "task {}: charged {} ppm, configured {} ppm",
            task.task,
            charged,
            configured
        );

        let measured = task.measured_percent.unwrap();
        let expected = configured / 10_000;
        assert!(
            measured.abs_diff(expected) <= 3,
            "task {}: measured {}%, configured {}%",
            task.task,
            measured,
            expected
        );
    }

    // The two tighter budgets run dry every period.
    assert!(report.get(0).unwrap().budget_exhaustions >= 29);
    assert!(report.get(2).unwrap().budget_exhaustions >= 29);
}

#[test]
fn test_report_is_stable_after_finish() {
    let queue = CompletionQueue::new();
    let mut sup = Supervisor::new(InProcessHost, &queue);
    let handle = sup.create_task_set(&PRIORITIES, &BUDGETS, &PERIODS).unwrap();
    sup.start(handle, 0).unwrap();

    let config = RuntimeConfig { slack_cycles: 700, epochs: 2 };
    let mut runtimes: Vec<_> = (0..3)
        .map(|id| TaskRuntime::new(id, PreemptionProbe::new(&config), &queue))
        .collect();
    let outcome = Simulation::new(SimConfig::default()).run(&mut sup, &mut runtimes).unwrap();
    assert!(outcome.finished);

    let first = sup.utilization_report(handle).unwrap();
    let second = sup.utilization_report(handle).unwrap();
    assert_eq!(first, second);
    assert_eq!(sup.poll_completions(outcome.finished_at), 0);
}

/// Runs forever and never yields voluntarily.
struct Hog;

impl Workload for Hog {
    fn sample(&mut self, _now: u64) -> WorkloadStatus {
        WorkloadStatus::Continue
    }
}

enum Mixed {
    Hog(Hog),
    Probe(PreemptionProbe),
}

impl Workload for Mixed {
    fn sample(&mut self, now: u64) -> WorkloadStatus {
        match self {
            Mixed::Hog(w) => w.sample(now),
            Mixed::Probe(w) => w.sample(now),
        }
    }

    fn epochs(&self) -> mcsched::accountant::SampleWindow {
        match self {
            Mixed::Hog(w) => w.epochs(),
            Mixed::Probe(w) => w.epochs(),
        }
    }
}

#[test]
fn test_greedy_high_priority_task_is_contained() {
    let queue = CompletionQueue::new();
    let mut sup = Supervisor::new(InProcessHost, &queue);
    let handle = sup.create_task_set(&[10, 5], &[500, 400], &[1_000, 1_000]).unwrap();
    sup.start(handle, 0).unwrap();

    let config = RuntimeConfig { slack_cycles: 700, epochs: 3 };
    let mut runtimes = [
        TaskRuntime::new(0, Mixed::Hog(Hog), &queue),
        TaskRuntime::new(1, Mixed::Probe(PreemptionProbe::new(&config)), &queue),
    ];
    let mut sim = Simulation::new(SimConfig { horizon: 10_000, ..SimConfig::new() });
    let outcome = sim.run(&mut sup, &mut runtimes).unwrap();

    // The hog never completes, but the lower-priority task still gets its
    // budget every period.
    assert!(!outcome.finished);
    assert_eq!(outcome.max_running, 1);

    let tasks = sup.scheduler().tasks();
    assert!(tasks[0].is_live());
    assert_eq!(tasks[0].budget_exhaustions, 10);
    assert_eq!(tasks[0].consumed_total, 5_000);

    let report = sup.utilization_report(handle).unwrap();
    let t1 = report.get(1).unwrap();
    assert_eq!(t1.state, TaskState::Terminated);
    assert_eq!(t1.starved_periods, 0);
    assert_eq!(
        t1.epochs.as_slice(),
        &[
            Epoch { start: 600, consumed: 300 },
            Epoch { start: 1_600, consumed: 300 },
            Epoch { start: 2_600, consumed: 300 },
        ]
    );
    assert_eq!(t1.measured_percent, Some(30));
}
