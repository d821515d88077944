//! # Feasibility Analysis
//!
//! Rate-monotonic schedulability check for a registered task set.
//!
//! The verdict is advisory: registration never fails on it. A set of `n`
//! independent periodic tasks is guaranteed schedulable under fixed-priority
//! preemptive scheduling (Liu & Layland, 1973) when
//!
//! ```text
//!   U = Σ budget_i / period_i  ≤  n · (2^(1/n) − 1)
//! ```
//!
//! Between that bound and `U = 1` a set may or may not be schedulable; above
//! `1` it certainly is not.
//!
//! All arithmetic is integer-only, in parts per million. Per-task shares are
//! rounded up and the bound table is rounded down, so a `Schedulable`
//! verdict never rests on rounding.

use crate::config::MAX_TASKS;
use crate::task::TaskConfig;

/// One processor, in parts per million.
pub const FULL_UTILIZATION_PPM: u64 = 1_000_000;

/// `n · (2^(1/n) − 1)` in ppm for `n = 1..=MAX_TASKS`.
const LIU_LAYLAND_PPM: [u64; MAX_TASKS] = [
    1_000_000, // 1
    828_427,   // 2
    779_763,   // 3
    756_828,   // 4
    743_491,   // 5
    734_772,   // 6
    728_626,   // 7
    724_061,   // 8
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feasibility {
    /// Utilisation is within the rate-monotonic bound.
    Schedulable,
    /// Utilisation is above the bound; lower-priority progress is not guaranteed.
    PossiblyInfeasible,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeasibilityReport {
    pub verdict: Feasibility,
    /// Total requested utilisation.
    pub utilization_ppm: u64,
    /// Rate-monotonic bound for this many tasks.
    pub bound_ppm: u64,
}

impl FeasibilityReport {
    /// The necessary condition `U ≤ 1` fails as well.
    pub fn exceeds_capacity(&self) -> bool {
        self.utilization_ppm > FULL_UTILIZATION_PPM
    }

    pub fn is_schedulable(&self) -> bool {
        self.verdict == Feasibility::Schedulable
    }
}

/// Liu & Layland bound for `n` tasks, in ppm. Zero for an empty set.
pub fn rate_monotonic_bound_ppm(n: usize) -> u64 {
    match n {
        0 => 0,
        n => LIU_LAYLAND_PPM[n.min(MAX_TASKS) - 1],
    }
}

/// Total utilisation of the set in ppm.
pub fn total_utilization_ppm(tasks: &[TaskConfig]) -> u64 {
    tasks.iter().map(TaskConfig::utilization_ppm).sum()
}

/// Compute the rate-monotonic verdict for `tasks`.
pub fn analyze(tasks: &[TaskConfig]) -> FeasibilityReport {
    let utilization_ppm = total_utilization_ppm(tasks);
    let bound_ppm = rate_monotonic_bound_ppm(tasks.len());
    let verdict = if !tasks.is_empty() && utilization_ppm <= bound_ppm {
        Feasibility::Schedulable
    } else {
        Feasibility::PossiblyInfeasible
    };
    FeasibilityReport { verdict, utilization_ppm, bound_ppm }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bound_table() {
        assert_eq!(rate_monotonic_bound_ppm(0), 0);
        assert_eq!(rate_monotonic_bound_ppm(1), 1_000_000);
        assert_eq!(rate_monotonic_bound_ppm(3), 779_763);
        // The bound decreases monotonically towards ln 2.
        for n in 1..MAX_TASKS {
            assert!(rate_monotonic_bound_ppm(n) > rate_monotonic_bound_ppm(n + 1));
        }
        assert!(rate_monotonic_bound_ppm(MAX_TASKS) > 693_147);
    }

    #[test]
    fn test_reference_set_is_schedulable() {
        let set = [
            TaskConfig::new(42, 90_000, 200_000),
            TaskConfig::new(41, 60_000, 250_000),
            TaskConfig::new(40, 10_000, 300_000),
        ];
        let report = analyze(&set);
        assert_eq!(report.utilization_ppm, 723_334);
        assert_eq!(report.bound_ppm, 779_763);
        assert_eq!(report.verdict, Feasibility::Schedulable);
        assert!(!report.exceeds_capacity());
    }

    #[test]
    fn test_between_bound_and_capacity_is_possibly_infeasible() {
        // U = 0.9 for two tasks, above 0.828 but below 1.
        let set = [TaskConfig::new(2, 50, 100), TaskConfig::new(1, 80, 200)];
        let report = analyze(&set);
        assert_eq!(report.verdict, Feasibility::PossiblyInfeasible);
        assert!(!report.exceeds_capacity());
    }

    #[test]
    fn test_overload_exceeds_capacity() {
        let set = [TaskConfig::new(2, 90, 100), TaskConfig::new(1, 90, 100)];
        let report = analyze(&set);
        assert_eq!(report.verdict, Feasibility::PossiblyInfeasible);
        assert!(report.exceeds_capacity());
    }

    #[test]
    fn test_single_full_budget_task_is_schedulable() {
        let report = analyze(&[TaskConfig::new(1, 100, 100)]);
        assert!(report.is_schedulable());
    }
}
