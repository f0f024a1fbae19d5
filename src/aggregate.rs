use crate::error::{Result, TimekeepError};
use crate::estimate::{CommitSummary, Estimator, RawEstimate};
use crate::model::{CommitRecord, ProjectReport, TaskEstimate};
use tracing::{debug, warn};

pub const DEFAULT_DAILY_CAP: f64 = 6.0;
pub const DEFAULT_RETRIES: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregationPolicy {
    pub daily_cap: f64,
    /// Extra estimator attempts after a failed one.
    pub retries: u32,
}

impl Default for AggregationPolicy {
    fn default() -> Self {
        Self {
            daily_cap: DEFAULT_DAILY_CAP,
            retries: DEFAULT_RETRIES,
        }
    }
}

/// Nearest multiple of 0.5, halves rounded up. Negative and non-finite input
/// yields 0.
pub fn round_half(hours: f64) -> f64 {
    if !hours.is_finite() || hours <= 0.0 {
        return 0.0;
    }
    (hours * 2.0).round() / 2.0
}

fn floor_half(hours: f64) -> f64 {
    if !hours.is_finite() || hours <= 0.0 {
        return 0.0;
    }
    (hours * 2.0).floor() / 2.0
}

fn task_sum(tasks: &[TaskEstimate]) -> f64 {
    tasks.iter().map(|t| t.hours).sum()
}

/// Build the report for one project from its filtered, de-duplicated commits.
///
/// An empty batch short-circuits without calling the estimator. Otherwise the
/// estimator sees the whole batch in a single call (retried per `policy`).
pub fn aggregate(
    project: &str,
    commits: &[CommitRecord],
    estimator: &dyn Estimator,
    policy: &AggregationPolicy,
) -> Result<ProjectReport> {
    if commits.is_empty() {
        debug!(project, "no commits, skipping estimation");
        return Ok(ProjectReport::empty(project));
    }

    let summaries: Vec<CommitSummary> = commits.iter().map(CommitSummary::from).collect();
    let raw = estimate_with_retry(project, &summaries, estimator, policy.retries)?;
    Ok(normalize(project, commits.len(), raw, policy.daily_cap))
}

fn estimate_with_retry(
    project: &str,
    summaries: &[CommitSummary],
    estimator: &dyn Estimator,
    retries: u32,
) -> Result<RawEstimate> {
    let mut attempt = 0;
    loop {
        match estimator.estimate(project, summaries).and_then(validate) {
            Ok(raw) => return Ok(raw),
            Err(e) if attempt < retries => {
                attempt += 1;
                warn!(project, estimator = estimator.name(), attempt, "estimation failed, retrying: {e}");
            }
            Err(TimekeepError::Estimation(msg)) => return Err(TimekeepError::Estimation(msg)),
            Err(e) => return Err(TimekeepError::Estimation(e.to_string())),
        }
    }
}

fn validate(raw: RawEstimate) -> Result<RawEstimate> {
    let finite = raw.total_hours.is_finite() && raw.tasks.iter().all(|t| t.hours.is_finite());
    if finite {
        Ok(raw)
    } else {
        Err(TimekeepError::Estimation("estimate contains non-finite hours".to_string()))
    }
}

/// Apply rounding and the daily cap to a raw estimate.
///
/// When the rounded total exceeds the cap, each task is scaled by
/// `cap / rounded_total` and re-rounded, then half hours are moved until the
/// tasks add up to exactly the cap, and the total becomes that sum. Tasks end
/// up sorted by descending hours, ties in estimator order.
pub fn normalize(project: &str, commit_count: usize, raw: RawEstimate, daily_cap: f64) -> ProjectReport {
    let cap = floor_half(daily_cap);
    let rounded_total = round_half(raw.total_hours);

    let weights: Vec<f64> = raw
        .tasks
        .iter()
        .map(|t| if t.hours > 0.0 { t.hours } else { 0.0 })
        .collect();
    let mut tasks: Vec<TaskEstimate> = raw
        .tasks
        .into_iter()
        .map(|t| TaskEstimate {
            description: t.description.trim().to_string(),
            hours: round_half(t.hours),
        })
        .collect();

    let capped = rounded_total > cap;
    let total_hours = if capped {
        scale_tasks(&mut tasks, cap / rounded_total);
        fit_to_cap(&mut tasks, cap);
        fill_to_cap(&mut tasks, &weights, cap);
        if tasks.is_empty() {
            cap
        } else {
            task_sum(&tasks)
        }
    } else {
        let sum = task_sum(&tasks);
        if sum > cap {
            scale_tasks(&mut tasks, cap / sum);
            fit_to_cap(&mut tasks, cap);
        }
        rounded_total
    };

    tasks.sort_by(|a, b| b.hours.total_cmp(&a.hours));

    if capped {
        debug!(project, rounded_total, total_hours, "daily cap applied");
    }

    ProjectReport {
        project_name: project.to_string(),
        commit_count,
        total_hours,
        raw_total_hours: raw.total_hours,
        capped,
        summary: raw.summary.trim().to_string(),
        tasks,
    }
}

fn scale_tasks(tasks: &mut [TaskEstimate], factor: f64) {
    for task in tasks.iter_mut() {
        task.hours = round_half(task.hours * factor);
    }
}

/// Rounding up can leave the task sum above the cap; take half hours off the
/// largest task (earliest on ties) until it fits.
fn fit_to_cap(tasks: &mut [TaskEstimate], cap: f64) {
    while task_sum(tasks) > cap {
        let largest = tasks
            .iter()
            .enumerate()
            .filter(|(_, t)| t.hours >= 0.5)
            .fold(None, |best: Option<(usize, f64)>, (i, t)| match best {
                Some((_, h)) if h >= t.hours => best,
                _ => Some((i, t.hours)),
            });
        match largest {
            Some((i, _)) => tasks[i].hours -= 0.5,
            None => break,
        }
    }
}

/// Per-task rounding can lose most of the capped total (many small tasks all
/// rounding to zero). Hand out half hours to the task furthest below its
/// proportional share of the cap, earliest on ties, until the tasks sum to the
/// cap.
fn fill_to_cap(tasks: &mut [TaskEstimate], weights: &[f64], cap: f64) {
    if tasks.is_empty() {
        return;
    }
    let weight_sum: f64 = weights.iter().sum();
    let shares: Vec<f64> = (0..tasks.len())
        .map(|i| {
            if weight_sum > 0.0 {
                weights.get(i).copied().unwrap_or(0.0) / weight_sum * cap
            } else {
                cap / tasks.len() as f64
            }
        })
        .collect();

    while task_sum(tasks) + 0.5 <= cap {
        let neediest = (1..tasks.len()).fold(0, |best, i| {
            if shares[i] - tasks[i].hours > shares[best] - tasks[best].hours {
                i
            } else {
                best
            }
        });
        tasks[neediest].hours += 0.5;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use std::cell::{Cell, RefCell};

    struct FakeEstimator {
        result: RawEstimate,
        fail_first: u32,
        calls: Cell<u32>,
        batches: RefCell<Vec<usize>>,
    }

    impl FakeEstimator {
        fn returning(total_hours: f64, tasks: &[(&str, f64)]) -> Self {
            Self {
                result: RawEstimate {
                    summary: " Did things ".to_string(),
                    total_hours,
                    tasks: tasks
                        .iter()
                        .map(|(d, h)| TaskEstimate {
                            description: d.to_string(),
                            hours: *h,
                        })
                        .collect(),
                },
                fail_first: 0,
                calls: Cell::new(0),
                batches: RefCell::new(Vec::new()),
            }
        }

        fn failing_first(mut self, n: u32) -> Self {
            self.fail_first = n;
            self
        }
    }

    impl Estimator for FakeEstimator {
        fn name(&self) -> &str {
            "fake"
        }

        fn estimate(&self, _project: &str, commits: &[CommitSummary]) -> Result<RawEstimate> {
            let call = self.calls.get() + 1;
            self.calls.set(call);
            self.batches.borrow_mut().push(commits.len());
            if call <= self.fail_first {
                return Err(TimekeepError::Estimation("unreachable".into()));
            }
            Ok(self.result.clone())
        }
    }

    fn commits(n: usize) -> Vec<CommitRecord> {
        (0..n)
            .map(|i| CommitRecord {
                id: format!("{i:040x}"),
                author_email: "me@x.com".into(),
                timestamp: Utc.with_ymd_and_hms(2025, 5, 6, 9, i as u32, 0).unwrap(),
                message: format!("commit {i}"),
                files_changed: 1,
                insertions: 10,
                deletions: 1,
            })
            .collect()
    }

    fn hours(report: &ProjectReport) -> Vec<f64> {
        report.tasks.iter().map(|t| t.hours).collect()
    }

    #[test]
    fn round_half_lands_on_half_hours() {
        for i in 0..=400 {
            let h = i as f64 * 0.037;
            let r = round_half(h);
            assert_eq!((r * 2.0).fract(), 0.0, "{h} -> {r}");
            assert!((r - h).abs() <= 0.25 + 1e-12, "{h} -> {r}");
        }
    }

    #[test]
    fn round_half_rounds_ties_up() {
        assert_eq!(round_half(0.25), 0.5);
        assert_eq!(round_half(0.75), 1.0);
        assert_eq!(round_half(7.25), 7.5);
        assert_eq!(round_half(7.3), 7.5);
        assert_eq!(round_half(0.24), 0.0);
    }

    #[test]
    fn round_half_never_negative() {
        assert_eq!(round_half(-3.2), 0.0);
        assert_eq!(round_half(-0.1), 0.0);
        assert_eq!(round_half(f64::NAN), 0.0);
    }

    #[test]
    fn empty_batch_skips_estimator() {
        let estimator = FakeEstimator::returning(3.0, &[]);
        let report = aggregate("p", &[], &estimator, &AggregationPolicy::default()).unwrap();

        assert_eq!(report, ProjectReport::empty("p"));
        assert_eq!(estimator.calls.get(), 0);
    }

    #[test]
    fn whole_batch_goes_out_in_one_call() {
        let estimator = FakeEstimator::returning(2.0, &[("a", 2.0)]);
        let report = aggregate("p", &commits(7), &estimator, &AggregationPolicy::default()).unwrap();

        assert_eq!(estimator.calls.get(), 1);
        assert_eq!(*estimator.batches.borrow(), vec![7]);
        assert_eq!(report.commit_count, 7);
        assert_eq!(report.summary, "Did things");
    }

    #[test]
    fn over_cap_example_scales_tasks() {
        let estimator = FakeEstimator::returning(7.3, &[("parser", 3.1), ("tests", 2.9), ("docs", 1.3)]);
        let report = aggregate("p", &commits(3), &estimator, &AggregationPolicy::default()).unwrap();

        // 7.3 -> 7.5 -> factor 0.8; tasks 3.0/3.0/1.5 -> 2.4/2.4/1.2 -> 2.5/2.5/1.0
        assert!(report.capped);
        assert_eq!(hours(&report), vec![2.5, 2.5, 1.0]);
        assert_eq!(report.total_hours, 6.0);
        assert_eq!(report.total_hours, report.task_hours());
        assert_eq!(report.raw_total_hours, 7.3);
    }

    #[test]
    fn cap_holds_when_rounding_up_overshoots() {
        let tasks: Vec<(&str, f64)> = (0..15).map(|_| ("small", 0.5)).collect();
        let estimator = FakeEstimator::returning(7.5, &tasks);
        let report = aggregate("p", &commits(15), &estimator, &AggregationPolicy::default()).unwrap();

        assert_eq!(report.total_hours, 6.0);
        assert_eq!(report.task_hours(), 6.0);
        assert!(report.tasks.iter().all(|t| t.hours >= 0.0));
    }

    #[test]
    fn over_cap_without_tasks_uses_cap() {
        let estimator = FakeEstimator::returning(11.0, &[]);
        let report = aggregate("p", &commits(2), &estimator, &AggregationPolicy::default()).unwrap();
        assert_eq!(report.total_hours, 6.0);
        assert!(report.tasks.is_empty());
    }

    #[test]
    fn custom_cap_is_respected() {
        let policy = AggregationPolicy {
            daily_cap: 4.0,
            ..AggregationPolicy::default()
        };
        let estimator = FakeEstimator::returning(5.0, &[("a", 3.0), ("b", 2.0)]);
        let report = aggregate("p", &commits(2), &estimator, &policy).unwrap();

        // factor 0.8: 2.4 -> 2.5, 1.6 -> 1.5
        assert_eq!(hours(&report), vec![2.5, 1.5]);
        assert_eq!(report.total_hours, 4.0);
    }

    #[test]
    fn under_cap_keeps_rounded_total() {
        let estimator = FakeEstimator::returning(3.3, &[("a", 1.1), ("b", 2.2)]);
        let report = aggregate("p", &commits(2), &estimator, &AggregationPolicy::default()).unwrap();

        assert!(!report.capped);
        assert_eq!(report.total_hours, 3.5);
        assert_eq!(hours(&report), vec![2.0, 1.0]);
    }

    #[test]
    fn oversized_tasks_are_fitted_even_under_cap() {
        let estimator = FakeEstimator::returning(5.0, &[("a", 5.0), ("b", 4.0)]);
        let report = aggregate("p", &commits(2), &estimator, &AggregationPolicy::default()).unwrap();

        assert_eq!(report.total_hours, 5.0);
        assert!(report.task_hours() <= 6.0);
    }

    #[test]
    fn tasks_sorted_descending_with_stable_ties() {
        let estimator = FakeEstimator::returning(
            4.0,
            &[("first", 0.5), ("second", 1.5), ("third", 0.5), ("fourth", 1.5)],
        );
        let report = aggregate("p", &commits(4), &estimator, &AggregationPolicy::default()).unwrap();

        let order: Vec<&str> = report.tasks.iter().map(|t| t.description.as_str()).collect();
        assert_eq!(order, vec!["second", "fourth", "first", "third"]);
    }

    #[test]
    fn retries_once_then_succeeds() {
        let estimator = FakeEstimator::returning(1.0, &[("a", 1.0)]).failing_first(1);
        let report = aggregate("p", &commits(1), &estimator, &AggregationPolicy::default()).unwrap();

        assert_eq!(estimator.calls.get(), 2);
        assert_eq!(report.total_hours, 1.0);
    }

    #[test]
    fn gives_up_after_single_retry() {
        let estimator = FakeEstimator::returning(1.0, &[]).failing_first(5);
        let err = aggregate("p", &commits(1), &estimator, &AggregationPolicy::default()).unwrap_err();

        assert_eq!(estimator.calls.get(), 2);
        assert!(matches!(err, TimekeepError::Estimation(_)));
    }

    #[test]
    fn non_finite_estimates_are_malformed() {
        let estimator = FakeEstimator::returning(f64::INFINITY, &[]);
        let err = aggregate("p", &commits(1), &estimator, &AggregationPolicy::default()).unwrap_err();
        assert!(matches!(err, TimekeepError::Estimation(_)));
    }

    #[test]
    fn cap_property_over_many_totals() {
        for tenths in 0..200 {
            let raw = tenths as f64 / 10.0;
            let estimator = FakeEstimator::returning(raw, &[("a", raw * 0.6), ("b", raw * 0.4)]);
            let report = aggregate("p", &commits(1), &estimator, &AggregationPolicy::default()).unwrap();

            assert!(report.total_hours <= DEFAULT_DAILY_CAP, "raw {raw}");
            assert!(report.task_hours() <= DEFAULT_DAILY_CAP, "raw {raw}");
            assert_eq!((report.total_hours * 2.0).fract(), 0.0);
            if round_half(raw) > DEFAULT_DAILY_CAP {
                assert!(report.total_hours >= DEFAULT_DAILY_CAP - 0.5, "raw {raw}");
            }
        }
    }
    #[test]
    fn capped_total_survives_tasks_rounding_to_zero() {
        // 30 tasks of ~0.22h each round to nothing on their own.
        let tasks: Vec<(&str, f64)> = (0..30).map(|_| ("small", 6.5 / 30.0)).collect();
        let estimator = FakeEstimator::returning(6.5, &tasks);
        let report = aggregate("p", &commits(30), &estimator, &AggregationPolicy::default()).unwrap();

        assert!(report.capped);
        assert_eq!(report.total_hours, 6.0);
        assert_eq!(report.task_hours(), 6.0);
        assert_eq!(report.tasks.iter().filter(|t| t.hours > 0.0).count(), 12);
    }

    #[test]
    fn heuristic_batch_over_cap_books_the_cap() {
        let commits: Vec<CommitRecord> = commits(30)
            .into_iter()
            .map(|mut c| {
                c.insertions = 20;
                c.deletions = 0;
                c
            })
            .collect();
        let estimator = crate::estimate::HeuristicEstimator::new(1.0);
        let report = aggregate("p", &commits, &estimator, &AggregationPolicy::default()).unwrap();

        assert_eq!(report.raw_total_hours, 6.5);
        assert!(report.capped);
        assert_eq!(report.total_hours, 6.0);
        assert_eq!(report.task_hours(), 6.0);
    }

    #[test]
    fn sparse_task_list_is_scaled_up_to_cap() {
        let estimator = FakeEstimator::returning(9.0, &[("big", 2.0), ("small", 1.0)]);
        let report = aggregate("p", &commits(2), &estimator, &AggregationPolicy::default()).unwrap();

        assert_eq!(report.total_hours, 6.0);
        assert_eq!(hours(&report), vec![4.0, 2.0]);
    }
}
