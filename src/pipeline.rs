//! Per-project processing: fetch, de-duplicate, attribute, estimate.

use crate::aggregate::{aggregate, AggregationPolicy};
use crate::author::{filter_by_author, resolve_author, AuthorStore, Confirmer};
use crate::cache::{fingerprint, Cache};
use crate::dedupe::dedupe;
use crate::error::Result;
use crate::estimate::Estimator;
use crate::git::CommitSource;
use crate::model::{DayRange, ProjectConfig, ProjectOutcome, ProjectReport, RunReport};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

pub struct Pipeline<'a> {
    source: &'a dyn CommitSource,
    estimator: &'a dyn Estimator,
    policy: AggregationPolicy,
    reconfigure_author: bool,
    refresh: bool,
    progress: ProgressBar,
}

impl<'a> Pipeline<'a> {
    pub fn new(source: &'a dyn CommitSource, estimator: &'a dyn Estimator, policy: AggregationPolicy) -> Self {
        Self {
            source,
            estimator,
            policy,
            reconfigure_author: false,
            refresh: false,
            progress: ProgressBar::hidden(),
        }
    }

    /// Ask for the author identity again even when one is stored.
    pub fn reconfigure_author(mut self, yes: bool) -> Self {
        self.reconfigure_author = yes;
        self
    }

    /// Ignore cached reports.
    pub fn refresh(mut self, yes: bool) -> Self {
        self.refresh = yes;
        self
    }

    pub fn with_spinner(mut self) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        self.progress = pb;
        self
    }

    /// Process every project in order. A failing project is recorded in the
    /// report and never stops the ones after it.
    pub fn run(
        &self,
        projects: &[ProjectConfig],
        range: &DayRange,
        store: &mut dyn AuthorStore,
        confirmer: &mut dyn Confirmer,
        mut cache: Option<&mut Cache>,
    ) -> RunReport {
        let mut outcomes = Vec::with_capacity(projects.len());

        for project in projects {
            self.progress.set_message(format!("Analyzing {}...", project.name));
            self.progress.tick();

            let outcome = match self.run_project(project, range, store, confirmer, cache.as_deref_mut()) {
                Ok(report) => {
                    info!(
                        project = %project.name,
                        commits = report.commit_count,
                        hours = report.total_hours,
                        "project done"
                    );
                    ProjectOutcome::Succeeded { report }
                }
                Err(e) => {
                    warn!(project = %project.name, "project failed: {e}");
                    ProjectOutcome::Failed {
                        project_name: project.name.clone(),
                        kind: e.kind(),
                        reason: e.to_string(),
                    }
                }
            };
            outcomes.push(outcome);
        }

        self.progress.finish_and_clear();
        RunReport::new(range.date, self.policy.daily_cap, outcomes)
    }

    pub fn run_project(
        &self,
        project: &ProjectConfig,
        range: &DayRange,
        store: &mut dyn AuthorStore,
        confirmer: &mut dyn Confirmer,
        cache: Option<&mut Cache>,
    ) -> Result<ProjectReport> {
        let path = project.resolved_path();

        let raw = self.source.fetch_commits(&path, range)?;
        let fetched = raw.len();
        let unique = dedupe(raw);
        debug!(project = %project.name, fetched, unique = unique.len(), "fetched commits");

        let source = self.source;
        let author = self.progress.suspend(|| {
            resolve_author(
                &project.name,
                store,
                || source.probe_identity(&path),
                confirmer,
                self.reconfigure_author,
            )
        })?;

        let mine = filter_by_author(unique, &author);
        debug!(project = %project.name, author = %author, commits = mine.len(), "filtered by author");

        let Some(cache) = cache else {
            return aggregate(&project.name, &mine, self.estimator, &self.policy);
        };

        let key = fingerprint(&mine, self.policy.daily_cap, &self.estimator.cache_key());
        if !self.refresh {
            match cache.get_report(&project.name, range.date, &key) {
                Ok(Some(report)) => {
                    debug!(project = %project.name, "using cached report");
                    return Ok(report);
                }
                Ok(None) => {}
                Err(e) => warn!(project = %project.name, "cache lookup failed: {e}"),
            }
        }

        let report = aggregate(&project.name, &mine, self.estimator, &self.policy)?;
        if let Err(e) = cache.store_report(&project.name, range.date, &key, &report) {
            warn!(project = %project.name, "could not cache report: {e}");
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::author::{AutoConfirm, IdentityCandidate, IdentityScope};
    use crate::error::TimekeepError;
    use crate::estimate::{CommitSummary, RawEstimate};
    use crate::model::{CommitRecord, FailureKind, TaskEstimate};
    use chrono::{NaiveDate, TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use std::cell::Cell;
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};

    /// Serves commits per repository path; unknown paths are missing repositories.
    struct FakeSource {
        repos: HashMap<PathBuf, Vec<CommitRecord>>,
        identity: Option<String>,
    }

    impl CommitSource for FakeSource {
        fn fetch_commits(&self, repo_path: &Path, _range: &DayRange) -> Result<Vec<CommitRecord>> {
            self.repos
                .get(repo_path)
                .cloned()
                .ok_or_else(|| TimekeepError::Repository(format!("path does not exist: {}", repo_path.display())))
        }

        fn probe_identity(&self, _repo_path: &Path) -> Result<Option<IdentityCandidate>> {
            Ok(self
                .identity
                .clone()
                .map(|email| IdentityCandidate::new(email, IdentityScope::Local)))
        }
    }

    struct FakeEstimator {
        name: &'static str,
        total: f64,
        tasks: Vec<(&'static str, f64)>,
        calls: Cell<usize>,
    }

    impl FakeEstimator {
        fn new(total: f64, tasks: Vec<(&'static str, f64)>) -> Self {
            Self {
                name: "fake",
                total,
                tasks,
                calls: Cell::new(0),
            }
        }

        fn named(mut self, name: &'static str) -> Self {
            self.name = name;
            self
        }
    }

    impl Estimator for FakeEstimator {
        fn name(&self) -> &str {
            self.name
        }

        fn estimate(&self, _project: &str, _commits: &[CommitSummary]) -> Result<RawEstimate> {
            self.calls.set(self.calls.get() + 1);
            Ok(RawEstimate {
                summary: "Work".into(),
                total_hours: self.total,
                tasks: self
                    .tasks
                    .iter()
                    .map(|(d, h)| TaskEstimate {
                        description: d.to_string(),
                        hours: *h,
                    })
                    .collect(),
            })
        }
    }

    fn range() -> DayRange {
        DayRange::for_date(NaiveDate::from_ymd_opt(2025, 4, 1).unwrap(), &Utc)
    }

    fn commit(id: &str, email: &str, hour: u32) -> CommitRecord {
        CommitRecord {
            id: id.into(),
            author_email: email.into(),
            timestamp: Utc.with_ymd_and_hms(2025, 4, 1, hour, 0, 0).unwrap(),
            message: format!("commit {id}"),
            files_changed: 1,
            insertions: 10,
            deletions: 2,
        }
    }

    fn source(repos: Vec<(&str, Vec<CommitRecord>)>) -> FakeSource {
        FakeSource {
            repos: repos.into_iter().map(|(p, c)| (PathBuf::from(p), c)).collect(),
            identity: Some("me@x.com".into()),
        }
    }

    #[test]
    fn failing_project_does_not_stop_the_next() {
        let source = source(vec![("/src/good", vec![commit("a1", "me@x.com", 9)])]);
        let estimator = FakeEstimator::new(2.2, vec![("Fix bug", 2.2)]);
        let pipeline = Pipeline::new(&source, &estimator, AggregationPolicy::default());
        let projects = vec![
            ProjectConfig::new("broken", "/src/missing"),
            ProjectConfig::new("good", "/src/good"),
        ];
        let mut store: HashMap<String, String> = HashMap::new();

        let run = pipeline.run(&projects, &range(), &mut store, &mut AutoConfirm, None);

        assert_eq!(run.outcomes.len(), 2);
        assert!(matches!(
            &run.outcomes[0],
            ProjectOutcome::Failed { kind: FailureKind::Repository, project_name, .. } if project_name == "broken"
        ));
        assert_eq!(run.reports().count(), 1);
        assert_eq!(run.total_hours, 2.0);
        assert!(run.has_fatal_failure());
    }

    #[test]
    fn duplicates_and_foreign_commits_are_dropped_before_estimation() {
        let shared = commit("a1", "me@x.com", 9);
        let source = source(vec![(
            "/src/api",
            vec![
                shared.clone(),
                commit("b1", "other@x.com", 10),
                shared,
                commit("a2", "me@x.com", 11),
                commit("a3", "ME@x.com", 12),
            ],
        )]);
        let estimator = FakeEstimator::new(1.0, vec![("Work", 1.0)]);
        let pipeline = Pipeline::new(&source, &estimator, AggregationPolicy::default());
        let mut store: HashMap<String, String> = HashMap::new();

        let report = pipeline
            .run_project(&ProjectConfig::new("api", "/src/api"), &range(), &mut store, &mut AutoConfirm, None)
            .unwrap();

        assert_eq!(report.commit_count, 2);
        assert_eq!(store.get("api").map(String::as_str), Some("me@x.com"));
    }

    #[test]
    fn unresolved_author_is_a_project_failure() {
        let mut source = source(vec![("/src/api", vec![commit("a1", "me@x.com", 9)])]);
        source.identity = None;
        let estimator = FakeEstimator::new(1.0, vec![]);
        let pipeline = Pipeline::new(&source, &estimator, AggregationPolicy::default());
        let mut store: HashMap<String, String> = HashMap::new();

        let run = pipeline.run(
            &[ProjectConfig::new("api", "/src/api")],
            &range(),
            &mut store,
            &mut AutoConfirm,
            None,
        );

        assert!(matches!(
            run.outcomes[0],
            ProjectOutcome::Failed { kind: FailureKind::AuthorUnresolved, .. }
        ));
        assert_eq!(estimator.calls.get(), 0);
    }

    #[test]
    fn end_to_end_cap_keeps_total_within_limit() {
        let commits = (0..5).map(|i| commit(&format!("c{i}"), "me@x.com", 8 + i)).collect();
        let source = source(vec![("/src/api", commits)]);
        let estimator = FakeEstimator::new(7.3, vec![("Feature", 3.2), ("Tests", 2.9), ("Docs", 1.2)]);
        let pipeline = Pipeline::new(&source, &estimator, AggregationPolicy::default());
        let mut store: HashMap<String, String> = HashMap::new();

        let report = pipeline
            .run_project(&ProjectConfig::new("api", "/src/api"), &range(), &mut store, &mut AutoConfirm, None)
            .unwrap();

        assert!(report.capped);
        assert!(report.total_hours <= 6.0);
        assert_eq!(report.total_hours, report.task_hours());
        for task in &report.tasks {
            assert_eq!((task.hours * 2.0).fract(), 0.0);
        }
        assert_eq!(estimator.calls.get(), 1);
    }

    #[test]
    fn cached_report_skips_estimator_until_refresh() {
        let source = source(vec![("/src/api", vec![commit("a1", "me@x.com", 9)])]);
        let estimator = FakeEstimator::new(1.0, vec![("Work", 1.0)]);
        let project = ProjectConfig::new("api", "/src/api");
        let mut store: HashMap<String, String> = HashMap::new();
        let mut cache = Cache::in_memory().unwrap();

        let pipeline = Pipeline::new(&source, &estimator, AggregationPolicy::default());
        let first = pipeline
            .run_project(&project, &range(), &mut store, &mut AutoConfirm, Some(&mut cache))
            .unwrap();
        let second = pipeline
            .run_project(&project, &range(), &mut store, &mut AutoConfirm, Some(&mut cache))
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(estimator.calls.get(), 1);

        let pipeline = Pipeline::new(&source, &estimator, AggregationPolicy::default()).refresh(true);
        pipeline
            .run_project(&project, &range(), &mut store, &mut AutoConfirm, Some(&mut cache))
            .unwrap();
        assert_eq!(estimator.calls.get(), 2);
    }

    #[test]
    fn switching_estimator_misses_cached_report() {
        let source = source(vec![("/src/api", vec![commit("a1", "me@x.com", 9)])]);
        let project = ProjectConfig::new("api", "/src/api");
        let mut store: HashMap<String, String> = HashMap::new();
        let mut cache = Cache::in_memory().unwrap();

        let offline = FakeEstimator::new(1.0, vec![("Work", 1.0)]).named("heuristic");
        let first = Pipeline::new(&source, &offline, AggregationPolicy::default())
            .run_project(&project, &range(), &mut store, &mut AutoConfirm, Some(&mut cache))
            .unwrap();
        assert_eq!(first.total_hours, 1.0);

        let remote = FakeEstimator::new(2.0, vec![("Work", 2.0)]).named("gemini");
        let second = Pipeline::new(&source, &remote, AggregationPolicy::default())
            .run_project(&project, &range(), &mut store, &mut AutoConfirm, Some(&mut cache))
            .unwrap();

        assert_eq!(remote.calls.get(), 1);
        assert_eq!(second.total_hours, 2.0);
        assert_eq!(offline.calls.get(), 1);
    }

    #[test]
    fn empty_day_makes_no_estimation_call() {
        let source = source(vec![("/src/api", vec![commit("b1", "other@x.com", 9)])]);
        let estimator = FakeEstimator::new(3.0, vec![]);
        let pipeline = Pipeline::new(&source, &estimator, AggregationPolicy::default());
        let mut store: HashMap<String, String> = HashMap::new();

        let report = pipeline
            .run_project(&ProjectConfig::new("api", "/src/api"), &range(), &mut store, &mut AutoConfirm, None)
            .unwrap();

        assert_eq!(report, ProjectReport::empty("api"));
        assert_eq!(estimator.calls.get(), 0);
    }
}
