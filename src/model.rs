use chrono::{DateTime, Duration, Local, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

pub const SCHEMA_VERSION: u32 = 1;

/// One git commit as reported by a commit source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub id: String,
    pub author_email: String,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    #[serde(default)]
    pub files_changed: u32,
    #[serde(default)]
    pub insertions: u32,
    #[serde(default)]
    pub deletions: u32,
}

impl CommitRecord {
    pub fn short_id(&self) -> &str {
        self.id.get(..8).unwrap_or(&self.id)
    }

    pub fn lines_changed(&self) -> u64 {
        self.insertions as u64 + self.deletions as u64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timecamp_task_id: Option<String>,
    #[serde(default)]
    pub timecamp_enabled: bool,
}

impl ProjectConfig {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            author_email: None,
            timecamp_task_id: None,
            timecamp_enabled: false,
        }
    }

    /// Repository location with a leading `~` expanded.
    pub fn resolved_path(&self) -> PathBuf {
        crate::util::expand_home(&self.path)
    }

    /// Task id to export to, if export is switched on for this project.
    pub fn export_task_id(&self) -> Option<&str> {
        if !self.timecamp_enabled {
            return None;
        }
        self.timecamp_task_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEstimate {
    pub description: String,
    pub hours: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectReport {
    pub project_name: String,
    pub commit_count: usize,
    pub total_hours: f64,
    /// Unrounded total as returned by the estimator.
    pub raw_total_hours: f64,
    pub capped: bool,
    pub summary: String,
    pub tasks: Vec<TaskEstimate>,
}

impl ProjectReport {
    pub fn empty(project_name: impl Into<String>) -> Self {
        Self {
            project_name: project_name.into(),
            commit_count: 0,
            total_hours: 0.0,
            raw_total_hours: 0.0,
            capped: false,
            summary: String::new(),
            tasks: Vec::new(),
        }
    }

    pub fn task_hours(&self) -> f64 {
        self.tasks.iter().map(|t| t.hours).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Repository,
    AuthorUnresolved,
    Estimation,
    Other,
}

impl FailureKind {
    /// Failures that make the whole run exit non-zero. Estimation failures are
    /// reported as warnings only.
    pub fn is_fatal(self) -> bool {
        !matches!(self, FailureKind::Estimation)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureKind::Repository => "repository",
            FailureKind::AuthorUnresolved => "author unresolved",
            FailureKind::Estimation => "estimation",
            FailureKind::Other => "error",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProjectOutcome {
    Succeeded {
        report: ProjectReport,
    },
    Failed {
        project_name: String,
        kind: FailureKind,
        reason: String,
    },
}

impl ProjectOutcome {
    pub fn project_name(&self) -> &str {
        match self {
            ProjectOutcome::Succeeded { report } => &report.project_name,
            ProjectOutcome::Failed { project_name, .. } => project_name,
        }
    }

    pub fn report(&self) -> Option<&ProjectReport> {
        match self {
            ProjectOutcome::Succeeded { report } => Some(report),
            ProjectOutcome::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub date: NaiveDate,
    pub daily_cap: f64,
    pub outcomes: Vec<ProjectOutcome>,
    /// Sum over succeeded projects only.
    pub total_hours: f64,
}

impl RunReport {
    pub fn new(date: NaiveDate, daily_cap: f64, outcomes: Vec<ProjectOutcome>) -> Self {
        let total_hours = outcomes
            .iter()
            .filter_map(ProjectOutcome::report)
            .map(|r| r.total_hours)
            .sum();
        Self {
            date,
            daily_cap,
            outcomes,
            total_hours,
        }
    }

    pub fn reports(&self) -> impl Iterator<Item = &ProjectReport> {
        self.outcomes.iter().filter_map(ProjectOutcome::report)
    }

    pub fn failures(&self) -> impl Iterator<Item = &ProjectOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, ProjectOutcome::Failed { .. }))
    }

    pub fn has_fatal_failure(&self) -> bool {
        self.outcomes.iter().any(|o| {
            matches!(o, ProjectOutcome::Failed { kind, .. } if kind.is_fatal())
        })
    }
}

/// Half-open `[since, until)` window covering one calendar day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayRange {
    pub date: NaiveDate,
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

impl DayRange {
    pub fn for_date<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> Self {
        let midnight = date.and_time(chrono::NaiveTime::MIN);
        // A DST gap at midnight has no local 00:00; fall back to reading it as UTC.
        let since = tz
            .from_local_datetime(&midnight)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&midnight));
        Self {
            date,
            since,
            until: since + Duration::hours(24),
        }
    }

    pub fn for_local_date(date: NaiveDate) -> Self {
        Self::for_date(date, &Local)
    }

    pub fn contains(&self, timestamp: &DateTime<Utc>) -> bool {
        timestamp >= &self.since && timestamp < &self.until
    }
}
