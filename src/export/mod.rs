pub mod timecamp;

pub use timecamp::TimeCampClient;

use crate::cache::Cache;
use crate::config::ExportMode;
use crate::error::Result;
use crate::model::{ProjectConfig, ProjectReport, RunReport};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// One booking in the external time tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeEntry {
    pub task_id: String,
    pub date: NaiveDate,
    pub hours: f64,
    pub note: String,
}

pub trait ExportSink {
    fn push(&self, entry: &TimeEntry) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExportStatus {
    Exported,
    AlreadyExported,
    /// Only the hours on top of an earlier, smaller booking were pushed.
    TopUp { previously_booked: f64 },
    /// An earlier booking is larger than the current estimate; nothing pushed.
    ChangedSinceExport { booked: f64 },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportOutcome {
    pub project_name: String,
    pub entry: TimeEntry,
    #[serde(flatten)]
    pub status: ExportStatus,
}

/// Push the succeeded projects of `run` to `sink`.
///
/// Projects without export routing are skipped silently, as are entries with
/// zero hours. With a ledger, an entry booked earlier for the same day is not
/// pushed again: a larger estimate books only the difference, a smaller one is
/// reported and left alone. `force` pushes the full hours regardless. Failures
/// are logged and reported, never returned.
pub fn export_run(
    run: &RunReport,
    projects: &[ProjectConfig],
    sink: &dyn ExportSink,
    mode: ExportMode,
    mut ledger: Option<&mut Cache>,
    force: bool,
) -> Vec<ExportOutcome> {
    let mut outcomes = Vec::new();

    for report in run.reports() {
        let Some(task_id) = projects
            .iter()
            .find(|p| p.name == report.project_name)
            .and_then(ProjectConfig::export_task_id)
        else {
            debug!(project = %report.project_name, "export not configured");
            continue;
        };

        for (key, mut entry) in entries_for(report, task_id, run.date, mode) {
            let project = report.project_name.as_str();
            let full_hours = entry.hours;

            let booked = match ledger.as_deref() {
                Some(cache) if !force => cache
                    .booked_hours(project, run.date, task_id, &key)
                    .unwrap_or_else(|e| {
                        warn!(project, "export ledger lookup failed: {e}");
                        None
                    }),
                _ => None,
            };

            if let Some(booked) = booked {
                if (booked - full_hours).abs() < f64::EPSILON {
                    info!(project, task_id, "already exported, skipping");
                    outcomes.push(outcome(project, entry, ExportStatus::AlreadyExported));
                    continue;
                }
                if booked > full_hours {
                    warn!(project, task_id, booked, hours = full_hours, "estimate dropped below booked hours");
                    outcomes.push(outcome(project, entry, ExportStatus::ChangedSinceExport { booked }));
                    continue;
                }
                entry.hours = full_hours - booked;
            }

            let status = match sink.push(&entry) {
                Ok(()) => {
                    info!(project, task_id, hours = entry.hours, "exported");
                    if let Some(cache) = ledger.as_deref_mut() {
                        if let Err(e) = cache.record_export(project, run.date, task_id, &key, full_hours) {
                            warn!(project, "could not record export: {e}");
                        }
                    }
                    match booked {
                        Some(previously_booked) => ExportStatus::TopUp { previously_booked },
                        None => ExportStatus::Exported,
                    }
                }
                Err(e) => {
                    warn!(project, task_id, "export failed: {e}");
                    ExportStatus::Failed { reason: e.to_string() }
                }
            };
            outcomes.push(outcome(project, entry, status));
        }
    }

    outcomes
}

fn outcome(project: &str, entry: TimeEntry, status: ExportStatus) -> ExportOutcome {
    ExportOutcome {
        project_name: project.to_string(),
        entry,
        status,
    }
}

/// Ledger key and entry for each booking of one report. Repeated task
/// descriptions get a `#n` suffix so each keeps its own ledger row.
fn entries_for(report: &ProjectReport, task_id: &str, date: NaiveDate, mode: ExportMode) -> Vec<(String, TimeEntry)> {
    let entry = |hours: f64, note: String| TimeEntry {
        task_id: task_id.to_string(),
        date,
        hours,
        note,
    };

    match mode {
        ExportMode::Project => {
            if report.total_hours <= 0.0 {
                return Vec::new();
            }
            let note = if report.summary.is_empty() {
                format!("{}: {} commits", report.project_name, report.commit_count)
            } else {
                format!("{}: {}", report.project_name, report.summary)
            };
            vec![(String::new(), entry(report.total_hours, note))]
        }
        ExportMode::Task => {
            let mut seen: HashMap<&str, usize> = HashMap::new();
            report
                .tasks
                .iter()
                .filter(|t| t.hours > 0.0)
                .map(|t| {
                    let n = seen.entry(t.description.as_str()).or_default();
                    *n += 1;
                    let key = if *n == 1 {
                        t.description.clone()
                    } else {
                        format!("{}#{}", t.description, n)
                    };
                    (key, entry(t.hours, format!("{}: {}", report.project_name, t.description)))
                })
                .collect()
        }
    }
}
