use crate::export::{ExportOutcome, ExportStatus};
use crate::model::{ProjectOutcome, ProjectReport, RunReport, SCHEMA_VERSION};
use anyhow::Result;
use chrono::{DateTime, Utc};
use console::style;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

const TOP_TASKS: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutput {
    pub version: u32,
    pub generated_at: DateTime<Utc>,
    pub report: RunReport,
    pub exports: Vec<ExportOutcome>,
}

pub fn output_json(run: &RunReport, exports: &[ExportOutcome]) -> Result<()> {
    let output = RunOutput {
        version: SCHEMA_VERSION,
        generated_at: Utc::now(),
        report: run.clone(),
        exports: exports.to_vec(),
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

pub fn output_table(run: &RunReport, exports: &[ExportOutcome]) -> Result<()> {
    print!("{}", render_table(run, exports)?);
    Ok(())
}

pub fn render_table(run: &RunReport, exports: &[ExportOutcome]) -> Result<String> {
    let mut out = String::new();

    writeln!(
        out,
        "{} {}",
        style("Time report for").bold(),
        style(run.date.format("%Y-%m-%d")).bold().cyan()
    )?;
    writeln!(out, "{}", "─".repeat(50))?;

    for outcome in &run.outcomes {
        match outcome {
            ProjectOutcome::Succeeded { report } => render_report(&mut out, report)?,
            ProjectOutcome::Failed {
                project_name,
                kind,
                reason,
            } => {
                let label = if kind.is_fatal() {
                    style(format!("failed ({kind})")).red()
                } else {
                    style(format!("warning ({kind})")).yellow()
                };
                writeln!(out, "{} {label}: {reason}", style(project_name).bold())?;
            }
        }
    }

    writeln!(out, "{}", "─".repeat(50))?;
    writeln!(
        out,
        "Total: {} across {} project(s)",
        style(format!("{:.1}h", run.total_hours)).green().bold(),
        run.reports().count()
    )?;

    if !exports.is_empty() {
        writeln!(out, "\n{}", style("Exports").bold())?;
        for export in exports {
            let status = match &export.status {
                ExportStatus::Exported => style("exported".to_string()).green(),
                ExportStatus::AlreadyExported => style("already exported".to_string()).dim(),
                ExportStatus::TopUp { previously_booked } => {
                    style(format!("added to {previously_booked:.1}h booked earlier")).green()
                }
                ExportStatus::ChangedSinceExport { booked } => {
                    style(format!("not booked, {booked:.1}h already exported")).yellow()
                }
                ExportStatus::Failed { reason } => style(format!("failed: {reason}")).red(),
            };
            writeln!(
                out,
                "  {} {:.1}h -> task {}: {status}",
                export.project_name, export.entry.hours, export.entry.task_id
            )?;
        }
    }

    Ok(out)
}

fn render_report(out: &mut String, report: &ProjectReport) -> std::fmt::Result {
    let capped = if report.capped {
        format!(" (capped, estimated {:.1}h)", report.raw_total_hours)
    } else {
        String::new()
    };
    writeln!(
        out,
        "{} {} commits, {}{}",
        style(&report.project_name).bold(),
        report.commit_count,
        style(format!("{:.1}h", report.total_hours)).green(),
        style(capped).dim()
    )?;

    if report.commit_count == 0 {
        writeln!(out, "  {}", style("no commits").dim())?;
        return Ok(());
    }
    if !report.summary.is_empty() {
        writeln!(out, "  {}", report.summary)?;
    }
    for task in report.tasks.iter().take(TOP_TASKS) {
        writeln!(out, "    {:>4.1}h  {}", task.hours, task.description)?;
    }
    if report.tasks.len() > TOP_TASKS {
        writeln!(
            out,
            "    {}",
            style(format!("... and {} more", report.tasks.len() - TOP_TASKS)).dim()
        )?;
    }
    Ok(())
}
