use crate::config::{EstimatorKind, ExportMode};
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug, Clone)]
#[command(name = "timekeep")]
#[command(about = "Estimate the hours you worked per project from the day's git commits")]
#[command(version)]
pub struct Cli {
    #[arg(help = "Day to report on: YYYY-MM-DD, YYYY/MM/DD, DD-MM-YYYY, DD/MM/YYYY, today, yesterday or 'N days ago' (default: today)")]
    pub date: Option<String>,

    #[arg(long, help = "Path to the project configuration file")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Directory for the cache database")]
    pub cache: Option<PathBuf>,

    #[arg(long, help = "Do not push hours to TimeCamp")]
    pub no_export: bool,

    #[arg(long, help = "Ask for each project's author identity again")]
    pub reconfigure_author: bool,

    #[arg(short, long, help = "Accept detected author identities without asking")]
    pub yes: bool,

    #[arg(long, help = "Output as JSON")]
    pub json: bool,

    #[arg(long, help = "Maximum hours booked per project and day")]
    pub daily_cap: Option<f64>,

    #[arg(long, value_enum, help = "Estimation backend")]
    pub estimator: Option<EstimatorKind>,

    #[arg(long, value_enum, help = "Book one entry per project or one per task")]
    pub export_mode: Option<ExportMode>,

    #[arg(long, help = "Include merge commits")]
    pub include_merges: bool,

    #[arg(long, help = "Ignore cached estimates")]
    pub refresh: bool,

    #[arg(long, help = "Export entries even if they were already booked")]
    pub force_export: bool,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    pub fn execute(self) -> Result<ExitCode> {
        crate::report::exec(self)
    }
}
