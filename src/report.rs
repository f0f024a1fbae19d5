use crate::aggregate::AggregationPolicy;
use crate::author::{AutoConfirm, Confirmer};
use crate::cache::Cache;
use crate::cli::Cli;
use crate::config::{ConfigStore, EstimatorKind, Settings};
use crate::estimate::{Estimator, GeminiEstimator, HeuristicEstimator};
use crate::export::{export_run, ExportOutcome, TimeCampClient};
use crate::git::GitSource;
use crate::model::{DayRange, RunReport};
use crate::output::{output_json, output_table};
use crate::pipeline::Pipeline;
use crate::prompt::ConsoleConfirmer;
use crate::util::parse_target_date;
use anyhow::{ensure, Context};
use chrono::Local;
use std::io::IsTerminal;
use std::process::ExitCode;
use tracing::{info, warn};

pub fn exec(cli: Cli) -> anyhow::Result<ExitCode> {
    let today = Local::now().date_naive();
    let date = match cli.date.as_deref() {
        Some(input) => parse_target_date(input, today).context("Invalid target date")?,
        None => today,
    };
    let range = DayRange::for_local_date(date);

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => ConfigStore::default_path()?,
    };
    let mut store = ConfigStore::load(&config_path).context("Failed to load project configuration")?;
    let settings = apply_overrides(store.settings().clone(), &cli)?;
    let timeout = settings.request_timeout()?;

    let estimator = build_estimator(&settings, timeout).context("Failed to set up estimator")?;

    let mut cache = match Cache::new(cli.cache.as_deref()) {
        Ok(cache) => Some(cache),
        Err(e) => {
            warn!("cache unavailable, continuing without it: {e}");
            None
        }
    };

    let mut confirmer: Box<dyn Confirmer> = if cli.yes || !interactive() {
        Box::new(AutoConfirm)
    } else {
        Box::new(ConsoleConfirmer::new())
    };

    let source = GitSource::new(cli.include_merges);
    let policy = AggregationPolicy {
        daily_cap: settings.daily_cap,
        ..AggregationPolicy::default()
    };
    let mut pipeline = Pipeline::new(&source, estimator.as_ref(), policy)
        .reconfigure_author(cli.reconfigure_author)
        .refresh(cli.refresh);
    if !cli.json {
        pipeline = pipeline.with_spinner();
    }

    let projects = store.projects().to_vec();
    if projects.is_empty() {
        warn!(config = %store.path().display(), "no projects configured");
    }
    info!(%date, projects = projects.len(), estimator = estimator.name(), "starting run");

    let run = pipeline.run(&projects, &range, &mut store, confirmer.as_mut(), cache.as_mut());

    let exports = if cli.no_export {
        Vec::new()
    } else {
        export(&run, &store, &settings, &cli, timeout, cache.as_mut())
    };

    if cli.json {
        output_json(&run, &exports)?;
    } else {
        output_table(&run, &exports)?;
    }

    Ok(if run.has_fatal_failure() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn apply_overrides(mut settings: Settings, cli: &Cli) -> anyhow::Result<Settings> {
    if let Some(cap) = cli.daily_cap {
        ensure!(cap.is_finite() && cap > 0.0, "--daily-cap must be positive, got {cap}");
        settings.daily_cap = cap;
    }
    if let Some(kind) = cli.estimator {
        settings.estimator = kind;
    }
    if let Some(mode) = cli.export_mode {
        settings.export_mode = mode;
    }
    Ok(settings)
}

fn build_estimator(settings: &Settings, timeout: std::time::Duration) -> crate::error::Result<Box<dyn Estimator>> {
    let estimator: Box<dyn Estimator> = match settings.estimator {
        EstimatorKind::Gemini => Box::new(
            GeminiEstimator::from_env(&settings.gemini_model, timeout, settings.hours_scale)?
                .with_base_url(&settings.gemini_url),
        ),
        EstimatorKind::Heuristic => Box::new(HeuristicEstimator::new(settings.hours_scale)),
    };
    Ok(estimator)
}

fn export(
    run: &RunReport,
    store: &ConfigStore,
    settings: &Settings,
    cli: &Cli,
    timeout: std::time::Duration,
    ledger: Option<&mut Cache>,
) -> Vec<ExportOutcome> {
    let routed = store.projects().iter().any(|p| p.export_task_id().is_some());
    if !routed {
        return Vec::new();
    }

    match TimeCampClient::from_env(&settings.timecamp_url, timeout) {
        Ok(client) => export_run(
            run,
            store.projects(),
            &client,
            settings.export_mode,
            ledger,
            cli.force_export,
        ),
        Err(e) => {
            warn!("export skipped: {e}");
            Vec::new()
        }
    }
}

fn interactive() -> bool {
    console::user_attended_stderr() && std::io::stdin().is_terminal()
}
