use super::{CommitSummary, Estimator, RawEstimate};
use crate::error::Result;
use crate::model::TaskEstimate;

pub const BASE_HOURS: f64 = 0.5;
pub const LINES_PER_HOUR: f64 = 100.0;
pub const MAX_HOURS: f64 = 8.0;

/// Offline estimator driven by line counts only.
///
/// Total is `min(BASE_HOURS + lines / LINES_PER_HOUR, MAX_HOURS)`, scaled by
/// `hours_scale`. Each commit becomes one task carrying its share of the total,
/// weighted by lines changed (plus one so empty commits still count).
#[derive(Debug, Clone)]
pub struct HeuristicEstimator {
    hours_scale: f64,
}

impl HeuristicEstimator {
    pub fn new(hours_scale: f64) -> Self {
        Self { hours_scale }
    }
}

impl Default for HeuristicEstimator {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl Estimator for HeuristicEstimator {
    fn name(&self) -> &str {
        "heuristic"
    }

    fn cache_key(&self) -> String {
        format!("heuristic:{}", self.hours_scale)
    }

    fn estimate(&self, _project: &str, commits: &[CommitSummary]) -> Result<RawEstimate> {
        let lines: u64 = commits.iter().map(CommitSummary::lines_changed).sum();
        let total_hours =
            (BASE_HOURS + lines as f64 / LINES_PER_HOUR).min(MAX_HOURS) * self.hours_scale;

        let weights: Vec<f64> = commits
            .iter()
            .map(|c| (c.lines_changed() + 1) as f64)
            .collect();
        let weight_sum: f64 = weights.iter().sum();

        let tasks = commits
            .iter()
            .zip(&weights)
            .map(|(c, w)| TaskEstimate {
                description: c.message.clone(),
                hours: total_hours * w / weight_sum,
            })
            .collect();

        Ok(RawEstimate {
            summary: format!("{} commits, {} lines changed", commits.len(), lines),
            total_hours,
            tasks,
        })
    }
}
