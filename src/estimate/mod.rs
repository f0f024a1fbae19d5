pub mod gemini;
pub mod heuristic;

pub use gemini::GeminiEstimator;
pub use heuristic::HeuristicEstimator;

use crate::error::Result;
use crate::model::{CommitRecord, TaskEstimate};
use serde::{Deserialize, Serialize};

/// What an estimator gets to see of one commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitSummary {
    pub short_id: String,
    pub message: String,
    pub files_changed: u32,
    pub insertions: u32,
    pub deletions: u32,
}

impl From<&CommitRecord> for CommitSummary {
    fn from(record: &CommitRecord) -> Self {
        Self {
            short_id: record.short_id().to_string(),
            message: record.message.clone(),
            files_changed: record.files_changed,
            insertions: record.insertions,
            deletions: record.deletions,
        }
    }
}

impl CommitSummary {
    pub fn lines_changed(&self) -> u64 {
        self.insertions as u64 + self.deletions as u64
    }
}

/// Unrounded estimator output, before rounding and capping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEstimate {
    pub summary: String,
    pub total_hours: f64,
    pub tasks: Vec<TaskEstimate>,
}

/// Batch time estimation: one call covers every commit of a project.
pub trait Estimator {
    fn name(&self) -> &str;

    /// Identifies everything that shapes the output: cached reports built
    /// under a different key are not reused.
    fn cache_key(&self) -> String {
        self.name().to_string()
    }

    fn estimate(&self, project: &str, commits: &[CommitSummary]) -> Result<RawEstimate>;
}
