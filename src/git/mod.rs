pub mod repo;

pub use repo::{ChangeStats, GitRepo};

use crate::author::{IdentityCandidate, IdentityProbe};
use crate::error::Result;
use crate::model::{CommitRecord, DayRange};
use std::path::Path;

/// Where raw commit records and author identities come from.
pub trait CommitSource {
    /// Commits inside `range` from every branch of the repository at `repo_path`,
    /// duplicates across branches included.
    fn fetch_commits(&self, repo_path: &Path, range: &DayRange) -> Result<Vec<CommitRecord>>;

    /// The identity configured for the repository, if any.
    fn probe_identity(&self, repo_path: &Path) -> Result<Option<IdentityCandidate>>;
}

/// `CommitSource` reading repositories on disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct GitSource {
    pub include_merges: bool,
}

impl GitSource {
    pub fn new(include_merges: bool) -> Self {
        Self { include_merges }
    }
}

impl CommitSource for GitSource {
    fn fetch_commits(&self, repo_path: &Path, range: &DayRange) -> Result<Vec<CommitRecord>> {
        GitRepo::open(repo_path)?.fetch_commits(range, self.include_merges)
    }

    fn probe_identity(&self, repo_path: &Path) -> Result<Option<IdentityCandidate>> {
        Ok(GitRepo::open(repo_path)?.probe())
    }
}
