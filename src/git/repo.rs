use crate::author::IdentityProbe;
use crate::error::{Result, TimekeepError};
use crate::model::{CommitRecord, DayRange};
use chrono::{DateTime, Utc};
use gix::config::Source;
use gix::object::tree::diff::ChangeDetached;
use gix::{ObjectId, Repository};
use similar::{ChangeTag, TextDiff};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Files and lines touched by one commit, relative to its first parent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeStats {
    pub files_changed: u32,
    pub insertions: u32,
    pub deletions: u32,
}

pub struct GitRepo {
    repo: Repository,
    path: PathBuf,
}

impl GitRepo {
    /// Open the repository at exactly `path`; parent directories are not searched.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(TimekeepError::Repository(format!(
                "path does not exist: {}",
                path.display()
            )));
        }

        let repo = gix::open(path).map_err(|e| {
            TimekeepError::Repository(format!("not a git repository: {} ({e})", path.display()))
        })?;
        let path = repo.workdir().unwrap_or_else(|| repo.path()).to_path_buf();

        Ok(Self { repo, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every commit inside `range` reachable from any reference.
    ///
    /// Each reference is walked separately, so a commit reachable from several
    /// branches is returned once per branch.
    pub fn fetch_commits(&self, range: &DayRange, include_merges: bool) -> Result<Vec<CommitRecord>> {
        let tips = self.reference_tips()?;
        let mut stats_memo: HashMap<ObjectId, ChangeStats> = HashMap::new();
        let mut records = Vec::new();

        for (name, tip) in &tips {
            let before = records.len();
            self.walk_from(*tip, range, include_merges, &mut stats_memo, &mut records)?;
            debug!(reference = %name, commits = records.len() - before, "walked reference");
        }

        Ok(records)
    }

    fn reference_tips(&self) -> Result<Vec<(String, ObjectId)>> {
        let mut tips = Vec::new();

        let platform = self
            .repo
            .references()
            .map_err(|e| TimekeepError::GitRepo(e.to_string()))?;
        let references = platform
            .all()
            .map_err(|e| TimekeepError::GitRepo(e.to_string()))?;

        for reference in references {
            let mut reference = reference.map_err(|e| TimekeepError::GitRepo(e.to_string()))?;
            let name = reference.name().as_bstr().to_string();
            match reference.peel_to_id_in_place() {
                Ok(id) => tips.push((name, id.detach())),
                Err(e) => debug!(reference = %name, "skipping reference: {e}"),
            }
        }

        // Detached HEAD is not listed under refs/.
        if let Ok(id) = self.repo.head_id() {
            tips.push(("HEAD".to_string(), id.detach()));
        }

        tips.retain(|(name, id)| match self.repo.find_object(*id) {
            Ok(object) => object.kind == gix::object::Kind::Commit,
            Err(e) => {
                debug!(reference = %name, "dropping tip: {e}");
                false
            }
        });
        Ok(tips)
    }

    fn walk_from(
        &self,
        tip: ObjectId,
        range: &DayRange,
        include_merges: bool,
        stats_memo: &mut HashMap<ObjectId, ChangeStats>,
        records: &mut Vec<CommitRecord>,
    ) -> Result<()> {
        let mut seen: HashSet<ObjectId> = HashSet::new();
        let mut stack: Vec<ObjectId> = vec![tip];

        while let Some(commit_id) = stack.pop() {
            if !seen.insert(commit_id) {
                continue;
            }

            let commit = self.repo.find_commit(commit_id)?;
            let secs = commit.time()?.seconds;
            let timestamp: DateTime<Utc> = DateTime::from_timestamp(secs, 0)
                .ok_or_else(|| TimekeepError::InvalidDate(format!("Invalid timestamp: {secs}")))?;

            // Same cut-off as `git log --since`: history below an older commit is not visited.
            if timestamp < range.since {
                continue;
            }

            let parents: Vec<ObjectId> = commit.parent_ids().map(|id| id.into()).collect();
            stack.extend(parents.iter().copied());

            if !range.contains(&timestamp) {
                continue;
            }
            if !include_merges && parents.len() > 1 {
                continue;
            }

            let stats = match stats_memo.get(&commit_id) {
                Some(stats) => *stats,
                None => {
                    let stats = self.change_stats(commit_id, parents.first().copied())?;
                    stats_memo.insert(commit_id, stats);
                    stats
                }
            };

            let author = commit.author()?;
            let message = commit.message()?;
            records.push(CommitRecord {
                id: commit_id.to_string(),
                author_email: author.email.to_string(),
                timestamp,
                message: message.title.to_string().trim().to_string(),
                files_changed: stats.files_changed,
                insertions: stats.insertions,
                deletions: stats.deletions,
            });
        }

        Ok(())
    }

    fn change_stats(&self, commit_id: ObjectId, first_parent: Option<ObjectId>) -> Result<ChangeStats> {
        let commit_tree = self.repo.find_commit(commit_id)?.tree()?;
        let parent_tree = match first_parent {
            Some(parent_id) => Some(self.repo.find_commit(parent_id)?.tree()?),
            None => None,
        };

        let changes: Vec<ChangeDetached> =
            self.repo
                .diff_tree_to_tree(parent_tree.as_ref(), Some(&commit_tree), None)?;

        let mut stats = ChangeStats::default();
        for change in changes {
            self.add_change(change, &mut stats);
        }
        Ok(stats)
    }

    fn add_change(&self, change: ChangeDetached, stats: &mut ChangeStats) {
        match change {
            ChangeDetached::Addition { id, entry_mode, .. } => {
                if entry_mode.is_tree() {
                    return;
                }
                stats.files_changed += 1;
                if let Some(data) = self.blob_data(id) {
                    stats.insertions += count_lines(&data);
                }
            }
            ChangeDetached::Deletion { id, entry_mode, .. } => {
                if entry_mode.is_tree() {
                    return;
                }
                stats.files_changed += 1;
                if let Some(data) = self.blob_data(id) {
                    stats.deletions += count_lines(&data);
                }
            }
            ChangeDetached::Modification {
                previous_id,
                id,
                entry_mode,
                ..
            } => {
                if entry_mode.is_tree() {
                    return;
                }
                stats.files_changed += 1;
                if let (Some(old), Some(new)) = (self.blob_data(previous_id), self.blob_data(id)) {
                    let (added, deleted) = line_delta(&old, &new);
                    stats.insertions += added;
                    stats.deletions += deleted;
                }
            }
            ChangeDetached::Rewrite {
                source_id,
                id,
                entry_mode,
                copy,
                ..
            } => {
                if entry_mode.is_tree() {
                    return;
                }
                // A rename touches both paths; a copy only creates the destination.
                stats.files_changed += if copy { 1 } else { 2 };
                if let (Some(old), Some(new)) = (self.blob_data(source_id), self.blob_data(id)) {
                    let (added, deleted) = line_delta(&old, &new);
                    stats.insertions += added;
                    stats.deletions += deleted;
                }
            }
        }
    }

    fn blob_data(&self, id: ObjectId) -> Option<Vec<u8>> {
        self.repo
            .find_object(id)
            .ok()
            .map(|mut object| std::mem::take(&mut object.data))
    }
}

impl GitRepo {
    fn config_email(&self, scope: fn(Source) -> bool) -> Option<String> {
        let snapshot = self.repo.config_snapshot();
        snapshot
            .plumbing()
            .string_filter("user.email", &mut |meta: &gix::config::file::Metadata| scope(meta.source))
            .map(|value| value.to_string())
    }
}

impl IdentityProbe for GitRepo {
    fn local_email(&self) -> Option<String> {
        self.config_email(|source| matches!(source, Source::Local | Source::Worktree))
    }

    fn global_email(&self) -> Option<String> {
        self.config_email(|source| matches!(source, Source::User | Source::Git))
    }
}

fn is_binary(data: &[u8]) -> bool {
    data.iter().take(8192).any(|&b| b == 0)
}

fn count_lines(data: &[u8]) -> u32 {
    if is_binary(data) {
        return 0;
    }
    String::from_utf8_lossy(data).lines().count() as u32
}

/// Inserted and deleted line counts between two blobs. Binary content counts
/// as zero lines.
fn line_delta(old: &[u8], new: &[u8]) -> (u32, u32) {
    if is_binary(old) || is_binary(new) {
        return (0, 0);
    }
    let old = String::from_utf8_lossy(old);
    let new = String::from_utf8_lossy(new);

    TextDiff::from_lines(old.as_ref(), new.as_ref())
        .iter_all_changes()
        .fold((0, 0), |(added, deleted), change| match change.tag() {
            ChangeTag::Insert => (added + 1, deleted),
            ChangeTag::Delete => (added, deleted + 1),
            ChangeTag::Equal => (added, deleted),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn line_delta_counts_changed_lines() {
        let old = b"fn a() {}\nfn b() {}\nfn c() {}\n";
        let new = b"fn a() {}\nfn b2() {}\nfn c() {}\nfn d() {}\n";
        assert_eq!(line_delta(old, new), (2, 1));
    }

    #[test]
    fn binary_blobs_have_no_lines() {
        let binary = [0x89, b'P', b'N', b'G', 0x00, 0x01];
        assert_eq!(count_lines(&binary), 0);
        assert_eq!(line_delta(&binary, b"text\n"), (0, 0));
    }

    #[test]
    fn count_lines_handles_missing_trailing_newline() {
        assert_eq!(count_lines(b"one\ntwo"), 2);
        assert_eq!(count_lines(b""), 0);
    }

    #[test]
    fn open_rejects_missing_path() {
        let err = GitRepo::open("/definitely/not/a/repo/path").err().unwrap();
        assert!(matches!(err, TimekeepError::Repository(_)));
    }
}
