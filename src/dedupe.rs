use crate::model::CommitRecord;
use std::collections::HashSet;

/// Collapse records that share a commit id. The first record seen for an id is
/// kept as-is; the output is ordered by `(timestamp, id)`.
pub fn dedupe(records: Vec<CommitRecord>) -> Vec<CommitRecord> {
    let mut seen: HashSet<String> = HashSet::with_capacity(records.len());
    let mut unique: Vec<CommitRecord> = records
        .into_iter()
        .filter(|record| seen.insert(record.id.clone()))
        .collect();

    unique.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
    unique
}
