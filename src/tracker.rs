// Copyright 2020 Peter Williams <peter@newton.cx> and collaborators
// Licensed under the MIT License.

//! Accumulating per-note history across a reverse-chronological commit walk.
//!
//! The topological walker visits commits newest-first: children are
//! materialized before their parents. The tracker is fed each commit's
//! aggregated changes in that same order, and because it walks backward
//! through time, a note's *first* appearance in the tracker is always its
//! most recent state, and its *last* appearance is its oldest. That means
//! every update this tracker makes is, chronologically, an update to an
//! *earlier* version of the note than whatever it already knew.

use std::collections::{HashMap, HashSet};

use crate::{aggregator::AggregatedChange, repository::CommitId};

/// Everything the tracker knows about a single unique id once the walk
/// that fed it has finished.
#[derive(Debug, Clone)]
pub struct NoteHistory {
    /// The newest filename this note was known by (the first one the
    /// reverse walk encountered).
    pub current_path: String,

    /// The oldest commit at which this note is known to have already
    /// existed, in whatever form. This is the commit that should be
    /// credited with "introducing" the note for version-attribution
    /// purposes.
    pub earliest_seen: CommitId,

    /// The newest commit at which this note was touched — the first one
    /// the reverse walk encountered. This is where its current content
    /// should be read from.
    pub latest_seen: CommitId,
}

/// Accumulates, uid by uid, the history implied by a sequence of commits'
/// aggregated changes, fed in reverse-chronological (newest-first) order.
#[derive(Debug, Default)]
pub struct ChangeTracker {
    last_name_by_id: HashMap<String, String>,
    latest_seen: HashMap<String, CommitId>,
    earliest_seen: HashMap<String, CommitId>,
    deleted_uids: HashSet<String>,
    /// Uids whose deletion was tainted (part of an ambiguous multi-delete
    /// merge shape), so that the inversion pass can discount a later
    /// "reappearance" of the same id as a fresh note rather than a bug.
    tainted_deletes: HashSet<String>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in one commit's aggregated changes.
    ///
    /// `commit` identifies this point in history for `earliest_seen`
    /// bookkeeping; `changes` is the commit's per-uid aggregated changes as
    /// produced by [`crate::aggregator::aggregate`].
    pub fn record(&mut self, commit: CommitId, changes: &HashMap<String, AggregatedChange>) {
        for (uid, change) in changes {
            match change {
                AggregatedChange::Add { path } => {
                    self.last_name_by_id
                        .entry(uid.clone())
                        .or_insert_with(|| path.clone());
                    self.latest_seen.entry(uid.clone()).or_insert(commit);
                    // An add is the terminal, oldest event for this uid:
                    // there is no earlier state to fold in after this.
                    self.earliest_seen.insert(uid.clone(), commit);
                }
                AggregatedChange::Modify { path } => {
                    self.last_name_by_id
                        .entry(uid.clone())
                        .or_insert_with(|| path.clone());
                    self.latest_seen.entry(uid.clone()).or_insert(commit);
                    self.earliest_seen.insert(uid.clone(), commit);
                }
                AggregatedChange::Rename { old_path, path } => {
                    self.last_name_by_id
                        .entry(uid.clone())
                        .or_insert_with(|| path.clone());
                    self.latest_seen.entry(uid.clone()).or_insert(commit);
                    self.earliest_seen.insert(uid.clone(), commit);
                    // Older history will refer to the note by its old
                    // name; nothing further to do here since lookups are
                    // keyed by uid, not path.
                    let _ = old_path;
                }
                AggregatedChange::Delete { tainted } => {
                    // We're walking backward and haven't seen this uid
                    // before, so as of `commit`'s first parent the note no
                    // longer exists. Older commits may still reveal it.
                    self.deleted_uids.insert(uid.clone());
                    if *tainted {
                        self.tainted_deletes.insert(uid.clone());
                    }
                }
            }
        }
    }

    /// True if `uid` has ever been observed (in any form) by this tracker.
    pub fn knows(&self, uid: &str) -> bool {
        self.last_name_by_id.contains_key(uid) || self.deleted_uids.contains(uid)
    }

    /// True if `uid` was deleted at some point in the walked history and
    /// has not subsequently (i.e. at an older commit) been re-added.
    pub fn is_deleted(&self, uid: &str) -> bool {
        self.deleted_uids.contains(uid) && !self.last_name_by_id.contains_key(uid)
    }

    pub fn is_tainted(&self, uid: &str) -> bool {
        self.tainted_deletes.contains(uid)
    }

    /// The full set of uids tainted so far, for threading into a later
    /// call to [`crate::aggregator::aggregate`] as the walk proceeds.
    pub fn tainted_uids(&self) -> &HashSet<String> {
        &self.tainted_deletes
    }

    /// Consume the tracker, producing the final per-uid history map.
    pub fn finish(self) -> HashMap<String, NoteHistory> {
        self.last_name_by_id
            .into_iter()
            .map(|(uid, current_path)| {
                let earliest_seen = self.earliest_seen[&uid];
                let latest_seen = self.latest_seen[&uid];
                (
                    uid,
                    NoteHistory {
                        current_path,
                        earliest_seen,
                        latest_seen,
                    },
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::AggregatedChange;

    fn commit(n: u8) -> CommitId {
        let mut bytes = [0u8; 20];
        bytes[19] = n;
        CommitId::Commit(git2::Oid::from_bytes(&bytes).unwrap())
    }

    #[test]
    fn modify_then_add_records_earliest_as_the_add() {
        let mut t = ChangeTracker::new();

        let mut c2_changes = HashMap::new();
        c2_changes.insert(
            "uid1".to_owned(),
            AggregatedChange::Modify {
                path: "notes/a-uid1.yaml".to_owned(),
            },
        );
        t.record(commit(2), &c2_changes);

        let mut c1_changes = HashMap::new();
        c1_changes.insert(
            "uid1".to_owned(),
            AggregatedChange::Add {
                path: "notes/a-uid1.yaml".to_owned(),
            },
        );
        t.record(commit(1), &c1_changes);

        let history = t.finish();
        let h = &history["uid1"];
        assert_eq!(h.current_path, "notes/a-uid1.yaml");
        assert_eq!(h.earliest_seen, commit(1));
        assert_eq!(h.latest_seen, commit(2));
    }

    #[test]
    fn delete_with_no_later_reappearance_is_deleted() {
        let mut t = ChangeTracker::new();
        let mut changes = HashMap::new();
        changes.insert(
            "uid2".to_owned(),
            AggregatedChange::Delete { tainted: false },
        );
        t.record(commit(1), &changes);

        assert!(t.is_deleted("uid2"));
        assert!(!t.is_tainted("uid2"));
        assert!(t.finish().get("uid2").is_none());
    }

    #[test]
    fn rename_preserves_newest_name() {
        let mut t = ChangeTracker::new();

        let mut c2 = HashMap::new();
        c2.insert(
            "uid3".to_owned(),
            AggregatedChange::Rename {
                old_path: "notes/old-uid3.yaml".to_owned(),
                path: "notes/new-uid3.yaml".to_owned(),
            },
        );
        t.record(commit(2), &c2);

        let mut c1 = HashMap::new();
        c1.insert(
            "uid3".to_owned(),
            AggregatedChange::Add {
                path: "notes/old-uid3.yaml".to_owned(),
            },
        );
        t.record(commit(1), &c1);

        let history = t.finish();
        assert_eq!(history["uid3"].current_path, "notes/new-uid3.yaml");
        assert_eq!(history["uid3"].earliest_seen, commit(1));
    }
}
