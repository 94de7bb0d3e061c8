// Copyright 2020 Peter Williams <peter@newton.cx> and collaborators
// Licensed under the MIT License.

//! Reducing a commit's raw per-path changes to one decision per unique id.
//!
//! A single commit can touch the same note's unique id more than once: a
//! merge commit's diff-against-each-parent scheme naturally produces
//! duplicate entries, and a plain rename shows up as an add and a delete
//! sharing the same id. This module collapses those raw shapes into the
//! small set of changes the change tracker actually understands.

use std::collections::{HashMap, HashSet};

use crate::{
    errors::{Error, Result},
    repository::{RawChange, RawChangeKind},
    uid::unique_id,
};

/// One fully-resolved change to a single note, attributed to its unique id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregatedChange {
    /// The note started existing at `path` in this commit.
    Add { path: String },

    /// The note stopped existing. `tainted` is set when this delete was
    /// part of an ambiguous multi-delete shape that the tracker should
    /// treat cautiously (see the change tracker's documentation).
    Delete { tainted: bool },

    /// The note's path changed from `old_path` to `path`, with no content
    /// history implied beyond that.
    Rename { old_path: String, path: String },

    /// The note's content changed at `path`, with its identity preserved.
    Modify { path: String },
}

/// Reduce one commit's raw per-path changes to one `AggregatedChange` per
/// unique id touched by the commit.
///
/// `commit_label` is used only to annotate errors. `tainted` is the set of
/// uids the change tracker has already seen an ambiguous multi-delete for
/// elsewhere in the walk; a `{ADD, ADD, ...}` collision on one of those ids
/// is silently dropped rather than raised, since it is the other, expected
/// side of the same ambiguity rather than a fresh authoring mistake.
pub fn aggregate(
    commit_label: &str,
    raw: Vec<RawChange>,
    tainted: &HashSet<String>,
) -> Result<HashMap<String, AggregatedChange>> {
    let mut by_uid: HashMap<String, Vec<RawChange>> = HashMap::new();

    for change in raw {
        let basename = change.path.rsplit('/').next().unwrap_or(&change.path);
        let uid = unique_id(basename);
        by_uid.entry(uid).or_default().push(change);
    }

    let mut out = HashMap::new();

    for (uid, mut changes) in by_uid {
        if let Some(resolved) = reduce_one(commit_label, &uid, &mut changes, tainted)? {
            out.insert(uid, resolved);
        }
    }

    Ok(out)
}

fn reduce_one(
    commit_label: &str,
    uid: &str,
    changes: &mut Vec<RawChange>,
    tainted: &HashSet<String>,
) -> Result<Option<AggregatedChange>> {
    use RawChangeKind::*;

    // A single change is the common case: pass it straight through.
    if changes.len() == 1 {
        let c = changes.remove(0);
        return Ok(Some(match c.kind {
            Add => AggregatedChange::Add { path: c.path },
            Delete => AggregatedChange::Delete { tainted: false },
            Modify => AggregatedChange::Modify { path: c.path },
        }));
    }

    let adds: Vec<_> = changes.iter().filter(|c| c.kind == Add).cloned().collect();
    let deletes: Vec<_> = changes.iter().filter(|c| c.kind == Delete).cloned().collect();
    let modifies: Vec<_> = changes.iter().filter(|c| c.kind == Modify).cloned().collect();

    // {ADD, DELETE} (in either order, from two sides of a merge, or an
    // old-path/new-path pair split out of an undetected rename): a rename.
    if adds.len() == 1 && deletes.len() == 1 && modifies.is_empty() {
        return Ok(Some(AggregatedChange::Rename {
            old_path: deletes[0].path.clone(),
            path: adds[0].path.clone(),
        }));
    }

    // {MODIFY, MODIFY, ...}: both sides of a merge touched the same note
    // identically (from the aggregator's perspective, a path is a path);
    // collapse to one modify at the (necessarily shared) path.
    if !modifies.is_empty() && adds.is_empty() && deletes.is_empty() {
        return Ok(Some(AggregatedChange::Modify {
            path: modifies[0].path.clone(),
        }));
    }

    // {DELETE, DELETE, ...}: both sides of a merge deleted the note. Mark
    // tainted so the tracker knows not to treat a *subsequent* add of the
    // same id elsewhere in history as suspicious.
    if !deletes.is_empty() && adds.is_empty() && modifies.is_empty() {
        return Ok(Some(AggregatedChange::Delete { tainted: true }));
    }

    // {ADD, ADD, ...}: two genuinely different notes collided on the same
    // unique id within one commit — unless the id is already tainted by an
    // ambiguous multi-delete elsewhere in history, in which case this is
    // that same ambiguity resurfacing and the entries are dropped rather
    // than treated as an authoring mistake.
    if !adds.is_empty() && deletes.is_empty() && modifies.is_empty() {
        if tainted.contains(uid) {
            return Ok(None);
        }
        return Err(Error::DuplicateUidAdd {
            commit: commit_label.to_owned(),
            uid: uid.to_owned(),
        });
    }

    Err(Error::UnrecognizedChangeSet {
        commit: commit_label.to_owned(),
        uid: uid.to_owned(),
    })
}
