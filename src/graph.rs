// Copyright 2020 Peter Williams <peter@newton.cx> and collaborators
// Licensed under the MIT License.

//! Topological walk of the commit graph feeding the scanner.
//!
//! Commits are visited with every child materialized before its parents,
//! exactly once each, and with a merge commit's non-first parents (its
//! "side branches") explored in full before its first parent (the
//! "mainline") is resumed. This mirrors `git log --topo-order` and is what
//! lets the scanner walk backward through history while still being able
//! to say "this note was introduced no later than this commit" as soon as
//! it sees it.

use std::collections::{HashMap, HashSet};

use petgraph::graph::{DiGraph, NodeIndex};

use crate::errors::Result;

/// Walks the commit DAG rooted at `start`, stopping at (but including) any
/// commit in `stop_at`, and returns commits in children-first topological
/// order.
///
/// When `elide_null_merges` is set, a merge commit whose tree is identical
/// to its first parent's tree — and whose other parent is reachable from a
/// version tag — contributes nothing of its own and is dropped from the
/// returned order; its parents are still visited normally. This is the
/// shape left behind by a "merge up" of a release branch that introduced
/// no new notes itself.
pub fn walk<F>(
    start: git2::Oid,
    parents_of: impl Fn(git2::Oid) -> Result<Vec<git2::Oid>>,
    stop_at: &HashSet<git2::Oid>,
    elide_null_merges: bool,
    is_null_merge: F,
) -> Result<Vec<git2::Oid>>
where
    F: Fn(git2::Oid, &[git2::Oid]) -> Result<bool>,
{
    // First pass: discover every reachable node (without crossing a stop
    // point) and build a small petgraph DAG purely so we get a
    // `DiGraph`-backed adjacency structure to traverse, consistent with
    // how this crate represents other internal graphs.
    let mut graph: DiGraph<git2::Oid, ()> = DiGraph::new();
    let mut index_of: HashMap<git2::Oid, NodeIndex> = HashMap::new();
    let mut parents_cache: HashMap<git2::Oid, Vec<git2::Oid>> = HashMap::new();

    let mut frontier = vec![start];
    index_of.insert(start, graph.add_node(start));

    while let Some(oid) = frontier.pop() {
        if stop_at.contains(&oid) && oid != start {
            parents_cache.insert(oid, Vec::new());
            continue;
        }

        let parents = parents_of(oid)?;
        let from_idx = index_of[&oid];

        for &parent in &parents {
            let to_idx = *index_of.entry(parent).or_insert_with(|| graph.add_node(parent));
            graph.add_edge(from_idx, to_idx, ());

            if !parents_cache.contains_key(&parent) {
                frontier.push(parent);
            }
        }

        parents_cache.insert(oid, parents);
    }

    // Second pass: children-first topological walk via an explicit stack.
    // A node is only emitted once every one of its children has already
    // been emitted; parents are pushed left-to-right and popped
    // right-to-left, so the last (non-first, "side branch") parent of a
    // merge is fully explored before the stack returns to the first
    // parent.
    let mut children_remaining: HashMap<git2::Oid, usize> =
        parents_cache.keys().map(|&oid| (oid, 0)).collect();

    for parents in parents_cache.values() {
        for &parent in parents {
            *children_remaining.entry(parent).or_insert(0) += 1;
        }
    }

    let mut order = Vec::new();
    let mut emitted: HashSet<git2::Oid> = HashSet::new();
    let mut dropped: HashSet<git2::Oid> = HashSet::new();
    let mut stack = vec![start];

    while let Some(&oid) = stack.last() {
        if emitted.contains(&oid) {
            stack.pop();
            continue;
        }

        if children_remaining.get(&oid).copied().unwrap_or(0) > 0 {
            // Not ready yet; one of its children is still ahead of it on
            // the stack and will decrement this count when it emits.
            stack.pop();
            continue;
        }

        emitted.insert(oid);
        let parents = parents_cache.get(&oid).cloned().unwrap_or_default();

        let elide = elide_null_merges && parents.len() > 1 && is_null_merge(oid, &parents)?;

        if !elide {
            order.push(oid);
        }

        for &parent in &parents {
            if let Some(count) = children_remaining.get_mut(&parent) {
                *count = count.saturating_sub(1);
            }
        }

        stack.pop();

        if elide {
            // The merge contributes nothing of its own, and per the spec
            // its non-first parents are "marked as emitted without
            // traversal" — the side branch's whole history is skipped,
            // not just the merge commit. Still account for the edges the
            // first pass counted, so a node also reachable through the
            // surviving first parent isn't stranded waiting on a
            // decrement that will never come.
            for &parent in &parents[1..] {
                drop_subtree(parent, &parents_cache, &mut children_remaining, &mut dropped);
            }
            if let Some(&first) = parents.first() {
                if !emitted.contains(&first) {
                    stack.push(first);
                }
            }
        } else {
            for &parent in &parents {
                if !emitted.contains(&parent) {
                    stack.push(parent);
                }
            }
        }
    }

    Ok(order)
}

/// Walk a to-be-dropped merge parent's own ancestry, decrementing the
/// child-count bookkeeping the same way a real emission would, without
/// adding anything to the emitted/order sets. A node reachable only through
/// the dropped side simply never accumulates enough decrements to be
/// pushed onto the main stack; a node also reachable elsewhere still gets
/// its count right for when that other path reaches it.
fn drop_subtree(
    start: git2::Oid,
    parents_cache: &HashMap<git2::Oid, Vec<git2::Oid>>,
    children_remaining: &mut HashMap<git2::Oid, usize>,
    dropped: &mut HashSet<git2::Oid>,
) {
    let mut stack = vec![start];
    while let Some(oid) = stack.pop() {
        if !dropped.insert(oid) {
            continue;
        }
        if let Some(parents) = parents_cache.get(&oid) {
            for &parent in parents {
                if let Some(count) = children_remaining.get_mut(&parent) {
                    *count = count.saturating_sub(1);
                }
                stack.push(parent);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    struct TestRepo {
        _dir: tempfile::TempDir,
        repo: git2::Repository,
    }

    impl TestRepo {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let repo = git2::Repository::init(dir.path()).unwrap();
            {
                let mut cfg = repo.config().unwrap();
                cfg.set_str("user.name", "Test").unwrap();
                cfg.set_str("user.email", "test@example.com").unwrap();
            }
            TestRepo { _dir: dir, repo }
        }

        fn commit(&self, message: &str, parents: &[git2::Oid]) -> git2::Oid {
            let sig = git2::Signature::now("Test", "test@example.com").unwrap();
            fs::write(self.repo.workdir().unwrap().join("f.txt"), message).unwrap();
            let mut index = self.repo.index().unwrap();
            index.add_path(std::path::Path::new("f.txt")).unwrap();
            index.write().unwrap();
            let tree_oid = index.write_tree().unwrap();
            let tree = self.repo.find_tree(tree_oid).unwrap();
            let parent_commits: Vec<_> = parents
                .iter()
                .map(|p| self.repo.find_commit(*p).unwrap())
                .collect();
            let parent_refs: Vec<&git2::Commit> = parent_commits.iter().collect();
            self.repo
                .commit(Some("HEAD"), &sig, &sig, message, &tree, &parent_refs)
                .unwrap()
        }

        fn parents_of(&self, oid: git2::Oid) -> Result<Vec<git2::Oid>> {
            Ok(self.repo.find_commit(oid)?.parent_ids().collect())
        }
    }

    #[test]
    fn linear_history_walks_newest_first() {
        let t = TestRepo::new();
        let c1 = t.commit("one", &[]);
        let c2 = t.commit("two", &[c1]);
        let c3 = t.commit("three", &[c2]);

        let order = walk(
            c3,
            |oid| t.parents_of(oid),
            &HashSet::new(),
            false,
            |_, _| Ok(false),
        )
        .unwrap();

        assert_eq!(order, vec![c3, c2, c1]);
    }

    #[test]
    fn merge_commit_visits_side_branch_before_mainline() {
        let t = TestRepo::new();
        let base = t.commit("base", &[]);
        let mainline = t.commit("mainline", &[base]);
        let side = t.commit("side", &[base]);
        let merge = t.commit("merge", &[mainline, side]);

        let order = walk(
            merge,
            |oid| t.parents_of(oid),
            &HashSet::new(),
            false,
            |_, _| Ok(false),
        )
        .unwrap();

        assert_eq!(order[0], merge);
        let side_pos = order.iter().position(|&o| o == side).unwrap();
        let mainline_pos = order.iter().position(|&o| o == mainline).unwrap();
        assert!(side_pos < mainline_pos);
        assert_eq!(order.last(), Some(&base));
    }

    #[test]
    fn elided_null_merge_drops_its_side_branch_entirely() {
        let t = TestRepo::new();
        let base = t.commit("base", &[]);
        let mainline = t.commit("mainline", &[base]);
        let side = t.commit("side", &[base]);
        let merge = t.commit("merge", &[mainline, side]);

        let order = walk(
            merge,
            |oid| t.parents_of(oid),
            &HashSet::new(),
            true,
            |oid, _| Ok(oid == merge),
        )
        .unwrap();

        assert!(!order.contains(&merge));
        assert!(order.contains(&mainline));
        assert!(!order.contains(&side));
        assert!(order.contains(&base));
    }

    #[test]
    fn stop_at_commit_halts_expansion() {
        let t = TestRepo::new();
        let c1 = t.commit("one", &[]);
        let c2 = t.commit("two", &[c1]);
        let c3 = t.commit("three", &[c2]);

        let mut stop = HashSet::new();
        stop.insert(c1);

        let order = walk(c3, |oid| t.parents_of(oid), &stop, false, |_, _| Ok(false)).unwrap();

        assert_eq!(order, vec![c3, c2, c1]);
    }
}
