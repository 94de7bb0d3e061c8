// Copyright 2020 Peter Williams <peter@newton.cx> and collaborators
// Licensed under the MIT License.

//! Finding where a series branch forked off of the default branch.
//!
//! When scanning a long-lived stable branch, history before the branch was
//! cut belongs to the default branch's own story, not this branch's. The
//! branch base is the commit where the two histories diverge; the scanner
//! stops walking once it reaches it.

use std::collections::HashSet;

use crate::{
    config::Config,
    repository::Repository,
    tags::{self, VersionTag},
};

/// Find the commit at which `target_branch` forked from the configured
/// default branch, if `target_branch` is recognized as a series branch at
/// all.
///
/// Returns `Ok(None)` when `target_branch` isn't a series branch (nothing
/// to stop at), or when it shares its base with another series branch at
/// an untagged commit — in that ambiguous case we decline to guess and
/// scan the complete history instead, matching the conservative behavior
/// the scanner falls back to whenever it isn't sure.
pub fn find_branch_base(
    repo: &Repository,
    cfg: &Config,
    target_branch: &str,
) -> crate::errors::Result<Option<git2::Oid>> {
    if !tags::is_series_branch(cfg, target_branch) {
        return Ok(None);
    }

    let target_head = repo.resolve_ref(target_branch)?;
    let default_head = repo.resolve_ref(&cfg.default_branch)?;

    let default_ancestors = repo.reachable_from(default_head)?;

    // Walk back from the branch tip until we find the first commit that's
    // also reachable from the default branch; that's the fork point.
    let mut walk = Vec::new();
    collect_first_parent_chain(repo, target_head, &mut walk)?;

    for oid in walk {
        if default_ancestors.contains(&oid) {
            if is_ambiguous_base(repo, cfg, oid)? {
                return Ok(None);
            }
            return Ok(Some(oid));
        }
    }

    Ok(None)
}

/// Every branch (local or `origin`-remote) recognized as a series branch,
/// sorted lexically so "the most recent earlier series branch" has a
/// stable, reproducible meaning.
pub fn series_branches(repo: &Repository, cfg: &Config) -> crate::errors::Result<Vec<String>> {
    let mut names: Vec<String> = repo
        .all_branch_names()?
        .into_iter()
        .filter(|name| tags::is_series_branch(cfg, name))
        .collect();
    names.sort();
    names.dedup();
    Ok(names)
}

/// The stop commit implied by `earliest`, an already-validated tag name
/// present in `version_tags`.
///
/// Per the stop-point rule, the scanner must not stop *at* `earliest`'s own
/// commit — doing so would hide the commits between the prior tag and
/// `earliest`'s own tag, which carry `earliest`'s own notes. Instead this
/// returns the commit of the next *older* tag whose canonical version
/// differs from `earliest`'s, so the walk includes everything down through
/// `earliest` itself and stops just past it.
///
/// The one exception is a pre-release `earliest` with collapsing turned
/// off: since each pre-release is then its own version, the stop point is
/// simply the very next entry in `version_tags`, canonical or not.
pub fn earliest_version_stop(
    cfg: &Config,
    version_tags: &[VersionTag],
    earliest: &str,
) -> Option<git2::Oid> {
    let pos = version_tags.iter().position(|v| v.name == earliest)?;

    if let tags::TagKind::PreRelease { .. } = &version_tags[pos].kind {
        if !cfg.collapse_pre_releases {
            return version_tags.get(pos + 1).map(|v| v.commit);
        }
    }

    let earliest_canonical = version_tags[pos].canonical_name();
    version_tags[pos + 1..]
        .iter()
        .find(|v| v.canonical_name() != earliest_canonical)
        .map(|v| v.commit)
}

/// The stop commit for the series branch immediately before `branch_name`
/// in `series_branches`, i.e. the `find_branch_base` of the previous
/// series branch in sorted order. Returns `None` if `branch_name` isn't a
/// recognized series branch, or is the earliest one known.
pub fn series_branch_stop(
    repo: &Repository,
    cfg: &Config,
    branch_name: &str,
) -> crate::errors::Result<Option<git2::Oid>> {
    if !tags::is_series_branch(cfg, branch_name) {
        return Ok(None);
    }

    let branches = series_branches(repo, cfg)?;
    let pos = match branches.iter().position(|b| b == branch_name) {
        Some(p) => p,
        None => return Ok(None),
    };
    if pos == 0 {
        return Ok(None);
    }

    find_branch_base(repo, cfg, &branches[pos - 1])
}

/// When scanning the default branch with no explicit `earliest_version`
/// and `stop_at_branch_base` enabled, derive an effective earliest version
/// from the most recent series branch's own base: the version tag sitting
/// immediately atop that base commit, if any.
pub fn derive_earliest_version_from_series_branches(
    repo: &Repository,
    cfg: &Config,
    version_tags: &[VersionTag],
) -> crate::errors::Result<Option<String>> {
    let branches = series_branches(repo, cfg)?;
    let most_recent = match branches.last() {
        Some(b) => b,
        None => return Ok(None),
    };

    let base = match find_branch_base(repo, cfg, most_recent)? {
        Some(b) => b,
        None => return Ok(None),
    };

    // Among version tags that are descendants of `base` (i.e. postdate the
    // fork), the oldest one is the one that sits directly atop it.
    let mut candidate: Option<&VersionTag> = None;
    for v in version_tags {
        if v.commit == base {
            continue;
        }
        if repo.reachable_from(v.commit)?.contains(&base) {
            candidate = Some(v);
        }
    }

    Ok(candidate.map(|v| v.name.clone()))
}

fn collect_first_parent_chain(
    repo: &Repository,
    start: git2::Oid,
    out: &mut Vec<git2::Oid>,
) -> crate::errors::Result<()> {
    let mut current = Some(start);
    while let Some(oid) = current {
        out.push(oid);
        current = repo.first_parent(oid)?;
    }
    Ok(())
}

/// True if `base` is untagged and also serves as the base of some other
/// series branch, meaning we cannot tell which branch's notes properly
/// belong before `base`.
fn is_ambiguous_base(repo: &Repository, cfg: &Config, base: git2::Oid) -> crate::errors::Result<bool> {
    let tags = repo.all_tags()?;
    let is_tagged = tags.iter().any(|t| t.commit == base);
    if is_tagged {
        return Ok(false);
    }

    let branch_names = repo.all_branch_names()?;
    let mut series_branches_at_base = HashSet::new();

    for name in branch_names {
        if !tags::is_series_branch(cfg, &name) {
            continue;
        }
        if let Ok(head) = repo.resolve_ref(&name) {
            let mut chain = Vec::new();
            collect_first_parent_chain(repo, head, &mut chain)?;
            if chain.contains(&base) {
                series_branches_at_base.insert(name);
            }
        }
    }

    Ok(series_branches_at_base.len() > 1)
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

        fn path(&self) -> std::path::PathBuf {
            self.repo.workdir().unwrap().to_owned()
        }

        fn commit(&self, message: &str, parent: Option<git2::Oid>) -> git2::Oid {
            let sig = git2::Signature::now("Test", "test@example.com").unwrap();
            fs::write(self.path().join("f.txt"), message).unwrap();
            let mut index = self.repo.index().unwrap();
            index.add_path(std::path::Path::new("f.txt")).unwrap();
            index.write().unwrap();
            let tree_oid = index.write_tree().unwrap();
            let tree = self.repo.find_tree(tree_oid).unwrap();
            let parent_commit = parent.map(|p| self.repo.find_commit(p).unwrap());
            let parents: Vec<&git2::Commit> = parent_commit.iter().collect();
            self.repo
                .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
                .unwrap()
        }

        fn branch(&self, name: &str, target: git2::Oid) {
            let commit = self.repo.find_commit(target).unwrap();
            self.repo.branch(name, &commit, false).unwrap();
        }

        fn tag(&self, name: &str, target: git2::Oid) {
            let obj = self.repo.find_object(target, None).unwrap();
            let sig = git2::Signature::now("Test", "test@example.com").unwrap();
            self.repo.tag(name, &obj, &sig, name, false).unwrap();
        }
    }

    fn version_tag(name: &str, commit: git2::Oid, date: i64) -> VersionTag {
        VersionTag {
            name: name.to_owned(),
            commit,
            date,
            kind: tags::TagKind::Release,
        }
    }

    #[test]
    fn unrecognized_branch_name_has_no_base() {
        let t = TestRepo::new();
        t.commit("first", None);

        let repo = Repository::open(t.path()).unwrap();
        let cfg = Config::default();
        let base = find_branch_base(&repo, &cfg, "main").unwrap();
        assert_eq!(base, None);
    }

    #[test]
    fn series_branch_finds_fork_point() {
        let t = TestRepo::new();
        let c1 = t.commit("first", None);
        let c2 = t.commit("second", Some(c1));
        t.branch("stable/1.0", c2);
        let c3 = t.commit("third", Some(c2));
        t.repo.set_head("refs/heads/master").ok();
        let _ = c3;

        let repo = Repository::open(t.path()).unwrap();
        let mut cfg_serialized = crate::config::Config::default();
        cfg_serialized.default_branch = t.repo.head().unwrap().shorthand().unwrap().to_owned();

        let base = find_branch_base(&repo, &cfg_serialized, "stable/1.0").unwrap();
        assert_eq!(base, Some(c2));
    }

    #[test]
    fn series_branches_lists_sorted_recognized_names() {
        let t = TestRepo::new();
        let c1 = t.commit("first", None);
        t.branch("stable/2.0", c1);
        t.branch("stable/1.0", c1);
        t.branch("feature/whatever", c1);

        let repo = Repository::open(t.path()).unwrap();
        let cfg = Config::default();
        let branches = series_branches(&repo, &cfg).unwrap();
        assert_eq!(branches, vec!["stable/1.0".to_owned(), "stable/2.0".to_owned()]);
    }

    #[test]
    fn earliest_version_stop_skips_past_its_own_tag() {
        let t = TestRepo::new();
        let c1 = t.commit("first", None);
        let c2 = t.commit("second", Some(c1));
        let c3 = t.commit("third", Some(c2));

        let v1 = version_tag("1.0.0", c1, 1);
        let v2 = version_tag("2.0.0", c3, 2);
        let tags = vec![v2, v1];

        let cfg = Config::default();
        let stop = earliest_version_stop(&cfg, &tags, "2.0.0");
        assert_eq!(stop, Some(c1));
    }

    #[test]
    fn earliest_version_stop_with_no_older_tag_is_none() {
        let t = TestRepo::new();
        let c1 = t.commit("first", None);
        let tags = vec![version_tag("1.0.0", c1, 1)];

        let cfg = Config::default();
        let stop = earliest_version_stop(&cfg, &tags, "1.0.0");
        assert_eq!(stop, None);
    }

    #[test]
    fn derive_earliest_version_picks_tag_atop_most_recent_branch_base() {
        let t = TestRepo::new();
        let c1 = t.commit("first", None);
        t.tag("1.0.0", c1);
        let c2 = t.commit("second", Some(c1));
        t.branch("stable/1.0", c2);
        let c3 = t.commit("third", Some(c2));
        t.tag("2.0.0", c3);
        t.repo.set_head("refs/heads/master").ok();

        let repo = Repository::open(t.path()).unwrap();
        let mut cfg = Config::default();
        cfg.default_branch = t.repo.head().unwrap().shorthand().unwrap().to_owned();

        let version_tags = vec![version_tag("2.0.0", c3, 2), version_tag("1.0.0", c1, 1)];

        let derived =
            derive_earliest_version_from_series_branches(&repo, &cfg, &version_tags).unwrap();
        assert_eq!(derived, Some("2.0.0".to_owned()));
    }
}
