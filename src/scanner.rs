// Copyright 2020 Peter Williams <peter@newton.cx> and collaborators
// Licensed under the MIT License.

//! Orchestrating a full scan of a repository's release notes.
//!
//! This is where every other module meets: tag enumeration and
//! classification, the topological commit walk, per-commit change
//! aggregation, change tracking, and stop-point computation, assembled into
//! a version-ordered result. The scanner's output carries only `(path,
//! commit-id)` per note — actually reading and parsing a note's YAML
//! content is the separate, downstream job of [`crate::note::load`].

use std::collections::HashSet;

use indexmap::IndexMap;

use crate::{
    aggregator,
    branch,
    config::Config,
    errors::{Error, Result},
    repository::{CommitId, Repository, WORKING_COPY_VERSION},
    tags::{self, TagKind, VersionTag},
    tracker::ChangeTracker,
};

/// One note attributed to a specific version, as the `(path, commit-id)`
/// pair the scanner itself deals in. Reading its content is a separate
/// step — see [`crate::note::load`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteEntry {
    pub uid: String,
    pub path: String,
    pub commit: CommitId,
}

/// The full result of a scan: every discovered version, newest first, with
/// the notes introduced by or before it (back to the previous version), as
/// an ordered mapping `version -> ordered list of (path, commit-id)`.
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    pub versions: IndexMap<String, Vec<NoteEntry>>,
}

/// Scans a repository for release notes, version by version.
pub struct Scanner<'a> {
    repo: &'a Repository,
    cfg: &'a Config,
    relnotesdir: String,
}

impl<'a> Scanner<'a> {
    pub fn new(repo: &'a Repository, cfg: &'a Config, relnotesdir: impl Into<String>) -> Self {
        Scanner {
            repo,
            cfg,
            relnotesdir: relnotesdir.into(),
        }
    }

    fn notes_prefix(&self) -> String {
        self.cfg.notes_path(&self.relnotesdir)
    }

    /// Drop any raw change whose basename is configured to be ignored.
    ///
    /// This is how a repository disowns a note that was committed by
    /// mistake (a duplicate, or one that should never have shipped)
    /// without rewriting history.
    fn drop_ignored(
        &self,
        changes: Vec<crate::repository::RawChange>,
    ) -> Vec<crate::repository::RawChange> {
        if self.cfg.ignore_notes.is_empty() {
            return changes;
        }

        changes
            .into_iter()
            .filter(|c| {
                let basename = c.path.rsplit('/').next().unwrap_or(&c.path);
                !self
                    .cfg
                    .ignore_notes
                    .iter()
                    .any(|ignored| ignored == basename)
            })
            .collect()
    }

    pub fn scan(&self) -> Result<ScanResult> {
        let notes_prefix = self.notes_prefix();

        // Step 1/2: figure out where we're scanning from, and every
        // version tag reachable from there, newest tagger-date first.
        let head = match &self.cfg.branch {
            Some(name) => self.repo.resolve_ref(name)?,
            None => self.repo.head_commit()?,
        };

        let reachable = self.repo.reachable_from(head)?;
        let (version_tags, all_tags_by_commit) =
            tags::enumerate_version_tags(self.repo, self.cfg, &reachable)?;

        // Step 3: synthesize the "current" version label.
        let current_version = self.synthesize_current_version(head, &version_tags)?;

        // Step 4: compute the stop point, per the branch-base/earliest-
        // version decision tree.
        let mut stop_at = HashSet::new();
        if let Some(stop) = self.stop_point(head, &version_tags)? {
            stop_at.insert(stop);
        }

        // Step 5/6: walk history, feeding every commit's aggregated
        // changes to the tracker. The working copy/index is folded in
        // first, under the *working-copy* sentinel, ahead of HEAD itself.
        let mut tracker = ChangeTracker::new();

        if let Ok(working_changes) = self.repo.working_copy_changes(&notes_prefix) {
            let working_changes = self.drop_ignored(working_changes);
            if !working_changes.is_empty() {
                let aggregated = aggregator::aggregate(
                    WORKING_COPY_VERSION,
                    working_changes,
                    tracker.tainted_uids(),
                )?;
                tracker.record(CommitId::WorkingCopy, &aggregated);
            }
        }

        let repo = self.repo;
        let cfg = self.cfg;

        let order = crate::graph::walk(
            head,
            |oid| repo.parents(oid),
            &stop_at,
            cfg.ignore_null_merges,
            |oid, parents| is_null_merge(repo, cfg, oid, parents, &all_tags_by_commit),
        )?;

        // Map each walked commit to the version bucket it belongs to: every
        // tagged commit buckets under its own tag name (release or
        // pre-release alike — collapsing happens as a separate pass below,
        // per the spec's own "bucket then collapse" ordering), and
        // untagged commits stay in whatever bucket was last opened.
        let mut version_for_commit = std::collections::HashMap::new();
        let mut current_bucket = current_version.clone();

        for &oid in &order {
            if let Some(names) = all_tags_by_commit.get(&oid) {
                if let Some(own_name) = names.iter().find(|n| {
                    matches!(
                        tags::classify(cfg, n),
                        TagKind::Release | TagKind::PreRelease { .. }
                    )
                }) {
                    current_bucket = own_name.clone();
                }
            }

            version_for_commit.insert(oid, current_bucket.clone());

            let raw = self.drop_ignored(repo.commit_notes_changes(oid, &notes_prefix)?);
            let aggregated =
                aggregator::aggregate(&oid.to_string(), raw, tracker.tainted_uids())?;
            tracker.record(CommitId::Commit(oid), &aggregated);
        }

        // Step 7/8: invert the tracker into per-version note lists.
        let history = tracker.finish();

        let mut buckets: IndexMap<String, Vec<NoteEntry>> = IndexMap::new();
        buckets.insert(current_version.clone(), Vec::new());
        for &oid in &order {
            buckets
                .entry(version_for_commit[&oid].clone())
                .or_insert_with(Vec::new);
        }

        let mut uids: Vec<_> = history.keys().cloned().collect();
        uids.sort();

        for uid in uids {
            let h = &history[&uid];

            let version = match h.earliest_seen {
                CommitId::WorkingCopy => current_version.clone(),
                CommitId::Commit(oid) => version_for_commit
                    .get(&oid)
                    .cloned()
                    .unwrap_or_else(|| current_version.clone()),
            };

            buckets
                .entry(version)
                .or_insert_with(Vec::new)
                .push(NoteEntry {
                    uid: uid.clone(),
                    path: h.current_path.clone(),
                    commit: h.latest_seen,
                });
        }

        // Step 9: collapse pre-releases into their canonical release, when
        // that release tag is itself present among the discovered
        // versions. This runs after bucketing, as its own pass, so that a
        // pre-release with no canonical release yet keeps its own bucket.
        if cfg.collapse_pre_releases {
            for v in &version_tags {
                if let TagKind::PreRelease { canonical } = &v.kind {
                    if v.name == *canonical {
                        continue;
                    }
                    if !buckets.contains_key(canonical) {
                        continue;
                    }
                    if let Some(mut notes) = buckets.shift_remove(&v.name) {
                        buckets
                            .entry(canonical.clone())
                            .or_insert_with(Vec::new)
                            .append(&mut notes);
                    }
                }
            }
        }

        for notes in buckets.values_mut() {
            notes.sort_by(|a, b| a.uid.cmp(&b.uid));
        }
        buckets.retain(|version, notes| {
            !notes.is_empty() || version == &current_version || version == WORKING_COPY_VERSION
        });

        Ok(ScanResult { versions: buckets })
    }

    /// Step 4 of the orchestrator: the stop-point decision tree.
    ///
    /// 1. An explicit `branch` that is itself a recognized series branch,
    ///    with `stop_at_branch_base` enabled, stops at the *previous*
    ///    series branch's base — not its own (a series branch's own notes
    ///    belong to it, same as `earliest_version`'s do).
    /// 2. An explicit `earliest_version` stops just past it (never at its
    ///    own commit).
    /// 3. With neither configured, but `stop_at_branch_base` on and
    ///    scanning the default branch, derive an effective earliest
    ///    version from the most recent series branch's base and stop just
    ///    past that.
    /// 4. Otherwise there is no stop point: walk the complete history.
    fn stop_point(
        &self,
        head: git2::Oid,
        version_tags: &[VersionTag],
    ) -> Result<Option<git2::Oid>> {
        let cfg = self.cfg;
        let repo = self.repo;

        if let Some(branch_name) = &cfg.branch {
            if cfg.stop_at_branch_base
                && branch_name != &cfg.default_branch
                && tags::is_series_branch(cfg, branch_name)
            {
                if let Some(stop) = branch::series_branch_stop(repo, cfg, branch_name)? {
                    return Ok(Some(stop));
                }
                // No earlier series branch (or an ambiguous one): fall
                // through to earliest_version/full-history handling below,
                // exactly as if scanning with no branch-base stop at all.
            }
        }

        if let Some(earliest) = &cfg.earliest_version {
            if !version_tags.iter().any(|v| &v.name == earliest) {
                return Err(Error::UnknownEarliestVersion(earliest.clone()));
            }
            return Ok(branch::earliest_version_stop(cfg, version_tags, earliest));
        }

        if cfg.stop_at_branch_base && cfg.branch.is_none() {
            let _ = head;
            if let Some(derived) =
                branch::derive_earliest_version_from_series_branches(repo, cfg, version_tags)?
            {
                return Ok(branch::earliest_version_stop(cfg, version_tags, &derived));
            }
        }

        Ok(None)
    }

    fn synthesize_current_version(
        &self,
        head: git2::Oid,
        version_tags: &[VersionTag],
    ) -> Result<String> {
        let latest = version_tags.first();

        let (base, stop_commit) = match latest {
            Some(v) => (v.name.clone(), Some(v.commit)),
            None => (
                self.cfg
                    .earliest_version
                    .clone()
                    .unwrap_or_else(|| "0.0.0".to_owned()),
                None,
            ),
        };

        if Some(head) == stop_commit {
            return Ok(base);
        }

        let mut count = 0u32;
        let mut cur = Some(head);
        while let Some(oid) = cur {
            if Some(oid) == stop_commit {
                break;
            }
            count += 1;
            cur = self.repo.first_parent(oid)?;
        }

        Ok(format!("{}-{}", base, count))
    }
}

fn is_null_merge(
    repo: &Repository,
    cfg: &Config,
    commit: git2::Oid,
    parents: &[git2::Oid],
    tags_by_commit: &std::collections::HashMap<git2::Oid, Vec<String>>,
) -> Result<bool> {
    if parents.len() < 2 {
        return Ok(false);
    }

    let commit_tree = repo.tree_id(commit)?;
    let first_parent_tree = repo.tree_id(parents[0])?;

    if commit_tree != first_parent_tree {
        return Ok(false);
    }

    Ok(parents[1..].iter().any(|p| {
        tags_by_commit
            .get(p)
            .map(|names| {
                names.iter().any(|n| {
                    matches!(
                        tags::classify(cfg, n),
                        TagKind::Release | TagKind::PreRelease { .. }
                    )
                })
            })
            .unwrap_or(false)
    }))
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

        fn write(&self, relpath: &str, contents: &str) {
            let full = self.path().join(relpath);
            if let Some(parent) = full.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(full, contents).unwrap();
        }

        fn commit(&self, message: &str, parents: &[git2::Oid]) -> git2::Oid {
            let sig = git2::Signature::now("Test", "test@example.com").unwrap();
            let mut index = self.repo.index().unwrap();
            index
                .add_all(["*"], git2::IndexAddOption::DEFAULT, None)
                .unwrap();
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

        fn tag(&self, name: &str, target: git2::Oid) {
            let obj = self.repo.find_object(target, None).unwrap();
            let sig = git2::Signature::now("Test", "test@example.com").unwrap();
            self.repo.tag(name, &obj, &sig, name, false).unwrap();
        }
    }

    #[test]
    fn single_note_before_first_tag_is_unreleased() {
        let t = TestRepo::new();
        t.write(
            "releasenotes/notes/a-0000000000000001.yaml",
            "features:\n  - a thing\n",
        );
        let c0 = t.commit("add note", &[]);

        let repo = Repository::open(t.path()).unwrap();
        let cfg = Config::default();
        let scanner = Scanner::new(&repo, &cfg, "releasenotes");
        let result = scanner.scan().unwrap();

        let (version, notes) = result.versions.first().unwrap();
        assert!(version.starts_with("0.0.0-"));
        assert!(!version.contains("dev"));
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].uid, "0000000000000001");
        let _ = c0;
    }

    #[test]
    fn tagged_commit_buckets_its_own_note() {
        let t = TestRepo::new();
        t.write(
            "releasenotes/notes/a-0000000000000001.yaml",
            "features:\n  - a thing\n",
        );
        let c0 = t.commit("add note", &[]);
        t.tag("1.0.0", c0);

        t.write(
            "releasenotes/notes/b-0000000000000002.yaml",
            "fixes:\n  - a fix\n",
        );
        t.commit("add another", &[c0]);

        let repo = Repository::open(t.path()).unwrap();
        let cfg = Config::default();
        let scanner = Scanner::new(&repo, &cfg, "releasenotes");
        let result = scanner.scan().unwrap();

        assert!(result.versions.contains_key("1.0.0"));
        let tagged_notes = &result.versions["1.0.0"];
        assert_eq!(tagged_notes.len(), 1);
        assert_eq!(tagged_notes[0].uid, "0000000000000001");
    }

    #[test]
    fn current_version_uses_dash_not_dev_literal() {
        let t = TestRepo::new();
        t.write(
            "releasenotes/notes/a-0000000000000001.yaml",
            "features:\n  - a thing\n",
        );
        let c0 = t.commit("add note", &[]);
        t.tag("1.0.0", c0);
        t.write(
            "releasenotes/notes/b-0000000000000002.yaml",
            "fixes:\n  - a fix\n",
        );
        t.commit("add another", &[c0]);

        let repo = Repository::open(t.path()).unwrap();
        let cfg = Config::default();
        let scanner = Scanner::new(&repo, &cfg, "releasenotes");
        let result = scanner.scan().unwrap();

        let current = result
            .versions
            .keys()
            .find(|v| v.starts_with("1.0.0-"))
            .unwrap();
        assert_eq!(current, "1.0.0-1");
    }

    #[test]
    fn note_surviving_only_as_a_malformed_file_is_dropped_downstream() {
        // The scanner itself no longer parses note content at all, so a
        // malformed note still shows up as a bucketed (path, commit-id);
        // it's the separate loader step that discovers and skips it. This
        // just confirms the scanner doesn't choke on it.
        let t = TestRepo::new();
        t.write(
            "releasenotes/notes/good-0000000000000001.yaml",
            "features:\n  - a thing\n",
        );
        t.write("releasenotes/notes/bad-0000000000000002.yaml", "oops\n");
        t.commit("add two notes", &[]);

        let repo = Repository::open(t.path()).unwrap();
        let cfg = Config::default();
        let scanner = Scanner::new(&repo, &cfg, "releasenotes");
        let result = scanner.scan().unwrap();

        let (_, notes) = result.versions.first().unwrap();
        let mut uids: Vec<_> = notes.iter().map(|n| n.uid.clone()).collect();
        uids.sort();
        assert_eq!(
            uids,
            vec![
                "0000000000000001".to_owned(),
                "0000000000000002".to_owned()
            ]
        );
    }

    #[test]
    fn pre_release_collapses_into_its_canonical_release() {
        let t = TestRepo::new();
        t.write(
            "releasenotes/notes/a-0000000000000001.yaml",
            "features:\n  - pre-release work\n",
        );
        let c0 = t.commit("add note", &[]);
        t.tag("1.0.0.0rc1", c0);

        t.write(
            "releasenotes/notes/b-0000000000000002.yaml",
            "fixes:\n  - final fix\n",
        );
        let c1 = t.commit("finalize", &[c0]);
        t.tag("1.0.0", c1);

        let repo = Repository::open(t.path()).unwrap();
        let cfg = Config::default();
        let scanner = Scanner::new(&repo, &cfg, "releasenotes");
        let result = scanner.scan().unwrap();

        assert!(!result.versions.contains_key("1.0.0.0rc1"));
        let notes = &result.versions["1.0.0"];
        let mut uids: Vec<_> = notes.iter().map(|n| n.uid.clone()).collect();
        uids.sort();
        assert_eq!(
            uids,
            vec![
                "0000000000000001".to_owned(),
                "0000000000000002".to_owned()
            ]
        );
    }

    #[test]
    fn pre_release_keeps_its_own_bucket_without_a_canonical_release() {
        let t = TestRepo::new();
        t.write(
            "releasenotes/notes/a-0000000000000001.yaml",
            "features:\n  - pre-release work\n",
        );
        let c0 = t.commit("add note", &[]);
        t.tag("1.0.0.0rc1", c0);

        let repo = Repository::open(t.path()).unwrap();
        let cfg = Config::default();
        let scanner = Scanner::new(&repo, &cfg, "releasenotes");
        let result = scanner.scan().unwrap();

        assert!(result.versions.contains_key("1.0.0.0rc1"));
        assert_eq!(result.versions["1.0.0.0rc1"].len(), 1);
    }

    #[test]
    fn earliest_version_does_not_drop_notes_between_the_prior_tag_and_its_own() {
        let t = TestRepo::new();
        t.write("README.md", "nothing to do with notes\n");
        let c0 = t.commit("base", &[]);
        t.tag("1.0.0", c0);

        // Introduced strictly between 1.0.0 and 2.0.0: this is the note a
        // stop point computed at 2.0.0's *own* commit would never reach,
        // since it's an ancestor of that commit, not a descendant.
        t.write(
            "releasenotes/notes/b-0000000000000002.yaml",
            "fixes:\n  - bump\n",
        );
        let c1 = t.commit("add second note", &[c0]);
        let c2 = t.commit("tag point", &[c1]);
        t.tag("2.0.0", c2);

        t.write(
            "releasenotes/notes/c-0000000000000003.yaml",
            "features:\n  - new work\n",
        );
        t.commit("add third note", &[c2]);

        let repo = Repository::open(t.path()).unwrap();
        let mut cfg = Config::default();
        cfg.earliest_version = Some("2.0.0".to_owned());
        let scanner = Scanner::new(&repo, &cfg, "releasenotes");
        let result = scanner.scan().unwrap();

        assert!(result.versions.contains_key("2.0.0"));
        assert_eq!(result.versions["2.0.0"].len(), 1);
        assert_eq!(result.versions["2.0.0"][0].uid, "0000000000000002");
        assert!(!result.versions.contains_key("1.0.0"));
    }
}
