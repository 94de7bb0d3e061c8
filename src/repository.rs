// Copyright 2020 Peter Williams <peter@newton.cx> and collaborators
// Licensed under the MIT License.

//! Read-only access to the backing git repository.
//!
//! Everything the scanner needs from git funnels through this module: ref
//! resolution, commit/tree/blob traversal, tag enumeration, and the diffing
//! of a commit's notes-subtree changes against its parent(s). The scanner
//! never mutates the repository; this module exists to keep every `git2`
//! call in one place.

use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
};

use crate::errors::{Error, Result};

/// A commit identifier, or the sentinel standing in for uncommitted state.
///
/// The scanner needs to be able to attribute notes either to a real commit
/// or to the working copy / index, which has no commit id of its own. This
/// type keeps that distinction explicit instead of smuggling it through an
/// `Option<Oid>` at every call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommitId {
    Commit(git2::Oid),
    WorkingCopy,
}

/// The sentinel version name for uncommitted changes.
pub const WORKING_COPY_VERSION: &str = "*working-copy*";

impl CommitId {
    pub fn is_working_copy(&self) -> bool {
        matches!(self, CommitId::WorkingCopy)
    }

    pub fn oid(&self) -> Option<git2::Oid> {
        match self {
            CommitId::Commit(oid) => Some(*oid),
            CommitId::WorkingCopy => None,
        }
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CommitId::Commit(oid) => write!(f, "{}", oid),
            CommitId::WorkingCopy => write!(f, "{}", WORKING_COPY_VERSION),
        }
    }
}

/// The kind of change a single path underwent in a commit (or in the
/// working copy/index), confined to adds, deletes, and modifications.
///
/// Renames are deliberately not a first-class kind here: the repository
/// adapter never runs content-similarity rename detection, so a rename
/// shows up as an `Add` and a `Delete` sharing a unique id, and it is the
/// change aggregator's job to recognize that pattern. See the module docs
/// on the aggregator for why.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawChangeKind {
    Add,
    Delete,
    Modify,
}

/// A single path's change within one commit (or the working copy/index).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChange {
    pub kind: RawChangeKind,
    pub path: String,
}

/// A git tag together with the commit it ultimately points to and the date
/// used to order it among other tags.
#[derive(Debug, Clone)]
pub struct TagRef {
    pub name: String,
    pub commit: git2::Oid,
    /// Tagger date for annotated tags; falls back to the commit's own date
    /// for lightweight tags.
    pub date: i64,
}

/// Read-only access to the backing version control repository.
pub struct Repository {
    repo: git2::Repository,
}

impl Repository {
    /// Open the repository containing `path` (or any of its ancestors).
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Repository> {
        let repo = git2::Repository::discover(path)?;
        Ok(Repository { repo })
    }

    /// Open the repository using standard environmental cues (`$PWD`,
    /// `$GIT_DIR`, etc.), exactly as the `git` CLI itself would.
    pub fn open_from_env() -> Result<Repository> {
        let repo = git2::Repository::open_from_env()?;
        Ok(Repository { repo })
    }

    /// The repository's working directory.
    ///
    /// Fails with `BareRepository` if the repository has no working tree,
    /// since then there is no `*working-copy*` state and nowhere for `reno
    /// new` to write a file.
    pub fn workdir(&self) -> Result<PathBuf> {
        self.repo
            .workdir()
            .map(|p| p.to_owned())
            .ok_or(Error::BareRepository)
    }

    /// Resolve a ref name to the commit it designates.
    ///
    /// Tries, in order: a local branch, a remote-tracking branch, a tag, a
    /// synthesized `<last-path-segment>-eol` tag, and finally
    /// `origin/<name>`. Fails with `UnknownRef` if none match.
    pub fn resolve_ref(&self, name: &str) -> Result<git2::Oid> {
        let candidates = [
            format!("refs/heads/{}", name),
            format!("refs/remotes/{}", name),
            format!("refs/tags/{}", name),
        ];

        for cand in &candidates {
            if let Ok(r) = self.repo.find_reference(cand) {
                return Ok(r.peel_to_commit()?.id());
            }
        }

        if let Some(last) = name.rsplit('/').next() {
            let eol_tag = format!("refs/tags/{}-eol", last);
            if let Ok(r) = self.repo.find_reference(&eol_tag) {
                return Ok(r.peel_to_commit()?.id());
            }
        }

        let origin_cand = format!("refs/remotes/origin/{}", name);
        if let Ok(r) = self.repo.find_reference(&origin_cand) {
            return Ok(r.peel_to_commit()?.id());
        }

        Err(Error::UnknownRef(name.to_owned()))
    }

    /// Resolve HEAD to a commit id.
    pub fn head_commit(&self) -> Result<git2::Oid> {
        Ok(self.repo.head()?.peel_to_commit()?.id())
    }

    /// The name of the currently checked-out branch, if any (HEAD may be
    /// detached).
    pub fn current_branch_name(&self) -> Result<Option<String>> {
        let head = self.repo.head()?;
        if !head.is_branch() {
            return Ok(None);
        }
        Ok(head.shorthand().map(|s| s.to_owned()))
    }

    /// The parents of a commit, in order.
    pub fn parents(&self, commit: git2::Oid) -> Result<Vec<git2::Oid>> {
        let c = self.repo.find_commit(commit)?;
        Ok(c.parent_ids().collect())
    }

    /// The first parent of a commit, if it has one.
    pub fn first_parent(&self, commit: git2::Oid) -> Result<Option<git2::Oid>> {
        Ok(self.parents(commit)?.into_iter().next())
    }

    /// The id of the tree attached to a commit.
    pub fn tree_id(&self, commit: git2::Oid) -> Result<git2::Oid> {
        Ok(self.repo.find_commit(commit)?.tree_id())
    }

    /// The committer time of a commit, in seconds since the epoch.
    pub fn commit_time(&self, commit: git2::Oid) -> Result<i64> {
        Ok(self.repo.find_commit(commit)?.time().seconds())
    }

    /// All commit ids reachable from `head` (inclusive), used to find the
    /// base of a series branch against the default branch.
    pub fn reachable_from(&self, head: git2::Oid) -> Result<std::collections::HashSet<git2::Oid>> {
        let mut walk = self.repo.revwalk()?;
        walk.push(head)?;
        let mut set = std::collections::HashSet::new();
        for oid in walk {
            set.insert(oid?);
        }
        Ok(set)
    }

    /// Read a file's contents at a given commit.
    ///
    /// Returns `Ok(None)` if the path (or any of its parent directories)
    /// doesn't exist in that commit's tree, which is recoverable: the
    /// caller treats it as "no such note at this revision" rather than an
    /// error.
    pub fn file_at_commit(&self, commit: git2::Oid, path: &str) -> Result<Option<Vec<u8>>> {
        let commit_obj = self.repo.find_commit(commit)?;
        let tree = commit_obj.tree()?;

        let entry = match tree.get_path(Path::new(path)) {
            Ok(entry) => entry,
            Err(_) => return Ok(None),
        };

        let obj = entry.to_object(&self.repo)?;
        Ok(obj.as_blob().map(|b| b.content().to_vec()))
    }

    /// Read a file from the working directory on disk, bypassing git
    /// entirely. Used when resolving notes attributed to `*working-copy*`.
    pub fn read_working_copy_file(&self, relative_path: &str) -> Result<Option<Vec<u8>>> {
        let full = self.workdir()?.join(relative_path);
        match fs::read(&full) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Enumerate every tag ref, with the commit it points to and a date
    /// suitable for reverse-chronological sorting.
    pub fn all_tags(&self) -> Result<Vec<TagRef>> {
        let mut out = Vec::new();

        for name in self.repo.tag_names(None)?.iter().flatten() {
            let refname = format!("refs/tags/{}", name);
            let reference = self.repo.find_reference(&refname)?;
            let obj = reference.peel(git2::ObjectType::Any)?;

            let (commit, date) = match obj.into_tag() {
                Ok(tag) => {
                    let commit = tag.target()?.peel_to_commit()?.id();
                    let date = tag
                        .tagger()
                        .map(|s| s.when().seconds())
                        .unwrap_or(self.commit_time(commit)?);
                    (commit, date)
                }
                Err(obj) => {
                    let commit = obj.peel_to_commit()?.id();
                    let date = self.commit_time(commit)?;
                    (commit, date)
                }
            };

            out.push(TagRef {
                name: name.to_owned(),
                commit,
                date,
            });
        }

        Ok(out)
    }

    /// All branch names (local and `origin`-remote), stripped of their
    /// `refs/heads/`/`refs/remotes/origin/` prefixes.
    pub fn all_branch_names(&self) -> Result<Vec<String>> {
        let mut out = Vec::new();
        let branches = self.repo.branches(None)?;
        for b in branches {
            let (branch, _kind) = b?;
            if let Some(name) = branch.name()? {
                out.push(name.to_owned());
            }
        }
        Ok(out)
    }

    /// The raw add/delete/modify changes a commit makes under `prefix`,
    /// diffed against every parent (plural for merge commits, so that the
    /// aggregator can see when both sides of a merge touched the same
    /// file). Root commits are diffed against an empty tree.
    ///
    /// Rename detection is deliberately left off: the scanner identifies
    /// renames by unique id, not by content similarity.
    pub fn commit_notes_changes(&self, commit: git2::Oid, prefix: &str) -> Result<Vec<RawChange>> {
        let commit_obj = self.repo.find_commit(commit)?;
        let tree = commit_obj.tree()?;
        let parents: Vec<_> = commit_obj.parents().collect();

        let mut changes = Vec::new();

        if parents.is_empty() {
            changes.extend(self.diff_trees(None, &tree, prefix)?);
        } else {
            for parent in &parents {
                let parent_tree = parent.tree()?;
                changes.extend(self.diff_trees(Some(&parent_tree), &tree, prefix)?);
            }
        }

        Ok(changes)
    }

    fn diff_trees(
        &self,
        old_tree: Option<&git2::Tree>,
        new_tree: &git2::Tree,
        prefix: &str,
    ) -> Result<Vec<RawChange>> {
        let mut opts = git2::DiffOptions::new();
        opts.pathspec(prefix);

        let diff = self
            .repo
            .diff_tree_to_tree(old_tree, Some(new_tree), Some(&mut opts))?;

        let mut out = Vec::new();

        for delta in diff.deltas() {
            let old_path = delta.old_file().path().map(path_to_string);
            let new_path = delta.new_file().path().map(path_to_string);

            match delta.status() {
                git2::Delta::Added => {
                    if let Some(p) = new_path {
                        out.push(RawChange {
                            kind: RawChangeKind::Add,
                            path: p,
                        });
                    }
                }
                git2::Delta::Deleted => {
                    if let Some(p) = old_path {
                        out.push(RawChange {
                            kind: RawChangeKind::Delete,
                            path: p,
                        });
                    }
                }
                git2::Delta::Modified | git2::Delta::Typechange => {
                    if let Some(p) = new_path {
                        out.push(RawChange {
                            kind: RawChangeKind::Modify,
                            path: p,
                        });
                    }
                }
                git2::Delta::Renamed | git2::Delta::Copied => {
                    // Shouldn't occur without similarity detection enabled,
                    // but decompose defensively into add+delete so the
                    // aggregator still sees a recognizable shape.
                    if let Some(p) = old_path {
                        out.push(RawChange {
                            kind: RawChangeKind::Delete,
                            path: p,
                        });
                    }
                    if let Some(p) = new_path {
                        out.push(RawChange {
                            kind: RawChangeKind::Add,
                            path: p,
                        });
                    }
                }
                _ => {}
            }
        }

        Ok(out)
    }

    /// Staged (index) and unstaged (working-copy) changes under `prefix`,
    /// relative to HEAD. Used to fold uncommitted notes into the
    /// `*working-copy*` bucket.
    pub fn working_copy_changes(&self, prefix: &str) -> Result<Vec<RawChange>> {
        let mut status_opts = git2::StatusOptions::new();
        status_opts
            .include_untracked(true)
            .recurse_untracked_dirs(true);

        let statuses = self.repo.statuses(Some(&mut status_opts))?;
        let mut out = Vec::new();

        for entry in statuses.iter() {
            let path = match entry.path() {
                Some(p) => p,
                None => continue,
            };

            if !path.starts_with(prefix) || !path.ends_with(".yaml") {
                continue;
            }

            let status = entry.status();

            let kind = if status.intersects(git2::Status::WT_DELETED | git2::Status::INDEX_DELETED)
            {
                RawChangeKind::Delete
            } else if status.intersects(git2::Status::WT_NEW | git2::Status::INDEX_NEW) {
                RawChangeKind::Add
            } else if status.intersects(
                git2::Status::WT_MODIFIED
                    | git2::Status::INDEX_MODIFIED
                    | git2::Status::WT_RENAMED
                    | git2::Status::INDEX_RENAMED,
            ) {
                RawChangeKind::Modify
            } else {
                continue;
            };

            out.push(RawChange {
                kind,
                path: path.to_owned(),
            });
        }

        Ok(out)
    }
}

fn path_to_string(p: &Path) -> String {
    p.to_string_lossy().replace('\\', "/")
}
