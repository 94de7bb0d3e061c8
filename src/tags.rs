// Copyright 2020 Peter Williams <peter@newton.cx> and collaborators
// Licensed under the MIT License.

//! Classifying git tags as releases, pre-releases, or closed-branch markers.

use std::collections::{HashMap, HashSet};

use crate::{config::Config, errors::Result, repository::Repository};

/// What a tag name means to the scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagKind {
    /// A full release tag, e.g. `2.0.0`.
    Release,

    /// A release tag that is additionally a pre-release of `canonical`.
    PreRelease { canonical: String },

    /// A tag marking the end-of-life of a series branch, standing in for
    /// the branch `series_branch_name` now that it has been deleted.
    ClosedBranch { series_branch_name: String },

    /// Not recognized as any kind of version marker.
    NotAVersion,
}

/// A tag recognized as a version marker (release or pre-release), carrying
/// enough to sort and collapse it.
#[derive(Debug, Clone)]
pub struct VersionTag {
    pub name: String,
    pub commit: git2::Oid,
    pub date: i64,
    pub kind: TagKind,
}

impl VersionTag {
    /// The canonical release name this tag counts against: itself for a
    /// full release, or the release it is a pre-release of.
    pub fn canonical_name(&self) -> &str {
        match &self.kind {
            TagKind::PreRelease { canonical } => canonical,
            _ => &self.name,
        }
    }
}

/// Enumerate every tag reachable from `reachable`, classifying each one.
///
/// Returns the subset that are version tags (release or pre-release),
/// sorted newest-first by tagger date (ties broken lexically by name for
/// determinism), alongside a map from every reachable tagged commit to
/// *all* of its tag names (including non-version ones), which the null-merge
/// elision check and the bucket-assignment walk both need.
pub fn enumerate_version_tags(
    repo: &Repository,
    cfg: &Config,
    reachable: &HashSet<git2::Oid>,
) -> Result<(Vec<VersionTag>, HashMap<git2::Oid, Vec<String>>)> {
    let mut version_tags = Vec::new();
    let mut all_tags_by_commit: HashMap<git2::Oid, Vec<String>> = HashMap::new();

    for tag in repo.all_tags()? {
        if !reachable.contains(&tag.commit) {
            continue;
        }

        all_tags_by_commit
            .entry(tag.commit)
            .or_default()
            .push(tag.name.clone());

        let kind = classify(cfg, &tag.name);
        if matches!(kind, TagKind::Release | TagKind::PreRelease { .. }) {
            version_tags.push(VersionTag {
                name: tag.name,
                commit: tag.commit,
                date: tag.date,
                kind,
            });
        }
    }

    version_tags.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| b.name.cmp(&a.name)));

    Ok((version_tags, all_tags_by_commit))
}

/// Classify a tag name according to the configured regexes.
pub fn classify(cfg: &Config, tag_name: &str) -> TagKind {
    if cfg.release_tag_re.is_match(tag_name) {
        return match canonical_release(cfg, tag_name) {
            Some(canonical) if canonical != tag_name => TagKind::PreRelease { canonical },
            _ => TagKind::Release,
        };
    }

    if let Some(caps) = cfg.closed_branch_tag_re.captures(tag_name) {
        let series = caps.name("series").map(|m| m.as_str()).unwrap_or(tag_name);
        return TagKind::ClosedBranch {
            series_branch_name: format!("{}{}", cfg.branch_name_prefix, series),
        };
    }

    TagKind::NotAVersion
}

/// Strip a pre-release suffix from `tag_name`, returning the canonical
/// release version it belongs to. Returns `tag_name` itself unchanged if
/// the pre-release regex does not match (i.e. the tag is already a plain
/// release).
///
/// Fails with `MisconfiguredRegex` only if the regex matches but lacks the
/// required capture group, since at that point stripping is unavoidable.
pub fn canonical_release(cfg: &Config, tag_name: &str) -> Option<String> {
    let caps = cfg.pre_release_tag_re.captures(tag_name)?;
    let m = caps.name("pre_release")?;
    Some(format!(
        "{}{}",
        &tag_name[..m.start()],
        &tag_name[m.end()..]
    ))
}

/// Fallibly strip a pre-release suffix, surfacing `MisconfiguredRegex` if
/// the configured regex cannot actually produce a canonical version for a
/// tag that it otherwise matched as a pre-release.
pub fn try_canonical_release(cfg: &Config, tag_name: &str) -> Result<Option<String>> {
    if !cfg.pre_release_tag_re.is_match(tag_name) {
        return Ok(None);
    }

    match canonical_release(cfg, tag_name) {
        Some(c) => Ok(Some(c)),
        None => Err(crate::errors::Error::MisconfiguredRegex),
    }
}

/// True if `name` (a branch name, already stripped of `refs/heads/` or
/// `refs/remotes/origin/`) is a long-lived series branch.
pub fn is_series_branch(cfg: &Config, name: &str) -> bool {
    cfg.branch_name_re.is_match(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_release_is_release() {
        let cfg = Config::default();
        assert_eq!(classify(&cfg, "1.0.0"), TagKind::Release);
    }

    #[test]
    fn pre_release_points_at_canonical() {
        let cfg = Config::default();
        assert_eq!(
            classify(&cfg, "1.0.0.0rc1"),
            TagKind::PreRelease {
                canonical: "1.0.0".to_owned()
            }
        );
    }

    #[test]
    fn eol_tag_maps_to_branch_name() {
        let cfg = Config::default();
        assert_eq!(
            classify(&cfg, "2.0-eol"),
            TagKind::ClosedBranch {
                series_branch_name: "stable/2.0".to_owned()
            }
        );
    }

    #[test]
    fn garbage_tag_is_not_a_version() {
        let cfg = Config::default();
        assert_eq!(classify(&cfg, "my-cool-branch"), TagKind::NotAVersion);
    }

    #[test]
    fn series_branch_detection() {
        let cfg = Config::default();
        assert!(is_series_branch(&cfg, "stable/1.0"));
        assert!(!is_series_branch(&cfg, "main"));
    }
}
