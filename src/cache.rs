// Copyright 2020 Peter Williams <peter@newton.cx> and collaborators
// Licensed under the MIT License.

//! Reading and writing the on-disk scan cache.
//!
//! Scanning a large repository's full history can be slow, since every
//! commit touching the notes directory has to be diffed and every note
//! blob read. The cache records the last scan's result — versions, their
//! `(path, commit-id)` pairs, and every referenced note's already-loaded
//! content — so that subsequent runs (typically building release notes for
//! a `sdist`/release pipeline) can skip straight to rendering without
//! touching git at all. This is the one place in the crate permitted to
//! bypass both the scanner and the live note loader.

use std::path::Path;

use atomicwrites::{AtomicFile, OverwriteBehavior};
use chrono::{TimeZone, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
    config::Config,
    errors::Result,
    note::{self, ParsedNote},
    repository::{CommitId, Repository, WORKING_COPY_VERSION},
    scanner::{NoteEntry, ScanResult},
    uid::unique_id,
};

const CACHE_FILE_NAME: &str = "reno.cache";

#[derive(Debug, Serialize, Deserialize)]
struct CachedVersion {
    version: String,
    files: Vec<(String, Option<String>)>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CachedNote {
    sections: IndexMap<String, Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct CacheDocument {
    notes: Vec<CachedVersion>,
    #[serde(rename = "file-contents")]
    file_contents: IndexMap<String, CachedNote>,
    dates: IndexMap<String, String>,
}

fn commit_to_cache(commit: CommitId) -> Option<String> {
    match commit {
        CommitId::Commit(oid) => Some(oid.to_string()),
        CommitId::WorkingCopy => None,
    }
}

fn commit_from_cache(value: Option<String>) -> Result<CommitId> {
    match value {
        Some(s) => Ok(CommitId::Commit(git2::Oid::from_str(&s)?)),
        None => Ok(CommitId::WorkingCopy),
    }
}

/// Every tagger/commit date, keyed by tag name, for the versions a scan
/// result actually names. Neither the `*working-copy*` sentinel nor a
/// synthesized `<tag>-<N>` current-version label is ever a real tag, so
/// they're naturally excluded without any special-casing here.
fn version_dates(repo: &Repository, result: &ScanResult) -> Result<IndexMap<String, String>> {
    let tags = repo.all_tags()?;
    let mut dates = IndexMap::new();

    for version in result.versions.keys() {
        if let Some(tag) = tags.iter().find(|t| &t.name == version) {
            let formatted = Utc
                .timestamp_opt(tag.date, 0)
                .single()
                .map(|dt| dt.to_rfc3339())
                .unwrap_or_else(|| tag.date.to_string());
            dates.insert(version.clone(), formatted);
        }
    }

    Ok(dates)
}

/// Write a scan result to `<relnotesdir>/reno.cache`, atomically, loading
/// every referenced note's content along the way so a later read needs no
/// repository access at all.
pub fn write(
    repo: &Repository,
    cfg: &Config,
    repo_root: &Path,
    relnotesdir: &str,
    result: &ScanResult,
) -> Result<()> {
    let mut file_contents = IndexMap::new();

    let notes = result
        .versions
        .iter()
        .map(|(version, entries)| {
            let files = entries
                .iter()
                .map(|entry| {
                    if !file_contents.contains_key(&entry.uid) {
                        if let Some(parsed) = note::load(repo, cfg, &entry.path, entry.commit)? {
                            file_contents.insert(
                                entry.uid.clone(),
                                CachedNote {
                                    sections: parsed.sections,
                                },
                            );
                        }
                    }
                    Ok((entry.path.clone(), commit_to_cache(entry.commit)))
                })
                .collect::<Result<Vec<_>>>()?;

            Ok(CachedVersion {
                version: version.clone(),
                files,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let doc = CacheDocument {
        notes,
        file_contents,
        dates: version_dates(repo, result)?,
    };

    let text = serde_yaml::to_string(&doc)?;
    let path = repo_root.join(relnotesdir).join(CACHE_FILE_NAME);

    let af = AtomicFile::new(&path, OverwriteBehavior::AllowOverwrite);
    af.write(|f| std::io::Write::write_all(f, text.as_bytes()))
        .map_err(|e| match e {
            atomicwrites::Error::Internal(e) => crate::errors::Error::Io(e),
            atomicwrites::Error::User(e) => crate::errors::Error::Io(e),
        })?;

    Ok(())
}

/// Read a previously-written cache, if one exists, reconstructing both the
/// scan result and the already-loaded content for every note it names.
pub fn read(
    repo_root: &Path,
    relnotesdir: &str,
) -> Result<Option<(ScanResult, IndexMap<String, ParsedNote>)>> {
    let path = repo_root.join(relnotesdir).join(CACHE_FILE_NAME);

    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let doc: CacheDocument = serde_yaml::from_str(&text)?;

    let mut versions = IndexMap::new();
    for cached in doc.notes {
        let mut entries = Vec::with_capacity(cached.files.len());
        for (path, commit) in cached.files {
            let basename = path.rsplit('/').next().unwrap_or(&path);
            entries.push(NoteEntry {
                uid: unique_id(basename),
                path,
                commit: commit_from_cache(commit)?,
            });
        }
        versions.insert(cached.version, entries);
    }

    let cached_notes = doc
        .file_contents
        .into_iter()
        .map(|(uid, c)| {
            (
                uid,
                ParsedNote {
                    sections: c.sections,
                    warnings: Vec::new(),
                },
            )
        })
        .collect();

    Ok(Some((ScanResult { versions }, cached_notes)))
}

/// The path to the cache file, for `reno cache --clean`-style callers.
pub fn cache_path(repo_root: &Path, relnotesdir: &str) -> std::path::PathBuf {
    repo_root.join(relnotesdir).join(CACHE_FILE_NAME)
}
