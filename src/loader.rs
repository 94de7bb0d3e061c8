// Copyright 2020 Peter Williams <peter@newton.cx> and collaborators
// Licensed under the MIT License.

//! Obtaining a scan result, from cache if possible.
//!
//! Most commands don't care whether their `ScanResult` came from a fresh
//! walk of history or a previously-written cache; this module is the
//! single place that decides which one to do, and the single place that
//! knows how to turn one of its `NoteEntry` records into the actual parsed
//! content a renderer needs.

use std::path::Path;

use indexmap::IndexMap;

use crate::{
    cache,
    config::Config,
    errors::Result,
    note::{self, ParsedNote},
    repository::Repository,
    scanner::{NoteEntry, ScanResult, Scanner},
};

/// A scan result, plus (when it came from the cache) the note content that
/// was loaded alongside it.
pub struct Loaded {
    pub result: ScanResult,
    cached_notes: Option<IndexMap<String, ParsedNote>>,
}

impl Loaded {
    /// The parsed content for one entry. Served from the cache's
    /// already-loaded content when available; otherwise read and parsed
    /// from the repository on demand.
    pub fn note(
        &self,
        repo: &Repository,
        cfg: &Config,
        entry: &NoteEntry,
    ) -> Result<Option<ParsedNote>> {
        if let Some(cached) = &self.cached_notes {
            return Ok(cached.get(&entry.uid).cloned());
        }
        note::load(repo, cfg, &entry.path, entry.commit)
    }

    #[cfg(test)]
    pub fn for_test(result: ScanResult) -> Self {
        Loaded {
            result,
            cached_notes: None,
        }
    }
}

/// Load a scan result for `repo_root`/`relnotesdir`, using the on-disk
/// cache when one exists and the caller hasn't asked to ignore it.
pub fn load(
    repo: &Repository,
    repo_root: &Path,
    cfg: &Config,
    relnotesdir: &str,
    ignore_cache: bool,
) -> Result<Loaded> {
    if !ignore_cache {
        if let Some((result, cached_notes)) = cache::read(repo_root, relnotesdir)? {
            return Ok(Loaded {
                result,
                cached_notes: Some(cached_notes),
            });
        }
    }

    let scanner = Scanner::new(repo, cfg, relnotesdir);
    let result = scanner.scan()?;
    Ok(Loaded {
        result,
        cached_notes: None,
    })
}
