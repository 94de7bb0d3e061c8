// Copyright 2020 Peter Williams <peter@newton.cx> and collaborators
// Licensed under the MIT License.

//! Parsing a single note's YAML content into sections.
//!
//! A note is a YAML mapping from section name to either a single string or
//! a list of strings. Everything other than "top level isn't a mapping" is
//! treated as a recoverable warning rather than a hard failure, so that one
//! sloppy note doesn't sink an entire scan.

use indexmap::IndexMap;
use serde_yaml::Value;

use crate::{
    config::Config,
    errors::{Error, Result},
    repository::{CommitId, Repository},
};

/// One section's parsed value: always normalized to a list, even when the
/// note author wrote a single scalar string.
pub type SectionValue = Vec<String>;

/// A successfully-parsed note, plus whatever non-fatal problems it had.
#[derive(Debug, Clone, Default)]
pub struct ParsedNote {
    pub sections: IndexMap<String, SectionValue>,
    pub warnings: Vec<Warning>,
}

/// A recoverable problem found while parsing a note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// The prelude section's value was not a plain string.
    PreludeNotString,

    /// A key was not one of the configured sections.
    UnknownSection(String),

    /// A section's value was neither a string nor a list of strings.
    MalformedSection(String),

    /// A list-valued section contained a non-string item, which was
    /// dropped.
    NonStringNote(String),
}

/// Parse a note's raw YAML bytes.
///
/// `known_sections` should include the configured prelude name and all
/// configured section keys; anything else produces an `UnknownSection`
/// warning but is still recorded, since the content shouldn't be silently
/// discarded.
pub fn parse(contents: &str, prelude_name: &str, known_sections: &[&str]) -> Result<ParsedNote> {
    let value: Value = serde_yaml::from_str(contents)?;

    let mapping = match value {
        Value::Mapping(m) => m,
        _ => return Err(Error::MalformedNote("top-level value is not a mapping".to_owned())),
    };

    let mut parsed = ParsedNote::default();

    for (key, val) in mapping {
        let key = match key.as_str() {
            Some(k) => k.to_owned(),
            None => continue,
        };

        if key == prelude_name {
            match val {
                Value::String(s) => {
                    parsed.sections.insert(key, vec![s]);
                }
                _ => parsed.warnings.push(Warning::PreludeNotString),
            }
            continue;
        }

        if !known_sections.contains(&key.as_str()) {
            parsed.warnings.push(Warning::UnknownSection(key.clone()));
        }

        match val {
            Value::String(s) => {
                parsed.sections.insert(key, vec![s]);
            }
            Value::Sequence(items) => {
                let mut strings = Vec::new();
                for item in items {
                    match item {
                        Value::String(s) => strings.push(s),
                        _ => parsed.warnings.push(Warning::NonStringNote(key.clone())),
                    }
                }
                parsed.sections.insert(key, strings);
            }
            _ => {
                parsed.warnings.push(Warning::MalformedSection(key));
            }
        }
    }

    Ok(parsed)
}

/// Load and parse one note given the `(path, commit-id)` pair that names it.
///
/// Returns `Ok(None)`, logging a line rather than failing, in either of the
/// two recoverable cases the spec calls out: the path no longer exists at
/// that revision (it was deleted after this note's last-seen commit, which
/// can legitimately happen for a note folded in from a since-rewritten
/// working copy), or the content at that revision fails to parse as a note
/// at all. Every other parse outcome, including one with warnings, is
/// still `Some`.
pub fn load(
    repo: &Repository,
    cfg: &Config,
    path: &str,
    commit: CommitId,
) -> Result<Option<ParsedNote>> {
    let contents = match commit {
        CommitId::WorkingCopy => repo.read_working_copy_file(path)?,
        CommitId::Commit(oid) => repo.file_at_commit(oid, path)?,
    };

    let contents = match contents {
        Some(bytes) => bytes,
        None => {
            log::debug!(
                "skipping note `{}` ({}): no longer present at its last-seen commit",
                path,
                commit
            );
            return Ok(None);
        }
    };

    let text = String::from_utf8_lossy(&contents);
    let known: Vec<&str> = cfg.sections.iter().map(|(k, _)| k.as_str()).collect();

    match parse(&text, &cfg.prelude_section_name, &known) {
        Ok(parsed) => Ok(Some(parsed)),
        Err(Error::MalformedNote(reason)) => {
            log::warn!("skipping malformed note `{}`: {}", path, reason);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}
