// Copyright 2020 Peter Williams <peter@newton.cx> and collaborators
// Licensed under the MIT License.

//! The release-notes configuration file.
//!
//! Given the same input repository, a scan should give reproducible results
//! no matter who's running it. So we really want all configuration to be at
//! the per-repository level, in a `config.yaml` file that sits alongside the
//! notes directory.

use regex::Regex;
use std::{fs, io, path::Path};

use crate::errors::{Error, Result};

/// The configuration file structure as explicitly serialized into YAML.
///
/// Every field is optional so that a repository's `config.yaml` only needs
/// to mention the options it wants to override.
mod syntax {
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Debug, Default, Deserialize, Serialize)]
    #[serde(rename_all = "snake_case")]
    pub struct SerializedConfig {
        pub notesdir: Option<String>,
        pub collapse_pre_releases: Option<bool>,
        pub stop_at_branch_base: Option<bool>,
        pub branch: Option<String>,
        pub default_branch: Option<String>,
        pub earliest_version: Option<String>,
        pub release_tag_re: Option<String>,
        pub pre_release_tag_re: Option<String>,
        pub branch_name_re: Option<String>,
        pub closed_branch_tag_re: Option<String>,
        pub branch_name_prefix: Option<String>,
        pub ignore_null_merges: Option<bool>,
        pub ignore_notes: Option<Vec<String>>,
        pub sections: Option<Vec<(String, String)>>,
        pub prelude_section_name: Option<String>,
        pub encoding: Option<String>,
        pub template: Option<String>,
    }
}

/// The note template written by `reno new` when no repo-specific template
/// has been configured.
const DEFAULT_TEMPLATE: &str = "\
---
prelude: >
    Replace this text with content to appear at the top of the section for
    this release. Not every release note requires a prelude.
features:
  - |
    List new features here, or remove this section.
issues:
  - |
    List known issues here, or remove this section.
upgrade:
  - |
    List upgrade notes here, or remove this section.
deprecations:
  - |
    List deprecation notes here, or remove this section.
critical:
  - |
    Add critical notes here, or remove this section.
security:
  - |
    Add security notes here, or remove this section.
fixes:
  - |
    Add normal bug fixes here, or remove this section.
other:
  - |
    Add other notes here, or remove this section.
";

fn default_sections() -> Vec<(String, String)> {
    [
        ("features", "New Features"),
        ("issues", "Known Issues"),
        ("upgrade", "Upgrade Notes"),
        ("deprecations", "Deprecation Notes"),
        ("critical", "Critical Issues"),
        ("security", "Security Issues"),
        ("fixes", "Bug Fixes"),
        ("other", "Other Notes"),
    ]
    .iter()
    .map(|(a, b)| ((*a).to_owned(), (*b).to_owned()))
    .collect()
}

/// The fully-resolved, immutable configuration governing a single scan.
///
/// Regexes are compiled eagerly, at construction time, so that a
/// misconfigured-regex problem surfaces before a scan is attempted rather
/// than partway through one.
#[derive(Debug, Clone)]
pub struct Config {
    pub notesdir: String,
    pub collapse_pre_releases: bool,
    pub stop_at_branch_base: bool,
    pub branch: Option<String>,
    pub default_branch: String,
    pub earliest_version: Option<String>,
    pub release_tag_re: Regex,
    pub pre_release_tag_re: Regex,
    pub branch_name_re: Regex,
    pub closed_branch_tag_re: Regex,
    pub branch_name_prefix: String,
    pub ignore_null_merges: bool,
    pub ignore_notes: Vec<String>,
    pub sections: Vec<(String, String)>,
    pub prelude_section_name: String,
    pub encoding: String,
    pub template: String,
}

impl Default for Config {
    fn default() -> Self {
        Config::from_serialized(syntax::SerializedConfig::default())
            .expect("built-in default configuration must compile")
    }
}

impl Config {
    /// Load the configuration for a release-notes directory.
    ///
    /// `relnotesdir` is the path (relative to the repository root) that
    /// contains `config.yaml` and the notes subdirectory. If the file is
    /// missing, the built-in defaults are used; if it exists but fails to
    /// parse, a `ConfigParse` error is returned.
    pub fn load<P: AsRef<Path>>(repo_root: P, relnotesdir: &str) -> Result<Config> {
        let path = repo_root.as_ref().join(relnotesdir).join("config.yaml");

        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Config::default()),
            Err(e) => return Err(Error::Io(e)),
        };

        let sercfg: syntax::SerializedConfig =
            serde_yaml::from_str(&text).map_err(|source| Error::ConfigParse {
                path: path.display().to_string(),
                source,
            })?;

        Config::from_serialized(sercfg)
    }

    fn from_serialized(s: syntax::SerializedConfig) -> Result<Config> {
        let release_tag_re = Regex::new(
            s.release_tag_re
                .as_deref()
                .unwrap_or(r"(?x) ^ v? \d+ \. \d+ \. \d+ (?: \. \d+ [a-z]+ \d* )? $"),
        )?;

        let pre_release_tag_re = Regex::new(
            s.pre_release_tag_re
                .as_deref()
                .unwrap_or(r"(?x) (?P<pre_release> \. \d+ (?: a | b | rc ) \d* ) $"),
        )?;

        if pre_release_tag_re
            .capture_names()
            .flatten()
            .all(|n| n != "pre_release")
        {
            return Err(Error::MisconfiguredRegex);
        }

        let branch_name_re = Regex::new(
            s.branch_name_re
                .as_deref()
                .unwrap_or(r"^(?:refs/heads/|refs/remotes/origin/)?stable/(?P<series>.+)$"),
        )?;

        let closed_branch_tag_re = Regex::new(
            s.closed_branch_tag_re
                .as_deref()
                .unwrap_or(r"^(?P<series>.+)-eol$"),
        )?;

        Ok(Config {
            notesdir: s.notesdir.unwrap_or_else(|| "notes".to_owned()),
            collapse_pre_releases: s.collapse_pre_releases.unwrap_or(true),
            stop_at_branch_base: s.stop_at_branch_base.unwrap_or(true),
            branch: s.branch,
            default_branch: s.default_branch.unwrap_or_else(|| "master".to_owned()),
            earliest_version: s.earliest_version,
            release_tag_re,
            pre_release_tag_re,
            branch_name_re,
            closed_branch_tag_re,
            branch_name_prefix: s.branch_name_prefix.unwrap_or_else(|| "stable/".to_owned()),
            ignore_null_merges: s.ignore_null_merges.unwrap_or(true),
            ignore_notes: s.ignore_notes.unwrap_or_default(),
            sections: s.sections.unwrap_or_else(default_sections),
            prelude_section_name: s
                .prelude_section_name
                .unwrap_or_else(|| "prelude".to_owned()),
            encoding: s.encoding.unwrap_or_else(|| "utf-8".to_owned()),
            template: s.template.unwrap_or_else(|| DEFAULT_TEMPLATE.to_owned()),
        })
    }

    /// The notes-relative path, e.g. `releasenotes/notes`.
    pub fn notes_path(&self, relnotesdir: &str) -> String {
        format!("{}/{}", relnotesdir.trim_end_matches('/'), self.notesdir)
    }
}
