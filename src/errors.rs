// Copyright 2020 Peter Williams <peter@newton.cx> and collaborators
// Licensed under the MIT License.

//! Error handling for the scanner core and its CLI front end.

use thiserror::Error;

/// The result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while scanning a repository's release notes.
#[derive(Debug, Error)]
pub enum Error {
    /// A ref name did not resolve to anything in the repository.
    #[error("no such ref `{0}` in this repository")]
    UnknownRef(String),

    /// The configured `earliest_version` is not among the tags discovered
    /// on the target branch.
    #[error("the configured earliest version `{0}` is not a known tag on this branch")]
    UnknownEarliestVersion(String),

    /// The pre-release regex was asked to strip a suffix but doesn't expose
    /// the `pre_release` capture group.
    #[error("`pre_release_tag_re` must contain a `pre_release` capture group")]
    MisconfiguredRegex,

    /// Two adds in the same commit claimed the same unique id, and no
    /// subsequent delete reconciles them.
    #[error("commit {commit} adds two different files with unique id {uid}")]
    DuplicateUidAdd { commit: String, uid: String },

    /// A commit's notes-subtree changes didn't reduce to one of the known
    /// shapes (add, delete, modify, rename, merge-modify, tainted-delete).
    #[error("commit {commit} has an unrecognized set of note changes for unique id {uid}")]
    UnrecognizedChangeSet { commit: String, uid: String },

    /// A note's top-level YAML value was not a mapping.
    #[error("note `{0}` does not parse as a YAML mapping")]
    MalformedNote(String),

    /// The repository has no working directory, so there is no working-copy
    /// state to scan and no place to write a new note.
    #[error("this operation requires a repository with a working directory")]
    BareRepository,

    /// The per-repository `config.yaml` exists but is not valid.
    #[error("could not parse configuration file `{path}`")]
    ConfigParse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// Wraps a `git2` failure.
    #[error(transparent)]
    Git(#[from] git2::Error),

    /// Wraps a `serde_yaml` failure that isn't a config-parse failure.
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// Wraps an I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Wraps a malformed regular expression supplied via configuration.
    #[error(transparent)]
    Regex(#[from] regex::Error),
}

/// CLI-level errors that don't belong in the scanner's own error taxonomy.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("no internal or external subcommand `{0}` is available (install `reno-{0}`?)")]
    NoSuchSubcommand(String),
}
