// Copyright 2020 Peter Williams <peter@newton.cx> and collaborators
// Licensed under the MIT License.

//! State shared by every CLI subcommand.

use std::path::PathBuf;

use crate::{config::Config, errors::Result, repository::Repository};

/// The default location, relative to the repository root, that holds a
/// project's configuration and notes.
const DEFAULT_RELNOTESDIR: &str = "releasenotes";

/// The main application state structure, threaded through every
/// subcommand.
pub struct AppSession {
    /// The backing repository.
    pub repo: Repository,

    /// The resolved configuration for this scan.
    pub config: Config,

    /// The repository-root-relative directory holding `config.yaml` and
    /// the notes subdirectory.
    pub relnotesdir: String,
}

impl AppSession {
    /// Initialize a new application session rooted at the environment's
    /// current repository.
    ///
    /// Initialization may fail if the environment doesn't associate the
    /// process with a proper Git repository.
    pub fn initialize(relnotesdir: Option<String>) -> Result<AppSession> {
        let repo = Repository::open_from_env()?;
        let relnotesdir = relnotesdir.unwrap_or_else(|| DEFAULT_RELNOTESDIR.to_owned());
        let workdir = repo.workdir()?;
        let config = Config::load(&workdir, &relnotesdir)?;

        Ok(AppSession {
            repo,
            config,
            relnotesdir,
        })
    }

    /// The repository-root-relative path to the notes subdirectory itself
    /// (as opposed to `relnotesdir`, which also holds `config.yaml`).
    pub fn notes_path(&self) -> String {
        self.config.notes_path(&self.relnotesdir)
    }

    /// The absolute path to the notes subdirectory on disk.
    pub fn notes_dir(&self) -> Result<PathBuf> {
        Ok(self.repo.workdir()?.join(self.notes_path()))
    }

    /// The absolute path to the repository's working directory.
    pub fn repo_root(&self) -> Result<PathBuf> {
        self.repo.workdir()
    }
}
