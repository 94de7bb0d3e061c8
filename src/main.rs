// Copyright 2020 Peter Williams <peter@newton.cx> and collaborators
// Licensed under the MIT License.

//! The main `reno` command-line interface.
//!
//! This provides swiss-army-knife access to the scanner's built-in
//! subcommands, falling back to `reno-<name>` subprocesses for anything it
//! doesn't know about itself.
//!
//! Heavily modeled on Cargo's implementation of the same sort of
//! functionality.

use anyhow::{Context, Result};
use log::info;
use std::{
    collections::BTreeSet,
    env, fs,
    path::{Path, PathBuf},
};
use structopt::StructOpt;

mod aggregator;
mod app;
mod branch;
mod cache;
mod changelog;
mod config;
mod create;
mod errors;
mod graph;
mod linter;
mod loader;
mod logger;
mod note;
mod repository;
mod scanner;
mod tags;
mod tracker;
mod uid;

#[derive(Debug, StructOpt)]
#[structopt(about = "scan and report on a repository's release notes")]
struct RenoOptions {
    /// Override the release-notes directory (default: releasenotes)
    #[structopt(long, global = true)]
    relnotesdir: Option<String>,

    #[structopt(subcommand)]
    command: Commands,
}

trait Command {
    fn execute(self, relnotesdir: Option<String>) -> Result<i32>;
}

#[derive(Debug, StructOpt)]
enum Commands {
    #[structopt(name = "scan")]
    /// Scan the repository and print a summary of discovered versions
    Scan(ScanCommand),

    #[structopt(name = "report")]
    /// Render the scan result as a reStructuredText report
    Report(ReportCommand),

    #[structopt(name = "cache")]
    /// Manage the on-disk scan cache
    Cache(CacheCommand),

    #[structopt(name = "lint")]
    /// Validate every note file in the working copy
    Lint(LintCommand),

    #[structopt(name = "new")]
    /// Create a new, empty release note
    New(NewCommand),

    #[structopt(name = "list-commands")]
    /// List available subcommands
    ListCommands(ListCommandsCommand),

    #[structopt(external_subcommand)]
    External(Vec<String>),
}

impl Command for Commands {
    fn execute(self, relnotesdir: Option<String>) -> Result<i32> {
        match self {
            Commands::Scan(o) => o.execute(relnotesdir),
            Commands::Report(o) => o.execute(relnotesdir),
            Commands::Cache(o) => o.execute(relnotesdir),
            Commands::Lint(o) => o.execute(relnotesdir),
            Commands::New(o) => o.execute(relnotesdir),
            Commands::ListCommands(o) => o.execute(relnotesdir),
            Commands::External(args) => do_external(args),
        }
    }
}

fn main() -> Result<()> {
    logger::Logger::init().context("failed to initialize logging")?;
    log::set_max_level(log::LevelFilter::Info);

    let opts = RenoOptions::from_args();
    let exitcode = opts.command.execute(opts.relnotesdir)?;
    std::process::exit(exitcode);
}

// scan

#[derive(Debug, StructOpt)]
struct ScanCommand {
    /// Re-scan history even if a cache file is present
    #[structopt(long)]
    ignore_cache: bool,
}

impl Command for ScanCommand {
    fn execute(self, relnotesdir: Option<String>) -> Result<i32> {
        let sess = app::AppSession::initialize(relnotesdir)?;
        let repo_root = sess.repo_root()?;
        let loaded = loader::load(
            &sess.repo,
            &repo_root,
            &sess.config,
            &sess.relnotesdir,
            self.ignore_cache,
        )?;

        for (version, notes) in &loaded.result.versions {
            println!("{}: {} note(s)", version, notes.len());
        }

        Ok(0)
    }
}

// report

#[derive(Debug, StructOpt)]
struct ReportCommand {
    /// Re-scan history even if a cache file is present
    #[structopt(long)]
    ignore_cache: bool,
}

impl Command for ReportCommand {
    fn execute(self, relnotesdir: Option<String>) -> Result<i32> {
        let sess = app::AppSession::initialize(relnotesdir)?;
        let repo_root = sess.repo_root()?;
        let loaded = loader::load(
            &sess.repo,
            &repo_root,
            &sess.config,
            &sess.relnotesdir,
            self.ignore_cache,
        )?;

        print!(
            "{}",
            changelog::render(&sess.repo, &sess.config, &loaded)?
        );
        Ok(0)
    }
}

// cache

#[derive(Debug, StructOpt)]
struct CacheCommand {
    #[structopt(subcommand)]
    command: CacheCommands,
}

#[derive(Debug, StructOpt)]
enum CacheCommands {
    #[structopt(name = "update")]
    /// Rescan history and refresh the cache file
    Update,

    #[structopt(name = "clean")]
    /// Remove the cache file, forcing the next scan to start fresh
    Clean,
}

impl Command for CacheCommand {
    fn execute(self, relnotesdir: Option<String>) -> Result<i32> {
        let sess = app::AppSession::initialize(relnotesdir)?;
        let repo_root = sess.repo_root()?;

        match self.command {
            CacheCommands::Update => {
                let scanner = scanner::Scanner::new(&sess.repo, &sess.config, &sess.relnotesdir);
                let result = scanner.scan()?;
                cache::write(
                    &sess.repo,
                    &sess.config,
                    &repo_root,
                    &sess.relnotesdir,
                    &result,
                )?;
                info!("cache updated");
            }
            CacheCommands::Clean => {
                let path = cache::cache_path(&repo_root, &sess.relnotesdir);
                if path.exists() {
                    fs::remove_file(&path)?;
                }
                info!("cache removed");
            }
        }

        Ok(0)
    }
}

// lint

#[derive(Debug, StructOpt)]
struct LintCommand {}

impl Command for LintCommand {
    fn execute(self, relnotesdir: Option<String>) -> Result<i32> {
        let sess = app::AppSession::initialize(relnotesdir)?;
        let notes_dir = sess.notes_dir()?;
        let problems = linter::lint(&sess.config, &notes_dir)?;

        for problem in &problems {
            println!("{}: {}", problem.path, problem.message);
        }

        if problems.is_empty() {
            Ok(0)
        } else {
            Ok(1)
        }
    }
}

// new

#[derive(Debug, StructOpt)]
struct NewCommand {
    #[structopt(help = "A short, filesystem-safe description of the change")]
    slug: String,
}

impl Command for NewCommand {
    fn execute(self, relnotesdir: Option<String>) -> Result<i32> {
        let sess = app::AppSession::initialize(relnotesdir)?;
        let notes_dir = sess.notes_dir()?;
        let path = create::create(&sess.config, &notes_dir, &self.slug)?;
        println!("created {}", path.display());
        Ok(0)
    }
}

// list-commands

#[derive(Debug, StructOpt)]
struct ListCommandsCommand {}

impl Command for ListCommandsCommand {
    fn execute(self, _relnotesdir: Option<String>) -> Result<i32> {
        println!("Currently available \"reno\" subcommands:\n");

        for command in list_commands() {
            println!("    {}", command);
        }

        Ok(0)
    }
}

/// Run an external command by executing a subprocess.
fn do_external(all_args: Vec<String>) -> Result<i32> {
    let (cmd, args) = all_args
        .split_first()
        .ok_or_else(|| errors::CliError::NoSuchSubcommand(String::new()))?;

    let command_exe = format!("reno-{}{}", cmd, env::consts::EXE_SUFFIX);
    let path = search_directories()
        .iter()
        .map(|dir| dir.join(&command_exe))
        .find(|file| is_executable(file));

    let command = path.ok_or_else(|| errors::CliError::NoSuchSubcommand(cmd.to_owned()))?;
    exec_or_spawn(std::process::Command::new(command).args(args))
}

#[cfg(unix)]
/// On Unix, exec() to replace ourselves with the child process. This
/// function *should* never return.
fn exec_or_spawn(cmd: &mut std::process::Command) -> Result<i32> {
    use std::os::unix::process::CommandExt;
    Ok(Err(cmd.exec())?)
}

#[cfg(not(unix))]
fn exec_or_spawn(cmd: &mut std::process::Command) -> Result<i32> {
    Ok(cmd.status()?.code().unwrap())
}

fn list_commands() -> BTreeSet<String> {
    let prefix = "reno-";
    let suffix = env::consts::EXE_SUFFIX;
    let mut commands = BTreeSet::new();

    for dir in search_directories() {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            _ => continue,
        };
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            let filename = match path.file_name().and_then(|s| s.to_str()) {
                Some(filename) => filename,
                _ => continue,
            };
            if !filename.starts_with(prefix) || !filename.ends_with(suffix) {
                continue;
            }
            if is_executable(entry.path()) {
                let end = filename.len() - suffix.len();
                commands.insert(filename[prefix.len()..end].to_string());
            }
        }
    }

    commands.insert("scan".to_owned());
    commands.insert("report".to_owned());
    commands.insert("cache".to_owned());
    commands.insert("lint".to_owned());
    commands.insert("new".to_owned());
    commands.insert("list-commands".to_owned());

    commands
}

#[cfg(unix)]
fn is_executable<P: AsRef<Path>>(path: P) -> bool {
    use std::os::unix::prelude::*;
    fs::metadata(path)
        .map(|metadata| metadata.is_file() && metadata.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(windows)]
fn is_executable<P: AsRef<Path>>(path: P) -> bool {
    fs::metadata(path)
        .map(|metadata| metadata.is_file())
        .unwrap_or(false)
}

fn search_directories() -> Vec<PathBuf> {
    let mut dirs = Vec::new();

    if let Some(val) = env::var_os("PATH") {
        dirs.extend(env::split_paths(&val));
    }
    dirs
}
