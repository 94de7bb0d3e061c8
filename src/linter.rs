// Copyright 2020 Peter Williams <peter@newton.cx> and collaborators
// Licensed under the MIT License.

//! Linting the notes directory as it sits on disk, ignoring git history.
//!
//! `reno lint` is meant to run in CI against a working copy, so it walks
//! the directory tree directly (respecting `.gitignore`, since a generated
//! or vendored subtree has no business holding release notes) rather than
//! asking the repository for a particular commit's view.

use std::path::Path;

use ignore::WalkBuilder;

use crate::{config::Config, errors::Result, note};

/// One problem found while linting a single note file.
#[derive(Debug, Clone)]
pub struct LintProblem {
    pub path: String,
    pub message: String,
}

/// Walk `notes_dir` and validate every `.yaml` file in it.
///
/// Returns one `LintProblem` per warning (or parse failure) found; an
/// empty vector means every note in the directory parses cleanly.
pub fn lint(cfg: &Config, notes_dir: &Path) -> Result<Vec<LintProblem>> {
    let mut problems = Vec::new();
    let known: Vec<&str> = cfg.sections.iter().map(|(k, _)| k.as_str()).collect();

    let walker = WalkBuilder::new(notes_dir).hidden(false).build();

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };

        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
            continue;
        }

        let display_path = path.display().to_string();

        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                problems.push(LintProblem {
                    path: display_path,
                    message: e.to_string(),
                });
                continue;
            }
        };

        match note::parse(&contents, &cfg.prelude_section_name, &known) {
            Ok(parsed) => {
                for warning in parsed.warnings {
                    problems.push(LintProblem {
                        path: display_path.clone(),
                        message: describe(&warning),
                    });
                }
            }
            Err(e) => problems.push(LintProblem {
                path: display_path,
                message: e.to_string(),
            }),
        }
    }

    Ok(problems)
}

fn describe(warning: &note::Warning) -> String {
    match warning {
        note::Warning::PreludeNotString => "prelude value is not a string".to_owned(),
        note::Warning::UnknownSection(s) => format!("unrecognized section `{}`", s),
        note::Warning::MalformedSection(s) => {
            format!("section `{}` is neither a string nor a list of strings", s)
        }
        note::Warning::NonStringNote(s) => {
            format!("section `{}` contains a non-string list item", s)
        }
    }
}
