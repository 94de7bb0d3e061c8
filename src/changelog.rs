// Copyright 2020 Peter Williams <peter@newton.cx> and collaborators
// Licensed under the MIT License.

//! Rendering a scan result as a reStructuredText release-notes report.
//!
//! The format mirrors what OpenStack-style documentation tooling expects:
//! one section per version, the prelude (if any) first, then the
//! configured sections in the configured order, each list item wrapped to
//! a reasonable width and bulleted.

use std::fmt::Write as _;

use crate::{config::Config, loader::Loaded, note::ParsedNote, repository::Repository};

const WRAP_WIDTH: usize = 79;

/// Render a full scan result to a reStructuredText document.
pub fn render(repo: &Repository, cfg: &Config, loaded: &Loaded) -> crate::errors::Result<String> {
    let mut out = String::new();

    for (version, entries) in &loaded.result.versions {
        let notes: Vec<ParsedNote> = entries
            .iter()
            .filter_map(|entry| loaded.note(repo, cfg, entry).transpose())
            .collect::<crate::errors::Result<Vec<_>>>()?;

        if notes.is_empty() {
            continue;
        }

        write_version_header(&mut out, version);
        write_prelude(&mut out, cfg, &notes);

        for (key, title) in &cfg.sections {
            write_section(&mut out, key, title, &notes);
        }
    }

    Ok(out)
}

fn write_version_header(out: &mut String, version: &str) {
    let header = format!("{} Release Notes", version);
    let _ = writeln!(out, "{}", header);
    let _ = writeln!(out, "{}", "=".repeat(header.len()));
    let _ = writeln!(out);
}

fn write_prelude(out: &mut String, cfg: &Config, notes: &[ParsedNote]) {
    let preludes: Vec<&str> = notes
        .iter()
        .filter_map(|n| n.sections.get(&cfg.prelude_section_name))
        .flat_map(|v| v.iter())
        .map(|s| s.as_str())
        .collect();

    for prelude in preludes {
        for line in textwrap::wrap(prelude.trim(), WRAP_WIDTH) {
            let _ = writeln!(out, "{}", line);
        }
        let _ = writeln!(out);
    }
}

fn write_section(out: &mut String, key: &str, title: &str, notes: &[ParsedNote]) {
    let items: Vec<&str> = notes
        .iter()
        .filter_map(|n| n.sections.get(key))
        .flat_map(|v| v.iter())
        .map(|s| s.as_str())
        .collect();

    if items.is_empty() {
        return;
    }

    let _ = writeln!(out, "{}", title);
    let _ = writeln!(out, "{}", "-".repeat(title.len()));
    let _ = writeln!(out);

    for item in items {
        let mut prefix = "- ";
        for line in textwrap::wrap(item.trim(), WRAP_WIDTH - 2) {
            let _ = writeln!(out, "{}{}", prefix, line);
            prefix = "  ";
        }
    }

    let _ = writeln!(out);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::NoteEntry;
    use std::fs;

    struct TestRepo {
        _dir: tempfile::TempDir,
        repo: git2::Repository,
    }

    impl TestRepo {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let repo = git2::Repository::init(dir.path()).unwrap();
            {
                let mut cfg = repo.config().unwrap();
                cfg.set_str("user.name", "Test").unwrap();
                cfg.set_str("user.email", "test@example.com").unwrap();
            }
            TestRepo { _dir: dir, repo }
        }

        fn path(&self) -> std::path::PathBuf {
            self.repo.workdir().unwrap().to_owned()
        }

        fn write(&self, relpath: &str, contents: &str) {
            let full = self.path().join(relpath);
            if let Some(parent) = full.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(full, contents).unwrap();
        }

        fn commit(&self, message: &str) -> git2::Oid {
            let sig = git2::Signature::now("Test", "test@example.com").unwrap();
            let mut index = self.repo.index().unwrap();
            index
                .add_all(["*"], git2::IndexAddOption::DEFAULT, None)
                .unwrap();
            index.write().unwrap();
            let tree_oid = index.write_tree().unwrap();
            let tree = self.repo.find_tree(tree_oid).unwrap();
            self.repo
                .commit(Some("HEAD"), &sig, &sig, message, &tree, &[])
                .unwrap()
        }
    }

    fn loaded_with(result: crate::scanner::ScanResult) -> Loaded {
        // Build a Loaded with no cache, so rendering reads each note's
        // content straight from the repository passed to `render`.
        crate::loader::Loaded::for_test(result)
    }

    #[test]
    fn renders_prelude_and_sections_in_order() {
        let t = TestRepo::new();
        t.write(
            "releasenotes/notes/a-0000000000000001.yaml",
            "prelude: This release is great.\n",
        );
        t.write(
            "releasenotes/notes/b-0000000000000002.yaml",
            "features:\n  - Added a widget.\n",
        );
        let c0 = t.commit("add notes");

        let repo = Repository::open(t.path()).unwrap();
        let cfg = Config::default();

        let mut result = crate::scanner::ScanResult::default();
        result.versions.insert(
            "1.0.0".to_owned(),
            vec![
                NoteEntry {
                    uid: "0000000000000001".to_owned(),
                    path: "releasenotes/notes/a-0000000000000001.yaml".to_owned(),
                    commit: crate::repository::CommitId::Commit(c0),
                },
                NoteEntry {
                    uid: "0000000000000002".to_owned(),
                    path: "releasenotes/notes/b-0000000000000002.yaml".to_owned(),
                    commit: crate::repository::CommitId::Commit(c0),
                },
            ],
        );

        let loaded = loaded_with(result);
        let rendered = render(&repo, &cfg, &loaded).unwrap();
        assert!(rendered.contains("1.0.0 Release Notes"));
        assert!(rendered.contains("This release is great."));
        let prelude_pos = rendered.find("This release is great.").unwrap();
        let features_pos = rendered.find("New Features").unwrap();
        assert!(prelude_pos < features_pos);
        assert!(rendered.contains("- Added a widget."));
    }

    #[test]
    fn empty_version_is_skipped() {
        let t = TestRepo::new();
        t.commit("init");
        let repo = Repository::open(t.path()).unwrap();
        let cfg = Config::default();

        let mut result = crate::scanner::ScanResult::default();
        result.versions.insert("1.0.0-1".to_owned(), Vec::new());

        let loaded = loaded_with(result);
        let rendered = render(&repo, &cfg, &loaded).unwrap();
        assert!(rendered.is_empty());
    }
}
