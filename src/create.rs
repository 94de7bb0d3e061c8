// Copyright 2020 Peter Williams <peter@newton.cx> and collaborators
// Licensed under the MIT License.

//! Writing a fresh note from the configured template.
//!
//! `reno new <slug>` is the only command that touches the working copy;
//! every other command only reads.

use std::path::{Path, PathBuf};

use rand::RngCore;

use crate::{config::Config, errors::Result};

/// Generate a new 16-hex-character unique id.
pub fn new_uid() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Write a new note file named `<slug>-<uid>.yaml` into `notes_dir`,
/// populated with the configured template.
///
/// Refuses to clobber an existing file, regenerating the id until it finds
/// one that's free (in the vanishingly unlikely event of a collision).
pub fn create(cfg: &Config, notes_dir: &Path, slug: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(notes_dir)?;

    loop {
        let uid = new_uid();
        let filename = format!("{}-{}.yaml", slug, uid);
        let path = notes_dir.join(&filename);

        if path.exists() {
            continue;
        }

        std::fs::write(&path, &cfg.template)?;
        return Ok(path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uid_is_sixteen_hex_chars() {
        let uid = new_uid();
        assert_eq!(uid.len(), 16);
        assert!(uid.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn create_writes_the_template_and_does_not_clobber() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::default();

        let path = create(&cfg, dir.path(), "add-a-widget").unwrap();
        assert!(path.exists());
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, cfg.template);

        let path2 = create(&cfg, dir.path(), "add-a-widget").unwrap();
        assert_ne!(path, path2);
    }
}
