// Copyright 2020 Peter Williams <peter@newton.cx> and collaborators
// Licensed under the MIT License.

//! Extracting the stable unique identifier embedded in a note's filename.
//!
//! A note's identity is anchored to a 16-character hex fragment of its
//! filename, not to its path. This is what lets the scanner recognize a
//! renamed note as the "same" note rather than a delete-and-add pair.

const UID_LEN: usize = 16;

/// Extract the unique id from a note's base filename.
///
/// The modern convention is `<slug>-<uid>.yaml`; the legacy convention,
/// still seen in older history, is `<uid>-<slug>.yaml`. Both forms use
/// exactly 16 hex characters for the id. The id is never validated as
/// actually being hex; garbage in is passed through, since any 16-wide
/// string still manages to provide a stable node within one repository.
pub fn unique_id(basename: &str) -> String {
    let stem = basename
        .rsplit_once('.')
        .map(|(stem, _ext)| stem)
        .unwrap_or(basename);

    if stem.len() <= UID_LEN {
        return stem.to_owned();
    }

    let tail = &stem[stem.len() - UID_LEN..];

    if tail.contains('-') {
        // Legacy naming: the id is the leading fragment instead.
        stem[..UID_LEN].to_owned()
    } else {
        tail.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modern_suffix_form() {
        assert_eq!(
            unique_id("add-a-widget-0123456789abcdef.yaml"),
            "0123456789abcdef"
        );
    }

    #[test]
    fn legacy_prefix_form() {
        assert_eq!(
            unique_id("0123456789abcdef-add-a-widget.yaml"),
            "0123456789abcdef"
        );
    }

    #[test]
    fn short_stem_is_passed_through() {
        assert_eq!(unique_id("short.yaml"), "short");
    }

    #[test]
    fn ignores_directory_components() {
        // callers are expected to pass the basename only, but a lone
        // extension-stripping pass should not choke on extra dots.
        assert_eq!(
            unique_id("my.note.name-fedcba9876543210.yaml"),
            "fedcba9876543210"
        );
    }
}
