// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Derivation of the on-disk marker paths: lock files, recovery files,
//! and checkpoint files.
//!
//! All markers live directly in the pipeline's output folder. Lock names
//! derived from target paths flatten any subdirectory structure with a
//! `__` delimiter so that `aligned/sample1.bam` and `aligned_sample1.bam`
//! cannot collide with each other's directories.

use std::path::{Path, PathBuf, MAIN_SEPARATOR};

/// Prefix carried by every lock file name.
pub const LOCK_PREFIX: &str = "lock.";

/// Prefix carried by every recovery file name.
pub const RECOVER_PREFIX: &str = "recover.lock.";

/// File-name suffix for stage checkpoint files.
pub const CHECKPOINT_EXTENSION: &str = ".checkpoint";

/// Delimiter replacing path separators in lock-name slugs.
const SLUG_DELIMITER: &str = "__";

/// Lock-name slug for a target path.
///
/// The target is taken relative to `outfolder` when it lies beneath it,
/// and path separators are replaced with [`SLUG_DELIMITER`] so the lock
/// always sits directly in the output folder.
pub fn target_slug(target: &Path, outfolder: &Path) -> String {
    let rel = target.strip_prefix(outfolder).unwrap_or(target);
    rel.to_string_lossy()
        .trim_start_matches(MAIN_SEPARATOR)
        .replace(MAIN_SEPARATOR, SLUG_DELIMITER)
}

/// Path to the lock file for a lock name, resolved against `outfolder`.
///
/// The `lock.` prefix is applied to the file-name component only, so a
/// caller-supplied name is accepted whether or not it is already
/// prefixed.
pub fn lock_path(outfolder: &Path, name: &str) -> PathBuf {
    let (dir, file) = match name.rfind(MAIN_SEPARATOR) {
        Some(idx) => (&name[..idx + 1], &name[idx + 1..]),
        None => ("", name),
    };
    let file = if file.starts_with(LOCK_PREFIX) {
        file.to_string()
    } else {
        format!("{}{}", LOCK_PREFIX, file)
    };
    outfolder.join(format!("{}{}", dir, file))
}

/// Recovery-file path paired with a lock file: the `lock.` prefix on the
/// file-name component becomes `recover.lock.`.
pub fn recover_path(lock_file: &Path) -> PathBuf {
    let file = lock_file
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default();
    let recover = match file.strip_prefix(LOCK_PREFIX) {
        Some(rest) => format!("{}{}", RECOVER_PREFIX, rest),
        None => format!("{}{}", RECOVER_PREFIX, file),
    };
    lock_file.with_file_name(recover)
}

/// Slug form of a stage name: lowercased, runs of whitespace collapsed
/// to a single underscore.
pub fn stage_slug(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase()
}

/// Checkpoint file path for a stage name, in `outfolder`.
pub fn checkpoint_path(outfolder: &Path, stage_name: &str) -> PathBuf {
    outfolder.join(format!("{}{}", stage_slug(stage_name), CHECKPOINT_EXTENSION))
}

#[cfg(test)]
#[path = "paths_tests.rs"]
mod tests;
