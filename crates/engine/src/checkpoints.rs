// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Checkpoint registry: per-stage skip markers.
//!
//! A checkpoint file marks a named stage as complete so a restarted run
//! can skip it. Files live directly in the output folder; a stage name
//! is slugged (lowercased, whitespace collapsed) for the file name.

use std::path::{Path, PathBuf};

use sluice_core::{checkpoint_path, Clock, PipelineError, StageRef};

use crate::manager::PipelineManager;

impl<C: Clock> PipelineManager<C> {
    /// Record that a stage has completed by touching its checkpoint
    /// file. Returns whether the file already existed (i.e. the stage
    /// had checkpointed before).
    ///
    /// Stages that opt out of checkpointing ([`sluice_core::Stage::transient`])
    /// return `false` without touching disk.
    pub fn checkpoint(&self, stage: impl Into<StageRef>) -> Result<bool, PipelineError> {
        let stage = stage.into();
        if !stage.is_checkpoint() {
            self.shared
                .log
                .line(&format!("Not a checkpoint: {}", stage.name()));
            return Ok(false);
        }

        let name = stage.name();
        // Only bare names are suspect; a structured stage vouches for
        // its own name.
        if matches!(&stage, StageRef::Name(_)) && looks_like_file_name(name) {
            self.shared.log.line(&format!(
                "WARNING: '{}' looks like a file name or path; for such a checkpoint, use touch_checkpoint",
                name
            ));
        }

        self.shared.log.line(&format!("Checkpointing: '{}'", name));
        let path = if Path::new(name).is_absolute() {
            PathBuf::from(name)
        } else {
            checkpoint_path(&self.shared.settings.outfolder, name)
        };
        self.touch_checkpoint(&path)
    }

    /// Touch a checkpoint file directly. Absolute paths must sit
    /// immediately in the output folder. Returns whether the file
    /// already existed.
    pub fn touch_checkpoint(&self, check_file: &Path) -> Result<bool, PipelineError> {
        let outfolder = &self.shared.settings.outfolder;
        let path = if check_file.is_absolute() {
            if check_file.parent() != Some(outfolder.as_path()) {
                return Err(PipelineError::CheckpointOutsideOutfolder {
                    path: check_file.to_path_buf(),
                    outfolder: outfolder.clone(),
                });
            }
            check_file.to_path_buf()
        } else {
            outfolder.join(check_file)
        };

        let already_exists = path.is_file();
        std::fs::write(&path, b"")?;
        let action = if already_exists { "Updated" } else { "Created" };
        self.shared
            .log
            .line(&format!("{} checkpoint file: '{}'", action, path.display()));
        Ok(already_exists)
    }
}

/// A stage name with a file extension is probably a file name: stage
/// names don't usually contain dots, so one dot right before a short
/// suffix is suspicious.
fn looks_like_file_name(name: &str) -> bool {
    match name.rsplit_once('.') {
        Some((base, ext)) => !ext.is_empty() && !base.contains('.') && !base.is_empty(),
        None => false,
    }
}

#[cfg(test)]
#[path = "checkpoints_tests.rs"]
mod tests;
