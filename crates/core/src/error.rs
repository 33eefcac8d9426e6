// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pipeline error taxonomy.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that fail a pipeline run.
///
/// Argument errors (`MissingTargetAndLock`, `CheckpointOutsideOutfolder`,
/// `Tokenize`) fail the pipeline immediately. Process errors go through
/// nofail triage first. `Interrupted` is raised by the signal path with
/// dynamic recovery. Lock-creation races never surface here; the run
/// loop absorbs them by retrying.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// `run` was called with neither a target nor a lock name.
    #[error("a run must name a target or a lock")]
    MissingTargetAndLock,

    /// An absolute checkpoint path does not sit directly in the managed
    /// output folder.
    #[error("checkpoint path `{path}` is not directly in output folder `{outfolder}`")]
    CheckpointOutsideOutfolder { path: PathBuf, outfolder: PathBuf },

    /// A supervised child exited nonzero.
    #[error("process `{command}` returned nonzero exit code {code}")]
    Process { command: String, code: i32 },

    /// A command line could not be tokenized for direct execution.
    #[error("cannot tokenize command `{command}`: {reason}")]
    Tokenize { command: String, reason: String },

    /// The run was interrupted by a termination signal.
    #[error("interrupted by {signal}")]
    Interrupted { signal: String },

    /// The process is exiting with the pipeline in a non-terminal state.
    #[error("pipeline exited without a recorded completion status")]
    UnexpectedExit,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Exit code carried by a process error, `-1` otherwise.
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Process { code, .. } => *code,
            _ => -1,
        }
    }
}
