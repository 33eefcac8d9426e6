// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pipeline run status and the on-disk flag-file naming scheme.
//!
//! A pipeline advertises its state to external observers through a single
//! flag file named `<pipeline>_<status>.flag` in the output folder. The
//! status itself is a small state machine; [`Status::can_transition`]
//! encodes the legal moves.

use serde::{Deserialize, Serialize};
use std::fmt;

/// File-name suffix shared by all status flag files.
pub const FLAG_EXTENSION: &str = ".flag";

/// Lifecycle state of a managed pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Constructor has run but the output folder is not yet claimed.
    /// The only state with no flag file on disk.
    Initializing,
    /// Actively executing commands.
    Running,
    /// Blocked on another process's lock file.
    Waiting,
    /// Halted before the completion point (resumable).
    Paused,
    /// Finished cleanly.
    Completed,
    /// Stopped by an error or a termination signal.
    Failed,
}

impl Status {
    /// Token used in flag file names.
    pub fn token(self) -> &'static str {
        match self {
            Status::Initializing => "initializing",
            Status::Running => "running",
            Status::Waiting => "waiting",
            Status::Paused => "paused",
            Status::Completed => "completed",
            Status::Failed => "failed",
        }
    }

    /// Whether the pipeline has been safely stopped (completed, paused, or failed).
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Completed | Status::Paused | Status::Failed)
    }

    /// Legal state-machine transitions.
    ///
    /// ```text
    /// initializing -> running
    /// running <-> waiting
    /// running -> paused | completed | failed
    /// waiting -> failed
    /// paused -> running | completed | failed
    /// ```
    pub fn can_transition(self, next: Status) -> bool {
        use Status::*;
        matches!(
            (self, next),
            (Initializing, Running)
                | (Running, Waiting)
                | (Running, Paused)
                | (Running, Completed)
                | (Running, Failed)
                | (Waiting, Running)
                | (Waiting, Failed)
                | (Paused, Running)
                | (Paused, Completed)
                | (Paused, Failed)
        )
    }

    /// Parse a flag-file status token.
    pub fn from_token(token: &str) -> Option<Status> {
        match token {
            "initializing" => Some(Status::Initializing),
            "running" => Some(Status::Running),
            "waiting" => Some(Status::Waiting),
            "paused" => Some(Status::Paused),
            "completed" => Some(Status::Completed),
            "failed" => Some(Status::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Flag file name for a pipeline/status pair: `<pipeline>_<status>.flag`.
pub fn flag_file_name(pipeline: &str, status: Status) -> String {
    format!("{}_{}{}", pipeline, status.token(), FLAG_EXTENSION)
}

/// Split a flag file name back into its pipeline name and status.
///
/// Returns `None` for files that do not follow the flag naming scheme.
/// Pipeline names may themselves contain underscores, so the status token
/// is taken from the last `_`-separated component.
pub fn parse_flag_file_name(file_name: &str) -> Option<(&str, Status)> {
    let stem = file_name.strip_suffix(FLAG_EXTENSION)?;
    let (pipeline, token) = stem.rsplit_once('_')?;
    if pipeline.is_empty() {
        return None;
    }
    Some((pipeline, Status::from_token(token)?))
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
