// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! TOML runbook files: an ordered list of supervised steps.
//!
//! ```toml
//! name = "rnaseq"
//! version = "0.3.1"
//!
//! [[step]]
//! cmd = "bowtie2 -x idx -U reads.fq -S aligned.sam"
//! target = "aligned.sam"
//! checkpoint = "align reads"
//!
//! [[step]]
//! cmd = ["samtools sort aligned.sam", "samtools index aligned.bam"]
//! target = "aligned.bam"
//! clean = true
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use sluice_core::{Cmd, ShellMode};

#[derive(Debug, Error)]
pub enum RunbookError {
    #[error("could not read runbook {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse runbook {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// A declarative pipeline: a name and its ordered steps.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Runbook {
    pub name: String,
    pub version: Option<String>,
    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
}

/// One supervised command invocation.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Step {
    pub cmd: Cmd,
    /// Output file whose presence makes this step skippable.
    pub target: Option<PathBuf>,
    /// Explicit lock name for targetless steps.
    pub lock: Option<String>,
    #[serde(default)]
    pub shell: ShellMode,
    #[serde(default)]
    pub nofail: bool,
    #[serde(default)]
    pub clean: bool,
    /// Stage name gating this step on a checkpoint file.
    pub checkpoint: Option<String>,
    /// Extra message logged when the step fails.
    pub errmsg: Option<String>,
}

/// Load and parse a runbook file.
pub fn load(path: &Path) -> Result<Runbook, RunbookError> {
    let contents = std::fs::read_to_string(path).map_err(|source| RunbookError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| RunbookError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
#[path = "runbook_tests.rs"]
mod tests;
