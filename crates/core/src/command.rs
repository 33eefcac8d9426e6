// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command model: single vs list commands, shell-mode inference, and
//! container wrapping.
//!
//! A command is either one shell line or an ordered series of them; the
//! supervisor runs list elements sequentially and aggregates their exit
//! codes. Shell-mode inference scans for metacharacters so plain argv
//! commands can be spawned directly (which keeps memory sampling usable),
//! while pipes and redirects go through a shell.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};

/// A command to execute: one line, or an ordered series run back to back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cmd {
    Single(String),
    List(Vec<String>),
}

impl Cmd {
    /// View the command as an ordered slice of lines.
    pub fn lines(&self) -> Vec<&str> {
        match self {
            Cmd::Single(cmd) => vec![cmd.as_str()],
            Cmd::List(cmds) => cmds.iter().map(String::as_str).collect(),
        }
    }

    /// True for the empty list (nothing to run).
    pub fn is_empty(&self) -> bool {
        match self {
            Cmd::Single(_) => false,
            Cmd::List(cmds) => cmds.is_empty(),
        }
    }
}

impl From<&str> for Cmd {
    fn from(cmd: &str) -> Self {
        Cmd::Single(cmd.to_string())
    }
}

impl From<String> for Cmd {
    fn from(cmd: String) -> Self {
        Cmd::Single(cmd)
    }
}

impl From<Vec<String>> for Cmd {
    fn from(cmds: Vec<String>) -> Self {
        Cmd::List(cmds)
    }
}

impl From<&[&str]> for Cmd {
    fn from(cmds: &[&str]) -> Self {
        Cmd::List(cmds.iter().map(|c| c.to_string()).collect())
    }
}

/// How a command line should be executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShellMode {
    /// Always run through `bash -c`.
    Always,
    /// Always tokenize and exec directly.
    Never,
    /// Infer from the command text ([`needs_shell`]).
    #[default]
    Guess,
}

impl ShellMode {
    /// Resolve the mode against a concrete command line.
    pub fn resolve(self, cmd: &str) -> bool {
        match self {
            ShellMode::Always => true,
            ShellMode::Never => false,
            ShellMode::Guess => needs_shell(cmd),
        }
    }
}

/// Characters whose presence forces shell interpretation.
const SHELL_METACHARS: &[char] = &['|', '>', '<', '*', ';', '&', '$'];

/// Guess whether a command line needs a shell by scanning for
/// metacharacters (pipes, redirects, globs, variables).
pub fn needs_shell(cmd: &str) -> bool {
    cmd.contains(SHELL_METACHARS)
}

/// Tokenize a command line into argv with POSIX shell word splitting.
pub fn split_command(cmd: &str) -> Result<Vec<String>, PipelineError> {
    let argv = shell_words::split(cmd).map_err(|e| PipelineError::Tokenize {
        command: cmd.to_string(),
        reason: e.to_string(),
    })?;
    if argv.is_empty() {
        return Err(PipelineError::Tokenize {
            command: cmd.to_string(),
            reason: "empty command".to_string(),
        });
    }
    Ok(argv)
}

/// Rewrite a command to execute inside a running docker container.
pub fn wrap_container(cmd: &str, container: &str) -> String {
    format!("docker exec {} {}", container, cmd)
}

/// The logical command token recorded in profile rows: the first
/// whitespace-delimited atom, after stripping any `docker exec <id>`
/// transport prefix so containerized commands don't all profile as
/// `docker`.
pub fn command_token(cmd: &str) -> String {
    let mut words = cmd.split_whitespace();
    match (words.next(), words.next()) {
        (Some("docker"), Some("exec")) => {
            // skip the container id; the next atom is the real command
            words.next();
            words.next().unwrap_or("docker").to_string()
        }
        (Some(first), _) => first.to_string(),
        (None, _) => String::new(),
    }
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
