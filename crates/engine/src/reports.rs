// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reporting sinks: stats, figures, commands, and profile rows.
//!
//! Stats and figures files are shared between cooperating pipelines, so
//! rows carry an annotation column (defaulting to the pipeline name;
//! the sentinel `shared` exposes a row to every pipeline) and writes go
//! through the same lock protocol as targets. The commands and profile
//! files are private to one pipeline and appended directly.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use sluice_core::{format_elapsed, Clock, PipelineError};

use crate::manager::{PipelineManager, Shared};

/// Annotation exposing a stats row to every pipeline's `get_stat`.
pub const SHARED_ANNOTATION: &str = "shared";

impl<C: Clock> PipelineManager<C> {
    /// Report a key/value stat. Rows default to this pipeline's name as
    /// their annotation; pass [`SHARED_ANNOTATION`] to share the stat.
    pub async fn report_result(
        &self,
        key: &str,
        value: &str,
        annotation: Option<&str>,
    ) -> Result<(), PipelineError> {
        let shared = &self.shared;
        let annotation = annotation.unwrap_or(&shared.settings.name);
        let value = value.trim();

        shared
            .state
            .lock()
            .stats
            .insert(key.to_string(), value.to_string());

        let row = format!("{}\t{}\t{}", key, value, annotation);
        shared.log.line(&format!("> `{}`\t{}\t{}", key, value, annotation));
        self.locked_append(&shared.stats_file(), &row).await
    }

    /// Report a figure produced by the pipeline. Absolute paths are
    /// rewritten relative to the output folder.
    pub async fn report_figure(
        &self,
        key: &str,
        file_name: &Path,
        annotation: Option<&str>,
    ) -> Result<(), PipelineError> {
        let shared = &self.shared;
        let annotation = annotation.unwrap_or(&shared.settings.name);

        let relative = file_name
            .strip_prefix(&shared.settings.outfolder)
            .unwrap_or(file_name);

        let row = format!("{}\t{}\t{}", key, relative.display(), annotation);
        shared
            .log
            .line(&format!("> `{}`\t{}\t{}", key, relative.display(), annotation));
        self.locked_append(&shared.figures_file(), &row).await
    }

    /// Return a previously reported stat, rereading the stats file on a
    /// miss (a cooperating or earlier run may have reported it).
    pub fn get_stat(&self, key: &str) -> Option<String> {
        if let Some(value) = self.shared.state.lock().stats.get(key) {
            return Some(value.clone());
        }
        self.shared.refresh_stats();
        let value = self.shared.state.lock().stats.get(key).cloned();
        if value.is_none() {
            self.shared.log.line(&format!("Missing stat '{}'", key));
        }
        value
    }
}

impl<C: Clock> Shared<C> {
    /// Reread the stats file, keeping rows annotated with this
    /// pipeline's name or the shared sentinel.
    pub(crate) fn refresh_stats(&self) {
        let Ok(contents) = std::fs::read_to_string(self.stats_file()) else {
            return;
        };
        let mut inner = self.state.lock();
        for line in contents.lines() {
            let mut columns = line.split('\t');
            let (Some(key), Some(value), Some(annotation)) =
                (columns.next(), columns.next(), columns.next())
            else {
                tracing::warn!("stats row does not have 3 columns: {line}");
                continue;
            };
            let annotation = annotation.trim();
            if annotation == self.settings.name || annotation == SHARED_ANNOTATION {
                inner
                    .stats
                    .insert(key.to_string(), value.trim().to_string());
            }
        }
    }

    /// Record an executed command (post shell-mode inference), each on
    /// its own line preceded by a blank line.
    pub(crate) fn report_command(&self, cmd: &str) {
        self.log.line(&format!("> `{}`", cmd));
        if let Ok(mut file) = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.commands_file())
        {
            let _ = writeln!(file, "\n{}", cmd);
        }
    }

    /// Append one profile row: command, lock name, elapsed, peak GB.
    /// The memory column is `-` when sampling was unavailable.
    pub(crate) fn report_profile(
        &self,
        command: &str,
        lock_name: Option<&str>,
        elapsed: Duration,
        peak_kb: Option<f64>,
    ) {
        let peak = match peak_kb {
            Some(kb) => format!("{:.4}", kb / 1e6),
            None => "-".to_string(),
        };
        let row = format!(
            "{}\t{}\t{}\t{}",
            command,
            lock_name.unwrap_or("-"),
            format_elapsed(elapsed),
            peak
        );
        if let Ok(mut file) = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.profile_file())
        {
            let _ = writeln!(file, "{}", row);
        }
    }
}

#[cfg(test)]
#[path = "reports_tests.rs"]
mod tests;
