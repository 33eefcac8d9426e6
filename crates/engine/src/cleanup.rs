// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Intermediate-file cleanup.
//!
//! Pipelines register glob patterns for files that should be removed on
//! success. The unconditional list is removed whenever the pipeline
//! completes; the conditional list is only removed when no sibling
//! pipeline is still running in the same output folder, and otherwise
//! becomes deferred `rm` lines in a manual cleanup script. The failure
//! path runs a dry-run cleanup: everything is preserved and the script
//! records what would have been deleted.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use sluice_core::{parse_flag_file_name, Clock, Status};

use crate::manager::{PipelineManager, Shared};

impl<C: Clock> PipelineManager<C> {
    /// Register a glob pattern for cleanup when the pipeline completes.
    ///
    /// `conditional` defers removal until no sibling pipeline is
    /// running; `manual` (or the manager-wide `manual_clean` setting)
    /// routes the matches straight to the cleanup script instead.
    pub fn clean_add(&self, pattern: &str, conditional: bool, manual: bool) {
        self.shared.clean_add(pattern, conditional, manual);
    }
}

impl<C: Clock> Shared<C> {
    pub(crate) fn clean_add(&self, pattern: &str, conditional: bool, manual: bool) {
        let manual = manual || self.settings.manual_clean;
        if manual {
            self.append_script_lines(pattern);
        } else if conditional {
            self.state
                .lock()
                .cleanup_conditional
                .push(pattern.to_string());
        } else {
            let mut inner = self.state.lock();
            inner.cleanup_list.push(pattern.to_string());
            // An unconditional entry supersedes any conditional copy.
            inner.cleanup_conditional.retain(|p| p != pattern);
        }
    }

    /// Remove registered intermediate files.
    ///
    /// On dry-run (the failure path) the unconditional list is folded
    /// into the conditional list first, so nothing is deleted and the
    /// script records every deferred removal.
    pub(crate) fn cleanup(&self, dry_run: bool) {
        let (unconditional, conditional) = {
            let mut inner = self.state.lock();
            if dry_run && !inner.cleanup_list.is_empty() {
                let folded: Vec<String> = std::mem::take(&mut inner.cleanup_list);
                inner.cleanup_conditional.extend(folded);
            }
            (
                std::mem::take(&mut inner.cleanup_list),
                inner.cleanup_conditional.clone(),
            )
        };

        if !unconditional.is_empty() {
            self.log.line("Cleaning up flagged intermediate files...");
            for pattern in &unconditional {
                self.remove_glob(pattern);
            }
        }

        if conditional.is_empty() {
            return;
        }

        let blocking = self.sibling_flags();
        if blocking.is_empty() && !dry_run {
            self.log.line("Cleaning up conditional list...");
            for pattern in &conditional {
                self.remove_glob(pattern);
            }
            self.state.lock().cleanup_conditional.clear();
        } else {
            if !blocking.is_empty() {
                self.log
                    .line(&format!("Conditional flag found: {:?}", blocking));
                self.log.line(&format!(
                    "These conditional files were left in place: {:?}",
                    conditional
                ));
            }
            for pattern in &conditional {
                self.append_script_lines(pattern);
            }
        }
    }

    /// Flag files in the output folder that defer conditional cleanup:
    /// anything that is neither a completed flag nor this pipeline's
    /// own running flag.
    fn sibling_flags(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.settings.outfolder) else {
            return Vec::new();
        };
        let mut blocking = Vec::new();
        for entry in entries.flatten() {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            let Some((pipeline, status)) = parse_flag_file_name(name) else {
                continue;
            };
            if status == Status::Completed {
                continue;
            }
            if pipeline == self.settings.name && status == Status::Running {
                continue;
            }
            blocking.push(name.to_string());
        }
        blocking
    }

    /// Expand a glob and delete matched files and empty directories.
    /// Best-effort: matches that vanish or resist deletion are skipped.
    fn remove_glob(&self, pattern: &str) {
        self.log.line(&format!("Removing glob: {}", pattern));
        let pattern = self.resolve_pattern(pattern);
        let Ok(matches) = glob::glob(&pattern) else {
            tracing::debug!(%pattern, "unparsable cleanup pattern");
            return;
        };
        for path in matches.flatten() {
            if path.is_file() {
                self.log.line(&format!("`rm {}`", path.display()));
                let _ = std::fs::remove_file(&path);
            } else if path.is_dir() {
                self.log.line(&format!("`rmdir {}`", path.display()));
                let _ = std::fs::remove_dir(&path);
            }
        }
    }

    /// Append deferred `rm`/`rmdir` lines for a pattern's current
    /// matches to the cleanup script.
    fn append_script_lines(&self, pattern: &str) {
        let pattern = self.resolve_pattern(pattern);
        let Ok(matches) = glob::glob(&pattern) else {
            tracing::debug!(%pattern, "unparsable cleanup pattern");
            return;
        };
        let Ok(mut script) = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.cleanup_script_path())
        else {
            return;
        };
        for path in matches.flatten() {
            if path.is_file() {
                let _ = writeln!(script, "rm {}", path.display());
            } else if path.is_dir() {
                let _ = writeln!(script, "rm {}/*", path.display());
                let _ = writeln!(script, "rmdir {}", path.display());
            }
        }
    }

    /// Relative cleanup patterns refer to the output folder.
    fn resolve_pattern(&self, pattern: &str) -> String {
        if Path::new(pattern).is_absolute() {
            pattern.to_string()
        } else {
            self.settings.outfolder.join(pattern).display().to_string()
        }
    }
}

#[cfg(test)]
#[path = "cleanup_tests.rs"]
mod tests;
