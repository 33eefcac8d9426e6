// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process run log writer.
//!
//! Replaces the classic stdout-tee approach: the manager appends its
//! human-readable progress lines to `<name>_log.md` directly and mirrors
//! them to `tracing`, so no helper child process ever holds the log open.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::OffsetDateTime;

/// Wall-stamp layout used in log lines and file headers.
const STAMP_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[month]-[day] [hour]:[minute]:[second]");

/// Append-only writer for the pipeline's run log.
///
/// Cloned freely; all clones share one file handle. A disabled log
/// (interactive/multi mode) still mirrors lines to `tracing`.
#[derive(Clone)]
pub(crate) struct RunLog {
    file: Arc<Mutex<Option<File>>>,
}

impl RunLog {
    /// Open the log for appending, or a disabled log when `enabled` is
    /// false. Open failures degrade to a disabled log with a warning.
    pub(crate) fn open(path: &Path, enabled: bool) -> Self {
        let file = if enabled {
            match OpenOptions::new().create(true).append(true).open(path) {
                Ok(f) => Some(f),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "could not open run log");
                    None
                }
            }
        } else {
            None
        };
        Self {
            file: Arc::new(Mutex::new(file)),
        }
    }

    /// Append one line and mirror it to tracing.
    pub(crate) fn line(&self, message: &str) {
        tracing::info!("{}", message);
        if let Some(file) = self.file.lock().as_mut() {
            let _ = writeln!(file, "{}", message);
        }
    }

    /// Append a line surrounded by blank lines, for section headings.
    pub(crate) fn banner(&self, message: &str) {
        tracing::info!("{}", message);
        if let Some(file) = self.file.lock().as_mut() {
            let _ = writeln!(file, "\n{}\n", message);
        }
    }
}

/// Render epoch seconds as a `MM-DD HH:MM:SS` wall stamp.
pub(crate) fn wall_stamp(epoch_secs: u64) -> String {
    OffsetDateTime::from_unix_timestamp(epoch_secs as i64)
        .ok()
        .and_then(|t| t.format(STAMP_FORMAT).ok())
        .unwrap_or_else(|| epoch_secs.to_string())
}

#[cfg(test)]
#[path = "run_log_tests.rs"]
mod tests;
