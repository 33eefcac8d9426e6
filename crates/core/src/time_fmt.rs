// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Compact human-readable duration formatting for log lines, epilogues,
//! and profile rows.

use std::time::Duration;

/// Format a duration as a short human-readable string: `"5s"`, `"2m10s"`,
/// `"1h5m"`, `"2d3h"`.
pub fn format_elapsed(elapsed: Duration) -> String {
    format_elapsed_secs(elapsed.as_secs())
}

/// Format whole seconds as a short human-readable duration.
///
/// Sub-unit remainders are included when non-zero (`"2m10s"` vs `"2m"`);
/// beyond a day only days and hours are shown.
pub fn format_elapsed_secs(secs: u64) -> String {
    if secs < 60 {
        return format!("{}s", secs);
    }
    if secs < 3600 {
        let (m, s) = (secs / 60, secs % 60);
        return match s {
            0 => format!("{}m", m),
            _ => format!("{}m{}s", m, s),
        };
    }
    if secs < 86400 {
        let (h, m) = (secs / 3600, (secs % 3600) / 60);
        return match m {
            0 => format!("{}h", h),
            _ => format!("{}h{}m", h, m),
        };
    }
    let (d, h) = (secs / 86400, (secs % 86400) / 3600);
    match h {
        0 => format!("{}d", d),
        _ => format!("{}d{}h", d, h),
    }
}

#[cfg(test)]
#[path = "time_fmt_tests.rs"]
mod tests;
