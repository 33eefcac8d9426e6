// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Signal-driven failure path.
//!
//! A single background task owns the SIGINT/SIGTERM streams for the
//! manager. On either signal it runs the graceful-fail path with dynamic
//! recovery (recovery files for every held lock) and exits the process
//! with code 1, so a killed run always leaves accurate markers behind.
//!
//! The task holds only a weak reference: dropping the last manager
//! handle tears the task's target down, and `complete`/`fail` abort the
//! task explicitly.

use std::sync::{Arc, Weak};

use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;

use sluice_core::{Clock, PipelineError};

use crate::manager::{PipelineManager, Shared};

/// Install the signal task for a manager.
///
/// Returns `None` when no tokio runtime is active (library used from a
/// sync context); the caller then has no signal-driven failure path.
pub(crate) fn install<C: Clock>(manager: &PipelineManager<C>) -> Option<JoinHandle<()>> {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        tracing::debug!("no tokio runtime; signal handlers not installed");
        return None;
    };
    let weak = Arc::downgrade(&manager.shared);
    Some(handle.spawn(watch(weak)))
}

async fn watch<C: Clock>(weak: Weak<Shared<C>>) {
    let Ok(mut sigterm) = signal(SignalKind::terminate()) else {
        tracing::warn!("could not register SIGTERM handler");
        return;
    };
    let Ok(mut sigint) = signal(SignalKind::interrupt()) else {
        tracing::warn!("could not register SIGINT handler");
        return;
    };

    let signal_name = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };

    if let Some(shared) = weak.upgrade() {
        interrupt(&shared, signal_name);
    }
}

/// Graceful-fail on a termination signal, then exit with code 1.
fn interrupt<C: Clock>(shared: &Shared<C>, signal_name: &str) -> ! {
    shared.timestamp(&format!("Got {}; failing gracefully...", signal_name));
    let _ = shared.fail_pipeline(
        PipelineError::Interrupted {
            signal: signal_name.to_string(),
        },
        true,
    );
    // exit() skips Drop, so finalize and drain the teardown registry here.
    shared.finalize_cleanup_script();
    shared.run_deferred();
    std::process::exit(1);
}
