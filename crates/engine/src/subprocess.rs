// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subprocess supervision: spawn, poll, sample, reap, and terminate.
//!
//! Children run in their own process group so terminal-delivered
//! SIGINT/SIGTERM reach only the supervisor; teardown is always
//! supervisor-driven, pid-directed SIGTERM.

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::process::Command;

use sluice_core::{command_token, split_command, Clock, PipelineError, CHILD_POLL};

use crate::manager::{PipelineManager, ProcRecord, Shared};
use crate::memory::{self, MemCategory};

impl<C: Clock> PipelineManager<C> {
    /// Execute a single command line under supervision.
    ///
    /// Returns the child's exit code and its sampled memory high-water
    /// mark in kB (`None` when sampling was unavailable). A nonzero exit
    /// is returned as a process error after the profile row is recorded,
    /// so the caller's triage decides whether the pipeline fails.
    pub(crate) async fn execute_command(
        &self,
        cmd_text: &str,
        use_shell: bool,
        container: Option<&str>,
        lock_name: &str,
    ) -> Result<(i32, Option<f64>), PipelineError> {
        let shared = &self.shared;
        shared.report_command(cmd_text);
        let token = command_token(cmd_text);

        let mut command = if use_shell {
            let mut command = Command::new("bash");
            command.arg("-c").arg(cmd_text);
            command
        } else {
            let argv = split_command(cmd_text)?;
            let mut command = Command::new(&argv[0]);
            command.args(&argv[1..]);
            command
        };
        // Own process group: the terminal's signals stop at the supervisor.
        // Children work out of the output folder, so relative paths in
        // command text and targets agree.
        command.process_group(0);
        command.current_dir(&shared.settings.outfolder);

        let mut child = command.spawn()?;
        let pid = child.id().unwrap_or_default();
        {
            let mut inner = shared.state.lock();
            inner.procs.insert(
                pid,
                ProcRecord {
                    name: token.clone(),
                    start: shared.clock.now(),
                    container: container.map(str::to_string),
                },
            );
        }

        if !shared.settings.wait {
            shared
                .log
                .line(&format!("Not waiting for subprocess: {}", pid));
            return Ok((0, None));
        }

        let start = shared.clock.now();
        let mut local_max_kb: Option<f64> = None;
        let mut delays = CHILD_POLL.delays();
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    // Shell children fork freely; sampling the shell's own
                    // pid would undercount, so only direct children are
                    // sampled.
                    if !use_shell {
                        let sample = match container {
                            Some(c) => memory::sample_container(c).await,
                            None => memory::sample_direct(pid, MemCategory::default()),
                        };
                        if let Some(kb) = sample {
                            local_max_kb = Some(local_max_kb.map_or(kb, |m| m.max(kb)));
                        }
                    }
                    tokio::time::sleep(delays.wait()).await;
                }
                Err(e) => {
                    shared.state.lock().procs.remove(&pid);
                    return Err(e.into());
                }
            }
        };

        let code = status.code().unwrap_or(-1);
        let elapsed = shared.clock.now() - start;

        let mut info = format!(
            "Process {} returned: ({}). Elapsed: {}.",
            pid,
            code,
            sluice_core::format_elapsed(elapsed)
        );
        if let Some(kb) = local_max_kb {
            let pipeline_peak = {
                let mut inner = shared.state.lock();
                inner.peak_memory_kb = inner.peak_memory_kb.max(kb);
                inner.peak_memory_kb
            };
            info.push_str(&format!(
                " Peak memory: (Process: {:.3} GB; Pipeline: {:.3} GB)",
                kb / 1e6,
                pipeline_peak / 1e6
            ));
        }
        shared.log.line(&info);

        shared.report_profile(&token, Some(lock_name), elapsed, local_max_kb);
        shared.state.lock().procs.remove(&pid);

        if code != 0 {
            return Err(PipelineError::Process {
                command: token,
                code,
            });
        }
        Ok((code, local_max_kb))
    }
}

impl<C: Clock> Shared<C> {
    /// Terminate every live child: record a final profile row with a
    /// last memory sample, then deliver SIGTERM.
    pub(crate) fn terminate_running_children(&self) {
        let procs: Vec<(u32, ProcRecord)> = {
            let mut inner = self.state.lock();
            inner.procs.drain().collect()
        };
        let now = self.clock.now();
        for (pid, record) in procs {
            let elapsed = now - record.start;
            let final_kb = match &record.container {
                Some(c) => memory::sample_container_blocking(c),
                None => memory::sample_direct(pid, MemCategory::default()),
            };
            self.report_profile(&record.name, None, elapsed, final_kb);
            self.kill_child(pid, &record.name);
        }
    }

    /// Deliver SIGTERM to one spawned child.
    pub(crate) fn kill_child(&self, pid: u32, name: &str) {
        self.log.line(&format!(
            "Terminating spawned child process {} ({})...",
            pid, name
        ));
        match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            Ok(()) => self.log.line("Child process terminated."),
            Err(e) => tracing::warn!(pid, error = %e, "could not signal child"),
        }
    }
}

#[cfg(test)]
#[path = "subprocess_tests.rs"]
mod tests;
