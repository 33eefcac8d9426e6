// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The pipeline manager: per-run state, the status flag store, and the
//! failure path.
//!
//! One manager instance supervises one pipeline run against one output
//! folder. All mutable run state sits behind a shared mutex so the
//! signal task and the exit fallback can reach it; the manager handle
//! itself is cheaply cloneable.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use sluice_core::{
    flag_file_name, format_elapsed, parse_flag_file_name, recover_path, Clock, PipelineError,
    Status, SystemClock,
};

use crate::run_log::{wall_stamp, RunLog};
use crate::signals;

/// Construction-time configuration for a pipeline run.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Pipeline name; prefixes flag files and annotates reports.
    pub name: String,
    /// Output folder; all managed files live here or beneath.
    pub outfolder: PathBuf,
    /// Pipeline version string recorded in the log header.
    pub version: Option<String>,
    /// Caller arguments echoed into the log header.
    pub args: Vec<(String, String)>,
    /// Interactive/multi-manager mode: suppress the run-log file.
    pub multi: bool,
    /// Route every cleanup to the manual cleanup script.
    pub manual_clean: bool,
    /// Start in overwrite-locks (recover) mode.
    pub recover: bool,
    /// Run follow-up callbacks even when the primary work is skipped.
    pub force_follow: bool,
    /// Ignore checkpoint short-circuits.
    pub overwrite_checkpoints: bool,
    /// Processor budget surfaced to commands.
    pub cores: u32,
    /// Memory budget in megabytes.
    pub mem_mb: u32,
    /// Wait for children (false = fire-and-forget, for debugging).
    pub wait: bool,
}

impl Settings {
    /// Settings for a pipeline whose output folder is named after it,
    /// inside a parent results directory.
    pub fn in_output_parent(name: impl Into<String>, output_parent: impl Into<PathBuf>) -> Self {
        let name = name.into();
        let outfolder = output_parent.into().join(&name);
        Self::new(name, outfolder)
    }

    pub fn new(name: impl Into<String>, outfolder: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            outfolder: outfolder.into(),
            version: None,
            args: Vec::new(),
            multi: false,
            manual_clean: false,
            recover: false,
            force_follow: false,
            overwrite_checkpoints: false,
            cores: 1,
            mem_mb: 1000,
            wait: true,
        }
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn args(mut self, args: Vec<(String, String)>) -> Self {
        self.args = args;
        self
    }

    pub fn multi(mut self, on: bool) -> Self {
        self.multi = on;
        self
    }

    pub fn manual_clean(mut self, on: bool) -> Self {
        self.manual_clean = on;
        self
    }

    pub fn recover(mut self, on: bool) -> Self {
        self.recover = on;
        self
    }

    pub fn force_follow(mut self, on: bool) -> Self {
        self.force_follow = on;
        self
    }

    pub fn overwrite_checkpoints(mut self, on: bool) -> Self {
        self.overwrite_checkpoints = on;
        self
    }

    pub fn cores(mut self, cores: u32) -> Self {
        self.cores = cores;
        self
    }

    pub fn mem_mb(mut self, mem_mb: u32) -> Self {
        self.mem_mb = mem_mb;
        self
    }

    pub fn wait(mut self, on: bool) -> Self {
        self.wait = on;
        self
    }

    /// Memory budget as a `<N>m` string.
    pub fn mem_str(&self) -> String {
        format!("{}m", self.mem_mb)
    }

    /// Heap hint at 95% of the memory budget, leaving headroom for
    /// non-heap use by JVM-style children.
    pub fn heap_hint(&self) -> String {
        format!("{}m", self.mem_mb as u64 * 95 / 100)
    }
}

/// A live child registered with the supervisor.
#[derive(Debug, Clone)]
pub(crate) struct ProcRecord {
    /// Logical command token (for profile rows).
    pub(crate) name: String,
    pub(crate) start: Instant,
    pub(crate) container: Option<String>,
}

/// Mutable run state shared between the caller, the signal task, and
/// the exit fallback.
pub(crate) struct Inner {
    pub(crate) status: Status,
    pub(crate) overwrite_locks: bool,
    /// Lock files created by this process, in acquisition order.
    pub(crate) locks: Vec<PathBuf>,
    /// Live children by pid.
    pub(crate) procs: HashMap<u32, ProcRecord>,
    /// Memory high-water mark across all sampled children, in kB.
    pub(crate) peak_memory_kb: f64,
    /// In-memory mirror of this pipeline's stats rows.
    pub(crate) stats: HashMap<String, String>,
    pub(crate) cleanup_list: Vec<String>,
    pub(crate) cleanup_conditional: Vec<String>,
    pub(crate) container: Option<String>,
    pub(crate) deferred: Vec<Box<dyn FnOnce() + Send>>,
    pub(crate) last_timestamp: Instant,
}

pub(crate) struct Shared<C: Clock> {
    pub(crate) settings: Settings,
    pub(crate) clock: C,
    pub(crate) start_time: Instant,
    pub(crate) state: Mutex<Inner>,
    pub(crate) log: RunLog,
    pub(crate) signal_task: Mutex<Option<JoinHandle<()>>>,
}

/// Supervises one pipeline run: the run-and-lock execution engine.
///
/// Handles are cheap clones sharing one run's state. Construction claims
/// the output folder (clearing stale flags, setting the running flag)
/// and installs SIGINT/SIGTERM handlers when a tokio runtime is active.
pub struct PipelineManager<C: Clock = SystemClock> {
    pub(crate) shared: Arc<Shared<C>>,
}

impl<C: Clock> Clone for PipelineManager<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl PipelineManager<SystemClock> {
    /// Start a pipeline run with the system clock.
    pub fn new(settings: Settings) -> Result<Self, PipelineError> {
        Self::with_clock(settings, SystemClock)
    }
}

impl<C: Clock> PipelineManager<C> {
    /// Start a pipeline run with an explicit clock (tests).
    pub fn with_clock(settings: Settings, clock: C) -> Result<Self, PipelineError> {
        std::fs::create_dir_all(&settings.outfolder)?;

        let log = RunLog::open(
            &settings.outfolder.join(format!("{}_log.md", settings.name)),
            !settings.multi,
        );
        let now = clock.now();
        let shared = Arc::new(Shared {
            state: Mutex::new(Inner {
                status: Status::Initializing,
                overwrite_locks: settings.recover,
                locks: Vec::new(),
                procs: HashMap::new(),
                peak_memory_kb: 0.0,
                stats: HashMap::new(),
                cleanup_list: Vec::new(),
                cleanup_conditional: Vec::new(),
                container: None,
                deferred: Vec::new(),
                last_timestamp: now,
            }),
            start_time: now,
            settings,
            clock,
            log,
            signal_task: Mutex::new(None),
        });

        shared.clear_flags();
        shared.write_header();
        shared.set_status(Status::Running);
        shared.write_run_markers();

        let manager = Self { shared };
        let handle = signals::install(&manager);
        *manager.shared.signal_task.lock() = handle;
        Ok(manager)
    }

    pub fn name(&self) -> &str {
        &self.shared.settings.name
    }

    pub fn outfolder(&self) -> &Path {
        &self.shared.settings.outfolder
    }

    pub fn settings(&self) -> &Settings {
        &self.shared.settings
    }

    pub fn status(&self) -> Status {
        self.shared.state.lock().status
    }

    pub fn completed(&self) -> bool {
        self.status() == Status::Completed
    }

    pub fn failed(&self) -> bool {
        self.status() == Status::Failed
    }

    pub fn halted(&self) -> bool {
        self.status() == Status::Paused
    }

    /// Whether the pipeline has been safely stopped.
    pub fn has_exit_status(&self) -> bool {
        self.status().is_terminal()
    }

    /// Memory high-water mark across all sampled children, in GB.
    pub fn peak_memory_gb(&self) -> f64 {
        self.shared.state.lock().peak_memory_kb / 1e6
    }

    /// Log a message with the current wall time and the elapsed time
    /// since the previous timestamp. Messages starting with `###` are
    /// rendered as banners.
    pub fn timestamp(&self, message: &str) {
        self.shared.timestamp(message);
    }

    /// Register an action to run at pipeline teardown (completion,
    /// failure, or process exit), in registration order.
    pub fn defer(&self, action: impl FnOnce() + Send + 'static) {
        self.shared.state.lock().deferred.push(Box::new(action));
    }

    /// Stop a completely finished pipeline.
    pub async fn complete(&self) -> Result<(), PipelineError> {
        self.stop(Status::Completed).await
    }

    /// Stop the pipeline before its completion point (resumable).
    pub async fn halt(&self) -> Result<(), PipelineError> {
        self.stop(Status::Paused).await
    }

    /// Fail the pipeline: terminate live children, optionally write
    /// recovery files for every held lock, produce a dry-run cleanup
    /// script, and advance the status to `failed`. Returns the error
    /// for propagation.
    pub fn fail(&self, err: PipelineError, dynamic_recover: bool) -> PipelineError {
        self.shared.fail_pipeline(err, dynamic_recover)
    }

    async fn stop(&self, status: Status) -> Result<(), PipelineError> {
        self.shared.set_status(status);
        self.shared.cleanup(false);

        let total = self.shared.clock.now() - self.shared.start_time;
        self.report_result("Time", &format_elapsed(total), None)
            .await?;
        self.report_result("Success", &wall_stamp(self.shared.clock.epoch_secs()), None)
            .await?;

        self.shared.log.banner("Epilogue:");
        self.shared
            .log
            .line(&format!("* Total elapsed time: {}", format_elapsed(total)));
        self.shared
            .log
            .line(&format!("* Peak memory used: {:.2} GB", self.peak_memory_gb()));
        self.shared.timestamp("* Pipeline stopped at:");

        self.shared.abort_signal_task();
        self.shared.run_deferred();
        Ok(())
    }
}

impl<C: Clock> Shared<C> {
    pub(crate) fn pipeline_file(&self, file_name: &str) -> PathBuf {
        self.settings.outfolder.join(file_name)
    }

    pub(crate) fn profile_file(&self) -> PathBuf {
        self.pipeline_file(&format!("{}_profile.tsv", self.settings.name))
    }

    pub(crate) fn commands_file(&self) -> PathBuf {
        self.pipeline_file(&format!("{}_commands.sh", self.settings.name))
    }

    pub(crate) fn cleanup_script_path(&self) -> PathBuf {
        self.pipeline_file(&format!("{}_cleanup.sh", self.settings.name))
    }

    /// Stats and figures are shared across pipelines, so they lack the
    /// pipeline-name prefix.
    pub(crate) fn stats_file(&self) -> PathBuf {
        self.pipeline_file("stats.tsv")
    }

    pub(crate) fn figures_file(&self) -> PathBuf {
        self.pipeline_file("figures.tsv")
    }

    pub(crate) fn flag_path(&self, status: Status) -> PathBuf {
        self.pipeline_file(&flag_file_name(&self.settings.name, status))
    }

    /// Advance the status flag: remove the previous flag file, set the
    /// in-memory field, then create the new flag file. Observers that
    /// see neither flag can read the field through a query interface.
    pub(crate) fn set_status(&self, next: Status) {
        let prev = self.state.lock().status;
        if !prev.can_transition(next) {
            tracing::warn!(%prev, %next, "illegal status transition");
        }

        let old_flag = self.flag_path(prev);
        if let Err(e) = std::fs::remove_file(&old_flag) {
            // No flag exists while initializing; absence elsewhere is unexpected.
            if prev != Status::Initializing {
                self.log.line(&format!(
                    "Could not remove flag file '{}': {}",
                    old_flag.display(),
                    e
                ));
            }
        }

        self.state.lock().status = next;
        if let Err(e) = create_file(&self.flag_path(next)) {
            tracing::warn!(status = %next, error = %e, "could not create flag file");
        }
        self.log
            .line(&format!("Changed status from {} to {}.", prev, next));
    }

    /// Remove flags left behind by previous runs of this pipeline.
    pub(crate) fn clear_flags(&self) {
        let entries = match std::fs::read_dir(&self.settings.outfolder) {
            Ok(entries) => entries,
            Err(_) => return,
        };
        for entry in entries.flatten() {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if let Some((pipeline, status)) = parse_flag_file_name(name) {
                if pipeline == self.settings.name {
                    tracing::debug!(%status, "clearing stale flag");
                    let _ = std::fs::remove_file(entry.path());
                }
            }
        }
    }

    pub(crate) fn timestamp(&self, message: &str) {
        let now = self.clock.now();
        let elapsed = {
            let mut inner = self.state.lock();
            let elapsed = now - inner.last_timestamp;
            inner.last_timestamp = now;
            elapsed
        };
        let line = format!(
            "{} ({}) elapsed: {}",
            message,
            wall_stamp(self.clock.epoch_secs()),
            format_elapsed(elapsed)
        );
        if message.starts_with("###") {
            self.log.banner(&line);
        } else {
            self.log.line(&line);
        }
    }

    fn write_header(&self) {
        let argv: Vec<String> = std::env::args().collect();
        self.log.line("----------------------------------------");
        self.log.line("Pipeline run code and environment:");
        self.log.line(&format!("*      Command: `{}`", argv.join(" ")));
        if let Ok(host) = std::env::var("HOSTNAME") {
            self.log.line(&format!("* Compute host: {}", host));
        }
        if let Ok(cwd) = std::env::current_dir() {
            self.log.line(&format!("*  Working dir: {}", cwd.display()));
        }
        self.log.line(&format!(
            "*    Outfolder: {}",
            self.settings.outfolder.display()
        ));
        if let Some(version) = &self.settings.version {
            self.log.line(&format!("*      Version: {}", version));
        }
        self.log.line(&format!(
            "*     Settings: cores: {}; memory: {}",
            self.settings.cores,
            self.settings.mem_str()
        ));
        for (arg, val) in &self.settings.args {
            self.log.line(&format!("* {}: `{}`", arg, val));
        }
        self.timestamp("* Pipeline started at:");
        self.log.line("----------------------------------------");
    }

    /// Mark the start of this run in the commands and profile files so
    /// later rows can be traced to it.
    fn write_run_markers(&self) {
        let marker = format!(
            "# Pipeline started at {}\n",
            wall_stamp(self.clock.epoch_secs())
        );
        for path in [self.commands_file(), self.profile_file()] {
            if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(&path) {
                let _ = writeln!(file, "{}", marker);
            }
        }
    }

    pub(crate) fn fail_pipeline(&self, err: PipelineError, dynamic_recover: bool) -> PipelineError {
        self.terminate_running_children();

        if dynamic_recover {
            // The run was terminated, not broken; flag held locks as
            // recoverable so the next process can seize them.
            let held: Vec<PathBuf> = std::mem::take(&mut self.state.lock().locks);
            if held.is_empty() {
                self.log
                    .line("No locked process; dynamic recovery will be automatic.");
            }
            for lock_file in held {
                let recover_file = recover_path(&lock_file);
                self.log.line(&format!(
                    "Setting dynamic recover file: {}",
                    recover_file.display()
                ));
                if let Err(e) = create_file_racefree(&recover_file) {
                    tracing::warn!(
                        path = %recover_file.display(),
                        error = %e,
                        "could not write recovery file"
                    );
                }
            }
        }

        // Interrupted runs leave their intermediates; emit the script only.
        self.cleanup(true);

        if self.state.lock().status != Status::Failed {
            self.timestamp("### Pipeline failed at:");
            let total = self.clock.now() - self.start_time;
            self.log
                .line(&format!("Total time: {}", format_elapsed(total)));
            self.set_status(Status::Failed);
        }

        self.abort_signal_task();
        err
    }

    pub(crate) fn abort_signal_task(&self) {
        if let Some(handle) = self.signal_task.lock().take() {
            handle.abort();
        }
    }

    pub(crate) fn run_deferred(&self) {
        let actions: Vec<Box<dyn FnOnce() + Send>> =
            std::mem::take(&mut self.state.lock().deferred);
        for action in actions {
            action();
        }
    }

    /// Make the cleanup script self-deleting and executable.
    pub(crate) fn finalize_cleanup_script(&self) {
        let script = self.cleanup_script_path();
        if !script.is_file() {
            return;
        }
        if let Ok(mut file) = OpenOptions::new().append(true).open(&script) {
            let _ = writeln!(file, "rm {}", script.display());
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755));
        }
    }
}

impl<C: Clock> Drop for Shared<C> {
    /// Exit fallback: finalize the cleanup script and, if the run never
    /// reached a terminal status, fail it so no stale running flag
    /// survives the process.
    fn drop(&mut self) {
        self.finalize_cleanup_script();
        let status = self.state.lock().status;
        if !status.is_terminal() && status != Status::Initializing {
            self.log.line(&format!("Pipeline status: {}", status));
            let _ = self.fail_pipeline(PipelineError::UnexpectedExit, false);
        }
        self.run_deferred();
    }
}

/// Create a marker file exclusively; the `AlreadyExists` outcome is
/// distinguishable so callers can restart their test-and-create loop.
pub(crate) fn create_file_racefree(path: &Path) -> std::io::Result<CreateOutcome> {
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(_) => Ok(CreateOutcome::Created),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(CreateOutcome::AlreadyExists),
        Err(e) => Err(e),
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum CreateOutcome {
    Created,
    AlreadyExists,
}

/// Create (or truncate) a marker file without exclusivity, for recover
/// and overwrite paths where ownership is being seized deliberately.
pub(crate) fn create_file(path: &Path) -> std::io::Result<()> {
    File::create(path).map(|_| ())
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
