// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The run-loop decision tree: skip, wait, recover, or execute.
//!
//! `run` is the workhorse. It enforces race-free file locking via
//! exclusive creation, skips work whose target already exists, consumes
//! recovery files left by interrupted runs, and otherwise executes the
//! command(s) under the subprocess supervisor. Multiple cooperating
//! manager processes may share one output folder; the filesystem is the
//! only coordination primitive.

use std::path::{Path, PathBuf};

use sluice_core::{
    checkpoint_path, lock_path, recover_path, target_slug, wrap_container, Clock, Cmd,
    PipelineError, ShellMode, StageRef, CHECKPOINT_EXTENSION, LOCK_WAIT,
};

use crate::manager::{create_file, create_file_racefree, CreateOutcome, PipelineManager};

/// Options for one [`PipelineManager::run`] call.
///
/// At least one of `target` and `lock_name` must be supplied.
pub struct RunOpts {
    pub(crate) cmd: Cmd,
    pub(crate) targets: Vec<PathBuf>,
    pub(crate) lock_name: Option<String>,
    pub(crate) shell: ShellMode,
    pub(crate) nofail: bool,
    pub(crate) errmsg: Option<String>,
    pub(crate) clean: bool,
    pub(crate) follow: Option<Box<dyn FnOnce() + Send>>,
    pub(crate) container: Option<String>,
    pub(crate) checkpoint: Option<StageRef>,
    pub(crate) checkpoint_filename: Option<String>,
    pub(crate) overwrite_checkpoint: bool,
}

impl RunOpts {
    pub fn new(cmd: impl Into<Cmd>) -> Self {
        Self {
            cmd: cmd.into(),
            targets: Vec::new(),
            lock_name: None,
            shell: ShellMode::Guess,
            nofail: false,
            errmsg: None,
            clean: false,
            follow: None,
            container: None,
            checkpoint: None,
            checkpoint_filename: None,
            overwrite_checkpoint: false,
        }
    }

    /// The output file this command produces; its presence is the
    /// idempotence key. Relative paths resolve against the output
    /// folder, which is also the child's working directory.
    pub fn target(mut self, target: impl Into<PathBuf>) -> Self {
        self.targets = vec![target.into()];
        self
    }

    /// Multiple outputs; the first is used for existence checks and
    /// lock-name derivation.
    pub fn targets(mut self, targets: Vec<PathBuf>) -> Self {
        self.targets = targets;
        self
    }

    /// Explicit lock name for targetless commands (or to share a lock
    /// across calls).
    pub fn lock_name(mut self, name: impl Into<String>) -> Self {
        self.lock_name = Some(name.into());
        self
    }

    pub fn shell(mut self, mode: ShellMode) -> Self {
        self.shell = mode;
        self
    }

    /// Let the pipeline proceed past a nonzero exit from this command.
    pub fn nofail(mut self, on: bool) -> Self {
        self.nofail = on;
        self
    }

    /// Extra message logged when the command fails.
    pub fn errmsg(mut self, msg: impl Into<String>) -> Self {
        self.errmsg = Some(msg.into());
        self
    }

    /// Register the target for automatic cleanup on pipeline success.
    pub fn clean(mut self, on: bool) -> Self {
        self.clean = on;
        self
    }

    /// Follow-up callback, run after a successful command (or after a
    /// skip, when the manager forces follows).
    pub fn follow(mut self, follow: impl FnOnce() + Send + 'static) -> Self {
        self.follow = Some(Box::new(follow));
        self
    }

    /// Docker container to execute in.
    pub fn container(mut self, container: impl Into<String>) -> Self {
        self.container = Some(container.into());
        self
    }

    /// Checkpoint gating this command: if the checkpoint file exists the
    /// command is skipped.
    pub fn checkpoint(mut self, stage: impl Into<StageRef>) -> Self {
        self.checkpoint = Some(stage.into());
        self
    }

    /// Exact checkpoint file name, overriding name-based derivation.
    pub fn checkpoint_filename(mut self, file_name: impl Into<String>) -> Self {
        self.checkpoint_filename = Some(file_name.into());
        self
    }

    /// Disregard an existing checkpoint for this call only.
    pub fn overwrite_checkpoint(mut self, on: bool) -> Self {
        self.overwrite_checkpoint = on;
        self
    }
}

impl<C: Clock> PipelineManager<C> {
    /// Run a command (or ordered series of commands), enforcing
    /// race-free file locking and restartability.
    ///
    /// Waits on foreign locks, skips execution when the target already
    /// exists or a checkpoint says the stage is done, and consumes
    /// recovery files left by interrupted runs. Returns the command's
    /// exit code (the maximum across a list); a nonzero code only
    /// reaches the caller when `nofail` is set.
    pub async fn run(&self, opts: RunOpts) -> Result<i32, PipelineError> {
        let RunOpts {
            cmd,
            targets,
            lock_name,
            shell,
            nofail,
            errmsg,
            clean,
            mut follow,
            container,
            checkpoint,
            checkpoint_filename,
            overwrite_checkpoint,
        } = opts;

        // A targetless command that needs locking must name its lock.
        if targets.is_empty() && lock_name.is_none() {
            return Err(self.fail(PipelineError::MissingTargetAndLock, false));
        }

        if self.checkpoint_says_skip(
            checkpoint.as_ref(),
            checkpoint_filename.as_deref(),
            overwrite_checkpoint,
        ) {
            return Ok(0);
        }

        let shared = &self.shared;
        let outfolder = &shared.settings.outfolder;
        // Lists are checked by their first element; relative targets
        // live in the output folder (like the children's working dir).
        let primary_target = targets.first().map(|t| {
            if t.is_absolute() {
                t.clone()
            } else {
                outfolder.join(t)
            }
        });

        let slug = match &lock_name {
            Some(name) => name.clone(),
            None => {
                let Some(target) = &primary_target else {
                    return Err(self.fail(PipelineError::MissingTargetAndLock, false));
                };
                target_slug(target, outfolder)
            }
        };
        let lock_file = lock_path(outfolder, &slug);
        let recover_file = recover_path(&lock_file);
        let mut recover_mode = false;
        let mut ret = 0i32;

        // The loop guards against lock-creation races: losing the
        // exclusive create sends us back through the full test block.
        loop {
            // Target exists and nobody is producing it: nothing to do.
            if let Some(target) = &primary_target {
                if target.exists() && !lock_file.is_file() {
                    shared
                        .log
                        .line(&format!("Target exists: `{}`", target.display()));
                    if shared.settings.force_follow {
                        self.call_follow(&mut follow);
                    }
                    break;
                }
            }

            if lock_file.is_file() {
                let overwrite = shared.state.lock().overwrite_locks;
                if overwrite {
                    shared
                        .log
                        .line("Found lock file; overwriting this target...");
                } else if recover_file.is_file() {
                    shared.log.line(
                        "Found lock file and dynamic recovery file; overwriting this target...",
                    );
                    // The recovery flag is spent once consumed, so a
                    // failed rerun isn't re-recovered by accident.
                    std::fs::remove_file(&recover_file)
                        .map_err(|e| self.fail(e.into(), false))?;
                    recover_mode = true;
                } else {
                    self.wait_for_lock(&lock_file).await;
                    // Re-test everything: the target may exist now.
                    continue;
                }
            }

            // Acquire: exclusive unless we are deliberately seizing it.
            shared.state.lock().locks.push(lock_file.clone());
            let seize = recover_mode || shared.state.lock().overwrite_locks;
            if seize {
                create_file(&lock_file).map_err(|e| self.fail(e.into(), false))?;
            } else {
                match create_file_racefree(&lock_file) {
                    Ok(CreateOutcome::Created) => {}
                    Ok(CreateOutcome::AlreadyExists) => {
                        // Lost the race; we own nothing.
                        shared.state.lock().locks.retain(|l| l != &lock_file);
                        shared
                            .log
                            .line("Lock file created after test; looping again.");
                        continue;
                    }
                    Err(e) => return Err(self.fail(e.into(), false)),
                }
            }

            match &primary_target {
                Some(target) => shared
                    .log
                    .line(&format!("Target to produce: `{}`", target.display())),
                None => shared.log.line("Targetless command, running..."),
            }

            for line in cmd.lines() {
                let wrapped = match &container {
                    Some(c) => wrap_container(line, c),
                    None => line.to_string(),
                };
                let use_shell = shell.resolve(&wrapped);
                match self
                    .execute_command(&wrapped, use_shell, container.as_deref(), &slug)
                    .await
                {
                    Ok((code, _mem)) => ret = ret.max(code),
                    Err(e) => {
                        ret = ret.max(self.triage_error(e, nofail, errmsg.as_deref())?);
                    }
                }
            }

            if clean {
                if let Some(target) = &primary_target {
                    self.clean_add(&target.display().to_string(), false, false);
                }
            }

            self.call_follow(&mut follow);

            std::fs::remove_file(&lock_file).map_err(|e| self.fail(e.into(), false))?;
            shared.state.lock().locks.retain(|l| l != &lock_file);
            break;
        }

        Ok(ret)
    }

    /// Decide what a command failure means: `nofail` commands log and
    /// let the pipeline continue (unless it already failed); anything
    /// else fails the pipeline.
    fn triage_error(
        &self,
        err: PipelineError,
        nofail: bool,
        errmsg: Option<&str>,
    ) -> Result<i32, PipelineError> {
        if let Some(msg) = errmsg {
            self.shared.log.line(msg);
        }
        if !nofail {
            return Err(self.fail(err, false));
        }
        if self.failed() {
            self.shared
                .log
                .line("This is a nofail process, but the pipeline has failed for other reasons.");
            return Err(err);
        }
        self.shared.log.line(&format!("{}", err));
        self.shared
            .log
            .line("ERROR: subprocess returned nonzero, but pipeline is continuing because nofail=true");
        Ok(err.exit_code())
    }

    fn call_follow(&self, follow: &mut Option<Box<dyn FnOnce() + Send>>) {
        if let Some(callback) = follow.take() {
            self.shared.log.banner("Follow:");
            callback();
        }
    }

    /// Check the checkpoint short-circuit for a `run` call. Logs the
    /// decision; returns true when the command should be skipped.
    fn checkpoint_says_skip(
        &self,
        checkpoint: Option<&StageRef>,
        checkpoint_filename: Option<&str>,
        overwrite_checkpoint: bool,
    ) -> bool {
        let shared = &self.shared;
        let outfolder = &shared.settings.outfolder;

        let candidates: Vec<PathBuf> = if let Some(file_name) = checkpoint_filename {
            vec![outfolder.join(file_name)]
        } else if let Some(stage) = checkpoint {
            // Both the raw name and its slug form are honored.
            let raw = outfolder.join(format!("{}{}", stage.name(), CHECKPOINT_EXTENSION));
            let slugged = checkpoint_path(outfolder, stage.name());
            if raw == slugged {
                vec![raw]
            } else {
                vec![raw, slugged]
            }
        } else {
            return false;
        };

        let overwrite = shared.settings.overwrite_checkpoints || overwrite_checkpoint;
        for candidate in &candidates {
            if candidate.is_file() {
                if overwrite {
                    shared.log.line(&format!(
                        "Running stage and overwriting checkpoint: '{}'",
                        candidate.display()
                    ));
                    return false;
                }
                shared.log.line(&format!(
                    "Checkpoint file exists ('{}'), skipping",
                    candidate.display()
                ));
                return true;
            }
        }
        shared.log.line(&format!(
            "No checkpoint file for '{}'; running...",
            candidates
                .first()
                .map(|c| c.display().to_string())
                .unwrap_or_default()
        ));
        false
    }

    /// Sleep until a foreign lock file disappears, advertising `waiting`
    /// status for the duration.
    pub(crate) async fn wait_for_lock(&self, lock_file: &Path) {
        let shared = &self.shared;
        let mut waited = false;
        let mut delays = LOCK_WAIT.delays();
        while lock_file.is_file() {
            if !waited {
                shared.timestamp(&format!(
                    "Waiting for file lock: {}",
                    lock_file.display()
                ));
                shared.set_status(sluice_core::Status::Waiting);
                waited = true;
            }
            tokio::time::sleep(delays.wait()).await;
        }
        if waited {
            shared.timestamp("File lock released.");
            shared.set_status(sluice_core::Status::Running);
        }
    }

    /// Sleep until an input file appears, then until its lock (if any)
    /// is released.
    pub async fn wait_for_file(&self, file: &Path) {
        let shared = &self.shared;
        let mut waited = false;
        let mut delays = LOCK_WAIT.delays();
        while !file.is_file() {
            if !waited {
                shared.timestamp(&format!("Waiting for file: {}", file.display()));
                waited = true;
            }
            tokio::time::sleep(delays.wait()).await;
        }
        if waited {
            shared.timestamp("File exists.");
        }
        let slug = target_slug(file, &shared.settings.outfolder);
        let lock_file = lock_path(&shared.settings.outfolder, &slug);
        self.wait_for_lock(&lock_file).await;
    }

    /// Append a row to a shared sink file under the lock protocol, so
    /// cooperating pipelines never interleave partial writes.
    pub(crate) async fn locked_append(
        &self,
        file: &Path,
        row: &str,
    ) -> Result<(), PipelineError> {
        use std::io::Write;

        let shared = &self.shared;
        let slug = target_slug(file, &shared.settings.outfolder);
        let lock_file = lock_path(&shared.settings.outfolder, &slug);
        loop {
            if lock_file.is_file() {
                self.wait_for_lock(&lock_file).await;
                continue;
            }
            match create_file_racefree(&lock_file) {
                Ok(CreateOutcome::Created) => {}
                Ok(CreateOutcome::AlreadyExists) => {
                    shared
                        .log
                        .line("Lock file created after test; looping again.");
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
            shared.state.lock().locks.push(lock_file.clone());

            let result = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(file)
                .and_then(|mut f| writeln!(f, "{}", row));

            let _ = std::fs::remove_file(&lock_file);
            shared.state.lock().locks.retain(|l| l != &lock_file);
            return result.map_err(Into::into);
        }
    }
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
