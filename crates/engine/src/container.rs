// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Docker container bootstrap and teardown.
//!
//! Commands can run inside a long-lived container: `get_container`
//! starts one with the requested mounts and schedules its removal at
//! pipeline teardown via the deferred-action registry.

use std::path::Path;

use tokio::process::Command;

use sluice_core::{command_token, needs_shell, split_command, Clock, PipelineError};

use crate::manager::PipelineManager;

impl<C: Clock> PipelineManager<C> {
    /// Start a detached container from `image` with each mount path
    /// bound to the same path inside the container. Returns the
    /// container id and schedules `docker rm -f` at teardown.
    pub async fn get_container(
        &self,
        image: &str,
        mounts: &[&str],
    ) -> Result<String, PipelineError> {
        let mut cmd = String::from("docker run -itd");
        for mount in mounts {
            let absolute = std::path::absolute(Path::new(mount))?;
            cmd.push_str(&format!(
                " -v {}:{}",
                absolute.display(),
                absolute.display()
            ));
        }
        cmd.push(' ');
        cmd.push_str(image);

        let container = self.capture_output(&cmd).await?.trim().to_string();
        self.shared.state.lock().container = Some(container.clone());
        self.shared
            .log
            .line(&format!("Using docker container: {}", container));

        let id = container.clone();
        self.defer(move || {
            let _ = std::process::Command::new("docker")
                .args(["rm", "-f", &id])
                .output();
        });
        Ok(container)
    }

    /// The container started by [`get_container`](Self::get_container),
    /// if any.
    pub fn container(&self) -> Option<String> {
        self.shared.state.lock().container.clone()
    }

    /// Force-remove a container now.
    pub async fn remove_container(&self, container: &str) -> Result<(), PipelineError> {
        self.shared.log.line("Removing docker container...");
        let cmd = format!("docker rm -f {}", container);
        self.capture_output(&cmd).await?;
        let mut inner = self.shared.state.lock();
        if inner.container.as_deref() == Some(container) {
            inner.container = None;
        }
        Ok(())
    }

    /// Run a command and capture its stdout (for bootstrap commands
    /// whose output feeds back into the pipeline, like container ids).
    pub(crate) async fn capture_output(&self, cmd_text: &str) -> Result<String, PipelineError> {
        self.shared.report_command(cmd_text);
        let mut command = if needs_shell(cmd_text) {
            let mut command = Command::new("bash");
            command.arg("-c").arg(cmd_text);
            command
        } else {
            let argv = split_command(cmd_text)?;
            let mut command = Command::new(&argv[0]);
            command.args(&argv[1..]);
            command
        };
        let output = command
            .current_dir(&self.shared.settings.outfolder)
            .output()
            .await?;
        if !output.status.success() {
            return Err(PipelineError::Process {
                command: command_token(cmd_text),
                code: output.status.code().unwrap_or(-1),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
