// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! sluice: run-and-lock pipeline supervisor.
//!
//! Drives a [`sluice_engine::PipelineManager`] over the ordered steps of
//! a TOML runbook. Exit code 0 on clean completion, 1 on any failure
//! (including SIGINT/SIGTERM, which the engine turns into a graceful
//! fail with recovery markers).

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod runbook;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};

use sluice_core::parse_flag_file_name;
use sluice_engine::{PipelineManager, RunOpts, Settings};

#[derive(Parser)]
#[command(name = "sluice", version, about = "Run-and-lock pipeline supervisor")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a TOML runbook of supervised steps.
    Run {
        /// Runbook file describing the steps.
        runbook: PathBuf,
        /// Output folder for results, flags, and logs.
        #[arg(long)]
        outfolder: PathBuf,
        /// Override the runbook's pipeline name.
        #[arg(long)]
        name: Option<String>,
        /// Recover mode: overwrite lock files left by a dead run.
        #[arg(long)]
        recover: bool,
        /// Never clean automatically; defer everything to the script.
        #[arg(long)]
        manual_clean: bool,
        /// Run follow-ups even when the primary work is skipped.
        #[arg(long)]
        force_follow: bool,
        /// Ignore checkpoint short-circuits.
        #[arg(long)]
        overwrite_checkpoints: bool,
        /// Interactive mode: skip the run-log file.
        #[arg(long)]
        multi: bool,
        /// Processor budget surfaced to commands.
        #[arg(long, default_value_t = 1)]
        cores: u32,
        /// Memory budget in megabytes.
        #[arg(long, default_value_t = 1000)]
        mem: u32,
    },
    /// Show pipeline status flags in an output folder.
    Status {
        /// Output folder to inspect.
        #[arg(long)]
        outfolder: PathBuf,
        /// Only show this pipeline.
        #[arg(long)]
        name: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    setup_logging();
    let cli = Cli::parse();
    match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

async fn dispatch(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command {
        Commands::Run {
            runbook,
            outfolder,
            name,
            recover,
            manual_clean,
            force_follow,
            overwrite_checkpoints,
            multi,
            cores,
            mem,
        } => {
            let book = runbook::load(&runbook)?;
            let name = name.unwrap_or_else(|| book.name.clone());

            let mut settings = Settings::new(name, outfolder)
                .recover(recover)
                .manual_clean(manual_clean)
                .force_follow(force_follow)
                .overwrite_checkpoints(overwrite_checkpoints)
                .multi(multi)
                .cores(cores)
                .mem_mb(mem);
            if let Some(version) = &book.version {
                settings = settings.version(version.clone());
            }

            let manager = PipelineManager::new(settings).context("could not start pipeline")?;
            run_steps(&manager, book.steps).await?;
            manager.complete().await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Status { outfolder, name } => {
            show_status(&outfolder, name.as_deref())?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run_steps(
    manager: &PipelineManager,
    steps: Vec<runbook::Step>,
) -> anyhow::Result<()> {
    for (index, step) in steps.into_iter().enumerate() {
        let mut opts = RunOpts::new(step.cmd)
            .shell(step.shell)
            .nofail(step.nofail)
            .clean(step.clean);
        if let Some(target) = step.target {
            opts = opts.target(target);
        }
        if let Some(lock) = step.lock {
            opts = opts.lock_name(lock);
        }
        if let Some(checkpoint) = &step.checkpoint {
            opts = opts.checkpoint(checkpoint.as_str());
        }
        if let Some(errmsg) = step.errmsg {
            opts = opts.errmsg(errmsg);
        }

        let code = manager
            .run(opts)
            .await
            .with_context(|| format!("step {} failed", index + 1))?;
        if code != 0 {
            tracing::warn!(step = index + 1, code, "step returned nonzero (nofail)");
            continue;
        }

        if let Some(checkpoint) = &step.checkpoint {
            manager.checkpoint(checkpoint.as_str())?;
        }
    }
    Ok(())
}

fn show_status(outfolder: &std::path::Path, only: Option<&str>) -> anyhow::Result<()> {
    let entries = std::fs::read_dir(outfolder)
        .with_context(|| format!("could not read {}", outfolder.display()))?;
    let mut found = false;
    for entry in entries.flatten() {
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        let Some((pipeline, status)) = parse_flag_file_name(file_name) else {
            continue;
        };
        if only.is_some_and(|name| name != pipeline) {
            continue;
        }
        println!("{}: {}", pipeline, status);
        found = true;
    }
    if !found {
        println!("no pipeline flags found");
    }
    Ok(())
}

fn setup_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}
