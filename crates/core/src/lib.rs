// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sluice-core: shared types for the sluice pipeline supervisor

pub mod backoff;
pub mod clock;
pub mod command;
pub mod error;
pub mod paths;
pub mod stage;
pub mod status;
pub mod time_fmt;

pub use backoff::{Backoff, CHILD_POLL, LOCK_WAIT};
pub use clock::{Clock, FakeClock, SystemClock};
pub use command::{command_token, needs_shell, split_command, wrap_container, Cmd, ShellMode};
pub use error::PipelineError;
pub use paths::{
    checkpoint_path, lock_path, recover_path, stage_slug, target_slug, CHECKPOINT_EXTENSION,
    LOCK_PREFIX, RECOVER_PREFIX,
};
pub use stage::{Stage, StageRef};
pub use status::{flag_file_name, parse_flag_file_name, Status, FLAG_EXTENSION};
pub use time_fmt::{format_elapsed, format_elapsed_secs};
