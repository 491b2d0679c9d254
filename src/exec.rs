// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::convert::TryFrom;
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use nix::sys::signal::Signal;
use tokio::process::Command;
use tracing::{info, warn};

use crate::error::ErrorKind;
use crate::registry::Environment;
use crate::Error;

pub struct StdIoConf {
    pub stdin: Stdio,
    pub stderr: Stdio,
    pub stdout: Stdio,
}

impl StdIoConf {
    /// Children write to wherever the supervisor writes
    pub fn inherit() -> Self {
        StdIoConf {
            stdin: Stdio::inherit(),
            stderr: Stdio::inherit(),
            stdout: Stdio::inherit(),
        }
    }
}

/// Runs a single command to completion
#[async_trait]
pub trait Executor: Send + Sync {
    /// Runs `command` with exactly `environment`, returning its exit status
    ///
    /// A command that could not be started at all is an `ErrorKind::Spawn` error, not a status.
    async fn execute(&self, command: &[String], environment: &Environment) -> Result<i32, Error>;
}

/// Executes commands as child processes of the supervisor
#[derive(Debug, Default)]
pub struct CommandExecutor;

impl CommandExecutor {
    pub fn new() -> Self {
        Self
    }

    fn get_stdio() -> StdIoConf {
        StdIoConf::inherit()
    }
}

#[async_trait]
impl Executor for CommandExecutor {
    async fn execute(&self, command: &[String], environment: &Environment) -> Result<i32, Error> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| Error::from("empty command"))?;
        let cmdline = command.join(" ");
        let stdio = Self::get_stdio();

        info!(command = %cmdline, "exec '{}'", cmdline);
        let status = Command::new(program)
            .args(args)
            .env_clear()
            .envs(environment)
            .stdin(stdio.stdin)
            .stdout(stdio.stdout)
            .stderr(stdio.stderr)
            .status()
            .await
            .map_err(|source| ErrorKind::Spawn {
                command: cmdline.clone(),
                source,
            })?;

        let rv = exit_code(status);
        info!(command = %cmdline, status = rv, "'{}' returned {}", cmdline, rv);

        Ok(rv)
    }
}

/// Normalizes an exit status, death by signal is reported as `128 + signo`
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    match status.signal() {
        Some(signo) => {
            let name = Signal::try_from(signo).map(Signal::as_str).unwrap_or("unknown");
            warn!(signal = name, "child terminated by signal {}", name);
            128 + signo
        }
        None => 1,
    }
}
