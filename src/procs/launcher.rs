// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use tracing::{error, info, warn};

use crate::error::ErrorKind;
use crate::exec::Executor;
use crate::registry::ProgramRegistry;
use crate::Error;

/// Launch programs
///
/// Rules:
/// - programs are started one at a time in declaration order, the first failure aborts the sequence
/// - programs are stopped one at a time in reverse order, every stop is attempted
/// - nothing is retried, and a failed start does not stop what was already started
pub struct Launcher<'r, X: Executor> {
    registry: &'r ProgramRegistry,
    executor: X,
}

impl<'r, X: Executor> Launcher<'r, X> {
    pub fn new(registry: &'r ProgramRegistry, executor: X) -> Self {
        Self { registry, executor }
    }

    pub fn registry(&self) -> &ProgramRegistry {
        self.registry
    }

    pub fn executor(&self) -> &X {
        &self.executor
    }

    /// Runs every start command in order
    ///
    /// Returns the first failure, a nonzero status is `ErrorKind::StartFailed` carrying that status.
    pub async fn start_all(&self) -> Result<(), Error> {
        for program in self.registry.start_order() {
            let rv = self
                .executor
                .execute(program.start_command(), program.environment())
                .await
                .map_err(|e| {
                    error!(program = program.name(), "start failed for {}: {}", program.name(), e);
                    e
                })?;

            if rv != 0 {
                error!(program = program.name(), status = rv, "start failed for {}", program.name());
                return Err(ErrorKind::StartFailed {
                    program: program.name().to_string(),
                    status: rv,
                }
                .into());
            }
        }

        info!(programs = self.registry.len(), "all programs started");
        Ok(())
    }

    /// Runs every stop command in reverse order, regardless of earlier failures
    pub async fn stop_all(&self) -> StopReport {
        let mut report = StopReport::default();

        for program in self.registry.stop_order() {
            match self
                .executor
                .execute(program.stop_command(), program.environment())
                .await
            {
                Ok(0) => (),
                Ok(rv) => {
                    warn!(program = program.name(), status = rv, "stop failed for {}", program.name());
                    report.failed.push(program.name().to_string());
                }
                Err(e) => {
                    warn!(program = program.name(), "stop failed for {}: {}", program.name(), e);
                    report.failed.push(program.name().to_string());
                }
            }
        }

        report
    }
}

/// Outcome of the stop sequence
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StopReport {
    failed: Vec<String>,
}

impl StopReport {
    /// Programs whose stop command failed, in the order they were stopped
    pub fn failed(&self) -> &[String] {
        &self.failed
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// 0 if every stop succeeded, otherwise 1
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }
}
