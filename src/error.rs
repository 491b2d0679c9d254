// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Exit code used when a start command could not be spawned at all
pub const SPAWN_FAILURE_CODE: i32 = 127;

#[derive(Error, Debug)]
pub enum ErrorKind {
    #[error("io error: {0}")]
    IoError(#[from] io::Error),
    #[error("no such file: {}", .0.display())]
    ConfigNotFound(PathBuf),
    #[error("config syntax error on line {line}: {msg}")]
    ConfigSyntax { line: usize, msg: String },
    #[error("program {program}: missing required key '{key}'")]
    MissingKey { program: String, key: &'static str },
    #[error("program {program}: '{key}' must name a command")]
    EmptyCommand { program: String, key: &'static str },
    #[error("program {program}: malformed environment pair '{pair}', expected KEY=VALUE")]
    MalformedEnvironment { program: String, pair: String },
    #[error("could not run '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("start failed for {program}, returned {status}")]
    StartFailed { program: String, status: i32 },
    #[error("an error occured: {0}")]
    ErrorMsg(String),
    #[error("an error occured: {0}")]
    ErrorStr(&'static str),
}

#[derive(Error, Debug)]
#[error(transparent)]
pub struct Error(ErrorKind);

impl Error {
    fn from_kind(kind: ErrorKind) -> Self {
        Self(kind)
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.0
    }

    /// The exit code the supervisor process should terminate with for this error
    ///
    /// A start command that could not be spawned at all exits with `SPAWN_FAILURE_CODE` (127, the shell's
    /// "command not found"), so it can be told apart from a program that ran and exited 1.
    pub fn exit_code(&self) -> i32 {
        match self.0 {
            ErrorKind::StartFailed { status, .. } => status,
            ErrorKind::Spawn { .. } => SPAWN_FAILURE_CODE,
            _ => 1,
        }
    }
}

impl<E> From<E> for Error
where
    E: Into<ErrorKind>,
{
    fn from(err: E) -> Self {
        Self::from_kind(err.into())
    }
}

impl From<&'static str> for Error {
    fn from(err: &'static str) -> Self {
        Self::from_kind(ErrorKind::ErrorStr(err))
    }
}

impl From<String> for Error {
    fn from(err: String) -> Self {
        Self::from_kind(ErrorKind::ErrorMsg(err))
    }
}
