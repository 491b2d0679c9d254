// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::Error;

pub const DEFAULT_LEVEL: &str = "info";

/// Builds the filter, an explicit level wins over `RUST_LOG`, which wins over the default
pub fn filter(level: Option<&str>) -> Result<EnvFilter, Error> {
    match level {
        Some(level) => EnvFilter::try_new(level)
            .map_err(|e| Error::from(format!("invalid log level '{}': {}", level, e))),
        None => Ok(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL))),
    }
}

/// Installs the global subscriber, output goes to stderr alongside the children's output
pub fn init(level: Option<&str>) -> Result<(), Error> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter(level)?)
        .try_init()
        .map_err(|e| Error::from(format!("failed to initialize logging: {}", e)))
}
