// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Common library functions for waiter
//!
//! Starts every configured program in declaration order, waits for SIGTERM, then stops them in reverse.

pub mod config;
pub mod error;
pub mod exec;
pub mod logging;
pub mod procs;
pub mod registry;

pub use error::Error;
