// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::path::Path;

use clap::{App, Arg, ArgMatches};
use tokio::runtime;
use tracing::{error, info};

use waiter::config::{self, Ini};
use waiter::exec::CommandExecutor;
use waiter::logging;
use waiter::procs::{install_handlers, Launcher, Supervisor};
use waiter::registry::{inherited_environment, ProgramRegistry};
use waiter::Error;

const CONFIG: &str = "config";
const LOG_LEVEL: &str = "log-level";

trait SetupClapApp {
    fn setup_clap_app(self) -> Self;
}

impl<'a, 'b> SetupClapApp for App<'a, 'b> {
    fn setup_clap_app(self) -> Self {
        self.version(env!("CARGO_PKG_VERSION"))
            .author(env!("CARGO_PKG_AUTHORS"))
            .about("Run startup commands. Wait for SIGTERM. Run shutdown commands.")
    }
}

fn main() {
    let args = App::new(env!("CARGO_PKG_NAME"))
        .setup_clap_app()
        .arg(
            Arg::with_name(CONFIG)
                .short("c")
                .long(CONFIG)
                .value_name("FILE")
                .takes_value(true)
                .help("configuration file, defaults to waiter.conf in the working directory"),
        )
        .arg(
            Arg::with_name(LOG_LEVEL)
                .long(LOG_LEVEL)
                .value_name("LEVEL")
                .takes_value(true)
                .help("log filter, e.g. debug or waiter=trace, overrides RUST_LOG"),
        )
        .get_matches();

    if let Err(e) = logging::init(args.value_of(LOG_LEVEL)) {
        eprintln!("{}", e);
        std::process::exit(1);
    }

    let runtime = runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to initialize Tokio Runtime");

    let code = runtime.block_on(async move {
        match run(&args).await {
            Ok(code) => code,
            Err(e) => {
                error!("{}", e);
                e.exit_code()
            }
        }
    });

    info!(code, "exiting");
    std::process::exit(code);
}

async fn run(args: &ArgMatches<'_>) -> Result<i32, Error> {
    let cwd = std::env::current_dir()?;
    let path = config::locate(args.value_of_os(CONFIG).map(Path::new), &cwd)?;

    let ini = Ini::read(&path)?;
    let registry = ProgramRegistry::from_config(&ini, &inherited_environment())?;
    info!(config = %path.display(), programs = registry.len(), "loaded configuration");

    // handlers go in before anything is started, an early SIGTERM is held until all programs are up
    let signals = install_handlers()?;

    let supervisor = Supervisor::new(Launcher::new(&registry, CommandExecutor::new()));
    supervisor.run(signals).await
}
