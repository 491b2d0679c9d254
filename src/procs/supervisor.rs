// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use futures::pin_mut;
use nix::sys::signal::Signal;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

use crate::exec::Executor;
use crate::procs::launcher::{Launcher, StopReport};
use crate::Error;

/// Lifecycle of the supervisor process
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum SupervisorState {
    Starting = 0,
    Running,
    Stopping,
    Terminated,
}

impl SupervisorState {
    fn from_u8(state: u8) -> Self {
        match state {
            0 => SupervisorState::Starting,
            1 => SupervisorState::Running,
            2 => SupervisorState::Stopping,
            _ => SupervisorState::Terminated,
        }
    }
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SupervisorState::Starting => "starting",
            SupervisorState::Running => "running",
            SupervisorState::Stopping => "stopping",
            SupervisorState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Holds the state, every transition only moves forward and only from the expected state
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl Default for StateCell {
    fn default() -> Self {
        Self(AtomicU8::new(SupervisorState::Starting as u8))
    }
}

impl StateCell {
    pub fn get(&self) -> SupervisorState {
        SupervisorState::from_u8(self.0.load(Ordering::SeqCst))
    }

    /// Moves `from` -> `to`, false if the current state was not `from`
    fn transition(&self, from: SupervisorState, to: SupervisorState) -> bool {
        let moved = self
            .0
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();

        if moved {
            debug!(%from, %to, "state transition");
        }
        moved
    }

    pub fn mark_running(&self) -> bool {
        self.transition(SupervisorState::Starting, SupervisorState::Running)
    }

    /// Only the first caller wins, the stop sequence must run once
    pub fn begin_stop(&self) -> bool {
        self.transition(SupervisorState::Running, SupervisorState::Stopping)
    }

    pub fn mark_terminated(&self) -> bool {
        self.transition(SupervisorState::Stopping, SupervisorState::Terminated)
    }
}

/// What the supervisor does with a delivered signal
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Stop,
    Ignore,
}

/// Signals the supervisor installs handlers for
pub const OBSERVED_SIGNALS: &[Signal] = &[
    Signal::SIGTERM,
    Signal::SIGHUP,
    Signal::SIGUSR1,
    Signal::SIGUSR2,
];

/// Only SIGTERM stops the programs, everything else is just noted
pub fn route(signal: Signal) -> Action {
    match signal {
        Signal::SIGTERM => Action::Stop,
        _ => Action::Ignore,
    }
}

/// Installs the handlers, each one only forwards the signal onto the returned channel
///
/// Must be called from within the tokio runtime.
pub fn install_handlers() -> Result<UnboundedReceiver<Signal>, Error> {
    let (tx, rx) = unbounded_channel();

    for sig in OBSERVED_SIGNALS {
        forward(*sig, tx.clone())?;
    }

    Ok(rx)
}

fn forward(sig: Signal, tx: UnboundedSender<Signal>) -> Result<(), Error> {
    let mut stream = signal(SignalKind::from_raw(sig as i32))?;

    tokio::spawn(async move {
        while stream.recv().await.is_some() {
            if tx.send(sig).is_err() {
                break;
            }
        }
    });

    Ok(())
}

/// Launch and monitor processes
///
/// Rules:
///   - starts every program, then waits for SIGTERM
///   - on SIGTERM stops every program and reports the exit code for the process
///   - the stop sequence runs on the supervisor's task, never in the signal handler
pub struct Supervisor<'r, X: Executor> {
    launcher: Launcher<'r, X>,
    state: StateCell,
}

impl<'r, X: Executor> Supervisor<'r, X> {
    pub fn new(launcher: Launcher<'r, X>) -> Self {
        Self {
            launcher,
            state: StateCell::default(),
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.state.get()
    }

    pub fn launcher(&self) -> &Launcher<'r, X> {
        &self.launcher
    }

    /// Runs the whole lifecycle, returning the exit code for the supervisor process
    ///
    /// A failed start returns the error, its `exit_code` is the code to exit with.
    pub async fn run(&self, mut signals: UnboundedReceiver<Signal>) -> Result<i32, Error> {
        self.launcher.start_all().await?;
        self.state.mark_running();

        self.wait_for_stop(&mut signals).await;
        Ok(self.shutdown(&mut signals).await.exit_code())
    }

    /// Suspends until a signal routed to `Stop` arrives
    async fn wait_for_stop(&self, signals: &mut UnboundedReceiver<Signal>) {
        info!("waiting for SIGTERM...");

        loop {
            match signals.recv().await {
                Some(sig) => {
                    info!(signal = sig.as_str(), "caught signal {}", sig.as_str());
                    if route(sig) == Action::Stop && self.state.begin_stop() {
                        return;
                    }
                }
                None => {
                    warn!("signal handlers closed, stopping");
                    self.state.begin_stop();
                    return;
                }
            }
        }
    }

    /// Runs the stop sequence, signals arriving meanwhile are logged and dropped
    async fn shutdown(&self, signals: &mut UnboundedReceiver<Signal>) -> StopReport {
        let stop = self.launcher.stop_all();
        pin_mut!(stop);

        let mut signals_open = true;
        let report = loop {
            tokio::select! {
                report = &mut stop => break report,
                sig = signals.recv(), if signals_open => match sig {
                    Some(sig) => {
                        info!(signal = sig.as_str(), state = %self.state(), "caught signal {}, already stopping", sig.as_str());
                    }
                    None => signals_open = false,
                },
            }
        };

        self.state.mark_terminated();
        report
    }
}
