//! Blocking driver that owns an engine for the life of a `run` session.
//!
//! The runner sleeps until the engine's next callback is due, but never for
//! longer than one cadence, so shutdown requests and the Active switch are
//! noticed promptly.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::config::SettingsSnapshot;
use crate::engine::{StopSignal, TriggerSpamEngine, CHECK_INTERVAL};
use crate::error::{Result, SpamError};

pub struct Runner {
    engine: TriggerSpamEngine,
    snapshot: SettingsSnapshot,
    active_rx: watch::Receiver<bool>,
    clock: Arc<dyn Clock>,
    shutdown: StopSignal,
}

impl Runner {
    /// `active_rx` carries the Active switch; its current value decides
    /// whether the engine starts right away.
    pub fn new(
        engine: TriggerSpamEngine,
        snapshot: SettingsSnapshot,
        active_rx: watch::Receiver<bool>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let shutdown = engine.shutdown_signal();
        Self {
            engine,
            snapshot,
            active_rx,
            clock,
            shutdown,
        }
    }

    /// Requesting this ends [`run`](Self::run) and aborts any pass in flight.
    pub fn shutdown_signal(&self) -> StopSignal {
        self.shutdown.clone()
    }

    /// Drive the engine until shutdown is requested. Returns the engine,
    /// stopped.
    pub fn run(mut self) -> Result<TriggerSpamEngine> {
        let wanted = *self.active_rx.borrow_and_update();
        self.apply_active(wanted)?;

        while !self.shutdown.is_requested() {
            // A dropped sender just means nobody can toggle any more.
            if self.active_rx.has_changed().unwrap_or(false) {
                let wanted = *self.active_rx.borrow_and_update();
                self.apply_active(wanted)?;
            }

            let now = self.clock.now();
            let cap = now + CHECK_INTERVAL;
            let wake = self.engine.next_due().map_or(cap, |due| due.min(cap));
            self.clock.sleep_until(wake);
            self.engine.run_due();
        }

        debug!("shutdown requested");
        self.engine.stop();
        Ok(self.engine)
    }

    fn apply_active(&mut self, wanted: bool) -> Result<()> {
        if wanted == self.engine.is_active() {
            return Ok(());
        }
        if wanted {
            if !self.engine.start(self.snapshot.clone()) {
                return Err(SpamError::unsupported_platform(
                    "key input or focus detection is unavailable",
                ));
            }
            info!("active");
        } else {
            self.engine.stop();
            info!("paused");
        }
        Ok(())
    }
}
