//! System-wide hotkey for the Active switch.
//!
//! Pressing the hotkey flips a `watch` channel between active and paused;
//! the [`Runner`](crate::runner::Runner) starts or stops the engine
//! accordingly.

use std::sync::Arc;
use std::time::Duration;

use global_hotkey::hotkey::HotKey;
use global_hotkey::{GlobalHotKeyEvent, GlobalHotKeyManager, HotKeyState};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::engine::StopSignal;
use crate::error::{Result, SpamError};
use crate::platform;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Parse a hotkey such as `"ctrl+alt+s"` or `"shift+F9"`.
pub fn parse_hotkey(hotkey_str: &str) -> Result<HotKey> {
    let trimmed = hotkey_str.trim();
    if trimmed.is_empty() {
        return Err(SpamError::hotkey("empty hotkey string"));
    }
    trimmed
        .parse::<HotKey>()
        .map_err(|e| SpamError::hotkey(format!("invalid hotkey '{trimmed}': {e}")))
}

/// A registered activation hotkey and the thread listening for it.
pub struct ActivationHotkey {
    listener: JoinHandle<()>,
}

impl ActivationHotkey {
    /// Register `hotkey_str` as the toggle for `active_tx` and listen until
    /// `shutdown` is requested.
    ///
    /// The hotkey manager is created on the listener thread because its
    /// window only receives hotkey messages while its own thread pumps them.
    pub async fn spawn(
        hotkey_str: &str,
        active_tx: Arc<watch::Sender<bool>>,
        shutdown: StopSignal,
    ) -> Result<Self> {
        let hotkey = parse_hotkey(hotkey_str)?;
        let id = hotkey.id();
        let label = hotkey_str.to_string();
        let (ready_tx, ready_rx) = oneshot::channel();

        let listener = tokio::task::spawn_blocking(move || {
            let manager = match register(hotkey, &label) {
                Ok(manager) => {
                    let _ = ready_tx.send(Ok(()));
                    manager
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            listen(id, &active_tx, &shutdown);
            // Dropping the manager unregisters the hotkey.
            drop(manager);
        });

        match ready_rx.await {
            Ok(Ok(())) => {
                info!(hotkey = hotkey_str, "activation hotkey registered");
                Ok(Self { listener })
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(SpamError::hotkey("hotkey listener exited before registering")),
        }
    }

    /// Wait for the listener to exit. Request shutdown first.
    pub async fn join(self) {
        if let Err(e) = self.listener.await {
            warn!(error = %e, "hotkey listener panicked");
        }
    }
}

fn register(hotkey: HotKey, label: &str) -> Result<GlobalHotKeyManager> {
    let manager = GlobalHotKeyManager::new()
        .map_err(|e| SpamError::hotkey(format!("failed to create hotkey manager: {e}")))?;
    manager
        .register(hotkey)
        .map_err(|e| SpamError::hotkey(format!("failed to register '{label}': {e}")))?;
    Ok(manager)
}

fn listen(id: u32, active_tx: &watch::Sender<bool>, shutdown: &StopSignal) {
    let receiver = GlobalHotKeyEvent::receiver();
    while !shutdown.is_requested() {
        platform::pump_messages();
        while let Ok(event) = receiver.try_recv() {
            if event.id == id && event.state == HotKeyState::Pressed {
                toggle(active_tx);
            }
        }
        std::thread::sleep(POLL_INTERVAL);
    }
    debug!("hotkey listener exiting");
}

/// Flip the Active switch, returning the new value.
pub fn toggle(active_tx: &watch::Sender<bool>) -> bool {
    let mut now_active = false;
    active_tx.send_modify(|active| {
        *active = !*active;
        now_active = *active;
    });
    if now_active {
        info!("activation hotkey: active");
    } else {
        info!("activation hotkey: paused");
    }
    now_active
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hotkey() {
        assert!(parse_hotkey("ctrl+alt+s").is_ok());
        assert!(parse_hotkey("shift+F9").is_ok());
        assert!(parse_hotkey("").is_err());
        assert!(parse_hotkey("ctrl+alt+nope").is_err());
    }

    #[tokio::test]
    async fn test_spawn_rejects_bad_hotkey_before_registering() {
        let (tx, _rx) = watch::channel(false);
        let result = ActivationHotkey::spawn("ctrl+alt+nope", Arc::new(tx), StopSignal::new()).await;
        assert!(matches!(result, Err(SpamError::Hotkey(_))));
    }

    #[test]
    fn test_listener_exits_on_shutdown_without_toggling() {
        let (tx, rx) = watch::channel(false);
        let shutdown = StopSignal::new();
        shutdown.request();
        listen(0, &tx, &shutdown);
        assert!(!*rx.borrow());
    }

    #[test]
    fn test_toggle_flips_watch_value() {
        let (tx, rx) = watch::channel(true);
        assert!(!toggle(&tx));
        assert!(!*rx.borrow());
        assert!(toggle(&tx));
        assert!(*rx.borrow());
    }
}
