//! The trigger/spam state machine.
//!
//! A session moves between three states:
//!
//! - `Stopped`: nothing scheduled, no settings locked in.
//! - `Idle`: active, polling focus and the trigger key every
//!   [`CHECK_INTERVAL`].
//! - `Spamming`: active, and an injection pass is either running or
//!   scheduled `base delay` after the previous one.
//!
//! A physical press of the trigger key while the target process has focus
//! toggles between `Idle` and `Spamming`. Holding the key across many ticks
//! still produces exactly one toggle; the key has to be observed up before
//! the next press counts. Losing focus while spamming halts injection at
//! once (emergency stop) regardless of the trigger key.
//!
//! Both the condition check and the injection loop are tasks on the same
//! [`Scheduler`], so they never overlap. A pass sleeps between keys on the
//! calling thread; the next tick waits for it.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, trace, warn};

use crate::clock::Clock;
use crate::config::SettingsSnapshot;
use crate::keymap::{KeyCode, KeyCodeResolver};
use crate::platform::Platform;
use crate::scheduler::{Scheduler, TimerHandle};

/// Polling cadence for focus and trigger state, roughly one display frame.
pub const CHECK_INTERVAL: Duration = Duration::from_millis(16);

/// Used when the configured delay is not a valid number of milliseconds.
pub const DEFAULT_DELAY_MS: u64 = 100;

/// Maximum deviation, either way, applied to the delay between keys.
pub const JITTER_MS: i64 = 4;

/// Presentation callbacks. Invoked on every tick, so implementations must
/// return quickly.
pub trait TriggerListener: Send {
    fn on_trigger_met(&mut self);
    fn on_trigger_not_met(&mut self);
}

/// Adapts a pair of closures to [`TriggerListener`].
pub struct FnListener<M, N> {
    met: M,
    not_met: N,
}

impl<M, N> FnListener<M, N>
where
    M: FnMut() + Send,
    N: FnMut() + Send,
{
    pub fn new(met: M, not_met: N) -> Self {
        Self { met, not_met }
    }
}

impl<M, N> TriggerListener for FnListener<M, N>
where
    M: FnMut() + Send,
    N: FnMut() + Send,
{
    fn on_trigger_met(&mut self) {
        (self.met)()
    }

    fn on_trigger_not_met(&mut self) {
        (self.not_met)()
    }
}

/// Observable engine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Stopped,
    Idle,
    Spamming,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Stopped => "stopped",
            Self::Idle => "idle",
            Self::Spamming => "spamming",
        };
        f.write_str(s)
    }
}

/// Work the engine schedules for itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    ConditionCheck,
    SpamStep,
}

/// Cross-thread flag checked before every key of a pass, so a pass in
/// flight ends promptly once it is requested.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Re-arm after a request has been honoured.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug)]
struct PlannedKey {
    token: String,
    code: Option<KeyCode>,
}

/// Settings locked in for one session, with key codes resolved up front.
struct Session {
    snapshot: SettingsSnapshot,
    trigger: Option<KeyCode>,
    plan: Arc<[PlannedKey]>,
}

impl Session {
    fn lock_in(snapshot: SettingsSnapshot, resolver: &KeyCodeResolver) -> Self {
        let trigger = resolver.resolve(&snapshot.trigger_key);
        if trigger.is_none() {
            warn!(
                token = %snapshot.trigger_key,
                "trigger key has no key code; the trigger can never fire"
            );
        }

        let plan = snapshot
            .spam_keys
            .iter()
            .map(|token| {
                let code = resolver.resolve(token);
                if code.is_none() {
                    warn!(%token, "spam key has no key code, skipping it");
                }
                PlannedKey {
                    token: token.clone(),
                    code,
                }
            })
            .collect();

        Self {
            snapshot,
            trigger,
            plan,
        }
    }
}

/// Parse a delay in milliseconds, falling back to [`DEFAULT_DELAY_MS`].
pub fn parse_delay_ms(raw: &str) -> Duration {
    match raw.trim().parse::<u64>() {
        Ok(ms) => Duration::from_millis(ms),
        Err(_) => {
            warn!(
                value = raw,
                default_ms = DEFAULT_DELAY_MS,
                "invalid DelayMS, using default"
            );
            Duration::from_millis(DEFAULT_DELAY_MS)
        }
    }
}

/// Drives the toggle state machine and the injection loop.
pub struct TriggerSpamEngine {
    platform: Platform,
    listener: Box<dyn TriggerListener>,
    scheduler: Scheduler<Task>,
    rng: StdRng,
    stop_signal: StopSignal,
    shutdown: StopSignal,
    session: Option<Session>,
    active: bool,
    spamming: bool,
    key_held_down: bool,
    scheduled_condition_check: Option<TimerHandle>,
    scheduled_spam_step: Option<TimerHandle>,
    base_delay: Duration,
}

impl TriggerSpamEngine {
    pub fn new(
        platform: Platform,
        listener: Box<dyn TriggerListener>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            platform,
            listener,
            scheduler: Scheduler::new(clock),
            rng: StdRng::from_entropy(),
            stop_signal: StopSignal::new(),
            shutdown: StopSignal::new(),
            session: None,
            active: false,
            spamming: false,
            key_held_down: false,
            scheduled_condition_check: None,
            scheduled_spam_step: None,
            base_delay: Duration::from_millis(DEFAULT_DELAY_MS),
        }
    }

    /// Replace the jitter source, e.g. with a seeded one.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    /// Share an existing shutdown signal, e.g. one already handed to a
    /// Ctrl+C handler.
    pub fn with_shutdown_signal(mut self, signal: StopSignal) -> Self {
        self.shutdown = signal;
        self
    }

    /// Aborts the current spamming run from another thread. Re-armed by
    /// [`start`](Self::start).
    pub fn stop_signal(&self) -> StopSignal {
        self.stop_signal.clone()
    }

    /// Aborts injection for good: never re-armed, so no later session can
    /// spam once it is requested.
    pub fn shutdown_signal(&self) -> StopSignal {
        self.shutdown.clone()
    }

    /// True iff every collaborator is usable. Never changes state.
    pub fn is_operable(&self) -> bool {
        self.platform.is_operable()
    }

    pub fn state(&self) -> EngineState {
        match (self.active, self.spamming) {
            (false, _) => EngineState::Stopped,
            (true, false) => EngineState::Idle,
            (true, true) => EngineState::Spamming,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_spamming(&self) -> bool {
        self.spamming
    }

    pub fn key_held_down(&self) -> bool {
        self.key_held_down
    }

    /// Settings locked in for the running session.
    pub fn settings(&self) -> Option<&SettingsSnapshot> {
        self.session.as_ref().map(|s| &s.snapshot)
    }

    pub fn has_pending_condition_check(&self) -> bool {
        self.scheduled_condition_check
            .is_some_and(|h| self.scheduler.is_pending(h))
    }

    pub fn has_pending_spam_step(&self) -> bool {
        self.scheduled_spam_step
            .is_some_and(|h| self.scheduler.is_pending(h))
    }

    /// Number of callbacks waiting in the scheduler.
    pub fn pending_tasks(&self) -> usize {
        self.scheduler.len()
    }

    /// Lock in `snapshot` and begin polling. Returns `false` without
    /// touching any state if a collaborator is unusable.
    pub fn start(&mut self, snapshot: SettingsSnapshot) -> bool {
        if !self.is_operable() {
            warn!("cannot start: input or focus backend is not available");
            return false;
        }
        if self.active {
            debug!("restarting active session with new settings");
            self.stop();
        }

        self.cancel_pending();
        self.stop_signal.reset();
        self.session = Some(Session::lock_in(snapshot, &self.platform.resolver));
        self.spamming = false;
        self.key_held_down = false;
        self.active = true;

        if let Some(settings) = self.settings() {
            info!(
                process = %settings.process_name,
                trigger = %settings.trigger_key,
                keys = settings.spam_keys.len(),
                "engine started"
            );
        }

        // First check runs now rather than one cadence later.
        self.tick();
        true
    }

    /// Halt everything and forget the session. Calling it again is a no-op.
    pub fn stop(&mut self) {
        if !self.active {
            return;
        }

        if self.spamming {
            self.emergency_stop();
        } else {
            self.listener.on_trigger_not_met();
        }

        self.active = false;
        self.cancel_pending();
        self.key_held_down = false;
        self.session = None;
        info!("engine stopped");
    }

    /// When the next scheduled callback is due.
    pub fn next_due(&self) -> Option<Instant> {
        self.scheduler.next_due()
    }

    /// Run the earliest callback if it is due. Returns what ran.
    pub fn run_due(&mut self) -> Option<Task> {
        let (handle, task) = self.scheduler.pop_due()?;
        match task {
            Task::ConditionCheck => {
                if self.scheduled_condition_check == Some(handle) {
                    self.scheduled_condition_check = None;
                }
                self.tick();
            }
            Task::SpamStep => {
                if self.scheduled_spam_step == Some(handle) {
                    self.scheduled_spam_step = None;
                }
                self.spam_pass();
            }
        }
        Some(task)
    }

    /// Wait on the clock for the next callback and run it.
    pub fn run_next(&mut self) -> Option<Task> {
        let due = self.next_due()?;
        self.scheduler.clock().sleep_until(due);
        self.run_due()
    }

    fn cancel_pending(&mut self) {
        if let Some(handle) = self.scheduled_condition_check.take() {
            self.scheduler.cancel(handle);
        }
        if let Some(handle) = self.scheduled_spam_step.take() {
            self.scheduler.cancel(handle);
        }
    }

    fn tick(&mut self) {
        if !self.active {
            return;
        }
        let Some(session) = self.session.as_ref() else {
            return;
        };

        let key_down = session
            .trigger
            .is_some_and(|code| self.platform.keys.is_down(code));
        let focused = self
            .platform
            .focus
            .is_target_focused(&session.snapshot.process_name);
        trace!(focused, key_down, held = self.key_held_down, "tick");

        if focused && key_down && !self.key_held_down {
            self.key_held_down = true;
            if self.spamming {
                info!("trigger pressed, spamming off");
                self.emergency_stop();
            } else {
                self.begin_spamming();
            }
        } else {
            if !key_down && self.key_held_down {
                self.key_held_down = false;
            }

            if self.spamming && !focused {
                info!("target lost focus, emergency stop");
                self.emergency_stop();
            } else if self.spamming {
                self.listener.on_trigger_met();
            } else {
                self.listener.on_trigger_not_met();
            }
        }

        if self.active && self.scheduled_condition_check.is_none() {
            let handle = self.scheduler.schedule(CHECK_INTERVAL, Task::ConditionCheck);
            self.scheduled_condition_check = Some(handle);
        }
    }

    fn begin_spamming(&mut self) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        if session.plan.is_empty() {
            warn!("no spam keys configured, not spamming");
            self.listener.on_trigger_not_met();
            return;
        }

        self.base_delay = parse_delay_ms(&session.snapshot.delay_ms);
        self.spamming = true;
        info!(delay_ms = self.base_delay.as_millis() as u64, "trigger pressed, spamming on");
        self.listener.on_trigger_met();
        self.spam_pass();
    }

    /// Stop the injection loop now, bypassing the toggle edge.
    fn emergency_stop(&mut self) {
        if let Some(handle) = self.scheduled_spam_step.take() {
            self.scheduler.cancel(handle);
        }
        self.spamming = false;
        self.listener.on_trigger_not_met();
    }

    /// Re-check before each key: the pass ends as soon as spamming is off.
    fn still_spamming(&mut self) -> bool {
        let requested = self.stop_signal.is_requested() || self.shutdown.is_requested();
        if self.spamming && requested {
            debug!("stop requested mid-pass");
            self.emergency_stop();
        }
        self.spamming
    }

    fn jittered_delay(&mut self) -> Duration {
        let jitter = self.rng.gen_range(-JITTER_MS..=JITTER_MS);
        let ms = (self.base_delay.as_millis() as i64 + jitter).max(0);
        Duration::from_millis(ms as u64)
    }

    /// One full traversal of the spam sequence, then schedule the next.
    fn spam_pass(&mut self) {
        if !self.still_spamming() {
            return;
        }
        let Some(plan) = self.session.as_ref().map(|s| Arc::clone(&s.plan)) else {
            return;
        };
        let clock = Arc::clone(self.scheduler.clock());

        for (index, key) in plan.iter().enumerate() {
            let Some(code) = key.code else {
                trace!(token = %key.token, "skipping unresolvable key");
                continue;
            };
            if index > 0 {
                let delay = self.jittered_delay();
                clock.sleep(delay);
            }
            if !self.still_spamming() {
                return;
            }
            if self.platform.keys.inject(code) {
                trace!(token = %key.token, %code, "injected");
            } else {
                warn!(token = %key.token, %code, "key injection failed");
            }
        }

        if self.spamming {
            let handle = self.scheduler.schedule(self.base_delay, Task::SpamStep);
            self.scheduled_spam_step = Some(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{snapshot, Signal, TestRig};

    #[test]
    fn test_start_runs_first_tick_immediately() {
        let mut rig = TestRig::new(snapshot(&["A"]));
        assert!(rig.start());
        assert_eq!(rig.engine.state(), EngineState::Idle);
        assert_eq!(rig.signals.all(), vec![Signal::NotMet]);
        assert!(rig.engine.has_pending_condition_check());
        assert_eq!(rig.engine.pending_tasks(), 1);
    }

    #[test]
    fn test_start_refused_when_inoperable() {
        let mut rig = TestRig::new(snapshot(&["A"]));
        rig.platform.set_keys_operable(false);
        assert!(!rig.engine.is_operable());
        assert!(!rig.start());
        assert_eq!(rig.engine.state(), EngineState::Stopped);
        assert!(rig.engine.settings().is_none());
        assert!(rig.engine.next_due().is_none());
        assert!(rig.signals.all().is_empty());
    }

    #[test]
    fn test_press_toggles_on_and_second_press_toggles_off() {
        let mut rig = TestRig::new(snapshot(&["A"]));
        rig.platform.set_focused(true);
        rig.start();

        rig.platform.press(rig.trigger());
        rig.run_ticks(1);
        assert_eq!(rig.engine.state(), EngineState::Spamming);
        assert_eq!(rig.signals.last(), Some(Signal::Met));

        rig.platform.release(rig.trigger());
        rig.run_ticks(1);
        assert!(rig.engine.is_spamming());
        assert!(!rig.engine.key_held_down());

        rig.platform.press(rig.trigger());
        rig.run_ticks(1);
        assert_eq!(rig.engine.state(), EngineState::Idle);
        assert!(!rig.engine.has_pending_spam_step());
        assert_eq!(rig.signals.last(), Some(Signal::NotMet));
    }

    #[test]
    fn test_key_down_without_focus_does_not_toggle() {
        let mut rig = TestRig::new(snapshot(&["A"]));
        rig.start();
        rig.platform.press(rig.trigger());
        rig.run_ticks(5);
        assert_eq!(rig.engine.state(), EngineState::Idle);
        assert!(!rig.engine.key_held_down());
        assert!(rig.platform.injected().is_empty());
    }

    #[test]
    fn test_unresolvable_trigger_never_fires() {
        let mut snap = snapshot(&["A"]);
        snap.trigger_key = "not-a-key".to_string();
        let mut rig = TestRig::new(snap);
        rig.platform.set_focused(true);
        rig.start();
        rig.run_ticks(3);
        assert_eq!(rig.engine.state(), EngineState::Idle);
    }

    #[test]
    fn test_malformed_delay_uses_default() {
        let mut snap = snapshot(&["A"]);
        snap.delay_ms = "fast".to_string();
        let mut rig = TestRig::new(snap);
        rig.platform.set_focused(true);
        rig.start();
        rig.platform.press(rig.trigger());
        rig.run_ticks(1);
        rig.platform.release(rig.trigger());

        rig.run_for(Duration::from_millis(250));
        let times: Vec<_> = rig.platform.injected().iter().map(|(t, _)| *t).collect();
        assert!(times.len() >= 3);
        for pair in times.windows(2) {
            assert_eq!(pair[1] - pair[0], Duration::from_millis(DEFAULT_DELAY_MS));
        }
    }

    #[test]
    fn test_parse_delay_ms() {
        assert_eq!(parse_delay_ms("250"), Duration::from_millis(250));
        assert_eq!(parse_delay_ms(" 0 "), Duration::ZERO);
        assert_eq!(parse_delay_ms("-5"), Duration::from_millis(DEFAULT_DELAY_MS));
        assert_eq!(parse_delay_ms(""), Duration::from_millis(DEFAULT_DELAY_MS));
    }

    #[test]
    fn test_restart_replaces_snapshot() {
        let mut rig = TestRig::new(snapshot(&["A"]));
        rig.start();
        assert!(rig.engine.start(snapshot(&["B", "C"])));
        assert_eq!(rig.engine.settings().unwrap().spam_keys, vec!["B", "C"]);
        assert_eq!(rig.engine.pending_tasks(), 1);
    }

    #[test]
    fn test_fn_listener() {
        use std::sync::atomic::AtomicUsize;

        let met = Arc::new(AtomicUsize::new(0));
        let not_met = Arc::new(AtomicUsize::new(0));
        let (m, n) = (Arc::clone(&met), Arc::clone(&not_met));
        let mut listener = FnListener::new(
            move || {
                m.fetch_add(1, Ordering::SeqCst);
            },
            move || {
                n.fetch_add(1, Ordering::SeqCst);
            },
        );
        listener.on_trigger_met();
        listener.on_trigger_not_met();
        listener.on_trigger_not_met();
        assert_eq!(met.load(Ordering::SeqCst), 1);
        assert_eq!(not_met.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_engine_state_display() {
        assert_eq!(EngineState::Spamming.to_string(), "spamming");
        assert_eq!(EngineState::Stopped.to_string(), "stopped");
    }
}
