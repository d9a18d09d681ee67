//! Fakes for driving the engine in tests.
//!
//! Public so integration tests can use them; nothing here touches the OS.
//! Time is virtual: every sleep advances a shared [`ManualClock`].

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::clock::{Clock, ManualClock};
use crate::config::SettingsSnapshot;
use crate::engine::{StopSignal, Task, TriggerListener, TriggerSpamEngine};
use crate::keymap::{KeyCode, KeyCodeResolver, UsLayout};
use crate::platform::{FocusProbe, KeyIo, Platform};

/// Process name used by [`snapshot`].
pub const TARGET_PROCESS: &str = "game.exe";

/// Trigger token used by [`snapshot`].
pub const TRIGGER_KEY: &str = "F1";

/// A snapshot targeting [`TARGET_PROCESS`] with trigger [`TRIGGER_KEY`] and
/// a 100 ms delay.
pub fn snapshot(spam_keys: &[&str]) -> SettingsSnapshot {
    SettingsSnapshot {
        process_name: TARGET_PROCESS.to_string(),
        trigger_key: TRIGGER_KEY.to_string(),
        spam_keys: spam_keys.iter().map(|k| k.to_string()).collect(),
        delay_ms: "100".to_string(),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
struct FakeState {
    focused_process: Option<String>,
    keys_down: HashSet<KeyCode>,
    injected: Vec<(Duration, KeyCode)>,
    fail_injection: bool,
    stop_on_inject: Option<StopSignal>,
    focus_operable: bool,
    keys_operable: bool,
    focus_queries: usize,
}

/// Scripted platform state shared with the fake collaborators.
#[derive(Debug, Clone)]
pub struct FakePlatform {
    state: Arc<Mutex<FakeState>>,
    clock: ManualClock,
}

impl FakePlatform {
    /// Build fake collaborators that record against `clock`.
    pub fn new(clock: ManualClock) -> (Self, Platform) {
        let fake = Self {
            state: Arc::new(Mutex::new(FakeState {
                focused_process: None,
                keys_down: HashSet::new(),
                injected: Vec::new(),
                fail_injection: false,
                stop_on_inject: None,
                focus_operable: true,
                keys_operable: true,
                focus_queries: 0,
            })),
            clock,
        };
        let platform = Platform::new(
            Box::new(UsLayout),
            Box::new(FakeFocus(fake.clone())),
            Box::new(FakeKeys(fake.clone())),
        );
        (fake, platform)
    }

    /// Put [`TARGET_PROCESS`] in the foreground, or nothing.
    pub fn set_focused(&self, focused: bool) {
        self.set_foreground(focused.then_some(TARGET_PROCESS));
    }

    pub fn set_foreground(&self, process: Option<&str>) {
        lock(&self.state).focused_process = process.map(str::to_string);
    }

    pub fn press(&self, code: KeyCode) {
        lock(&self.state).keys_down.insert(code);
    }

    pub fn release(&self, code: KeyCode) {
        lock(&self.state).keys_down.remove(&code);
    }

    pub fn fail_injection(&self, fail: bool) {
        lock(&self.state).fail_injection = fail;
    }

    /// Request `signal` right after the next successful injection, as if
    /// another thread asked for a stop mid-pass.
    pub fn stop_on_inject(&self, signal: StopSignal) {
        lock(&self.state).stop_on_inject = Some(signal);
    }

    pub fn set_focus_operable(&self, operable: bool) {
        lock(&self.state).focus_operable = operable;
    }

    pub fn set_keys_operable(&self, operable: bool) {
        lock(&self.state).keys_operable = operable;
    }

    /// Successful injections as (virtual time, code).
    pub fn injected(&self) -> Vec<(Duration, KeyCode)> {
        lock(&self.state).injected.clone()
    }

    pub fn injected_codes(&self) -> Vec<KeyCode> {
        self.injected().into_iter().map(|(_, code)| code).collect()
    }

    pub fn focus_queries(&self) -> usize {
        lock(&self.state).focus_queries
    }
}

struct FakeFocus(FakePlatform);

impl FocusProbe for FakeFocus {
    fn is_target_focused(&mut self, process_name: &str) -> bool {
        let mut state = lock(&self.0.state);
        state.focus_queries += 1;
        state
            .focused_process
            .as_deref()
            .is_some_and(|name| name.eq_ignore_ascii_case(process_name))
    }

    fn is_operable(&self) -> bool {
        lock(&self.0.state).focus_operable
    }
}

struct FakeKeys(FakePlatform);

impl KeyIo for FakeKeys {
    fn is_down(&self, code: KeyCode) -> bool {
        lock(&self.0.state).keys_down.contains(&code)
    }

    fn inject(&self, code: KeyCode) -> bool {
        let mut state = lock(&self.0.state);
        if state.fail_injection {
            return false;
        }
        let at = self.0.clock.elapsed();
        state.injected.push((at, code));
        if let Some(signal) = state.stop_on_inject.take() {
            signal.request();
        }
        true
    }

    fn is_operable(&self) -> bool {
        lock(&self.0.state).keys_operable
    }
}

/// A presentation callback as recorded by [`SignalLog`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Met,
    NotMet,
}

/// Records every presentation callback in order.
#[derive(Debug, Clone, Default)]
pub struct SignalLog(Arc<Mutex<Vec<Signal>>>);

impl SignalLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn listener(&self) -> Box<dyn TriggerListener> {
        Box::new(self.clone())
    }

    pub fn all(&self) -> Vec<Signal> {
        lock(&self.0).clone()
    }

    pub fn last(&self) -> Option<Signal> {
        lock(&self.0).last().copied()
    }

    pub fn clear(&self) {
        lock(&self.0).clear();
    }
}

impl TriggerListener for SignalLog {
    fn on_trigger_met(&mut self) {
        lock(&self.0).push(Signal::Met);
    }

    fn on_trigger_not_met(&mut self) {
        lock(&self.0).push(Signal::NotMet);
    }
}

/// An engine wired to fakes and a virtual clock.
pub struct TestRig {
    pub engine: TriggerSpamEngine,
    pub platform: FakePlatform,
    pub signals: SignalLog,
    pub clock: ManualClock,
    pub snapshot: SettingsSnapshot,
}

impl TestRig {
    pub fn new(snapshot: SettingsSnapshot) -> Self {
        let clock = ManualClock::new();
        let (platform, collaborators) = FakePlatform::new(clock.clone());
        let signals = SignalLog::new();
        let engine = TriggerSpamEngine::new(
            collaborators,
            signals.listener(),
            Arc::new(clock.clone()) as Arc<dyn Clock>,
        )
        .with_rng(StdRng::seed_from_u64(0x5EED));
        Self {
            engine,
            platform,
            signals,
            clock,
            snapshot,
        }
    }

    pub fn start(&mut self) -> bool {
        self.engine.start(self.snapshot.clone())
    }

    /// Key code of the rig's trigger token.
    pub fn trigger(&self) -> KeyCode {
        KeyCodeResolver::default()
            .resolve(&self.snapshot.trigger_key)
            .unwrap_or(KeyCode(0))
    }

    /// Run scheduled callbacks until `count` condition checks have run.
    pub fn run_ticks(&mut self, count: usize) {
        let mut ticks = 0;
        while ticks < count {
            match self.engine.run_next() {
                Some(Task::ConditionCheck) => ticks += 1,
                Some(Task::SpamStep) => {}
                None => break,
            }
        }
    }

    /// Run every callback that comes due within `duration` of now.
    pub fn run_for(&mut self, duration: Duration) {
        let deadline = self.clock.now() + duration;
        while let Some(due) = self.engine.next_due() {
            if due > deadline {
                break;
            }
            self.engine.run_next();
        }
        self.clock.sleep_until(deadline);
    }
}
