//! # Hold Spam
//!
//! Toggle-to-spam key automation gated on the focused process.
//!
//! While the configured process owns the foreground window, pressing the
//! trigger key starts injecting a sequence of keys at a jittered interval;
//! pressing it again stops. Losing focus stops injection immediately.
//!
//! ## Features
//!
//! - Target a specific process by name
//! - Ordered key sequences with per-key jitter
//! - One toggle per physical press, no matter how long the key is held
//! - Emergency stop on focus loss
//! - Named JSON profiles
//! - Global hotkey for the Active switch
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use hold_spam::clock::SystemClock;
//! use hold_spam::engine::FnListener;
//! use hold_spam::{SettingsStore, TriggerSpamEngine};
//!
//! let mut store = SettingsStore::open("configs").unwrap();
//! store.load("Default").unwrap();
//!
//! let listener = FnListener::new(|| println!("executing"), || println!("waiting"));
//! let mut engine = TriggerSpamEngine::new(
//!     hold_spam::platform::native(),
//!     Box::new(listener),
//!     Arc::new(SystemClock),
//! );
//!
//! if engine.start(store.snapshot()) {
//!     while let Some(_task) = engine.run_next() {}
//! }
//! ```

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod focus;
pub mod global_hotkey;
pub mod keymap;
pub mod platform;
pub mod runner;
pub mod scheduler;
pub mod test_support;

pub use config::{SettingsSnapshot, SettingsStore};
pub use engine::{EngineState, TriggerListener, TriggerSpamEngine};
pub use error::{Result, SpamError};
pub use global_hotkey::ActivationHotkey;
pub use keymap::{KeyCode, KeyCodeResolver};
pub use runner::Runner;
