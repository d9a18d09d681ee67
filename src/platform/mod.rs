//! Platform collaborators for the engine.
//!
//! The engine only sees the narrow traits below. [`native`] picks the
//! backend for the current OS; tests use the fakes in
//! [`crate::test_support`].

use crate::focus::ProcessFocusProbe;
use crate::keymap::{CharMapper, KeyCode, KeyCodeResolver};

#[cfg(windows)]
mod windows;

#[cfg(not(windows))]
mod unsupported;

/// Reports whether a named process owns the foreground window.
pub trait FocusProbe: Send {
    /// Compare the foreground window's owning process to `process_name`,
    /// ignoring case. Lookup failures count as "not focused".
    fn is_target_focused(&mut self, process_name: &str) -> bool;

    fn is_operable(&self) -> bool;
}

/// Supplies the process id that owns the current foreground window.
pub trait ForegroundSource: Send {
    fn foreground_pid(&self) -> Option<u32>;

    fn is_operable(&self) -> bool;
}

/// Physical key state and synthetic key events.
pub trait KeyIo: Send {
    /// Whether the key is physically down right now.
    fn is_down(&self, code: KeyCode) -> bool;

    /// Emit a press immediately followed by a release. Failures are
    /// reported as `false`, never raised.
    fn inject(&self, code: KeyCode) -> bool;

    fn is_operable(&self) -> bool;
}

/// The full set of platform collaborators handed to an engine.
pub struct Platform {
    pub resolver: KeyCodeResolver,
    pub focus: Box<dyn FocusProbe>,
    pub keys: Box<dyn KeyIo>,
}

impl Platform {
    pub fn new(
        chars: Box<dyn CharMapper>,
        focus: Box<dyn FocusProbe>,
        keys: Box<dyn KeyIo>,
    ) -> Self {
        Self {
            resolver: KeyCodeResolver::new(chars),
            focus,
            keys,
        }
    }

    /// True iff every collaborator is usable on this platform.
    pub fn is_operable(&self) -> bool {
        self.resolver.is_operable() && self.focus.is_operable() && self.keys.is_operable()
    }
}

/// Collaborators for the OS this binary was built for.
#[cfg(windows)]
pub fn native() -> Platform {
    Platform::new(
        Box::new(windows::VkKeyScan),
        Box::new(ProcessFocusProbe::new(windows::Foreground)),
        Box::new(windows::SendInputKeys),
    )
}

/// Collaborators for the OS this binary was built for.
///
/// Only Windows has an input backend; elsewhere key resolution works on a
/// US layout but the engine reports itself inoperable.
#[cfg(not(windows))]
pub fn native() -> Platform {
    Platform::new(
        Box::new(crate::keymap::UsLayout),
        Box::new(ProcessFocusProbe::new(unsupported::NoForeground)),
        Box::new(unsupported::NoKeys),
    )
}

/// Deliver window messages queued for the calling thread. Hotkey events
/// registered on a thread only arrive while that thread pumps.
#[cfg(windows)]
pub fn pump_messages() {
    windows::pump_messages();
}

/// Deliver window messages queued for the calling thread. Other platforms
/// deliver hotkey events on their own thread.
#[cfg(not(windows))]
pub fn pump_messages() {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(not(windows))]
    fn test_native_is_inoperable_off_windows() {
        let platform = native();
        assert!(!platform.is_operable());
        assert!(platform.resolver.is_operable());
        assert_eq!(platform.resolver.resolve("F1"), Some(KeyCode(0x70)));
    }
}
