//! Foreground process detection.
//!
//! Resolves the process that owns the foreground window to a name using
//! `sysinfo`, then compares it to the configured target.

use sysinfo::{Pid, ProcessesToUpdate, System};

use crate::platform::{FocusProbe, ForegroundSource};

/// Checks whether a named process currently has input focus.
///
/// # Example
///
/// ```no_run
/// use hold_spam::platform::FocusProbe;
///
/// let mut platform = hold_spam::platform::native();
/// if platform.focus.is_target_focused("notepad.exe") {
///     println!("Notepad has focus");
/// }
/// ```
pub struct ProcessFocusProbe<S> {
    source: S,
    system: System,
}

impl<S: ForegroundSource> ProcessFocusProbe<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            system: System::new(),
        }
    }

    /// Name of the process that owns the foreground window, if any.
    pub fn foreground_process_name(&mut self) -> Option<String> {
        let pid = Pid::from_u32(self.source.foreground_pid()?);
        // Only the foreground pid needs refreshing; it may have exited since.
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        self.system
            .process(pid)
            .map(|process| process.name().to_string_lossy().into_owned())
    }
}

impl<S: ForegroundSource> FocusProbe for ProcessFocusProbe<S> {
    fn is_target_focused(&mut self, process_name: &str) -> bool {
        if process_name.is_empty() {
            return false;
        }
        match self.foreground_process_name() {
            Some(name) => name.to_lowercase() == process_name.to_lowercase(),
            None => false,
        }
    }

    fn is_operable(&self) -> bool {
        self.source.is_operable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedPid(Option<u32>);

    impl ForegroundSource for FixedPid {
        fn foreground_pid(&self) -> Option<u32> {
            self.0
        }

        fn is_operable(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_own_process_is_found_case_insensitively() {
        let mut probe = ProcessFocusProbe::new(FixedPid(Some(std::process::id())));
        let name = probe.foreground_process_name().expect("own process");
        assert!(probe.is_target_focused(&name.to_uppercase()));
        assert!(!probe.is_target_focused("nonexistent_process_xyz_123456"));
    }

    #[test]
    fn test_no_foreground_window_is_not_focused() {
        let mut probe = ProcessFocusProbe::new(FixedPid(None));
        assert!(probe.foreground_process_name().is_none());
        assert!(!probe.is_target_focused("anything.exe"));
    }

    #[test]
    fn test_empty_target_never_matches() {
        let mut probe = ProcessFocusProbe::new(FixedPid(Some(std::process::id())));
        assert!(!probe.is_target_focused(""));
    }

    #[test]
    fn test_exited_process_is_not_focused() {
        // Pids this large are not handed out on any supported OS.
        let mut probe = ProcessFocusProbe::new(FixedPid(Some(u32::MAX - 1)));
        assert!(!probe.is_target_focused("ghost.exe"));
    }
}
