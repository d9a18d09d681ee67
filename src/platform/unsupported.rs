//! Stand-ins for platforms without an input backend.

use tracing::debug;

use super::{ForegroundSource, KeyIo};
use crate::keymap::KeyCode;

pub struct NoForeground;

impl ForegroundSource for NoForeground {
    fn foreground_pid(&self) -> Option<u32> {
        None
    }

    fn is_operable(&self) -> bool {
        false
    }
}

pub struct NoKeys;

impl KeyIo for NoKeys {
    fn is_down(&self, _code: KeyCode) -> bool {
        false
    }

    fn inject(&self, code: KeyCode) -> bool {
        debug!(%code, "key injection not supported on this platform");
        false
    }

    fn is_operable(&self) -> bool {
        false
    }
}
