//! Win32 backend: `VkKeyScanW`, `GetAsyncKeyState`, `SendInput` and the
//! foreground window's owning process id.

use std::mem;
use std::ptr;

use tracing::warn;
use winapi::shared::minwindef::DWORD;
use winapi::um::winuser::{
    DispatchMessageW, GetAsyncKeyState, GetForegroundWindow, GetWindowThreadProcessId,
    PeekMessageW, SendInput, TranslateMessage, VkKeyScanW, INPUT, INPUT_KEYBOARD, KEYBDINPUT,
    KEYEVENTF_KEYUP, MSG, PM_REMOVE,
};

use super::{ForegroundSource, KeyIo};
use crate::keymap::{CharMapper, KeyCode};

/// Layout-aware character primitive.
pub struct VkKeyScan;

impl CharMapper for VkKeyScan {
    fn char_to_code(&self, ch: char) -> Option<KeyCode> {
        let mut buf = [0u16; 2];
        let units = ch.encode_utf16(&mut buf);
        // Characters outside the BMP have no single-key mapping.
        if units.len() != 1 {
            return None;
        }
        let scan = unsafe { VkKeyScanW(units[0]) };
        if scan == -1 {
            return None;
        }
        // Low byte is the virtual key, high byte the shift state.
        Some(KeyCode((scan as u16 & 0xFF) as u32))
    }
}

pub struct Foreground;

impl ForegroundSource for Foreground {
    fn foreground_pid(&self) -> Option<u32> {
        unsafe {
            let hwnd = GetForegroundWindow();
            if hwnd.is_null() {
                return None;
            }
            let mut pid: DWORD = 0;
            if GetWindowThreadProcessId(hwnd, &mut pid) == 0 || pid == 0 {
                return None;
            }
            Some(pid)
        }
    }

    fn is_operable(&self) -> bool {
        true
    }
}

pub struct SendInputKeys;

impl SendInputKeys {
    fn keyboard_input(code: KeyCode, flags: DWORD) -> INPUT {
        unsafe {
            let mut input: INPUT = mem::zeroed();
            input.type_ = INPUT_KEYBOARD;
            *input.u.ki_mut() = KEYBDINPUT {
                wVk: code.as_u32() as u16,
                wScan: 0,
                dwFlags: flags,
                time: 0,
                dwExtraInfo: 0,
            };
            input
        }
    }
}

impl KeyIo for SendInputKeys {
    fn is_down(&self, code: KeyCode) -> bool {
        let state = unsafe { GetAsyncKeyState(code.as_u32() as i32) };
        (state as u16 & 0x8000) != 0
    }

    fn inject(&self, code: KeyCode) -> bool {
        if code.as_u32() > u16::MAX as u32 {
            warn!(%code, "key code out of range for SendInput");
            return false;
        }

        let mut inputs = [
            Self::keyboard_input(code, 0),
            Self::keyboard_input(code, KEYEVENTF_KEYUP),
        ];
        let sent = unsafe {
            SendInput(
                inputs.len() as u32,
                inputs.as_mut_ptr(),
                mem::size_of::<INPUT>() as i32,
            )
        };

        if sent as usize != inputs.len() {
            warn!(%code, sent, error = %std::io::Error::last_os_error(), "SendInput failed");
            return false;
        }
        true
    }

    fn is_operable(&self) -> bool {
        true
    }
}

/// Dispatch every message queued for the calling thread without blocking.
pub fn pump_messages() {
    unsafe {
        let mut msg: MSG = mem::zeroed();
        while PeekMessageW(&mut msg, ptr::null_mut(), 0, 0, PM_REMOVE) != 0 {
            TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }
    }
}
