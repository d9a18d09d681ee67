//! Key token resolution.
//!
//! Turns human-readable tokens such as `"A"`, `"F5"`, `"LSHIFT"` or a raw
//! `"160"` into platform virtual-key codes. Resolution order matters:
//!
//! 1. a single alphanumeric character goes through the layout's
//!    character primitive,
//! 2. a non-negative integer literal is taken verbatim as a raw code,
//! 3. a case-insensitive lookup in the named-key table,
//! 4. a single non-alphanumeric character falls back to the character
//!    primitive.
//!
//! Anything else is unresolvable. Callers skip such keys and carry on.

use std::fmt;

use crate::error::{Result, SpamError};

/// A platform virtual-key code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyCode(pub u32);

impl KeyCode {
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X}", self.0)
    }
}

/// The platform's character-to-keycode primitive.
pub trait CharMapper: Send {
    /// Map a character to a key code on the current layout, `None` if the
    /// layout has no key for it.
    fn char_to_code(&self, ch: char) -> Option<KeyCode>;

    /// Whether the primitive works on this platform.
    fn is_operable(&self) -> bool {
        true
    }
}

/// Named keys, matched against the upper-cased token.
const NAMED_KEYS: &[(&str, u32)] = &[
    ("F1", 0x70),
    ("F2", 0x71),
    ("F3", 0x72),
    ("F4", 0x73),
    ("F5", 0x74),
    ("F6", 0x75),
    ("F7", 0x76),
    ("F8", 0x77),
    ("F9", 0x78),
    ("F10", 0x79),
    ("F11", 0x7A),
    ("F12", 0x7B),
    ("ENTER", 0x0D),
    ("ESC", 0x1B),
    ("ESCAPE", 0x1B),
    ("SHIFT", 0x10),
    ("LSHIFT", 0xA0),
    ("RSHIFT", 0xA1),
    ("CTRL", 0x11),
    ("LCTRL", 0xA2),
    ("RCTRL", 0xA3),
    ("ALT", 0x12),
    ("LALT", 0xA4),
    ("RALT", 0xA5),
    ("SPACE", 0x20),
    ("SPACEBAR", 0x20),
    ("TAB", 0x09),
    ("CAPSLOCK", 0x14),
    ("LEFT", 0x25),
    ("UP", 0x26),
    ("RIGHT", 0x27),
    ("DOWN", 0x28),
    ("INSERT", 0x2D),
    ("DELETE", 0x2E),
    ("HOME", 0x24),
    ("END", 0x23),
    ("PAGEUP", 0x21),
    ("PAGEDOWN", 0x22),
    ("NUMLOCK", 0x90),
    ("SCROLLLOCK", 0x91),
    ("0", 0x30),
    ("1", 0x31),
    ("2", 0x32),
    ("3", 0x33),
    ("4", 0x34),
    ("5", 0x35),
    ("6", 0x36),
    ("7", 0x37),
    ("8", 0x38),
    ("9", 0x39),
];

/// Look up a token in the named-key table, ignoring case.
pub fn named_key(token: &str) -> Option<KeyCode> {
    let upper = token.to_uppercase();
    NAMED_KEYS
        .iter()
        .find(|(name, _)| *name == upper)
        .map(|&(_, code)| KeyCode(code))
}

/// Character primitive for a US keyboard layout.
///
/// Mirrors what `VkKeyScanW` reports on a US layout with the shift state
/// masked off. Used off Windows and in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct UsLayout;

impl CharMapper for UsLayout {
    fn char_to_code(&self, ch: char) -> Option<KeyCode> {
        let code = match ch {
            'a'..='z' => ch.to_ascii_uppercase() as u32,
            'A'..='Z' | '0'..='9' => ch as u32,
            ' ' => 0x20,
            '\t' => 0x09,
            ')' => 0x30,
            '!' => 0x31,
            '@' => 0x32,
            '#' => 0x33,
            '$' => 0x34,
            '%' => 0x35,
            '^' => 0x36,
            '&' => 0x37,
            '*' => 0x38,
            '(' => 0x39,
            ';' | ':' => 0xBA,
            '=' | '+' => 0xBB,
            ',' | '<' => 0xBC,
            '-' | '_' => 0xBD,
            '.' | '>' => 0xBE,
            '/' | '?' => 0xBF,
            '`' | '~' => 0xC0,
            '[' | '{' => 0xDB,
            '\\' | '|' => 0xDC,
            ']' | '}' => 0xDD,
            '\'' | '"' => 0xDE,
            _ => return None,
        };
        Some(KeyCode(code))
    }
}

/// Resolves key tokens to key codes using a platform character primitive.
pub struct KeyCodeResolver {
    mapper: Box<dyn CharMapper>,
}

impl fmt::Debug for KeyCodeResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyCodeResolver").finish_non_exhaustive()
    }
}

impl Default for KeyCodeResolver {
    fn default() -> Self {
        Self::new(Box::new(UsLayout))
    }
}

impl KeyCodeResolver {
    pub fn new(mapper: Box<dyn CharMapper>) -> Self {
        Self { mapper }
    }

    pub fn is_operable(&self) -> bool {
        self.mapper.is_operable()
    }

    /// Resolve a token, `None` when no mapping exists.
    pub fn resolve(&self, token: &str) -> Option<KeyCode> {
        let single = single_char(token);

        if let Some(ch) = single.filter(|c| c.is_alphanumeric()) {
            return self.mapper.char_to_code(ch);
        }

        if let Ok(raw) = token.parse::<u32>() {
            return Some(KeyCode(raw));
        }

        if let Some(code) = named_key(token) {
            return Some(code);
        }

        single.and_then(|ch| self.mapper.char_to_code(ch))
    }

    /// Like [`resolve`](Self::resolve) but reports failure as an error, for
    /// surfaces that want to tell the user.
    pub fn try_resolve(&self, token: &str) -> Result<KeyCode> {
        self.resolve(token)
            .ok_or_else(|| SpamError::invalid_key(token, "no key code mapping"))
    }
}

fn single_char(token: &str) -> Option<char> {
    let mut chars = token.chars();
    match (chars.next(), chars.next()) {
        (Some(ch), None) => Some(ch),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Layout with no character mappings at all.
    struct EmptyLayout;

    impl CharMapper for EmptyLayout {
        fn char_to_code(&self, _ch: char) -> Option<KeyCode> {
            None
        }
    }

    #[test]
    fn test_letters_and_digits_use_layout() {
        let resolver = KeyCodeResolver::default();
        assert_eq!(resolver.resolve("a"), Some(KeyCode(0x41)));
        assert_eq!(resolver.resolve("A"), Some(KeyCode(0x41)));
        assert_eq!(resolver.resolve("2"), Some(KeyCode(0x32)));
    }

    #[test]
    fn test_single_alphanumeric_does_not_fall_through() {
        // An alphanumeric the layout cannot map is NotFound, even though
        // the named-key table has an entry for it.
        let resolver = KeyCodeResolver::new(Box::new(EmptyLayout));
        assert_eq!(resolver.resolve("2"), None);
        assert_eq!(resolver.resolve("q"), None);
    }

    #[test]
    fn test_raw_numeric_codes() {
        let resolver = KeyCodeResolver::default();
        assert_eq!(resolver.resolve("100"), Some(KeyCode(100)));
        assert_eq!(resolver.resolve("160"), Some(KeyCode(0xA0)));
        // No range validation on raw codes.
        assert_eq!(resolver.resolve("70000"), Some(KeyCode(70000)));
        assert_eq!(resolver.resolve("-5"), None);
    }

    #[test]
    fn test_named_keys_case_insensitive() {
        let resolver = KeyCodeResolver::default();
        assert_eq!(resolver.resolve("F5"), Some(KeyCode(0x74)));
        assert_eq!(resolver.resolve("f12"), Some(KeyCode(0x7B)));
        assert_eq!(resolver.resolve("LShift"), Some(KeyCode(0xA0)));
        assert_eq!(resolver.resolve("enter"), Some(KeyCode(0x0D)));
        assert_eq!(resolver.resolve("Escape"), Some(KeyCode(0x1B)));
        assert_eq!(resolver.resolve("spacebar"), Some(KeyCode(0x20)));
        assert_eq!(resolver.resolve("ScrollLock"), Some(KeyCode(0x91)));
    }

    #[test]
    fn test_symbol_fallback() {
        let resolver = KeyCodeResolver::default();
        assert_eq!(resolver.resolve(";"), Some(KeyCode(0xBA)));
        assert_eq!(resolver.resolve("["), Some(KeyCode(0xDB)));
        assert_eq!(resolver.resolve("⌘"), None);
    }

    #[test]
    fn test_unresolvable_tokens() {
        let resolver = KeyCodeResolver::default();
        assert_eq!(resolver.resolve(""), None);
        assert_eq!(resolver.resolve("unknown"), None);
        assert_eq!(resolver.resolve("ctrl+s"), None);
        assert!(resolver.try_resolve("unknown").is_err());
    }

    #[test]
    fn test_key_code_display() {
        assert_eq!(KeyCode(0x41).to_string(), "0x41");
        assert_eq!(KeyCode(5).to_string(), "0x05");
    }
}
