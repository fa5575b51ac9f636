//! Shortcut combo definitions
//!
//! A `ShortcutCombo` is one physical hotkey: a virtual key code plus a
//! mask of Shift, Control, Option and Command. Two combos are the same
//! shortcut iff both parts are equal; Caps Lock never counts.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Modifier key flag masks, bit-compatible with macOS `CGEventFlags`
pub mod flags {
    /// Shift key
    pub const SHIFT: u64 = 0x0002_0000;
    /// Control key
    pub const CONTROL: u64 = 0x0004_0000;
    /// Option/Alt key
    pub const OPTION: u64 = 0x0008_0000;
    /// Command key
    pub const COMMAND: u64 = 0x0010_0000;

    /// Bits that take part in combo identity; Caps Lock and device bits do not
    pub const COMBO_MODIFIERS: u64 = SHIFT | CONTROL | OPTION | COMMAND;
}

/// A set of modifier keys
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Modifiers(u64);

impl Modifiers {
    pub const SHIFT: Modifiers = Modifiers(flags::SHIFT);
    pub const CONTROL: Modifiers = Modifiers(flags::CONTROL);
    pub const OPTION: Modifiers = Modifiers(flags::OPTION);
    pub const COMMAND: Modifiers = Modifiers(flags::COMMAND);

    /// Build a mask from raw event flags, keeping only the combo modifiers
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits & flags::COMBO_MODIFIERS)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub const fn union(self, other: Modifiers) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn contains(self, other: Modifiers) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for Modifiers {
    type Output = Modifiers;

    fn bitor(self, rhs: Modifiers) -> Modifiers {
        self.union(rhs)
    }
}

#[cfg(target_os = "macos")]
impl From<core_graphics::event::CGEventFlags> for Modifiers {
    fn from(flags: core_graphics::event::CGEventFlags) -> Self {
        Self::from_bits(flags.bits())
    }
}

/// One physical hotkey
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShortcutCombo {
    /// Virtual key code (kVK_* on macOS)
    #[serde(rename = "keyCode")]
    pub key_code: u16,
    /// Modifier mask
    #[serde(rename = "modifierFlags")]
    pub modifiers: Modifiers,
}

impl ShortcutCombo {
    pub const fn new(key_code: u16, modifiers: Modifiers) -> Self {
        Self {
            key_code,
            modifiers: Modifiers::from_bits(modifiers.bits()),
        }
    }
}

impl fmt::Display for ShortcutCombo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Same glyph order as the macOS menu bar
        if self.modifiers.contains(Modifiers::CONTROL) {
            write!(f, "⌃")?;
        }
        if self.modifiers.contains(Modifiers::OPTION) {
            write!(f, "⌥")?;
        }
        if self.modifiers.contains(Modifiers::SHIFT) {
            write!(f, "⇧")?;
        }
        if self.modifiers.contains(Modifiers::COMMAND) {
            write!(f, "⌘")?;
        }
        match key_name(self.key_code) {
            Some(name) => write!(f, "{}", name),
            None => write!(f, "<{}>", self.key_code),
        }
    }
}

/// Display name for the ANSI letter keys, which covers what shortcuts use most
fn key_name(key_code: u16) -> Option<&'static str> {
    const LETTERS: [(u16, &str); 26] = [
        (0x00, "A"), (0x0B, "B"), (0x08, "C"), (0x02, "D"), (0x0E, "E"),
        (0x03, "F"), (0x05, "G"), (0x04, "H"), (0x22, "I"), (0x26, "J"),
        (0x28, "K"), (0x25, "L"), (0x2E, "M"), (0x2D, "N"), (0x1F, "O"),
        (0x23, "P"), (0x0C, "Q"), (0x0F, "R"), (0x01, "S"), (0x11, "T"),
        (0x20, "U"), (0x09, "V"), (0x0D, "W"), (0x07, "X"), (0x10, "Y"),
        (0x06, "Z"),
    ];
    LETTERS
        .iter()
        .find(|(code, _)| *code == key_code)
        .map(|(_, name)| *name)
}

/// Virtual key codes used by tests
#[cfg(test)]
pub mod codes {
    pub const KEY_A: u16 = 0x00;
    pub const KEY_B: u16 = 0x0B;
    pub const KEY_C: u16 = 0x08;
    pub const KEY_D: u16 = 0x02;
    pub const KEY_E: u16 = 0x0E;
    pub const KEY_F: u16 = 0x03;
    pub const KEY_G: u16 = 0x05;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_equality() {
        let cmd_shift = Modifiers::COMMAND | Modifiers::SHIFT;
        let a = ShortcutCombo::new(codes::KEY_A, cmd_shift);
        let b = ShortcutCombo::new(codes::KEY_A, Modifiers::SHIFT | Modifiers::COMMAND);
        assert_eq!(a, b);
        assert_ne!(a, ShortcutCombo::new(codes::KEY_A, Modifiers::COMMAND));
        assert_ne!(a, ShortcutCombo::new(codes::KEY_B, cmd_shift));
    }

    #[test]
    fn test_device_dependent_bits_ignored() {
        // 0x100 is a device-dependent left-modifier bit
        let raw = flags::COMMAND | 0x100;
        assert_eq!(Modifiers::from_bits(raw), Modifiers::COMMAND);
    }

    #[test]
    fn test_caps_lock_ignored() {
        const CAPS_LOCK: u64 = 0x0001_0000;
        let pressed = ShortcutCombo::new(
            codes::KEY_A,
            Modifiers::from_bits(flags::COMMAND | flags::SHIFT | CAPS_LOCK),
        );
        let configured = ShortcutCombo::new(codes::KEY_A, Modifiers::COMMAND | Modifiers::SHIFT);
        assert_eq!(pressed, configured);
        assert_eq!(pressed.to_string(), "⇧⌘A");
    }

    #[test]
    fn test_display() {
        let combo = ShortcutCombo::new(codes::KEY_A, Modifiers::COMMAND | Modifiers::SHIFT);
        assert_eq!(combo.to_string(), "⇧⌘A");
        let unnamed = ShortcutCombo::new(0x7A, Modifiers::default());
        assert_eq!(unnamed.to_string(), "<122>");
    }

    #[test]
    fn test_serialization_field_names() {
        let combo = ShortcutCombo::new(codes::KEY_D, Modifiers::COMMAND);
        let json = serde_json::to_string(&combo).unwrap();
        assert!(json.contains("keyCode"));
        assert!(json.contains("modifierFlags"));
        let back: ShortcutCombo = serde_json::from_str(&json).unwrap();
        assert_eq!(back, combo);
    }
}
