//! Hotkey module for global keyboard shortcuts
//!
//! Combo value types, the registry adapters the engine binds through, and
//! the macOS CGEventTap listener that reports bound combos.

mod keys;
#[cfg(target_os = "macos")]
mod listener;
mod registry;

#[cfg(test)]
pub use keys::codes;
pub use keys::{Modifiers, ShortcutCombo};
#[cfg(target_os = "macos")]
pub use listener::{HotkeyError, HotkeyListener};
pub use registry::HotkeyRegistry;
#[cfg(target_os = "macos")]
pub use registry::EventTapRegistry;
#[cfg(any(test, not(target_os = "macos")))]
pub use registry::MemoryRegistry;

/// Events sent from the hotkey listener to the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HotkeyEvent {
    /// A bound combo was pressed
    ComboPressed(ShortcutCombo),
    /// Event tap was disabled by macOS (needs re-enabling)
    #[cfg(target_os = "macos")]
    TapDisabled,
}
