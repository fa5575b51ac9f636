//! Global hotkey registry adapters
//!
//! A registry only tracks which combos are currently bound. Dispatch of a
//! fired combo back to the engine goes through `HotkeyEvent::ComboPressed`,
//! so no per-binding closure is ever stored here.

use std::collections::HashSet;
#[cfg(target_os = "macos")]
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::warn;

use super::keys::ShortcutCombo;

/// Binding table for system-wide hotkeys
///
/// The registry itself allows binding a combo twice; callers must check
/// `is_registered` first.
pub trait HotkeyRegistry {
    /// Bind a combo
    fn register(&mut self, combo: ShortcutCombo);
    /// Unbind a combo; unbinding an unbound combo is a no-op
    fn unregister(&mut self, combo: ShortcutCombo);
    /// Whether a combo is currently bound
    fn is_registered(&self, combo: ShortcutCombo) -> bool;
}

/// In-process registry with no system hook behind it
///
/// Used on platforms without an event tap and as the test double. It
/// counts duplicate bindings so tests can assert they never happen.
#[cfg(any(test, not(target_os = "macos")))]
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    bound: HashSet<ShortcutCombo>,
    duplicate_registrations: usize,
}

#[cfg(any(test, not(target_os = "macos")))]
impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
impl MemoryRegistry {
    /// Number of times a combo was registered while already bound
    pub fn duplicate_registrations(&self) -> usize {
        self.duplicate_registrations
    }

    /// Number of combos currently bound
    pub fn len(&self) -> usize {
        self.bound.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bound.is_empty()
    }
}

#[cfg(any(test, not(target_os = "macos")))]
impl HotkeyRegistry for MemoryRegistry {
    fn register(&mut self, combo: ShortcutCombo) {
        if !self.bound.insert(combo) {
            self.duplicate_registrations += 1;
            warn!(%combo, duplicates = self.duplicate_registrations, "combo registered twice");
        }
    }

    fn unregister(&mut self, combo: ShortcutCombo) {
        self.bound.remove(&combo);
    }

    fn is_registered(&self, combo: ShortcutCombo) -> bool {
        self.bound.contains(&combo)
    }
}

/// Registry shared with the event tap thread
///
/// The listener reads the bound set on every key-down to decide whether to
/// swallow the event; the engine is the only writer.
#[cfg(target_os = "macos")]
#[derive(Debug, Clone, Default)]
pub struct EventTapRegistry {
    bound: Arc<Mutex<HashSet<ShortcutCombo>>>,
}

#[cfg(target_os = "macos")]
impl EventTapRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for the listener thread
    pub fn bound_set(&self) -> Arc<Mutex<HashSet<ShortcutCombo>>> {
        Arc::clone(&self.bound)
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<ShortcutCombo>> {
        // A panic on the tap thread must not take hotkeys down with it
        self.bound.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(target_os = "macos")]
impl HotkeyRegistry for EventTapRegistry {
    fn register(&mut self, combo: ShortcutCombo) {
        if !self.lock().insert(combo) {
            warn!(%combo, "combo registered twice");
        }
    }

    fn unregister(&mut self, combo: ShortcutCombo) {
        self.lock().remove(&combo);
    }

    fn is_registered(&self, combo: ShortcutCombo) -> bool {
        self.lock().contains(&combo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotkey::keys::{codes, Modifiers};

    fn combo(key: u16) -> ShortcutCombo {
        ShortcutCombo::new(key, Modifiers::COMMAND)
    }

    #[test]
    fn test_memory_registry_tracks_duplicates() {
        let mut registry = MemoryRegistry::new();
        registry.register(combo(codes::KEY_A));
        registry.register(combo(codes::KEY_A));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.duplicate_registrations(), 1);
    }

    #[test]
    fn test_unregister_unbound_is_noop() {
        let mut registry = MemoryRegistry::new();
        registry.unregister(combo(codes::KEY_B));
        assert!(registry.is_empty());
    }

    #[cfg(target_os = "macos")]
    #[test]
    fn test_event_tap_registry_shares_state() {
        let mut registry = EventTapRegistry::new();
        let shared = registry.bound_set();
        registry.register(combo(codes::KEY_C));
        assert!(shared.lock().unwrap().contains(&combo(codes::KEY_C)));
        registry.unregister(combo(codes::KEY_C));
        assert!(!registry.is_registered(combo(codes::KEY_C)));
    }
}
