//! Configured activation entries

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::hotkey::ShortcutCombo;

/// Stable identity of an entry, independent of its position in the list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub u64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How the activator treats an application; never read by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BehaviorFlags {
    /// When the app is frontmost, pressing the sequence hides it
    pub hide_with_shortcut_when_active: bool,
    /// Move the app's windows to the screen under the mouse
    pub show_on_screen_with_mouse: bool,
    /// Hide the app automatically once it loses focus
    pub hide_when_deactivated: bool,
    /// Launch the app if it is not running
    pub launch_if_not_running: bool,
}

impl Default for BehaviorFlags {
    fn default() -> Self {
        Self {
            hide_with_shortcut_when_active: true,
            show_on_screen_with_mouse: false,
            hide_when_deactivated: false,
            launch_if_not_running: false,
        }
    }
}

/// Application an entry activates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppTarget {
    pub path: PathBuf,
}

impl AppTarget {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Bundle name without the `.app` extension
    pub fn name(&self) -> String {
        self.path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// One configured application and the combo sequence that activates it
///
/// An empty sequence means the entry is not configured yet and is never
/// registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceEntry {
    pub id: EntryId,
    pub target: AppTarget,
    pub sequence: Vec<ShortcutCombo>,
    pub flags: BehaviorFlags,
}

impl SequenceEntry {
    pub fn is_configured(&self) -> bool {
        !self.sequence.is_empty()
    }

    /// Combos joined for log output
    pub fn sequence_string(&self) -> String {
        self.sequence
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_name() {
        let target = AppTarget::new("/Applications/System Preferences.app");
        assert_eq!(target.name(), "System Preferences");
    }

    #[test]
    fn test_flags_default_when_missing() {
        let flags: BehaviorFlags = serde_json::from_str(r#"{"launchIfNotRunning":true}"#).unwrap();
        assert!(flags.launch_if_not_running);
        assert!(flags.hide_with_shortcut_when_active);
        assert!(!flags.hide_when_deactivated);
    }

    #[test]
    fn test_unconfigured_entry() {
        let entry = SequenceEntry {
            id: EntryId(1),
            target: AppTarget::new("/Applications/Chess.app"),
            sequence: Vec::new(),
            flags: BehaviorFlags::default(),
        };
        assert!(!entry.is_configured());
        assert_eq!(entry.sequence_string(), "");
    }
}
