//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::engine::{BehaviorFlags, EngineStatus, EntryId, SequenceEntry};
use crate::events::EngineEvent;
use crate::hotkey::ShortcutCombo;

/// Requests from the configuration UI to the daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Ping to check connectivity
    Ping,

    /// Request current daemon status
    GetStatus,

    /// List configured entries in order
    ListEntries,

    /// Fetch the entry at a list position
    GetEntry { index: usize },

    /// Order entries by application name
    SortEntries,

    /// Add an application; an empty sequence leaves it unconfigured
    AddEntry {
        path: PathBuf,
        #[serde(default)]
        sequence: Vec<ShortcutCombo>,
        #[serde(default)]
        flags: BehaviorFlags,
    },

    /// Remove the entry at a list position
    RemoveEntry { index: usize },

    /// Replace an entry's combo sequence
    ReplaceSequence {
        id: EntryId,
        sequence: Vec<ShortcutCombo>,
    },

    /// Replace an entry's behavior flags
    ReplaceFlags { id: EntryId, flags: BehaviorFlags },

    /// Check a candidate sequence without applying it
    CheckConflict {
        sequence: Vec<ShortcutCombo>,
        #[serde(default)]
        excluding: Option<EntryId>,
    },

    /// Release all hotkeys while the UI records a shortcut
    Suspend,

    /// Restore hotkeys after recording
    Resume,

    /// Turn activation on or off globally
    SetEnabled { enabled: bool },

    /// Subscribe to engine event notifications
    Subscribe,
}

/// Responses from daemon to UI
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Pong response to ping
    Pong,

    /// Current daemon status
    Status(DaemonStatus),

    /// Configured entries
    Entries { entries: Vec<SequenceEntry> },

    /// A single entry, `None` past the end of the list
    Entry { entry: Option<SequenceEntry> },

    /// Entry accepted
    EntryAdded { id: EntryId },

    /// Request applied
    Ok,

    /// Result of a conflict check
    Conflict { existing: Option<EntryId> },

    /// Subscription confirmed
    Subscribed,

    /// Pushed engine event (subscribed clients only)
    Event { event: EngineEvent },

    /// Error response
    Error { code: String, message: String },
}

impl Response {
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Response::Error {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Full daemon status snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    /// Combos of the in-progress sequence matched so far
    pub position: usize,

    /// Combo that moved the sequence to `position`
    pub last_matched: Option<ShortcutCombo>,

    /// Whether hotkeys are released for recording
    pub suspended: bool,

    /// Whether completed sequences activate anything
    pub enabled: bool,

    /// Number of configured entries
    pub entry_count: usize,

    /// Number of combos currently bound
    pub bound_count: usize,

    /// Uptime in seconds
    pub uptime_secs: u64,
}

impl DaemonStatus {
    pub fn new(engine: EngineStatus, uptime_secs: u64) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            position: engine.position,
            last_matched: engine.last_matched,
            suspended: engine.suspended,
            enabled: engine.enabled,
            entry_count: engine.entry_count,
            bound_count: engine.bound_count,
            uptime_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_deserialization() {
        let json = r#"{"type":"add_entry","path":"/Applications/Chess.app","sequence":[{"keyCode":2,"modifierFlags":1179648}]}"#;
        let req: Request = serde_json::from_str(json).unwrap();
        match req {
            Request::AddEntry {
                path,
                sequence,
                flags,
            } => {
                assert_eq!(path, PathBuf::from("/Applications/Chess.app"));
                assert_eq!(sequence.len(), 1);
                assert_eq!(sequence[0].key_code, 2);
                assert_eq!(flags, BehaviorFlags::default());
            }
            other => panic!("unexpected request: {:?}", other),
        }
    }

    #[test]
    fn test_entry_lookup_messages() {
        let req: Request = serde_json::from_str(r#"{"type":"get_entry","index":2}"#).unwrap();
        assert!(matches!(req, Request::GetEntry { index: 2 }));
        let req: Request = serde_json::from_str(r#"{"type":"sort_entries"}"#).unwrap();
        assert!(matches!(req, Request::SortEntries));

        let json = serde_json::to_string(&Response::Entry { entry: None }).unwrap();
        assert_eq!(json, r#"{"type":"entry","entry":null}"#);
    }

    #[test]
    fn test_check_conflict_excluding_optional() {
        let json = r#"{"type":"check_conflict","sequence":[]}"#;
        let req: Request = serde_json::from_str(json).unwrap();
        assert!(matches!(req, Request::CheckConflict { excluding: None, .. }));
    }

    #[test]
    fn test_response_serialization() {
        let status = EngineStatus {
            position: 1,
            last_matched: Some(ShortcutCombo::new(2, crate::hotkey::Modifiers::COMMAND)),
            suspended: false,
            enabled: true,
            entry_count: 3,
            bound_count: 2,
        };
        let resp = Response::Status(DaemonStatus::new(status, 42));
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains(r#""type":"status""#));
        assert!(json.contains(r#""bound_count":2"#));
        assert!(json.contains(r#""last_matched":{"keyCode":2,"modifierFlags":1048576}"#));

        let json = serde_json::to_string(&Response::Conflict {
            existing: Some(EntryId(4)),
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"conflict","existing":4}"#);
    }
}
