//! Events module for engine transitions
//!
//! Structured events the sequence engine broadcasts to IPC subscribers
//! on every advance, reset, activation and suspension change.

use serde::{Deserialize, Serialize};

use crate::engine::EntryId;

/// Why the automaton returned to position 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetReason {
    /// No combo arrived within the sequence delay
    IdleTimeout,
    /// The last combo of a sequence fired
    Completed,
    /// Entries were added, removed or edited
    Mutation,
    /// Shortcut recording finished
    Resumed,
    /// Internal bookkeeping went wrong and was recovered from
    Invariant,
}

/// Events emitted by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A non-final combo matched
    SequenceAdvanced {
        /// Number of combos matched so far
        position: usize,
    },

    /// The automaton went back to its initial state
    SequenceReset { reason: ResetReason },

    /// An application was activated
    Activated { entry_id: EntryId, name: String },

    /// Activation failed; the automaton still reset
    ActivationFailed {
        entry_id: EntryId,
        name: String,
        error: String,
    },

    /// All bindings released for shortcut recording
    Suspended,

    /// Bindings restored after recording
    Resumed,

    /// The entry list changed
    EntriesChanged { count: usize },
}

impl std::fmt::Display for EngineEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineEvent::SequenceAdvanced { position } => {
                write!(f, "SEQUENCE_ADVANCED (position {})", position)
            }
            EngineEvent::SequenceReset { reason } => write!(f, "SEQUENCE_RESET ({:?})", reason),
            EngineEvent::Activated { name, .. } => write!(f, "ACTIVATED ({})", name),
            EngineEvent::ActivationFailed { name, error, .. } => {
                write!(f, "ACTIVATION_FAILED ({}: {})", name, error)
            }
            EngineEvent::Suspended => write!(f, "SUSPENDED"),
            EngineEvent::Resumed => write!(f, "RESUMED"),
            EngineEvent::EntriesChanged { count } => write!(f, "ENTRIES_CHANGED ({})", count),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = EngineEvent::SequenceReset {
            reason: ResetReason::IdleTimeout,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("sequence_reset"));
        assert!(json.contains("idle_timeout"));
    }

    #[test]
    fn test_event_deserialization() {
        let json = r#"{"type":"activated","entry_id":3,"name":"Chess"}"#;
        let event: EngineEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event,
            EngineEvent::Activated {
                entry_id: EntryId(3),
                name: "Chess".into()
            }
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(
            EngineEvent::SequenceAdvanced { position: 2 }.to_string(),
            "SEQUENCE_ADVANCED (position 2)"
        );
    }
}
