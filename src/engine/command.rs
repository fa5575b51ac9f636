//! Commands other tasks send to the engine's owning loop
//!
//! The engine is never shared; IPC handlers send a command and await the
//! reply, so every mutation is applied on the engine task in arrival order.

use tokio::sync::oneshot;

use crate::hotkey::ShortcutCombo;

use super::entry::{AppTarget, BehaviorFlags, EntryId, SequenceEntry};
use super::error::EngineError;

/// Snapshot of the engine for status reporting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStatus {
    pub position: usize,
    pub last_matched: Option<ShortcutCombo>,
    pub suspended: bool,
    pub enabled: bool,
    pub entry_count: usize,
    pub bound_count: usize,
}

#[derive(Debug)]
pub enum EngineCommand {
    Status {
        reply: oneshot::Sender<EngineStatus>,
    },
    ListEntries {
        reply: oneshot::Sender<Vec<SequenceEntry>>,
    },
    GetEntry {
        index: usize,
        reply: oneshot::Sender<Option<SequenceEntry>>,
    },
    AddEntry {
        target: AppTarget,
        sequence: Vec<ShortcutCombo>,
        flags: BehaviorFlags,
        reply: oneshot::Sender<Result<EntryId, EngineError>>,
    },
    RemoveEntry {
        index: usize,
        reply: oneshot::Sender<Result<SequenceEntry, EngineError>>,
    },
    ReplaceSequence {
        id: EntryId,
        sequence: Vec<ShortcutCombo>,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    ReplaceFlags {
        id: EntryId,
        flags: BehaviorFlags,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    /// Order entries by application name; ids are kept
    SortByName {
        reply: oneshot::Sender<()>,
    },
    /// `sequence` must be non-empty
    CheckConflict {
        sequence: Vec<ShortcutCombo>,
        excluding: Option<EntryId>,
        reply: oneshot::Sender<Option<EntryId>>,
    },
    Suspend {
        reply: oneshot::Sender<()>,
    },
    Resume {
        reply: oneshot::Sender<()>,
    },
    SetEnabled {
        enabled: bool,
        reply: oneshot::Sender<()>,
    },
}
