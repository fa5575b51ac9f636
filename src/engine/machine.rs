//! Core sequence engine
//!
//! Multiplexes the global hotkey slots across every configured combo
//! sequence. At position 0 the first combo of every entry is bound. After
//! `n` combos have matched, only the next combo of the entries whose
//! prefix agrees with what was typed is bound, and an idle timer returns
//! the engine to position 0 if the user stops halfway.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::activation::ActivationRequest;
use crate::events::{EngineEvent, ResetReason};
use crate::hotkey::{HotkeyEvent, HotkeyRegistry, ShortcutCombo};

use super::command::{EngineCommand, EngineStatus};
use super::conflict;
use super::entry::{AppTarget, BehaviorFlags, EntryId, SequenceEntry};
use super::error::EngineError;
use super::timer::IdleTimer;

/// Default idle time between combos of a sequence
pub const DEFAULT_SEQUENCE_DELAY: Duration = Duration::from_millis(500);

/// Default maximum number of combos in one sequence
pub const DEFAULT_MAX_SEQUENCE_LENGTH: usize = 5;

/// Tunables for the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// How long an in-progress sequence waits for its next combo
    pub sequence_delay: Duration,
    /// Longest accepted sequence
    pub max_sequence_length: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sequence_delay: DEFAULT_SEQUENCE_DELAY,
            max_sequence_length: DEFAULT_MAX_SEQUENCE_LENGTH,
        }
    }
}

/// Owns the entries and the automaton over their sequences
///
/// Every method runs to completion on the task that owns the engine; no
/// two registration passes can interleave.
pub struct SequenceEngine<R> {
    config: EngineConfig,
    registry: R,
    /// Completed sequences go to the activation worker
    activations: mpsc::UnboundedSender<ActivationRequest>,
    entries: Vec<SequenceEntry>,
    next_id: u64,
    /// Number of combos matched so far; 0 is idle
    position: usize,
    /// Combo that moved the engine to `position`, `None` at 0
    last_matched: Option<ShortcutCombo>,
    /// Bound combo -> entries still consistent with the typed prefix
    dispatch: HashMap<ShortcutCombo, Vec<EntryId>>,
    timer: IdleTimer,
    /// Shortcut recording in progress: nothing bound, nothing fires
    suspended: bool,
    /// Application-wide switch; when off, completed sequences do nothing
    enabled: bool,
    event_tx: broadcast::Sender<EngineEvent>,
}

impl<R: HotkeyRegistry> SequenceEngine<R> {
    pub fn new(
        config: EngineConfig,
        registry: R,
        activations: mpsc::UnboundedSender<ActivationRequest>,
        event_tx: broadcast::Sender<EngineEvent>,
    ) -> Self {
        Self {
            config,
            registry,
            activations,
            entries: Vec::new(),
            next_id: 1,
            position: 0,
            last_matched: None,
            dispatch: HashMap::new(),
            timer: IdleTimer::new(),
            suspended: false,
            enabled: true,
            event_tx,
        }
    }

    pub fn entries(&self) -> &[SequenceEntry] {
        &self.entries
    }

    pub fn get_entry(&self, index: usize) -> Option<&SequenceEntry> {
        self.entries.get(index)
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn last_matched(&self) -> Option<ShortcutCombo> {
        self.last_matched
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled != enabled {
            info!(enabled, "activation switch changed");
        }
        self.enabled = enabled;
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            position: self.position(),
            last_matched: self.last_matched(),
            suspended: self.is_suspended(),
            enabled: self.is_enabled(),
            entry_count: self.entries().len(),
            bound_count: self.dispatch.len(),
        }
    }

    /// Id of the first entry whose sequence prefix-conflicts with `candidate`
    pub fn check_for_conflict(
        &self,
        candidate: &[ShortcutCombo],
        excluding: Option<EntryId>,
    ) -> Option<EntryId> {
        conflict::find_conflict(candidate, &self.entries, excluding)
    }

    /// Append an entry; an empty sequence adds it unconfigured
    pub fn add_entry(
        &mut self,
        target: AppTarget,
        sequence: Vec<ShortcutCombo>,
        flags: BehaviorFlags,
    ) -> Result<EntryId, EngineError> {
        self.validate_sequence(&sequence, None)?;

        let id = EntryId(self.next_id);
        self.next_id += 1;

        let entry = SequenceEntry {
            id,
            target,
            sequence,
            flags,
        };
        info!(
            %id,
            app = %entry.target.name(),
            sequence = %entry.sequence_string(),
            "entry added"
        );
        self.entries.push(entry);
        self.entries_changed();

        Ok(id)
    }

    pub fn remove_entry(&mut self, index: usize) -> Result<SequenceEntry, EngineError> {
        if index >= self.entries.len() {
            return Err(EngineError::IndexOutOfRange {
                index,
                len: self.entries.len(),
            });
        }

        // Bindings are keyed by combo and may be shared with other entries,
        // so release everything rather than just this entry's combos
        self.unregister_all();
        let entry = self.entries.remove(index);
        info!(id = %entry.id, app = %entry.target.name(), "entry removed");
        self.entries_changed();

        Ok(entry)
    }

    /// Swap an entry's sequence; rejected without change on conflict
    pub fn replace_sequence(
        &mut self,
        id: EntryId,
        sequence: Vec<ShortcutCombo>,
    ) -> Result<(), EngineError> {
        let index = self.index_of(id)?;
        self.validate_sequence(&sequence, Some(id))?;

        let entry = &mut self.entries[index];
        entry.sequence = sequence;
        info!(%id, sequence = %entry.sequence_string(), "entry sequence replaced");
        self.entries_changed();

        Ok(())
    }

    /// Flags are opaque to matching, so bindings stay as they are
    pub fn replace_flags(&mut self, id: EntryId, flags: BehaviorFlags) -> Result<(), EngineError> {
        let index = self.index_of(id)?;
        self.entries[index].flags = flags;
        debug!(%id, ?flags, "entry flags replaced");
        Ok(())
    }

    pub fn sort_entries_by<F>(&mut self, compare: F)
    where
        F: FnMut(&SequenceEntry, &SequenceEntry) -> Ordering,
    {
        self.entries.sort_by(compare);
        self.reset(ResetReason::Mutation);
    }

    /// Bind the next-step combos for `at_index` combos matched, the last
    /// of which was `last`
    ///
    /// Any entry whose combo at `at_index - 1` equals `last` is a
    /// candidate. Key events narrow this further through the dispatch
    /// table, see `on_combo_fired`.
    pub fn register_shortcuts(&mut self, at_index: usize, last: Option<ShortcutCombo>) {
        let candidates: Vec<EntryId> = self
            .entries
            .iter()
            .filter(|entry| {
                at_index == 0
                    || matches!(
                        (entry.sequence.get(at_index - 1), last.as_ref()),
                        (Some(prev), Some(last)) if prev == last
                    )
            })
            .map(|entry| entry.id)
            .collect();

        self.enter(at_index, last, &candidates);
    }

    /// Release every combo this engine has bound; safe to repeat
    pub fn unregister_all(&mut self) {
        for (combo, _) in self.dispatch.drain() {
            if self.registry.is_registered(combo) {
                self.registry.unregister(combo);
            }
        }
    }

    /// Dispatch a fired combo against the entries bound for it
    pub fn on_combo_fired(&mut self, combo: ShortcutCombo) {
        if self.suspended {
            debug!(%combo, "suspended, ignoring combo");
            return;
        }

        // A key event queued before the last re-registration
        let Some(candidates) = self.dispatch.get(&combo).cloned() else {
            debug!(%combo, position = self.position, "combo not bound, ignoring");
            return;
        };

        self.timer.cancel();
        let matched = self.position + 1;

        let mut finished = Vec::new();
        let mut continuing = Vec::new();
        for entry in self.entries.iter().filter(|e| candidates.contains(&e.id)) {
            match entry.sequence.len().cmp(&matched) {
                Ordering::Equal => finished.push(entry.id),
                Ordering::Greater => continuing.push(entry.id),
                Ordering::Less => {}
            }
        }

        match (finished.first(), continuing.is_empty()) {
            // Conflict-free entries finish alone; a sequence bound through
            // the literal rule may share its tail with others, and the
            // first finished entry in list order wins
            (Some(&id), _) => {
                if finished.len() > 1 || !continuing.is_empty() {
                    warn!(
                        %combo,
                        finished = finished.len(),
                        continuing = continuing.len(),
                        "ambiguous completion, activating first entry"
                    );
                }
                self.activate(id);
                self.reset(ResetReason::Completed);
            }
            (None, false) => {
                self.enter(matched, Some(combo), &continuing);
                debug!(position = matched, %combo, "sequence advanced");
                self.emit(EngineEvent::SequenceAdvanced { position: matched });
            }
            (None, true) => {
                let message = format!(
                    "combo {} at position {} is bound for no live entry",
                    combo, self.position
                );
                self.invariant_violation(&message);
            }
        }
    }

    /// The idle timer ran out before the next combo
    pub fn on_idle_timeout(&mut self) {
        self.timer.cancel();
        if self.position == 0 {
            return;
        }
        debug!(position = self.position, "sequence timed out, resetting");
        self.reset(ResetReason::IdleTimeout);
    }

    /// Release all bindings while a shortcut is being recorded
    pub fn suspend(&mut self) {
        if self.suspended {
            return;
        }
        self.suspended = true;
        self.timer.cancel();
        self.unregister_all();
        info!(position = self.position, "engine suspended");
        self.emit(EngineEvent::Suspended);
    }

    /// Restore the initial bindings after recording
    pub fn resume(&mut self) {
        if !self.suspended {
            return;
        }
        self.suspended = false;
        info!("engine resumed");
        self.reset(ResetReason::Resumed);
        self.emit(EngineEvent::Resumed);
    }

    /// Explicit teardown: nothing stays bound once this returns
    pub fn shutdown(&mut self) {
        self.timer.cancel();
        self.unregister_all();
        self.position = 0;
        self.last_matched = None;
        debug!("engine bindings released");
    }

    /// Run the engine, processing hotkey events, commands and timeouts
    pub async fn run(
        &mut self,
        mut hotkey_rx: mpsc::Receiver<HotkeyEvent>,
        mut command_rx: mpsc::Receiver<EngineCommand>,
    ) {
        info!(entries = self.entries.len(), "sequence engine started");
        self.register_shortcuts(0, None);

        loop {
            let expired = self.timer.expired();

            tokio::select! {
                biased;

                Some(event) = hotkey_rx.recv() => match event {
                    HotkeyEvent::ComboPressed(combo) => self.on_combo_fired(combo),
                    #[cfg(target_os = "macos")]
                    HotkeyEvent::TapDisabled => {
                        warn!("hotkey tap disabled, combos may have been missed");
                    }
                },

                command = command_rx.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },

                _ = expired => self.on_idle_timeout(),
            }
        }

        self.shutdown();
        info!("sequence engine stopped");
    }

    fn handle_command(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::Status { reply } => {
                let _ = reply.send(self.status());
            }
            EngineCommand::ListEntries { reply } => {
                let _ = reply.send(self.entries().to_vec());
            }
            EngineCommand::GetEntry { index, reply } => {
                let _ = reply.send(self.get_entry(index).cloned());
            }
            EngineCommand::SortByName { reply } => {
                self.sort_entries_by(|a, b| {
                    a.target
                        .name()
                        .to_lowercase()
                        .cmp(&b.target.name().to_lowercase())
                });
                let _ = reply.send(());
            }
            EngineCommand::AddEntry {
                target,
                sequence,
                flags,
                reply,
            } => {
                let _ = reply.send(self.add_entry(target, sequence, flags));
            }
            EngineCommand::RemoveEntry { index, reply } => {
                let _ = reply.send(self.remove_entry(index));
            }
            EngineCommand::ReplaceSequence {
                id,
                sequence,
                reply,
            } => {
                let _ = reply.send(self.replace_sequence(id, sequence));
            }
            EngineCommand::ReplaceFlags { id, flags, reply } => {
                let _ = reply.send(self.replace_flags(id, flags));
            }
            EngineCommand::CheckConflict {
                sequence,
                excluding,
                reply,
            } => {
                let conflict = if sequence.is_empty() {
                    None
                } else {
                    self.check_for_conflict(&sequence, excluding)
                };
                let _ = reply.send(conflict);
            }
            EngineCommand::Suspend { reply } => {
                self.suspend();
                let _ = reply.send(());
            }
            EngineCommand::Resume { reply } => {
                self.resume();
                let _ = reply.send(());
            }
            EngineCommand::SetEnabled { enabled, reply } => {
                self.set_enabled(enabled);
                let _ = reply.send(());
            }
        }
    }

    /// Unbind everything, move to `at_index` and bind the next combo of
    /// each candidate entry, one binding per distinct combo
    fn enter(&mut self, at_index: usize, last: Option<ShortcutCombo>, candidates: &[EntryId]) {
        self.unregister_all();
        self.position = at_index;
        self.last_matched = if at_index == 0 { None } else { last };

        if self.suspended {
            self.timer.cancel();
            debug!(position = at_index, "suspended, leaving shortcuts unbound");
            return;
        }

        if at_index > 0 {
            self.timer.arm(self.config.sequence_delay);
        } else {
            self.timer.cancel();
        }

        for entry in self.entries.iter().filter(|e| candidates.contains(&e.id)) {
            if let Some(&combo) = entry.sequence.get(at_index) {
                self.dispatch.entry(combo).or_default().push(entry.id);
            }
        }

        for &combo in self.dispatch.keys() {
            if !self.registry.is_registered(combo) {
                self.registry.register(combo);
            }
        }

        debug!(
            bound = self.dispatch.len(),
            entries = self.entries.len(),
            position = at_index,
            last = ?last.map(|combo| combo.to_string()),
            "registered shortcuts"
        );
    }

    fn reset(&mut self, reason: ResetReason) {
        let all: Vec<EntryId> = self.entries.iter().map(|entry| entry.id).collect();
        self.enter(0, None, &all);
        self.emit(EngineEvent::SequenceReset { reason });
    }

    /// Queue the entry for the activation worker; never waits on it
    fn activate(&mut self, id: EntryId) {
        let Some(entry) = self.entries.iter().find(|entry| entry.id == id) else {
            return;
        };
        let name = entry.target.name();

        if !self.enabled {
            debug!(app = %name, "activation disabled, skipping");
            return;
        }

        let request = ActivationRequest {
            entry_id: id,
            target: entry.target.clone(),
            flags: entry.flags,
        };
        if self.activations.send(request).is_err() {
            warn!(app = %name, "activation worker stopped, dropping activation");
            self.emit(EngineEvent::ActivationFailed {
                entry_id: id,
                name,
                error: "activation worker stopped".to_string(),
            });
            return;
        }
        info!(app = %name, %id, "activation requested");
    }

    fn index_of(&self, id: EntryId) -> Result<usize, EngineError> {
        self.entries
            .iter()
            .position(|entry| entry.id == id)
            .ok_or(EngineError::UnknownEntry(id))
    }

    fn validate_sequence(
        &self,
        sequence: &[ShortcutCombo],
        excluding: Option<EntryId>,
    ) -> Result<(), EngineError> {
        if sequence.len() > self.config.max_sequence_length {
            return Err(EngineError::SequenceTooLong {
                len: sequence.len(),
                max: self.config.max_sequence_length,
            });
        }

        if sequence.is_empty() {
            return Ok(());
        }

        match self.check_for_conflict(sequence, excluding) {
            Some(existing) => {
                warn!(%existing, "rejected conflicting sequence");
                Err(EngineError::Conflict { existing })
            }
            None => Ok(()),
        }
    }

    fn entries_changed(&mut self) {
        self.emit(EngineEvent::EntriesChanged {
            count: self.entries.len(),
        });
        self.reset(ResetReason::Mutation);
    }

    /// Loud in debug builds, a full reset in release builds
    fn invariant_violation(&mut self, message: &str) {
        error!(position = self.position, "{}", message);
        self.reset(ResetReason::Invariant);
        debug_assert!(false, "{}", message);
    }

    fn emit(&self, event: EngineEvent) {
        debug!(%event, "emitting engine event");
        let _ = self.event_tx.send(event);
    }

    #[cfg(test)]
    pub fn registry(&self) -> &R {
        &self.registry
    }

    #[cfg(test)]
    pub fn timer_armed(&self) -> bool {
        self.timer.is_armed()
    }
}
