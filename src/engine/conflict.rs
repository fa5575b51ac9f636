//! Prefix-conflict detection between combo sequences
//!
//! Sequences must have unique prefixes: after a shared prefix the engine
//! cannot tell whether the user intends to stop or to keep typing.

use crate::hotkey::ShortcutCombo;

use super::entry::{EntryId, SequenceEntry};

/// Whether two sequences agree on every combo up to the shorter length
pub fn prefix_equal(a: &[ShortcutCombo], b: &[ShortcutCombo]) -> bool {
    a.iter().zip(b).all(|(x, y)| x == y)
}

/// Find the first entry whose sequence conflicts with `candidate`
///
/// Entries with empty sequences and the `excluding` entry are skipped.
/// `candidate` must be non-empty.
pub fn find_conflict(
    candidate: &[ShortcutCombo],
    entries: &[SequenceEntry],
    excluding: Option<EntryId>,
) -> Option<EntryId> {
    debug_assert!(
        !candidate.is_empty(),
        "conflict check called with an empty sequence"
    );

    entries
        .iter()
        .filter(|entry| entry.is_configured() && Some(entry.id) != excluding)
        .find(|entry| prefix_equal(candidate, &entry.sequence))
        .map(|entry| entry.id)
}
