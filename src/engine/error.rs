//! Rejected engine mutations

use super::entry::EntryId;

/// Errors returned by entry mutations; the engine state is left untouched
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("sequence conflicts with entry {existing}")]
    Conflict { existing: EntryId },

    #[error("no entry with id {0}")]
    UnknownEntry(EntryId),

    #[error("entry index {index} out of range (have {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("sequence of {len} shortcuts exceeds the maximum of {max}")]
    SequenceTooLong { len: usize, max: usize },
}

impl EngineError {
    /// Stable code for IPC error responses
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Conflict { .. } => "conflict",
            EngineError::UnknownEntry(_) => "unknown_entry",
            EngineError::IndexOutOfRange { .. } => "index_out_of_range",
            EngineError::SequenceTooLong { .. } => "sequence_too_long",
        }
    }
}
