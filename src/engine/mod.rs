//! Sequence engine module
//!
//! Maps user-defined combo sequences onto the global hotkey table, which
//! can hold only one binding per combo at a time:
//! - Position 0 binds the first combo of every configured entry
//! - Each matched combo narrows the bindings to the next step
//! - Completing a sequence activates its application and resets
//! - An idle timeout abandons a half-typed sequence

mod command;
mod conflict;
mod entry;
mod error;
mod machine;
mod timer;

pub use command::{EngineCommand, EngineStatus};
pub use entry::{AppTarget, BehaviorFlags, EntryId, SequenceEntry};
pub use error::EngineError;
pub use machine::{EngineConfig, SequenceEngine, DEFAULT_MAX_SEQUENCE_LENGTH, DEFAULT_SEQUENCE_DELAY};
