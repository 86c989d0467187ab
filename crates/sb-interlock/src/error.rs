//! Error types for interlocking operations.

use sb_core::{DeadlockId, SectionId, SignalId, TrainId};
use thiserror::Error;

/// Result type for interlocking operations.
pub type InterlockResult<T> = Result<T, InterlockError>;

/// Errors that can occur in interlocking operations.
///
/// Ordinary negative outcomes (route not reservable, no next signal, no free
/// deadlock path) are return values, not errors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum InterlockError {
    /// Section reference not found.
    #[error("Unknown section: {section}")]
    UnknownSection { section: SectionId },

    /// Signal reference not found.
    #[error("Unknown signal: {signal}")]
    UnknownSignal { signal: SignalId },

    /// Train reference not found.
    #[error("Unknown train: {train}")]
    UnknownTrain { train: TrainId },

    /// Deadlock area reference not found.
    #[error("Unknown deadlock area: {area}")]
    UnknownDeadlockArea { area: DeadlockId },

    /// Signal attachment does not fit the track layout.
    #[error("Invalid signal placement for '{name}': {what}")]
    InvalidPlacement { name: String, what: String },

    /// Invalid argument provided to an interlocking function.
    #[error("Invalid argument: {what}")]
    InvalidArg { what: String },

    /// Restored state was saved against a structurally different track graph.
    #[error("Snapshot has {saved} sections but the track graph has {built}")]
    SectionCountMismatch { saved: usize, built: usize },

    /// Restored state refers to a signal set of a different size.
    #[error("Snapshot has {saved} signals but the interlocking has {built}")]
    SignalCountMismatch { saved: usize, built: usize },
}

impl InterlockError {
    /// Errors that must abort a session resume rather than be logged and skipped.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            InterlockError::SectionCountMismatch { .. } | InterlockError::SignalCountMismatch { .. }
        )
    }
}
