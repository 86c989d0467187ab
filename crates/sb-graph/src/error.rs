//! Graph-specific error types.

use sb_core::{SbError, SectionId};

use crate::graph::{SectionKind, TrackDirection};

/// Track construction and validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// A section ID does not exist.
    UnknownSection { section: SectionId },

    /// A pin refers to a section that doesn't exist.
    InvalidLink { section: SectionId, link: SectionId },

    /// A pin has no matching pin on the neighbour pointing back.
    NonReciprocalLink { from: SectionId, to: SectionId },

    /// Both pin slots at a section end are already used.
    NoFreePin {
        section: SectionId,
        direction: TrackDirection,
    },

    /// The pins of a section do not match its kind.
    KindMismatch {
        section: SectionId,
        kind: SectionKind,
        reason: &'static str,
    },

    /// A section length is negative or not finite.
    InvalidLength { section: SectionId },

    /// Two sections share the same name.
    DuplicateName { name: String },
}

impl std::fmt::Display for GraphError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GraphError::UnknownSection { section } => {
                write!(f, "Section {} does not exist", section)
            }
            GraphError::InvalidLink { section, link } => {
                write!(f, "Section {} links to non-existent section {}", section, link)
            }
            GraphError::NonReciprocalLink { from, to } => {
                write!(
                    f,
                    "Section {} links to {} but {} has no link back",
                    from, to, to
                )
            }
            GraphError::NoFreePin { section, direction } => {
                write!(
                    f,
                    "Section {} has no free pin at its {:?} end",
                    section, direction
                )
            }
            GraphError::KindMismatch {
                section,
                kind,
                reason,
            } => {
                write!(f, "Section {} of kind {:?}: {}", section, kind, reason)
            }
            GraphError::InvalidLength { section } => {
                write!(f, "Section {} has an invalid length", section)
            }
            GraphError::DuplicateName { name } => {
                write!(f, "Section name '{}' is used more than once", name)
            }
        }
    }
}

impl std::error::Error for GraphError {}

impl From<GraphError> for SbError {
    fn from(err: GraphError) -> Self {
        SbError::Layout {
            what: err.to_string(),
        }
    }
}
