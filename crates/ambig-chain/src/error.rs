//! Structural errors raised by chain mutations.
//!
//! Every variant describes a programmer error: an operation that, if allowed
//! to continue, would leave an entity in two chains or leave a chain pointing
//! at an entity that no longer believes it is a member. Absent data (unknown
//! keys, empty text, missing classifications) is never reported here; lookups
//! return `None` instead.

use crate::arena::EntityId;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmbiguityError {
    /// The entity is already a member of a different chain.
    #[error("entity {entity} already belongs to another ambiguity chain")]
    AlreadyChained { entity: EntityId },

    /// The entity reports membership in a chain that does not list it.
    #[error("entity {entity} reports ambiguity but is not a member of its chain")]
    NotAMember { entity: EntityId },

    /// An insertion anchor is outside the chain and ambiguous elsewhere.
    #[error("anchor {anchor} is not a member of the chain and is itself ambiguous")]
    ForeignAnchor { anchor: EntityId },

    /// The id is stale or was issued by another arena.
    #[error("unknown entity {0}")]
    UnknownEntity(EntityId),
}

impl AmbiguityError {
    /// All variants are invariant violations ("invalid state").
    pub fn is_invalid_state(&self) -> bool {
        matches!(
            self,
            AmbiguityError::AlreadyChained { .. }
                | AmbiguityError::NotAMember { .. }
                | AmbiguityError::ForeignAnchor { .. }
                | AmbiguityError::UnknownEntity(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AmbiguityError>;
