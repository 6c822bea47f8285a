//! The capability shared by everything that can take part in a chain.

use crate::arena::{AmbiguityArena, EntityId};
use std::fmt;
use std::ops::Deref;

/// An entity that may have mutually exclusive alternatives.
///
/// Chain bookkeeping (navigation, add/insert, discard/resolve) lives in
/// [`AmbiguityArena`]; implementors only decide what counts as a duplicate.
pub trait AmbiguousEntity {
    /// Whether `other` is an accidental duplicate of `self` rather than a
    /// genuine alternative. Navigation skips members that match.
    fn matches(&self, other: &Self) -> bool;
}

/// Borrowed view of one arena member with chain navigation attached.
pub struct EntityRef<'a, T> {
    arena: &'a AmbiguityArena<T>,
    id: EntityId,
    entity: &'a T,
}

impl<'a, T> Clone for EntityRef<'a, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, T> Copy for EntityRef<'a, T> {}

impl<'a, T> Deref for EntityRef<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.entity
    }
}

impl<'a, T: fmt::Debug> fmt::Debug for EntityRef<'a, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityRef")
            .field("id", &self.id)
            .field("entity", self.entity)
            .finish()
    }
}

impl<'a, T: AmbiguousEntity> EntityRef<'a, T> {
    pub(crate) fn new(arena: &'a AmbiguityArena<T>, id: EntityId, entity: &'a T) -> Self {
        Self { arena, id, entity }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn entity(&self) -> &'a T {
        self.entity
    }

    pub fn arena(&self) -> &'a AmbiguityArena<T> {
        self.arena
    }

    pub fn is_ambiguous(&self) -> bool {
        self.arena.is_ambiguous(self.id)
    }

    pub fn precedence(&self) -> usize {
        self.arena.precedence(self.id)
    }

    pub fn ambiguity_count(&self) -> usize {
        self.arena.ambiguity_count(self.id)
    }

    pub fn first_ambiguity(&self) -> EntityRef<'a, T> {
        self.arena
            .first_ambiguity(self.id)
            .and_then(|id| self.arena.entity(id))
            .unwrap_or(*self)
    }

    pub fn next_ambiguity(&self) -> Option<EntityRef<'a, T>> {
        self.arena
            .next_ambiguity(self.id)
            .and_then(|id| self.arena.entity(id))
    }

    pub fn has_next_ambiguity(&self) -> bool {
        self.arena.has_next_ambiguity(self.id)
    }

    /// Distinct alternatives from the head of the chain, in precedence order.
    pub fn alternatives(&self) -> Vec<EntityRef<'a, T>> {
        self.arena
            .alternatives(self.id)
            .into_iter()
            .filter_map(|id| self.arena.entity(id))
            .collect()
    }

    /// Every chain member, duplicates included.
    pub fn members(&self) -> Vec<EntityRef<'a, T>> {
        self.arena
            .chain_members(self.id)
            .into_iter()
            .filter_map(|id| self.arena.entity(id))
            .collect()
    }
}
