//! Ordered member list for one family of alternatives.
//!
//! A chain is a sequence plus a member→position index, so neighbour and
//! precedence lookups are O(1) while positional splices re-number the tail.
//! Position is precedence: index 0 is the most likely alternative.
//!
//! The chain only knows about its own members. Rules that involve other
//! chains (an entity may belong to at most one) are enforced by
//! [`crate::AmbiguityArena`], which owns every chain.

use crate::arena::EntityId;
use crate::error::{AmbiguityError, Result};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct AmbiguityChain {
    members: Vec<EntityId>,
    positions: HashMap<EntityId, usize>,
}

impl AmbiguityChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chain over distinct ids, in the given order.
    pub(crate) fn from_members(members: Vec<EntityId>) -> Self {
        let positions = members
            .iter()
            .enumerate()
            .map(|(position, id)| (*id, position))
            .collect();
        Self { members, positions }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.positions.contains_key(&id)
    }

    /// Append at the end, returning the new member's precedence.
    pub fn add(&mut self, id: EntityId) -> Result<usize> {
        if self.contains(id) {
            return Err(AmbiguityError::AlreadyChained { entity: id });
        }
        let position = self.members.len();
        self.members.push(id);
        self.positions.insert(id, position);
        Ok(position)
    }

    /// Place `new` immediately after `existing` (`None` puts it at the front).
    ///
    /// A member is detached and re-spliced; if it already sits right after the
    /// anchor nothing moves. The anchor, when given, must be a member.
    pub fn insert_after(&mut self, existing: Option<EntityId>, new: EntityId) -> Result<usize> {
        let target = match existing {
            None => 0,
            Some(anchor) => match self.positions.get(&anchor) {
                Some(&pos) => pos + 1,
                None => return Err(AmbiguityError::ForeignAnchor { anchor }),
            },
        };

        if let Some(&current) = self.positions.get(&new) {
            if current == target || (current + 1 == target && existing == Some(new)) {
                return Ok(current);
            }
            self.members.remove(current);
            let target = if current < target { target - 1 } else { target };
            self.members.insert(target, new);
            self.reindex_from(current.min(target));
            return Ok(target);
        }

        self.members.insert(target, new);
        self.reindex_from(target);
        Ok(target)
    }

    /// Detach a member, returning the position it held.
    pub fn remove(&mut self, id: EntityId) -> Option<usize> {
        let position = self.positions.remove(&id)?;
        self.members.remove(position);
        self.reindex_from(position);
        Some(position)
    }

    pub fn get(&self, index: usize) -> Option<EntityId> {
        self.members.get(index).copied()
    }

    pub fn first(&self) -> Option<EntityId> {
        self.members.first().copied()
    }

    pub fn get_next(&self, id: EntityId) -> Option<EntityId> {
        let position = *self.positions.get(&id)?;
        self.get(position + 1)
    }

    pub fn has_next(&self, id: EntityId) -> bool {
        self.get_next(id).is_some()
    }

    /// Precedence of a member; `None` for non-members.
    pub fn precedence(&self, id: EntityId) -> Option<usize> {
        self.positions.get(&id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.members.iter().copied()
    }

    /// Members strictly after `id`, in order.
    pub fn after(&self, id: EntityId) -> impl Iterator<Item = EntityId> + '_ {
        let start = self.positions.get(&id).map_or(self.members.len(), |p| p + 1);
        self.members[start..].iter().copied()
    }

    fn reindex_from(&mut self, start: usize) {
        for (position, id) in self.members.iter().enumerate().skip(start) {
            self.positions.insert(*id, position);
        }
    }
}
