//! Arena that owns chain participants and the chains linking them.
//!
//! ```text
//!   slots ─────────────────────────────┐      chains
//!   ┌────┬──────────────┬─────────┐    │      ┌─────────┬──────────────┐
//!   │ #0 │ entity a     │ chain 7 │────┼─────►│ chain 7 │ [#0, #2, #1] │
//!   │ #1 │ entity c     │ chain 7 │    │      └─────────┴──────────────┘
//!   │ #2 │ entity b     │ chain 7 │    │
//!   │ #3 │ entity d     │ -       │    │  (#3 stands alone)
//!   └────┴──────────────┴─────────┘    │
//! ```
//!
//! Members refer to their chain by [`ChainId`] and chains list members by
//! [`EntityId`], so neither side owns the other. Ids are generational: a
//! recycled slot never answers to an id issued before it was freed.
//!
//! Invariants kept by every mutation:
//! - an entity belongs to at most one chain;
//! - a chain always lists at least two members (a lone survivor is released);
//! - a member's recorded chain lists that member.

use crate::chain::AmbiguityChain;
use crate::entity::{AmbiguousEntity, EntityRef};
use crate::error::{AmbiguityError, Result};
use std::collections::HashMap;
use std::fmt;

/// Generational handle to an arena member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId {
    index: u32,
    generation: u32,
}

impl EntityId {
    pub const fn from_raw_parts(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub const fn index(self) -> u32 {
        self.index
    }

    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

/// Handle to a chain inside one arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChainId(u32);

impl ChainId {
    pub const fn raw(self) -> u32 {
        self.0
    }
}

#[derive(Debug)]
struct Node<T> {
    entity: T,
    chain: Option<ChainId>,
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    node: Option<Node<T>>,
}

#[derive(Debug)]
pub struct AmbiguityArena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    chains: HashMap<ChainId, AmbiguityChain>,
    next_chain: u32,
    live: usize,
}

impl<T> Default for AmbiguityArena<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            chains: HashMap::new(),
            next_chain: 0,
            live: 0,
        }
    }
}

impl<T> AmbiguityArena<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live members.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn chain_count(&self) -> usize {
        self.chains.len()
    }

    /// Add a standalone entity.
    pub fn insert(&mut self, entity: T) -> EntityId {
        let node = Node {
            entity,
            chain: None,
        };
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            return EntityId::from_raw_parts(index, slot.generation);
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        EntityId::from_raw_parts(index, 0)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.node(id).is_some()
    }

    pub fn get(&self, id: EntityId) -> Option<&T> {
        self.node(id).map(|node| &node.entity)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut T> {
        self.node_mut(id).map(|node| &mut node.entity)
    }

    /// Ids of every live member, in slot order.
    pub fn ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.node
                .as_ref()
                .map(|_| EntityId::from_raw_parts(index as u32, slot.generation))
        })
    }

    /// The chain this entity belongs to, if any.
    pub fn chain_of(&self, id: EntityId) -> Option<ChainId> {
        self.node(id).and_then(|node| node.chain)
    }

    pub fn chain(&self, chain: ChainId) -> Option<&AmbiguityChain> {
        self.chains.get(&chain)
    }

    /// Every member of the entity's chain in precedence order (just the entity
    /// when it stands alone, empty when unknown).
    pub fn chain_members(&self, id: EntityId) -> Vec<EntityId> {
        match self.node(id) {
            None => Vec::new(),
            Some(node) => match node.chain.and_then(|c| self.chains.get(&c)) {
                Some(chain) => chain.iter().collect(),
                None => vec![id],
            },
        }
    }

    /// Raw precedence: position in the chain, 0 when standing alone.
    pub fn precedence(&self, id: EntityId) -> usize {
        self.node(id)
            .and_then(|node| node.chain)
            .and_then(|c| self.chains.get(&c))
            .and_then(|chain| chain.precedence(id))
            .unwrap_or(0)
    }

    pub fn first_ambiguity(&self, id: EntityId) -> Option<EntityId> {
        let node = self.node(id)?;
        match node.chain.and_then(|c| self.chains.get(&c)) {
            Some(chain) => chain.first(),
            None => Some(id),
        }
    }

    fn node(&self, id: EntityId) -> Option<&Node<T>> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_ref()
    }

    fn node_mut(&mut self, id: EntityId) -> Option<&mut Node<T>> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_mut()
    }

    fn require(&self, id: EntityId) -> Result<&Node<T>> {
        self.node(id).ok_or(AmbiguityError::UnknownEntity(id))
    }

    fn set_chain(&mut self, id: EntityId, chain: Option<ChainId>) {
        if let Some(node) = self.node_mut(id) {
            node.chain = chain;
        }
    }

    fn new_chain(&mut self, members: Vec<EntityId>) -> ChainId {
        let chain_id = ChainId(self.next_chain);
        self.next_chain = self.next_chain.wrapping_add(1);
        for &member in &members {
            self.set_chain(member, Some(chain_id));
        }
        self.chains
            .insert(chain_id, AmbiguityChain::from_members(members));
        chain_id
    }

    /// Release a chain that is down to one member.
    fn dissolve_if_trivial(&mut self, chain_id: ChainId) {
        let remaining: Vec<EntityId> = match self.chains.get(&chain_id) {
            Some(chain) if chain.len() <= 1 => chain.iter().collect(),
            _ => return,
        };
        self.chains.remove(&chain_id);
        for id in remaining {
            self.set_chain(id, None);
        }
        tracing::trace!(chain = chain_id.raw(), "released single-member chain");
    }

    fn free_slot(&mut self, id: EntityId) -> Option<T> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;
        Some(node.entity)
    }
}

impl<T: AmbiguousEntity> AmbiguityArena<T> {
    pub fn entity(&self, id: EntityId) -> Option<EntityRef<'_, T>> {
        self.get(id).map(|entity| EntityRef::new(self, id, entity))
    }

    /// Next chain member after `id` that is not a duplicate of it.
    pub fn next_ambiguity(&self, id: EntityId) -> Option<EntityId> {
        let node = self.node(id)?;
        let chain = node.chain.and_then(|c| self.chains.get(&c))?;
        chain.after(id).find(|next| {
            self.get(*next)
                .map_or(false, |other| !node.entity.matches(other))
        })
    }

    pub fn has_next_ambiguity(&self, id: EntityId) -> bool {
        self.next_ambiguity(id).is_some()
    }

    /// Distinct alternatives reached by walking from the chain's head.
    pub fn alternatives(&self, id: EntityId) -> Vec<EntityId> {
        let mut result = Vec::new();
        let mut cursor = self.first_ambiguity(id);
        while let Some(current) = cursor {
            result.push(current);
            cursor = self.next_ambiguity(current);
        }
        result
    }

    /// Whether walking from the chain's head finds more than one entity.
    pub fn is_ambiguous(&self, id: EntityId) -> bool {
        self.first_ambiguity(id)
            .map_or(false, |first| self.has_next_ambiguity(first))
    }

    /// Number of distinct alternatives (1 for a lone entity, 0 if unknown).
    pub fn ambiguity_count(&self, id: EntityId) -> usize {
        self.alternatives(id).len()
    }

    /// Append `other` to the end of `id`'s chain, creating the chain if needed.
    /// Returns `other`'s precedence.
    pub fn add_ambiguity(&mut self, id: EntityId, other: EntityId) -> Result<usize> {
        let chain = self.require(id)?.chain;
        if self.require(other)?.chain.is_some() || other == id {
            return Err(AmbiguityError::AlreadyChained { entity: other });
        }
        let chain_id = match chain {
            Some(chain_id) => chain_id,
            None => self.new_chain(vec![id]),
        };
        self.add_to_chain(chain_id, other)
    }

    /// Append a free entity to a chain.
    pub fn add_to_chain(&mut self, chain_id: ChainId, new: EntityId) -> Result<usize> {
        if self.require(new)?.chain.is_some() {
            return Err(AmbiguityError::AlreadyChained { entity: new });
        }
        let chain = self
            .chains
            .get_mut(&chain_id)
            .ok_or(AmbiguityError::UnknownEntity(new))?;
        let precedence = chain.add(new)?;
        self.set_chain(new, Some(chain_id));
        tracing::trace!(entity = %new, chain = chain_id.raw(), precedence, "appended to chain");
        Ok(precedence)
    }

    /// Place `new` right after `existing` within `chain_id` (`None`: front).
    ///
    /// A member of the same chain is moved; a member of any other chain is
    /// rejected. An anchor outside the chain is rejected when it is ambiguous
    /// elsewhere, and otherwise gives no position, so `new` goes to the end.
    pub fn insert_after(
        &mut self,
        chain_id: ChainId,
        existing: Option<EntityId>,
        new: EntityId,
    ) -> Result<usize> {
        match self.require(new)?.chain {
            Some(c) if c != chain_id => return Err(AmbiguityError::AlreadyChained { entity: new }),
            _ => {}
        }

        if let Some(anchor) = existing {
            self.require(anchor)?;
            if self.chain_of(anchor) != Some(chain_id) {
                if self.is_ambiguous(anchor) {
                    return Err(AmbiguityError::ForeignAnchor { anchor });
                }
                if self.chain_of(new) != Some(chain_id) {
                    return self.add_to_chain(chain_id, new);
                }
                let chain = self
                    .chains
                    .get_mut(&chain_id)
                    .ok_or(AmbiguityError::UnknownEntity(new))?;
                chain.remove(new);
                return chain.add(new);
            }
        }

        let chain = self
            .chains
            .get_mut(&chain_id)
            .ok_or(AmbiguityError::UnknownEntity(new))?;
        let precedence = chain.insert_after(existing, new)?;
        self.set_chain(new, Some(chain_id));
        Ok(precedence)
    }

    /// Put `other` immediately after `id`.
    ///
    /// - neither chained: a two-member chain `[id, other]` is created;
    /// - only `other` chained: `id` is spliced to the front of that chain;
    /// - `id` chained: delegates to [`Self::insert_after`].
    ///
    /// Returns `other`'s precedence.
    pub fn insert_ambiguity(&mut self, id: EntityId, other: EntityId) -> Result<usize> {
        let own = self.require(id)?.chain;
        let theirs = self.require(other)?.chain;
        if id == other {
            return Err(AmbiguityError::AlreadyChained { entity: other });
        }

        match (own, theirs) {
            (None, None) => {
                let chain_id = self.new_chain(vec![id]);
                self.add_to_chain(chain_id, other)
            }
            (None, Some(chain_id)) => {
                let chain = self
                    .chains
                    .get_mut(&chain_id)
                    .ok_or(AmbiguityError::NotAMember { entity: other })?;
                chain.insert_after(None, id)?;
                self.set_chain(id, Some(chain_id));
                Ok(self.precedence(other))
            }
            (Some(chain_id), _) => self.insert_after(chain_id, Some(id), other),
        }
    }

    /// Detach `id` from its chain; it stays in the arena standing alone.
    ///
    /// A lone entity is left untouched. An entity whose recorded chain does not
    /// list it is an invariant violation.
    pub fn remove(&mut self, id: EntityId) -> Result<()> {
        let Some(chain_id) = self.require(id)?.chain else {
            return Ok(());
        };
        let removed = self
            .chains
            .get_mut(&chain_id)
            .and_then(|chain| chain.remove(id));
        if removed.is_none() {
            return Err(AmbiguityError::NotAMember { entity: id });
        }
        self.set_chain(id, None);
        self.dissolve_if_trivial(chain_id);
        Ok(())
    }

    /// Detach `id` and drop it from the arena, handing back the entity.
    pub fn discard(&mut self, id: EntityId) -> Result<T> {
        self.remove(id)?;
        self.free_slot(id).ok_or(AmbiguityError::UnknownEntity(id))
    }

    /// Keep `id` as the sole survivor of its chain.
    ///
    /// The former siblings stay in the arena as standalone entities; their ids
    /// are returned so the caller can drop or reuse them.
    pub fn resolve(&mut self, id: EntityId) -> Result<Vec<EntityId>> {
        let siblings: Vec<EntityId> = self
            .chain_members(id)
            .into_iter()
            .filter(|member| *member != id)
            .collect();
        for sibling in &siblings {
            self.remove(*sibling)?;
        }
        Ok(siblings)
    }

    /// Insert `entities` as one new chain, most likely first. Returns the head,
    /// or `None` when there are no entities.
    pub fn insert_ranked(&mut self, entities: impl IntoIterator<Item = T>) -> Option<EntityId> {
        let members: Vec<EntityId> = entities.into_iter().map(|e| self.insert(e)).collect();
        let head = *members.first()?;
        if members.len() > 1 {
            self.new_chain(members);
        }
        Some(head)
    }

    /// Append `entity` as a fresh alternative at the end of `anchor`'s chain.
    pub fn push_alternative(&mut self, anchor: EntityId, entity: T) -> Result<EntityId> {
        self.require(anchor)?;
        let id = self.insert(entity);
        self.add_ambiguity(anchor, id)?;
        Ok(id)
    }
}

impl<T: AmbiguousEntity + Clone> AmbiguityArena<T> {
    /// Deep-copy the alternatives reached from `head` into a new, independent
    /// chain, or onto the end of `seed`'s chain when one is given. Returns the
    /// head of the resulting chain.
    pub fn copy_chain(&mut self, head: EntityId, seed: Option<EntityId>) -> Result<EntityId> {
        self.require(head)?;
        let mut source = Vec::new();
        let mut cursor = Some(head);
        while let Some(current) = cursor {
            source.push(current);
            cursor = self.next_ambiguity(current);
        }

        let mut iter = source.into_iter();
        let result = match seed {
            Some(seed) => self.first_ambiguity(seed).ok_or(AmbiguityError::UnknownEntity(seed))?,
            None => match iter.next() {
                Some(first) => {
                    let copy = self.require(first)?.entity.clone();
                    self.insert(copy)
                }
                None => return Err(AmbiguityError::UnknownEntity(head)),
            },
        };

        for member in iter {
            let copy = self.require(member)?.entity.clone();
            self.push_alternative(result, copy)?;
        }
        Ok(result)
    }
}
