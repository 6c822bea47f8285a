//! Attribute/value store with ambiguity tracking.
//!
//! ```text
//!   add("type", sonata)
//!        │ classify "type" → [MODEL, STYLE]
//!        ▼
//!   canonical     MODEL ─► [MODEL=sonata ─► STYLE=sonata]     (ambiguous)
//!                 STYLE ─► [STYLE=sonata]
//!   classified   "type" ─► [MODEL=sonata ─► STYLE=sonata]     (lookup cache)
//!   unclassified  text  ─► [...]                              (no canonical type)
//! ```
//!
//! Every stored pair lives in one arena; the three maps point at chain heads.
//! A canonical slot's head always has the slot's type. Foreign-typed members
//! right behind a slot-typed member are the other readings of the same input
//! and leave together with it.
//!
//! The classification cache is derived from the canonical slots: a cached
//! chain for some text is the concatenation, in rank order, of the slots its
//! classification names. Any change to one of those slots drops the cached
//! chain; the next lookup rebuilds it.

use crate::attribute::CanonicalType;
use crate::classifier::AttributeClassifier;
use crate::options::ContainerOptions;
use crate::pair::AttValPair;
use ambig_chain::{AmbiguityArena, AmbiguousEntity, EntityId, EntityRef, Result};
use indexmap::{IndexMap, IndexSet};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

// ============================================================================
// Handles
// ============================================================================

static NEXT_CONTAINER: AtomicU64 = AtomicU64::new(1);

/// Process-unique container identity; stored pairs point back through it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerId(u64);

impl ContainerId {
    pub(crate) fn next() -> Self {
        Self(NEXT_CONTAINER.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "container-{}", self.0)
    }
}

/// Id of a pair stored in a container.
pub type AvpId = EntityId;

/// Borrowed stored pair with chain navigation.
pub type AvpRef<'a, E, V, M = ()> = EntityRef<'a, AttValPair<E, V, M>>;

/// Where a new unambiguous pair goes when its slot is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddMode {
    /// Front of the slot's chain: the newest value wins.
    #[default]
    Front,
    /// End of the slot's chain.
    Next,
    /// Replace whatever the slot held.
    Override,
}

// ============================================================================
// Container
// ============================================================================

type Pair<E, V, M> = AttValPair<E, V, M>;

#[derive(Debug)]
pub struct AvpContainer<E, V, M = ()> {
    id: ContainerId,
    classifier: Option<Arc<dyn AttributeClassifier<E>>>,
    options: ContainerOptions,
    avps: AmbiguityArena<Pair<E, V, M>>,
    canonical: IndexMap<E, AvpId>,
    classified: IndexMap<String, AvpId>,
    unclassified: IndexMap<String, AvpId>,
    /// Normalized texts whose classification named each type.
    classified_texts: HashMap<E, IndexSet<String>>,
    metadata: Option<M>,
}

impl<E, V, M> Default for AvpContainer<E, V, M>
where
    E: CanonicalType,
    V: Clone + Eq + Hash,
    M: Clone,
{
    fn default() -> Self {
        Self::build(None)
    }
}

impl<E, V, M> AvpContainer<E, V, M>
where
    E: CanonicalType,
    V: Clone + Eq + Hash,
    M: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_classifier(classifier: Arc<dyn AttributeClassifier<E>>) -> Self {
        Self::build(Some(classifier))
    }

    pub fn with_options(mut self, options: ContainerOptions) -> Self {
        self.options = options;
        self
    }

    fn build(classifier: Option<Arc<dyn AttributeClassifier<E>>>) -> Self {
        Self {
            id: ContainerId::next(),
            classifier,
            options: ContainerOptions::default(),
            avps: AmbiguityArena::new(),
            canonical: IndexMap::new(),
            classified: IndexMap::new(),
            unclassified: IndexMap::new(),
            classified_texts: HashMap::new(),
            metadata: None,
        }
    }

    pub fn id(&self) -> ContainerId {
        self.id
    }

    pub fn classifier(&self) -> Option<&Arc<dyn AttributeClassifier<E>>> {
        self.classifier.as_ref()
    }

    pub fn options(&self) -> &ContainerOptions {
        &self.options
    }

    /// True when no canonical or unclassified entry is held.
    pub fn is_empty(&self) -> bool {
        self.canonical.is_empty() && self.unclassified.is_empty()
    }

    /// Number of canonical plus unclassified entries.
    pub fn len(&self) -> usize {
        self.canonical.len() + self.unclassified.len()
    }

    pub fn avp(&self, id: AvpId) -> Option<AvpRef<'_, E, V, M>> {
        self.avps.entity(id)
    }

    // ------------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------------

    /// The entry for a canonical type.
    ///
    /// Falls back to a free-text lookup by the type's name when the slot is
    /// empty and unclassified entries exist.
    pub fn get(&mut self, att_type: &E) -> Result<Option<AvpRef<'_, E, V, M>>> {
        if !att_type.is_canonical() {
            return Ok(None);
        }
        if let Some(&head) = self.canonical.get(att_type) {
            return Ok(self.avps.entity(head));
        }
        if self.unclassified.is_empty() {
            return Ok(None);
        }
        let found = self.lookup_text(&att_type.to_string())?;
        Ok(found.and_then(|id| self.avps.entity(id)))
    }

    /// The entry for free text: unclassified entries first, then the
    /// classification cache, then a fresh classification.
    pub fn get_text(&mut self, text: &str) -> Result<Option<AvpRef<'_, E, V, M>>> {
        let found = self.lookup_text(text)?;
        Ok(found.and_then(|id| self.avps.entity(id)))
    }

    fn lookup_text(&mut self, text: &str) -> Result<Option<AvpId>> {
        if text.is_empty() || self.is_empty() {
            return Ok(None);
        }
        let key = self.options.normalize_key(text);
        if let Some(&id) = self.unclassified.get(&key) {
            return Ok(Some(id));
        }
        if let Some(&id) = self.classified.get(&key) {
            return Ok(Some(id));
        }
        if self.canonical.is_empty() {
            return Ok(None);
        }
        let Some(classifier) = self.classifier.clone() else {
            return Ok(None);
        };
        let Some(classification) = classifier.classify(self.options.classifier_text(text)) else {
            return Ok(None);
        };

        let candidates: Vec<E> = classification.candidates().into_iter().cloned().collect();
        for candidate in &candidates {
            self.note_classified(candidate, &key);
        }
        tracing::trace!(
            container = %self.id,
            text,
            candidates = candidates.len(),
            "classified lookup text"
        );
        if !classification.is_ambiguous() {
            return Ok(candidates
                .first()
                .and_then(|candidate| self.canonical.get(candidate).copied()));
        }
        self.cache_classified(&key, &candidates)
    }

    /// Head of every canonical then unclassified entry.
    pub fn get_all(&self) -> Vec<AvpRef<'_, E, V, M>> {
        self.heads().filter_map(|id| self.avps.entity(id)).collect()
    }

    pub fn get_all_canonical(&self) -> Vec<AvpRef<'_, E, V, M>> {
        self.canonical
            .values()
            .filter_map(|id| self.avps.entity(*id))
            .collect()
    }

    pub fn has_ambiguity(&self) -> bool {
        self.heads().any(|id| self.avps.is_ambiguous(id))
    }

    /// Heads of canonical and unclassified entries that are ambiguous.
    pub fn ambiguities(&self) -> Vec<AvpRef<'_, E, V, M>> {
        self.heads()
            .filter(|id| self.avps.is_ambiguous(*id))
            .filter_map(|id| self.avps.entity(id))
            .collect()
    }

    fn heads(&self) -> impl Iterator<Item = AvpId> + '_ {
        self.canonical
            .values()
            .chain(self.unclassified.values())
            .copied()
    }

    // ------------------------------------------------------------------------
    // Adding
    // ------------------------------------------------------------------------

    /// Store a copy of `pair`; a repeated canonical type takes precedence over
    /// what the slot already held.
    pub fn add(&mut self, pair: Pair<E, V, M>) -> Result<Vec<AvpId>> {
        self.add_alternatives(vec![pair], AddMode::Front)
    }

    pub fn add_text(&mut self, text: &str, value: V) -> Result<Vec<AvpId>> {
        self.add(AttValPair::free(text, value))
    }

    /// Like [`Self::add`], but behind what the slot already held.
    pub fn add_next(&mut self, pair: Pair<E, V, M>) -> Result<Vec<AvpId>> {
        self.add_alternatives(vec![pair], AddMode::Next)
    }

    pub fn add_next_text(&mut self, text: &str, value: V) -> Result<Vec<AvpId>> {
        self.add_next(AttValPair::free(text, value))
    }

    /// Replace every entry sharing a key with `pair`, then store it.
    pub fn override_with(&mut self, pair: Pair<E, V, M>) -> Result<Vec<AvpId>> {
        self.add_alternatives(vec![pair], AddMode::Override)
    }

    /// Store competing readings of one input, most likely first.
    ///
    /// When the first reading has no type and a classifier is present, every
    /// untyped reading is classified; one carrying several candidate types is
    /// split into one reading per candidate. Returns the ids of the copies now
    /// held in canonical and unclassified slots.
    pub fn add_alternatives(
        &mut self,
        alternatives: Vec<Pair<E, V, M>>,
        mode: AddMode,
    ) -> Result<Vec<AvpId>> {
        let needs_classification = self.classifier.is_some()
            && alternatives
                .first()
                .map_or(false, |first| first.att_type().is_none());
        let (alternatives, classified) = if needs_classification {
            self.classify_alternatives(alternatives)
        } else {
            (alternatives, IndexMap::new())
        };
        let Some(first) = alternatives.first() else {
            return Ok(Vec::new());
        };

        if mode == AddMode::Override {
            for alternative in &alternatives {
                self.remove_matching(alternative)?;
            }
        }

        let ambiguous = alternatives.iter().skip(1).any(|alt| !first.matches(alt));
        let primary = first.canonical_type().cloned();
        let mut stored = Vec::with_capacity(alternatives.len());
        let mut touched: IndexSet<E> = IndexSet::new();

        for (position, alternative) in alternatives.iter().enumerate() {
            if let Some(att_type) = alternative.canonical_type().cloned() {
                if !ambiguous {
                    stored.push(self.place_canonical(&att_type, alternative.clone(), mode)?);
                } else if position == 0 {
                    stored.extend(self.append_canonical(&att_type, &alternatives)?);
                } else if primary.as_ref() != Some(&att_type) {
                    stored.extend(
                        self.append_canonical(&att_type, std::slice::from_ref(alternative))?,
                    );
                }
                touched.insert(att_type);
            } else if let Some(text) = alternative.other_type().filter(|text| !text.is_empty()) {
                let key = self.options.normalize_key(text);
                stored.push(self.append_unclassified(key, alternative.clone())?);
            }
        }

        for att_type in &touched {
            self.invalidate_type(att_type)?;
        }
        for (key, candidates) in &classified {
            self.cache_classified(key, candidates)?;
        }

        tracing::debug!(
            container = %self.id,
            stored = stored.len(),
            ambiguous,
            ?mode,
            "added attribute"
        );
        Ok(stored)
    }

    /// Classify untyped readings, splitting multi-candidate ones. Returns the
    /// expanded readings and, per normalized text, the ranked candidates.
    fn classify_alternatives(
        &mut self,
        alternatives: Vec<Pair<E, V, M>>,
    ) -> (Vec<Pair<E, V, M>>, IndexMap<String, Vec<E>>) {
        let Some(classifier) = self.classifier.clone() else {
            return (alternatives, IndexMap::new());
        };
        let mut lookups: HashMap<String, Option<Vec<E>>> = HashMap::new();
        let mut classified = IndexMap::new();
        let mut expanded = Vec::with_capacity(alternatives.len());

        for mut alternative in alternatives {
            let text = if alternative.is_canonical() {
                None
            } else {
                alternative
                    .other_type()
                    .filter(|text| !text.is_empty())
                    .map(str::to_string)
            };
            let Some(text) = text else {
                expanded.push(alternative);
                continue;
            };
            let candidates = lookups
                .entry(text.clone())
                .or_insert_with(|| {
                    classifier
                        .classify(self.options.classifier_text(&text))
                        .map(|c| c.candidates().into_iter().cloned().collect())
                })
                .clone()
                .unwrap_or_default();
            let Some((primary, rest)) = candidates.split_first() else {
                expanded.push(alternative);
                continue;
            };

            let splits: Vec<_> = rest
                .iter()
                .map(|candidate| {
                    let mut split = alternative.clone();
                    split.set_att_type(candidate.clone());
                    split
                })
                .collect();
            alternative.set_att_type(primary.clone());
            expanded.push(alternative);
            expanded.extend(splits);

            let key = self.options.normalize_key(&text);
            for candidate in &candidates {
                self.note_classified(candidate, &key);
            }
            tracing::trace!(
                container = %self.id,
                text = %text,
                candidates = candidates.len(),
                "classified attribute"
            );
            classified.insert(key, candidates);
        }

        (expanded, classified)
    }

    fn store(&mut self, mut pair: Pair<E, V, M>) -> AvpId {
        pair.set_container(Some(self.id));
        self.avps.insert(pair)
    }

    fn place_canonical(
        &mut self,
        att_type: &E,
        pair: Pair<E, V, M>,
        mode: AddMode,
    ) -> Result<AvpId> {
        let id = self.store(pair);
        match self.canonical.get(att_type).copied() {
            None => {
                self.canonical.insert(att_type.clone(), id);
            }
            Some(head) if mode == AddMode::Next => {
                self.avps.add_ambiguity(head, id)?;
            }
            Some(head) => {
                self.avps.insert_ambiguity(id, head)?;
                self.canonical.insert(att_type.clone(), id);
            }
        }
        Ok(id)
    }

    /// Copies of `pairs` go, in order, to the end of the slot's chain.
    fn append_canonical(&mut self, att_type: &E, pairs: &[Pair<E, V, M>]) -> Result<Vec<AvpId>> {
        let mut head = self.canonical.get(att_type).copied();
        let mut ids = Vec::with_capacity(pairs.len());
        for pair in pairs {
            let id = self.store(pair.clone());
            match head {
                Some(head) => {
                    self.avps.add_ambiguity(head, id)?;
                }
                None => {
                    self.canonical.insert(att_type.clone(), id);
                    head = Some(id);
                }
            }
            ids.push(id);
        }
        Ok(ids)
    }

    fn append_unclassified(&mut self, key: String, pair: Pair<E, V, M>) -> Result<AvpId> {
        let id = self.store(pair);
        match self.unclassified.get(&key).copied() {
            Some(head) => {
                self.avps.add_ambiguity(head, id)?;
            }
            None => {
                self.unclassified.insert(key, id);
            }
        }
        Ok(id)
    }

    /// Attach `pair` to this container without storing it.
    pub fn adopt(&self, pair: &mut Pair<E, V, M>) {
        pair.set_container(Some(self.id));
    }

    // ------------------------------------------------------------------------
    // Classification cache
    // ------------------------------------------------------------------------

    fn note_classified(&mut self, att_type: &E, key: &str) {
        self.classified_texts
            .entry(att_type.clone())
            .or_default()
            .insert(key.to_string());
    }

    /// Cache copies of the candidates' slots, in rank order, under `key`.
    fn cache_classified(&mut self, key: &str, candidates: &[E]) -> Result<Option<AvpId>> {
        self.invalidate_text(key)?;
        let mut cached = None;
        for candidate in candidates {
            if let Some(&head) = self.canonical.get(candidate) {
                cached = Some(self.avps.copy_chain(head, cached)?);
            }
        }
        let Some(head) = cached else {
            return Ok(None);
        };

        let id = self.id;
        for member in self.avps.chain_members(head) {
            if let Some(pair) = self.avps.get_mut(member) {
                pair.set_container(Some(id));
            }
        }
        self.classified.insert(key.to_string(), head);
        tracing::trace!(container = %self.id, key, "cached classified chain");
        Ok(Some(head))
    }

    fn invalidate_text(&mut self, key: &str) -> Result<()> {
        if let Some(head) = self.classified.shift_remove(key) {
            self.drop_chain(head)?;
        }
        Ok(())
    }

    /// Drop every cached chain built from the slot for `att_type`.
    fn invalidate_type(&mut self, att_type: &E) -> Result<()> {
        let Some(keys) = self.classified_texts.get(att_type).cloned() else {
            return Ok(());
        };
        for key in &keys {
            self.invalidate_text(key)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Removal
    // ------------------------------------------------------------------------

    /// Remove the whole slot for a canonical type.
    pub fn remove_type(&mut self, att_type: &E) -> Result<bool> {
        if !att_type.is_canonical() {
            return Ok(false);
        }
        let Some(head) = self.canonical.shift_remove(att_type) else {
            return Ok(false);
        };
        self.drop_chain(head)?;
        self.invalidate_type(att_type)?;
        tracing::debug!(container = %self.id, att_type = %att_type, "removed attribute type");
        Ok(true)
    }

    /// Remove by free text: an unclassified entry, else every slot a cached
    /// classification names, else every slot the classifier names.
    pub fn remove_text(&mut self, text: &str) -> Result<bool> {
        if text.is_empty() || self.is_empty() {
            return Ok(false);
        }
        let key = self.options.normalize_key(text);
        if let Some(head) = self.unclassified.shift_remove(&key) {
            self.drop_chain(head)?;
            tracing::debug!(container = %self.id, key = %key, "removed unclassified attribute");
            return Ok(true);
        }

        if let Some(&head) = self.classified.get(&key) {
            let types: IndexSet<E> = self
                .avps
                .chain_members(head)
                .into_iter()
                .filter_map(|member| {
                    self.avps
                        .get(member)
                        .and_then(|pair| pair.canonical_type().cloned())
                })
                .collect();
            for att_type in &types {
                self.remove_type(att_type)?;
            }
            self.invalidate_text(&key)?;
            return Ok(true);
        }

        if self.canonical.is_empty() {
            return Ok(false);
        }
        let Some(classifier) = self.classifier.clone() else {
            return Ok(false);
        };
        let Some(classification) = classifier.classify(self.options.classifier_text(text)) else {
            return Ok(false);
        };
        let mut removed = false;
        for candidate in classification.candidates() {
            removed |= self.remove_type(candidate)?;
        }
        Ok(removed)
    }

    /// Remove the entry keyed like `pair`: its canonical slot, or failing
    /// that the unclassified entry under its free-text name.
    pub fn remove_matching(&mut self, pair: &Pair<E, V, M>) -> Result<bool> {
        if let Some(att_type) = pair.canonical_type() {
            if self.remove_type(att_type)? {
                return Ok(true);
            }
        }
        let Some(text) = pair.other_type().filter(|text| !text.is_empty()) else {
            return Ok(false);
        };
        let key = self.options.normalize_key(text);
        match self.unclassified.shift_remove(&key) {
            Some(head) => {
                self.drop_chain(head)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Remove every entry keyed like any reading in `id`'s chain.
    ///
    /// Readings of different types take their whole slots with them.
    pub fn remove_all(&mut self, id: AvpId) -> Result<bool> {
        let readings = self.readings(id);
        let mut removed = false;
        for reading in &readings {
            removed |= self.remove_matching(reading)?;
        }
        if self.avps.contains(id) {
            self.forget_chain(id)?;
        }
        Ok(removed)
    }

    /// Drop one stored reading, keeping the rest of its chain.
    ///
    /// A slot whose head goes is handed to the next member of the slot's type;
    /// other readings of the same input as the dropped one go with it. Returns
    /// a detached copy of the dropped reading.
    pub fn discard(&mut self, id: AvpId) -> Result<Option<Pair<E, V, M>>> {
        let Some(pair) = self.avps.get(id).cloned() else {
            return Ok(None);
        };

        let mut touched = Vec::new();
        if let Some(slot) = self.canonical_slot_of(id) {
            self.detach_canonical(&slot, id)?;
            touched.push(slot);
        } else if pair.canonical_type().is_some() {
            // a cached copy: its twins live in the canonical chains
            let slots: Vec<E> = self.canonical.keys().cloned().collect();
            for slot in slots {
                let target = self
                    .canonical
                    .get(&slot)
                    .copied()
                    .and_then(|head| self.locate(head, id, &pair));
                if let Some(target) = target {
                    self.detach_canonical(&slot, target)?;
                    self.release(target)?;
                    touched.push(slot);
                }
            }
        }

        match pair.canonical_type() {
            Some(att_type) if !touched.contains(att_type) => {
                let target = self
                    .canonical
                    .get(att_type)
                    .copied()
                    .and_then(|head| self.locate(head, id, &pair));
                if let Some(target) = target {
                    self.detach_canonical(att_type, target)?;
                    self.release(target)?;
                }
                touched.push(att_type.clone());
            }
            Some(_) => {}
            None => {
                if let Some(text) = pair.other_type().filter(|text| !text.is_empty()) {
                    let key = self.options.normalize_key(text);
                    let target = self
                        .unclassified
                        .get(&key)
                        .copied()
                        .and_then(|head| self.locate(head, id, &pair));
                    if let Some(target) = target {
                        detach_text(&mut self.unclassified, &mut self.avps, &key, target)?;
                        if target != id {
                            self.avps.discard(target)?;
                        }
                    }
                }
            }
        }

        for att_type in &touched {
            self.invalidate_type(att_type)?;
        }
        self.release(id)?;
        tracing::debug!(container = %self.id, entity = %id, "discarded attribute");
        Ok(Some(pair))
    }

    /// Keep `id` as the only reading of its input.
    ///
    /// Every entry keyed like a reading in `id`'s chain is removed and a copy
    /// of `id` is stored unambiguously. Returns the id of that copy; an
    /// unambiguous `id` is returned unchanged.
    pub fn resolve(&mut self, id: AvpId) -> Result<Option<AvpId>> {
        let Some(survivor) = self.avps.get(id).cloned() else {
            return Ok(None);
        };
        if self.avps.ambiguity_count(id) <= 1 {
            return Ok(Some(id));
        }

        let readings = self.readings(id);
        for reading in &readings {
            self.remove_matching(reading)?;
        }
        if self.avps.contains(id) {
            self.forget_chain(id)?;
        }

        let stored = self.add_alternatives(vec![survivor], AddMode::Front)?;
        let resolved = stored.first().copied();
        tracing::debug!(
            container = %self.id,
            entity = %id,
            resolved = ?resolved,
            dropped = readings.len().saturating_sub(1),
            "resolved ambiguity"
        );
        Ok(resolved)
    }

    fn readings(&self, id: AvpId) -> Vec<Pair<E, V, M>> {
        self.avps
            .chain_members(id)
            .into_iter()
            .filter_map(|member| self.avps.get(member).cloned())
            .collect()
    }

    fn drop_chain(&mut self, head: AvpId) -> Result<()> {
        for member in self.avps.chain_members(head) {
            self.avps.discard(member)?;
        }
        Ok(())
    }

    /// Drop `id`'s whole chain along with any map entry pointing into it.
    fn forget_chain(&mut self, id: AvpId) -> Result<()> {
        let members = self.avps.chain_members(id);
        let slots: Vec<E> = self
            .canonical
            .iter()
            .filter(|(_, head)| members.contains(head))
            .map(|(att_type, _)| att_type.clone())
            .collect();
        for att_type in &slots {
            self.canonical.shift_remove(att_type);
            self.invalidate_type(att_type)?;
        }
        self.classified.retain(|_, head| !members.contains(head));
        self.unclassified.retain(|_, head| !members.contains(head));
        for member in members {
            self.avps.discard(member)?;
        }
        Ok(())
    }

    /// Drop `id`, handing any slot it heads to the rest of its chain.
    fn release(&mut self, id: AvpId) -> Result<()> {
        if !self.avps.contains(id) {
            return Ok(());
        }
        let slot = self
            .canonical
            .iter()
            .find(|(_, head)| **head == id)
            .map(|(att_type, _)| att_type.clone());
        if let Some(slot) = slot {
            self.detach_canonical(&slot, id)?;
        }
        if let Some(key) = head_key(&self.classified, id) {
            detach_text(&mut self.classified, &mut self.avps, &key, id)?;
        }
        if let Some(key) = head_key(&self.unclassified, id) {
            detach_text(&mut self.unclassified, &mut self.avps, &key, id)?;
        }
        if self.avps.contains(id) {
            self.avps.discard(id)?;
        }
        Ok(())
    }

    /// Take `target` out of a canonical slot's chain without dropping it.
    fn detach_canonical(&mut self, slot: &E, target: AvpId) -> Result<()> {
        let Some(&head) = self.canonical.get(slot) else {
            return Ok(());
        };
        let members = self.avps.chain_members(head);
        let Some(position) = members.iter().position(|member| *member == target) else {
            return Ok(());
        };

        let mut companions = Vec::new();
        let mut successor = None;
        if self.has_type(target, slot) {
            for &member in &members[position + 1..] {
                if self.has_type(member, slot) {
                    successor = Some(member);
                    break;
                }
                companions.push(member);
            }
        }

        self.avps.remove(target)?;
        for companion in companions {
            self.avps.discard(companion)?;
        }
        if target == head {
            match successor {
                Some(next) => {
                    self.canonical.insert(slot.clone(), next);
                }
                None => {
                    self.canonical.shift_remove(slot);
                    for &member in &members[1..] {
                        if self.avps.contains(member) {
                            self.avps.discard(member)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn has_type(&self, id: AvpId, att_type: &E) -> bool {
        self.avps.get(id).and_then(AttValPair::att_type) == Some(att_type)
    }

    /// The canonical slot whose chain holds `id`.
    fn canonical_slot_of(&self, id: AvpId) -> Option<E> {
        let chain = self.avps.chain_of(id);
        self.canonical
            .iter()
            .find(|(_, head)| {
                **head == id || (chain.is_some() && self.avps.chain_of(**head) == chain)
            })
            .map(|(att_type, _)| att_type.clone())
    }

    /// `id` itself when it sits in `head`'s chain, else the first member that
    /// is the same entry as `pair`.
    fn locate(&self, head: AvpId, id: AvpId, pair: &Pair<E, V, M>) -> Option<AvpId> {
        let members = self.avps.chain_members(head);
        if members.contains(&id) {
            return Some(id);
        }
        members.into_iter().find(|member| {
            self.avps
                .get(*member)
                .map_or(false, |candidate| candidate.same_entry(pair))
        })
    }

    // ------------------------------------------------------------------------
    // Metadata
    // ------------------------------------------------------------------------

    pub fn metadata(&self) -> Option<&M> {
        self.metadata.as_ref()
    }

    pub fn has_metadata(&self) -> bool {
        self.metadata.is_some()
    }

    /// Attach metadata, returning what was there before.
    pub fn set_metadata(&mut self, metadata: M) -> Option<M> {
        self.metadata.replace(metadata)
    }

    pub fn take_metadata(&mut self) -> Option<M> {
        self.metadata.take()
    }
}

fn head_key(map: &IndexMap<String, AvpId>, id: AvpId) -> Option<String> {
    map.iter()
        .find(|(_, head)| **head == id)
        .map(|(key, _)| key.clone())
}

/// Take `target` out of a free-text slot; a removed head hands the slot to
/// the next member, or empties it.
fn detach_text<T: AmbiguousEntity>(
    map: &mut IndexMap<String, AvpId>,
    avps: &mut AmbiguityArena<T>,
    key: &str,
    target: AvpId,
) -> Result<()> {
    let Some(&head) = map.get(key) else {
        return Ok(());
    };
    if head == target {
        match avps.chain_members(head).get(1).copied() {
            Some(next) => {
                map.insert(key.to_string(), next);
            }
            None => {
                map.shift_remove(key);
            }
        }
    }
    avps.remove(target)
}

// ============================================================================
// Container-level ambiguity
// ============================================================================

/// Containers match when they share a classifier instance and hold the same
/// keys with pairwise-matching alternatives.
impl<E, V, M> AmbiguousEntity for AvpContainer<E, V, M>
where
    E: CanonicalType,
    V: Clone + Eq + Hash,
    M: Clone,
{
    fn matches(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        let same_classifier = match (&self.classifier, &other.classifier) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const (),
            _ => false,
        };
        same_classifier
            && slots_match(&self.canonical, &self.avps, &other.canonical, &other.avps)
            && slots_match(&self.unclassified, &self.avps, &other.unclassified, &other.avps)
    }
}

fn slots_match<K: Hash + Eq, T: AmbiguousEntity>(
    mine: &IndexMap<K, AvpId>,
    my_avps: &AmbiguityArena<T>,
    theirs: &IndexMap<K, AvpId>,
    their_avps: &AmbiguityArena<T>,
) -> bool {
    mine.len() == theirs.len()
        && mine.iter().all(|(key, head)| {
            let Some(other) = theirs.get(key) else {
                return false;
            };
            let a = my_avps.alternatives(*head);
            let b = their_avps.alternatives(*other);
            a.len() == b.len()
                && a.iter().zip(&b).all(|(x, y)| {
                    match (my_avps.get(*x), their_avps.get(*y)) {
                        (Some(x), Some(y)) => x.matches(y),
                        _ => false,
                    }
                })
        })
}

/// `[MAKE=honda; MODEL=sonata|STYLE=sonata]`, with `+` when metadata is set.
impl<E, V, M> fmt::Display for AvpContainer<E, V, M>
where
    E: CanonicalType,
    V: Clone + Eq + Hash + fmt::Display,
    M: Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, head) in self.heads().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            for (j, id) in self.avps.alternatives(head).into_iter().enumerate() {
                if j > 0 {
                    f.write_str("|")?;
                }
                if let Some(pair) = self.avps.get(id) {
                    write!(f, "{pair}")?;
                }
            }
        }
        f.write_str("]")?;
        if self.metadata.is_some() {
            f.write_str("+")?;
        }
        Ok(())
    }
}
