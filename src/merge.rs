//! Entity Association Merge
//!
//! Folds host-reported entity association PDRs into the BMC's entity tree.
//! Each record's container entity is identified with a merge point in the
//! tree; the record's children are grafted under it and container ids are
//! renumbered from there down.
//!
//! Merge points are resolved most specific first: the node the host already
//! reported under the same identity, then a configured parent (first merge
//! only), then a node with the same type and instance, and only then the
//! parent map's default for the type.

use crate::error::PdrError;
use crate::pdr::EntityAssociationPdr;
use crate::tree::{EntityTree, NodeId, Origin};
use crate::types::{Entity, EntityType, RecordHandle};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// Entity type → merge point. Entries are never replaced or removed, which
/// keeps the object paths of host entities stable across refresh cycles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParentMap {
    map: BTreeMap<EntityType, NodeId>,
}

impl ParentMap {
    pub fn get(&self, entity_type: EntityType) -> Option<NodeId> {
        self.map.get(&entity_type).copied()
    }

    /// Register a merge point. Returns false if the type was already mapped;
    /// the existing entry is kept.
    pub fn register(&mut self, entity_type: EntityType, node: NodeId) -> bool {
        match self.map.entry(entity_type) {
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(node);
                true
            }
            std::collections::btree_map::Entry::Occupied(_) => false,
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityType, NodeId)> + '_ {
        self.map.iter().map(|(ty, node)| (*ty, *node))
    }
}

/// Where host containers of a type attach before any merge has happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentRule {
    pub parent_type: EntityType,
    pub parent_instance: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Record carried no children
    Empty,
    Merged {
        merge_point: NodeId,
        grafted: Vec<NodeId>,
        renumbered: usize,
    },
}

/// Result of merging one cycle's entity association records
#[derive(Debug, Clone, Default)]
pub struct MergeReport {
    /// Distinct merge points touched, in first-touch order
    pub merge_points: Vec<NodeId>,
    pub grafted: usize,
    pub empty: usize,
    pub skipped: Vec<(RecordHandle, PdrError)>,
}

impl MergeReport {
    pub fn merged_any(&self) -> bool {
        !self.merge_points.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct EntityMerger {
    parents: ParentMap,
    rules: BTreeMap<EntityType, ParentRule>,
    host_parents_attached: bool,
}

impl EntityMerger {
    pub fn new(rules: BTreeMap<EntityType, ParentRule>) -> Self {
        Self {
            parents: ParentMap::default(),
            rules,
            host_parents_attached: false,
        }
    }

    pub fn parents(&self) -> &ParentMap {
        &self.parents
    }

    /// Set once the first host record has been merged
    pub fn host_parents_attached(&self) -> bool {
        self.host_parents_attached
    }

    /// Merge records in the order given. Malformed records are skipped and
    /// reported; they never stop the remaining records from merging.
    pub fn merge_all(&mut self, tree: &mut EntityTree, records: &[Vec<u8>]) -> MergeReport {
        let mut report = MergeReport::default();
        let mut seen = BTreeSet::new();

        for record in records {
            match self.merge(tree, record) {
                Ok(MergeOutcome::Empty) => report.empty += 1,
                Ok(MergeOutcome::Merged {
                    merge_point,
                    grafted,
                    ..
                }) => {
                    report.grafted += grafted.len();
                    if seen.insert(merge_point) {
                        report.merge_points.push(merge_point);
                    }
                }
                Err(e) => {
                    let handle = crate::pdr::PdrHeader::parse(record)
                        .map(|h| h.record_handle)
                        .unwrap_or_default();
                    warn!(record_handle = handle, error = %e, "Skipping entity association PDR");
                    report.skipped.push((handle, e));
                }
            }
        }
        report
    }

    /// Merge a single entity association record.
    pub fn merge(&mut self, tree: &mut EntityTree, record: &[u8]) -> Result<MergeOutcome, PdrError> {
        let pdr = EntityAssociationPdr::decode(record)?;
        if pdr.children.is_empty() {
            debug!(record_handle = pdr.record_handle, "Entity association PDR has no children");
            return Ok(MergeOutcome::Empty);
        }

        let merge_point = self.resolve_merge_point(tree, &pdr)?;
        tree.record_host_entity(merge_point, pdr.container);

        let mut grafted = Vec::new();
        for child in &pdr.children {
            let node = match tree.find_child(merge_point, child.entity_type, child.instance) {
                Some(existing) => existing,
                None => {
                    let node = tree.add(*child, Some(merge_point), pdr.association_type, Origin::Host)?;
                    grafted.push(node);
                    node
                }
            };
            tree.record_host_entity(node, *child);
        }

        let renumbered = tree.renumber_from(merge_point)?;

        if !self.host_parents_attached {
            info!(
                record_handle = pdr.record_handle,
                parents = self.parents.len(),
                "Host entity parents attached"
            );
            self.host_parents_attached = true;
        }

        debug!(
            record_handle = pdr.record_handle,
            merge_point = merge_point.index(),
            grafted = grafted.len(),
            renumbered,
            "Merged entity association PDR"
        );

        Ok(MergeOutcome::Merged {
            merge_point,
            grafted,
            renumbered,
        })
    }

    fn resolve_merge_point(
        &mut self,
        tree: &mut EntityTree,
        pdr: &EntityAssociationPdr,
    ) -> Result<NodeId, PdrError> {
        let container = pdr.container;
        let entity_type = container.entity_type;

        let node = if let Some(node) = tree.find_host_entity(&container) {
            node
        } else if let Some(node) = self.from_rule(tree, pdr)? {
            node
        } else if let Some(node) = tree
            .find_by_identity(entity_type, container.instance)
            .or_else(|| self.parents.get(entity_type))
            .or_else(|| tree.find_first_of_type(entity_type))
        {
            node
        } else {
            let root = tree.roots().first().copied();
            debug!(entity_type, "Synthesizing merge point under tree root");
            tree.add(
                Entity::new(entity_type, container.instance, 0),
                root,
                pdr.association_type,
                Origin::Host,
            )?
        };

        self.parents.register(entity_type, node);
        Ok(node)
    }

    /// Configured parents only shape the first merge; afterwards the
    /// established parent map is reused as is.
    fn from_rule(
        &self,
        tree: &mut EntityTree,
        pdr: &EntityAssociationPdr,
    ) -> Result<Option<NodeId>, PdrError> {
        if self.host_parents_attached {
            return Ok(None);
        }
        let container = pdr.container;
        let Some(parent) = self
            .rules
            .get(&container.entity_type)
            .and_then(|rule| tree.find_by_identity(rule.parent_type, rule.parent_instance))
        else {
            return Ok(None);
        };
        if let Some(existing) = tree.find_child(parent, container.entity_type, container.instance) {
            return Ok(Some(existing));
        }
        tree.add(
            Entity::new(container.entity_type, container.instance, 0),
            Some(parent),
            pdr.association_type,
            Origin::Host,
        )
        .map(Some)
    }
}
