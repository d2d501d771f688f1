//! Entity Association Tree
//!
//! Arena of entity nodes. Nodes are addressed by stable [`NodeId`]s and link
//! to each other by index, so the whole tree can be cloned as a snapshot.
//!
//! Container ids are structural: every child of one parent carries the
//! parent's child container id, root-level nodes carry container id 0, and
//! fresh ids are drawn from a tree-wide counter that never hands out an id
//! already in use.
//!
//! Host-reported nodes also remember the entity exactly as the host numbered
//! it, so later host records can name them by the host's own container ids.

pub mod path;

use crate::error::PdrError;
use crate::pdr::entity_association::{AssociationType, EntityAssociationPdr};
use crate::types::{Entity, EntityType, RecordHandle, ENTITY_INSTANCE_AUTO};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Index of a node inside one [`EntityTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Where a node's entity was first reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Bmc,
    Host,
}

#[derive(Debug, Clone)]
pub struct EntityNode {
    pub entity: Entity,
    /// Association between this node and its parent
    pub association: AssociationType,
    pub origin: Origin,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    child_container_id: Option<u16>,
    host_entity: Option<Entity>,
}

impl EntityNode {
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Container id shared by this node's children, once it has any
    pub fn child_container_id(&self) -> Option<u16> {
        self.child_container_id
    }

    /// The entity as the host reported it, host container id included
    pub fn host_entity(&self) -> Option<Entity> {
        self.host_entity
    }
}

#[derive(Debug, Clone, Default)]
pub struct EntityTree {
    nodes: Vec<EntityNode>,
    roots: Vec<NodeId>,
    last_container_id: u16,
    container_ids: BTreeSet<u16>,
    /// Host-numbered entity → node; entries are never replaced
    host_index: BTreeMap<Entity, NodeId>,
}

impl EntityTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `entity` under `parent` (or at root level).
    ///
    /// An instance number of `ENTITY_INSTANCE_AUTO` picks the next free
    /// instance among same-type siblings. The entity's container id is
    /// ignored and replaced by the structural one. Fails only when the
    /// parent needs a container id and none is left.
    pub fn add(
        &mut self,
        entity: Entity,
        parent: Option<NodeId>,
        association: AssociationType,
        origin: Origin,
    ) -> Result<NodeId, PdrError> {
        let siblings: &[NodeId] = match parent {
            Some(p) => &self.nodes[p.0].children,
            None => &self.roots,
        };
        let instance = if entity.instance == ENTITY_INSTANCE_AUTO {
            siblings
                .iter()
                .map(|id| self.nodes[id.0].entity)
                .filter(|e| e.entity_type == entity.entity_type)
                .map(|e| e.instance)
                .max()
                .map_or(1, |max| max.saturating_add(1))
        } else {
            entity.instance
        };

        let container_id = match parent {
            Some(p) => self.ensure_child_container_id(p)?,
            None => 0,
        };

        let id = NodeId(self.nodes.len());
        self.nodes.push(EntityNode {
            entity: Entity::new(entity.entity_type, instance, container_id),
            association,
            origin,
            parent,
            children: Vec::new(),
            child_container_id: None,
            host_entity: None,
        });
        match parent {
            Some(p) => self.nodes[p.0].children.push(id),
            None => self.roots.push(id),
        }
        Ok(id)
    }

    /// Remember that the host calls `id` by `entity`. The first node
    /// recorded for a host identity keeps it. Returns false if the identity
    /// already belongs to a node.
    pub fn record_host_entity(&mut self, id: NodeId, entity: Entity) -> bool {
        let Some(node) = self.nodes.get_mut(id.0) else {
            return false;
        };
        match self.host_index.entry(entity) {
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(id);
                node.host_entity.get_or_insert(entity);
                true
            }
            std::collections::btree_map::Entry::Occupied(_) => false,
        }
    }

    fn ensure_child_container_id(&mut self, node: NodeId) -> Result<u16, PdrError> {
        if let Some(id) = self.nodes[node.0].child_container_id {
            return Ok(id);
        }
        let id = self.next_container_id()?;
        self.nodes[node.0].child_container_id = Some(id);
        Ok(id)
    }

    /// Next unused id after the last one handed out, wrapping past
    /// `u16::MAX`. 0 belongs to root-level entities.
    fn next_container_id(&mut self) -> Result<u16, PdrError> {
        let mut candidate = self.last_container_id;
        for _ in 0..u16::MAX {
            candidate = candidate.checked_add(1).unwrap_or(1);
            if self.container_ids.insert(candidate) {
                self.last_container_id = candidate;
                return Ok(candidate);
            }
        }
        Err(PdrError::ContainerIdsExhausted)
    }

    /// Recompute container ids for every node below `from`, top-down.
    ///
    /// `from` keeps its own container id. Nodes that already own a child
    /// container id keep it; nodes that gained their first children get a
    /// fresh one. Returns the number of nodes whose container id changed.
    pub fn renumber_from(&mut self, from: NodeId) -> Result<usize, PdrError> {
        let mut changed = 0;
        let mut queue = VecDeque::from([from]);
        while let Some(node) = queue.pop_front() {
            if self.nodes[node.0].children.is_empty() {
                continue;
            }
            let container_id = self.ensure_child_container_id(node)?;
            let children = self.nodes[node.0].children.clone();
            for child in children {
                let entity = &mut self.nodes[child.0].entity;
                if entity.container_id != container_id {
                    entity.container_id = container_id;
                    changed += 1;
                }
                queue.push_back(child);
            }
        }
        Ok(changed)
    }

    pub fn node(&self, id: NodeId) -> Option<&EntityNode> {
        self.nodes.get(id.0)
    }

    pub fn entity(&self, id: NodeId) -> Option<Entity> {
        self.nodes.get(id.0).map(|n| n.entity)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.0).and_then(|n| n.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(id.0)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Breadth-first traversal from the roots.
    pub fn walk(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut queue: VecDeque<NodeId> = self.roots.iter().copied().collect();
        while let Some(node) = queue.pop_front() {
            order.push(node);
            queue.extend(self.nodes[node.0].children.iter().copied());
        }
        order
    }

    /// Node the host reported as exactly `entity`, in its own numbering.
    pub fn find_host_entity(&self, entity: &Entity) -> Option<NodeId> {
        self.host_index.get(entity).copied()
    }

    /// Exact match on type, instance and container id.
    pub fn find(&self, entity: &Entity) -> Option<NodeId> {
        self.walk()
            .into_iter()
            .find(|id| self.nodes[id.0].entity == *entity)
    }

    /// First node (breadth-first) with the given type and instance.
    pub fn find_by_identity(&self, entity_type: EntityType, instance: u16) -> Option<NodeId> {
        self.walk().into_iter().find(|id| {
            let e = self.nodes[id.0].entity;
            e.entity_type == entity_type && e.instance == instance
        })
    }

    /// First node (breadth-first) of the given type.
    pub fn find_first_of_type(&self, entity_type: EntityType) -> Option<NodeId> {
        self.walk()
            .into_iter()
            .find(|id| self.nodes[id.0].entity.entity_type == entity_type)
    }

    /// Child of `parent` with the given type and instance.
    pub fn find_child(&self, parent: NodeId, entity_type: EntityType, instance: u16) -> Option<NodeId> {
        self.children(parent).iter().copied().find(|id| {
            let e = self.nodes[id.0].entity;
            e.entity_type == entity_type && e.instance == instance
        })
    }

    /// Ancestors of `id`, nearest first.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut chain = Vec::new();
        let mut current = self.parent(id);
        while let Some(node) = current {
            chain.push(node);
            current = self.parent(node);
        }
        chain
    }

    pub fn depth(&self, id: NodeId) -> usize {
        self.ancestors(id).len()
    }

    /// Check the container-id invariants over the whole tree: root-level
    /// nodes carry 0, siblings share their parent's child container id and
    /// no two parents share one.
    pub fn container_ids_consistent(&self) -> bool {
        let mut seen = std::collections::HashSet::new();
        if self.roots.iter().any(|r| self.nodes[r.0].entity.container_id != 0) {
            return false;
        }
        for node in &self.nodes {
            if node.children.is_empty() {
                continue;
            }
            let Some(container_id) = node.child_container_id else {
                return false;
            };
            if container_id == 0 || !seen.insert(container_id) {
                return false;
            }
            if node
                .children
                .iter()
                .any(|c| self.nodes[c.0].entity.container_id != container_id)
            {
                return false;
            }
        }
        true
    }

    /// Entity association PDRs describing `id` and its children, one per
    /// association type present. Empty for leaf nodes.
    pub fn association_pdrs(&self, id: NodeId, record_handle: RecordHandle) -> Vec<EntityAssociationPdr> {
        let Some(node) = self.nodes.get(id.0) else {
            return Vec::new();
        };
        let Some(container_id) = node.child_container_id else {
            return Vec::new();
        };

        [AssociationType::Physical, AssociationType::Logical]
            .into_iter()
            .filter_map(|association_type| {
                let children: Vec<Entity> = node
                    .children
                    .iter()
                    .map(|c| &self.nodes[c.0])
                    .filter(|c| c.association == association_type)
                    .map(|c| c.entity)
                    .collect();
                (!children.is_empty()).then(|| EntityAssociationPdr {
                    record_handle,
                    container_id,
                    association_type,
                    container: node.entity,
                    children,
                })
            })
            .collect()
    }
}
