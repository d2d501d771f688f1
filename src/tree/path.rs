//! Inventory object paths for tree nodes

use super::{EntityTree, NodeId};
use crate::types::EntityType;
use std::collections::BTreeMap;

/// Marks a logical entity type (DSP0249)
pub const LOGICAL_ENTITY_BIT: EntityType = 0x8000;

/// Default path segment names for well-known entity types
pub fn default_entity_names() -> BTreeMap<EntityType, String> {
    [
        (45, "chassis"),
        (45 | LOGICAL_ENTITY_BIT, "system"),
        (64, "motherboard"),
        (66, "dimm"),
        (67, "dcm"),
        (120, "powersupply"),
        (135, "cpu"),
        (135 | LOGICAL_ENTITY_BIT, "core"),
    ]
    .into_iter()
    .map(|(ty, name)| (ty, name.to_string()))
    .collect()
}

/// Builds `<root>/<name><instance>/...` paths from tree ancestry.
#[derive(Debug, Clone)]
pub struct ObjectPathBuilder {
    root: String,
    names: BTreeMap<EntityType, String>,
}

impl ObjectPathBuilder {
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into().trim_end_matches('/').to_string(),
            names: default_entity_names(),
        }
    }

    /// Add or override segment names.
    pub fn with_names(mut self, names: &BTreeMap<EntityType, String>) -> Self {
        self.names
            .extend(names.iter().map(|(ty, name)| (*ty, name.clone())));
        self
    }

    fn segment(&self, entity_type: EntityType, instance: u16) -> String {
        match self.names.get(&entity_type) {
            Some(name) => format!("{}{}", name, instance),
            None => format!("entity{}_{}", entity_type, instance),
        }
    }

    pub fn path(&self, tree: &EntityTree, id: NodeId) -> Option<String> {
        let entity = tree.entity(id)?;
        let mut segments: Vec<String> = tree
            .ancestors(id)
            .into_iter()
            .rev()
            .filter_map(|a| tree.entity(a))
            .map(|e| self.segment(e.entity_type, e.instance))
            .collect();
        segments.push(self.segment(entity.entity_type, entity.instance));
        Some(format!("{}/{}", self.root, segments.join("/")))
    }
}
