//! Entity association PDR (DSP0248 28.17)

use super::{decode_entity, encode_entity, encode_record, typed_body, PdrType, RAW_ENTITY_LEN};
use crate::error::PdrError;
use crate::types::{Entity, RecordHandle};

/// container id (2) + association type (1) + container entity (6) + child count (1)
const FIXED_BODY_LEN: usize = 10;

/// Physical or logical containment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AssociationType {
    Physical,
    Logical,
}

impl AssociationType {
    pub fn from_u8(value: u8) -> Self {
        if value == 1 {
            AssociationType::Logical
        } else {
            AssociationType::Physical
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            AssociationType::Physical => 0,
            AssociationType::Logical => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityAssociationPdr {
    pub record_handle: RecordHandle,
    pub container_id: u16,
    pub association_type: AssociationType,
    pub container: Entity,
    pub children: Vec<Entity>,
}

impl EntityAssociationPdr {
    pub fn decode(bytes: &[u8]) -> Result<Self, PdrError> {
        let (header, body) = typed_body(bytes, PdrType::EntityAssociation)?;
        if body.len() < FIXED_BODY_LEN {
            return Err(PdrError::TooShort {
                needed: super::PDR_HEADER_LEN + FIXED_BODY_LEN,
                actual: bytes.len(),
            });
        }

        let container_id = u16::from_le_bytes([body[0], body[1]]);
        let association_type = AssociationType::from_u8(body[2]);
        let container = decode_entity(&body[3..]).ok_or(PdrError::TooShort {
            needed: 3 + RAW_ENTITY_LEN,
            actual: body.len(),
        })?;
        let declared = body[9] as usize;

        let child_bytes = &body[FIXED_BODY_LEN..];
        if child_bytes.len() != declared * RAW_ENTITY_LEN {
            return Err(PdrError::ChildCountMismatch {
                declared,
                body_len: body.len(),
            });
        }

        let children = child_bytes
            .chunks_exact(RAW_ENTITY_LEN)
            .filter_map(decode_entity)
            .collect();

        Ok(Self {
            record_handle: header.record_handle,
            container_id,
            association_type,
            container,
            children,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(FIXED_BODY_LEN + self.children.len() * RAW_ENTITY_LEN);
        body.extend_from_slice(&self.container_id.to_le_bytes());
        body.push(self.association_type.as_u8());
        encode_entity(&self.container, &mut body);
        body.push(self.children.len() as u8);
        for child in &self.children {
            encode_entity(child, &mut body);
        }
        encode_record(PdrType::EntityAssociation, self.record_handle, &body)
    }
}
