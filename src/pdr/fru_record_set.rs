//! FRU record set PDR (DSP0248 28.18)

use super::{encode_record, typed_body, PdrType, RawEntity};
use crate::error::PdrError;
use crate::types::{Entity, RecordHandle, TerminusHandle};
use zerocopy::byteorder::little_endian::U16;
use zerocopy::{FromBytes, IntoBytes};
use zerocopy_derive::{
    FromBytes as DeriveFromBytes, Immutable, IntoBytes as DeriveIntoBytes, KnownLayout, Unaligned,
};

#[repr(C)]
#[derive(Debug, Clone, Copy, DeriveFromBytes, DeriveIntoBytes, Immutable, KnownLayout, Unaligned)]
struct RawFruRecordSet {
    terminus_handle: U16,
    fru_rsi: U16,
    entity: RawEntity,
}

const BODY_LEN: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FruRecordSetPdr {
    pub record_handle: RecordHandle,
    pub terminus_handle: TerminusHandle,
    pub fru_rsi: u16,
    pub entity: Entity,
}

impl FruRecordSetPdr {
    pub fn decode(bytes: &[u8]) -> Result<Self, PdrError> {
        let (header, body) = typed_body(bytes, PdrType::FruRecordSet)?;
        let (raw, _) = RawFruRecordSet::read_from_prefix(body).map_err(|_| PdrError::TooShort {
            needed: super::PDR_HEADER_LEN + BODY_LEN,
            actual: bytes.len(),
        })?;
        Ok(Self {
            record_handle: header.record_handle,
            terminus_handle: raw.terminus_handle.get(),
            fru_rsi: raw.fru_rsi.get(),
            entity: Entity::from(raw.entity),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let raw = RawFruRecordSet {
            terminus_handle: U16::new(self.terminus_handle),
            fru_rsi: U16::new(self.fru_rsi),
            entity: RawEntity::from(&self.entity),
        };
        encode_record(PdrType::FruRecordSet, self.record_handle, raw.as_bytes())
    }
}
