//! FRU Record Sets
//!
//! Maps FRU record set identifiers (RSIs) to their owning entities and
//! decodes the FRU record table the host returns on request (DSP0257).

use crate::error::{LookupError, PdrError};
use crate::pdr::FruRecordSetPdr;
use crate::types::{Entity, TerminusHandle};
use serde::Serialize;
use zerocopy::byteorder::little_endian::U16;
use zerocopy::FromBytes;
use zerocopy_derive::{FromBytes as DeriveFromBytes, Immutable, KnownLayout, Unaligned};

/// One RSI → entity association
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FruRecordDataFormat {
    pub terminus_handle: TerminusHandle,
    pub fru_rsi: u16,
    pub entity: Entity,
}

impl From<&FruRecordSetPdr> for FruRecordDataFormat {
    fn from(pdr: &FruRecordSetPdr) -> Self {
        Self {
            terminus_handle: pdr.terminus_handle,
            fru_rsi: pdr.fru_rsi,
            entity: pdr.entity,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FruRecordTable {
    entries: Vec<FruRecordDataFormat>,
}

impl FruRecordTable {
    pub fn entries(&self) -> &[FruRecordDataFormat] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// RSI owning `entity`, matched on type and instance
    pub fn rsi_for(&self, entity: &Entity) -> Result<u16, LookupError> {
        self.entries
            .iter()
            .find(|e| e.entity.same_identity(entity))
            .map(|e| e.fru_rsi)
            .ok_or(LookupError::FruRecordNotFound(*entity))
    }

    /// Entity owning `rsi`
    pub fn entity_for(&self, rsi: u16) -> Option<Entity> {
        self.entries
            .iter()
            .find(|e| e.fru_rsi == rsi)
            .map(|e| e.entity)
    }
}

pub fn parse_fru_record_set_pdrs(pdrs: &[FruRecordSetPdr]) -> FruRecordTable {
    FruRecordTable {
        entries: pdrs.iter().map(FruRecordDataFormat::from).collect(),
    }
}

/// RSI of the FRU record set owning `entity`.
///
/// Container ids are ignored: the host numbers them independently of the
/// merged tree.
pub fn get_rsi(pdrs: &[FruRecordSetPdr], entity: &Entity) -> Result<u16, LookupError> {
    pdrs.iter()
        .find(|pdr| pdr.entity.same_identity(entity))
        .map(|pdr| pdr.fru_rsi)
        .ok_or(LookupError::FruRecordNotFound(*entity))
}

/// GetFRURecordTableMetadata response fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, serde::Deserialize)]
pub struct FruTableMetadata {
    pub major_version: u8,
    pub minor_version: u8,
    pub max_table_size: u32,
    pub table_length: u32,
    pub total_record_set_identifiers: u16,
    pub total_table_records: u16,
    pub checksum: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FruField {
    pub field_type: u8,
    pub value: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FruRecord {
    pub record_set_id: u16,
    pub record_type: u8,
    pub encoding: u8,
    pub fields: Vec<FruField>,
}

/// A decoded FRU record with the entity its RSI resolves to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OwnedFruRecord {
    pub entity: Option<Entity>,
    pub record: FruRecord,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, DeriveFromBytes, Immutable, KnownLayout, Unaligned)]
struct RawFruRecordHeader {
    record_set_id: U16,
    record_type: u8,
    num_fields: u8,
    encoding: u8,
}

const RECORD_HEADER_LEN: usize = 5;

/// Decode up to `record_count` records from a FRU record table. Trailing
/// pad bytes and checksum are left unread.
pub fn decode_fru_table(table: &[u8], record_count: u16) -> Result<Vec<FruRecord>, PdrError> {
    let mut records = Vec::with_capacity(record_count as usize);
    let mut offset = 0;

    for _ in 0..record_count {
        let (header, _) = RawFruRecordHeader::read_from_prefix(&table[offset..])
            .map_err(|_| PdrError::MalformedFruTable { offset })?;
        offset += RECORD_HEADER_LEN;

        let mut fields = Vec::with_capacity(header.num_fields as usize);
        for _ in 0..header.num_fields {
            let [field_type, len] = table
                .get(offset..offset + 2)
                .and_then(|b| <[u8; 2]>::try_from(b).ok())
                .ok_or(PdrError::MalformedFruTable { offset })?;
            let value = table
                .get(offset + 2..offset + 2 + len as usize)
                .ok_or(PdrError::MalformedFruTable { offset })?;
            fields.push(FruField {
                field_type,
                value: value.to_vec(),
            });
            offset += 2 + len as usize;
        }

        records.push(FruRecord {
            record_set_id: header.record_set_id.get(),
            record_type: header.record_type,
            encoding: header.encoding,
            fields,
        });
    }
    Ok(records)
}

/// Attach decoded records to the entities named by the RSI table.
pub fn associate(records: Vec<FruRecord>, table: &FruRecordTable) -> Vec<OwnedFruRecord> {
    records
        .into_iter()
        .map(|record| OwnedFruRecord {
            entity: table.entity_for(record.record_set_id),
            record,
        })
        .collect()
}
