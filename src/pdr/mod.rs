//! Platform Descriptor Records
//!
//! Fixed-layout views over the DSP0248 record formats the host exchange
//! consumes. Every record starts with the common 10-byte header; the typed
//! modules decode the body that follows it.

pub mod entity_association;
pub mod fru_record_set;
pub mod state_sensor;
pub mod terminus_locator;

use crate::error::PdrError;
use crate::types::{Entity, RecordHandle};
use zerocopy::byteorder::little_endian::{U16, U32};
use zerocopy::{FromBytes, IntoBytes};
use zerocopy_derive::{
    FromBytes as DeriveFromBytes, Immutable, IntoBytes as DeriveIntoBytes, KnownLayout, Unaligned,
};

pub use entity_association::EntityAssociationPdr;
pub use fru_record_set::FruRecordSetPdr;
pub use state_sensor::{CompositeSensorStates, StateSensorPdr};
pub use terminus_locator::{TerminusLocatorPdr, TlInfo};

/// Size of the common PDR header
pub const PDR_HEADER_LEN: usize = 10;

/// Header version emitted for records produced on the BMC
pub const PDR_HEADER_VERSION: u8 = 1;

/// PDR type codes (DSP0248 table 76)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum PdrType {
    TerminusLocator = 1,
    NumericSensor = 2,
    NumericSensorInit = 3,
    StateSensor = 4,
    StateSensorInit = 5,
    SensorAuxiliaryNames = 6,
    OemUnit = 7,
    OemStateSet = 8,
    NumericEffecter = 9,
    NumericEffecterInit = 10,
    StateEffecter = 11,
    StateEffecterInit = 12,
    EffecterAuxiliaryNames = 13,
    EffecterOemSemantic = 14,
    EntityAssociation = 15,
    EntityAuxiliaryNames = 16,
    OemEntityId = 17,
    InterruptAssociation = 18,
    EventLog = 19,
    FruRecordSet = 20,
    CompactNumericSensor = 21,
    OemDevice = 126,
    Oem = 127,
}

impl PdrType {
    pub fn from_u8(value: u8) -> Option<Self> {
        use PdrType::*;
        let ty = match value {
            1 => TerminusLocator,
            2 => NumericSensor,
            3 => NumericSensorInit,
            4 => StateSensor,
            5 => StateSensorInit,
            6 => SensorAuxiliaryNames,
            7 => OemUnit,
            8 => OemStateSet,
            9 => NumericEffecter,
            10 => NumericEffecterInit,
            11 => StateEffecter,
            12 => StateEffecterInit,
            13 => EffecterAuxiliaryNames,
            14 => EffecterOemSemantic,
            15 => EntityAssociation,
            16 => EntityAuxiliaryNames,
            17 => OemEntityId,
            18 => InterruptAssociation,
            19 => EventLog,
            20 => FruRecordSet,
            21 => CompactNumericSensor,
            126 => OemDevice,
            127 => Oem,
            _ => return None,
        };
        Some(ty)
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Wire layout of the common header
#[repr(C)]
#[derive(Debug, Clone, Copy, DeriveFromBytes, DeriveIntoBytes, Immutable, KnownLayout, Unaligned)]
pub(crate) struct RawPdrHeader {
    record_handle: U32,
    version: u8,
    pdr_type: u8,
    record_change_num: U16,
    length: U16,
}

/// Wire layout of a PLDM entity (type, instance, container)
#[repr(C)]
#[derive(Debug, Clone, Copy, DeriveFromBytes, DeriveIntoBytes, Immutable, KnownLayout, Unaligned)]
pub(crate) struct RawEntity {
    entity_type: U16,
    instance: U16,
    container_id: U16,
}

pub(crate) const RAW_ENTITY_LEN: usize = 6;

impl From<RawEntity> for Entity {
    fn from(raw: RawEntity) -> Self {
        Entity::new(raw.entity_type.get(), raw.instance.get(), raw.container_id.get())
    }
}

impl From<&Entity> for RawEntity {
    fn from(entity: &Entity) -> Self {
        RawEntity {
            entity_type: U16::new(entity.entity_type),
            instance: U16::new(entity.instance),
            container_id: U16::new(entity.container_id),
        }
    }
}

/// Decoded common header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdrHeader {
    pub record_handle: RecordHandle,
    pub version: u8,
    pub pdr_type: u8,
    pub record_change_num: u16,
    /// Length of the body that follows the header
    pub length: u16,
}

impl PdrHeader {
    /// Parse the header at the start of `bytes` without checking the body.
    pub fn parse(bytes: &[u8]) -> Result<Self, PdrError> {
        let (raw, _) = RawPdrHeader::read_from_prefix(bytes).map_err(|_| PdrError::TooShort {
            needed: PDR_HEADER_LEN,
            actual: bytes.len(),
        })?;
        Ok(Self {
            record_handle: raw.record_handle.get(),
            version: raw.version,
            pdr_type: raw.pdr_type,
            record_change_num: raw.record_change_num.get(),
            length: raw.length.get(),
        })
    }

    /// Parse the header and require the body to be exactly `length` bytes.
    pub fn parse_exact(bytes: &[u8]) -> Result<Self, PdrError> {
        let header = Self::parse(bytes)?;
        let actual = bytes.len() - PDR_HEADER_LEN;
        if actual != header.length as usize {
            return Err(PdrError::LengthMismatch {
                declared: header.length as usize,
                actual,
            });
        }
        Ok(header)
    }

    pub fn kind(&self) -> Option<PdrType> {
        PdrType::from_u8(self.pdr_type)
    }

    pub fn total_len(&self) -> usize {
        PDR_HEADER_LEN + self.length as usize
    }
}

/// Body of a record after header validation, checked against the expected type.
pub(crate) fn typed_body(bytes: &[u8], expected: PdrType) -> Result<(PdrHeader, &[u8]), PdrError> {
    let header = PdrHeader::parse_exact(bytes)?;
    if header.pdr_type != expected.as_u8() {
        return Err(PdrError::UnexpectedType {
            expected: expected.as_u8(),
            actual: header.pdr_type,
        });
    }
    Ok((header, &bytes[PDR_HEADER_LEN..]))
}

/// Assemble a complete record from a header and body.
pub fn encode_record(pdr_type: PdrType, record_handle: RecordHandle, body: &[u8]) -> Vec<u8> {
    let header = RawPdrHeader {
        record_handle: U32::new(record_handle),
        version: PDR_HEADER_VERSION,
        pdr_type: pdr_type.as_u8(),
        record_change_num: U16::new(0),
        length: U16::new(body.len() as u16),
    };
    let mut record = Vec::with_capacity(PDR_HEADER_LEN + body.len());
    record.extend_from_slice(header.as_bytes());
    record.extend_from_slice(body);
    record
}

/// Overwrite the record handle field of an encoded record in place.
pub(crate) fn rewrite_record_handle(record: &mut [u8], record_handle: RecordHandle) {
    if record.len() >= 4 {
        record[..4].copy_from_slice(&record_handle.to_le_bytes());
    }
}

/// Split a GetPDR payload into its records.
///
/// A payload usually carries one record, but concatenated records are
/// accepted. Splitting stops at the first record whose declared length runs
/// past the payload: the error is returned in place of that record and
/// nothing after it can be located.
pub fn split_records(payload: &[u8]) -> Vec<Result<&[u8], PdrError>> {
    let mut records = Vec::new();
    let mut offset = 0;
    while offset < payload.len() {
        let rest = &payload[offset..];
        match PdrHeader::parse(rest) {
            Ok(header) if header.total_len() <= rest.len() => {
                records.push(Ok(&rest[..header.total_len()]));
                offset += header.total_len();
            }
            Ok(header) => {
                records.push(Err(PdrError::TooShort {
                    needed: header.total_len(),
                    actual: rest.len(),
                }));
                break;
            }
            Err(e) => {
                records.push(Err(e));
                break;
            }
        }
    }
    records
}

pub(crate) fn encode_entity(entity: &Entity, out: &mut Vec<u8>) {
    out.extend_from_slice(RawEntity::from(entity).as_bytes());
}

pub(crate) fn decode_entity(bytes: &[u8]) -> Option<Entity> {
    RawEntity::read_from_prefix(bytes)
        .ok()
        .map(|(raw, _)| Entity::from(raw))
}
