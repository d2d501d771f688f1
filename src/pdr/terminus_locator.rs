//! Terminus locator PDR (DSP0248 28.2)

use super::{encode_record, typed_body, PdrType};
use crate::error::PdrError;
use crate::types::{Eid, RecordHandle, TerminusHandle, TerminusId};
use serde::{Deserialize, Serialize};
use zerocopy::byteorder::little_endian::U16;
use zerocopy::{FromBytes, IntoBytes};
use zerocopy_derive::{
    FromBytes as DeriveFromBytes, Immutable, IntoBytes as DeriveIntoBytes, KnownLayout, Unaligned,
};

pub const TERMINUS_LOCATOR_TYPE_UID: u8 = 0;
pub const TERMINUS_LOCATOR_TYPE_MCTP_EID: u8 = 1;

#[repr(C)]
#[derive(Debug, Clone, Copy, DeriveFromBytes, DeriveIntoBytes, Immutable, KnownLayout, Unaligned)]
struct RawTerminusLocatorFixed {
    terminus_handle: U16,
    validity: u8,
    tid: u8,
    container_id: U16,
    locator_type: u8,
    locator_value_size: u8,
}

const FIXED_BODY_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminusLocatorPdr {
    pub record_handle: RecordHandle,
    pub terminus_handle: TerminusHandle,
    pub valid: bool,
    pub tid: TerminusId,
    pub container_id: u16,
    pub locator_type: u8,
    pub locator_value: Vec<u8>,
}

/// Condensed view kept per cycle to reach a terminus at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlInfo {
    pub valid: bool,
    pub eid: Eid,
    pub tid: TerminusId,
    pub terminus_handle: TerminusHandle,
}

impl TerminusLocatorPdr {
    pub fn decode(bytes: &[u8]) -> Result<Self, PdrError> {
        let (header, body) = typed_body(bytes, PdrType::TerminusLocator)?;
        let (fixed, rest) =
            RawTerminusLocatorFixed::read_from_prefix(body).map_err(|_| PdrError::TooShort {
                needed: super::PDR_HEADER_LEN + FIXED_BODY_LEN,
                actual: bytes.len(),
            })?;
        let size = fixed.locator_value_size as usize;
        if rest.len() != size {
            return Err(PdrError::LengthMismatch {
                declared: FIXED_BODY_LEN + size,
                actual: body.len(),
            });
        }

        Ok(Self {
            record_handle: header.record_handle,
            terminus_handle: fixed.terminus_handle.get(),
            valid: fixed.validity != 0,
            tid: fixed.tid,
            container_id: fixed.container_id.get(),
            locator_type: fixed.locator_type,
            locator_value: rest.to_vec(),
        })
    }

    /// MCTP endpoint id, when the locator is of the MCTP EID kind.
    pub fn eid(&self) -> Option<Eid> {
        if self.locator_type == TERMINUS_LOCATOR_TYPE_MCTP_EID {
            self.locator_value.first().copied()
        } else {
            None
        }
    }

    pub fn tl_info(&self) -> TlInfo {
        TlInfo {
            valid: self.valid,
            eid: self.eid().unwrap_or_default(),
            tid: self.tid,
            terminus_handle: self.terminus_handle,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let fixed = RawTerminusLocatorFixed {
            terminus_handle: U16::new(self.terminus_handle),
            validity: self.valid as u8,
            tid: self.tid,
            container_id: U16::new(self.container_id),
            locator_type: self.locator_type,
            locator_value_size: self.locator_value.len() as u8,
        };
        let mut body = fixed.as_bytes().to_vec();
        body.extend_from_slice(&self.locator_value);
        encode_record(PdrType::TerminusLocator, self.record_handle, &body)
    }

    /// Locator for an MCTP-reachable terminus.
    pub fn mctp(
        record_handle: RecordHandle,
        terminus_handle: TerminusHandle,
        tid: TerminusId,
        eid: Eid,
    ) -> Self {
        Self {
            record_handle,
            terminus_handle,
            valid: true,
            tid,
            container_id: 0,
            locator_type: TERMINUS_LOCATOR_TYPE_MCTP_EID,
            locator_value: vec![eid],
        }
    }
}
