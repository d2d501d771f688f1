//! PDR Repository
//!
//! Append-only, handle-indexed store of raw PDR bytes. Records fetched from
//! the host are re-homed here under BMC-assigned handles; the host's own
//! handle is kept alongside for diagnostics.

use crate::error::PdrError;
use crate::pdr::{rewrite_record_handle, PdrHeader, PdrType};
use crate::types::{RecordHandle, TerminusHandle};
use std::collections::BTreeMap;
use tracing::trace;

/// One stored record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdrRecord {
    pub handle: RecordHandle,
    pub pdr_type: u8,
    /// Originated on the host rather than the BMC
    pub is_remote: bool,
    pub terminus_handle: TerminusHandle,
    /// Handle the originator used, before re-homing
    pub source_handle: RecordHandle,
    /// Complete record including the header, with `handle` written in
    pub data: Vec<u8>,
}

impl PdrRecord {
    pub fn kind(&self) -> Option<PdrType> {
        PdrType::from_u8(self.pdr_type)
    }
}

/// Handle-indexed record store. Handles are assigned monotonically from 1;
/// handle 0 is never assigned.
#[derive(Debug, Clone)]
pub struct PdrRepository {
    records: BTreeMap<RecordHandle, PdrRecord>,
    next_handle: RecordHandle,
}

impl Default for PdrRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl PdrRepository {
    pub fn new() -> Self {
        Self {
            records: BTreeMap::new(),
            next_handle: 1,
        }
    }

    /// Validate and append a record, returning the handle it is stored under.
    pub fn add(
        &mut self,
        bytes: &[u8],
        is_remote: bool,
        terminus_handle: TerminusHandle,
    ) -> Result<RecordHandle, PdrError> {
        let header = PdrHeader::parse_exact(bytes)?;
        let handle = self.allocate_handle()?;

        let mut data = bytes.to_vec();
        rewrite_record_handle(&mut data, handle);

        trace!(
            record_handle = handle,
            source_handle = header.record_handle,
            pdr_type = header.pdr_type,
            is_remote,
            "Stored PDR"
        );

        self.records.insert(
            handle,
            PdrRecord {
                handle,
                pdr_type: header.pdr_type,
                is_remote,
                terminus_handle,
                source_handle: header.record_handle,
                data,
            },
        );
        Ok(handle)
    }

    fn allocate_handle(&mut self) -> Result<RecordHandle, PdrError> {
        let handle = self.next_handle;
        if handle == 0 {
            return Err(PdrError::HandleExhausted);
        }
        // wraps to 0 after u32::MAX, which then reports exhaustion
        self.next_handle = handle.wrapping_add(1);
        Ok(handle)
    }

    pub fn get(&self, handle: RecordHandle) -> Option<&PdrRecord> {
        self.records.get(&handle)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in handle (and therefore insertion) order.
    pub fn iter(&self) -> impl Iterator<Item = &PdrRecord> {
        self.records.values()
    }

    pub fn find_by_type(&self, pdr_type: PdrType) -> impl Iterator<Item = &PdrRecord> {
        let code = pdr_type.as_u8();
        self.records.values().filter(move |r| r.pdr_type == code)
    }

    /// Handles of host-originated records of the given type code.
    pub fn remote_handles_by_type(&self, pdr_type: u8) -> Vec<RecordHandle> {
        self.records
            .values()
            .filter(|r| r.is_remote && r.pdr_type == pdr_type)
            .map(|r| r.handle)
            .collect()
    }

    pub fn remote_count(&self) -> usize {
        self.records.values().filter(|r| r.is_remote).count()
    }
}
