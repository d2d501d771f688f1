//! PDR Repository Change Event
//!
//! Encodes the `pldmPDRRepositoryChgEvent` payload (DSP0248 16.14) the BMC
//! sends to the host after its repository changed.

use crate::error::PdrError;
use crate::store::PdrRepository;
use crate::transport::PlatformEventMessage;
use crate::types::RecordHandle;
use serde::{Deserialize, Serialize};
use tracing::warn;
use zerocopy::byteorder::little_endian::U32;
use zerocopy::{FromBytes, IntoBytes};

/// `eventClass` of a repository change event
pub const PDR_REPOSITORY_CHG_EVENT: u8 = 0x04;

/// PlatformEventMessage format version
pub const PLATFORM_EVENT_FORMAT_VERSION: u8 = 0x01;

/// TID the BMC reports itself as in event messages
pub const BMC_EVENT_TID: u8 = 0x00;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventDataFormat {
    RefreshEntireRepository,
    FormatIsPdrTypes,
    FormatIsPdrHandles,
}

impl EventDataFormat {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::RefreshEntireRepository),
            1 => Some(Self::FormatIsPdrTypes),
            2 => Some(Self::FormatIsPdrHandles),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::RefreshEntireRepository => 0,
            Self::FormatIsPdrTypes => 1,
            Self::FormatIsPdrHandles => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOperation {
    RefreshAll,
    RecordsDeleted,
    RecordsAdded,
    RecordsModified,
}

impl ChangeOperation {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::RefreshAll),
            1 => Some(Self::RecordsDeleted),
            2 => Some(Self::RecordsAdded),
            3 => Some(Self::RecordsModified),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::RefreshAll => 0,
            Self::RecordsDeleted => 1,
            Self::RecordsAdded => 2,
            Self::RecordsModified => 3,
        }
    }
}

/// Entries one change record can carry; its count field is a single byte
pub const MAX_CHANGE_ENTRIES: usize = u8::MAX as usize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    pub operation: ChangeOperation,
    /// Record handles or PDR types, depending on the event data format
    pub entries: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdrRepositoryChgEvent {
    pub format: EventDataFormat,
    pub change_records: Vec<ChangeRecord>,
}

impl PdrRepositoryChgEvent {
    /// Build the event announcing host-originated records of `pdr_types`.
    ///
    /// With `FormatIsPdrHandles` the entries are the BMC handles of the
    /// matching remote records, grouped by type in the order given. With
    /// `FormatIsPdrTypes` the entries are the types themselves. Entries are
    /// split into change records of at most [`MAX_CHANGE_ENTRIES`]. A full
    /// refresh and an empty entry list both carry no change records.
    pub fn for_remote_records(
        repo: &PdrRepository,
        pdr_types: &[u8],
        format: EventDataFormat,
    ) -> Self {
        let handles: Vec<RecordHandle> = match format {
            EventDataFormat::FormatIsPdrHandles => pdr_types
                .iter()
                .flat_map(|t| repo.remote_handles_by_type(*t))
                .collect(),
            _ => Vec::new(),
        };
        Self::records_added(&handles, pdr_types, format)
    }

    /// Build the event announcing exactly `handles`, which hold records of
    /// `pdr_types`. The handles only matter for `FormatIsPdrHandles`.
    pub fn records_added(
        handles: &[RecordHandle],
        pdr_types: &[u8],
        format: EventDataFormat,
    ) -> Self {
        let entries: Vec<u32> = match format {
            EventDataFormat::RefreshEntireRepository => Vec::new(),
            EventDataFormat::FormatIsPdrTypes => pdr_types.iter().map(|t| u32::from(*t)).collect(),
            EventDataFormat::FormatIsPdrHandles => handles.to_vec(),
        };

        let change_records = entries
            .chunks(MAX_CHANGE_ENTRIES)
            .map(|chunk| ChangeRecord {
                operation: ChangeOperation::RecordsAdded,
                entries: chunk.to_vec(),
            })
            .collect();
        Self {
            format,
            change_records,
        }
    }

    /// Encode the event data.
    ///
    /// Change records longer than [`MAX_CHANGE_ENTRIES`] go out as several
    /// records with the same operation. If that needs more than 255 change
    /// records the payload becomes a full repository refresh instead.
    pub fn encode(&self) -> Vec<u8> {
        let wire: Vec<(ChangeOperation, &[u32])> = self
            .change_records
            .iter()
            .flat_map(|r| r.entries.chunks(MAX_CHANGE_ENTRIES).map(move |c| (r.operation, c)))
            .collect();
        let Ok(count) = u8::try_from(wire.len()) else {
            warn!(
                change_records = wire.len(),
                "Too many change records, sending a full repository refresh"
            );
            return vec![EventDataFormat::RefreshEntireRepository.as_u8(), 0];
        };

        let mut out = vec![self.format.as_u8(), count];
        for (operation, entries) in wire {
            out.push(operation.as_u8());
            // chunks() bounds the length to MAX_CHANGE_ENTRIES
            out.push(entries.len() as u8);
            for entry in entries {
                out.extend_from_slice(U32::new(*entry).as_bytes());
            }
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, PdrError> {
        let too_short = |needed: usize| PdrError::TooShort {
            needed,
            actual: bytes.len(),
        };
        let (format, count) = match bytes {
            [format, count, ..] => (*format, *count),
            _ => return Err(too_short(2)),
        };
        let format = EventDataFormat::from_u8(format).ok_or(PdrError::UnexpectedType {
            expected: EventDataFormat::FormatIsPdrHandles.as_u8(),
            actual: format,
        })?;

        let mut offset = 2;
        let mut change_records = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let [op, num] = bytes
                .get(offset..offset + 2)
                .and_then(|b| <[u8; 2]>::try_from(b).ok())
                .ok_or_else(|| too_short(offset + 2))?;
            offset += 2;
            let end = offset + num as usize * 4;
            let raw = bytes.get(offset..end).ok_or_else(|| too_short(end))?;
            let entries = <[U32]>::ref_from_bytes(raw)
                .map_err(|_| too_short(end))?
                .iter()
                .map(|e| e.get())
                .collect();
            offset = end;
            change_records.push(ChangeRecord {
                operation: ChangeOperation::from_u8(op).unwrap_or(ChangeOperation::RecordsModified),
                entries,
            });
        }
        Ok(Self {
            format,
            change_records,
        })
    }

    /// Wrap the event in a PlatformEventMessage request.
    pub fn to_platform_event(&self) -> PlatformEventMessage {
        PlatformEventMessage {
            format_version: PLATFORM_EVENT_FORMAT_VERSION,
            tid: BMC_EVENT_TID,
            event_class: PDR_REPOSITORY_CHG_EVENT,
            event_data: self.encode(),
        }
    }

    /// All entries across change records
    pub fn entries(&self) -> impl Iterator<Item = u32> + '_ {
        self.change_records.iter().flat_map(|r| r.entries.iter().copied())
    }
}
