//! PLDM Transport
//!
//! Request/response seam to host firmware. Implementations own instance ids,
//! timeouts and retries; callers see one typed response per request.

use crate::error::TransportError;
use crate::fru::FruTableMetadata;
use crate::types::{CompletionCode, Eid, EventState, RecordHandle, SensorId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Largest record data chunk requested per GetPDR
pub const DEFAULT_REQUEST_COUNT: u16 = u16::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferOpFlag {
    GetNextPart,
    GetFirstPart,
}

impl TransferOpFlag {
    pub fn as_u8(self) -> u8 {
        match self {
            Self::GetNextPart => 0,
            Self::GetFirstPart => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferFlag {
    Start,
    Middle,
    End,
    StartAndEnd,
}

impl TransferFlag {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::Start),
            0x01 => Some(Self::Middle),
            0x04 => Some(Self::End),
            0x05 => Some(Self::StartAndEnd),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::Start => 0x00,
            Self::Middle => 0x01,
            Self::End => 0x04,
            Self::StartAndEnd => 0x05,
        }
    }

    /// More parts of the current record follow
    pub fn has_more(self) -> bool {
        matches!(self, Self::Start | Self::Middle)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetPdrRequest {
    pub record_handle: RecordHandle,
    pub data_transfer_handle: u32,
    pub transfer_op_flag: TransferOpFlag,
    pub request_count: u16,
    pub record_change_number: u16,
}

impl GetPdrRequest {
    pub fn first_part(record_handle: RecordHandle) -> Self {
        Self {
            record_handle,
            data_transfer_handle: 0,
            transfer_op_flag: TransferOpFlag::GetFirstPart,
            request_count: DEFAULT_REQUEST_COUNT,
            record_change_number: 0,
        }
    }

    pub fn next_part(record_handle: RecordHandle, data_transfer_handle: u32) -> Self {
        Self {
            data_transfer_handle,
            transfer_op_flag: TransferOpFlag::GetNextPart,
            ..Self::first_part(record_handle)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetPdrResponse {
    pub completion_code: CompletionCode,
    pub next_record_handle: RecordHandle,
    #[serde(default)]
    pub next_data_transfer_handle: u32,
    #[serde(default = "default_transfer_flag")]
    pub transfer_flag: TransferFlag,
    #[serde(with = "hex_bytes", default)]
    pub record_data: Vec<u8>,
}

fn default_transfer_flag() -> TransferFlag {
    TransferFlag::StartAndEnd
}

impl GetPdrResponse {
    /// Single-part response carrying `record_data`
    pub fn complete(next_record_handle: RecordHandle, record_data: Vec<u8>) -> Self {
        Self {
            completion_code: CompletionCode::SUCCESS,
            next_record_handle,
            next_data_transfer_handle: 0,
            transfer_flag: TransferFlag::StartAndEnd,
            record_data,
        }
    }

    pub fn error(completion_code: CompletionCode) -> Self {
        Self {
            completion_code,
            next_record_handle: 0,
            next_data_transfer_handle: 0,
            transfer_flag: TransferFlag::StartAndEnd,
            record_data: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformEventMessage {
    pub format_version: u8,
    pub tid: u8,
    pub event_class: u8,
    #[serde(with = "hex_bytes")]
    pub event_data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformEventResponse {
    pub completion_code: CompletionCode,
    #[serde(default)]
    pub status: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FruMetadataResponse {
    pub completion_code: CompletionCode,
    #[serde(default)]
    pub metadata: FruTableMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FruTableResponse {
    pub completion_code: CompletionCode,
    #[serde(with = "hex_bytes", default)]
    pub table_data: Vec<u8>,
}

/// One composite sensor reading (DSP0248 Table 27)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateFieldReading {
    pub sensor_op_state: u8,
    pub present_state: EventState,
    pub previous_state: EventState,
    pub event_state: EventState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSensorReadings {
    pub completion_code: CompletionCode,
    #[serde(default)]
    pub fields: Vec<StateFieldReading>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PldmVersionResponse {
    pub completion_code: CompletionCode,
    #[serde(default)]
    pub version: u32,
}

/// Requests the host PDR exchange issues.
#[async_trait]
pub trait PldmTransport: Send + Sync {
    async fn get_pdr(&self, eid: Eid, request: GetPdrRequest)
        -> Result<GetPdrResponse, TransportError>;

    async fn platform_event_message(
        &self,
        eid: Eid,
        message: PlatformEventMessage,
    ) -> Result<PlatformEventResponse, TransportError>;

    async fn get_fru_record_table_metadata(
        &self,
        eid: Eid,
    ) -> Result<FruMetadataResponse, TransportError>;

    async fn get_fru_record_table(&self, eid: Eid) -> Result<FruTableResponse, TransportError>;

    async fn get_state_sensor_readings(
        &self,
        eid: Eid,
        sensor_id: SensorId,
    ) -> Result<StateSensorReadings, TransportError>;

    async fn get_pldm_version(&self, eid: Eid) -> Result<PldmVersionResponse, TransportError>;
}

/// Byte buffers as hex strings in captures
pub(crate) mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        hex::decode(compact).map_err(serde::de::Error::custom)
    }
}
