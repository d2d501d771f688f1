//! Core identifiers shared across the crate.

use serde::{Deserialize, Serialize};
use std::fmt;

/// PDR record handle. Handle 0 is reserved: as a request it means "first
/// record", as a next-record-handle it means "no more records".
pub type RecordHandle = u32;

pub type EntityType = u16;
pub type TerminusHandle = u16;
pub type TerminusId = u8;
pub type SensorId = u16;
pub type EventState = u8;
pub type Eid = u8;

/// Terminus id reserved by DSP0240; never a valid resolved terminus.
pub const TID_RESERVED: TerminusId = 0xFF;

/// Record handle meaning "start of repository" / "end of chain".
pub const RECORD_HANDLE_TERMINAL: RecordHandle = 0;

/// Instance number requesting automatic assignment on tree insertion.
pub const ENTITY_INSTANCE_AUTO: u16 = 0xFFFF;

/// A modeled hardware component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Entity {
    pub entity_type: EntityType,
    pub instance: u16,
    pub container_id: u16,
}

impl Entity {
    pub fn new(entity_type: EntityType, instance: u16, container_id: u16) -> Self {
        Self {
            entity_type,
            instance,
            container_id,
        }
    }

    /// Same type and instance, ignoring the container id (which is only
    /// meaningful inside one tree's numbering).
    pub fn same_identity(&self, other: &Entity) -> bool {
        self.entity_type == other.entity_type && self.instance == other.instance
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}@{}",
            self.entity_type, self.instance, self.container_id
        )
    }
}

/// Key of the host sensor map. Ordered by terminus id, then sensor id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SensorEntry {
    pub terminus_id: TerminusId,
    pub sensor_id: SensorId,
}

impl SensorEntry {
    pub fn new(terminus_id: TerminusId, sensor_id: SensorId) -> Self {
        Self {
            terminus_id,
            sensor_id,
        }
    }
}

impl fmt::Display for SensorEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tid={} sensor={}", self.terminus_id, self.sensor_id)
    }
}

/// PLDM completion code (DSP0240 base codes plus DSP0248 platform codes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompletionCode(pub u8);

impl CompletionCode {
    pub const SUCCESS: Self = Self(0x00);
    pub const ERROR: Self = Self(0x01);
    pub const ERROR_INVALID_DATA: Self = Self(0x02);
    pub const ERROR_INVALID_LENGTH: Self = Self(0x03);
    pub const ERROR_NOT_READY: Self = Self(0x04);
    pub const ERROR_UNSUPPORTED_PLDM_CMD: Self = Self(0x05);
    pub const PLATFORM_INVALID_SENSOR_ID: Self = Self(0x80);
    pub const PLATFORM_INVALID_STATE_VALUE: Self = Self(0x81);
    pub const PLATFORM_INVALID_RECORD_HANDLE: Self = Self(0x82);
    pub const PLATFORM_REPOSITORY_UPDATE_IN_PROGRESS: Self = Self(0x85);

    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }
}

impl fmt::Display for CompletionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

/// Host power/boot state as seen by the BMC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HostState {
    Off,
    Running,
    Quiesced,
}
