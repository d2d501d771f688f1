//! Recorded host exchanges
//!
//! A [`Capture`] is a JSON description of how a host answered: GetPDR
//! responses keyed by record handle and data transfer handle, FRU table
//! responses, sensor readings, plus the BMC entities to merge against.
//! [`ReplayTransport`] serves it back through [`PldmTransport`].

use crate::error::{ApiError, TransportError};
use crate::pdr::entity_association::AssociationType;
use crate::transport::{
    FruMetadataResponse, FruTableResponse, GetPdrRequest, GetPdrResponse, PldmTransport,
    PldmVersionResponse, PlatformEventMessage, PlatformEventResponse, StateSensorReadings,
};
use crate::tree::{EntityTree, NodeId, Origin};
use crate::types::{CompletionCode, Eid, Entity, EntityType, RecordHandle, SensorId};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, trace};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Capture {
    #[serde(default)]
    pub get_pdr: Vec<CapturedGetPdr>,

    #[serde(default)]
    pub fru_metadata: Option<FruMetadataResponse>,

    #[serde(default)]
    pub fru_table: Option<FruTableResponse>,

    #[serde(default)]
    pub state_sensor_readings: Vec<CapturedReadings>,

    #[serde(default)]
    pub pldm_version: Option<PldmVersionResponse>,

    /// BMC entity topology, parents listed before their children
    #[serde(default)]
    pub bmc_entities: Vec<CapturedEntity>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedGetPdr {
    pub record_handle: RecordHandle,
    #[serde(default)]
    pub data_transfer_handle: u32,
    pub response: GetPdrResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedReadings {
    pub sensor_id: SensorId,
    pub response: StateSensorReadings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedEntity {
    pub entity_type: EntityType,
    pub instance: u16,
    /// Index of the parent within `bmc_entities`
    #[serde(default)]
    pub parent: Option<usize>,
    #[serde(default)]
    pub logical: bool,
}

impl Capture {
    pub fn from_json(json: &str) -> Result<Self, ApiError> {
        serde_json::from_str(json).map_err(|e| ApiError::CaptureError(e.to_string()))
    }

    pub fn from_path(path: &Path) -> Result<Self, ApiError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Build the BMC entity tree the capture describes.
    pub fn bmc_tree(&self) -> Result<EntityTree, ApiError> {
        let mut tree = EntityTree::new();
        let mut ids: Vec<NodeId> = Vec::with_capacity(self.bmc_entities.len());
        for (index, entity) in self.bmc_entities.iter().enumerate() {
            let parent = match entity.parent {
                Some(p) => Some(*ids.get(p).ok_or_else(|| {
                    ApiError::CaptureError(format!(
                        "bmc_entities[{}] refers to parent {} which is not listed before it",
                        index, p
                    ))
                })?),
                None => None,
            };
            let association = if entity.logical {
                AssociationType::Logical
            } else {
                AssociationType::Physical
            };
            ids.push(tree.add(
                Entity::new(entity.entity_type, entity.instance, 0),
                parent,
                association,
                Origin::Bmc,
            )?);
        }
        Ok(tree)
    }
}

/// Serves a [`Capture`] and records what was asked of it
#[derive(Debug, Default)]
pub struct ReplayTransport {
    capture: Capture,
    requests: Mutex<Vec<GetPdrRequest>>,
    events: Mutex<Vec<PlatformEventMessage>>,
}

impl ReplayTransport {
    pub fn new(capture: Capture) -> Self {
        Self {
            capture,
            ..Default::default()
        }
    }

    /// GetPDR requests received, in order
    pub fn requests(&self) -> Vec<GetPdrRequest> {
        self.requests.lock().clone()
    }

    /// Platform event messages received, in order
    pub fn events(&self) -> Vec<PlatformEventMessage> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl PldmTransport for ReplayTransport {
    async fn get_pdr(
        &self,
        _eid: Eid,
        request: GetPdrRequest,
    ) -> Result<GetPdrResponse, TransportError> {
        self.requests.lock().push(request);
        trace!(record_handle = request.record_handle, "Replaying GetPDR");
        self.capture
            .get_pdr
            .iter()
            .find(|c| {
                c.record_handle == request.record_handle
                    && c.data_transfer_handle == request.data_transfer_handle
            })
            .map(|c| c.response.clone())
            .ok_or(TransportError::Timeout)
    }

    async fn platform_event_message(
        &self,
        _eid: Eid,
        message: PlatformEventMessage,
    ) -> Result<PlatformEventResponse, TransportError> {
        debug!(event_class = message.event_class, "Recorded platform event");
        self.events.lock().push(message);
        Ok(PlatformEventResponse {
            completion_code: CompletionCode::SUCCESS,
            status: 0,
        })
    }

    async fn get_fru_record_table_metadata(
        &self,
        _eid: Eid,
    ) -> Result<FruMetadataResponse, TransportError> {
        self.capture.fru_metadata.ok_or(TransportError::Timeout)
    }

    async fn get_fru_record_table(&self, _eid: Eid) -> Result<FruTableResponse, TransportError> {
        self.capture.fru_table.clone().ok_or(TransportError::Timeout)
    }

    async fn get_state_sensor_readings(
        &self,
        _eid: Eid,
        sensor_id: SensorId,
    ) -> Result<StateSensorReadings, TransportError> {
        self.capture
            .state_sensor_readings
            .iter()
            .find(|r| r.sensor_id == sensor_id)
            .map(|r| r.response.clone())
            .ok_or(TransportError::Timeout)
    }

    async fn get_pldm_version(&self, _eid: Eid) -> Result<PldmVersionResponse, TransportError> {
        self.capture.pldm_version.ok_or(TransportError::Timeout)
    }
}
