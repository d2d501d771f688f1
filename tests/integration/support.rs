//! Shared fixtures: a scripted host transport, BMC trees and PDR builders.

use async_trait::async_trait;
use hostpdr::config::{HostParentConfig, HostPdrConfig};
use hostpdr::fru::FruTableMetadata;
use hostpdr::handler::HostPdrHandler;
use hostpdr::pdr::entity_association::AssociationType;
use hostpdr::pdr::{
    CompositeSensorStates, EntityAssociationPdr, FruRecordSetPdr, StateSensorPdr,
    TerminusLocatorPdr,
};
use hostpdr::store::PdrRepository;
use hostpdr::transport::{
    FruMetadataResponse, FruTableResponse, GetPdrRequest, GetPdrResponse, PldmTransport,
    PldmVersionResponse, PlatformEventMessage, PlatformEventResponse, StateSensorReadings,
};
use hostpdr::tree::{EntityTree, NodeId, Origin};
use hostpdr::types::{
    CompletionCode, Eid, Entity, HostState, RecordHandle, SensorId, TerminusHandle,
};
use hostpdr::TransportError;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;

pub const HOST_EID: Eid = 9;
pub const HOST_TID: u8 = 1;
pub const HOST_TERMINUS: TerminusHandle = 1;

/// What the scripted host does when asked for a record
#[derive(Debug, Clone)]
pub enum PageScript {
    Respond(GetPdrResponse),
    /// Power the host off, then never answer
    PowerOffAndHang,
}

/// Host that answers from a script keyed by (record handle, transfer handle)
#[derive(Default)]
pub struct ScriptedHost {
    pages: Mutex<BTreeMap<(RecordHandle, u32), PageScript>>,
    requests: Mutex<Vec<GetPdrRequest>>,
    events: Mutex<Vec<PlatformEventMessage>>,
    readings: Mutex<BTreeMap<SensorId, StateSensorReadings>>,
    fru: Mutex<Option<(FruTableMetadata, Vec<u8>)>>,
    power_off_after: Mutex<Option<usize>>,
    host_state: Mutex<Option<watch::Sender<HostState>>>,
    answers_version: Mutex<bool>,
}

impl ScriptedHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Answer `record_handle` with `records` in one part.
    pub fn page(&self, record_handle: RecordHandle, next: RecordHandle, records: &[Vec<u8>]) {
        let data = records.concat();
        self.pages.lock().insert(
            (record_handle, 0),
            PageScript::Respond(GetPdrResponse::complete(next, data)),
        );
    }

    pub fn script(&self, record_handle: RecordHandle, data_transfer_handle: u32, script: PageScript) {
        self.pages
            .lock()
            .insert((record_handle, data_transfer_handle), script);
    }

    pub fn readings(&self, sensor_id: SensorId, readings: StateSensorReadings) {
        self.readings.lock().insert(sensor_id, readings);
    }

    pub fn fru_table(&self, metadata: FruTableMetadata, table: Vec<u8>) {
        *self.fru.lock() = Some((metadata, table));
    }

    pub fn answer_version(&self) {
        *self.answers_version.lock() = true;
    }

    /// Power the host off right after the `n`th GetPDR has been answered.
    pub fn power_off_after(&self, n: usize, host_state: watch::Sender<HostState>) {
        *self.power_off_after.lock() = Some(n);
        *self.host_state.lock() = Some(host_state);
    }

    /// Attach the host state sender used by `PageScript::PowerOffAndHang`.
    pub fn attach_host_state(&self, host_state: watch::Sender<HostState>) {
        *self.host_state.lock() = Some(host_state);
    }

    /// Bring the host back up and stop any scheduled power-off.
    pub fn power_on(&self) {
        *self.power_off_after.lock() = None;
        if let Some(tx) = self.host_state.lock().as_ref() {
            let _ = tx.send(HostState::Running);
        }
    }

    pub fn requests(&self) -> Vec<GetPdrRequest> {
        self.requests.lock().clone()
    }

    pub fn events(&self) -> Vec<PlatformEventMessage> {
        self.events.lock().clone()
    }

    fn power_off(&self) {
        if let Some(tx) = self.host_state.lock().as_ref() {
            let _ = tx.send(HostState::Off);
        }
    }
}

#[async_trait]
impl PldmTransport for ScriptedHost {
    async fn get_pdr(
        &self,
        _eid: Eid,
        request: GetPdrRequest,
    ) -> Result<GetPdrResponse, TransportError> {
        let count = {
            let mut requests = self.requests.lock();
            requests.push(request);
            requests.len()
        };
        let script = self
            .pages
            .lock()
            .get(&(request.record_handle, request.data_transfer_handle))
            .cloned();

        match script {
            Some(PageScript::Respond(response)) => {
                if *self.power_off_after.lock() == Some(count) {
                    self.power_off();
                }
                Ok(response)
            }
            Some(PageScript::PowerOffAndHang) => {
                self.power_off();
                std::future::pending().await
            }
            None => Err(TransportError::Timeout),
        }
    }

    async fn platform_event_message(
        &self,
        _eid: Eid,
        message: PlatformEventMessage,
    ) -> Result<PlatformEventResponse, TransportError> {
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
        match self.fru.lock().as_ref() {
            Some((metadata, _)) => Ok(FruMetadataResponse {
                completion_code: CompletionCode::SUCCESS,
                metadata: *metadata,
            }),
            None => Err(TransportError::Timeout),
        }
    }

    async fn get_fru_record_table(&self, _eid: Eid) -> Result<FruTableResponse, TransportError> {
        match self.fru.lock().as_ref() {
            Some((_, table)) => Ok(FruTableResponse {
                completion_code: CompletionCode::SUCCESS,
                table_data: table.clone(),
            }),
            None => Err(TransportError::Timeout),
        }
    }

    async fn get_state_sensor_readings(
        &self,
        _eid: Eid,
        sensor_id: SensorId,
    ) -> Result<StateSensorReadings, TransportError> {
        self.readings
            .lock()
            .get(&sensor_id)
            .cloned()
            .ok_or(TransportError::Timeout)
    }

    async fn get_pldm_version(&self, _eid: Eid) -> Result<PldmVersionResponse, TransportError> {
        if *self.answers_version.lock() {
            Ok(PldmVersionResponse {
                completion_code: CompletionCode::SUCCESS,
                version: 0xF1F0_F000,
            })
        } else {
            Err(TransportError::Timeout)
        }
    }
}

/// Handler configuration matching the scripted host, with the follow-up
/// reads after each cycle turned off.
pub fn test_config() -> HostPdrConfig {
    let mut config = HostPdrConfig::default();
    config.host.eid = HOST_EID;
    config.host.tid = HOST_TID;
    config.host.terminus_handle = HOST_TERMINUS;
    config.fetch.fetch_fru_table = false;
    config.fetch.sync_sensor_states = false;
    config
}

pub fn with_host_parent(
    mut config: HostPdrConfig,
    entity_type: u16,
    parent_type: u16,
    parent_instance: u16,
) -> HostPdrConfig {
    config.host_parents.push(HostParentConfig {
        entity_type,
        parent_type,
        parent_instance,
    });
    config
}

/// BMC topology: chassis 1 > motherboard 1
pub struct BmcTree {
    pub tree: EntityTree,
    pub chassis: NodeId,
    pub board: NodeId,
}

pub fn bmc_tree() -> BmcTree {
    let mut tree = EntityTree::new();
    let chassis = tree.add(
        Entity::new(45, 1, 0),
        None,
        AssociationType::Physical,
        Origin::Bmc,
    )
    .unwrap();
    let board = tree.add(
        Entity::new(64, 1, 0),
        Some(chassis),
        AssociationType::Physical,
        Origin::Bmc,
    )
    .unwrap();
    BmcTree {
        tree,
        chassis,
        board,
    }
}

pub fn handler_with(
    config: HostPdrConfig,
    host: Arc<ScriptedHost>,
) -> (HostPdrHandler, watch::Sender<HostState>) {
    let (tx, rx) = watch::channel(HostState::Running);
    let handler = HostPdrHandler::new(
        config,
        PdrRepository::new(),
        bmc_tree().tree,
        host,
        rx,
    );
    (handler, tx)
}

pub fn entity_association(
    record_handle: RecordHandle,
    container: Entity,
    children: &[Entity],
) -> Vec<u8> {
    EntityAssociationPdr {
        record_handle,
        container_id: 0,
        association_type: AssociationType::Physical,
        container,
        children: children.to_vec(),
    }
    .encode()
}

pub fn state_sensor_pdr(
    record_handle: RecordHandle,
    terminus_handle: TerminusHandle,
    sensor_id: SensorId,
    entity: Entity,
) -> StateSensorPdr {
    StateSensorPdr {
        record_handle,
        terminus_handle,
        sensor_id,
        entity,
        sensor_init: 0,
        auxiliary_names: false,
        composite_states: vec![CompositeSensorStates::new(196, [1, 2])],
    }
}

pub fn state_sensor(
    record_handle: RecordHandle,
    terminus_handle: TerminusHandle,
    sensor_id: SensorId,
    entity: Entity,
) -> Vec<u8> {
    state_sensor_pdr(record_handle, terminus_handle, sensor_id, entity).encode()
}

pub fn fru_record_set(
    record_handle: RecordHandle,
    terminus_handle: TerminusHandle,
    fru_rsi: u16,
    entity: Entity,
) -> Vec<u8> {
    FruRecordSetPdr {
        record_handle,
        terminus_handle,
        fru_rsi,
        entity,
    }
    .encode()
}

pub fn terminus_locator(
    record_handle: RecordHandle,
    terminus_handle: TerminusHandle,
    tid: u8,
    eid: Eid,
) -> Vec<u8> {
    TerminusLocatorPdr::mctp(record_handle, terminus_handle, tid, eid).encode()
}

/// The two-page host used by the basic fetch scenario: page 1 (handle 0,
/// next 5) carries an entity association and a state sensor, page 2
/// (handle 5, next 0) a FRU record set.
pub fn two_page_host() -> Arc<ScriptedHost> {
    let host = ScriptedHost::new();
    host.page(
        0,
        5,
        &[
            entity_association(1, Entity::new(64, 1, 0), &[Entity::new(135, 1, 0)]),
            state_sensor(2, HOST_TERMINUS, 10, Entity::new(135, 1, 0)),
        ],
    );
    host.page(
        5,
        0,
        &[fru_record_set(5, HOST_TERMINUS, 3, Entity::new(135, 1, 0))],
    );
    host
}
