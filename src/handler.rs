//! Host PDR Handler
//!
//! Owns the repository, the merged entity tree and everything derived from
//! host PDRs, and drives fetch cycles against a [`PldmTransport`].

use crate::config::HostPdrConfig;
use crate::error::{FetchError, LookupError};
use crate::event::{EventDataFormat, PdrRepositoryChgEvent};
use crate::fetch::{CycleState, FetchCycle, NextStep};
use crate::fru::{self, FruRecordTable, OwnedFruRecord};
use crate::merge::{EntityMerger, ParentMap};
use crate::pdr::entity_association::AssociationType;
use crate::pdr::terminus_locator::TlInfo;
use crate::pdr::{FruRecordSetPdr, PdrType, StateSensorPdr};
use crate::sensor::{build_sensor_map, DroppedSensor, SensorInfo, SensorMap, SharedSensorMap};
use crate::store::PdrRepository;
use crate::transport::{GetPdrRequest, GetPdrResponse, PldmTransport};
use crate::tree::path::ObjectPathBuilder;
use crate::tree::{EntityTree, NodeId};
use crate::types::{
    CompletionCode, Eid, Entity, EventState, HostState, RecordHandle, SensorEntry, TerminusHandle,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

/// Summary of one completed fetch cycle
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub requests: usize,
    pub records_stored: usize,
    pub records_skipped: usize,
    pub entity_associations: usize,
    pub merged_records: usize,
    pub nodes_grafted: usize,
    pub sensors: usize,
    pub dropped_sensors: Vec<DroppedSensor>,
    pub fru_record_sets: usize,
    pub fru_records: usize,
    pub notified: bool,
}

pub struct HostPdrHandler {
    config: HostPdrConfig,
    transport: Arc<dyn PldmTransport>,
    host_state: watch::Receiver<HostState>,
    repo: PdrRepository,
    bmc_tree: EntityTree,
    tree: EntityTree,
    merger: EntityMerger,
    /// Last merged association stored per merge point, encoded with handle 0
    merged_associations: BTreeMap<(NodeId, AssociationType), Vec<u8>>,
    paths: ObjectPathBuilder,
    cycle: FetchCycle,
    tl_map: BTreeMap<TerminusHandle, TlInfo>,
    sensors: SharedSensorMap,
    state_sensor_pdrs: Vec<StateSensorPdr>,
    fru_record_set_pdrs: Vec<FruRecordSetPdr>,
    fru_table: FruRecordTable,
    fru_records: Vec<OwnedFruRecord>,
    host_firmware_up: Option<bool>,
    last_report: Option<CycleReport>,
}

impl HostPdrHandler {
    /// `bmc_tree` is the BMC's own entity topology; it is kept as a pristine
    /// snapshot and restored whenever the host powers off.
    pub fn new(
        config: HostPdrConfig,
        repo: PdrRepository,
        bmc_tree: EntityTree,
        transport: Arc<dyn PldmTransport>,
        host_state: watch::Receiver<HostState>,
    ) -> Self {
        let paths = ObjectPathBuilder::new(config.inventory.object_path_root.clone())
            .with_names(&config.entity_names());
        let merger = EntityMerger::new(config.parent_rules());
        let tl_map = seed_terminus_map(&config);
        Self {
            transport,
            host_state,
            repo,
            tree: bmc_tree.clone(),
            bmc_tree,
            merger,
            merged_associations: BTreeMap::new(),
            paths,
            cycle: FetchCycle::new(),
            tl_map,
            sensors: SharedSensorMap::new(),
            state_sensor_pdrs: Vec::new(),
            fru_record_set_pdrs: Vec::new(),
            fru_table: FruRecordTable::default(),
            fru_records: Vec::new(),
            host_firmware_up: None,
            last_report: None,
            config,
        }
    }

    fn host_eid(&self) -> Eid {
        self.config.host.eid
    }

    pub fn subscribe_host_state(&self) -> watch::Receiver<HostState> {
        self.host_state.clone()
    }

    pub fn is_host_up(&self) -> bool {
        *self.host_state.borrow() != HostState::Off
    }

    /// Schedule a fetch of `handles`; empty fetches the whole host repository.
    ///
    /// No request is issued here. Returns false when a cycle is already in
    /// flight, in which case the fetch runs as a follow-up cycle.
    pub fn fetch_pdr(&mut self, handles: Vec<RecordHandle>) -> bool {
        debug!(handles = ?handles, "Fetch requested");
        self.cycle.schedule(handles)
    }

    /// Schedule and run a fetch.
    pub async fn fetch(
        &mut self,
        handles: Vec<RecordHandle>,
    ) -> Result<Option<CycleReport>, FetchError> {
        self.fetch_pdr(handles);
        self.run_pending().await
    }

    /// Run scheduled cycles, including follow-ups deferred while they ran.
    ///
    /// Returns the report of the last completed cycle, or `None` if nothing
    /// was scheduled. An aborted cycle returns its error; a follow-up
    /// deferred behind it stays scheduled for the next call.
    pub async fn run_pending(&mut self) -> Result<Option<CycleReport>, FetchError> {
        let mut report = None;
        while self.cycle.state() == CycleState::AwaitingFirstRequest {
            report = Some(self.run_cycle().await?);
        }
        Ok(report)
    }

    #[instrument(skip(self), fields(eid = self.config.host.eid))]
    async fn run_cycle(&mut self) -> Result<CycleReport, FetchError> {
        let started_at = Utc::now();
        let Some(mut request) = self.cycle.start() else {
            return Err(FetchError::UnexpectedResponse);
        };
        info!("Starting host PDR fetch");

        loop {
            let response = match self.request_page(request).await {
                Ok(response) => response,
                Err(e) => {
                    error!(record_handle = request.record_handle, error = %e, "Fetch cycle aborted");
                    self.cycle.abort();
                    return Err(e);
                }
            };
            match self.cycle.on_response(&mut self.repo, response) {
                Ok(NextStep::Request(next)) => request = next,
                Ok(NextStep::Complete) => break,
                Err(e) => {
                    error!(record_handle = request.record_handle, error = %e, "Fetch cycle aborted");
                    return Err(e);
                }
            }
        }

        let Some(context) = self.cycle.take_context() else {
            return Err(FetchError::UnexpectedResponse);
        };

        let merge = self
            .merger
            .merge_all(&mut self.tree, &context.entity_associations);
        let merged_handles = self.store_merged_associations(&merge.merge_points);
        let merged_records = merged_handles.len();

        for locator in &context.terminus_locators {
            self.tl_map
                .insert(locator.terminus_handle, locator.tl_info());
        }

        let (map, dropped) = build_sensor_map(
            &context.state_sensors,
            &self.tl_map,
            &self.tree,
            &self.paths,
        );
        let sensors = map.len();
        self.sensors.replace(map);
        self.state_sensor_pdrs = context.state_sensors;

        self.fru_table = fru::parse_fru_record_set_pdrs(&context.fru_record_sets);
        self.fru_record_set_pdrs = context.fru_record_sets;

        self.cycle.enter_notifying();
        let notified = !merged_handles.is_empty();
        if notified {
            let event = PdrRepositoryChgEvent::records_added(
                &merged_handles,
                &[PdrType::EntityAssociation.as_u8()],
                self.config.fetch.notify_format,
            );
            self.send_event(event).await;
        } else if merge.merged_any() {
            debug!("Merged entity associations unchanged, host not notified");
        }

        if self.config.fetch.fetch_fru_table && !self.fru_table.is_empty() {
            self.fetch_fru_records().await;
        }
        if self.config.fetch.sync_sensor_states {
            let pdrs = self.state_sensor_pdrs.clone();
            let tl_info = self.tl_info();
            self.set_host_sensor_state(&pdrs, &tl_info).await;
        }

        self.cycle.finish();

        let report = CycleReport {
            started_at,
            finished_at: Utc::now(),
            requests: context.requests,
            records_stored: context.stored.len() + merged_records,
            records_skipped: context.skipped + merge.skipped.len(),
            entity_associations: context.entity_associations.len(),
            merged_records,
            nodes_grafted: merge.grafted,
            sensors,
            dropped_sensors: dropped,
            fru_record_sets: self.fru_table.len(),
            fru_records: self.fru_records.len(),
            notified,
        };
        info!(
            requests = report.requests,
            records_stored = report.records_stored,
            sensors = report.sensors,
            dropped_sensors = report.dropped_sensors.len(),
            notified = report.notified,
            "Host PDR fetch complete"
        );
        self.last_report = Some(report.clone());
        Ok(report)
    }

    /// Store the association records of each merge point whose contents
    /// changed since they were last stored. Returns the new handles.
    fn store_merged_associations(&mut self, merge_points: &[NodeId]) -> Vec<RecordHandle> {
        let mut handles = Vec::new();
        for merge_point in merge_points {
            for pdr in self.tree.association_pdrs(*merge_point, 0) {
                let encoded = pdr.encode();
                let key = (*merge_point, pdr.association_type);
                if self.merged_associations.get(&key) == Some(&encoded) {
                    continue;
                }
                match self.repo.add(&encoded, true, self.config.host.terminus_handle) {
                    Ok(handle) => {
                        debug!(record_handle = handle, container = %pdr.container, "Stored merged entity association");
                        self.merged_associations.insert(key, encoded);
                        handles.push(handle);
                    }
                    Err(e) => warn!(error = %e, "Failed to store merged entity association"),
                }
            }
        }
        handles
    }

    /// Issue one GetPDR, giving up as soon as the host is seen powering off.
    async fn request_page(&self, request: GetPdrRequest) -> Result<GetPdrResponse, FetchError> {
        if !self.is_host_up() {
            return Err(FetchError::HostDown);
        }

        let mut host_state = self.host_state.clone();
        let host_down = async move {
            loop {
                if *host_state.borrow_and_update() == HostState::Off {
                    return;
                }
                if host_state.changed().await.is_err() {
                    // sender gone: the state can no longer change
                    std::future::pending::<()>().await;
                }
            }
        };

        tokio::select! {
            biased;
            _ = host_down => Err(FetchError::HostDown),
            response = self.transport.get_pdr(self.host_eid(), request) => Ok(response?),
        }
    }

    /// Tell the host which of its records changed in the BMC repository.
    ///
    /// Fire-and-forget: failures are logged only.
    #[instrument(skip(self))]
    pub async fn send_pdr_repository_chg_event(&self, pdr_types: &[u8], format: EventDataFormat) {
        let event = PdrRepositoryChgEvent::for_remote_records(&self.repo, pdr_types, format);
        self.send_event(event).await;
    }

    async fn send_event(&self, event: PdrRepositoryChgEvent) {
        let entries = event.entries().count();
        match self
            .transport
            .platform_event_message(self.host_eid(), event.to_platform_event())
            .await
        {
            Ok(response) if response.completion_code.is_success() => {
                info!(entries, "Sent PDR repository change event");
            }
            Ok(response) => warn!(
                completion_code = %response.completion_code,
                "Host rejected PDR repository change event"
            ),
            Err(e) => error!(error = %e, "Failed to send PDR repository change event"),
        }
    }

    /// GetFRURecordTableMetadata, then GetFRURecordTable when the host has
    /// records. Failures leave the previous records in place.
    async fn fetch_fru_records(&mut self) {
        let eid = self.host_eid();
        let metadata = match self.transport.get_fru_record_table_metadata(eid).await {
            Ok(r) if r.completion_code.is_success() => r.metadata,
            Ok(r) => {
                warn!(completion_code = %r.completion_code, "GetFRURecordTableMetadata failed");
                return;
            }
            Err(e) => {
                error!(error = %e, "GetFRURecordTableMetadata failed");
                return;
            }
        };
        if metadata.total_table_records == 0 {
            debug!("Host FRU record table is empty");
            self.fru_records.clear();
            return;
        }

        let table = match self.transport.get_fru_record_table(eid).await {
            Ok(r) if r.completion_code.is_success() => r.table_data,
            Ok(r) => {
                warn!(completion_code = %r.completion_code, "GetFRURecordTable failed");
                return;
            }
            Err(e) => {
                error!(error = %e, "GetFRURecordTable failed");
                return;
            }
        };
        match fru::decode_fru_table(&table, metadata.total_table_records) {
            Ok(records) => {
                self.fru_records = fru::associate(records, &self.fru_table);
                debug!(records = self.fru_records.len(), "Decoded host FRU record table");
            }
            Err(e) => warn!(error = %e, "Failed to decode host FRU record table"),
        }
    }

    /// Check host firmware with GetPLDMVersion and remember whether it
    /// answered.
    #[instrument(skip(self))]
    pub async fn set_host_firmware_condition(&mut self) -> bool {
        let up = match self.transport.get_pldm_version(self.host_eid()).await {
            Ok(r) if r.completion_code.is_success() => {
                info!(version = format!("{:#010x}", r.version), "Host firmware is responding");
                true
            }
            Ok(r) => {
                warn!(completion_code = %r.completion_code, "Host firmware rejected GetPLDMVersion");
                false
            }
            Err(e) => {
                warn!(error = %e, "Host firmware is not responding");
                false
            }
        };
        self.host_firmware_up = Some(up);
        up
    }

    /// Read the present state of each host state sensor reachable through a
    /// valid terminus locator and apply it as a sensor event.
    #[instrument(skip_all, fields(sensors = pdrs.len()))]
    pub async fn set_host_sensor_state(&self, pdrs: &[StateSensorPdr], tl_info: &[TlInfo]) {
        for pdr in pdrs {
            let Some(tl) = tl_info
                .iter()
                .find(|tl| tl.terminus_handle == pdr.terminus_handle)
            else {
                continue;
            };
            if !tl.valid {
                continue;
            }

            let readings = match self
                .transport
                .get_state_sensor_readings(tl.eid, pdr.sensor_id)
                .await
            {
                Ok(r) if r.completion_code.is_success() => r,
                Ok(r) => {
                    warn!(sensor_id = pdr.sensor_id, completion_code = %r.completion_code, "GetStateSensorReadings failed");
                    continue;
                }
                Err(e) => {
                    warn!(sensor_id = pdr.sensor_id, error = %e, "GetStateSensorReadings failed");
                    continue;
                }
            };

            let entry = SensorEntry::new(tl.tid, pdr.sensor_id);
            for (offset, field) in readings.fields.iter().enumerate() {
                let Ok(offset) = u8::try_from(offset) else {
                    break;
                };
                let code = self
                    .sensors
                    .handle_state_sensor_event(&entry, offset, field.present_state);
                if !code.is_success() {
                    debug!(%entry, offset, completion_code = %code, "Sensor reading not applied");
                }
            }
        }
    }

    /// Drop everything learned from the host and restore the BMC tree.
    ///
    /// Repository records are kept.
    pub fn on_host_off(&mut self) {
        info!("Host powered off, resetting host PDR state");
        self.cycle.reset();
        self.tree = self.bmc_tree.clone();
        self.merger = EntityMerger::new(self.config.parent_rules());
        self.merged_associations.clear();
        self.tl_map = seed_terminus_map(&self.config);
        self.sensors.replace(SensorMap::default());
        self.state_sensor_pdrs.clear();
        self.fru_record_set_pdrs.clear();
        self.fru_table = FruRecordTable::default();
        self.fru_records.clear();
        self.host_firmware_up = None;
    }

    pub fn lookup_sensor_info(&self, entry: &SensorEntry) -> Result<SensorInfo, LookupError> {
        self.sensors.lookup_sensor_info(entry)
    }

    pub fn handle_state_sensor_event(
        &self,
        entry: &SensorEntry,
        sensor_offset: u8,
        state: EventState,
    ) -> CompletionCode {
        self.sensors
            .handle_state_sensor_event(entry, sensor_offset, state)
    }

    /// RSI of the FRU record set owning `entity`, from the last cycle
    pub fn get_rsi(&self, entity: &Entity) -> Result<u16, LookupError> {
        fru::get_rsi(&self.fru_record_set_pdrs, entity)
    }

    pub fn shared_sensor_map(&self) -> SharedSensorMap {
        self.sensors.clone()
    }

    pub fn tl_info(&self) -> Vec<TlInfo> {
        self.tl_map.values().copied().collect()
    }

    pub fn repository(&self) -> &PdrRepository {
        &self.repo
    }

    pub fn tree(&self) -> &EntityTree {
        &self.tree
    }

    pub fn bmc_tree(&self) -> &EntityTree {
        &self.bmc_tree
    }

    pub fn parents(&self) -> &ParentMap {
        self.merger.parents()
    }

    pub fn object_paths(&self) -> &ObjectPathBuilder {
        &self.paths
    }

    pub fn cycle_state(&self) -> CycleState {
        self.cycle.state()
    }

    pub fn state_sensor_pdrs(&self) -> &[StateSensorPdr] {
        &self.state_sensor_pdrs
    }

    pub fn fru_record_set_pdrs(&self) -> &[FruRecordSetPdr] {
        &self.fru_record_set_pdrs
    }

    pub fn fru_table(&self) -> &FruRecordTable {
        &self.fru_table
    }

    pub fn fru_records(&self) -> &[OwnedFruRecord] {
        &self.fru_records
    }

    pub fn host_firmware_up(&self) -> Option<bool> {
        self.host_firmware_up
    }

    pub fn last_report(&self) -> Option<&CycleReport> {
        self.last_report.as_ref()
    }
}

/// The configured host terminus is known before it reports a locator.
fn seed_terminus_map(config: &HostPdrConfig) -> BTreeMap<TerminusHandle, TlInfo> {
    BTreeMap::from([(
        config.host.terminus_handle,
        TlInfo {
            valid: true,
            eid: config.host.eid,
            tid: config.host.tid,
            terminus_handle: config.host.terminus_handle,
        },
    )])
}
