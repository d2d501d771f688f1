//! Host Sensor Map
//!
//! Lookup from (terminus id, sensor id) to per-sensor metadata, rebuilt from
//! scratch at the end of every fetch cycle and published as an immutable
//! snapshot. The runtime event path reads it through [`SharedSensorMap`].

use crate::error::LookupError;
use crate::pdr::terminus_locator::TlInfo;
use crate::pdr::state_sensor::{CompositeSensorStates, StateSensorPdr};
use crate::tree::path::ObjectPathBuilder;
use crate::tree::EntityTree;
use crate::types::{
    CompletionCode, Entity, EventState, RecordHandle, SensorEntry, SensorId, TerminusHandle,
};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Metadata for one host state sensor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorInfo {
    pub entity: Entity,
    /// Inventory path of the owning entity, if it is in the merged tree
    pub object_path: Option<String>,
    pub composite_states: Vec<CompositeSensorStates>,
}

/// A state sensor PDR left out of the map
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DroppedSensor {
    pub record_handle: RecordHandle,
    pub sensor_id: SensorId,
    pub terminus_handle: TerminusHandle,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SensorMap {
    entries: BTreeMap<SensorEntry, SensorInfo>,
}

impl SensorMap {
    pub fn get(&self, entry: &SensorEntry) -> Option<&SensorInfo> {
        self.entries.get(entry)
    }

    pub fn contains(&self, entry: &SensorEntry) -> bool {
        self.entries.contains_key(entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SensorEntry, &SensorInfo)> {
        self.entries.iter()
    }

    pub fn insert(&mut self, entry: SensorEntry, info: SensorInfo) -> bool {
        match self.entries.entry(entry) {
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(info);
                true
            }
            std::collections::btree_map::Entry::Occupied(_) => false,
        }
    }
}

/// Build a fresh sensor map from one cycle's state sensor PDRs.
///
/// Sensors whose terminus handle has no known terminus locator are dropped
/// and returned alongside the map. When two PDRs share a key the first one
/// wins.
pub fn build_sensor_map(
    pdrs: &[StateSensorPdr],
    tl_map: &BTreeMap<TerminusHandle, TlInfo>,
    tree: &EntityTree,
    paths: &ObjectPathBuilder,
) -> (SensorMap, Vec<DroppedSensor>) {
    let mut map = SensorMap::default();
    let mut dropped = Vec::new();

    for pdr in pdrs {
        let Some(tl) = tl_map.get(&pdr.terminus_handle) else {
            warn!(
                record_handle = pdr.record_handle,
                sensor_id = pdr.sensor_id,
                terminus_handle = pdr.terminus_handle,
                "Dropping state sensor with unknown terminus handle"
            );
            dropped.push(DroppedSensor {
                record_handle: pdr.record_handle,
                sensor_id: pdr.sensor_id,
                terminus_handle: pdr.terminus_handle,
            });
            continue;
        };

        // host numbering first: same-identity entities differ only by container
        let object_path = tree
            .find_host_entity(&pdr.entity)
            .or_else(|| tree.find_by_identity(pdr.entity.entity_type, pdr.entity.instance))
            .and_then(|node| paths.path(tree, node));

        let entry = SensorEntry::new(tl.tid, pdr.sensor_id);
        let inserted = map.insert(
            entry,
            SensorInfo {
                entity: pdr.entity,
                object_path,
                composite_states: pdr.composite_states.clone(),
            },
        );
        if !inserted {
            debug!(%entry, record_handle = pdr.record_handle, "Duplicate state sensor ignored");
        }
    }

    (map, dropped)
}

/// Outcome of validating a state sensor event against the map
pub fn check_state_sensor_event(
    map: &SensorMap,
    entry: &SensorEntry,
    sensor_offset: u8,
    state: EventState,
) -> CompletionCode {
    let Some(info) = map.get(entry) else {
        return CompletionCode::PLATFORM_INVALID_SENSOR_ID;
    };
    let Some(composite) = info.composite_states.get(sensor_offset as usize) else {
        return CompletionCode::ERROR_INVALID_DATA;
    };
    if !composite.possible_states.contains(&state) {
        return CompletionCode::PLATFORM_INVALID_STATE_VALUE;
    }
    CompletionCode::SUCCESS
}

type PresentStates = BTreeMap<SensorEntry, Vec<Option<EventState>>>;

/// Read-mostly handle on the current sensor map.
///
/// Readers take an `Arc` snapshot; the fetch cycle swaps in a new map in one
/// step. Present states reported through events are kept beside the map.
#[derive(Debug, Clone, Default)]
pub struct SharedSensorMap {
    current: Arc<RwLock<Arc<SensorMap>>>,
    present: Arc<Mutex<PresentStates>>,
}

impl SharedSensorMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Arc<SensorMap> {
        Arc::clone(&self.current.read())
    }

    /// Publish a rebuilt map. Present states survive for sensors that kept
    /// their key and composite count.
    pub fn replace(&self, map: SensorMap) {
        let mut present = self.present.lock();
        present.retain(|entry, states| {
            map.get(entry)
                .is_some_and(|info| info.composite_states.len() == states.len())
        });
        *self.current.write() = Arc::new(map);
    }

    pub fn lookup_sensor_info(&self, entry: &SensorEntry) -> Result<SensorInfo, LookupError> {
        self.current
            .read()
            .get(entry)
            .cloned()
            .ok_or(LookupError::SensorNotFound(*entry))
    }

    /// Apply a state change reported by the host for one composite sensor.
    ///
    /// Validation and the write both happen under the present-state lock, so
    /// a concurrent [`replace`](Self::replace) cannot slip in between.
    pub fn handle_state_sensor_event(
        &self,
        entry: &SensorEntry,
        sensor_offset: u8,
        state: EventState,
    ) -> CompletionCode {
        let mut present = self.present.lock();
        let map = self.snapshot();
        let code = check_state_sensor_event(&map, entry, sensor_offset, state);
        if !code.is_success() {
            debug!(%entry, sensor_offset, state, code = %code, "Rejected state sensor event");
            return code;
        }

        let composite_count = map.get(entry).map_or(0, |info| info.composite_states.len());
        let states = present
            .entry(*entry)
            .or_insert_with(|| vec![None; composite_count]);
        if states.len() != composite_count {
            *states = vec![None; composite_count];
        }
        let Some(slot) = states.get_mut(sensor_offset as usize) else {
            return CompletionCode::ERROR_INVALID_DATA;
        };
        *slot = Some(state);
        debug!(%entry, sensor_offset, state, "Recorded sensor state");
        code
    }

    pub fn present_states(&self, entry: &SensorEntry) -> Option<Vec<Option<EventState>>> {
        self.present.lock().get(entry).cloned()
    }
}
