//! State sensor PDR (DSP0248 28.6)

use super::{encode_record, typed_body, PdrType, RawEntity};
use crate::error::PdrError;
use crate::types::{Entity, EventState, RecordHandle, SensorId, TerminusHandle};
use std::collections::BTreeSet;
use zerocopy::byteorder::little_endian::U16;
use zerocopy::{FromBytes, IntoBytes};
use zerocopy_derive::{
    FromBytes as DeriveFromBytes, Immutable, IntoBytes as DeriveIntoBytes, KnownLayout, Unaligned,
};

#[repr(C)]
#[derive(Debug, Clone, Copy, DeriveFromBytes, DeriveIntoBytes, Immutable, KnownLayout, Unaligned)]
struct RawStateSensorFixed {
    terminus_handle: U16,
    sensor_id: U16,
    entity: RawEntity,
    sensor_init: u8,
    auxiliary_names: u8,
    composite_sensor_count: u8,
}

const FIXED_BODY_LEN: usize = 13;

/// Possible states of one composite sensor
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompositeSensorStates {
    pub state_set_id: u16,
    pub possible_states: BTreeSet<EventState>,
}

impl CompositeSensorStates {
    pub fn new(state_set_id: u16, states: impl IntoIterator<Item = EventState>) -> Self {
        Self {
            state_set_id,
            possible_states: states.into_iter().collect(),
        }
    }

    fn bitfield(&self) -> Vec<u8> {
        let width = self
            .possible_states
            .iter()
            .next_back()
            .map(|max| *max as usize / 8 + 1)
            .unwrap_or(1);
        let mut bits = vec![0u8; width];
        for state in &self.possible_states {
            bits[*state as usize / 8] |= 1 << (state % 8);
        }
        bits
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateSensorPdr {
    pub record_handle: RecordHandle,
    pub terminus_handle: TerminusHandle,
    pub sensor_id: SensorId,
    pub entity: Entity,
    pub sensor_init: u8,
    pub auxiliary_names: bool,
    pub composite_states: Vec<CompositeSensorStates>,
}

/// Largest possible-states bitfield; event states are a single byte
pub const MAX_POSSIBLE_STATES_SIZE: usize = 32;

impl StateSensorPdr {
    pub fn decode(bytes: &[u8]) -> Result<Self, PdrError> {
        let (header, body) = typed_body(bytes, PdrType::StateSensor)?;
        let (fixed, mut rest) =
            RawStateSensorFixed::read_from_prefix(body).map_err(|_| PdrError::TooShort {
                needed: super::PDR_HEADER_LEN + FIXED_BODY_LEN,
                actual: bytes.len(),
            })?;

        let count = fixed.composite_sensor_count as usize;
        let mut composite_states = Vec::with_capacity(count);
        for index in 0..count {
            if rest.len() < 3 {
                return Err(PdrError::MalformedPossibleStates { index });
            }
            let state_set_id = u16::from_le_bytes([rest[0], rest[1]]);
            let size = rest[2] as usize;
            if size > MAX_POSSIBLE_STATES_SIZE {
                return Err(PdrError::MalformedPossibleStates { index });
            }
            let bits = rest
                .get(3..3 + size)
                .ok_or(PdrError::MalformedPossibleStates { index })?;
            let possible_states = bits
                .iter()
                .enumerate()
                .flat_map(|(byte, value)| {
                    (0..8u8)
                        .filter(move |bit| value & (1 << bit) != 0)
                        .map(move |bit| (byte * 8) as u8 + bit)
                })
                .collect();
            composite_states.push(CompositeSensorStates {
                state_set_id,
                possible_states,
            });
            rest = &rest[3 + size..];
        }

        Ok(Self {
            record_handle: header.record_handle,
            terminus_handle: fixed.terminus_handle.get(),
            sensor_id: fixed.sensor_id.get(),
            entity: Entity::from(fixed.entity),
            sensor_init: fixed.sensor_init,
            auxiliary_names: fixed.auxiliary_names != 0,
            composite_states,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let fixed = RawStateSensorFixed {
            terminus_handle: U16::new(self.terminus_handle),
            sensor_id: U16::new(self.sensor_id),
            entity: RawEntity::from(&self.entity),
            sensor_init: self.sensor_init,
            auxiliary_names: self.auxiliary_names as u8,
            composite_sensor_count: self.composite_states.len() as u8,
        };
        let mut body = fixed.as_bytes().to_vec();
        for composite in &self.composite_states {
            let bits = composite.bitfield();
            body.extend_from_slice(&composite.state_set_id.to_le_bytes());
            body.push(bits.len() as u8);
            body.extend_from_slice(&bits);
        }
        encode_record(PdrType::StateSensor, self.record_handle, &body)
    }
}
