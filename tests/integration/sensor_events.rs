//! Sensor map construction and state sensor event handling

use super::support::*;
use hostpdr::types::{CompletionCode, Entity, SensorEntry};
use hostpdr::LookupError;

#[tokio::test]
async fn test_sensor_with_unknown_terminus_is_dropped() {
    let host = ScriptedHost::new();
    host.page(
        0,
        0,
        &[
            state_sensor(1, HOST_TERMINUS, 10, Entity::new(64, 1, 0)),
            state_sensor(2, 7, 11, Entity::new(64, 1, 0)),
        ],
    );
    let (mut handler, _host_state) = handler_with(test_config(), host);

    let report = handler.fetch(Vec::new()).await.unwrap().unwrap();

    assert_eq!(report.sensors, 1);
    assert_eq!(report.dropped_sensors.len(), 1);
    let dropped = &report.dropped_sensors[0];
    assert_eq!(dropped.sensor_id, 11);
    assert_eq!(dropped.terminus_handle, 7);
    // both PDRs are still stored
    assert_eq!(handler.repository().len(), 2);
}

#[tokio::test]
async fn test_terminus_locator_makes_sensor_reachable() {
    let host = ScriptedHost::new();
    host.page(
        0,
        0,
        &[
            terminus_locator(1, 7, 3, 20),
            state_sensor(2, 7, 11, Entity::new(64, 1, 0)),
        ],
    );
    let (mut handler, _host_state) = handler_with(test_config(), host);

    let report = handler.fetch(Vec::new()).await.unwrap().unwrap();

    assert!(report.dropped_sensors.is_empty());
    let info = handler
        .lookup_sensor_info(&SensorEntry::new(3, 11))
        .unwrap();
    assert_eq!(info.entity.entity_type, 64);
    assert_eq!(
        info.object_path.as_deref(),
        Some("/xyz/openbmc_project/inventory/system/chassis1/motherboard1")
    );
    assert!(handler
        .tl_info()
        .iter()
        .any(|tl| tl.terminus_handle == 7 && tl.eid == 20));
}

#[tokio::test]
async fn test_event_for_unknown_sensor_is_rejected() {
    let host = two_page_host();
    let (mut handler, _host_state) = handler_with(test_config(), host);
    handler.fetch(Vec::new()).await.unwrap();

    let missing = SensorEntry::new(HOST_TID, 999);
    assert_eq!(
        handler.handle_state_sensor_event(&missing, 0, 1),
        CompletionCode::PLATFORM_INVALID_SENSOR_ID
    );
    assert_eq!(
        handler.lookup_sensor_info(&missing),
        Err(LookupError::SensorNotFound(missing))
    );
}

#[tokio::test]
async fn test_event_checks_offset_and_state() {
    let host = two_page_host();
    let (mut handler, _host_state) = handler_with(test_config(), host);
    handler.fetch(Vec::new()).await.unwrap();
    let entry = SensorEntry::new(HOST_TID, 10);

    assert_eq!(
        handler.handle_state_sensor_event(&entry, 0, 2),
        CompletionCode::SUCCESS
    );
    assert_eq!(
        handler.handle_state_sensor_event(&entry, 1, 2),
        CompletionCode::ERROR_INVALID_DATA
    );
    assert_eq!(
        handler.handle_state_sensor_event(&entry, 0, 9),
        CompletionCode::PLATFORM_INVALID_STATE_VALUE
    );
    assert_eq!(
        handler.shared_sensor_map().present_states(&entry),
        Some(vec![Some(2)])
    );
}

#[tokio::test]
async fn test_lookup_returns_what_was_fetched() {
    let host = two_page_host();
    let (mut handler, _host_state) = handler_with(test_config(), host);
    handler.fetch(Vec::new()).await.unwrap();

    for pdr in handler.state_sensor_pdrs() {
        let info = handler
            .lookup_sensor_info(&SensorEntry::new(HOST_TID, pdr.sensor_id))
            .unwrap();
        assert_eq!(info.entity, pdr.entity);
        assert_eq!(info.composite_states, pdr.composite_states);
    }
}

#[tokio::test]
async fn test_readers_keep_snapshot_across_rebuild() {
    let host = two_page_host();
    let (mut handler, _host_state) = handler_with(test_config(), host.clone());
    handler.fetch(Vec::new()).await.unwrap();
    let shared = handler.shared_sensor_map();
    let before = shared.snapshot();

    host.page(0, 0, &[]);
    handler.fetch(Vec::new()).await.unwrap();

    // the old snapshot is untouched; new readers see the rebuilt map
    assert_eq!(before.len(), 1);
    assert!(shared.snapshot().is_empty());
}

#[tokio::test]
async fn test_sensor_paths_follow_host_container() {
    let host = ScriptedHost::new();
    let core = 135 | 0x8000;
    host.page(
        0,
        0,
        &[
            entity_association(1, Entity::new(64, 1, 0), &[Entity::new(135, 1, 40), Entity::new(135, 2, 40)]),
            entity_association(2, Entity::new(135, 1, 40), &[Entity::new(core, 1, 41)]),
            entity_association(3, Entity::new(135, 2, 40), &[Entity::new(core, 1, 42)]),
            state_sensor(4, HOST_TERMINUS, 20, Entity::new(core, 1, 41)),
            state_sensor(5, HOST_TERMINUS, 21, Entity::new(core, 1, 42)),
        ],
    );
    let (mut handler, _host_state) = handler_with(test_config(), host);

    handler.fetch(Vec::new()).await.unwrap();

    let path = |sensor_id| {
        handler
            .lookup_sensor_info(&SensorEntry::new(HOST_TID, sensor_id))
            .unwrap()
            .object_path
    };
    let board = "/xyz/openbmc_project/inventory/system/chassis1/motherboard1";
    assert_eq!(path(20), Some(format!("{board}/cpu1/core1")));
    assert_eq!(path(21), Some(format!("{board}/cpu2/core1")));
}
