//! Fetch cycles against a scripted host

use super::support::*;
use hostpdr::event::{EventDataFormat, PdrRepositoryChgEvent, PDR_REPOSITORY_CHG_EVENT};
use hostpdr::fetch::CycleState;
use hostpdr::fru::FruTableMetadata;
use hostpdr::pdr::PdrType;
use hostpdr::transport::{
    GetPdrRequest, GetPdrResponse, StateFieldReading, StateSensorReadings, TransferFlag,
};
use hostpdr::types::{CompletionCode, Entity, SensorEntry};
use hostpdr::{FetchError, TransportError};

#[tokio::test]
async fn test_two_page_full_fetch() {
    let host = two_page_host();
    let (mut handler, _host_state) = handler_with(test_config(), host.clone());
    let bmc_nodes = handler.tree().len();

    let report = handler.fetch(Vec::new()).await.unwrap().unwrap();

    // one GetPDR per page, following next-record-handle
    assert_eq!(
        host.requests(),
        vec![GetPdrRequest::first_part(0), GetPdrRequest::first_part(5)]
    );
    assert_eq!(report.requests, 2);

    // state sensor, FRU record set and the merged association
    let repo = handler.repository();
    assert_eq!(repo.len(), 3);
    assert!(repo.iter().all(|r| r.is_remote));
    assert_eq!(repo.find_by_type(PdrType::EntityAssociation).count(), 1);

    assert_eq!(report.nodes_grafted, 1);
    assert_eq!(handler.tree().len(), bmc_nodes + 1);
    assert!(handler.tree().find_by_identity(135, 1).is_some());

    let sensors = handler.shared_sensor_map().snapshot();
    assert_eq!(sensors.len(), 1);
    assert!(sensors.contains(&SensorEntry::new(HOST_TID, 10)));

    assert_eq!(handler.fru_table().len(), 1);
    assert_eq!(handler.get_rsi(&Entity::new(135, 1, 0)), Ok(3));

    let events = host.events();
    assert_eq!(events.len(), 1);
    assert!(report.notified);
    assert_eq!(handler.cycle_state(), CycleState::Idle);
}

#[tokio::test]
async fn test_change_event_names_merged_records() {
    let host = two_page_host();
    let (mut handler, _host_state) = handler_with(test_config(), host.clone());
    handler.fetch(Vec::new()).await.unwrap();

    let events = host.events();
    let event = &events[0];
    assert_eq!(event.event_class, PDR_REPOSITORY_CHG_EVENT);
    assert_eq!(event.tid, 0);

    let decoded = PdrRepositoryChgEvent::decode(&event.event_data).unwrap();
    assert_eq!(decoded.format, EventDataFormat::FormatIsPdrHandles);
    let merged: Vec<u32> = handler
        .repository()
        .find_by_type(PdrType::EntityAssociation)
        .map(|r| r.handle)
        .collect();
    assert_eq!(decoded.entries().collect::<Vec<_>>(), merged);
}

#[tokio::test]
async fn test_repeat_fetch_without_changes_is_quiet() {
    let host = two_page_host();
    let (mut handler, _host_state) = handler_with(test_config(), host.clone());
    handler.fetch(Vec::new()).await.unwrap();

    let report = handler.fetch(Vec::new()).await.unwrap().unwrap();

    assert_eq!(report.nodes_grafted, 0);
    assert_eq!(report.merged_records, 0);
    assert!(!report.notified);
    assert_eq!(
        handler
            .repository()
            .find_by_type(PdrType::EntityAssociation)
            .count(),
        1
    );
    assert_eq!(host.events().len(), 1);
}

#[tokio::test]
async fn test_refetch_after_host_growth_names_only_new_record() {
    let host = two_page_host();
    let (mut handler, _host_state) = handler_with(test_config(), host.clone());
    handler.fetch(Vec::new()).await.unwrap();
    let first: Vec<u32> = handler
        .repository()
        .find_by_type(PdrType::EntityAssociation)
        .map(|r| r.handle)
        .collect();

    host.page(
        5,
        0,
        &[entity_association(
            6,
            Entity::new(64, 1, 0),
            &[Entity::new(135, 1, 0), Entity::new(135, 2, 0)],
        )],
    );
    let report = handler.fetch(Vec::new()).await.unwrap().unwrap();

    assert_eq!(report.nodes_grafted, 1);
    assert!(report.notified);
    let events = host.events();
    assert_eq!(events.len(), 2);
    let decoded = PdrRepositoryChgEvent::decode(&events[1].event_data).unwrap();
    let named: Vec<u32> = decoded.entries().collect();
    assert_eq!(named.len(), 1);
    assert!(!first.contains(&named[0]));
}

#[tokio::test]
async fn test_explicit_handles_do_not_follow_chain() {
    let host = two_page_host();
    let (mut handler, _host_state) = handler_with(test_config(), host.clone());

    let report = handler.fetch(vec![5]).await.unwrap().unwrap();

    assert_eq!(host.requests(), vec![GetPdrRequest::first_part(5)]);
    assert_eq!(handler.repository().len(), 1);
    assert!(!report.notified);
    assert!(host.events().is_empty());
}

#[tokio::test]
async fn test_multipart_record_is_requested_in_parts() {
    let host = ScriptedHost::new();
    let record = state_sensor(7, HOST_TERMINUS, 11, Entity::new(64, 1, 0));
    let (head, tail) = record.split_at(8);
    host.script(
        7,
        0,
        PageScript::Respond(GetPdrResponse {
            transfer_flag: TransferFlag::Start,
            next_data_transfer_handle: 0x77,
            ..GetPdrResponse::complete(0, head.to_vec())
        }),
    );
    host.script(
        7,
        0x77,
        PageScript::Respond(GetPdrResponse {
            transfer_flag: TransferFlag::End,
            ..GetPdrResponse::complete(0, tail.to_vec())
        }),
    );
    let (mut handler, _host_state) = handler_with(test_config(), host.clone());

    let report = handler.fetch(vec![7]).await.unwrap().unwrap();

    assert_eq!(
        host.requests(),
        vec![
            GetPdrRequest::first_part(7),
            GetPdrRequest::next_part(7, 0x77)
        ]
    );
    assert_eq!(report.requests, 2);
    assert_eq!(handler.repository().len(), 1);
    assert_eq!(handler.state_sensor_pdrs().len(), 1);
    assert!(handler
        .lookup_sensor_info(&SensorEntry::new(HOST_TID, 11))
        .is_ok());
}

#[tokio::test]
async fn test_error_completion_code_aborts_cycle() {
    let host = ScriptedHost::new();
    host.page(0, 5, &[state_sensor(1, HOST_TERMINUS, 1, Entity::new(64, 1, 0))]);
    host.script(
        5,
        0,
        PageScript::Respond(GetPdrResponse::error(
            CompletionCode::PLATFORM_INVALID_RECORD_HANDLE,
        )),
    );
    let (mut handler, _host_state) = handler_with(test_config(), host.clone());

    let err = handler.fetch(Vec::new()).await.unwrap_err();
    assert_eq!(
        err,
        FetchError::CompletionCode {
            record_handle: 5,
            code: CompletionCode::PLATFORM_INVALID_RECORD_HANDLE
        }
    );
    assert_eq!(handler.cycle_state(), CycleState::Idle);
    assert_eq!(handler.repository().len(), 1);
    assert!(handler.last_report().is_none());

    // next fetch is a clean cycle
    host.page(5, 0, &[]);
    let report = handler.fetch(Vec::new()).await.unwrap().unwrap();
    assert_eq!(report.requests, 2);
}

#[tokio::test]
async fn test_unanswered_request_aborts_cycle() {
    let host = ScriptedHost::new();
    let (mut handler, _host_state) = handler_with(test_config(), host);

    let err = handler.fetch(vec![42]).await.unwrap_err();
    assert_eq!(err, FetchError::Transport(TransportError::Timeout));
    assert_eq!(handler.cycle_state(), CycleState::Idle);
}

#[tokio::test]
async fn test_fetch_scheduled_during_cycle_runs_afterwards() {
    let host = two_page_host();
    let (mut handler, _host_state) = handler_with(test_config(), host.clone());

    assert!(handler.fetch_pdr(vec![5]));
    // a cycle is pending; this one is deferred behind it
    assert!(!handler.fetch_pdr(Vec::new()));

    handler.run_pending().await.unwrap().unwrap();

    assert_eq!(
        host.requests(),
        vec![
            GetPdrRequest::first_part(5),
            GetPdrRequest::first_part(0),
            GetPdrRequest::first_part(5)
        ]
    );
    assert_eq!(handler.cycle_state(), CycleState::Idle);
    assert_eq!(handler.run_pending().await.unwrap().map(|r| r.requests), None);
}

#[tokio::test]
async fn test_sensor_states_read_after_cycle() {
    let host = two_page_host();
    host.readings(
        10,
        StateSensorReadings {
            completion_code: CompletionCode::SUCCESS,
            fields: vec![StateFieldReading {
                sensor_op_state: 0,
                present_state: 2,
                previous_state: 1,
                event_state: 2,
            }],
        },
    );
    let mut config = test_config();
    config.fetch.sync_sensor_states = true;
    let (mut handler, _host_state) = handler_with(config, host);

    handler.fetch(Vec::new()).await.unwrap();

    let present = handler
        .shared_sensor_map()
        .present_states(&SensorEntry::new(HOST_TID, 10));
    assert_eq!(present, Some(vec![Some(2)]));
}

#[tokio::test]
async fn test_fru_records_fetched_after_cycle() {
    let host = two_page_host();
    // rsi 3, general record, one field: type 2, "ABCD"
    let table = vec![3, 0, 1, 1, 1, 2, 4, b'A', b'B', b'C', b'D'];
    host.fru_table(
        FruTableMetadata {
            total_record_set_identifiers: 1,
            total_table_records: 1,
            table_length: table.len() as u32,
            ..Default::default()
        },
        table,
    );
    let mut config = test_config();
    config.fetch.fetch_fru_table = true;
    let (mut handler, _host_state) = handler_with(config, host);

    let report = handler.fetch(Vec::new()).await.unwrap().unwrap();

    assert_eq!(report.fru_records, 1);
    let record = &handler.fru_records()[0];
    assert_eq!(record.entity.map(|e| e.entity_type), Some(135));
    assert_eq!(record.record.fields[0].value, b"ABCD");
}

#[tokio::test]
async fn test_malformed_record_is_skipped() {
    let host = ScriptedHost::new();
    let mut truncated = state_sensor(1, HOST_TERMINUS, 1, Entity::new(64, 1, 0));
    truncated.truncate(truncated.len() - 1);
    // fix up the declared length so only the body decode fails
    let body_len = (truncated.len() - hostpdr::pdr::PDR_HEADER_LEN) as u16;
    truncated[8..10].copy_from_slice(&body_len.to_le_bytes());
    host.page(
        0,
        0,
        &[truncated, fru_record_set(2, HOST_TERMINUS, 1, Entity::new(64, 1, 0))],
    );
    let (mut handler, _host_state) = handler_with(test_config(), host);

    let report = handler.fetch(Vec::new()).await.unwrap().unwrap();

    assert_eq!(report.records_skipped, 1);
    assert_eq!(handler.repository().len(), 1);
    assert_eq!(handler.fru_table().len(), 1);
}
