//! Replaying a capture through the CLI route table

use super::support::*;
use hostpdr::cli::{Commands, OutputFormat, RunContext};
use hostpdr::replay::{Capture, CapturedEntity, CapturedGetPdr};
use hostpdr::transport::GetPdrResponse;
use hostpdr::types::Entity;
use hostpdr::ApiError;
use std::path::PathBuf;
use tempfile::TempDir;

fn write_capture(dir: &TempDir) -> PathBuf {
    let page1 = [
        entity_association(1, Entity::new(64, 1, 0), &[Entity::new(135, 1, 0)]),
        state_sensor(2, HOST_TERMINUS, 10, Entity::new(135, 1, 0)),
    ]
    .concat();
    let page2 = fru_record_set(5, HOST_TERMINUS, 3, Entity::new(135, 1, 0));
    let capture = Capture {
        get_pdr: vec![
            CapturedGetPdr {
                record_handle: 0,
                data_transfer_handle: 0,
                response: GetPdrResponse::complete(5, page1),
            },
            CapturedGetPdr {
                record_handle: 5,
                data_transfer_handle: 0,
                response: GetPdrResponse::complete(0, page2),
            },
        ],
        bmc_entities: vec![
            CapturedEntity {
                entity_type: 45,
                instance: 1,
                parent: None,
                logical: false,
            },
            CapturedEntity {
                entity_type: 64,
                instance: 1,
                parent: Some(0),
                logical: false,
            },
        ],
        ..Default::default()
    };
    let path = dir.path().join("capture.json");
    std::fs::write(&path, serde_json::to_string_pretty(&capture).unwrap()).unwrap();
    path
}

#[tokio::test]
async fn test_replay_json_output() {
    let dir = TempDir::new().unwrap();
    let capture = write_capture(&dir);
    let ctx = RunContext::from_config(test_config(), None).unwrap();

    let out = ctx
        .execute(&Commands::Replay {
            capture,
            handles: Vec::new(),
            format: OutputFormat::Json,
        })
        .await
        .unwrap();

    let value: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(value["cycle"]["requests"], 2);
    assert_eq!(value["repository"].as_array().unwrap().len(), 3);
    assert_eq!(value["sensors"].as_array().unwrap().len(), 1);
    assert_eq!(value["events"].as_array().unwrap().len(), 1);
    assert_eq!(value["entities"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_replay_text_output() {
    let dir = TempDir::new().unwrap();
    let capture = write_capture(&dir);
    let ctx = RunContext::from_config(test_config(), None).unwrap();

    let out = ctx
        .execute(&Commands::Replay {
            capture,
            handles: Vec::new(),
            format: OutputFormat::Text,
        })
        .await
        .unwrap();

    assert!(out.contains("Fetch cycle"));
    assert!(out.contains("chassis1/motherboard1/cpu1"));
    assert!(out.contains("Events sent to host"));
}

#[tokio::test]
async fn test_replay_missing_page_fails() {
    let dir = TempDir::new().unwrap();
    let capture = write_capture(&dir);
    let ctx = RunContext::from_config(test_config(), None).unwrap();

    let err = ctx
        .execute(&Commands::Replay {
            capture,
            handles: vec![77],
            format: OutputFormat::Text,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Fetch(_)));
}

#[tokio::test]
async fn test_replay_bundled_demo_capture() {
    let capture = PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/demos/capture.json"));
    let ctx = RunContext::from_config(hostpdr::HostPdrConfig::default(), None).unwrap();

    let out = ctx
        .execute(&Commands::Replay {
            capture,
            handles: Vec::new(),
            format: OutputFormat::Json,
        })
        .await
        .unwrap();

    let value: serde_json::Value = serde_json::from_str(&out).unwrap();
    // sensor, locator, FRU record set and the merged association
    assert_eq!(value["repository"].as_array().unwrap().len(), 4);
    assert_eq!(value["cycle"]["nodes_grafted"], 2);
    assert_eq!(value["cycle"]["fru_records"], 1);
    assert_eq!(value["sensors"][0]["sensor_id"], 10);
    assert_eq!(value["events"].as_array().unwrap().len(), 1);
}
