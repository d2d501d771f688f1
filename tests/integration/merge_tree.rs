//! Entity association merge across fetch cycles

use super::support::*;
use hostpdr::pdr::{EntityAssociationPdr, PdrType};
use hostpdr::tree::Origin;
use hostpdr::types::Entity;

#[tokio::test]
async fn test_container_ids_consistent_after_merge() {
    let host = ScriptedHost::new();
    host.page(
        0,
        0,
        &[
            entity_association(1, Entity::new(64, 1, 0), &[Entity::new(135, 1, 0), Entity::new(135, 2, 0)]),
            entity_association(2, Entity::new(135, 1, 0), &[Entity::new(135 | 0x8000, 1, 0)]),
        ],
    );
    let (mut handler, _host_state) = handler_with(test_config(), host);

    let report = handler.fetch(Vec::new()).await.unwrap().unwrap();

    assert_eq!(report.nodes_grafted, 3);
    let tree = handler.tree();
    assert!(tree.container_ids_consistent());

    let cpu1 = tree.find_by_identity(135, 1).unwrap();
    let core = tree.find_by_identity(135 | 0x8000, 1).unwrap();
    assert_eq!(tree.parent(core), Some(cpu1));
    assert_eq!(tree.node(core).unwrap().origin, Origin::Host);
    assert_eq!(
        handler.object_paths().path(tree, core).unwrap(),
        "/xyz/openbmc_project/inventory/system/chassis1/motherboard1/cpu1/core1"
    );
}

#[tokio::test]
async fn test_merged_records_describe_tree() {
    let host = two_page_host();
    let (mut handler, _host_state) = handler_with(test_config(), host);
    handler.fetch(Vec::new()).await.unwrap();

    let tree = handler.tree();
    let board = tree.find_by_identity(64, 1).unwrap();
    let record = handler
        .repository()
        .find_by_type(PdrType::EntityAssociation)
        .next()
        .unwrap();
    assert_eq!(record.terminus_handle, HOST_TERMINUS);

    let pdr = EntityAssociationPdr::decode(&record.data).unwrap();
    assert_eq!(pdr.record_handle, record.handle);
    assert_eq!(pdr.container, tree.entity(board).unwrap());
    assert_eq!(
        Some(pdr.container_id),
        tree.node(board).unwrap().child_container_id()
    );
    assert!(pdr.children.iter().any(|c| c.entity_type == 135));
}

#[tokio::test]
async fn test_parent_map_kept_across_cycles() {
    let host = ScriptedHost::new();
    host.page(
        0,
        0,
        &[entity_association(1, Entity::new(64, 1, 0), &[Entity::new(135, 1, 0)])],
    );
    let (mut handler, _host_state) = handler_with(test_config(), host.clone());
    handler.fetch(Vec::new()).await.unwrap();
    let first: Vec<_> = handler.parents().iter().collect();
    let board = handler.tree().find_by_identity(64, 1).unwrap();
    assert_eq!(handler.parents().get(64), Some(board));

    // the host now reports a second board; the established parent wins
    host.page(
        0,
        0,
        &[entity_association(1, Entity::new(64, 2, 0), &[Entity::new(135, 2, 0)])],
    );
    handler.fetch(Vec::new()).await.unwrap();

    for (entity_type, node) in first {
        assert_eq!(handler.parents().get(entity_type), Some(node));
    }
    let cpu2 = handler.tree().find_by_identity(135, 2).unwrap();
    assert_eq!(handler.tree().parent(cpu2), Some(board));
    assert!(handler.tree().container_ids_consistent());
}

#[tokio::test]
async fn test_repeated_cycle_grafts_nothing_new() {
    let host = two_page_host();
    let (mut handler, _host_state) = handler_with(test_config(), host);
    handler.fetch(Vec::new()).await.unwrap();
    let nodes = handler.tree().len();

    let report = handler.fetch(Vec::new()).await.unwrap().unwrap();

    assert_eq!(report.nodes_grafted, 0);
    assert_eq!(handler.tree().len(), nodes);
}

#[tokio::test]
async fn test_configured_host_parent_attaches_container() {
    let host = ScriptedHost::new();
    // the host reports a DCM the BMC does not know, holding a CPU
    host.page(
        0,
        0,
        &[entity_association(1, Entity::new(67, 1, 0), &[Entity::new(135, 1, 0)])],
    );
    let config = with_host_parent(test_config(), 67, 64, 1);
    let (mut handler, _host_state) = handler_with(config, host);

    handler.fetch(Vec::new()).await.unwrap();

    let tree = handler.tree();
    let board = tree.find_by_identity(64, 1).unwrap();
    let dcm = tree.find_by_identity(67, 1).unwrap();
    assert_eq!(tree.parent(dcm), Some(board));
    assert_eq!(handler.parents().get(67), Some(dcm));
    assert!(tree.container_ids_consistent());
}

#[tokio::test]
async fn test_malformed_association_is_skipped() {
    let host = ScriptedHost::new();
    let mut broken = entity_association(1, Entity::new(64, 1, 0), &[Entity::new(135, 1, 0)]);
    // claim three children while carrying one
    let count_offset = hostpdr::pdr::PDR_HEADER_LEN + 9;
    broken[count_offset] = 3;
    host.page(
        0,
        0,
        &[
            broken,
            entity_association(2, Entity::new(64, 1, 0), &[Entity::new(66, 1, 0)]),
        ],
    );
    let (mut handler, _host_state) = handler_with(test_config(), host);

    let report = handler.fetch(Vec::new()).await.unwrap().unwrap();

    assert_eq!(report.records_skipped, 1);
    assert_eq!(report.nodes_grafted, 1);
    assert!(handler.tree().find_by_identity(66, 1).is_some());
}

#[tokio::test]
async fn test_cores_stay_with_their_cpu() {
    let host = ScriptedHost::new();
    let core = 135 | 0x8000;
    host.page(
        0,
        0,
        &[
            entity_association(1, Entity::new(64, 1, 0), &[Entity::new(135, 1, 40), Entity::new(135, 2, 40)]),
            entity_association(2, Entity::new(135, 1, 40), &[Entity::new(core, 1, 41)]),
            entity_association(3, Entity::new(135, 2, 40), &[Entity::new(core, 1, 42)]),
        ],
    );
    let (mut handler, _host_state) = handler_with(test_config(), host);

    let report = handler.fetch(Vec::new()).await.unwrap().unwrap();

    assert_eq!(report.nodes_grafted, 4);
    let tree = handler.tree();
    let board = tree.find_by_identity(64, 1).unwrap();
    let cpu2 = tree.find_child(board, 135, 2).unwrap();
    let cpu2_core = tree.find_child(cpu2, core, 1).unwrap();
    assert_eq!(tree.children(cpu2).len(), 1);
    assert_eq!(
        handler.object_paths().path(tree, cpu2_core).unwrap(),
        "/xyz/openbmc_project/inventory/system/chassis1/motherboard1/cpu2/core1"
    );
    assert!(tree.container_ids_consistent());
}
