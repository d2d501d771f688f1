//! Human-readable rendering of handler state (comfy-table)

use crate::error::PdrError;
use crate::fru::{FruRecordTable, OwnedFruRecord};
use crate::handler::CycleReport;
use crate::pdr::{
    EntityAssociationPdr, FruRecordSetPdr, PdrHeader, PdrType, StateSensorPdr, TerminusLocatorPdr,
};
use crate::sensor::SensorMap;
use crate::store::PdrRepository;
use crate::transport::PlatformEventMessage;
use crate::tree::path::ObjectPathBuilder;
use crate::tree::{EntityTree, Origin};
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;

pub fn format_section_heading(title: &str) -> String {
    format!("{}\n{}", title, "-".repeat(title.len()))
}

fn type_name(pdr_type: u8) -> String {
    match PdrType::from_u8(pdr_type) {
        Some(kind) => format!("{:?}", kind),
        None => format!("Unknown({})", pdr_type),
    }
}

fn table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(header);
    table
}

pub fn format_cycle_report(report: &CycleReport) -> String {
    let mut out = format!("{}\n\n", format_section_heading("Fetch cycle"));
    let mut t = table(vec!["Metric", "Value"]);
    let elapsed = report.finished_at - report.started_at;
    let rows = [
        ("Started", report.started_at.to_rfc3339()),
        ("Duration (ms)", elapsed.num_milliseconds().to_string()),
        ("GetPDR requests", report.requests.to_string()),
        ("Records stored", report.records_stored.to_string()),
        ("Records skipped", report.records_skipped.to_string()),
        ("Entity associations", report.entity_associations.to_string()),
        ("Merged associations stored", report.merged_records.to_string()),
        ("Nodes grafted", report.nodes_grafted.to_string()),
        ("Sensors", report.sensors.to_string()),
        ("Dropped sensors", report.dropped_sensors.len().to_string()),
        ("FRU record sets", report.fru_record_sets.to_string()),
        ("FRU records", report.fru_records.to_string()),
        ("Host notified", if report.notified { "yes" } else { "no" }.to_string()),
    ];
    for (metric, value) in rows {
        t.add_row(vec![metric.to_string(), value]);
    }
    out.push_str(&format!("{}\n", t));
    out
}

pub fn format_repository(repo: &PdrRepository) -> String {
    let mut out = format!("{}\n\n", format_section_heading("PDR repository"));
    if repo.is_empty() {
        out.push_str("No records.\n");
        return out;
    }
    let mut t = table(vec!["Handle", "Type", "Remote", "Terminus", "Host handle", "Bytes"]);
    for record in repo.iter() {
        t.add_row(vec![
            record.handle.to_string(),
            type_name(record.pdr_type),
            if record.is_remote { "yes" } else { "no" }.to_string(),
            record.terminus_handle.to_string(),
            record.source_handle.to_string(),
            record.data.len().to_string(),
        ]);
    }
    out.push_str(&format!("{}\n", t));
    out
}

pub fn format_tree(tree: &EntityTree, paths: &ObjectPathBuilder) -> String {
    let mut out = format!("{}\n\n", format_section_heading("Entity tree"));
    if tree.is_empty() {
        out.push_str("Empty.\n");
        return out;
    }
    let mut t = table(vec!["Node", "Entity", "Origin", "Association", "Path"]);
    for id in tree.walk() {
        let Some(node) = tree.node(id) else {
            continue;
        };
        let origin = match node.origin {
            Origin::Bmc => "bmc",
            Origin::Host => "host",
        };
        t.add_row(vec![
            id.index().to_string(),
            node.entity.to_string(),
            origin.to_string(),
            format!("{:?}", node.association),
            paths.path(tree, id).unwrap_or_default(),
        ]);
    }
    out.push_str(&format!("{}\n", t));
    out
}

pub fn format_sensor_map(map: &SensorMap) -> String {
    let mut out = format!("{}\n\n", format_section_heading("Sensor map"));
    if map.is_empty() {
        out.push_str("No sensors.\n");
        return out;
    }
    let mut t = table(vec!["TID", "Sensor", "Entity", "State sets", "Path"]);
    for (entry, info) in map.iter() {
        let state_sets = info
            .composite_states
            .iter()
            .map(|c| {
                let states: Vec<String> = c.possible_states.iter().map(|s| s.to_string()).collect();
                format!("{}[{}]", c.state_set_id, states.join(","))
            })
            .collect::<Vec<_>>()
            .join(" ");
        t.add_row(vec![
            entry.terminus_id.to_string(),
            entry.sensor_id.to_string(),
            info.entity.to_string(),
            state_sets,
            info.object_path.clone().unwrap_or_else(|| "-".to_string()),
        ]);
    }
    out.push_str(&format!("{}\n", t));
    out
}

pub fn format_fru(table_data: &FruRecordTable, records: &[OwnedFruRecord]) -> String {
    let mut out = format!("{}\n\n", format_section_heading("FRU record sets"));
    if table_data.is_empty() {
        out.push_str("No FRU record sets.\n");
    } else {
        let mut t = table(vec!["RSI", "Terminus", "Entity"]);
        for entry in table_data.entries() {
            t.add_row(vec![
                entry.fru_rsi.to_string(),
                entry.terminus_handle.to_string(),
                entry.entity.to_string(),
            ]);
        }
        out.push_str(&format!("{}\n", t));
    }

    if !records.is_empty() {
        out.push_str(&format!("\n{}\n\n", format_section_heading("FRU records")));
        let mut t = table(vec!["RSI", "Type", "Entity", "Fields"]);
        for owned in records {
            let fields = owned
                .record
                .fields
                .iter()
                .map(|f| format!("{}={}", f.field_type, String::from_utf8_lossy(&f.value)))
                .collect::<Vec<_>>()
                .join(" ");
            t.add_row(vec![
                owned.record.record_set_id.to_string(),
                owned.record.record_type.to_string(),
                owned
                    .entity
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                fields,
            ]);
        }
        out.push_str(&format!("{}\n", t));
    }
    out
}

pub fn format_events(events: &[PlatformEventMessage]) -> String {
    let mut out = format!("{}\n\n", format_section_heading("Events sent to host"));
    if events.is_empty() {
        out.push_str("None.\n");
        return out;
    }
    let mut t = table(vec!["Class", "TID", "Payload"]);
    for event in events {
        t.add_row(vec![
            format!("{:#04x}", event.event_class),
            event.tid.to_string(),
            hex::encode(&event.event_data),
        ]);
    }
    out.push_str(&format!("{}\n", t));
    out
}

/// Header and body fields of a single encoded PDR.
pub fn format_pdr(bytes: &[u8]) -> Result<String, PdrError> {
    let header = PdrHeader::parse_exact(bytes)?;
    let mut rows: Vec<(String, String)> = vec![
        ("Record handle".into(), header.record_handle.to_string()),
        ("Version".into(), header.version.to_string()),
        ("Type".into(), type_name(header.pdr_type)),
        ("Change number".into(), header.record_change_num.to_string()),
        ("Body length".into(), header.length.to_string()),
    ];

    match header.kind() {
        Some(PdrType::EntityAssociation) => {
            let pdr = EntityAssociationPdr::decode(bytes)?;
            rows.push(("Container id".into(), pdr.container_id.to_string()));
            rows.push(("Association".into(), format!("{:?}", pdr.association_type)));
            rows.push(("Container".into(), pdr.container.to_string()));
            for (i, child) in pdr.children.iter().enumerate() {
                rows.push((format!("Child {}", i), child.to_string()));
            }
        }
        Some(PdrType::StateSensor) => {
            let pdr = StateSensorPdr::decode(bytes)?;
            rows.push(("Terminus handle".into(), pdr.terminus_handle.to_string()));
            rows.push(("Sensor id".into(), pdr.sensor_id.to_string()));
            rows.push(("Entity".into(), pdr.entity.to_string()));
            for (i, c) in pdr.composite_states.iter().enumerate() {
                let states: Vec<String> = c.possible_states.iter().map(|s| s.to_string()).collect();
                rows.push((
                    format!("Composite {}", i),
                    format!("state set {} [{}]", c.state_set_id, states.join(",")),
                ));
            }
        }
        Some(PdrType::FruRecordSet) => {
            let pdr = FruRecordSetPdr::decode(bytes)?;
            rows.push(("Terminus handle".into(), pdr.terminus_handle.to_string()));
            rows.push(("FRU RSI".into(), pdr.fru_rsi.to_string()));
            rows.push(("Entity".into(), pdr.entity.to_string()));
        }
        Some(PdrType::TerminusLocator) => {
            let pdr = TerminusLocatorPdr::decode(bytes)?;
            rows.push(("Terminus handle".into(), pdr.terminus_handle.to_string()));
            rows.push(("Valid".into(), pdr.valid.to_string()));
            rows.push(("TID".into(), pdr.tid.to_string()));
            rows.push(("Locator type".into(), pdr.locator_type.to_string()));
            rows.push((
                "EID".into(),
                pdr.eid().map(|e| e.to_string()).unwrap_or_else(|| "-".to_string()),
            ));
        }
        _ => rows.push(("Body".into(), hex::encode(&bytes[crate::pdr::PDR_HEADER_LEN..]))),
    }

    let mut t = table(vec!["Field", "Value"]);
    for (field, value) in rows {
        t.add_row(vec![field, value]);
    }
    Ok(format!("{}\n", t))
}
