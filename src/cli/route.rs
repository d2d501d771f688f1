//! CLI route: single route table and run context.

use crate::cli::parse::{Commands, OutputFormat};
use crate::config::{ConfigLoader, HostPdrConfig};
use crate::error::ApiError;
use crate::handler::{CycleReport, HostPdrHandler};
use crate::replay::{Capture, ReplayTransport};
use crate::report;
use crate::store::PdrRepository;
use crate::types::HostState;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

/// Runtime context for CLI execution: the validated configuration.
pub struct RunContext {
    config: HostPdrConfig,
    config_path: Option<PathBuf>,
}

impl RunContext {
    /// Load and validate configuration. Uses ConfigLoader only.
    pub fn new(config_path: Option<PathBuf>) -> Result<Self, ApiError> {
        let config = ConfigLoader::load(config_path.as_deref())?;
        Self::from_config(config, config_path)
    }

    pub fn from_config(
        config: HostPdrConfig,
        config_path: Option<PathBuf>,
    ) -> Result<Self, ApiError> {
        config.validate().map_err(|errors| {
            ApiError::ConfigError(
                errors
                    .iter()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join("; "),
            )
        })?;
        Ok(Self {
            config,
            config_path,
        })
    }

    pub fn config(&self) -> &HostPdrConfig {
        &self.config
    }

    /// Execute a command and return its rendered output.
    pub async fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        match command {
            Commands::Replay {
                capture,
                handles,
                format,
            } => self.handle_replay(capture, handles.clone(), *format).await,
            Commands::Decode { hex } => handle_decode(hex),
            Commands::ShowConfig => self.handle_show_config(),
        }
    }

    async fn handle_replay(
        &self,
        capture_path: &Path,
        handles: Vec<u32>,
        format: OutputFormat,
    ) -> Result<String, ApiError> {
        let capture = Capture::from_path(capture_path)?;
        let bmc_tree = capture.bmc_tree()?;
        debug!(
            capture = %capture_path.display(),
            pages = capture.get_pdr.len(),
            bmc_entities = bmc_tree.len(),
            "Loaded capture"
        );

        let transport = Arc::new(ReplayTransport::new(capture));
        let (_host_state, host_rx) = watch::channel(HostState::Running);
        let mut handler = HostPdrHandler::new(
            self.config.clone(),
            PdrRepository::new(),
            bmc_tree,
            transport.clone(),
            host_rx,
        );

        let report = handler.fetch(handles).await?;
        info!(requests = transport.requests().len(), "Replay finished");

        match format {
            OutputFormat::Text => Ok(render_text(&handler, report.as_ref(), &transport)),
            OutputFormat::Json => render_json(&handler, report.as_ref(), &transport),
        }
    }

    fn handle_show_config(&self) -> Result<String, ApiError> {
        let mut out = String::new();
        if let Some(path) = &self.config_path {
            out.push_str(&format!("# layered with {}\n", path.display()));
        }
        let body = toml::to_string_pretty(&self.config)
            .map_err(|e| ApiError::ConfigError(e.to_string()))?;
        out.push_str(&body);
        Ok(out)
    }
}

fn handle_decode(input: &str) -> Result<String, ApiError> {
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = hex::decode(&compact).map_err(|e| ApiError::InvalidInput(e.to_string()))?;
    Ok(report::format_pdr(&bytes)?)
}

fn render_text(
    handler: &HostPdrHandler,
    report: Option<&CycleReport>,
    transport: &ReplayTransport,
) -> String {
    let mut sections = Vec::new();
    if let Some(report) = report {
        sections.push(report::format_cycle_report(report));
    }
    sections.push(report::format_repository(handler.repository()));
    sections.push(report::format_tree(handler.tree(), handler.object_paths()));
    sections.push(report::format_sensor_map(&handler.shared_sensor_map().snapshot()));
    sections.push(report::format_fru(handler.fru_table(), handler.fru_records()));
    sections.push(report::format_events(&transport.events()));
    sections.join("\n")
}

fn render_json(
    handler: &HostPdrHandler,
    report: Option<&CycleReport>,
    transport: &ReplayTransport,
) -> Result<String, ApiError> {
    let repository: Vec<_> = handler
        .repository()
        .iter()
        .map(|r| {
            json!({
                "handle": r.handle,
                "pdr_type": r.pdr_type,
                "is_remote": r.is_remote,
                "terminus_handle": r.terminus_handle,
                "source_handle": r.source_handle,
                "data": hex::encode(&r.data),
            })
        })
        .collect();

    let tree = handler.tree();
    let entities: Vec<_> = tree
        .walk()
        .into_iter()
        .filter_map(|id| {
            let entity = tree.entity(id)?;
            Some(json!({
                "entity_type": entity.entity_type,
                "instance": entity.instance,
                "container_id": entity.container_id,
                "path": handler.object_paths().path(tree, id),
            }))
        })
        .collect();

    let sensors: Vec<_> = handler
        .shared_sensor_map()
        .snapshot()
        .iter()
        .map(|(entry, info)| {
            json!({
                "terminus_id": entry.terminus_id,
                "sensor_id": entry.sensor_id,
                "entity": info.entity.to_string(),
                "object_path": info.object_path,
            })
        })
        .collect();

    let events: Vec<_> = transport
        .events()
        .iter()
        .map(|e| json!({ "event_class": e.event_class, "event_data": hex::encode(&e.event_data) }))
        .collect();

    let summary = report.map(|r| {
        json!({
            "started_at": r.started_at.to_rfc3339(),
            "finished_at": r.finished_at.to_rfc3339(),
            "requests": r.requests,
            "records_stored": r.records_stored,
            "records_skipped": r.records_skipped,
            "nodes_grafted": r.nodes_grafted,
            "sensors": r.sensors,
            "dropped_sensors": r.dropped_sensors.len(),
            "fru_records": r.fru_records,
            "notified": r.notified,
        })
    });

    let value = json!({
        "cycle": summary,
        "repository": repository,
        "entities": entities,
        "sensors": sensors,
        "events": events,
    });
    serde_json::to_string_pretty(&value).map_err(|e| ApiError::InvalidInput(e.to_string()))
}
