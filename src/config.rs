//! Configuration System
//!
//! Layered configuration for the host PDR exchange: built-in defaults, the
//! system config file, an explicit file and `HOSTPDR__*` environment
//! overrides, validated before use.

use crate::event::EventDataFormat;
use crate::logging::LoggingConfig;
use crate::merge::ParentRule;
use crate::types::{Eid, EntityType, TerminusHandle, TerminusId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

mod loader;
mod merge;
mod sources;

pub use loader::ConfigLoader;

/// Default root for inventory object paths
pub const DEFAULT_OBJECT_PATH_ROOT: &str = "/xyz/openbmc_project/inventory/system";

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostPdrConfig {
    #[serde(default)]
    pub host: HostConfig,

    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub inventory: InventoryConfig,

    /// Where host containers attach on the first merge
    #[serde(default)]
    pub host_parents: Vec<HostParentConfig>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Addressing of the host terminus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// MCTP endpoint id of host firmware
    #[serde(default = "default_host_eid")]
    pub eid: Eid,

    /// Terminus id the host is known by before it reports a locator
    #[serde(default = "default_host_tid")]
    pub tid: TerminusId,

    /// Terminus handle the host uses in its own PDRs
    #[serde(default = "default_host_terminus_handle")]
    pub terminus_handle: TerminusHandle,
}

fn default_host_eid() -> Eid {
    9
}

fn default_host_tid() -> TerminusId {
    1
}

fn default_host_terminus_handle() -> TerminusHandle {
    1
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            eid: default_host_eid(),
            tid: default_host_tid(),
            terminus_handle: default_host_terminus_handle(),
        }
    }
}

/// Follow-up work done at the end of a fetch cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Query the host FRU record table after the sensor map is built
    #[serde(default = "default_true")]
    pub fetch_fru_table: bool,

    /// Read current host sensor states once the map is rebuilt
    #[serde(default = "default_true")]
    pub sync_sensor_states: bool,

    /// Payload format of the repository change event sent after a merge
    #[serde(default = "default_notify_format")]
    pub notify_format: EventDataFormat,
}

fn default_true() -> bool {
    true
}

fn default_notify_format() -> EventDataFormat {
    EventDataFormat::FormatIsPdrHandles
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            fetch_fru_table: default_true(),
            sync_sensor_states: default_true(),
            notify_format: default_notify_format(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryConfig {
    #[serde(default = "default_object_path_root")]
    pub object_path_root: String,

    /// Extra or overriding path segment names
    #[serde(default)]
    pub entity_names: Vec<EntityNameConfig>,
}

fn default_object_path_root() -> String {
    DEFAULT_OBJECT_PATH_ROOT.to_string()
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            object_path_root: default_object_path_root(),
            entity_names: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityNameConfig {
    pub entity_type: EntityType,
    pub name: String,
}

/// Host container type → BMC entity it attaches under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostParentConfig {
    pub entity_type: EntityType,
    pub parent_type: EntityType,
    pub parent_instance: u16,
}

/// Configuration validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    Host(String),
    HostParent(EntityType, String),
    Inventory(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Host(msg) => write!(f, "Host: {}", msg),
            ValidationError::HostParent(ty, msg) => {
                write!(f, "Host parent for entity type {}: {}", ty, msg)
            }
            ValidationError::Inventory(msg) => write!(f, "Inventory: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl HostConfig {
    pub fn validate(&self) -> Result<(), String> {
        // 0 is the null EID and 0xFF the broadcast EID
        if self.eid == 0 || self.eid == 0xFF {
            return Err(format!("EID {} is reserved", self.eid));
        }
        if self.tid == 0 || self.tid == crate::types::TID_RESERVED {
            return Err(format!("TID {} is reserved", self.tid));
        }
        Ok(())
    }
}

impl HostPdrConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(e) = self.host.validate() {
            errors.push(ValidationError::Host(e));
        }

        if self.inventory.object_path_root.trim_end_matches('/').is_empty() {
            errors.push(ValidationError::Inventory(
                "object_path_root cannot be empty".to_string(),
            ));
        }
        if !self.inventory.object_path_root.starts_with('/') {
            errors.push(ValidationError::Inventory(format!(
                "object_path_root '{}' must be absolute",
                self.inventory.object_path_root
            )));
        }

        let mut seen = BTreeSet::new();
        for parent in &self.host_parents {
            if !seen.insert(parent.entity_type) {
                errors.push(ValidationError::HostParent(
                    parent.entity_type,
                    "Duplicate entry".to_string(),
                ));
            }
            if parent.entity_type == parent.parent_type {
                errors.push(ValidationError::HostParent(
                    parent.entity_type,
                    "Entity type cannot be its own parent".to_string(),
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Configured host parents as merge rules
    pub fn parent_rules(&self) -> BTreeMap<EntityType, ParentRule> {
        self.host_parents
            .iter()
            .map(|p| {
                (
                    p.entity_type,
                    ParentRule {
                        parent_type: p.parent_type,
                        parent_instance: p.parent_instance,
                    },
                )
            })
            .collect()
    }

    pub fn entity_names(&self) -> BTreeMap<EntityType, String> {
        self.inventory
            .entity_names
            .iter()
            .map(|n| (n.entity_type, n.name.clone()))
            .collect()
    }
}
