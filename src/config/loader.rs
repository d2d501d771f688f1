//! Layered configuration loading.

use super::merge::merge_policy;
use super::sources::{explicit_file, system_file};
use super::HostPdrConfig;
use config::{ConfigError, Environment, File};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment prefix; `HOSTPDR__HOST__EID=10` sets `host.eid`.
pub const ENV_PREFIX: &str = "HOSTPDR";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration.
    ///
    /// Precedence (highest last): defaults, system files, `explicit`,
    /// `HOSTPDR__*` environment variables.
    pub fn load(explicit: Option<&Path>) -> Result<HostPdrConfig, ConfigError> {
        let mut builder = merge_policy::builder_with_defaults()?;
        builder = system_file::add_to_builder(builder)?;
        if let Some(path) = explicit {
            debug!(config_path = %path.display(), "Adding explicit configuration file");
            builder = explicit_file::add_to_builder(builder, path)?;
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );
        builder.build()?.try_deserialize()
    }

    /// Load a single file over the defaults, ignoring other sources.
    pub fn load_from_file(path: &Path) -> Result<HostPdrConfig, ConfigError> {
        merge_policy::builder_with_defaults()?
            .add_source(File::from(path).required(true))
            .build()?
            .try_deserialize()
    }

    pub fn xdg_config_path() -> Option<PathBuf> {
        system_file::xdg_config_path()
    }
}
