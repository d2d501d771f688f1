//! System config file sources: /etc/hostpdr/config.toml, then
//! $XDG_CONFIG_HOME/hostpdr/config.toml

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::ConfigError;
use config::File;
use std::path::PathBuf;
use tracing::debug;

pub const ETC_CONFIG_PATH: &str = "/etc/hostpdr/config.toml";

/// Path to the per-user config file, when XDG_CONFIG_HOME is set.
pub fn xdg_config_path() -> Option<PathBuf> {
    std::env::var_os("XDG_CONFIG_HOME")
        .filter(|dir| !dir.is_empty())
        .map(|dir| PathBuf::from(dir).join("hostpdr").join("config.toml"))
}

/// Add every system config file that exists, lowest precedence first.
pub fn add_to_builder(
    mut builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let candidates = std::iter::once(PathBuf::from(ETC_CONFIG_PATH)).chain(xdg_config_path());
    for path in candidates {
        if path.exists() {
            debug!(config_path = %path.display(), "Adding system configuration file");
            builder = builder.add_source(File::from(path).required(false));
        }
    }
    Ok(builder)
}
