//! Merge rules: defaults, override order.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("host.eid", 9)?
        .set_default("host.tid", 1)?
        .set_default("host.terminus_handle", 1)?
        .set_default("fetch.fetch_fru_table", true)?
        .set_default("fetch.sync_sensor_states", true)?
        .set_default("fetch.notify_format", "format_is_pdr_handles")?
        .set_default(
            "inventory.object_path_root",
            crate::config::DEFAULT_OBJECT_PATH_ROOT,
        )
}
