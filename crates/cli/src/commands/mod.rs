pub mod check;
pub mod inbound;
pub mod outbound;

use anyhow::Context;
use edirelay_config::RunConfig;
use edirelay_core::TransportRegistry;
use edirelay_transport::{TransportOptions, default_registry};

use crate::ConfigPaths;

/// Load and validate both configuration files.
pub(crate) fn load_config(paths: &ConfigPaths) -> anyhow::Result<RunConfig> {
    RunConfig::load(&paths.master_config, &paths.partners_config).with_context(|| {
        format!(
            "Invalid configuration (master: {}, partners: {})",
            paths.master_config.display(),
            paths.partners_config.display()
        )
    })
}

/// FTP and SFTP transports configured from the run settings.
pub(crate) fn transports(config: &RunConfig) -> TransportRegistry {
    default_registry(TransportOptions {
        timeout: config.transfer.timeout(),
        debug: config.logging.ftp_debug_level > 0,
    })
}
