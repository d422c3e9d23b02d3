//! `edirelay outbound` — one pass over the pickup folder.

use anyhow::Context;
use edirelay_router::OutboundRouter;
use edirelay_router::outbound::DIRECTION;
use tracing::info;

use crate::ConfigPaths;
use crate::logging;

pub async fn run(paths: &ConfigPaths, verbose: bool) -> anyhow::Result<()> {
    let config = super::load_config(paths)?;
    let _guard = logging::init(&config.logging, DIRECTION, verbose)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        master = %paths.master_config.display(),
        partners = %paths.partners_config.display(),
        "edirelay outbound starting"
    );

    let transports = super::transports(&config);
    let report = OutboundRouter::new(&config.settings, &config.directory, &transports)
        .with_stale_lock_after(config.locking.stale_after())
        .run()
        .await
        .context("Outbound run aborted")?;

    println!("{report}");
    Ok(())
}
