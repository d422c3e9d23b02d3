//! `edirelay inbound` — one pass over every enabled partner.

use anyhow::Context;
use edirelay_router::InboundRouter;
use edirelay_router::inbound::DIRECTION;
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
        "edirelay inbound starting"
    );

    let transports = super::transports(&config);
    let report = InboundRouter::new(&config.settings, &config.directory, &transports)
        .with_stale_lock_after(config.locking.stale_after())
        .run()
        .await
        .context("Inbound run aborted")?;

    println!("{report}");
    Ok(())
}
