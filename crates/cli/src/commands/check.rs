//! `edirelay check` — Validate configuration and preview archive layout.

use edirelay_core::{RenderContext, TemplateKind, effective_template};
use edirelay_router::archive::ArchivePlan;

use crate::ConfigPaths;
use crate::logging;

/// File name used to preview archive destinations.
const SAMPLE_DOCUMENT: &str = "000000001.edi";

pub fn run(paths: &ConfigPaths, verbose: bool) -> anyhow::Result<()> {
    logging::init_console(verbose);

    println!("🩺 edirelay check — Configuration Diagnostics");
    println!("=============================================\n");

    let config = super::load_config(paths)?;
    println!("  ✅ {} valid", paths.master_config.display());
    println!(
        "  ✅ {} valid ({} partner(s), {} enabled)",
        paths.partners_config.display(),
        config.directory.len(),
        config.directory.active().count()
    );

    let mut warnings = 0;
    let mut errors = 0;

    let folders = [
        ("Pickup folder", &config.settings.pickup_dir, true),
        ("Archive root", &config.settings.archive_root, false),
        ("Inbound drop folder", &config.settings.dropoff_dir, false),
    ];
    for (label, path, required) in folders {
        if path.is_dir() {
            println!("  ✅ {label}: {}", path.display());
        } else if required {
            println!("  ❌ {label} missing: {}", path.display());
            errors += 1;
        } else {
            println!("  ⚠️  {label} missing, created on first use: {}", path.display());
            warnings += 1;
        }
    }

    println!("\n  Partners:");
    for partner in config.directory.all() {
        let state = if partner.enabled { "enabled" } else { "disabled" };
        println!(
            "    {:<15} {:<25} {}://{}:{} ({state})",
            partner.id, partner.name, partner.protocol, partner.host, partner.port
        );
        println!(
            "      outbound → {}   inbound ← {}",
            display_remote(&partner.outbound_path),
            display_remote(&partner.inbound_path)
        );
        println!(
            "      archive: path '{}' filename '{}'",
            effective_template(partner, &config.settings, TemplateKind::Path),
            effective_template(partner, &config.settings, TemplateKind::Filename)
        );

        let context = RenderContext::capture(SAMPLE_DOCUMENT, partner);
        match ArchivePlan::new(&config.settings, partner, &context) {
            Ok(plan) => println!(
                "      e.g. {SAMPLE_DOCUMENT} → {}",
                plan.destination(&config.settings.archive_root).display()
            ),
            Err(e) => {
                println!("      ❌ {e}");
                errors += 1;
            }
        }
    }

    println!();
    if errors > 0 {
        anyhow::bail!("{errors} error(s) found, see above for details");
    }
    if warnings == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {warnings} warning(s). See above for details.");
    }
    Ok(())
}

fn display_remote(path: &str) -> &str {
    if path.is_empty() { "(login folder)" } else { path }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn empty_remote_path_means_login_folder() {
        assert_eq!(display_remote(""), "(login folder)");
        assert_eq!(display_remote("/in"), "/in");
    }

    #[test]
    fn sample_document_has_an_extension() {
        assert!(Path::new(SAMPLE_DOCUMENT).extension().is_some());
    }
}
